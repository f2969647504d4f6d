use crate::error::{Error, Result};

/// A prime modulus below 2^62 together with its coefficient-wise arithmetic.
///
/// All operations are plain u128-widening reductions; the scheme keeps every
/// residue in canonical form `[0, q)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Modulus {
	q: u64,
}

impl Modulus {
	/// Creates a modulus from a prime `q` with `2 <= q < 2^62`.
	pub fn new(q: u64) -> Result<Self> {
		if q < 2 || q >= (1u64 << 62) {
			return Err(Error::InvalidArgument(
				"modulus must be between 2 and 2^62 - 1",
			));
		}
		Ok(Self { q })
	}

	/// Returns the underlying value.
	pub fn value(&self) -> u64 {
		self.q
	}

	/// Number of bits of the modulus.
	pub fn bits(&self) -> usize {
		64 - self.q.leading_zeros() as usize
	}

	/// `a + b mod q`; operands must be reduced.
	#[inline]
	pub fn add(&self, a: u64, b: u64) -> u64 {
		let r = a + b;
		if r >= self.q {
			r - self.q
		} else {
			r
		}
	}

	/// `a - b mod q`; operands must be reduced.
	#[inline]
	pub fn sub(&self, a: u64, b: u64) -> u64 {
		if a >= b {
			a - b
		} else {
			a + self.q - b
		}
	}

	/// `-a mod q`; the operand must be reduced.
	#[inline]
	pub fn neg(&self, a: u64) -> u64 {
		if a == 0 {
			0
		} else {
			self.q - a
		}
	}

	/// `a * b mod q`; operands must be reduced.
	#[inline]
	pub fn mul(&self, a: u64, b: u64) -> u64 {
		((a as u128 * b as u128) % self.q as u128) as u64
	}

	/// Reduces an arbitrary u64.
	#[inline]
	pub fn reduce(&self, a: u64) -> u64 {
		a % self.q
	}

	/// Reduces an arbitrary u128.
	#[inline]
	pub fn reduce_u128(&self, a: u128) -> u64 {
		(a % self.q as u128) as u64
	}

	/// Reduces a signed integer into `[0, q)`.
	#[inline]
	pub fn reduce_i64(&self, a: i64) -> u64 {
		let r = a.rem_euclid(self.q as i64);
		r as u64
	}

	/// `a^e mod q` by square and multiply.
	pub fn pow(&self, a: u64, mut e: u64) -> u64 {
		let mut base = self.reduce(a);
		let mut r = 1u64;
		while e > 0 {
			if e & 1 == 1 {
				r = self.mul(r, base);
			}
			base = self.mul(base, base);
			e >>= 1;
		}
		r
	}

	/// `a^-1 mod q`, by Fermat since `q` is prime. Fails on zero.
	pub fn inv(&self, a: u64) -> Result<u64> {
		if a % self.q == 0 {
			return Err(Error::InvalidArgument("zero has no modular inverse"));
		}
		Ok(self.pow(a, self.q - 2))
	}
}

/// Deterministic Miller-Rabin over the witness set that decides primality
/// for every u64.
pub fn is_prime(n: u64) -> bool {
	if n < 2 {
		return false;
	}
	for p in [2u64, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37] {
		if n == p {
			return true;
		}
		if n % p == 0 {
			return false;
		}
	}
	let mut d = n - 1;
	let mut s = 0;
	while d % 2 == 0 {
		d /= 2;
		s += 1;
	}
	let mulmod = |a: u64, b: u64| ((a as u128 * b as u128) % n as u128) as u64;
	let powmod = |mut a: u64, mut e: u64| {
		let mut r = 1u64;
		a %= n;
		while e > 0 {
			if e & 1 == 1 {
				r = mulmod(r, a);
			}
			a = mulmod(a, a);
			e >>= 1;
		}
		r
	};
	'witness: for a in [2u64, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37] {
		let mut x = powmod(a, d);
		if x == 1 || x == n - 1 {
			continue;
		}
		for _ in 0..s - 1 {
			x = mulmod(x, x);
			if x == n - 1 {
				continue 'witness;
			}
		}
		return false;
	}
	true
}

/// Generates NTT-friendly primes `p ≡ 1 (mod nth_root)` of a requested bit
/// size, walking away from `2^bit_size` alternately upstream and downstream.
///
/// The walk is fully deterministic: two generators with equal inputs yield
/// the same sequence.
#[derive(Debug, Clone)]
pub struct NttPrimeGenerator {
	bit_size: usize,
	nth_root: u64,
	up: u64,
	down: u64,
	next_up: bool,
}

impl NttPrimeGenerator {
	/// Creates a generator for primes of `bit_size` bits congruent to 1
	/// modulo `nth_root` (a power of two).
	pub fn new(bit_size: usize, nth_root: u64) -> Result<Self> {
		if !(3..=61).contains(&bit_size) {
			return Err(Error::InvalidArgument(
				"prime bit size must be between 3 and 61",
			));
		}
		if nth_root == 0 || !nth_root.is_power_of_two() {
			return Err(Error::InvalidArgument("nth root must be a power of two"));
		}
		let center = 1u64 << bit_size;
		// First candidates of the form k * nth_root + 1 on either side.
		let up = (center / nth_root) * nth_root + 1 + nth_root;
		let down = (center / nth_root) * nth_root + 1 - nth_root;
		Ok(Self {
			bit_size,
			nth_root,
			up,
			down,
			next_up: true,
		})
	}

	fn err(&self) -> Error {
		Error::PrimeGeneration {
			bit_size: self.bit_size,
			nth_root: self.nth_root,
		}
	}

	/// Next prime above the centre power of two.
	pub fn next_upstream(&mut self) -> Result<u64> {
		let bound = 1u64 << (self.bit_size + 1);
		while self.up < bound {
			let candidate = self.up;
			self.up += self.nth_root;
			if is_prime(candidate) {
				return Ok(candidate);
			}
		}
		Err(self.err())
	}

	/// Next prime below the centre power of two.
	pub fn next_downstream(&mut self) -> Result<u64> {
		let bound = 1u64 << (self.bit_size - 1);
		while self.down > bound {
			let candidate = self.down;
			self.down -= self.nth_root;
			if is_prime(candidate) {
				return Ok(candidate);
			}
		}
		Err(self.err())
	}

	/// Next prime, alternating above and below the centre power of two so
	/// that the running product stays close to the requested total bit size.
	pub fn next_alternating(&mut self) -> Result<u64> {
		if self.next_up {
			self.next_up = false;
			self.next_upstream().or_else(|_| self.next_downstream())
		} else {
			self.next_up = true;
			self.next_downstream().or_else(|_| self.next_upstream())
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn arithmetic_round_trips() {
		let q = Modulus::new(0x1fffffffffe00001).unwrap();
		let a = 0x123456789abcdefu64 % q.value();
		let b = 0xfedcba987654321u64 % q.value();
		assert_eq!(q.sub(q.add(a, b), b), a);
		assert_eq!(q.mul(a, q.inv(a).unwrap()), 1);
		assert_eq!(q.add(a, q.neg(a)), 0);
		assert_eq!(q.pow(a, 0), 1);
	}

	#[test]
	fn primality() {
		assert!(is_prime(2));
		assert!(is_prime(0x1fffffffffe00001));
		assert!(!is_prime(1));
		assert!(!is_prime(0x1fffffffffe00003));
		assert!(is_prime(1153));
	}

	#[test]
	fn generator_is_deterministic_and_ntt_friendly() {
		let n = 1u64 << 11;
		let mut g1 = NttPrimeGenerator::new(40, 2 * n).unwrap();
		let mut g2 = NttPrimeGenerator::new(40, 2 * n).unwrap();
		for _ in 0..8 {
			let p1 = g1.next_alternating().unwrap();
			let p2 = g2.next_alternating().unwrap();
			assert_eq!(p1, p2);
			assert!(is_prime(p1));
			assert_eq!(p1 % (2 * n), 1);
			assert_eq!(64 - p1.leading_zeros(), 40 + (p1 >= 1 << 40) as u32);
		}
	}

	#[test]
	fn generator_alternates_sides() {
		let mut g = NttPrimeGenerator::new(30, 1 << 12).unwrap();
		let above = g.next_alternating().unwrap();
		let below = g.next_alternating().unwrap();
		assert!(above > (1 << 30));
		assert!(below < (1 << 30));
	}
}
