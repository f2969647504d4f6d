use num_bigint::BigUint;

use crate::error::{Error, Result};
use crate::modulus::Modulus;
use crate::ntt::NttOperator;

/// Precomputed arithmetic context for one power-of-two cyclotomic ring
/// `Z[X]/(X^N + 1)` over an RNS chain.
///
/// The chain stores the ciphertext primes Q followed by the auxiliary
/// key-switching primes P; polynomials reference a prefix of the Q rows plus,
/// optionally, all P rows.
#[derive(Debug)]
pub struct RingContext {
	n: usize,
	log_n: u32,
	moduli: Vec<Modulus>,
	ntt: Vec<NttOperator>,
	q_count: usize,
}

impl RingContext {
	/// Builds a context for degree `n` over `q_primes ++ p_primes`.
	pub fn new(q_primes: &[u64], p_primes: &[u64], n: usize) -> Result<Self> {
		if !n.is_power_of_two() || n < 8 {
			return Err(Error::InvalidArgument(
				"ring degree must be a power of two of at least 8",
			));
		}
		if q_primes.is_empty() {
			return Err(Error::CoefficientModulusNotSet);
		}
		let mut moduli = Vec::with_capacity(q_primes.len() + p_primes.len());
		let mut ntt = Vec::with_capacity(moduli.capacity());
		for &p in q_primes.iter().chain(p_primes) {
			let m = Modulus::new(p)?;
			ntt.push(NttOperator::new(m, n)?);
			moduli.push(m);
		}
		Ok(Self {
			n,
			log_n: n.trailing_zeros(),
			moduli,
			ntt,
			q_count: q_primes.len(),
		})
	}

	/// The ring degree N.
	pub fn degree(&self) -> usize {
		self.n
	}

	/// log2(N).
	pub fn log_degree(&self) -> u32 {
		self.log_n
	}

	/// Number of ciphertext primes.
	pub fn q_count(&self) -> usize {
		self.q_count
	}

	/// Number of auxiliary primes.
	pub fn p_count(&self) -> usize {
		self.moduli.len() - self.q_count
	}

	/// The maximum ciphertext level (`q_count - 1`).
	pub fn max_level(&self) -> usize {
		self.q_count - 1
	}

	/// The modulus at a global row index (Q rows then P rows).
	pub fn modulus(&self, row: usize) -> &Modulus {
		&self.moduli[row]
	}

	/// All moduli, Q rows then P rows.
	pub fn moduli(&self) -> &[Modulus] {
		&self.moduli
	}

	/// The NTT operator for a global row index.
	pub fn ntt(&self, row: usize) -> &NttOperator {
		&self.ntt[row]
	}

	/// Product of the Q primes up to `level` inclusive.
	pub fn q_product(&self, level: usize) -> BigUint {
		self.moduli[..=level]
			.iter()
			.fold(BigUint::from(1u64), |acc, m| acc * m.value())
	}

	/// Product of the auxiliary primes.
	pub fn p_product(&self) -> BigUint {
		self.moduli[self.q_count..]
			.iter()
			.fold(BigUint::from(1u64), |acc, m| acc * m.value())
	}

	/// The Galois element realising a rotation by `k` slots: `5^k mod 2N`,
	/// with negative `k` mapped through the inverse of 5.
	pub fn galois_element(&self, k: i64) -> u64 {
		let m = 2 * self.n as u64;
		let order = self.n as u64 / 2;
		let k = k.rem_euclid(order as i64) as u64;
		pow_mod(5, k, m)
	}

	/// The Galois element realising complex conjugation: `2N - 1`.
	pub fn galois_element_conjugation(&self) -> u64 {
		2 * self.n as u64 - 1
	}
}

fn pow_mod(base: u64, mut e: u64, m: u64) -> u64 {
	let mut b = base % m;
	let mut r = 1u64;
	while e > 0 {
		if e & 1 == 1 {
			r = (r as u128 * b as u128 % m as u128) as u64;
		}
		b = (b as u128 * b as u128 % m as u128) as u64;
		e >>= 1;
	}
	r
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::modulus::NttPrimeGenerator;

	fn primes(bit_size: usize, n: usize, count: usize) -> Vec<u64> {
		let mut g = NttPrimeGenerator::new(bit_size, 2 * n as u64).unwrap();
		(0..count).map(|_| g.next_alternating().unwrap()).collect()
	}

	#[test]
	fn context_accessors() {
		let n = 64;
		let q = primes(40, n, 3);
		let p = primes(45, n, 1);
		let ctx = RingContext::new(&q, &p, n).unwrap();
		assert_eq!(ctx.degree(), n);
		assert_eq!(ctx.q_count(), 3);
		assert_eq!(ctx.p_count(), 1);
		assert_eq!(ctx.max_level(), 2);
		assert_eq!(ctx.q_product(0), BigUint::from(q[0]));
	}

	#[test]
	fn galois_elements() {
		let ctx = RingContext::new(&primes(40, 64, 1), &[], 64).unwrap();
		assert_eq!(ctx.galois_element(0), 1);
		assert_eq!(ctx.galois_element(1), 5);
		assert_eq!(ctx.galois_element(2), 25);
		// Rotating by -1 then +1 composes to the identity on the 2N-th
		// roots: g(-1) * g(1) = 1 mod 2N.
		let m = 2 * 64u64;
		assert_eq!(ctx.galois_element(-1) * 5 % m, 1);
		assert_eq!(ctx.galois_element_conjugation(), 127);
	}
}
