use crate::error::{Error, Result};
use crate::modulus::Modulus;

/// Reverses the low `bits` bits of `x`.
#[inline]
pub fn bit_reverse(x: usize, bits: u32) -> usize {
	x.reverse_bits() >> (usize::BITS - bits)
}

/// Negacyclic number-theoretic transform over `Z_q[X]/(X^N + 1)` for a
/// power-of-two `N` and a prime `q ≡ 1 (mod 2N)`.
///
/// Root powers are stored in bit-reversed order, the classical iterative
/// layout: the forward pass is Cooley-Tukey, the inverse Gentleman-Sande
/// followed by a multiplication by `N^-1`.
#[derive(Debug, Clone)]
pub struct NttOperator {
	q: Modulus,
	n: usize,
	psi_rev: Vec<u64>,
	psi_inv_rev: Vec<u64>,
	n_inv: u64,
}

impl NttOperator {
	/// Builds the operator, deriving a primitive `2N`-th root of unity.
	/// Fails if `q` is not NTT-friendly for this degree.
	pub fn new(q: Modulus, n: usize) -> Result<Self> {
		if !n.is_power_of_two() || n < 2 {
			return Err(Error::InvalidArgument("NTT size must be a power of two"));
		}
		if (q.value() - 1) % (2 * n as u64) != 0 {
			return Err(Error::InvalidArgument("modulus is not NTT-friendly"));
		}
		let psi = primitive_root_of_unity(&q, 2 * n as u64)?;
		let psi_inv = q.inv(psi)?;
		let log_n = n.trailing_zeros();

		let mut psi_rev = vec![0u64; n];
		let mut psi_inv_rev = vec![0u64; n];
		let mut power = 1u64;
		let mut power_inv = 1u64;
		for i in 0..n {
			psi_rev[bit_reverse(i, log_n)] = power;
			psi_inv_rev[bit_reverse(i, log_n)] = power_inv;
			power = q.mul(power, psi);
			power_inv = q.mul(power_inv, psi_inv);
		}
		let n_inv = q.inv(n as u64)?;
		Ok(Self {
			q,
			n,
			psi_rev,
			psi_inv_rev,
			n_inv,
		})
	}

	/// The transform size.
	pub fn size(&self) -> usize {
		self.n
	}

	/// The modulus the operator reduces against.
	pub fn modulus(&self) -> &Modulus {
		&self.q
	}

	/// In-place forward transform; input in standard order, output in the
	/// operator's internal (bit-reversed frequency) order.
	pub fn forward(&self, a: &mut [u64]) {
		debug_assert_eq!(a.len(), self.n);
		let q = &self.q;
		let mut t = self.n;
		let mut m = 1;
		while m < self.n {
			t >>= 1;
			for i in 0..m {
				let s = self.psi_rev[m + i];
				let j1 = 2 * i * t;
				for j in j1..j1 + t {
					let u = a[j];
					let v = q.mul(a[j + t], s);
					a[j] = q.add(u, v);
					a[j + t] = q.sub(u, v);
				}
			}
			m <<= 1;
		}
	}

	/// In-place inverse transform.
	pub fn inverse(&self, a: &mut [u64]) {
		debug_assert_eq!(a.len(), self.n);
		let q = &self.q;
		let mut t = 1;
		let mut m = self.n;
		while m > 1 {
			let h = m >> 1;
			let mut j1 = 0;
			for i in 0..h {
				let s = self.psi_inv_rev[h + i];
				for j in j1..j1 + t {
					let u = a[j];
					let v = a[j + t];
					a[j] = q.add(u, v);
					a[j + t] = q.mul(q.sub(u, v), s);
				}
				j1 += 2 * t;
			}
			t <<= 1;
			m = h;
		}
		for x in a.iter_mut() {
			*x = q.mul(*x, self.n_inv);
		}
	}
}

/// Derives a primitive `order`-th root of unity modulo `q` (with `order` a
/// power of two dividing `q - 1`) by exponentiating successive small bases.
pub fn primitive_root_of_unity(q: &Modulus, order: u64) -> Result<u64> {
	let exponent = (q.value() - 1) / order;
	for base in 2..=u64::min(q.value() - 1, 1 << 20) {
		let candidate = q.pow(base, exponent);
		// Primitive iff candidate^(order/2) = -1.
		if q.pow(candidate, order / 2) == q.value() - 1 {
			return Ok(candidate);
		}
	}
	Err(Error::InvalidArgument(
		"no primitive root of unity for this modulus",
	))
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::{Rng, SeedableRng};
	use rand_chacha::ChaCha8Rng;

	fn naive_negacyclic_mul(a: &[u64], b: &[u64], q: &Modulus) -> Vec<u64> {
		let n = a.len();
		let mut c = vec![0u64; n];
		for i in 0..n {
			for j in 0..n {
				let p = q.mul(a[i], b[j]);
				if i + j < n {
					c[i + j] = q.add(c[i + j], p);
				} else {
					c[i + j - n] = q.sub(c[i + j - n], p);
				}
			}
		}
		c
	}

	fn test_prime(bit_size: usize, n: usize) -> Modulus {
		let mut gen = crate::modulus::NttPrimeGenerator::new(bit_size, 2 * n as u64).unwrap();
		Modulus::new(gen.next_alternating().unwrap()).unwrap()
	}

	#[test]
	fn forward_inverse_round_trip() {
		let q = test_prime(50, 256);
		let op = NttOperator::new(q, 256).unwrap();
		let mut rng = ChaCha8Rng::seed_from_u64(17);
		let original: Vec<u64> = (0..256).map(|_| rng.gen::<u64>() % q.value()).collect();
		let mut a = original.clone();
		op.forward(&mut a);
		op.inverse(&mut a);
		assert_eq!(a, original);
	}

	#[test]
	fn pointwise_product_matches_negacyclic_convolution() {
		let q = test_prime(45, 64);
		let n = 64;
		let op = NttOperator::new(q, n).unwrap();
		let mut rng = ChaCha8Rng::seed_from_u64(3);
		let a: Vec<u64> = (0..n).map(|_| rng.gen::<u64>() % q.value()).collect();
		let b: Vec<u64> = (0..n).map(|_| rng.gen::<u64>() % q.value()).collect();
		let expected = naive_negacyclic_mul(&a, &b, &q);

		let mut fa = a.clone();
		let mut fb = b.clone();
		op.forward(&mut fa);
		op.forward(&mut fb);
		let mut fc: Vec<u64> = fa.iter().zip(&fb).map(|(x, y)| q.mul(*x, *y)).collect();
		op.inverse(&mut fc);
		assert_eq!(fc, expected);
	}
}
