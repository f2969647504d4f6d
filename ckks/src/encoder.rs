use num_bigint::BigInt;
use num_complex::Complex64;
use num_traits::{FromPrimitive, ToPrimitive};

use crate::error::{Error, Result};
use crate::parameters::CkksParameters;
use crate::plaintext::Plaintext;
use crate::poly::Poly;

/// Reverses the order of a complex vector by bit-reversed index.
pub fn bit_reverse_in_place(v: &mut [Complex64]) {
	let bits = v.len().trailing_zeros();
	for i in 0..v.len() {
		let j = crate::ntt::bit_reverse(i, bits);
		if i < j {
			v.swap(i, j);
		}
	}
}

/// `e^{2πi k / m}`.
#[inline]
fn root_of_unity(k: u64, m: u64) -> Complex64 {
	let angle = 2.0 * std::f64::consts::PI * k as f64 / m as f64;
	Complex64::new(angle.cos(), angle.sin())
}

/// `5^j mod m` for a power-of-two `m`; the rotation group enumerating the
/// odd 2N-th roots used by the canonical embedding.
#[inline]
pub fn rot_group_exponent(j: usize, m: u64) -> u64 {
	let mut r = 1u64;
	for _ in 0..j {
		r = (r * 5) % m;
	}
	r
}

/// The special FFT taking the coefficient pairing of a plaintext polynomial
/// to its canonical slot values (the decode direction).
pub fn special_fft(v: &mut [Complex64]) {
	let n = v.len();
	debug_assert!(n.is_power_of_two());
	bit_reverse_in_place(v);
	let mut len = 2;
	while len <= n {
		let lenh = len >> 1;
		let lenq = (len as u64) << 2;
		for i in (0..n).step_by(len) {
			for j in 0..lenh {
				let w = root_of_unity(rot_group_exponent(j, lenq), lenq);
				let u = v[i + j];
				let t = v[i + j + lenh] * w;
				v[i + j] = u + t;
				v[i + j + lenh] = u - t;
			}
		}
		len <<= 1;
	}
}

/// The inverse special FFT (the encode direction), including the 1/n
/// normalisation.
pub fn special_inv_fft(v: &mut [Complex64]) {
	let n = v.len();
	debug_assert!(n.is_power_of_two());
	let mut len = n;
	while len >= 2 {
		let lenh = len >> 1;
		let lenq = (len as u64) << 2;
		for i in (0..n).step_by(len) {
			for j in 0..lenh {
				let w = root_of_unity(rot_group_exponent(j, lenq), lenq).conj();
				let u = v[i + j] + v[i + j + lenh];
				let t = (v[i + j] - v[i + j + lenh]) * w;
				v[i + j] = u;
				v[i + j + lenh] = t;
			}
		}
		len >>= 1;
	}
	bit_reverse_in_place(v);
	let scale = 1.0 / n as f64;
	for x in v.iter_mut() {
		*x *= scale;
	}
}

/// Encodes complex slot vectors into plaintext polynomials and back.
///
/// A vector of `2^log_slots` values occupies the coefficient grid of stride
/// `N/2 / 2^log_slots`: real parts in the lower half of the coefficient
/// vector, imaginary parts in the upper half. Sparse encodings replicate
/// across the physical slots.
#[derive(Debug, Clone)]
pub struct Encoder {
	params: CkksParameters,
}

impl Encoder {
	/// Creates an encoder over a parameter set.
	pub fn new(params: &CkksParameters) -> Self {
		Self {
			params: params.clone(),
		}
	}

	/// The parameter set the encoder operates over.
	pub fn parameters(&self) -> &CkksParameters {
		&self.params
	}

	/// Encodes `values` (at most `2^log_slots` of them; the tail is zero
	/// padded) into a plaintext at the given level and scale.
	pub fn encode(
		&self,
		values: &[Complex64],
		level: usize,
		scale: f64,
		log_slots: usize,
	) -> Result<Plaintext> {
		let poly = self.encode_poly(values, level, scale, log_slots)?;
		Ok(Plaintext {
			poly,
			scale,
			log_slots,
		})
	}

	/// Encodes into a bare polynomial; used where plaintext metadata is
	/// managed by the caller.
	pub fn encode_poly(
		&self,
		values: &[Complex64],
		level: usize,
		scale: f64,
		log_slots: usize,
	) -> Result<Poly> {
		let n = self.params.n();
		let slots = 1usize << log_slots;
		if log_slots > self.params.log_max_slots() {
			return Err(Error::InvalidArgument("log_slots exceeds the ring capacity"));
		}
		if values.len() > slots {
			return Err(Error::InvalidArgument("more values than slots"));
		}
		if level > self.params.max_level() {
			return Err(Error::LevelTooLow {
				level: self.params.max_level(),
				min: level,
			});
		}
		let mut u = vec![Complex64::new(0.0, 0.0); slots];
		u[..values.len()].copy_from_slice(values);
		special_inv_fft(&mut u);

		let gap = self.params.max_slots() / slots;
		let half = n / 2;
		let mut coeffs = vec![BigInt::from(0); n];
		for (i, z) in u.iter().enumerate() {
			coeffs[gap * i] = round_to_bigint(z.re * scale)?;
			coeffs[half + gap * i] = round_to_bigint(z.im * scale)?;
		}
		let mut poly = Poly::from_bigint(self.params.ring(), &coeffs, level, false);
		poly.to_ntt();
		Ok(poly)
	}

	/// Decodes a plaintext back into its `2^log_slots` slot values.
	pub fn decode(&self, pt: &Plaintext) -> Result<Vec<Complex64>> {
		self.decode_poly(&pt.poly, pt.scale, pt.log_slots)
	}

	/// Decodes a bare polynomial with explicit scale and slot layout.
	pub fn decode_poly(&self, poly: &Poly, scale: f64, log_slots: usize) -> Result<Vec<Complex64>> {
		let slots = 1usize << log_slots;
		let gap = self.params.max_slots() / slots;
		let half = self.params.n() / 2;
		let mut p = poly.clone();
		p.to_coeff();
		let coeffs = p.to_bigint()?;
		let mut u: Vec<Complex64> = (0..slots)
			.map(|i| {
				Complex64::new(
					coeffs[gap * i].to_f64().unwrap_or(f64::MAX) / scale,
					coeffs[half + gap * i].to_f64().unwrap_or(f64::MAX) / scale,
				)
			})
			.collect();
		special_fft(&mut u);
		Ok(u)
	}

}

fn round_to_bigint(x: f64) -> Result<BigInt> {
	if !x.is_finite() {
		return Err(Error::InvalidArgument("non-finite value in encoding"));
	}
	BigInt::from_f64(x.round()).ok_or(Error::InvalidArgument("value out of encoding range"))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::parameters::CkksParametersBuilder;
	use num_complex::Complex64;
	use rand::{Rng, SeedableRng};
	use rand_chacha::ChaCha8Rng;

	fn params(log_n: usize) -> CkksParameters {
		CkksParametersBuilder::new()
			.set_log_n(log_n)
			.set_log_q(vec![55, 45, 45])
			.set_log_default_scale(40)
			.build()
			.unwrap()
	}

	fn random_values(count: usize, seed: u64) -> Vec<Complex64> {
		let mut rng = ChaCha8Rng::seed_from_u64(seed);
		(0..count)
			.map(|_| Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
			.collect()
	}

	#[test]
	fn special_fft_inverts() {
		let mut v = random_values(64, 7);
		let original = v.clone();
		special_inv_fft(&mut v);
		special_fft(&mut v);
		for (a, b) in v.iter().zip(&original) {
			assert!((a - b).norm() < 1e-9);
		}
	}

	#[test]
	fn encode_decode_full_slots() {
		let params = params(8);
		let encoder = Encoder::new(&params);
		let values = random_values(params.max_slots(), 1);
		let pt = encoder
			.encode(&values, params.max_level(), params.default_scale(), params.log_max_slots())
			.unwrap();
		let decoded = encoder.decode(&pt).unwrap();
		for (a, b) in decoded.iter().zip(&values) {
			assert!((a - b).norm() < 1e-8);
		}
	}

	#[test]
	fn encode_decode_sparse_slots() {
		let params = params(8);
		let encoder = Encoder::new(&params);
		let values = random_values(16, 2);
		let pt = encoder
			.encode(&values, 1, params.default_scale(), 4)
			.unwrap();
		let decoded = encoder.decode(&pt).unwrap();
		assert_eq!(decoded.len(), 16);
		for (a, b) in decoded.iter().zip(&values) {
			assert!((a - b).norm() < 1e-8);
		}
	}

	/// The canonical-embedding property: multiplying polynomials multiplies
	/// slot values. This anchors every homomorphic slot semantic downstream.
	#[test]
	fn polynomial_product_is_slotwise_product() {
		let params = params(6);
		let encoder = Encoder::new(&params);
		let n = params.n();
		let a = random_values(params.max_slots(), 3);
		let b = random_values(params.max_slots(), 4);
		let scale = 2f64.powi(30);
		// The product's coefficients exceed q0 alone, so encode on the full
		// chain.
		let level = params.max_level();
		let pa = encoder
			.encode(&a, level, scale, params.log_max_slots())
			.unwrap();
		let pb = encoder
			.encode(&b, level, scale, params.log_max_slots())
			.unwrap();

		let mut prod = pa.poly.clone();
		prod.mul_assign(&pb.poly).unwrap();
		let decoded = encoder
			.decode_poly(&prod, scale * scale, params.log_max_slots())
			.unwrap();
		for (i, (x, y)) in a.iter().zip(&b).enumerate() {
			assert!(
				(decoded[i] - x * y).norm() < 1e-6,
				"slot {i}: {} vs {}",
				decoded[i],
				x * y
			);
		}
		// Degree sanity: the ring really is X^n + 1.
		assert_eq!(pa.poly.context().degree(), n);
	}

	/// Rotating the Galois element 5 permutes slots cyclically.
	#[test]
	fn automorphism_rotates_slots() {
		let params = params(6);
		let encoder = Encoder::new(&params);
		let values = random_values(params.max_slots(), 5);
		let scale = 2f64.powi(30);
		let pt = encoder
			.encode(&values, 0, scale, params.log_max_slots())
			.unwrap();
		let rotated = pt.poly.automorphism(params.ring().galois_element(1));
		let decoded = encoder
			.decode_poly(&rotated, scale, params.log_max_slots())
			.unwrap();
		let slots = params.max_slots();
		for i in 0..slots {
			assert!(
				(decoded[i] - values[(i + 1) % slots]).norm() < 1e-7,
				"slot {i}"
			);
		}
	}

	/// Conjugation by the element 2N-1 conjugates every slot.
	#[test]
	fn automorphism_conjugates_slots() {
		let params = params(6);
		let encoder = Encoder::new(&params);
		let values = random_values(params.max_slots(), 6);
		let scale = 2f64.powi(30);
		let pt = encoder
			.encode(&values, 0, scale, params.log_max_slots())
			.unwrap();
		let conj = pt.poly.automorphism(params.ring().galois_element_conjugation());
		let decoded = encoder
			.decode_poly(&conj, scale, params.log_max_slots())
			.unwrap();
		for (a, b) in decoded.iter().zip(&values) {
			assert!((a - b.conj()).norm() < 1e-7);
		}
	}
}
