//! The default CKKS evaluator: scale-aware ciphertext algebra, rescaling,
//! rotations, and gadget key switching.

use num_bigint::BigInt;
use num_complex::Complex64;
use num_traits::FromPrimitive;

use crate::ciphertext::Ciphertext;
use crate::error::{Error, Result};
use crate::key_generator::{EvaluationKey, GaloisKey, RelinearizationKey};
use crate::parameters::CkksParameters;
use crate::plaintext::Plaintext;
use crate::poly::{Poly, Representation};

pub mod polynomial;

/// Relative tolerance under which two scales are treated as equal.
const SCALE_TOLERANCE: f64 = 1e-9;

fn scales_compatible(a: f64, b: f64) -> bool {
	(a - b).abs() <= a.abs().max(b.abs()) * SCALE_TOLERANCE
}

/// The stateless CKKS evaluator; keys are passed per call.
#[derive(Debug, Clone)]
pub struct Evaluator {
	params: CkksParameters,
}

impl Evaluator {
	/// Creates an evaluator over a parameter set.
	pub fn new(params: &CkksParameters) -> Self {
		Self {
			params: params.clone(),
		}
	}

	/// The parameter set of this evaluator.
	pub fn parameters(&self) -> &CkksParameters {
		&self.params
	}

	fn aligned(&self, a: &Ciphertext, b: &Ciphertext) -> Result<(Ciphertext, Ciphertext)> {
		if !scales_compatible(a.scale, b.scale) {
			return Err(Error::ScaleMismatch);
		}
		let level = a.level().min(b.level());
		Ok((self.to_level(a, level), self.to_level(b, level)))
	}

	/// Returns a copy of the ciphertext truncated to `level` (scale kept).
	pub fn to_level(&self, ct: &Ciphertext, level: usize) -> Ciphertext {
		if ct.level() == level {
			return ct.clone();
		}
		Ciphertext {
			c: ct.c.iter().map(|p| p.restrict(level, false)).collect(),
			scale: ct.scale,
			log_slots: ct.log_slots,
		}
	}

	/// `a + b`; operands are aligned to the lower of the two levels.
	pub fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
		let (mut a, b) = self.aligned(a, b)?;
		for (ca, cb) in a.c.iter_mut().zip(&b.c) {
			ca.add_assign(cb)?;
		}
		if b.c.len() > a.c.len() {
			a.c.extend(b.c[a.c.len()..].iter().cloned());
		}
		Ok(a)
	}

	/// `a - b`.
	pub fn sub(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
		let (mut a, b) = self.aligned(a, b)?;
		for (ca, cb) in a.c.iter_mut().zip(&b.c) {
			ca.sub_assign(cb)?;
		}
		for extra in b.c.iter().skip(a.c.len()) {
			let mut neg = extra.clone();
			neg.neg_assign();
			a.c.push(neg);
		}
		Ok(a)
	}

	/// `-a`.
	pub fn neg(&self, a: &Ciphertext) -> Ciphertext {
		let mut out = a.clone();
		for c in out.c.iter_mut() {
			c.neg_assign();
		}
		out
	}

	/// `ct + pt`; the plaintext scale must match.
	pub fn add_plain(&self, ct: &Ciphertext, pt: &Plaintext) -> Result<Ciphertext> {
		if !scales_compatible(ct.scale, pt.scale) {
			return Err(Error::ScaleMismatch);
		}
		let mut out = self.to_level(ct, ct.level().min(pt.level()));
		let restricted = pt.poly.restrict(out.level(), false);
		out.c[0].add_assign(&restricted)?;
		Ok(out)
	}

	/// `ct - pt`.
	pub fn sub_plain(&self, ct: &Ciphertext, pt: &Plaintext) -> Result<Ciphertext> {
		if !scales_compatible(ct.scale, pt.scale) {
			return Err(Error::ScaleMismatch);
		}
		let mut out = self.to_level(ct, ct.level().min(pt.level()));
		let restricted = pt.poly.restrict(out.level(), false);
		out.c[0].sub_assign(&restricted)?;
		Ok(out)
	}

	/// Adds a constant to every slot, at the ciphertext's scale.
	pub fn add_const(&self, ct: &Ciphertext, value: Complex64) -> Result<Ciphertext> {
		let mut out = ct.clone();
		let mut c = self.constant_poly(value, ct.scale, ct.level())?;
		c.to_ntt();
		out.c[0].add_assign(&c)?;
		Ok(out)
	}

	/// Multiplies every slot by a constant encoded at `const_scale`; the
	/// ciphertext scale becomes `ct.scale * const_scale`.
	pub fn mul_const(
		&self,
		ct: &Ciphertext,
		value: Complex64,
		const_scale: f64,
	) -> Result<Ciphertext> {
		let mut c = self.constant_poly(value, const_scale, ct.level())?;
		c.to_ntt();
		let mut out = ct.clone();
		for p in out.c.iter_mut() {
			p.mul_assign(&c)?;
		}
		out.scale = ct.scale * const_scale;
		Ok(out)
	}

	/// Multiplies by an exact integer scalar; the scale does not move.
	pub fn mul_scalar(&self, ct: &Ciphertext, scalar: &BigInt) -> Ciphertext {
		let mut out = ct.clone();
		for p in out.c.iter_mut() {
			p.mul_scalar_bigint_assign(scalar);
		}
		out
	}

	/// Multiplies by the exact inverse of `2^log_k`; the scale does not move.
	pub fn mul_pow2_inv(&self, ct: &Ciphertext, log_k: usize) -> Result<Ciphertext> {
		let mut out = ct.clone();
		for p in out.c.iter_mut() {
			let mut k = log_k;
			// Apply in u64-sized chunks so the scalar always fits.
			while k > 0 {
				let step = k.min(62);
				p.mul_scalar_inv_assign(1u64 << step)?;
				k -= step;
			}
		}
		Ok(out)
	}

	/// Multiplies by the monomial `X^k` (exact, scale preserved).
	pub fn mul_monomial(&self, ct: &Ciphertext, k: i64) -> Ciphertext {
		let mut out = ct.clone();
		for p in out.c.iter_mut() {
			*p = p.mul_monomial(k);
		}
		out
	}

	/// Multiplies every slot by `i` (the monomial `X^{N/2}`).
	pub fn mul_by_i(&self, ct: &Ciphertext) -> Ciphertext {
		self.mul_monomial(ct, (self.params.n() / 2) as i64)
	}

	/// Multiplies every slot by `-i`.
	pub fn div_by_i(&self, ct: &Ciphertext) -> Ciphertext {
		self.mul_monomial(ct, -((self.params.n() / 2) as i64))
	}

	/// `ct * pt`; scales multiply, no rescaling happens here.
	pub fn mul_plain(&self, ct: &Ciphertext, pt: &Plaintext) -> Result<Ciphertext> {
		let level = ct.level().min(pt.level());
		let mut out = self.to_level(ct, level);
		let p = pt.poly.restrict(level, false);
		for c in out.c.iter_mut() {
			c.mul_assign(&p)?;
		}
		out.scale = ct.scale * pt.scale;
		Ok(out)
	}

	/// `a * b` with immediate relinearisation; scales multiply.
	pub fn mul_relin(
		&self,
		a: &Ciphertext,
		b: &Ciphertext,
		rlk: &RelinearizationKey,
	) -> Result<Ciphertext> {
		let level = a.level().min(b.level());
		let a = self.to_level(a, level);
		let b = self.to_level(b, level);
		if a.c.len() != 2 || b.c.len() != 2 {
			return Err(Error::InvalidArgument(
				"multiplication needs relinearised operands",
			));
		}
		let mut d0 = a.c[0].clone();
		d0.mul_assign(&b.c[0])?;
		let mut d1 = a.c[0].clone();
		d1.mul_assign(&b.c[1])?;
		d1.add_product_assign(&a.c[1], &b.c[0])?;
		let mut d2 = a.c[1].clone();
		d2.mul_assign(&b.c[1])?;

		let (delta, c1ks) = self.key_switch(&d2, &rlk.key)?;
		d0.add_assign(&delta)?;
		d1.add_assign(&c1ks)?;
		Ok(Ciphertext {
			c: vec![d0, d1],
			scale: a.scale * b.scale,
			log_slots: a.log_slots,
		})
	}

	/// `a^2` with relinearisation.
	pub fn square_relin(&self, a: &Ciphertext, rlk: &RelinearizationKey) -> Result<Ciphertext> {
		self.mul_relin(a, a, rlk)
	}

	/// Rescales once: divides by the current last prime and drops a level.
	pub fn rescale(&self, ct: &mut Ciphertext) -> Result<()> {
		ct.ensure_level(1)?;
		let q_last = self.params.q()[ct.level()] as f64;
		for p in ct.c.iter_mut() {
			p.to_coeff();
			p.div_round_by_last_row()?;
			p.to_ntt();
		}
		ct.scale /= q_last;
		Ok(())
	}

	/// Rescales `count` times.
	pub fn rescale_by(&self, ct: &mut Ciphertext, count: usize) -> Result<()> {
		for _ in 0..count {
			self.rescale(ct)?;
		}
		Ok(())
	}

	/// Drops `count` levels without rounding or scale movement.
	pub fn drop_level(&self, ct: &mut Ciphertext, count: usize) -> Result<()> {
		ct.ensure_level(count)?;
		for p in ct.c.iter_mut() {
			for _ in 0..count {
				p.drop_last_q();
			}
		}
		Ok(())
	}

	/// Drops levels until the ciphertext sits exactly at `level`.
	pub fn drop_to_level(&self, ct: &mut Ciphertext, level: usize) -> Result<()> {
		if ct.level() < level {
			return Err(Error::LevelTooLow {
				level: ct.level(),
				min: level,
			});
		}
		let count = ct.level() - level;
		self.drop_level(ct, count)
	}

	/// Rotates slots left by `k` using the matching Galois key.
	pub fn rotate(&self, ct: &Ciphertext, k: i64, gk: &GaloisKey) -> Result<Ciphertext> {
		let element = self.params.ring().galois_element(k);
		if gk.element != element {
			return Err(Error::InvalidArgument("galois key does not match rotation"));
		}
		self.apply_galois(ct, element, &gk.key)
	}

	/// Conjugates every slot using the conjugation Galois key.
	pub fn conjugate(&self, ct: &Ciphertext, gk: &GaloisKey) -> Result<Ciphertext> {
		let element = self.params.ring().galois_element_conjugation();
		if gk.element != element {
			return Err(Error::InvalidArgument(
				"galois key does not match conjugation",
			));
		}
		self.apply_galois(ct, element, &gk.key)
	}

	/// Applies `X -> X^element` to the ciphertext and switches back to the
	/// original secret with the supplied key.
	pub fn apply_galois(
		&self,
		ct: &Ciphertext,
		element: u64,
		key: &EvaluationKey,
	) -> Result<Ciphertext> {
		if ct.c.len() != 2 {
			return Err(Error::InvalidArgument(
				"galois application needs a relinearised ciphertext",
			));
		}
		let c0g = ct.c[0].automorphism(element);
		let c1g = ct.c[1].automorphism(element);
		let (mut c0, c1) = self.key_switch(&c1g, key)?;
		c0.add_assign(&c0g)?;
		Ok(Ciphertext {
			c: vec![c0, c1],
			scale: ct.scale,
			log_slots: ct.log_slots,
		})
	}

	/// Re-encrypts the ciphertext under the key's output secret (used for
	/// sparse/dense encapsulation and ring switching).
	pub fn apply_evaluation_key(
		&self,
		ct: &Ciphertext,
		key: &EvaluationKey,
	) -> Result<Ciphertext> {
		if ct.c.len() != 2 {
			return Err(Error::InvalidArgument(
				"key switching needs a relinearised ciphertext",
			));
		}
		let (mut c0, c1) = self.key_switch(&ct.c[1], key)?;
		c0.add_assign(&ct.c[0])?;
		Ok(Ciphertext {
			c: vec![c0, c1],
			scale: ct.scale,
			log_slots: ct.log_slots,
		})
	}

	/// The gadget product: decomposes `c1` into per-prime digits, pairs them
	/// with the key rows over Q·P, and divides the accumulators by P.
	/// Returns the `(b, a)` contribution mod the current Q prefix.
	pub fn key_switch(&self, c1: &Poly, key: &EvaluationKey) -> Result<(Poly, Poly)> {
		let ring = self.params.ring();
		let level = c1.level();
		if key.b.len() < level + 1 {
			return Err(Error::IncompatibleParameters);
		}
		let mut d = c1.clone();
		d.to_coeff();

		let mut acc_b = Poly::zero(ring, level, true, Representation::Ntt);
		let mut acc_a = Poly::zero(ring, level, true, Representation::Ntt);
		for i in 0..=level {
			// The digit is the integer residue of c1 mod q_i, re-reduced
			// against every row modulus.
			let digit_src = d.row(i);
			let mut rows: Vec<Vec<u64>> = Vec::with_capacity(level + 1 + ring.p_count());
			for r in 0..=level {
				let m = *ring.modulus(r);
				rows.push(digit_src.iter().map(|&v| m.reduce(v)).collect());
			}
			for r in 0..ring.p_count() {
				let m = *ring.modulus(ring.q_count() + r);
				rows.push(digit_src.iter().map(|&v| m.reduce(v)).collect());
			}
			let mut digit = Poly::from_rows(ring, rows, level + 1, Representation::Coefficient);
			digit.to_ntt();

			acc_b.add_product_assign(&digit, &key.b[i].restrict(level, true))?;
			acc_a.add_product_assign(&digit, &key.a[i].restrict(level, true))?;
		}
		acc_b.to_coeff();
		acc_b.div_round_by_p()?;
		acc_b.to_ntt();
		acc_a.to_coeff();
		acc_a.div_round_by_p()?;
		acc_a.to_ntt();
		Ok((acc_b, acc_a))
	}

	fn constant_poly(&self, value: Complex64, scale: f64, level: usize) -> Result<Poly> {
		let n = self.params.n();
		let mut coeffs = vec![BigInt::from(0); n];
		coeffs[0] = BigInt::from_f64((value.re * scale).round())
			.ok_or(Error::InvalidArgument("constant out of range"))?;
		coeffs[n / 2] = BigInt::from_f64((value.im * scale).round())
			.ok_or(Error::InvalidArgument("constant out of range"))?;
		Ok(Poly::from_bigint(self.params.ring(), &coeffs, level, false))
	}
}
