use std::sync::Arc;

use itertools::izip;
use num_bigint::{BigInt, BigUint};
use num_traits::{Signed, ToPrimitive, Zero};
use rand::distributions::Distribution;
use rand::seq::SliceRandom;
use rand::{CryptoRng, Rng, RngCore};
use zeroize::Zeroize;

use crate::error::{Error, Result};
use crate::ring::RingContext;

/// The representation an RNS polynomial is currently stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
	/// Coefficient (power basis) domain.
	Coefficient,
	/// Evaluation (NTT) domain.
	Ntt,
}

/// An RNS polynomial over a prefix of a ring context's Q primes, optionally
/// extended by all its P primes.
#[derive(Debug, Clone)]
pub struct Poly {
	ctx: Arc<RingContext>,
	coeffs: Vec<Vec<u64>>,
	q_rows: usize,
	repr: Representation,
}

impl PartialEq for Poly {
	fn eq(&self, other: &Self) -> bool {
		self.q_rows == other.q_rows && self.repr == other.repr && self.coeffs == other.coeffs
	}
}

impl Zeroize for Poly {
	fn zeroize(&mut self) {
		for row in self.coeffs.iter_mut() {
			row.zeroize();
		}
	}
}

impl Poly {
	/// The zero polynomial at `level`, with P rows if `with_p`.
	pub fn zero(
		ctx: &Arc<RingContext>,
		level: usize,
		with_p: bool,
		repr: Representation,
	) -> Self {
		let rows = level + 1 + if with_p { ctx.p_count() } else { 0 };
		Self {
			ctx: ctx.clone(),
			coeffs: vec![vec![0u64; ctx.degree()]; rows],
			q_rows: level + 1,
			repr,
		}
	}

	/// Builds a polynomial from explicit rows. The caller is responsible for
	/// row/modulus alignment; this is the escape hatch used by the
	/// key-switching and bootstrapping internals.
	pub fn from_rows(
		ctx: &Arc<RingContext>,
		coeffs: Vec<Vec<u64>>,
		q_rows: usize,
		repr: Representation,
	) -> Self {
		debug_assert!(q_rows <= coeffs.len());
		debug_assert!(coeffs.iter().all(|r| r.len() == ctx.degree()));
		Self {
			ctx: ctx.clone(),
			coeffs,
			q_rows,
			repr,
		}
	}

	/// Uniform polynomial; uniform residues per prime are a uniform ring
	/// element through the CRT bijection.
	pub fn uniform<R: RngCore + CryptoRng>(
		ctx: &Arc<RingContext>,
		level: usize,
		with_p: bool,
		rng: &mut R,
	) -> Self {
		let mut p = Self::zero(ctx, level, with_p, Representation::Ntt);
		for (row, m) in p.coeffs.iter_mut().zip(row_moduli(ctx, level, with_p)) {
			for c in row.iter_mut() {
				*c = rng.gen_range(0..m.value());
			}
		}
		p
	}

	/// Ternary polynomial with exactly `hamming` non-zero ±1 coefficients,
	/// in coefficient representation.
	pub fn ternary<R: RngCore + CryptoRng>(
		ctx: &Arc<RingContext>,
		level: usize,
		with_p: bool,
		hamming: usize,
		rng: &mut R,
	) -> Self {
		let n = ctx.degree();
		let mut signs = vec![0i64; n];
		let mut positions: Vec<usize> = (0..n).collect();
		positions.shuffle(rng);
		for &pos in positions.iter().take(hamming.min(n)) {
			signs[pos] = if rng.gen::<bool>() { 1 } else { -1 };
		}
		Self::from_signed(ctx, &signs, level, with_p)
	}

	/// Discrete Gaussian polynomial with standard deviation `sigma`,
	/// in coefficient representation.
	pub fn gaussian<R: RngCore + CryptoRng>(
		ctx: &Arc<RingContext>,
		level: usize,
		with_p: bool,
		sigma: f64,
		rng: &mut R,
	) -> Self {
		let normal = rand_distr::Normal::new(0.0, sigma).expect("valid sigma");
		let bound = (6.0 * sigma).ceil() as i64;
		let signs: Vec<i64> = (0..ctx.degree())
			.map(|_| (normal.sample(rng).round() as i64).clamp(-bound, bound))
			.collect();
		Self::from_signed(ctx, &signs, level, with_p)
	}

	/// Builds a polynomial from small signed coefficients.
	pub fn from_signed(
		ctx: &Arc<RingContext>,
		values: &[i64],
		level: usize,
		with_p: bool,
	) -> Self {
		let mut p = Self::zero(ctx, level, with_p, Representation::Coefficient);
		for (row, m) in p.coeffs.iter_mut().zip(row_moduli(ctx, level, with_p)) {
			for (c, &v) in row.iter_mut().zip(values) {
				*c = m.reduce_i64(v);
			}
		}
		p
	}

	/// Builds a polynomial from (possibly large) signed integer coefficients
	/// via per-prime reduction.
	pub fn from_bigint(
		ctx: &Arc<RingContext>,
		values: &[BigInt],
		level: usize,
		with_p: bool,
	) -> Self {
		let mut p = Self::zero(ctx, level, with_p, Representation::Coefficient);
		for (row, m) in p.coeffs.iter_mut().zip(row_moduli(ctx, level, with_p)) {
			let q = BigInt::from(m.value());
			for (c, v) in row.iter_mut().zip(values) {
				let mut r = v % &q;
				if r.is_negative() {
					r += &q;
				}
				*c = r.to_u64().expect("reduced residue fits u64");
			}
		}
		p
	}

	/// Reconstructs the balanced integer coefficients through the CRT.
	/// Requires coefficient representation and no P rows.
	pub fn to_bigint(&self) -> Result<Vec<BigInt>> {
		if self.repr != Representation::Coefficient || self.has_p() {
			return Err(Error::RepresentationMismatch);
		}
		let level = self.level();
		let q = self.ctx.q_product(level);
		let half = &q / 2u32;
		let mut rec = vec![BigUint::zero(); self.ctx.degree()];
		for (i, row) in self.coeffs.iter().enumerate() {
			let qi = self.ctx.modulus(i).value();
			let q_over_qi = &q / qi;
			let inv = self
				.ctx
				.modulus(i)
				.inv((&q_over_qi % qi).to_u64().expect("residue fits u64"))?;
			for (r, &c) in rec.iter_mut().zip(row) {
				let term = (&q_over_qi * self.ctx.modulus(i).mul(c, inv)) % &q;
				*r = (&*r + term) % &q;
			}
		}
		Ok(rec
			.into_iter()
			.map(|v| {
				if v > half {
					BigInt::from(v) - BigInt::from(q.clone())
				} else {
					BigInt::from(v)
				}
			})
			.collect())
	}

	/// The ring context this polynomial lives in.
	pub fn context(&self) -> &Arc<RingContext> {
		&self.ctx
	}

	/// The level (number of Q rows minus one).
	pub fn level(&self) -> usize {
		self.q_rows - 1
	}

	/// Whether the auxiliary P rows are attached.
	pub fn has_p(&self) -> bool {
		self.coeffs.len() > self.q_rows
	}

	/// Current representation.
	pub fn representation(&self) -> Representation {
		self.repr
	}

	/// Borrow a coefficient row (Q rows first, then P rows).
	pub fn row(&self, i: usize) -> &[u64] {
		&self.coeffs[i]
	}

	/// Mutably borrow a coefficient row.
	pub fn row_mut(&mut self, i: usize) -> &mut [u64] {
		&mut self.coeffs[i]
	}

	/// Total number of rows.
	pub fn rows(&self) -> usize {
		self.coeffs.len()
	}

	/// The global modulus index backing row `i`: Q rows map to themselves,
	/// P rows map past the end of the Q chain.
	fn global_row(&self, i: usize) -> usize {
		if i < self.q_rows {
			i
		} else {
			self.ctx.q_count() + (i - self.q_rows)
		}
	}

	/// Switches to NTT representation (no-op when already there).
	pub fn to_ntt(&mut self) {
		if self.repr == Representation::Ntt {
			return;
		}
		let ctx = self.ctx.clone();
		for i in 0..self.coeffs.len() {
			ctx.ntt(self.global_row(i)).forward(&mut self.coeffs[i]);
		}
		self.repr = Representation::Ntt;
	}

	/// Switches to coefficient representation (no-op when already there).
	pub fn to_coeff(&mut self) {
		if self.repr == Representation::Coefficient {
			return;
		}
		let ctx = self.ctx.clone();
		for i in 0..self.coeffs.len() {
			ctx.ntt(self.global_row(i)).inverse(&mut self.coeffs[i]);
		}
		self.repr = Representation::Coefficient;
	}

	fn check_compatible(&self, other: &Self) -> Result<()> {
		if !Arc::ptr_eq(&self.ctx, &other.ctx) {
			return Err(Error::IncompatibleParameters);
		}
		if self.q_rows != other.q_rows || self.has_p() != other.has_p() {
			return Err(Error::LevelMismatch(self.level(), other.level()));
		}
		if self.repr != other.repr {
			return Err(Error::RepresentationMismatch);
		}
		Ok(())
	}

	/// `self += other`.
	pub fn add_assign(&mut self, other: &Self) -> Result<()> {
		self.check_compatible(other)?;
		for (i, (row, orow)) in self.coeffs.iter_mut().zip(&other.coeffs).enumerate() {
			let m = *other.ctx.modulus(other.global_row(i));
			for (c, &o) in row.iter_mut().zip(orow) {
				*c = m.add(*c, o);
			}
		}
		Ok(())
	}

	/// `self -= other`.
	pub fn sub_assign(&mut self, other: &Self) -> Result<()> {
		self.check_compatible(other)?;
		for (i, (row, orow)) in self.coeffs.iter_mut().zip(&other.coeffs).enumerate() {
			let m = *other.ctx.modulus(other.global_row(i));
			for (c, &o) in row.iter_mut().zip(orow) {
				*c = m.sub(*c, o);
			}
		}
		Ok(())
	}

	/// `self = -self`.
	pub fn neg_assign(&mut self) {
		for i in 0..self.coeffs.len() {
			let m = *self.ctx.modulus(self.global_row(i));
			for c in self.coeffs[i].iter_mut() {
				*c = m.neg(*c);
			}
		}
	}

	/// Pointwise product; both operands must be in NTT representation.
	pub fn mul_assign(&mut self, other: &Self) -> Result<()> {
		self.check_compatible(other)?;
		if self.repr != Representation::Ntt {
			return Err(Error::RepresentationMismatch);
		}
		for (i, (row, orow)) in self.coeffs.iter_mut().zip(&other.coeffs).enumerate() {
			let m = *other.ctx.modulus(other.global_row(i));
			for (c, &o) in row.iter_mut().zip(orow) {
				*c = m.mul(*c, o);
			}
		}
		Ok(())
	}

	/// Fused `self += a * b` (all NTT).
	pub fn add_product_assign(&mut self, a: &Self, b: &Self) -> Result<()> {
		self.check_compatible(a)?;
		a.check_compatible(b)?;
		if self.repr != Representation::Ntt {
			return Err(Error::RepresentationMismatch);
		}
		for (i, (row, arow, brow)) in
			izip!(self.coeffs.iter_mut(), &a.coeffs, &b.coeffs).enumerate()
		{
			let m = *a.ctx.modulus(a.global_row(i));
			for (c, &x, &y) in izip!(row.iter_mut(), arow, brow) {
				*c = m.add(*c, m.mul(x, y));
			}
		}
		Ok(())
	}

	/// Multiplies every row by an integer scalar.
	pub fn mul_scalar_assign(&mut self, scalar: u64) {
		for i in 0..self.coeffs.len() {
			let m = *self.ctx.modulus(self.global_row(i));
			let s = m.reduce(scalar);
			for c in self.coeffs[i].iter_mut() {
				*c = m.mul(*c, s);
			}
		}
	}

	/// Multiplies every row by a (possibly signed, possibly large) scalar.
	pub fn mul_scalar_bigint_assign(&mut self, scalar: &BigInt) {
		for i in 0..self.coeffs.len() {
			let m = *self.ctx.modulus(self.global_row(i));
			let q = BigInt::from(m.value());
			let mut r = scalar % &q;
			if r.is_negative() {
				r += &q;
			}
			let s = r.to_u64().expect("reduced residue fits u64");
			for c in self.coeffs[i].iter_mut() {
				*c = m.mul(*c, s);
			}
		}
	}

	/// Returns a copy restricted to the first `level + 1` Q rows, keeping the
	/// P rows when `keep_p` (and present).
	pub fn restrict(&self, level: usize, keep_p: bool) -> Self {
		debug_assert!(level <= self.level());
		let mut rows: Vec<Vec<u64>> = (0..=level).map(|i| self.coeffs[i].clone()).collect();
		if keep_p {
			for i in self.q_rows..self.coeffs.len() {
				rows.push(self.coeffs[i].clone());
			}
		}
		Self::from_rows(&self.ctx, rows, level + 1, self.repr)
	}

	/// Multiplies every row by the modular inverse of an integer scalar
	/// (exact; used for power-of-two corrections).
	pub fn mul_scalar_inv_assign(&mut self, scalar: u64) -> Result<()> {
		for i in 0..self.coeffs.len() {
			let m = *self.ctx.modulus(self.global_row(i));
			let s = m.inv(m.reduce(scalar))?;
			for c in self.coeffs[i].iter_mut() {
				*c = m.mul(*c, s);
			}
		}
		Ok(())
	}

	/// Applies the automorphism `X -> X^g` for an odd Galois element `g`.
	/// Round-trips through the coefficient domain when needed.
	pub fn automorphism(&self, g: u64) -> Self {
		let mut src = self.clone();
		let was_ntt = src.repr == Representation::Ntt;
		src.to_coeff();
		let n = self.ctx.degree();
		let two_n = 2 * n as u64;
		let mut out = Self::from_rows(
			&self.ctx,
			vec![vec![0u64; n]; src.coeffs.len()],
			src.q_rows,
			Representation::Coefficient,
		);
		for (i, (row, srow)) in out.coeffs.iter_mut().zip(&src.coeffs).enumerate() {
			let m = *self.ctx.modulus(self.global_row(i));
			for (idx, &c) in srow.iter().enumerate() {
				let j = (idx as u64 * g) % two_n;
				if j < n as u64 {
					row[j as usize] = c;
				} else {
					row[(j - n as u64) as usize] = m.neg(c);
				}
			}
		}
		if was_ntt {
			out.to_ntt();
		}
		out
	}

	/// Multiplies by the monomial `X^k` (negacyclic, `k` may be negative).
	pub fn mul_monomial(&self, k: i64) -> Self {
		let n = self.ctx.degree();
		let shift = k.rem_euclid(2 * n as i64) as usize;
		let mut src = self.clone();
		let was_ntt = src.repr == Representation::Ntt;
		src.to_coeff();
		let mut out = Self::from_rows(
			&self.ctx,
			vec![vec![0u64; n]; src.coeffs.len()],
			src.q_rows,
			Representation::Coefficient,
		);
		for (i, (row, srow)) in out.coeffs.iter_mut().zip(&src.coeffs).enumerate() {
			let m = *self.ctx.modulus(self.global_row(i));
			for (idx, &c) in srow.iter().enumerate() {
				let j = (idx + shift) % (2 * n);
				if j < n {
					row[j] = c;
				} else {
					row[j - n] = m.neg(c);
				}
			}
		}
		if was_ntt {
			out.to_ntt();
		}
		out
	}

	/// Drops the last Q row without rounding (level drop by modulus switch is
	/// handled by the evaluator; this is the raw truncation).
	pub fn drop_last_q(&mut self) {
		debug_assert!(!self.has_p());
		debug_assert!(self.q_rows > 1);
		self.coeffs.pop();
		self.q_rows -= 1;
	}

	/// Divides by the modulus of the final row with rounding, dropping that
	/// row. Works on P rows first when attached, so repeated application
	/// realises both rescaling and the key-switching mod-down.
	/// Requires coefficient representation.
	pub fn div_round_by_last_row(&mut self) -> Result<()> {
		if self.repr != Representation::Coefficient {
			return Err(Error::RepresentationMismatch);
		}
		if self.coeffs.len() < 2 {
			return Err(Error::LevelTooLow { level: 0, min: 1 });
		}
		let last = self.coeffs.pop().expect("row count checked");
		let last_global = self.global_row(self.coeffs.len());
		let ql = self.ctx.modulus(last_global).value();
		let half = ql >> 1;
		for i in 0..self.coeffs.len() {
			let m = *self.ctx.modulus(self.global_row(i));
			let ql_mod = m.reduce(ql);
			let inv = m.inv(ql_mod)?;
			for (c, &r) in self.coeffs[i].iter_mut().zip(&last) {
				// Balanced representative of the dropped row.
				let mut r_mod = m.reduce(r);
				if r > half {
					r_mod = m.sub(r_mod, ql_mod);
				}
				*c = m.mul(m.sub(*c, r_mod), inv);
			}
		}
		if !self.has_p() && self.coeffs.len() < self.q_rows {
			self.q_rows = self.coeffs.len();
		}
		Ok(())
	}

	/// Removes all P rows by repeated rounded division (the key-switching
	/// mod-down). Requires coefficient representation.
	pub fn div_round_by_p(&mut self) -> Result<()> {
		while self.has_p() {
			self.div_round_by_last_row()?;
		}
		Ok(())
	}

	/// Extends a level-0 polynomial to `target_level` by lifting the
	/// balanced representative of each coefficient (the ModUp primitive).
	/// Requires coefficient representation.
	pub fn expand_from_first(&mut self, target_level: usize) -> Result<()> {
		if self.repr != Representation::Coefficient || self.q_rows != 1 || self.has_p() {
			return Err(Error::RepresentationMismatch);
		}
		let q0 = self.ctx.modulus(0).value();
		let half = q0 >> 1;
		let first = self.coeffs[0].clone();
		for j in 1..=target_level {
			let m = *self.ctx.modulus(j);
			let row = first
				.iter()
				.map(|&c| {
					if c > half {
						m.neg(m.reduce(q0 - c))
					} else {
						m.reduce(c)
					}
				})
				.collect();
			self.coeffs.push(row);
		}
		self.q_rows = target_level + 1;
		Ok(())
	}
}

fn row_moduli<'a>(
	ctx: &'a Arc<RingContext>,
	level: usize,
	with_p: bool,
) -> impl Iterator<Item = &'a crate::modulus::Modulus> {
	let p_range = if with_p {
		ctx.q_count()..ctx.moduli().len()
	} else {
		0..0
	};
	ctx.moduli()[..=level].iter().chain(ctx.moduli()[p_range].iter())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::modulus::NttPrimeGenerator;
	use rand::SeedableRng;
	use rand_chacha::ChaCha8Rng;

	fn ctx(n: usize, q_count: usize, p_count: usize) -> Arc<RingContext> {
		let mut g = NttPrimeGenerator::new(45, 2 * n as u64).unwrap();
		let q: Vec<u64> = (0..q_count).map(|_| g.next_alternating().unwrap()).collect();
		let p: Vec<u64> = (0..p_count).map(|_| g.next_alternating().unwrap()).collect();
		Arc::new(RingContext::new(&q, &p, n).unwrap())
	}

	#[test]
	fn bigint_round_trip() {
		let ctx = ctx(32, 3, 0);
		let values: Vec<BigInt> = (0..32)
			.map(|i| BigInt::from((i as i64 - 16) * 123456789))
			.collect();
		let p = Poly::from_bigint(&ctx, &values, 2, false);
		assert_eq!(p.to_bigint().unwrap(), values);
	}

	#[test]
	fn ntt_round_trip_preserves_poly() {
		let ctx = ctx(32, 2, 1);
		let mut rng = ChaCha8Rng::seed_from_u64(1);
		let p = Poly::uniform(&ctx, 1, true, &mut rng);
		let mut q = p.clone();
		q.to_coeff();
		q.to_ntt();
		assert_eq!(p, q);
	}

	#[test]
	fn automorphism_composes_to_identity() {
		let ctx = ctx(32, 2, 0);
		let mut rng = ChaCha8Rng::seed_from_u64(2);
		let p = Poly::uniform(&ctx, 1, false, &mut rng);
		let g = ctx.galois_element(3);
		let g_inv = ctx.galois_element(-3);
		assert_eq!(p.automorphism(g).automorphism(g_inv), p);
	}

	#[test]
	fn monomial_multiplication_wraps_negacyclically() {
		let ctx = ctx(32, 1, 0);
		let values: Vec<i64> = (0..32).map(|i| i as i64).collect();
		let p = Poly::from_signed(&ctx, &values, 0, false);
		let shifted = p.mul_monomial(32);
		// X^N = -1, so shifting by N negates.
		let mut neg = p.clone();
		neg.neg_assign();
		assert_eq!(shifted, neg);
		assert_eq!(p.mul_monomial(5).mul_monomial(-5), p);
	}

	#[test]
	fn div_round_divides_by_last_prime() {
		let ctx = ctx(32, 2, 0);
		let q1 = ctx.modulus(1).value();
		let value = BigInt::from(q1) * 7 + 3; // rounds to 7
		let mut values = vec![BigInt::from(0); 32];
		values[0] = value;
		values[5] = BigInt::from(q1) * -4 + BigInt::from(q1 / 2 + 1); // rounds up to -3
		let mut p = Poly::from_bigint(&ctx, &values, 1, false);
		p.div_round_by_last_row().unwrap();
		let rec = p.to_bigint().unwrap();
		assert_eq!(rec[0], BigInt::from(7));
		assert_eq!(rec[5], BigInt::from(-3));
		assert_eq!(rec[1], BigInt::from(0));
	}

	#[test]
	fn expand_from_first_lifts_balanced() {
		let ctx = ctx(32, 3, 0);
		let q0 = ctx.modulus(0).value();
		let mut p = Poly::zero(&ctx, 0, false, Representation::Coefficient);
		p.row_mut(0)[0] = 5;
		p.row_mut(0)[1] = q0 - 5; // balanced -5
		p.expand_from_first(2).unwrap();
		let rec = p.to_bigint().unwrap();
		assert_eq!(rec[0], BigInt::from(5));
		assert_eq!(rec[1], BigInt::from(-5));
	}
}
