//! Chebyshev-basis polynomials and their homomorphic evaluation.
//!
//! The evaluator builds the power basis `T_j` lazily through the recurrence
//! `T_{a+b} = 2 T_a T_b - T_{|a-b|}`, tracking every intermediate scale
//! explicitly, and folds the coefficients in with a single rescaled linear
//! combination. The level budget is [`chebyshev_depth`] and is shared with
//! every parameter builder that must predict it.

use std::collections::HashMap;

use num_complex::Complex64;

use crate::ciphertext::Ciphertext;
use crate::error::{Error, Result};
use crate::evaluator::Evaluator;
use crate::key_generator::RelinearizationKey;

/// A polynomial in the Chebyshev basis over a symmetric interval `[-k, k]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChebyshevPoly {
	/// Chebyshev coefficients, `coeffs[j]` weighting `T_j`.
	pub coeffs: Vec<Complex64>,
	/// Half-width of the approximation interval.
	pub interval: f64,
}

impl ChebyshevPoly {
	/// Creates a polynomial from real coefficients.
	pub fn from_real(coeffs: &[f64], interval: f64) -> Self {
		Self {
			coeffs: coeffs.iter().map(|&c| Complex64::new(c, 0.0)).collect(),
			interval,
		}
	}

	/// The degree (index of the last non-zero coefficient).
	pub fn degree(&self) -> usize {
		self.coeffs
			.iter()
			.rposition(|c| c.norm() != 0.0)
			.unwrap_or(0)
	}

	/// Evaluates the polynomial at a scalar by the Clenshaw recurrence,
	/// mapping the argument from `[-interval, interval]` to `[-1, 1]`.
	pub fn eval(&self, x: f64) -> Complex64 {
		let u = x / self.interval;
		let mut b1 = Complex64::new(0.0, 0.0);
		let mut b2 = Complex64::new(0.0, 0.0);
		for &c in self.coeffs.iter().skip(1).rev() {
			let b0 = c + 2.0 * u * b1 - b2;
			b2 = b1;
			b1 = b0;
		}
		self.coeffs.first().copied().unwrap_or_default() + u * b1 - b2
	}

	/// Multiplies every coefficient by a complex factor.
	pub fn scale_coeffs(&self, factor: Complex64) -> Self {
		Self {
			coeffs: self.coeffs.iter().map(|c| c * factor).collect(),
			interval: self.interval,
		}
	}
}

/// The number of levels [`evaluate_chebyshev`] consumes for a polynomial of
/// the given degree.
pub fn chebyshev_depth(degree: usize) -> usize {
	if degree <= 1 {
		1
	} else {
		(usize::BITS - (degree - 1).leading_zeros()) as usize + 1
	}
}

/// Evaluates `poly` on a ciphertext whose values lie inside the polynomial's
/// interval, producing a ciphertext at `target_scale`.
///
/// Consumes exactly [`chebyshev_depth`]`(poly.degree())` levels.
pub fn evaluate_chebyshev(
	eval: &Evaluator,
	ct: &Ciphertext,
	poly: &ChebyshevPoly,
	rlk: &RelinearizationKey,
	target_scale: f64,
) -> Result<Ciphertext> {
	let degree = poly.degree();
	if degree == 0 {
		return Err(Error::InvalidArgument(
			"constant polynomials have no homomorphic evaluation",
		));
	}
	let depth = chebyshev_depth(degree);
	ct.ensure_level(depth)?;

	// The symmetric interval folds into the scale: declaring the scale
	// `interval` times larger reinterprets the values on [-1, 1].
	let mut base = ct.clone();
	base.scale *= poly.interval;

	let mut powers = PowerBasis::new(eval, rlk, base);
	let mut used: Vec<usize> = (1..=degree).filter(|&j| poly.coeffs[j].norm() != 0.0).collect();
	if used.is_empty() {
		used.push(1);
	}
	for &j in &used {
		powers.gen(j)?;
	}

	// Fold the coefficients at the level of the deepest power.
	let floor_level = used
		.iter()
		.map(|j| powers.get(*j).level())
		.min()
		.expect("at least one power");
	let q_floor = eval.parameters().q()[floor_level] as f64;
	let sum_scale = target_scale * q_floor;

	let mut acc: Option<Ciphertext> = None;
	for &j in &used {
		let t = powers.get(j).clone();
		let mut t = eval.to_level(&t, floor_level);
		let ratio = sum_scale / t.scale;
		t = eval.mul_const(&t, poly.coeffs[j], ratio)?;
		acc = Some(match acc {
			Some(a) => eval.add(&a, &t)?,
			None => t,
		});
	}
	let mut acc = acc.expect("non-empty combination");
	if poly.coeffs[0].norm() != 0.0 {
		acc = eval.add_const(&acc, poly.coeffs[0])?;
	}
	eval.rescale(&mut acc)?;
	// Rounding in the f64 ledger cancels here by construction.
	acc.scale = target_scale;
	Ok(acc)
}

struct PowerBasis<'a> {
	eval: &'a Evaluator,
	rlk: &'a RelinearizationKey,
	powers: HashMap<usize, Ciphertext>,
}

impl<'a> PowerBasis<'a> {
	fn new(eval: &'a Evaluator, rlk: &'a RelinearizationKey, base: Ciphertext) -> Self {
		let mut powers = HashMap::new();
		powers.insert(1usize, base);
		Self { eval, rlk, powers }
	}

	fn get(&self, j: usize) -> &Ciphertext {
		&self.powers[&j]
	}

	/// Ensures `T_j` exists, recursing through `T_{a+b} = 2 T_a T_b - T_{|a-b|}`.
	fn gen(&mut self, j: usize) -> Result<()> {
		if self.powers.contains_key(&j) {
			return Ok(());
		}
		let a = j / 2 + j % 2;
		let b = j / 2;
		self.gen(a)?;
		self.gen(b)?;
		let diff = a - b;
		if diff > 0 {
			self.gen(diff)?;
		}

		let x = self.powers[&a].clone();
		let y = self.powers[&b].clone();
		let level = x.level().min(y.level());
		let x = self.eval.to_level(&x, level);
		let y = self.eval.to_level(&y, level);
		let mut prod = self.eval.mul_relin(&x, &y, self.rlk)?;
		prod = self.eval.add(&prod, &prod)?;
		self.eval.rescale(&mut prod)?;

		if diff == 0 {
			prod = self.eval.add_const(&prod, Complex64::new(-1.0, 0.0))?;
		} else {
			let t = self.powers[&diff].clone();
			// Bring T_{a-b} to the product's level and scale exactly.
			let t = self.eval.to_level(&t, prod.level() + 1);
			let q = self.eval.parameters().q()[prod.level() + 1] as f64;
			let ratio = prod.scale * q / t.scale;
			let mut t = self.eval.mul_const(&t, Complex64::new(1.0, 0.0), ratio)?;
			self.eval.rescale(&mut t)?;
			t.scale = prod.scale;
			prod = self.eval.sub(&prod, &t)?;
		}
		self.powers.insert(j, prod);
		Ok(())
	}
}
