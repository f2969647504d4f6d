//! Parameters for the homomorphic modular reduction `x mod 1`.

use ckks::{chebyshev_depth, ChebyshevPoly, CkksParameters};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub mod evaluator;

pub use evaluator::Mod1Evaluator;

/// The approximation family used for the modular reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mod1Type {
	/// Cosine interpolated over the discrete interval grid; requires
	/// `mod1_degree >= 2(K - 1)`.
	CosDiscrete,
	/// Sine approximated over the continuous interval; excludes double-angle
	/// lifting.
	SinContinuous,
	/// Cosine approximated over the continuous interval.
	CosContinuous,
}

/// The serialisable specification of the x-mod-1 polynomial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mod1ParametersLiteral {
	/// The approximation family.
	pub mod1_type: Mod1Type,
	/// log2 of the evaluation scale.
	pub log_scale: usize,
	/// Half-interval `K` of the approximation `[-K, K]`.
	pub k: usize,
	/// Degree of the main approximation.
	pub mod1_degree: usize,
	/// Number of double-angle squarings (0 for `SinContinuous`).
	pub double_angle: usize,
	/// log2 of the ratio `q0 / |m|`.
	pub log_message_ratio: usize,
	/// Degree of the arcsine correction (0 disables it).
	pub mod1_inv_degree: usize,
}

impl Default for Mod1ParametersLiteral {
	fn default() -> Self {
		Self {
			mod1_type: Mod1Type::CosDiscrete,
			log_scale: 60,
			k: 16,
			mod1_degree: 30,
			double_angle: 3,
			log_message_ratio: 8,
			mod1_inv_degree: 0,
		}
	}
}

/// Compiled parameters for one homomorphic modular reduction, produced by
/// [`Mod1Parameters::new`] from a literal and the bootstrapping parameter
/// set.
#[derive(Debug, Clone)]
pub struct Mod1Parameters {
	literal: Mod1ParametersLiteral,
	level_q: usize,
	scaling_factor: f64,
	sc_fac: f64,
	q_diff: f64,
	sqrt_2pi: f64,
	mod1_poly: ChebyshevPoly,
	mod1_inv_poly: Option<ChebyshevPoly>,
}

impl Mod1Parameters {
	/// Compiles the literal against the bootstrapping parameters, with the
	/// evaluation entering at `level_q`.
	pub fn new(
		params: &CkksParameters,
		literal: &Mod1ParametersLiteral,
		level_q: usize,
	) -> Result<Self> {
		if literal.k < 2 || literal.mod1_degree == 0 {
			return Err(Error::ParameterCompatibility(
				"mod-1 interval and degree must be positive",
			));
		}
		if literal.mod1_type == Mod1Type::SinContinuous && literal.double_angle != 0 {
			return Err(Error::DoubleAngleMisuse);
		}
		if literal.mod1_type == Mod1Type::CosDiscrete
			&& literal.mod1_degree < 2 * (literal.k - 1)
		{
			return Err(Error::Mod1DegreeTooSmall {
				degree: literal.mod1_degree,
				min: 2 * (literal.k - 1),
			});
		}

		let sc_fac = 2f64.powi(literal.double_angle as i32);
		let k_shrunk = literal.k as f64 / sc_fac;
		let q0 = params.q()[0] as f64;
		let q_diff = q0 / 2f64.powf(q0.log2().round());
		if (literal.log_scale as f64) < q0.log2().round() {
			return Err(Error::ParameterCompatibility(
				"mod-1 scale must cover the base prime",
			));
		}
		// Folding the q0 correction into the scaling factor makes the wrap
		// period exact: values reinterpreted at this scale are integer plus
		// message, so the trigonometric amplitude needs no correction.
		let scaling_factor = 2f64.powi(literal.log_scale as i32) * q_diff;

		// With an arcsine correction the trigonometric stage works at unit
		// amplitude and the correction restores the 1/(2π) factor.
		let amplitude_final = if literal.mod1_inv_degree == 0 {
			1.0 / (2.0 * std::f64::consts::PI)
		} else {
			1.0
		};
		let sqrt_2pi = amplitude_final.powf(1.0 / sc_fac);

		let mod1_poly = match literal.mod1_type {
			Mod1Type::SinContinuous => {
				let target =
					|x: f64| amplitude_final * (2.0 * std::f64::consts::PI * x).sin();
				let mut p = chebyshev_interpolate(&target, literal.k as f64, literal.mod1_degree);
				zero_parity(&mut p, 0);
				ChebyshevPoly::from_real(&p, literal.k as f64)
			}
			Mod1Type::CosDiscrete | Mod1Type::CosContinuous => {
				let target = |u: f64| sqrt_2pi * (2.0 * std::f64::consts::PI * u).cos();
				let mut p = chebyshev_interpolate(&target, k_shrunk + 0.25, literal.mod1_degree);
				zero_parity(&mut p, 1);
				ChebyshevPoly::from_real(&p, k_shrunk + 0.25)
			}
		};

		let mod1_inv_poly = if literal.mod1_inv_degree == 0 {
			None
		} else {
			let c = 1.0 / (2.0 * std::f64::consts::PI);
			let mut monomial = vec![0.0f64; literal.mod1_inv_degree + 1];
			monomial[1] = c;
			let mut j = 3usize;
			while j <= literal.mod1_inv_degree {
				monomial[j] =
					monomial[j - 2] * ((j - 2) * (j - 2)) as f64 / (j * (j - 1)) as f64;
				j += 2;
			}
			let cheb = power_to_chebyshev(&monomial);
			Some(ChebyshevPoly::from_real(&cheb, 1.0))
		};

		Ok(Self {
			literal: literal.clone(),
			level_q,
			scaling_factor,
			sc_fac,
			q_diff,
			sqrt_2pi,
			mod1_poly,
			mod1_inv_poly,
		})
	}

	/// The literal this was compiled from.
	pub fn literal(&self) -> &Mod1ParametersLiteral {
		&self.literal
	}

	/// The level the evaluation enters at.
	pub fn level_q(&self) -> usize {
		self.level_q
	}

	/// The evaluation scale.
	pub fn scaling_factor(&self) -> f64 {
		self.scaling_factor
	}

	/// `2^double_angle`.
	pub fn sc_fac(&self) -> f64 {
		self.sc_fac
	}

	/// The correction factor `q0 / 2^round(log2 q0)`.
	pub fn q_diff(&self) -> f64 {
		self.q_diff
	}

	/// The amplitude threaded through the double-angle chain.
	pub fn sqrt_2pi(&self) -> f64 {
		self.sqrt_2pi
	}

	/// The main approximation polynomial.
	pub fn mod1_poly(&self) -> &ChebyshevPoly {
		&self.mod1_poly
	}

	/// The arcsine correction, when configured.
	pub fn mod1_inv_poly(&self) -> Option<&ChebyshevPoly> {
		self.mod1_inv_poly.as_ref()
	}

	/// log2 of `q0 / |m|`.
	pub fn log_message_ratio(&self) -> usize {
		self.literal.log_message_ratio
	}

	/// Levels the full modular reduction consumes.
	pub fn depth(&self) -> usize {
		let mut depth = chebyshev_depth(self.mod1_poly.degree());
		depth += self.literal.double_angle;
		if let Some(inv) = &self.mod1_inv_poly {
			depth += chebyshev_depth(inv.degree());
		}
		depth
	}
}

/// Chebyshev interpolation of `f` over `[-interval, interval]` at the given
/// degree (degree + 1 nodes).
pub fn chebyshev_interpolate(
	f: &impl Fn(f64) -> f64,
	interval: f64,
	degree: usize,
) -> Vec<f64> {
	let nodes = degree + 1;
	let samples: Vec<f64> = (0..nodes)
		.map(|m| {
			let t = (std::f64::consts::PI * (m as f64 + 0.5) / nodes as f64).cos();
			f(interval * t)
		})
		.collect();
	(0..nodes)
		.map(|j| {
			let factor = if j == 0 { 1.0 } else { 2.0 } / nodes as f64;
			factor
				* (0..nodes)
					.map(|m| {
						samples[m]
							* (std::f64::consts::PI * j as f64 * (m as f64 + 0.5)
								/ nodes as f64)
								.cos()
					})
					.sum::<f64>()
		})
		.collect()
}

/// Zeroes the coefficients of the given parity (0 zeroes even indices).
fn zero_parity(coeffs: &mut [f64], parity: usize) {
	for (j, c) in coeffs.iter_mut().enumerate() {
		if j % 2 == parity {
			*c = 0.0;
		}
	}
}

/// Converts monomial-basis coefficients to the Chebyshev basis on `[-1, 1]`.
pub fn power_to_chebyshev(monomial: &[f64]) -> Vec<f64> {
	let degree = monomial.len() - 1;
	let mut cheb = vec![0.0f64; degree + 1];
	// x^n = 2^{1-n} Σ'' C(n, (n-k)/2) T_k over k ≡ n (mod 2), halving k = 0.
	for (n, &a) in monomial.iter().enumerate() {
		if a == 0.0 {
			continue;
		}
		if n == 0 {
			cheb[0] += a;
			continue;
		}
		let scale = 2f64.powi(1 - n as i32);
		let mut k = n as i64;
		while k >= 0 {
			let m = (n as i64 - k) / 2;
			let weight = binomial(n, m as usize) * scale * if k == 0 { 0.5 } else { 1.0 };
			cheb[k as usize] += a * weight;
			k -= 2;
		}
	}
	cheb
}

fn binomial(n: usize, k: usize) -> f64 {
	let mut r = 1.0f64;
	for i in 0..k {
		r = r * (n - i) as f64 / (i + 1) as f64;
	}
	r
}

#[cfg(test)]
mod tests {
	use super::*;
	use ckks::CkksParametersBuilder;

	fn params() -> CkksParameters {
		CkksParametersBuilder::new()
			.set_log_n(8)
			.set_log_q(vec![55, 45, 45])
			.set_log_default_scale(45)
			.build()
			.unwrap()
	}

	#[test]
	fn chebyshev_interpolation_reproduces_cosine() {
		let f = |x: f64| (2.0 * std::f64::consts::PI * x).cos();
		let coeffs = chebyshev_interpolate(&f, 2.25, 30);
		let p = ChebyshevPoly::from_real(&coeffs, 2.25);
		for i in 0..40 {
			let x = -2.2 + 4.4 * i as f64 / 39.0;
			assert!((p.eval(x).re - f(x)).abs() < 1e-5, "x = {x}");
		}
	}

	#[test]
	fn power_basis_conversion() {
		// x^3 = (3 T_1 + T_3) / 4.
		let cheb = power_to_chebyshev(&[0.0, 0.0, 0.0, 1.0]);
		assert!((cheb[1] - 0.75).abs() < 1e-12);
		assert!((cheb[3] - 0.25).abs() < 1e-12);
		// Constant passes through.
		let c = power_to_chebyshev(&[2.5]);
		assert_eq!(c[0], 2.5);
	}

	#[test]
	fn cos_discrete_requires_minimum_degree() {
		let literal = Mod1ParametersLiteral {
			mod1_degree: 10,
			k: 16,
			..Default::default()
		};
		let err = Mod1Parameters::new(&params(), &literal, 2).unwrap_err();
		assert!(matches!(err, Error::Mod1DegreeTooSmall { min: 30, .. }));
	}

	#[test]
	fn sin_continuous_rejects_double_angle() {
		let literal = Mod1ParametersLiteral {
			mod1_type: Mod1Type::SinContinuous,
			double_angle: 2,
			..Default::default()
		};
		let err = Mod1Parameters::new(&params(), &literal, 2).unwrap_err();
		assert_eq!(err, Error::DoubleAngleMisuse);
	}

	#[test]
	fn builder_parity_and_depth() {
		let literal = Mod1ParametersLiteral::default();
		let mod1 = Mod1Parameters::new(&params(), &literal, 14).unwrap();
		// Cosine approximation keeps only even coefficients.
		for (j, c) in mod1.mod1_poly().coeffs.iter().enumerate() {
			if j % 2 == 1 {
				assert_eq!(c.norm(), 0.0);
			}
		}
		assert_eq!(
			mod1.depth(),
			chebyshev_depth(mod1.mod1_poly().degree()) + 3
		);

		let with_inv = Mod1Parameters::new(
			&params(),
			&Mod1ParametersLiteral {
				mod1_inv_degree: 7,
				..Default::default()
			},
			14,
		)
		.unwrap();
		assert!(with_inv.mod1_inv_poly().is_some());
		assert!(with_inv.depth() > mod1.depth());
	}

	#[test]
	fn double_angle_identity_holds_for_the_built_polynomial() {
		// Evaluating the built cosine at u then applying the double-angle
		// chain must approximate sin(2πx)/(2π) · q_diff at x = sc_fac·u + 1/4.
		let literal = Mod1ParametersLiteral::default();
		let mod1 = Mod1Parameters::new(&params(), &literal, 14).unwrap();
		let sc = mod1.sc_fac();
		let c = 1.0 / (2.0 * std::f64::consts::PI);
		for &x in &[-2.0f64, -0.5, 0.0, 0.25, 1.0, 3.0] {
			let u = (x - 0.25) / sc;
			let mut y = mod1.mod1_poly().eval(u).re;
			let mut s = mod1.sqrt_2pi();
			for _ in 0..literal.double_angle {
				s = s * s;
				y = 2.0 * y * y - s;
			}
			let expected = c * (2.0 * std::f64::consts::PI * x).sin();
			assert!((y - expected).abs() < 1e-3, "x = {x}: {y} vs {expected}");
		}
	}
}
