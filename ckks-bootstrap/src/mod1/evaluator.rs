//! Homomorphic evaluation of the x-mod-1 approximation.

use ckks::{chebyshev_depth, evaluate_chebyshev, Ciphertext, Evaluator, RelinearizationKey};
use num_complex::Complex64;
use tracing::trace;

use super::Mod1Parameters;
use crate::error::Result;

/// Evaluates compiled [`Mod1Parameters`] on ciphertexts.
#[derive(Debug, Clone)]
pub struct Mod1Evaluator {
	evaluator: Evaluator,
}

impl Mod1Evaluator {
	/// Creates the evaluator over the bootstrapping parameter set.
	pub fn new(evaluator: &Evaluator) -> Self {
		Self {
			evaluator: evaluator.clone(),
		}
	}

	/// Evaluates `x mod 1` (times the optional complex `scaling`) on a
	/// ciphertext whose slot values lie in `[-K, K]`.
	///
	/// The input scale is reinterpreted to the Mod1 scaling factor on entry
	/// and restored on exit, as the surrounding pipeline expects; the
	/// operation consumes exactly [`Mod1Parameters::depth`] levels.
	pub fn evaluate(
		&self,
		ct: &Ciphertext,
		mod1: &Mod1Parameters,
		scaling: Option<Complex64>,
		rlk: &RelinearizationKey,
	) -> Result<Ciphertext> {
		let eval = &self.evaluator;
		let params = eval.parameters();
		let original_scale = ct.scale;
		let sc_fac = mod1.sc_fac();
		let double_angle = mod1.literal().double_angle;

		let mut working = ct.clone();
		eval.drop_to_level(&mut working, mod1.level_q())?;
		working.scale = mod1.scaling_factor();

		// Work the target scale backwards through the double-angle levels so
		// the chain lands exactly on the scaling factor.
		let poly_out_level = mod1.level_q() - chebyshev_depth(mod1.mod1_poly().degree());
		let mut target = mod1.scaling_factor();
		for i in (0..double_angle).rev() {
			target = (target * params.q()[poly_out_level - i] as f64).sqrt();
		}

		let scaling = scaling.unwrap_or(Complex64::new(1.0, 0.0));
		let has_inv = mod1.mod1_inv_poly().is_some();
		// With an arcsine stage the trigonometric stage stays at unit
		// amplitude; the user scaling then folds into the arcsine instead.
		let trig_factor = if has_inv {
			Complex64::new(1.0, 0.0)
		} else {
			scaling.powf(1.0 / sc_fac)
		};

		let is_cos = double_angle > 0 || {
			use super::Mod1Type;
			mod1.literal().mod1_type != Mod1Type::SinContinuous
		};
		if is_cos {
			// Reinterpret to u = x / sc_fac and centre the cosine.
			working.scale *= sc_fac;
			working = eval.add_const(&working, Complex64::new(-0.25 / sc_fac, 0.0))?;
		}

		let poly = mod1.mod1_poly().scale_coeffs(trig_factor);
		let mut y = evaluate_chebyshev(eval, &working, &poly, rlk, target)?;
		trace!(level = y.level(), scale = y.scale, "mod1 polynomial evaluated");

		let mut s = Complex64::new(mod1.sqrt_2pi(), 0.0) * trig_factor;
		for _ in 0..double_angle {
			s = s * s;
			let sq = eval.square_relin(&y, rlk)?;
			let mut dbl = eval.add(&sq, &sq)?;
			dbl = eval.add_const(&dbl, -s)?;
			eval.rescale(&mut dbl)?;
			y = dbl;
		}
		y.scale = mod1.scaling_factor();

		if let Some(inv) = mod1.mod1_inv_poly() {
			let inv = inv.scale_coeffs(scaling);
			y = evaluate_chebyshev(eval, &y, &inv, rlk, mod1.scaling_factor())?;
		}

		debug_assert_eq!(y.level(), mod1.level_q() - mod1.depth());
		y.scale = original_scale;
		Ok(y)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::mod1::{Mod1ParametersLiteral, Mod1Type};
	use ckks::{
		CkksParametersBuilder, Decryptor, Encoder, Encryptor, KeyGenerator,
	};
	use rand::{Rng, SeedableRng};
	use rand_chacha::ChaCha8Rng;

	#[test]
	fn homomorphic_mod1_reduces_integers() {
		let literal = Mod1ParametersLiteral {
			mod1_type: Mod1Type::CosContinuous,
			log_scale: 60,
			k: 16,
			mod1_degree: 30,
			double_angle: 3,
			log_message_ratio: 8,
			mod1_inv_degree: 0,
		};
		let params = CkksParametersBuilder::new()
			.set_log_n(8)
			.set_log_q(vec![55, 60, 60, 60, 60, 60, 60, 60, 60, 60])
			.set_log_p(vec![61])
			.set_log_default_scale(60)
			.build()
			.unwrap();
		let level_q = params.max_level();
		let mod1 = Mod1Parameters::new(&params, &literal, level_q).unwrap();
		assert!(mod1.depth() <= level_q);

		let mut rng = ChaCha8Rng::seed_from_u64(21);
		let keygen = KeyGenerator::new(&params);
		let sk = keygen.gen_secret_key(&mut rng);
		let rlk = keygen.gen_relinearization_key(&sk, &mut rng).unwrap();
		let encoder = Encoder::new(&params);
		let encryptor = Encryptor::new(&params, &sk);
		let decryptor = Decryptor::new(&params, &sk);
		let evaluator = Evaluator::new(&params);
		let mod1_eval = Mod1Evaluator::new(&evaluator);

		// Values of the shape integer + small message, as after ModUp.
		let slots = params.max_slots();
		let values: Vec<Complex64> = (0..slots)
			.map(|_| {
				let integer = rng.gen_range(-12i64..=12) as f64;
				let message = rng.gen_range(-0.5..0.5) * 2f64.powi(-8);
				Complex64::new(integer + message, 0.0)
			})
			.collect();
		let pt = encoder
			.encode(&values, level_q, mod1.scaling_factor(), params.log_max_slots())
			.unwrap();
		let ct = encryptor.encrypt(&pt, &mut rng).unwrap();

		let out = mod1_eval.evaluate(&ct, &mod1, None, &rlk).unwrap();
		assert_eq!(out.level(), level_q - mod1.depth());

		let decoded = decryptor.decrypt_decode(&out, &encoder).unwrap();
		let c = 1.0 / (2.0 * std::f64::consts::PI);
		for (d, v) in decoded.iter().zip(&values) {
			let frac = v.re - v.re.round();
			let expected = c * (2.0 * std::f64::consts::PI * frac).sin();
			assert!(
				(d.re - expected).abs() < 1e-4,
				"{} vs {expected}",
				d.re
			);
		}
	}
}
