//! Homomorphic application of planned DFT matrices.

use std::collections::HashMap;

use ckks::{Ciphertext, Evaluator, GaloisKey};
use tracing::trace;

use super::{DftMatrix, DftType};
use crate::error::{Error, KeyKind, Result};

/// Applies [`DftMatrix`] plans to ciphertexts, including the real/imaginary
/// split and repack around the slot-wise phase of the pipeline.
#[derive(Debug, Clone)]
pub struct DftEvaluator {
	evaluator: Evaluator,
}

impl DftEvaluator {
	/// Creates the evaluator over the bootstrapping parameter set.
	pub fn new(evaluator: &Evaluator) -> Self {
		Self {
			evaluator: evaluator.clone(),
		}
	}

	fn galois_key<'a>(
		&self,
		keys: &'a HashMap<u64, GaloisKey>,
		rotation: i64,
	) -> Result<&'a GaloisKey> {
		let element = self.evaluator.parameters().ring().galois_element(rotation);
		keys.get(&element).ok_or(Error::KeyMissing(KeyKind::Galois))
	}

	fn conjugation_key<'a>(
		&self,
		keys: &'a HashMap<u64, GaloisKey>,
	) -> Result<&'a GaloisKey> {
		let element = self
			.evaluator
			.parameters()
			.ring()
			.galois_element_conjugation();
		keys.get(&element).ok_or(Error::KeyMissing(KeyKind::Galois))
	}

	/// Applies every sub-matrix of the plan in scheduled order, preserving
	/// the input scale.
	pub fn apply_matrix(
		&self,
		ct: &Ciphertext,
		matrix: &DftMatrix,
		galois_keys: &HashMap<u64, GaloisKey>,
	) -> Result<Ciphertext> {
		let eval = &self.evaluator;
		let mut working = ct.clone();
		let input_scale = ct.scale;
		for sub in matrix.sub_matrices() {
			if working.level() != sub.level {
				return Err(Error::LevelInconsistency(
					"ciphertext level does not match the scheduled sub-matrix",
				));
			}
			// Hoist the baby-step rotations once.
			let mut rotated: HashMap<usize, Ciphertext> = HashMap::new();
			for (&(_, baby), _) in sub.diagonals.iter() {
				if !rotated.contains_key(&baby) {
					let r = if baby == 0 {
						working.clone()
					} else {
						eval.rotate(
							&working,
							baby as i64,
							self.galois_key(galois_keys, baby as i64)?,
						)?
					};
					rotated.insert(baby, r);
				}
			}
			// Accumulate per giant step, then rotate the partial sums.
			let mut giants: Vec<usize> = sub.diagonals.keys().map(|&(g, _)| g).collect();
			giants.sort_unstable();
			giants.dedup();
			let mut out: Option<Ciphertext> = None;
			for &giant in &giants {
				let mut inner: Option<Ciphertext> = None;
				for (&(g, baby), pt) in sub.diagonals.iter() {
					if g != giant {
						continue;
					}
					let term = eval.mul_plain(&rotated[&baby], pt)?;
					inner = Some(match inner {
						Some(acc) => eval.add(&acc, &term)?,
						None => term,
					});
				}
				let mut inner = inner.expect("giant has at least one diagonal");
				if giant != 0 {
					inner = eval.rotate(
						&inner,
						giant as i64,
						self.galois_key(galois_keys, giant as i64)?,
					)?;
				}
				out = Some(match out {
					Some(acc) => eval.add(&acc, &inner)?,
					None => inner,
				});
			}
			let mut next = out.expect("sub-matrix has diagonals");
			eval.rescale_by(&mut next, sub.rescale_count)?;
			// The diagonal scale is the exact product of the dropped primes.
			next.scale = input_scale;
			working = next;
			trace!(level = working.level(), "applied DFT sub-matrix");
		}
		Ok(working)
	}

	/// CoeffsToSlots: exposes the (bit-reversed) coefficient pairs in the
	/// slot domain. Returns two ciphertexts (real, imaginary) for the fully
	/// packed layout, or a single repacked real‖imag ciphertext for sparse
	/// layouts.
	pub fn coeffs_to_slots(
		&self,
		ct: &Ciphertext,
		matrix: &DftMatrix,
		galois_keys: &HashMap<u64, GaloisKey>,
	) -> Result<(Ciphertext, Option<Ciphertext>)> {
		if matrix.literal().dft_type != DftType::HomomorphicEncode {
			return Err(Error::ParameterCompatibility(
				"coeffs-to-slots needs a homomorphic encode matrix",
			));
		}
		let eval = &self.evaluator;
		let ct_u = self.apply_matrix(ct, matrix, galois_keys)?;
		let conj_key = self.conjugation_key(galois_keys)?;
		let conj = eval.conjugate(&ct_u, conj_key)?;

		// Slot-wise split; the 1/2 sits in the matrix diagonals, so only
		// integer operations touch the ciphertext.
		let ct_real = eval.add(&ct_u, &conj)?;
		let ct_imag = eval.div_by_i(&eval.sub(&ct_u, &conj)?);

		let sparse = matrix.literal().log_slots < eval.parameters().log_max_slots();
		if sparse {
			// Pack the imaginary half above the real half.
			let n = 1i64 << matrix.literal().log_slots;
			let rotated = eval.rotate(&ct_imag, -n, self.galois_key(galois_keys, -n)?)?;
			let mut packed = eval.add(&ct_real, &rotated)?;
			packed.log_slots = matrix.literal().log_slots + 1;
			Ok((packed, None))
		} else {
			Ok((ct_real, Some(ct_imag)))
		}
	}

	/// SlotsToCoeffs: returns slot values (in the interior bit-reversed
	/// order produced by [`Self::coeffs_to_slots`]) to the coefficient
	/// domain.
	pub fn slots_to_coeffs(
		&self,
		ct_real: &Ciphertext,
		ct_imag: Option<&Ciphertext>,
		matrix: &DftMatrix,
		galois_keys: &HashMap<u64, GaloisKey>,
	) -> Result<Ciphertext> {
		if matrix.literal().dft_type != DftType::HomomorphicDecode {
			return Err(Error::ParameterCompatibility(
				"slots-to-coeffs needs a homomorphic decode matrix",
			));
		}
		let eval = &self.evaluator;
		let input = match ct_imag {
			Some(imag) => {
				let i_imag = eval.mul_by_i(imag);
				eval.add(ct_real, &i_imag)?
			}
			// The sparse de-interleaving is folded into the first
			// sub-matrix of the plan.
			None => ct_real.clone(),
		};
		let mut out = self.apply_matrix(&input, matrix, galois_keys)?;
		out.log_slots = matrix.literal().log_slots;
		Ok(out)
	}
}
