//! Planning of the homomorphic DFT matrices (CoeffsToSlots and
//! SlotsToCoeffs).
//!
//! The special FFT factorises into radix-2 butterfly stages of three
//! diagonals each. Merged sub-matrices are products of consecutive stages in
//! diagonal form; the explicit bit reversal of the plain transform is left
//! out, so the interior of the pipeline runs in bit-reversed slot order and
//! the permutations cancel around the slot-wise modular reduction. For
//! sparse layouts the transform runs over the doubled dimension `2n`, and
//! SlotsToCoeffs folds the real‖imag de-interleaving (mask plus rotated
//! imaginary part) into its first sub-matrix.

use std::collections::BTreeMap;

use ckks::{CkksParameters, Encoder, Plaintext};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

pub mod evaluator;

pub use evaluator::DftEvaluator;

/// Direction of a homomorphic DFT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DftType {
	/// CoeffsToSlots: the inverse special FFT, exposing coefficients in the
	/// slot domain.
	HomomorphicEncode,
	/// SlotsToCoeffs: the forward special FFT, returning slot values to the
	/// coefficient domain.
	HomomorphicDecode,
}

/// Layout of the real and imaginary halves through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DftFormat {
	/// The imaginary part is carried in the upper half of the coefficient
	/// vector (the only supported format).
	RepackImagAsReal,
}

impl Default for DftFormat {
	fn default() -> Self {
		DftFormat::RepackImagAsReal
	}
}

/// The serialisable description of one homomorphic DFT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DftMatrixLiteral {
	/// Transform direction.
	pub dft_type: DftType,
	/// log2 of the encoded slot count.
	pub log_slots: usize,
	/// Real/imaginary layout.
	#[serde(default)]
	pub format: DftFormat,
	/// The level the first sub-matrix consumes from.
	pub level_q: usize,
	/// The auxiliary level the matrices key-switch at (carried for
	/// introspection; keys always span the full P chain).
	pub level_p: usize,
	/// One entry per merged sub-matrix: the number of butterfly radices it
	/// merges, which is also the number of rescalings it consumes.
	pub levels: Vec<usize>,
	/// Baby-step/giant-step balance knob.
	pub log_bsgs_ratio: usize,
	/// Optional scalar folded into the first sub-matrix's diagonals.
	#[serde(default)]
	pub scaling: Option<f64>,
	/// Whether the interior slot order is bit-reversed. Only `true` is
	/// supported; the flag records the convention in serialised parameters.
	#[serde(default = "default_bit_reversed")]
	pub bit_reversed: bool,
}

fn default_bit_reversed() -> bool {
	true
}

impl DftMatrixLiteral {
	/// Total levels the transform consumes.
	pub fn depth(&self) -> usize {
		self.levels.iter().sum()
	}
}

/// A diagonal-form linear map over `Z_dim`.
pub type DiagMap = BTreeMap<usize, Vec<Complex64>>;

/// One merged, encoded sub-matrix with its BSGS split.
#[derive(Debug, Clone)]
pub struct SubMatrix {
	/// The level the input ciphertext arrives at.
	pub level: usize,
	/// Rescalings this sub-matrix consumes.
	pub rescale_count: usize,
	/// The baby-step modulus of the BSGS split.
	pub n1: usize,
	/// Encoded diagonals: `(giant, baby) -> plaintext`, each diagonal
	/// pre-rotated by its negated giant step.
	pub diagonals: BTreeMap<(usize, usize), Plaintext>,
}

/// A fully planned homomorphic DFT.
#[derive(Debug, Clone)]
pub struct DftMatrix {
	literal: DftMatrixLiteral,
	/// The logical transform dimension (doubled for sparse repacking).
	log_dim: usize,
	sub_matrices: Vec<SubMatrix>,
	rotations: Vec<i64>,
}

impl DftMatrix {
	/// Plans and encodes the transform described by `literal` over the
	/// bootstrapping parameters.
	pub fn new(
		params: &CkksParameters,
		encoder: &Encoder,
		literal: &DftMatrixLiteral,
	) -> Result<Self> {
		let (log_dim, groups) = plan_groups(params, literal)?;
		let dim = 1usize << log_dim;

		// BSGS planning and diagonal encoding per group.
		let mut sub_matrices = Vec::with_capacity(groups.len());
		let mut rotations: Vec<i64> = Vec::new();
		let mut level = literal.level_q;
		for (map, &merge) in groups.iter().zip(&literal.levels) {
			let indices: Vec<usize> = map.keys().copied().collect();
			let n1 = find_best_bsgs_split(&indices, dim, literal.log_bsgs_ratio);
			let mut scale = 1.0f64;
			for j in 0..merge {
				scale *= params.q()[level - j] as f64;
			}
			let mut diagonals = BTreeMap::new();
			for (&d, v) in map.iter() {
				let baby = d % n1;
				let giant = d - baby;
				// Pre-rotate by the negated giant step so the evaluator can
				// rotate the whole inner sum at once.
				let rotated: Vec<Complex64> =
					(0..dim).map(|i| v[(i + dim - giant) % dim]).collect();
				let pt = encoder.encode(&rotated, level, scale, log_dim)?;
				diagonals.insert((giant, baby), pt);
				if baby != 0 && !rotations.contains(&(baby as i64)) {
					rotations.push(baby as i64);
				}
				if giant != 0 && !rotations.contains(&(giant as i64)) {
					rotations.push(giant as i64);
				}
			}
			debug!(
				n1,
				diagonals = map.len(),
				level,
				merge,
				"planned DFT sub-matrix"
			);
			sub_matrices.push(SubMatrix {
				level,
				rescale_count: merge,
				n1,
				diagonals,
			});
			level -= merge;
		}

		Ok(Self {
			literal: literal.clone(),
			log_dim,
			sub_matrices,
			rotations,
		})
	}

	/// The literal this matrix was planned from.
	pub fn literal(&self) -> &DftMatrixLiteral {
		&self.literal
	}

	/// log2 of the logical transform dimension.
	pub fn log_dim(&self) -> usize {
		self.log_dim
	}

	/// The merged sub-matrices in application order.
	pub fn sub_matrices(&self) -> &[SubMatrix] {
		&self.sub_matrices
	}

	/// The rotation amounts the evaluation requires (excluding conjugation
	/// and the repack rotation, which depend on the surrounding circuit).
	pub fn rotations(&self) -> &[i64] {
		&self.rotations
	}
}

/// Validates a literal and builds its merged diagonal-form sub-matrices in
/// application order, returning `(log_dim, groups)`.
fn plan_groups(
	params: &CkksParameters,
	literal: &DftMatrixLiteral,
) -> Result<(usize, Vec<DiagMap>)> {
	if !literal.bit_reversed {
		return Err(Error::ParameterCompatibility(
			"only the bit-reversed interior convention is supported",
		));
	}
	if literal.log_slots > params.log_max_slots() {
		return Err(Error::ParameterCompatibility(
			"log_slots exceeds the ring capacity",
		));
	}
	let sparse = literal.log_slots < params.log_max_slots();
	let log_dim = literal.log_slots + usize::from(sparse);
	if literal.levels.is_empty() || literal.levels.iter().any(|&l| l == 0) {
		return Err(Error::ParameterCompatibility(
			"factorisation entries must be positive",
		));
	}
	if literal.depth() != log_dim {
		return Err(Error::ParameterCompatibility(
			"factorisation depth must cover every butterfly radix",
		));
	}
	if literal.level_q < literal.depth() || literal.level_q > params.max_level() {
		return Err(Error::ParameterCompatibility(
			"transform level does not fit the modulus chain",
		));
	}

	let dim = 1usize << log_dim;
	// Butterfly stages in application order.
	let stage_lens: Vec<usize> = match literal.dft_type {
		DftType::HomomorphicEncode => (1..=log_dim).rev().map(|k| 1 << k).collect(),
		DftType::HomomorphicDecode => (1..=log_dim).map(|k| 1 << k).collect(),
	};

	let mut groups: Vec<DiagMap> = Vec::with_capacity(literal.levels.len());
	let mut cursor = 0usize;
	for &merge in &literal.levels {
		let mut acc: Option<DiagMap> = None;
		for &len in &stage_lens[cursor..cursor + merge] {
			let stage = butterfly_stage(literal.dft_type, dim, len);
			acc = Some(match acc {
				None => stage,
				Some(prev) => diag_map_mul(&stage, &prev, dim),
			});
		}
		groups.push(acc.expect("merge entries are positive"));
		cursor += merge;
	}

	// Intrinsic and user scaling fold into the first sub-matrix. The encode
	// direction carries the transform normalisation and the 1/2 of the
	// conjugation split, which must never be divided out of an integer
	// ciphertext.
	let mut first_factor = literal.scaling.unwrap_or(1.0);
	if literal.dft_type == DftType::HomomorphicEncode {
		first_factor /= 2.0 * dim as f64;
	}
	if first_factor != 1.0 {
		if let Some(first) = groups.first_mut() {
			for v in first.values_mut() {
				for c in v.iter_mut() {
					*c *= first_factor;
				}
			}
		}
	}

	// The sparse de-interleaving folds into the first decode sub-matrix:
	// mask the lower half and add i times the rotation by n.
	if sparse && literal.dft_type == DftType::HomomorphicDecode {
		let n = 1usize << literal.log_slots;
		let mut unpack: DiagMap = BTreeMap::new();
		let mut lower = vec![Complex64::new(0.0, 0.0); dim];
		let mut upper = vec![Complex64::new(0.0, 0.0); dim];
		for r in 0..n {
			lower[r] = Complex64::new(1.0, 0.0);
			upper[r] = Complex64::new(0.0, 1.0);
		}
		unpack.insert(0, lower);
		unpack.insert(n, upper);
		let first = groups.first().expect("at least one sub-matrix");
		groups[0] = diag_map_mul(first, &unpack, dim);
	}
	Ok((log_dim, groups))
}

/// Computes the rotation amounts a literal's evaluation will need, without
/// encoding any diagonals; used to derive the Galois element set.
pub fn plan_rotations(params: &CkksParameters, literal: &DftMatrixLiteral) -> Result<Vec<i64>> {
	let (log_dim, groups) = plan_groups(params, literal)?;
	let dim = 1usize << log_dim;
	let mut rotations: Vec<i64> = Vec::new();
	for map in &groups {
		let indices: Vec<usize> = map.keys().copied().collect();
		let n1 = find_best_bsgs_split(&indices, dim, literal.log_bsgs_ratio);
		for &d in &indices {
			let baby = d % n1;
			let giant = d - baby;
			if baby != 0 && !rotations.contains(&(baby as i64)) {
				rotations.push(baby as i64);
			}
			if giant != 0 && !rotations.contains(&(giant as i64)) {
				rotations.push(giant as i64);
			}
		}
	}
	Ok(rotations)
}

/// The three-diagonal map of one radix-2 butterfly stage.
fn butterfly_stage(dft_type: DftType, dim: usize, len: usize) -> DiagMap {
	let lenh = len / 2;
	let lenq = (len as u64) << 2;
	let twiddles: Vec<Complex64> = {
		let mut exp = 1u64;
		(0..lenh)
			.map(|_| {
				let w = root_of_unity(exp, lenq);
				exp = exp * 5 % lenq;
				w
			})
			.collect()
	};
	let mut diag0 = vec![Complex64::new(0.0, 0.0); dim];
	let mut diag_lenh = vec![Complex64::new(0.0, 0.0); dim];
	let mut diag_back = vec![Complex64::new(0.0, 0.0); dim];
	for r in 0..dim {
		let j = r % len;
		match dft_type {
			DftType::HomomorphicEncode => {
				// out_lo = in_lo + in_hi; out_hi = (in_lo - in_hi) * conj(w).
				if j < lenh {
					diag0[r] = Complex64::new(1.0, 0.0);
					diag_lenh[r] = Complex64::new(1.0, 0.0);
				} else {
					let w = twiddles[j - lenh].conj();
					diag0[r] = -w;
					diag_back[r] = w;
				}
			}
			DftType::HomomorphicDecode => {
				// out_lo = in_lo + w * in_hi; out_hi = in_lo - w * in_hi.
				if j < lenh {
					diag0[r] = Complex64::new(1.0, 0.0);
					diag_lenh[r] = twiddles[j];
				} else {
					diag0[r] = -twiddles[j - lenh];
					diag_back[r] = Complex64::new(1.0, 0.0);
				}
			}
		}
	}
	let mut map = BTreeMap::new();
	map.insert(0, diag0);
	if lenh == dim - lenh {
		// The two off-diagonals coincide at distance dim/2 and act on
		// disjoint rows; merge them by summation.
		let merged: Vec<Complex64> = diag_lenh
			.iter()
			.zip(&diag_back)
			.map(|(a, b)| a + b)
			.collect();
		map.insert(lenh, merged);
	} else {
		map.insert(lenh, diag_lenh);
		map.insert(dim - lenh, diag_back);
	}
	map
}

fn root_of_unity(k: u64, m: u64) -> Complex64 {
	let angle = 2.0 * std::f64::consts::PI * k as f64 / m as f64;
	Complex64::new(angle.cos(), angle.sin())
}

/// Multiplies two diagonal-form maps: the result applies `b` first, then `a`.
pub fn diag_map_mul(a: &DiagMap, b: &DiagMap, dim: usize) -> DiagMap {
	let mut out: DiagMap = BTreeMap::new();
	for (&da, va) in a {
		for (&db, vb) in b {
			let d = (da + db) % dim;
			let entry = out
				.entry(d)
				.or_insert_with(|| vec![Complex64::new(0.0, 0.0); dim]);
			for r in 0..dim {
				entry[r] += va[r] * vb[(r + da) % dim];
			}
		}
	}
	out.retain(|_, v| v.iter().any(|c| c.norm() > 1e-12));
	out
}

/// Applies a diagonal-form map to a plain vector.
pub fn apply_diag_map(map: &DiagMap, v: &[Complex64]) -> Vec<Complex64> {
	let dim = v.len();
	let mut out = vec![Complex64::new(0.0, 0.0); dim];
	for (&d, diag) in map {
		for r in 0..dim {
			out[r] += diag[r] * v[(r + d) % dim];
		}
	}
	out
}

/// Deterministically selects the baby-step modulus `N1 | dim` minimising the
/// weighted rotation count `babySteps + giantSteps << log_ratio`, preferring
/// the smallest `N1` on ties.
pub fn find_best_bsgs_split(diag_indices: &[usize], dim: usize, log_ratio: usize) -> usize {
	let mut best = (usize::MAX, 1usize);
	let mut n1 = 1usize;
	while n1 <= dim {
		let mut babies: Vec<usize> = diag_indices.iter().map(|d| d % n1).collect();
		babies.sort_unstable();
		babies.dedup();
		let mut giants: Vec<usize> = diag_indices.iter().map(|d| d - d % n1).collect();
		giants.sort_unstable();
		giants.dedup();
		let cost = babies.len() + (giants.len() << log_ratio);
		if cost < best.0 {
			best = (cost, n1);
		}
		n1 <<= 1;
	}
	best.1
}

#[cfg(test)]
mod tests {
	use super::*;
	use ckks::{bit_reverse_in_place, special_fft, special_inv_fft, CkksParametersBuilder};
	use rand::{Rng, SeedableRng};
	use rand_chacha::ChaCha8Rng;

	fn random_values(count: usize, seed: u64) -> Vec<Complex64> {
		let mut rng = ChaCha8Rng::seed_from_u64(seed);
		(0..count)
			.map(|_| Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
			.collect()
	}

	fn close(a: &[Complex64], b: &[Complex64], tol: f64) {
		for (i, (x, y)) in a.iter().zip(b).enumerate() {
			assert!((x - y).norm() < tol, "entry {i}: {x} vs {y}");
		}
	}

	/// The merged encode stages reproduce the plain inverse special FFT up
	/// to the (cancelled) bit reversal.
	#[test]
	fn encode_stages_match_inverse_fft() {
		let dim = 32usize;
		let stage_lens: Vec<usize> = (1..=5).rev().map(|k| 1 << k).collect();
		let mut v = random_values(dim, 1);
		let expected = {
			let mut u = v.clone();
			special_inv_fft(&mut u);
			bit_reverse_in_place(&mut u);
			// Undo the 1/dim normalisation: the stages alone are unscaled.
			u.iter().map(|c| c * dim as f64).collect::<Vec<_>>()
		};
		for &len in &stage_lens {
			let stage = butterfly_stage(DftType::HomomorphicEncode, dim, len);
			v = apply_diag_map(&stage, &v);
		}
		close(&v, &expected, 1e-9);
	}

	/// The merged decode stages reproduce the plain special FFT on
	/// bit-reversed input.
	#[test]
	fn decode_stages_match_forward_fft() {
		let dim = 32usize;
		let stage_lens: Vec<usize> = (1..=5).map(|k| 1 << k).collect();
		let input = random_values(dim, 2);
		let expected = {
			let mut u = input.clone();
			bit_reverse_in_place(&mut u);
			special_fft(&mut u);
			u
		};
		let mut v = input;
		for &len in &stage_lens {
			let stage = butterfly_stage(DftType::HomomorphicDecode, dim, len);
			v = apply_diag_map(&stage, &v);
		}
		close(&v, &expected, 1e-9);
	}

	/// Merging stages through diagonal-map products is exact.
	#[test]
	fn merged_groups_equal_stage_products() {
		let dim = 16usize;
		let lens: Vec<usize> = (1..=4).map(|k| 1 << k).collect();
		let v = random_values(dim, 3);
		let mut by_stages = v.clone();
		for &len in &lens {
			by_stages = apply_diag_map(
				&butterfly_stage(DftType::HomomorphicDecode, dim, len),
				&by_stages,
			);
		}
		// Merge pairs: (s2 * s1) then (s4 * s3).
		let g1 = diag_map_mul(
			&butterfly_stage(DftType::HomomorphicDecode, dim, lens[1]),
			&butterfly_stage(DftType::HomomorphicDecode, dim, lens[0]),
			dim,
		);
		let g2 = diag_map_mul(
			&butterfly_stage(DftType::HomomorphicDecode, dim, lens[3]),
			&butterfly_stage(DftType::HomomorphicDecode, dim, lens[2]),
			dim,
		);
		let merged = apply_diag_map(&g2, &apply_diag_map(&g1, &v));
		close(&merged, &by_stages, 1e-9);
	}

	#[test]
	fn bsgs_split_is_deterministic() {
		let diags: Vec<usize> = vec![0, 1, 2, 3, 15, 16, 17, 31];
		let a = find_best_bsgs_split(&diags, 32, 1);
		let b = find_best_bsgs_split(&diags, 32, 1);
		assert_eq!(a, b);
		assert!(a.is_power_of_two());
		// All indices decompose as giant + baby.
		for &d in &diags {
			assert!(d % a < a && (d - d % a) % a == 0);
		}
	}

	#[test]
	fn planner_validates_factorisation() {
		let params = CkksParametersBuilder::new()
			.set_log_n(6)
			.set_log_q(vec![50, 45, 45, 45, 45, 45, 45])
			.set_log_default_scale(45)
			.build()
			.unwrap();
		let encoder = Encoder::new(&params);
		let literal = DftMatrixLiteral {
			dft_type: DftType::HomomorphicDecode,
			log_slots: params.log_max_slots(),
			format: DftFormat::RepackImagAsReal,
			level_q: 5,
			level_p: 0,
			levels: vec![2, 2],
			log_bsgs_ratio: 1,
			scaling: None,
			bit_reversed: true,
		};
		// log_max_slots = 5 radices but only 4 covered.
		assert!(DftMatrix::new(&params, &encoder, &literal).is_err());

		let good = DftMatrixLiteral {
			levels: vec![2, 2, 1],
			..literal
		};
		let matrix = DftMatrix::new(&params, &encoder, &good).unwrap();
		assert_eq!(matrix.sub_matrices().len(), 3);
		assert_eq!(matrix.sub_matrices()[0].level, 5);
		assert_eq!(matrix.sub_matrices()[1].level, 3);
		assert_eq!(matrix.sub_matrices()[2].level, 1);
		assert!(!matrix.rotations().is_empty());
	}
}
