//! Composition of the full bootstrapping parameter set from a residual
//! CKKS instance and a bootstrapping literal.

use ckks::{
	CkksParameters, CkksParametersLiteral, PrimePool, RingType,
};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::dft::{plan_rotations, DftFormat, DftMatrixLiteral, DftType};
use crate::error::{Error, Result};
use crate::mod1::{Mod1Parameters, Mod1ParametersLiteral};

/// Levels one rescaling consumes in the RNS representation.
pub const LEVELS_PER_RESCALING: usize = 1;

/// META-BTS refinement targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationsParameters {
	/// log2 precision target of each successive iteration.
	pub bootstrapping_precision: Vec<usize>,
	/// Bit size of the reserved correction prime (0 disables it).
	pub reserved_prime_bit_size: usize,
}

/// Order of the modulus raise relative to the homomorphic encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitOrder {
	/// Raise the modulus first, then encode (the supported default).
	ModUpThenEncode,
	/// Decode first, then raise the modulus.
	DecodeThenModUp,
	/// Caller-managed ordering.
	Custom,
}

impl Default for CircuitOrder {
	fn default() -> Self {
		CircuitOrder::ModUpThenEncode
	}
}

impl Serialize for CircuitOrder {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		let v: u8 = match self {
			CircuitOrder::ModUpThenEncode => 0,
			CircuitOrder::DecodeThenModUp => 1,
			CircuitOrder::Custom => 2,
		};
		serializer.serialize_u8(v)
	}
}

impl<'de> Deserialize<'de> for CircuitOrder {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
		match u8::deserialize(deserializer)? {
			0 => Ok(CircuitOrder::ModUpThenEncode),
			1 => Ok(CircuitOrder::DecodeThenModUp),
			2 => Ok(CircuitOrder::Custom),
			other => Err(D::Error::custom(format!("unknown circuit order {other}"))),
		}
	}
}

/// User-facing overrides for the bootstrapping circuit; every `None`
/// resolves to the scheme defaults during [`Parameters::new`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BootstrappingParametersLiteral {
	/// log2 of the bootstrapping ring degree (defaults to 16, raised to the
	/// residual degree when that is larger).
	pub log_n: Option<usize>,
	/// Auxiliary prime bit sizes of the bootstrapping instance.
	pub log_p: Option<Vec<usize>>,
	/// Dense secret Hamming weight of the bootstrapping instance.
	pub xs_hamming_weight: Option<usize>,
	/// Hamming weight of the ephemeral sparse secret (0 disables the
	/// sparse encapsulation).
	pub ephemeral_secret_weight: Option<usize>,
	/// META-BTS refinement configuration.
	pub iterations: Option<IterationsParameters>,
	/// The x-mod-1 approximation.
	#[serde(default)]
	pub mod1: Mod1ParametersLiteral,
	/// CoeffsToSlots factorisation (radices merged per sub-matrix).
	pub coeffs_to_slots_levels: Option<Vec<usize>>,
	/// SlotsToCoeffs factorisation.
	pub slots_to_coeffs_levels: Option<Vec<usize>>,
	/// Bit size of the CoeffsToSlots primes.
	pub coeffs_to_slots_log_scale: Option<usize>,
	/// Bit size of the SlotsToCoeffs primes.
	pub slots_to_coeffs_log_scale: Option<usize>,
	/// Baby-step/giant-step balance of the DFT matrices.
	pub log_bsgs_ratio: Option<usize>,
	/// log2 of the bootstrapped slot count (defaults to the residual
	/// maximum).
	pub log_slots: Option<usize>,
	/// Pipeline ordering.
	#[serde(default)]
	pub circuit_order: CircuitOrder,
}

/// The complete, validated bootstrapping parameter set.
#[derive(Debug, Clone)]
pub struct Parameters {
	residual: CkksParameters,
	bootstrapping: CkksParameters,
	s2c: DftMatrixLiteral,
	mod1: Mod1ParametersLiteral,
	c2s: DftMatrixLiteral,
	iterations: Option<IterationsParameters>,
	ephemeral_secret_weight: usize,
	circuit_order: CircuitOrder,
	mod1_depth: usize,
}

impl PartialEq for Parameters {
	fn eq(&self, other: &Self) -> bool {
		self.residual == other.residual
			&& self.bootstrapping == other.bootstrapping
			&& self.s2c == other.s2c
			&& self.mod1 == other.mod1
			&& self.c2s == other.c2s
			&& self.iterations == other.iterations
			&& self.ephemeral_secret_weight == other.ephemeral_secret_weight
			&& self.circuit_order == other.circuit_order
	}
}

impl Parameters {
	/// Derives the full bootstrapping parameter set from the residual
	/// instance and the literal's overrides. The construction is
	/// deterministic: equal inputs produce bit-identical outputs.
	pub fn new(
		residual: &CkksParameters,
		literal: &BootstrappingParametersLiteral,
	) -> Result<Self> {
		if literal.circuit_order != CircuitOrder::ModUpThenEncode {
			return Err(Error::ParameterCompatibility(
				"only the mod-up-then-encode circuit order is implemented",
			));
		}
		let log_n = literal.log_n.unwrap_or(16).max(residual.log_n());
		let n_boot = 1usize << log_n;
		let log_p = literal.log_p.clone().unwrap_or_else(|| vec![61, 61]);
		let xs_hamming_weight = literal.xs_hamming_weight.unwrap_or(192);
		let ephemeral_secret_weight = literal.ephemeral_secret_weight.unwrap_or(32);
		let log_bsgs_ratio = literal.log_bsgs_ratio.unwrap_or(1);
		let c2s_log_scale = literal.coeffs_to_slots_log_scale.unwrap_or(56);
		let s2c_log_scale = literal.slots_to_coeffs_log_scale.unwrap_or(39);
		let log_slots = literal
			.log_slots
			.unwrap_or(residual.log_max_slots())
			.min(log_n - 1);

		// The congruence order every prime of the combined chain must obey.
		let residual_factor = match residual.ring_type() {
			RingType::ConjugateInvariant => 4,
			RingType::Standard => 2,
		};
		let nth_root = u64::max(2 * n_boot as u64, residual_factor * residual.n() as u64);
		for &q in residual.q() {
			if q % nth_root != 1 {
				return Err(Error::ParameterCompatibility(
					"residual prime is not congruent to 1 mod the bootstrap ring order",
				));
			}
		}

		// The base prime carries the message at the scaled-down ratio, so
		// its size must match the residual scale plus the message ratio.
		let q0 = residual.q()[0] as f64;
		let log_q0 = q0.log2().round() as usize;
		if log_q0 != residual.log_default_scale() + literal.mod1.log_message_ratio {
			return Err(Error::ParameterCompatibility(
				"base prime size must equal the residual scale plus the message ratio",
			));
		}

		let sparse = log_slots < log_n - 1;
		let log_dim = log_slots + usize::from(sparse);
		let c2s_levels = literal
			.coeffs_to_slots_levels
			.clone()
			.unwrap_or_else(|| vec![1; log_dim]);
		let s2c_levels = literal
			.slots_to_coeffs_levels
			.clone()
			.unwrap_or_else(|| vec![1; log_dim]);
		let depth_c2s: usize = c2s_levels.iter().sum();
		let depth_s2c: usize = s2c_levels.iter().sum();
		if depth_c2s != log_dim || depth_s2c != log_dim {
			return Err(Error::ParameterCompatibility(
				"DFT factorisation depth must cover every butterfly radix",
			));
		}

		// The polynomial shape fixes the Mod1 depth before any prime is
		// generated; build a probe against the residual base prime.
		let mod1_depth = Mod1Parameters::new(residual, &literal.mod1, 0)?.depth();

		let reserved_bits = literal
			.iterations
			.as_ref()
			.map_or(0, |it| it.reserved_prime_bit_size);

		// Assemble the bootstrapping chain: residual primes, then the
		// segment in reverse circuit order.
		let mut pool = PrimePool::new(nth_root);
		pool.reserve(residual.q());
		let exhausted = |_e: ckks::Error| Error::PrimePoolExhausted;
		let mut q = residual.q().to_vec();
		if reserved_bits > 0 {
			q.push(pool.take_one(reserved_bits).map_err(exhausted)?);
		}
		for _ in 0..depth_s2c {
			q.push(pool.take_one(s2c_log_scale).map_err(exhausted)?);
		}
		for _ in 0..mod1_depth {
			q.push(pool.take_one(literal.mod1.log_scale).map_err(exhausted)?);
		}
		for _ in 0..depth_c2s {
			q.push(pool.take_one(c2s_log_scale).map_err(exhausted)?);
		}
		let p = pool.take(&log_p).map_err(exhausted)?;

		let bootstrapping = CkksParameters::from_literal(CkksParametersLiteral {
			log_n,
			q,
			p,
			log_default_scale: literal.mod1.log_scale - literal.mod1.log_message_ratio,
			ring_type: RingType::Standard,
			xs_hamming_weight,
			xe_sigma: residual.xe_sigma(),
			nth_root,
			..Default::default()
		})?;

		let max_level = bootstrapping.max_level();
		let c2s = DftMatrixLiteral {
			dft_type: DftType::HomomorphicEncode,
			log_slots,
			format: DftFormat::RepackImagAsReal,
			level_q: max_level,
			level_p: bootstrapping.p().len() - 1,
			levels: c2s_levels,
			log_bsgs_ratio,
			scaling: None,
			bit_reversed: true,
		};
		// Folding the residual-scale restoration into the SlotsToCoeffs
		// diagonals lands the output at the residual default scale.
		let q_diff = q0 / 2f64.powf(q0.log2().round());
		let mod1_scaling_factor =
			2f64.powi(literal.mod1.log_scale as i32) * q_diff;
		let mut s2c_scaling = residual.default_scale()
			* 2f64.powi(literal.mod1.log_message_ratio as i32)
			/ mod1_scaling_factor;
		if residual.ring_type() == RingType::ConjugateInvariant {
			// The conjugate-invariant split doubles both halves on the way
			// out; halving here keeps the ciphertext arithmetic integral.
			s2c_scaling *= 0.5;
		}
		let s2c = DftMatrixLiteral {
			dft_type: DftType::HomomorphicDecode,
			log_slots,
			format: DftFormat::RepackImagAsReal,
			level_q: max_level - depth_c2s - mod1_depth,
			level_p: bootstrapping.p().len() - 1,
			levels: s2c_levels,
			log_bsgs_ratio,
			scaling: Some(s2c_scaling),
			bit_reversed: true,
		};

		let params = Self {
			residual: residual.clone(),
			bootstrapping,
			s2c,
			mod1: literal.mod1.clone(),
			c2s,
			iterations: literal.iterations.clone(),
			ephemeral_secret_weight,
			circuit_order: literal.circuit_order,
			mod1_depth,
		};
		params.validate_levels()?;
		debug!(
			log_n,
			max_level = params.bootstrapping.max_level(),
			mod1_depth,
			depth_c2s,
			depth_s2c,
			"bootstrapping parameters assembled"
		);
		Ok(params)
	}

	/// Checks the level invariants of the mod-up-then-encode order.
	fn validate_levels(&self) -> Result<()> {
		let c2s_out = self.c2s.level_q - self.c2s.depth();
		if c2s_out != self.mod1_level_q() {
			return Err(Error::ParameterCompatibility(
				"coeffs-to-slots output level must feed the modular reduction",
			));
		}
		if self.mod1_level_q() - self.mod1_depth != self.s2c.level_q {
			return Err(Error::ParameterCompatibility(
				"modular reduction output level must feed slots-to-coeffs",
			));
		}
		let expected = self.residual.max_level()
			+ usize::from(self.reserved_prime())
			+ self.s2c.depth();
		if self.s2c.level_q != expected {
			return Err(Error::ParameterCompatibility(
				"slots-to-coeffs level must sit on top of the residual chain",
			));
		}
		Ok(())
	}

	/// The residual parameter set.
	pub fn residual(&self) -> &CkksParameters {
		&self.residual
	}

	/// The bootstrapping parameter set.
	pub fn bootstrapping(&self) -> &CkksParameters {
		&self.bootstrapping
	}

	/// The CoeffsToSlots matrix literal.
	pub fn coeffs_to_slots(&self) -> &DftMatrixLiteral {
		&self.c2s
	}

	/// The SlotsToCoeffs matrix literal.
	pub fn slots_to_coeffs(&self) -> &DftMatrixLiteral {
		&self.s2c
	}

	/// The x-mod-1 literal.
	pub fn mod1(&self) -> &Mod1ParametersLiteral {
		&self.mod1
	}

	/// The level the modular reduction enters at.
	pub fn mod1_level_q(&self) -> usize {
		self.c2s.level_q - self.c2s.depth()
	}

	/// Levels the modular reduction consumes.
	pub fn mod1_depth(&self) -> usize {
		self.mod1_depth
	}

	/// The META-BTS configuration.
	pub fn iterations(&self) -> Option<&IterationsParameters> {
		self.iterations.as_ref()
	}

	/// Whether a reserved correction prime sits above the residual chain.
	pub fn reserved_prime(&self) -> bool {
		self.iterations
			.as_ref()
			.map_or(false, |it| it.reserved_prime_bit_size > 0)
	}

	/// The ephemeral sparse-secret Hamming weight (0 disables the
	/// encapsulation).
	pub fn ephemeral_secret_weight(&self) -> usize {
		self.ephemeral_secret_weight
	}

	/// The pipeline ordering.
	pub fn circuit_order(&self) -> CircuitOrder {
		self.circuit_order
	}

	/// Levels the whole circuit consumes.
	pub fn depth(&self) -> usize {
		self.bootstrapping.max_level() - self.residual.max_level()
	}

	/// The lowest level a ciphertext may enter the bootstrap at.
	pub fn minimum_input_level(&self) -> usize {
		LEVELS_PER_RESCALING - 1
	}

	/// The level bootstrapped ciphertexts come out at.
	pub fn output_level(&self) -> usize {
		self.residual.max_level()
	}

	/// log2 of the bootstrapped slot count.
	pub fn log_max_slots(&self) -> usize {
		self.c2s.log_slots
	}

	/// log2 of the plaintext matrix dimensions `(rows, cols)`.
	pub fn log_max_dimensions(&self) -> (usize, usize) {
		(0, self.log_max_slots())
	}

	/// The scaling factor of the modular reduction (the exact wrap period).
	pub fn mod1_scaling_factor(&self) -> f64 {
		let q0 = self.bootstrapping.q()[0] as f64;
		let q_diff = q0 / 2f64.powf(q0.log2().round());
		2f64.powi(self.mod1.log_scale as i32) * q_diff
	}

	/// The default scale ciphertexts carry between ModUp and the encode.
	pub fn bootstrapping_scale(&self) -> f64 {
		self.mod1_scaling_factor() / 2f64.powi(self.mod1.log_message_ratio as i32)
	}

	/// Every Galois element the circuit can require: the DFT rotations, the
	/// trace doublings, the sparse repack rotation and the conjugation.
	pub fn galois_elements(&self) -> Result<Vec<u64>> {
		let ring = self.bootstrapping.ring();
		let mut rotations: Vec<i64> = Vec::new();
		for literal in [&self.c2s, &self.s2c] {
			for k in plan_rotations(&self.bootstrapping, literal)? {
				if !rotations.contains(&k) {
					rotations.push(k);
				}
			}
		}
		let sparse = self.log_max_slots() < self.bootstrapping.log_max_slots();
		if sparse {
			let n = 1i64 << self.log_max_slots();
			if !rotations.contains(&(-n)) {
				rotations.push(-n);
			}
		}
		// Doubling rotations: the trace collapsing excess slots and the
		// grid projections of ciphertext unpacking.
		for t in 0..self.bootstrapping.log_max_slots() {
			let k = 1i64 << t;
			if !rotations.contains(&k) {
				rotations.push(k);
			}
		}
		let mut elements: Vec<u64> = rotations
			.into_iter()
			.map(|k| ring.galois_element(k))
			.collect();
		elements.push(ring.galois_element_conjugation());
		elements.sort_unstable();
		elements.dedup();
		Ok(elements)
	}

	/// Reconstructs a parameter set from its serialised projection.
	pub fn from_parts(parts: ParametersJson) -> Result<Self> {
		let residual = CkksParameters::from_literal(parts.residual_parameters)?;
		let bootstrapping = CkksParameters::from_literal(parts.bootstrapping_parameters)?;
		let mod1_depth =
			Mod1Parameters::new(&residual, &parts.mod1_parameters_literal, 0)?.depth();
		let params = Self {
			residual,
			bootstrapping,
			s2c: parts.slots_to_coeffs_parameters,
			mod1: parts.mod1_parameters_literal,
			c2s: parts.coeffs_to_slots_parameters,
			iterations: parts.iterations_parameters,
			ephemeral_secret_weight: parts.ephemeral_secret_weight,
			circuit_order: parts.circuit_order,
			mod1_depth,
		};
		params.validate_levels()?;
		Ok(params)
	}
}

/// The structural JSON projection of [`Parameters`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParametersJson {
	/// The residual instance literal.
	pub residual_parameters: CkksParametersLiteral,
	/// The bootstrapping instance literal.
	pub bootstrapping_parameters: CkksParametersLiteral,
	/// The SlotsToCoeffs literal.
	pub slots_to_coeffs_parameters: DftMatrixLiteral,
	/// The x-mod-1 literal.
	pub mod1_parameters_literal: Mod1ParametersLiteral,
	/// The CoeffsToSlots literal.
	pub coeffs_to_slots_parameters: DftMatrixLiteral,
	/// The META-BTS configuration.
	pub iterations_parameters: Option<IterationsParameters>,
	/// The ephemeral secret weight.
	pub ephemeral_secret_weight: usize,
	/// The circuit order (serialised as an integer).
	pub circuit_order: CircuitOrder,
}

impl Serialize for Parameters {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		ParametersJson {
			residual_parameters: self.residual.literal().clone(),
			bootstrapping_parameters: self.bootstrapping.literal().clone(),
			slots_to_coeffs_parameters: self.s2c.clone(),
			mod1_parameters_literal: self.mod1.clone(),
			coeffs_to_slots_parameters: self.c2s.clone(),
			iterations_parameters: self.iterations.clone(),
			ephemeral_secret_weight: self.ephemeral_secret_weight,
			circuit_order: self.circuit_order,
		}
		.serialize(serializer)
	}
}

impl<'de> Deserialize<'de> for Parameters {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
		let parts = ParametersJson::deserialize(deserializer)?;
		Parameters::from_parts(parts).map_err(D::Error::custom)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ckks::CkksParametersBuilder;

	fn residual_for_test(log_n: usize) -> CkksParameters {
		CkksParameters::from_literal(CkksParametersLiteral {
			log_n,
			log_q: vec![48, 40],
			log_p: vec![61],
			log_default_scale: 40,
			nth_root: 2 * (1u64 << log_n),
			..Default::default()
		})
		.unwrap()
	}

	fn small_literal(log_n_boot: usize) -> BootstrappingParametersLiteral {
		BootstrappingParametersLiteral {
			log_n: Some(log_n_boot),
			log_p: Some(vec![61]),
			xs_hamming_weight: Some(32),
			ephemeral_secret_weight: Some(8),
			mod1: Mod1ParametersLiteral {
				log_scale: 55,
				mod1_degree: 30,
				k: 16,
				double_angle: 3,
				log_message_ratio: 8,
				..Default::default()
			},
			..Default::default()
		}
	}

	#[test]
	fn builds_and_validates_invariants() {
		let residual = CkksParameters::from_literal(CkksParametersLiteral {
			log_n: 6,
			log_q: vec![48, 40],
			log_p: vec![61],
			log_default_scale: 40,
			nth_root: 2 * (1u64 << 6),
			..Default::default()
		})
		.unwrap();
		let params = Parameters::new(&residual, &small_literal(6)).unwrap();

		// P2: the stages chain level-exactly.
		assert_eq!(
			params.coeffs_to_slots().level_q - params.coeffs_to_slots().depth(),
			params.mod1_level_q()
		);
		assert_eq!(
			params.mod1_level_q() - params.mod1_depth(),
			params.slots_to_coeffs().level_q
		);
		// P3: slots-to-coeffs sits directly above the residual chain.
		assert_eq!(
			params.slots_to_coeffs().level_q,
			params.residual().max_level() + params.slots_to_coeffs().depth()
		);
		assert_eq!(params.output_level(), 1);
		assert_eq!(
			params.depth(),
			params.coeffs_to_slots().depth()
				+ params.mod1_depth()
				+ params.slots_to_coeffs().depth()
		);
		// The chain starts with the residual primes.
		assert_eq!(
			&params.bootstrapping().q()[..2],
			params.residual().q()
		);
		assert!(!params.galois_elements().unwrap().is_empty());
	}

	#[test]
	fn rejects_incompatible_residual_primes() {
		// A 48-bit prime congruent to 1 mod 2N for N = 64 but not for the
		// larger bootstrap ring order.
		let small_order = 128u64;
		let large_order = 2048u64;
		let mut k = 1u64;
		let q0 = loop {
			let candidate = (1u64 << 48) + small_order * k + 1;
			if k % (large_order / small_order) != 0 && ckks::is_prime(candidate) {
				break candidate;
			}
			k += 1;
		};
		assert_eq!(q0 % small_order, 1);
		assert_ne!(q0 % large_order, 1);

		let mut pool = PrimePool::new(small_order);
		pool.reserve(&[q0]);
		let q1 = pool.take_one(40).unwrap();
		let residual = CkksParameters::from_literal(CkksParametersLiteral {
			log_n: 6,
			q: vec![q0, q1],
			log_p: vec![61],
			log_default_scale: 40,
			nth_root: small_order,
			..Default::default()
		})
		.unwrap();
		let err = Parameters::new(&residual, &small_literal(10)).unwrap_err();
		assert!(matches!(err, Error::ParameterCompatibility(_)));
	}

	#[test]
	fn json_round_trip_is_identical() {
		let residual = residual_for_test(6);
		let params = Parameters::new(&residual, &small_literal(6)).unwrap();
		let json = serde_json::to_string(&params).unwrap();
		let back: Parameters = serde_json::from_str(&json).unwrap();
		assert_eq!(params, back);
		// Field names follow the structural projection.
		assert!(json.contains("\"ResidualParameters\""));
		assert!(json.contains("\"CircuitOrder\":0"));
	}

	#[test]
	fn reserved_prime_extends_the_chain() {
		let residual = residual_for_test(6);
		let mut literal = small_literal(6);
		let base = Parameters::new(&residual, &literal).unwrap();
		literal.iterations = Some(IterationsParameters {
			bootstrapping_precision: vec![20, 20],
			reserved_prime_bit_size: 28,
		});
		let params = Parameters::new(&residual, &literal).unwrap();
		assert!(params.reserved_prime());
		assert_eq!(
			params.bootstrapping().q().len(),
			base.bootstrapping().q().len() + 1
		);
		assert_eq!(
			params.slots_to_coeffs().level_q,
			base.slots_to_coeffs().level_q + 1
		);
	}
}
