use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::modulus::NttPrimeGenerator;
use crate::ring::RingContext;

/// The ring the scheme instantiates over.
///
/// Conjugate-invariant parameter sets share the power-of-two lattice with the
/// standard ring and constrain plaintexts to the real axis; the distinction
/// gates which bootstrap entry points accept the ciphertexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RingType {
	/// The standard power-of-two cyclotomic ring with N/2 complex slots.
	Standard,
	/// Real-axis plaintexts only.
	ConjugateInvariant,
}

impl Default for RingType {
	fn default() -> Self {
		RingType::Standard
	}
}

/// A plain, serialisable description of a CKKS parameter set.
///
/// Exactly one of `q`/`log_q` must be non-empty; the same holds for `p`/`log_p`
/// except that both may be empty when no key-switching primes are needed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CkksParametersLiteral {
	/// log2 of the ring degree.
	pub log_n: usize,
	/// Explicit ciphertext primes.
	#[serde(default)]
	pub q: Vec<u64>,
	/// Ciphertext prime bit sizes, used when `q` is empty.
	#[serde(default)]
	pub log_q: Vec<usize>,
	/// Explicit auxiliary key-switching primes.
	#[serde(default)]
	pub p: Vec<u64>,
	/// Auxiliary prime bit sizes, used when `p` is empty.
	#[serde(default)]
	pub log_p: Vec<usize>,
	/// log2 of the default plaintext scale Δ.
	pub log_default_scale: usize,
	/// Ring type of the instance.
	#[serde(default)]
	pub ring_type: RingType,
	/// Hamming weight of the ternary secret (0 selects the dense default).
	#[serde(default)]
	pub xs_hamming_weight: usize,
	/// Standard deviation of the error distribution (0.0 selects 3.2).
	#[serde(default)]
	pub xe_sigma: f64,
	/// Required congruence order for generated primes (0 selects 2N). The
	/// bootstrapping parameter builder raises this so residual primes stay
	/// NTT-friendly in the larger ring.
	#[serde(default)]
	pub nth_root: u64,
}

/// A builder that assembles and validates a [`CkksParametersLiteral`] before
/// the expensive context construction.
#[derive(Debug, Clone, Default)]
pub struct CkksParametersBuilder {
	literal: CkksParametersLiteral,
}

impl CkksParametersBuilder {
	/// Creates a builder with nothing set.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets log2 of the ring degree.
	pub fn set_log_n(mut self, log_n: usize) -> Self {
		self.literal.log_n = log_n;
		self
	}

	/// Sets explicit ciphertext primes.
	pub fn set_q(mut self, q: Vec<u64>) -> Self {
		self.literal.q = q;
		self
	}

	/// Sets ciphertext prime bit sizes.
	pub fn set_log_q(mut self, log_q: Vec<usize>) -> Self {
		self.literal.log_q = log_q;
		self
	}

	/// Sets explicit auxiliary primes.
	pub fn set_p(mut self, p: Vec<u64>) -> Self {
		self.literal.p = p;
		self
	}

	/// Sets auxiliary prime bit sizes.
	pub fn set_log_p(mut self, log_p: Vec<usize>) -> Self {
		self.literal.log_p = log_p;
		self
	}

	/// Sets log2 of the default scale.
	pub fn set_log_default_scale(mut self, log_scale: usize) -> Self {
		self.literal.log_default_scale = log_scale;
		self
	}

	/// Sets the ring type.
	pub fn set_ring_type(mut self, ring_type: RingType) -> Self {
		self.literal.ring_type = ring_type;
		self
	}

	/// Sets the secret Hamming weight.
	pub fn set_xs_hamming_weight(mut self, h: usize) -> Self {
		self.literal.xs_hamming_weight = h;
		self
	}

	/// Validates and constructs the parameter set.
	pub fn build(self) -> Result<CkksParameters> {
		CkksParameters::from_literal(self.literal)
	}
}

/// A validated CKKS parameter set with its precomputed ring context.
#[derive(Debug, Clone)]
pub struct CkksParameters {
	literal: CkksParametersLiteral,
	q: Vec<u64>,
	p: Vec<u64>,
	ring: Arc<RingContext>,
	default_scale: f64,
	xs_hamming_weight: usize,
	xe_sigma: f64,
}

impl PartialEq for CkksParameters {
	fn eq(&self, other: &Self) -> bool {
		self.literal.log_n == other.literal.log_n
			&& self.q == other.q
			&& self.p == other.p
			&& self.literal.log_default_scale == other.literal.log_default_scale
			&& self.literal.ring_type == other.literal.ring_type
			&& self.xs_hamming_weight == other.xs_hamming_weight
	}
}

impl CkksParameters {
	/// Builds a parameter set from its literal, generating any primes given
	/// only by bit size. Validation is eager; every inconsistency surfaces
	/// here rather than at use sites.
	pub fn from_literal(literal: CkksParametersLiteral) -> Result<Self> {
		if !(3..=17).contains(&literal.log_n) {
			return Err(Error::InvalidArgument("log_n must be between 3 and 17"));
		}
		if literal.q.is_empty() && literal.log_q.is_empty() {
			return Err(Error::CoefficientModulusNotSet);
		}
		if !literal.q.is_empty() && !literal.log_q.is_empty() {
			return Err(Error::InvalidArgument(
				"exactly one of q and log_q must be given",
			));
		}
		if !literal.p.is_empty() && !literal.log_p.is_empty() {
			return Err(Error::InvalidArgument(
				"at most one of p and log_p may be given",
			));
		}
		if literal.log_default_scale >= 120 {
			return Err(Error::InvalidArgument("log_default_scale must be below 120"));
		}
		let n = 1usize << literal.log_n;
		let nth_root = if literal.nth_root == 0 {
			2 * n as u64
		} else {
			literal.nth_root
		};
		if nth_root < 2 * n as u64 || !nth_root.is_power_of_two() {
			return Err(Error::InvalidArgument(
				"nth_root must be a power of two of at least 2N",
			));
		}

		let mut generated = PrimePool::new(nth_root);
		let q = if literal.q.is_empty() {
			generated.take(&literal.log_q)?
		} else {
			for &qi in &literal.q {
				if qi % nth_root != 1 {
					return Err(Error::InvalidArgument(
						"explicit primes must be congruent to 1 mod the nth root",
					));
				}
			}
			literal.q.clone()
		};
		let p = if literal.p.is_empty() {
			generated.take(&literal.log_p)?
		} else {
			literal.p.clone()
		};

		let ring = Arc::new(RingContext::new(&q, &p, n)?);
		debug!(
			log_n = literal.log_n,
			q_count = q.len(),
			p_count = p.len(),
			"ckks parameters constructed"
		);
		let default_scale = 2f64.powi(literal.log_default_scale as i32);
		let xs_hamming_weight = if literal.xs_hamming_weight == 0 {
			n / 2
		} else {
			literal.xs_hamming_weight.min(n)
		};
		let xe_sigma = if literal.xe_sigma == 0.0 {
			3.2
		} else {
			literal.xe_sigma
		};
		Ok(Self {
			literal,
			q,
			p,
			ring,
			default_scale,
			xs_hamming_weight,
			xe_sigma,
		})
	}

	/// The literal this set was built from.
	pub fn literal(&self) -> &CkksParametersLiteral {
		&self.literal
	}

	/// The ring context.
	pub fn ring(&self) -> &Arc<RingContext> {
		&self.ring
	}

	/// log2 of the ring degree.
	pub fn log_n(&self) -> usize {
		self.literal.log_n
	}

	/// The ring degree N.
	pub fn n(&self) -> usize {
		1 << self.literal.log_n
	}

	/// The ciphertext primes.
	pub fn q(&self) -> &[u64] {
		&self.q
	}

	/// The auxiliary primes.
	pub fn p(&self) -> &[u64] {
		&self.p
	}

	/// The maximum ciphertext level.
	pub fn max_level(&self) -> usize {
		self.q.len() - 1
	}

	/// The default plaintext scale Δ.
	pub fn default_scale(&self) -> f64 {
		self.default_scale
	}

	/// log2 of Δ.
	pub fn log_default_scale(&self) -> usize {
		self.literal.log_default_scale
	}

	/// The ring type.
	pub fn ring_type(&self) -> RingType {
		self.literal.ring_type
	}

	/// The secret Hamming weight.
	pub fn xs_hamming_weight(&self) -> usize {
		self.xs_hamming_weight
	}

	/// The error standard deviation.
	pub fn xe_sigma(&self) -> f64 {
		self.xe_sigma
	}

	/// log2 of the maximum slot count.
	pub fn log_max_slots(&self) -> usize {
		self.literal.log_n - 1
	}

	/// The maximum slot count.
	pub fn max_slots(&self) -> usize {
		1 << self.log_max_slots()
	}
}

/// Generates distinct NTT-friendly primes by bit size, sharing one
/// alternating generator per size so repeated requests never collide.
pub struct PrimePool {
	nth_root: u64,
	generators: Vec<(usize, NttPrimeGenerator)>,
	emitted: Vec<u64>,
}

impl PrimePool {
	/// Creates an empty pool for the given congruence order.
	pub fn new(nth_root: u64) -> Self {
		Self {
			nth_root,
			generators: Vec::new(),
			emitted: Vec::new(),
		}
	}

	/// Marks primes as already in use so they are never emitted.
	pub fn reserve(&mut self, primes: &[u64]) {
		self.emitted.extend_from_slice(primes);
	}

	/// Returns one fresh prime per requested bit size, in request order.
	pub fn take(&mut self, bit_sizes: &[usize]) -> Result<Vec<u64>> {
		let mut out = Vec::with_capacity(bit_sizes.len());
		for &size in bit_sizes {
			out.push(self.take_one(size)?);
		}
		Ok(out)
	}

	/// Returns one fresh prime of the requested bit size.
	pub fn take_one(&mut self, bit_size: usize) -> Result<u64> {
		let idx = match self.generators.iter().position(|(s, _)| *s == bit_size) {
			Some(idx) => idx,
			None => {
				self.generators
					.push((bit_size, NttPrimeGenerator::new(bit_size, self.nth_root)?));
				self.generators.len() - 1
			}
		};
		let gen = &mut self.generators[idx].1;
		loop {
			let candidate = gen.next_alternating()?;
			if !self.emitted.contains(&candidate) {
				self.emitted.push(candidate);
				return Ok(candidate);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn builds_from_bit_sizes() {
		let params = CkksParametersBuilder::new()
			.set_log_n(10)
			.set_log_q(vec![55, 45, 45])
			.set_log_p(vec![50])
			.set_log_default_scale(45)
			.build()
			.unwrap();
		assert_eq!(params.n(), 1024);
		assert_eq!(params.max_level(), 2);
		assert_eq!(params.q().len(), 3);
		assert_eq!(params.p().len(), 1);
		assert_eq!(params.default_scale(), 2f64.powi(45));
		for &q in params.q() {
			assert_eq!(q % (2 * 1024), 1);
		}
		// The two 45-bit primes must be distinct.
		assert_ne!(params.q()[1], params.q()[2]);
	}

	#[test]
	fn rejects_inconsistent_literals() {
		assert!(CkksParametersBuilder::new().set_log_n(10).build().is_err());
		assert!(CkksParametersBuilder::new()
			.set_log_n(2)
			.set_log_q(vec![40])
			.build()
			.is_err());
		assert!(CkksParametersBuilder::new()
			.set_log_n(10)
			.set_q(vec![97])
			.build()
			.is_err());
	}

	#[test]
	fn literal_json_round_trip() {
		let literal = CkksParametersLiteral {
			log_n: 10,
			log_q: vec![55, 45],
			log_p: vec![50],
			log_default_scale: 45,
			..Default::default()
		};
		let json = serde_json::to_string(&literal).unwrap();
		let back: CkksParametersLiteral = serde_json::from_str(&json).unwrap();
		assert_eq!(literal, back);
		let a = CkksParameters::from_literal(literal).unwrap();
		let b = CkksParameters::from_literal(back).unwrap();
		assert_eq!(a, b);
	}
}
