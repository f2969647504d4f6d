//! Generation of every evaluation key the bootstrap circuit requires.

use std::collections::HashMap;

use ckks::{EvaluationKey, GaloisKey, KeyGenerator, RelinearizationKey, SecretKey};
use rand::{CryptoRng, RngCore};
use tracing::debug;

use crate::error::Result;
use crate::parameters::Parameters;

/// The bundle of keys consumed by the bootstrap evaluator.
#[derive(Debug, Clone)]
pub struct EvaluationKeys {
	/// Relinearisation key of the bootstrapping instance.
	pub relinearization: RelinearizationKey,
	/// Galois keys, indexed by Galois element.
	pub galois: HashMap<u64, GaloisKey>,
	/// Switches the dense bootstrapping secret to the ephemeral sparse one
	/// around the modulus raise.
	pub dense_to_sparse: Option<EvaluationKey>,
	/// Switches the ephemeral sparse secret back to the dense one.
	pub sparse_to_dense: Option<EvaluationKey>,
	/// Switches the embedded residual secret to the bootstrapping secret
	/// when the ring degrees differ.
	pub ring_to_larger: Option<EvaluationKey>,
	/// Switches the bootstrapping secret back to the embedded residual
	/// secret.
	pub ring_to_smaller: Option<EvaluationKey>,
}

/// Generates the evaluation keys for a bootstrapping parameter set from the
/// residual secret. Returns the keys together with the ephemeral sparse
/// secret (a zero-weight secret when the encapsulation is disabled).
pub fn gen_evaluation_keys<R: RngCore + CryptoRng>(
	params: &Parameters,
	sk_residual: &SecretKey,
	rng: &mut R,
) -> Result<(EvaluationKeys, SecretKey)> {
	let boot = params.bootstrapping();
	let keygen = KeyGenerator::new(boot);

	// The dense secret of the bootstrapping instance: the residual secret
	// re-embedded when the rings coincide, or a fresh secret plus switching
	// keys when the bootstrap ring is larger.
	let embedded = sk_residual.embed(boot)?;
	let same_ring = params.residual().n() == boot.n();
	let (sk_dense, ring_to_larger, ring_to_smaller) = if same_ring {
		(embedded, None, None)
	} else {
		let sk_dense = keygen.gen_secret_key(rng);
		let up = keygen.gen_evaluation_key(&embedded, &sk_dense, rng)?;
		let down = keygen.gen_evaluation_key(&sk_dense, &embedded, rng)?;
		(sk_dense, Some(up), Some(down))
	};

	let relinearization = keygen.gen_relinearization_key(&sk_dense, rng)?;

	let mut galois = HashMap::new();
	for element in params.galois_elements()? {
		galois.insert(element, keygen.gen_galois_key(&sk_dense, element, rng)?);
	}

	let weight = params.ephemeral_secret_weight();
	let (dense_to_sparse, sparse_to_dense, sk_ephemeral) = if weight > 0 {
		let sk_sparse = keygen.gen_secret_key_with_weight(weight, rng);
		let to_sparse = keygen.gen_evaluation_key(&sk_dense, &sk_sparse, rng)?;
		let to_dense = keygen.gen_evaluation_key(&sk_sparse, &sk_dense, rng)?;
		(Some(to_sparse), Some(to_dense), sk_sparse)
	} else {
		(None, None, keygen.gen_secret_key_with_weight(0, rng))
	};

	debug!(
		galois = galois.len(),
		same_ring,
		sparse = weight > 0,
		"bootstrap evaluation keys generated"
	);
	Ok((
		EvaluationKeys {
			relinearization,
			galois,
			dense_to_sparse,
			sparse_to_dense,
			ring_to_larger,
			ring_to_smaller,
		},
		sk_ephemeral,
	))
}
