//! Bootstrapping for the CKKS scheme.
//!
//! Given a ciphertext whose multiplicative budget is exhausted, the
//! [`Evaluator`] homomorphically re-encrypts it to a fresh high-level
//! ciphertext: the message is scaled down onto the base prime, the modulus
//! is raised to the full chain, the coefficients are moved to the slot
//! domain (CoeffsToSlots), reduced modulo the base prime by a trigonometric
//! approximation (Mod1), and moved back (SlotsToCoeffs). Iterative
//! refinement, ring-degree switching and conjugate-invariant inputs are
//! handled by the same driver.
//!
//! # Example
//!
//! ```no_run
//! use ckks::{CkksParameters, CkksParametersLiteral, KeyGenerator};
//! use ckks_bootstrap::{
//!     gen_evaluation_keys, Bootstrapper, BootstrappingParametersLiteral, Evaluator, Parameters,
//! };
//! use rand::SeedableRng;
//!
//! fn main() -> anyhow::Result<()> {
//!     let residual = CkksParameters::from_literal(CkksParametersLiteral {
//!         log_n: 10,
//!         log_q: vec![48, 40],
//!         log_p: vec![61],
//!         log_default_scale: 40,
//!         nth_root: 2 << 10,
//!         ..Default::default()
//!     })?;
//!     let params = Parameters::new(
//!         &residual,
//!         &BootstrappingParametersLiteral {
//!             log_n: Some(10),
//!             ..Default::default()
//!         },
//!     )?;
//!     let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(0);
//!     let sk = KeyGenerator::new(&residual).gen_secret_key(&mut rng);
//!     let (keys, _sk_ephemeral) = gen_evaluation_keys(&params, &sk, &mut rng)?;
//!     let bootstrapper = Evaluator::new(&params, &keys)?;
//!     // let fresh = bootstrapper.bootstrap(&exhausted_ciphertext)?;
//!     let _ = bootstrapper.depth();
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![warn(missing_docs)]

mod dft;
mod error;
mod evaluator;
mod keys;
mod minimax;
mod mod1;
mod packing;
mod parameters;

pub use dft::{
	apply_diag_map, diag_map_mul, find_best_bsgs_split, plan_rotations, DftEvaluator, DftFormat,
	DftMatrix, DftMatrixLiteral, DftType, DiagMap, SubMatrix,
};
pub use error::{Error, KeyKind, Result};
pub use evaluator::{Bootstrapper, Evaluator, SecretKeyBootstrapper};
pub use keys::{gen_evaluation_keys, EvaluationKeys};
pub use minimax::{
	gen_minimax_composite_polynomial, parse_coeff_table, COEFFS_SIGN_X2_CHEBY,
	COEFFS_SIGN_X4_CHEBY,
};
pub use mod1::{
	chebyshev_interpolate, power_to_chebyshev, Mod1Evaluator, Mod1Parameters,
	Mod1ParametersLiteral, Mod1Type,
};
pub use packing::{pack, unpack};
pub use parameters::{
	BootstrappingParametersLiteral, CircuitOrder, IterationsParameters, Parameters,
	ParametersJson, LEVELS_PER_RESCALING,
};
