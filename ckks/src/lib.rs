//! A pure-Rust implementation of the CKKS approximate homomorphic
//! encryption scheme over RNS polynomial rings: modulus chains, negacyclic
//! NTT, canonical-embedding encoding, gadget key switching, and the default
//! evaluator operations (including Chebyshev polynomial evaluation) that
//! larger circuits such as bootstrapping are built from.
//!
//! # Example
//!
//! ```rust
//! use ckks::{
//!     CkksParametersBuilder, Decryptor, Encoder, Encryptor, Evaluator, KeyGenerator,
//! };
//! use num_complex::Complex64;
//! use rand::SeedableRng;
//!
//! fn main() -> anyhow::Result<()> {
//!     let params = CkksParametersBuilder::new()
//!         .set_log_n(10)
//!         .set_log_q(vec![55, 45, 45])
//!         .set_log_p(vec![55])
//!         .set_log_default_scale(45)
//!         .build()?;
//!     let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(0);
//!
//!     let keygen = KeyGenerator::new(&params);
//!     let sk = keygen.gen_secret_key(&mut rng);
//!     let rlk = keygen.gen_relinearization_key(&sk, &mut rng)?;
//!
//!     let encoder = Encoder::new(&params);
//!     let encryptor = Encryptor::new(&params, &sk);
//!     let decryptor = Decryptor::new(&params, &sk);
//!     let evaluator = Evaluator::new(&params);
//!
//!     let values = vec![Complex64::new(0.5, -0.25); params.max_slots()];
//!     let pt = encoder.encode(
//!         &values,
//!         params.max_level(),
//!         params.default_scale(),
//!         params.log_max_slots(),
//!     )?;
//!     let ct = encryptor.encrypt(&pt, &mut rng)?;
//!     let mut prod = evaluator.mul_relin(&ct, &ct, &rlk)?;
//!     evaluator.rescale(&mut prod)?;
//!
//!     let out = decryptor.decrypt_decode(&prod, &encoder)?;
//!     assert!((out[0] - values[0] * values[0]).norm() < 1e-4);
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![warn(missing_docs)]

mod ciphertext;
mod decryptor;
mod encoder;
mod encryptor;
mod error;
mod evaluator;
mod key_generator;
mod modulus;
mod ntt;
mod parameters;
mod plaintext;
mod poly;
mod ring;

pub use ciphertext::Ciphertext;
pub use decryptor::Decryptor;
pub use encoder::{bit_reverse_in_place, rot_group_exponent, special_fft, special_inv_fft, Encoder};
pub use encryptor::{restrict_q, Encryptor};
pub use error::{Error, Result};
pub use evaluator::polynomial::{chebyshev_depth, evaluate_chebyshev, ChebyshevPoly};
pub use evaluator::Evaluator;
pub use key_generator::{EvaluationKey, GaloisKey, KeyGenerator, RelinearizationKey, SecretKey};
pub use modulus::{is_prime, Modulus, NttPrimeGenerator};
pub use ntt::{bit_reverse, primitive_root_of_unity, NttOperator};
pub use parameters::{
	CkksParameters, CkksParametersBuilder, CkksParametersLiteral, PrimePool, RingType,
};
pub use plaintext::Plaintext;
pub use poly::{Poly, Representation};
pub use ring::RingContext;
