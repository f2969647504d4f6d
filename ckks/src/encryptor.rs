use rand::{CryptoRng, RngCore};

use crate::ciphertext::Ciphertext;
use crate::error::Result;
use crate::key_generator::SecretKey;
use crate::parameters::CkksParameters;
use crate::plaintext::Plaintext;
use crate::poly::Poly;

/// Encrypts plaintexts under a secret key.
#[derive(Debug, Clone)]
pub struct Encryptor {
	params: CkksParameters,
	sk: SecretKey,
}

impl Encryptor {
	/// Creates an encryptor from a secret key.
	pub fn new(params: &CkksParameters, sk: &SecretKey) -> Self {
		Self {
			params: params.clone(),
			sk: sk.clone(),
		}
	}

	/// Encrypts a plaintext at its own level and scale.
	pub fn encrypt<R: RngCore + CryptoRng>(
		&self,
		pt: &Plaintext,
		rng: &mut R,
	) -> Result<Ciphertext> {
		let ring = self.params.ring();
		let level = pt.level();
		let a = Poly::uniform(ring, level, false, rng);
		let mut e = Poly::gaussian(ring, level, false, self.params.xe_sigma(), rng);
		e.to_ntt();

		// c0 = -a s + e + m, c1 = a.
		let s = self.restrict_secret(level);
		let mut c0 = a.clone();
		c0.mul_assign(&s)?;
		c0.neg_assign();
		c0.add_assign(&e)?;
		c0.add_assign(&pt.poly)?;
		Ok(Ciphertext {
			c: vec![c0, a],
			scale: pt.scale,
			log_slots: pt.log_slots,
		})
	}

	fn restrict_secret(&self, level: usize) -> Poly {
		restrict_q(self.sk.poly(), level)
	}
}

/// Restricts a full-chain polynomial to its first `level + 1` Q rows.
pub fn restrict_q(poly: &Poly, level: usize) -> Poly {
	poly.restrict(level, false)
}
