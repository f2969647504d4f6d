use num_complex::Complex64;

use crate::ciphertext::Ciphertext;
use crate::encoder::Encoder;
use crate::encryptor::restrict_q;
use crate::error::Result;
use crate::key_generator::SecretKey;
use crate::parameters::CkksParameters;
use crate::plaintext::Plaintext;

/// Decrypts ciphertexts under a secret key.
#[derive(Debug, Clone)]
pub struct Decryptor {
	params: CkksParameters,
	sk: SecretKey,
}

impl Decryptor {
	/// Creates a decryptor from a secret key.
	pub fn new(params: &CkksParameters, sk: &SecretKey) -> Self {
		Self {
			params: params.clone(),
			sk: sk.clone(),
		}
	}

	/// Decrypts to a plaintext: `m = c0 + c1 s (+ c2 s^2)`.
	pub fn decrypt(&self, ct: &Ciphertext) -> Result<Plaintext> {
		let level = ct.level();
		let s = restrict_q(self.sk.poly(), level);
		let mut acc = ct.c[0].clone();
		let mut power = s.clone();
		for c in ct.c.iter().skip(1) {
			acc.add_product_assign(c, &power)?;
			if ct.c.len() > 2 {
				let mut next = power.clone();
				next.mul_assign(&s)?;
				power = next;
			}
		}
		Ok(Plaintext {
			poly: acc,
			scale: ct.scale,
			log_slots: ct.log_slots,
		})
	}

	/// Decrypts and decodes in one step.
	pub fn decrypt_decode(&self, ct: &Ciphertext, encoder: &Encoder) -> Result<Vec<Complex64>> {
		let pt = self.decrypt(ct)?;
		encoder.decode(&pt)
	}

	/// The parameter set the decryptor operates over.
	pub fn parameters(&self) -> &CkksParameters {
		&self.params
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::encryptor::Encryptor;
	use crate::key_generator::KeyGenerator;
	use crate::parameters::CkksParametersBuilder;
	use num_complex::Complex64;
	use rand::{Rng, SeedableRng};
	use rand_chacha::ChaCha8Rng;

	#[test]
	fn encrypt_decrypt_round_trip() {
		let params = CkksParametersBuilder::new()
			.set_log_n(9)
			.set_log_q(vec![55, 45, 45])
			.set_log_p(vec![50])
			.set_log_default_scale(40)
			.build()
			.unwrap();
		let mut rng = ChaCha8Rng::seed_from_u64(42);
		let keygen = KeyGenerator::new(&params);
		let sk = keygen.gen_secret_key(&mut rng);
		let encoder = Encoder::new(&params);
		let encryptor = Encryptor::new(&params, &sk);
		let decryptor = Decryptor::new(&params, &sk);

		let values: Vec<Complex64> = (0..params.max_slots())
			.map(|_| Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
			.collect();
		let pt = encoder
			.encode(
				&values,
				params.max_level(),
				params.default_scale(),
				params.log_max_slots(),
			)
			.unwrap();
		let ct = encryptor.encrypt(&pt, &mut rng).unwrap();
		let decoded = decryptor.decrypt_decode(&ct, &encoder).unwrap();
		for (a, b) in decoded.iter().zip(&values) {
			assert!((a - b).norm() < 1e-6, "{a} vs {b}");
		}
	}
}
