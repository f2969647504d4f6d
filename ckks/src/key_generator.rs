use rand::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};
use crate::parameters::CkksParameters;
use crate::poly::{Poly, Representation};

/// A ternary secret key, stored in NTT representation over the full chain
/// (Q and P rows) of its parameter set.
#[derive(Debug, Clone, PartialEq)]
pub struct SecretKey {
	poly: Poly,
	hamming_weight: usize,
}

impl Zeroize for SecretKey {
	fn zeroize(&mut self) {
		self.poly.zeroize();
	}
}

impl ZeroizeOnDrop for SecretKey {}

impl SecretKey {
	/// The key polynomial.
	pub fn poly(&self) -> &Poly {
		&self.poly
	}

	/// The Hamming weight the key was sampled with.
	pub fn hamming_weight(&self) -> usize {
		self.hamming_weight
	}

	/// Wraps an explicit key polynomial; used for embedded and ephemeral
	/// secrets.
	pub fn from_poly(poly: Poly, hamming_weight: usize) -> Self {
		Self {
			poly,
			hamming_weight,
		}
	}

	/// Re-embeds this secret into a larger ring by spreading the
	/// coefficients over the stride `N2/N1`, the map behind ring-degree
	/// switching.
	pub fn embed(&self, target: &CkksParameters) -> Result<Self> {
		let src_ctx = self.poly.context();
		let n1 = src_ctx.degree();
		let n2 = target.n();
		if n2 < n1 {
			return Err(Error::IncompatibleParameters);
		}
		let gap = n2 / n1;
		let mut src = self.poly.clone();
		src.to_coeff();
		// The ternary coefficients are exact small integers, so they carry
		// over any modulus chain through the balanced lift.
		let no_p = Poly::from_rows(
			src_ctx,
			(0..=src.level()).map(|i| src.row(i).to_vec()).collect(),
			src.level() + 1,
			Representation::Coefficient,
		);
		let coeffs = no_p.to_bigint()?;
		let mut spread = vec![num_bigint::BigInt::from(0); n2];
		for (i, c) in coeffs.iter().enumerate() {
			spread[i * gap] = c.clone();
		}
		let mut poly = Poly::from_bigint(target.ring(), &spread, target.max_level(), true);
		poly.to_ntt();
		Ok(Self {
			poly,
			hamming_weight: self.hamming_weight,
		})
	}
}

/// A gadget key-switching key from one secret to another, one digit per
/// ciphertext prime, every digit carried over the full Q·P chain.
#[derive(Debug, Clone)]
pub struct EvaluationKey {
	/// The masked gadget rows `-a_i s_out + e_i + P g_i s_in`.
	pub b: Vec<Poly>,
	/// The uniform masks `a_i`.
	pub a: Vec<Poly>,
}

/// A key-switching key tied to one Galois automorphism.
#[derive(Debug, Clone)]
pub struct GaloisKey {
	/// The Galois element `X -> X^element` this key undoes.
	pub element: u64,
	/// The underlying switching key from `s(X^element)` to `s`.
	pub key: EvaluationKey,
}

/// The relinearisation key, switching `s^2` back to `s`.
#[derive(Debug, Clone)]
pub struct RelinearizationKey {
	/// The underlying switching key.
	pub key: EvaluationKey,
}

/// Generates every key kind of the scheme for one parameter set.
#[derive(Debug, Clone)]
pub struct KeyGenerator {
	params: CkksParameters,
}

impl KeyGenerator {
	/// Creates a generator over a parameter set.
	pub fn new(params: &CkksParameters) -> Self {
		Self {
			params: params.clone(),
		}
	}

	/// Samples a fresh ternary secret at the parameter set's Hamming weight.
	pub fn gen_secret_key<R: RngCore + CryptoRng>(&self, rng: &mut R) -> SecretKey {
		self.gen_secret_key_with_weight(self.params.xs_hamming_weight(), rng)
	}

	/// Samples a fresh ternary secret with an explicit Hamming weight; used
	/// for the ephemeral sparse secret of the bootstrap.
	pub fn gen_secret_key_with_weight<R: RngCore + CryptoRng>(
		&self,
		hamming_weight: usize,
		rng: &mut R,
	) -> SecretKey {
		let mut poly = Poly::ternary(
			self.params.ring(),
			self.params.max_level(),
			true,
			hamming_weight,
			rng,
		);
		poly.to_ntt();
		SecretKey {
			poly,
			hamming_weight,
		}
	}

	/// Generates a key-switching key re-encrypting `sk_in` material under
	/// `sk_out`. Both secrets must live in this generator's ring.
	pub fn gen_evaluation_key<R: RngCore + CryptoRng>(
		&self,
		sk_in: &SecretKey,
		sk_out: &SecretKey,
		rng: &mut R,
	) -> Result<EvaluationKey> {
		self.gen_switching_key(sk_in.poly(), sk_out.poly(), rng)
	}

	/// Generates the relinearisation key for `sk`.
	pub fn gen_relinearization_key<R: RngCore + CryptoRng>(
		&self,
		sk: &SecretKey,
		rng: &mut R,
	) -> Result<RelinearizationKey> {
		let mut s2 = sk.poly().clone();
		s2.mul_assign(sk.poly())?;
		Ok(RelinearizationKey {
			key: self.gen_switching_key(&s2, sk.poly(), rng)?,
		})
	}

	/// Generates the Galois key for one automorphism element.
	pub fn gen_galois_key<R: RngCore + CryptoRng>(
		&self,
		sk: &SecretKey,
		element: u64,
		rng: &mut R,
	) -> Result<GaloisKey> {
		let s_g = sk.poly().automorphism(element);
		Ok(GaloisKey {
			element,
			key: self.gen_switching_key(&s_g, sk.poly(), rng)?,
		})
	}

	/// Generates Galois keys for a whole element set.
	pub fn gen_galois_keys<R: RngCore + CryptoRng>(
		&self,
		sk: &SecretKey,
		elements: &[u64],
		rng: &mut R,
	) -> Result<Vec<GaloisKey>> {
		elements
			.iter()
			.map(|&g| self.gen_galois_key(sk, g, rng))
			.collect()
	}

	fn gen_switching_key<R: RngCore + CryptoRng>(
		&self,
		s_in: &Poly,
		s_out: &Poly,
		rng: &mut R,
	) -> Result<EvaluationKey> {
		let ring = self.params.ring();
		let level = self.params.max_level();
		let digits = ring.q_count();
		let mut b = Vec::with_capacity(digits);
		let mut a = Vec::with_capacity(digits);
		for i in 0..digits {
			let a_i = Poly::uniform(ring, level, true, rng);
			let mut e_i = Poly::gaussian(ring, level, true, self.params.xe_sigma(), rng);
			e_i.to_ntt();

			// b_i = -a_i s_out + e_i + w_i s_in, where the gadget element
			// w_i is P mod q_i on row i and zero elsewhere.
			let mut b_i = a_i.clone();
			b_i.mul_assign(s_out)?;
			b_i.neg_assign();
			b_i.add_assign(&e_i)?;

			let p_mod_qi = {
				use num_traits::ToPrimitive;
				let qi = ring.modulus(i).value();
				(ring.p_product() % qi).to_u64().expect("residue fits u64")
			};
			let m = *ring.modulus(i);
			let s_row = s_in.row(i);
			let b_row = b_i.row_mut(i);
			for (c, &s) in b_row.iter_mut().zip(s_row) {
				*c = m.add(*c, m.mul(p_mod_qi, s));
			}

			b.push(b_i);
			a.push(a_i);
		}
		Ok(EvaluationKey { b, a })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::parameters::CkksParametersBuilder;
	use rand::SeedableRng;
	use rand_chacha::ChaCha8Rng;

	#[test]
	fn secret_key_weight() {
		let params = CkksParametersBuilder::new()
			.set_log_n(6)
			.set_log_q(vec![50, 40])
			.set_log_p(vec![50])
			.set_log_default_scale(40)
			.set_xs_hamming_weight(16)
			.build()
			.unwrap();
		let mut rng = ChaCha8Rng::seed_from_u64(11);
		let sk = KeyGenerator::new(&params).gen_secret_key(&mut rng);
		let mut p = sk.poly().clone();
		p.to_coeff();
		let q0 = params.q()[0];
		let nonzero = p
			.row(0)
			.iter()
			.filter(|&&c| c != 0)
			.inspect(|&&c| assert!(c == 1 || c == q0 - 1))
			.count();
		assert_eq!(nonzero, 16);
	}

	#[test]
	fn evaluation_key_has_one_digit_per_prime() {
		let params = CkksParametersBuilder::new()
			.set_log_n(6)
			.set_log_q(vec![50, 40, 40])
			.set_log_p(vec![50])
			.set_log_default_scale(40)
			.build()
			.unwrap();
		let mut rng = ChaCha8Rng::seed_from_u64(12);
		let gen = KeyGenerator::new(&params);
		let sk = gen.gen_secret_key(&mut rng);
		let rlk = gen.gen_relinearization_key(&sk, &mut rng).unwrap();
		assert_eq!(rlk.key.b.len(), 3);
		assert_eq!(rlk.key.a.len(), 3);
		assert!(rlk.key.b[0].has_p());
	}
}
