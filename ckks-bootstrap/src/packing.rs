//! Packing of sparse ciphertexts into denser slot layouts and back, using
//! powers of X as interleaving masks.

use std::collections::HashMap;

use ckks::{Ciphertext, Evaluator, GaloisKey};

use crate::error::{Error, KeyKind, Result};

/// Packs sparse ciphertexts (all at `log_slots = s`) into
/// `ceil(count / 2^(target - s))` ciphertexts at `log_slots = target`.
///
/// Each round pairs the lower half of the list with the upper half through
/// `even + odd * X^(N/2^(s+1))`, halving the list; an odd tail element is
/// carried unchanged.
pub fn pack(
	evaluator: &Evaluator,
	cts: &[Ciphertext],
	target_log_slots: usize,
) -> Result<Vec<Ciphertext>> {
	if cts.is_empty() {
		return Err(Error::ParameterCompatibility("nothing to pack"));
	}
	let log_slots = cts[0].log_slots;
	if cts.iter().any(|ct| ct.log_slots != log_slots) {
		return Err(Error::ParameterCompatibility(
			"packing needs a uniform slot layout",
		));
	}
	if target_log_slots > evaluator.parameters().log_max_slots() {
		return Err(Error::ParameterCompatibility(
			"packing target exceeds the ring capacity",
		));
	}
	let n = evaluator.parameters().n();
	let mut list: Vec<Ciphertext> = cts.to_vec();
	let mut s = log_slots;
	while s < target_log_slots && list.len() > 1 {
		// The coefficient grid of the denser layout.
		let shift = (n >> (s + 2)) as i64;
		let half = (list.len() + 1) / 2;
		let mut next = Vec::with_capacity(half);
		for j in 0..half {
			let mut merged = list[j].clone();
			if j + half < list.len() {
				let odd = evaluator.mul_monomial(&list[j + half], shift);
				merged = evaluator.add(&merged, &odd)?;
			}
			merged.log_slots = s + 1;
			next.push(merged);
		}
		list = next;
		s += 1;
	}
	for ct in list.iter_mut() {
		ct.log_slots = target_log_slots;
	}
	Ok(list)
}

/// Splits one packed ciphertext back into `count` ciphertexts at
/// `log_slots`, inverting [`pack`].
///
/// Each round projects onto the even coefficient grid with one doubling
/// rotation, then shifts the odd half down by the inverse X power; the
/// projection keeps the unpacked outputs clean for further computation.
pub fn unpack(
	evaluator: &Evaluator,
	ct: &Ciphertext,
	log_slots: usize,
	count: usize,
	galois_keys: &HashMap<u64, GaloisKey>,
) -> Result<Vec<Ciphertext>> {
	if count == 0 {
		return Err(Error::ParameterCompatibility("nothing to unpack"));
	}
	let n = evaluator.parameters().n();
	let mut list = vec![ct.clone()];
	let mut s = ct.log_slots;
	while s > log_slots && list.len() < count {
		let shift = (n >> (s + 1)) as i64;
		let rotation = 1i64 << (s - 1);
		let element = evaluator.parameters().ring().galois_element(rotation);
		let key = galois_keys
			.get(&element)
			.ok_or(Error::KeyMissing(KeyKind::Galois))?;
		let mut lower_half = Vec::with_capacity(list.len());
		let mut upper_half = Vec::with_capacity(list.len());
		for packed in &list {
			// Project onto the even grid: halve first so the coherent sum
			// restores an integer plaintext, as the trace does.
			let half = evaluator.mul_pow2_inv(packed, 1)?;
			let rotated = evaluator.rotate(&half, rotation, key)?;
			let mut even = evaluator.add(&half, &rotated)?;
			let mut odd = evaluator.sub(packed, &even)?;
			odd = evaluator.mul_monomial(&odd, -shift);
			even.log_slots = s - 1;
			odd.log_slots = s - 1;
			lower_half.push(even);
			upper_half.push(odd);
		}
		lower_half.extend(upper_half);
		list = lower_half;
		s -= 1;
	}
	list.truncate(count);
	for ct in list.iter_mut() {
		ct.log_slots = log_slots;
	}
	Ok(list)
}

#[cfg(test)]
mod tests {
	use super::*;
	use ckks::{
		CkksParametersBuilder, Decryptor, Encoder, Encryptor, KeyGenerator,
	};
	use num_complex::Complex64;
	use rand::{Rng, SeedableRng};
	use rand_chacha::ChaCha8Rng;

	#[test]
	fn pack_then_unpack_recovers_every_message() {
		let params = CkksParametersBuilder::new()
			.set_log_n(8)
			.set_log_q(vec![55, 45])
			.set_log_p(vec![55])
			.set_log_default_scale(45)
			.build()
			.unwrap();
		let mut rng = ChaCha8Rng::seed_from_u64(51);
		let keygen = KeyGenerator::new(&params);
		let sk = keygen.gen_secret_key(&mut rng);
		let encoder = Encoder::new(&params);
		let encryptor = Encryptor::new(&params, &sk);
		let decryptor = Decryptor::new(&params, &sk);
		let evaluator = Evaluator::new(&params);

		let log_slots = 4usize;
		let target = 6usize;
		let mut galois_keys = HashMap::new();
		for t in log_slots..target {
			let element = params.ring().galois_element(1i64 << t);
			galois_keys.insert(
				element,
				keygen.gen_galois_key(&sk, element, &mut rng).unwrap(),
			);
		}

		let messages: Vec<Vec<Complex64>> = (0..4)
			.map(|_| {
				(0..1 << log_slots)
					.map(|_| {
						Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))
					})
					.collect()
			})
			.collect();
		let cts: Vec<Ciphertext> = messages
			.iter()
			.map(|m| {
				let pt = encoder
					.encode(m, params.max_level(), params.default_scale(), log_slots)
					.unwrap();
				encryptor.encrypt(&pt, &mut rng).unwrap()
			})
			.collect();

		let packed = pack(&evaluator, &cts, target).unwrap();
		assert_eq!(packed.len(), 1);
		assert_eq!(packed[0].log_slots, target);

		let unpacked = unpack(&evaluator, &packed[0], log_slots, 4, &galois_keys).unwrap();
		assert_eq!(unpacked.len(), 4);
		for (ct, message) in unpacked.iter().zip(&messages) {
			let decoded = decryptor.decrypt_decode(ct, &encoder).unwrap();
			for (d, v) in decoded.iter().zip(message) {
				assert!((d - v).norm() < 1e-5, "{d} vs {v}");
			}
		}
	}

	#[test]
	fn odd_tail_is_carried() {
		let params = CkksParametersBuilder::new()
			.set_log_n(7)
			.set_log_q(vec![55, 45])
			.set_log_p(vec![55])
			.set_log_default_scale(45)
			.build()
			.unwrap();
		let mut rng = ChaCha8Rng::seed_from_u64(52);
		let keygen = KeyGenerator::new(&params);
		let sk = keygen.gen_secret_key(&mut rng);
		let encoder = Encoder::new(&params);
		let encryptor = Encryptor::new(&params, &sk);
		let evaluator = Evaluator::new(&params);

		let cts: Vec<Ciphertext> = (0..3)
			.map(|i| {
				let values = vec![Complex64::new(i as f64, 0.0); 8];
				let pt = encoder
					.encode(&values, params.max_level(), params.default_scale(), 3)
					.unwrap();
				encryptor.encrypt(&pt, &mut rng).unwrap()
			})
			.collect();
		let packed = pack(&evaluator, &cts, 4).unwrap();
		// ceil(3 / 2) ciphertexts at one level of packing.
		assert_eq!(packed.len(), 2);
	}
}
