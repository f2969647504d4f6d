//! End-to-end bootstrapping scenarios: precision bounds, level and scale
//! post-conditions, ring-degree switching, batched and conjugate-invariant
//! refreshes, and iterative refinement.

use ckks::{
	Ciphertext, CkksParameters, CkksParametersLiteral, Decryptor, Encoder, Encryptor,
	KeyGenerator, RingType, SecretKey,
};
use ckks_bootstrap::{
	gen_evaluation_keys, Bootstrapper, BootstrappingParametersLiteral, Evaluator,
	IterationsParameters, Mod1ParametersLiteral, Parameters, SecretKeyBootstrapper,
};
use num_complex::Complex64;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

struct Harness {
	residual: CkksParameters,
	params: Parameters,
	encoder: Encoder,
	encryptor: Encryptor,
	decryptor: Decryptor,
	evaluator: Evaluator,
	sk: SecretKey,
	rng: ChaCha8Rng,
}

fn harness(
	log_n_residual: usize,
	log_n_boot: usize,
	ring_type: RingType,
	iterations: Option<IterationsParameters>,
	log_slots: Option<usize>,
) -> Harness {
	let residual = CkksParameters::from_literal(CkksParametersLiteral {
		log_n: log_n_residual,
		log_q: vec![52, 40],
		log_p: vec![61],
		log_default_scale: 40,
		ring_type,
		nth_root: u64::max(
			2 * (1u64 << log_n_boot),
			match ring_type {
				RingType::ConjugateInvariant => 4 * (1u64 << log_n_residual),
				RingType::Standard => 2 * (1u64 << log_n_residual),
			},
		),
		..Default::default()
	})
	.unwrap();
	let literal = BootstrappingParametersLiteral {
		log_n: Some(log_n_boot),
		log_p: Some(vec![61, 61]),
		xs_hamming_weight: Some(128),
		ephemeral_secret_weight: Some(32),
		iterations,
		log_slots,
		mod1: Mod1ParametersLiteral {
			log_message_ratio: 12,
			..Default::default()
		},
		..Default::default()
	};
	let params = Parameters::new(&residual, &literal).unwrap();
	let mut rng = ChaCha8Rng::seed_from_u64(0xb007);
	let sk = KeyGenerator::new(&residual).gen_secret_key(&mut rng);
	let (keys, _sk_ephemeral) = gen_evaluation_keys(&params, &sk, &mut rng).unwrap();
	let evaluator = Evaluator::new(&params, &keys).unwrap();
	Harness {
		encoder: Encoder::new(&residual),
		encryptor: Encryptor::new(&residual, &sk),
		decryptor: Decryptor::new(&residual, &sk),
		evaluator,
		sk,
		params,
		residual,
		rng,
	}
}

fn random_message(rng: &mut ChaCha8Rng, count: usize, real_only: bool) -> Vec<Complex64> {
	(0..count)
		.map(|_| {
			Complex64::new(
				rng.gen_range(-1.0..1.0),
				if real_only {
					0.0
				} else {
					rng.gen_range(-1.0..1.0)
				},
			)
		})
		.collect()
}

fn encrypt_at_level_zero(h: &mut Harness, values: &[Complex64], log_slots: usize) -> Ciphertext {
	let pt = h
		.encoder
		.encode(values, 0, h.residual.default_scale(), log_slots)
		.unwrap();
	h.encryptor.encrypt(&pt, &mut h.rng).unwrap()
}

/// Mean per-slot log2 precision over the real and imaginary axes.
fn avg_log2_precision(want: &[Complex64], got: &[Complex64]) -> f64 {
	let mut sum = 0.0;
	let mut count = 0.0;
	for (w, g) in want.iter().zip(got) {
		for err in [(w.re - g.re).abs(), (w.im - g.im).abs()] {
			sum += -(err.max(f64::MIN_POSITIVE)).log2();
			count += 1.0;
		}
	}
	sum / count
}

/// Mean per-slot log2 precision on the real axis only.
fn avg_log2_precision_real(want: &[Complex64], got: &[Complex64]) -> f64 {
	let mut sum = 0.0;
	let mut count = 0.0;
	for (w, g) in want.iter().zip(got) {
		sum += -((w.re - g.re).abs().max(f64::MIN_POSITIVE)).log2();
		count += 1.0;
	}
	sum / count
}

fn precision_floor(residual: &CkksParameters) -> f64 {
	residual.log_default_scale() as f64 - residual.log_n() as f64 - 12.0
}

/// Same ring degree, fully packed slots: the core refresh restores the top
/// level at the residual scale within the precision bound.
#[test]
fn bootstrap_restores_level_and_precision() {
	let mut h = harness(10, 10, RingType::Standard, None, None);
	let log_slots = h.residual.log_max_slots();
	let fixed = Complex64::new(0.9238795325112867, 0.3826834323650898);
	let mut values = random_message(&mut h.rng, 1 << log_slots, false);
	for slot in values.iter_mut().take(4) {
		*slot = fixed;
	}
	let ct = encrypt_at_level_zero(&mut h, &values, log_slots);

	let fresh = h.evaluator.bootstrap(&ct).unwrap();
	assert_eq!(fresh.level(), h.params.output_level());
	assert_eq!(fresh.level(), h.residual.max_level());
	assert!((fresh.scale / h.residual.default_scale() - 1.0).abs() < 1e-9);

	let decoded = h.decryptor.decrypt_decode(&fresh, &h.encoder).unwrap();
	let precision = avg_log2_precision(&values, &decoded);
	assert!(
		precision >= precision_floor(&h.residual),
		"precision {precision} below bound {}",
		precision_floor(&h.residual)
	);
}

/// Residual ring smaller than the bootstrapping ring: the driver switches
/// degrees on the way in and out, and the output lives in the residual ring.
#[test]
fn bootstrap_switches_ring_degree() {
	let mut h = harness(9, 10, RingType::Standard, None, None);
	let log_slots = h.residual.log_max_slots();
	let values = random_message(&mut h.rng, 1 << log_slots, false);
	let ct = encrypt_at_level_zero(&mut h, &values, log_slots);

	let fresh = h.evaluator.bootstrap(&ct).unwrap();
	assert_eq!(fresh.level(), h.residual.max_level());
	assert_eq!(fresh.c[0].context().degree(), h.residual.n());

	let decoded = h.decryptor.decrypt_decode(&fresh, &h.encoder).unwrap();
	let precision = avg_log2_precision(&values, &decoded);
	assert!(
		precision >= precision_floor(&h.residual),
		"precision {precision}"
	);
}

/// Batched refresh of sparse ciphertexts: packing shares the circuit, and
/// output order matches input order.
#[test]
fn bootstrap_many_preserves_order() {
	let mut h = harness(9, 10, RingType::Standard, None, None);
	let log_slots = h.residual.log_max_slots() - 1;
	let base = random_message(&mut h.rng, 1 << log_slots, false);
	let messages: Vec<Vec<Complex64>> = (0..4)
		.map(|i| {
			let mut rotated = base.clone();
			rotated.rotate_left(i);
			rotated
		})
		.collect();
	let cts: Vec<Ciphertext> = messages
		.iter()
		.map(|m| encrypt_at_level_zero(&mut h, m, log_slots))
		.collect();

	let fresh = h.evaluator.bootstrap_many(&cts).unwrap();
	assert_eq!(fresh.len(), cts.len());
	for (ct, message) in fresh.iter().zip(&messages) {
		assert_eq!(ct.level(), h.residual.max_level());
		let decoded = h.decryptor.decrypt_decode(ct, &h.encoder).unwrap();
		let precision = avg_log2_precision(message, &decoded[..message.len()]);
		assert!(
			precision >= precision_floor(&h.residual),
			"precision {precision}"
		);
	}
}

/// A conjugate-invariant pair rides one standard-ring refresh and returns as
/// two full-level real-axis ciphertexts.
#[test]
fn conjugate_invariant_pair_round_trip() {
	let mut h = harness(9, 10, RingType::ConjugateInvariant, None, None);
	let log_slots = h.residual.log_max_slots();
	let left = random_message(&mut h.rng, 1 << log_slots, true);
	let right = random_message(&mut h.rng, 1 << log_slots, true);
	let ct_l = encrypt_at_level_zero(&mut h, &left, log_slots);
	let ct_r = encrypt_at_level_zero(&mut h, &right, log_slots);

	let (fresh_l, fresh_r) = h
		.evaluator
		.evaluate_conjugate_invariant(&ct_l, Some(&ct_r))
		.unwrap();
	assert_eq!(fresh_l.level(), h.residual.max_level());
	assert_eq!(fresh_r.level(), h.residual.max_level());

	let dl = h.decryptor.decrypt_decode(&fresh_l, &h.encoder).unwrap();
	let dr = h.decryptor.decrypt_decode(&fresh_r, &h.encoder).unwrap();
	let precision =
		avg_log2_precision_real(&left, &dl).min(avg_log2_precision_real(&right, &dr));
	assert!(
		precision >= precision_floor(&h.residual),
		"precision {precision}"
	);
}

/// The plain bootstrap rejects conjugate-invariant inputs.
#[test]
fn bootstrap_rejects_mismatched_ring() {
	let mut h = harness(9, 9, RingType::ConjugateInvariant, None, None);
	let log_slots = h.residual.log_max_slots();
	let values = random_message(&mut h.rng, 1 << log_slots, true);
	let ct = encrypt_at_level_zero(&mut h, &values, log_slots);
	assert!(matches!(
		h.evaluator.bootstrap(&ct),
		Err(ckks_bootstrap::Error::RingMismatch)
	));
}

/// META-BTS: each refinement iteration improves on the single-shot
/// precision.
#[test]
fn iterative_refinement_improves_precision() {
	let mut base = harness(9, 9, RingType::Standard, None, None);
	let log_slots = base.residual.log_max_slots();
	let values = random_message(&mut base.rng, 1 << log_slots, false);
	let ct = encrypt_at_level_zero(&mut base, &values, log_slots);
	let single = base.evaluator.bootstrap(&ct).unwrap();
	let single_prec = avg_log2_precision(
		&values,
		&base.decryptor.decrypt_decode(&single, &base.encoder).unwrap(),
	);

	let mut refined = harness(
		9,
		9,
		RingType::Standard,
		Some(IterationsParameters {
			bootstrapping_precision: vec![8],
			reserved_prime_bit_size: 30,
		}),
		None,
	);
	let ct2 = encrypt_at_level_zero(&mut refined, &values, log_slots);
	let fresh = refined.evaluator.bootstrap(&ct2).unwrap();
	assert_eq!(fresh.level(), refined.residual.max_level());
	let refined_prec = avg_log2_precision(
		&values,
		&refined
			.decryptor
			.decrypt_decode(&fresh, &refined.encoder)
			.unwrap(),
	);
	assert!(
		refined_prec > single_prec + 4.0,
		"single shot {single_prec}, refined {refined_prec}"
	);
}

/// The secret-key oracle satisfies the same contract as the real circuit.
#[test]
fn oracle_bootstrapper_matches_contract() {
	let mut h = harness(9, 9, RingType::Standard, None, None);
	let oracle = SecretKeyBootstrapper::new(&h.params, &h.sk);
	assert_eq!(oracle.depth(), h.evaluator.depth());
	assert_eq!(oracle.output_level(), h.evaluator.output_level());
	assert_eq!(
		oracle.minimum_input_level(),
		h.evaluator.minimum_input_level()
	);

	let log_slots = h.residual.log_max_slots();
	let values = random_message(&mut h.rng, 1 << log_slots, false);
	let ct = encrypt_at_level_zero(&mut h, &values, log_slots);
	let fresh = oracle.bootstrap(&ct).unwrap();
	assert_eq!(fresh.level(), h.residual.max_level());
	let decoded = h.decryptor.decrypt_decode(&fresh, &h.encoder).unwrap();
	for (d, v) in decoded.iter().zip(&values) {
		assert!((d - v).norm() < 1e-5);
	}
}
