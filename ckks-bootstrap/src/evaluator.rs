//! The bootstrap driver: scale-down, modulus raise, the homomorphic DFTs
//! and modular reduction, iterative refinement, ring switching and the
//! conjugate-invariant entry points.

use std::sync::Arc;

use ckks::{
	Ciphertext, Encoder, Poly, Representation, RingType, SecretKey,
};
use num_bigint::BigInt;
use num_traits::FromPrimitive;
use rayon::prelude::*;
use tracing::{debug, instrument, trace};

use crate::dft::{DftEvaluator, DftMatrix};
use crate::error::{Error, KeyKind, Result};
use crate::keys::EvaluationKeys;
use crate::mod1::{Mod1Evaluator, Mod1Parameters};
use crate::parameters::Parameters;

/// The abstract bootstrapping contract: the real circuit, the secret-key
/// oracle, and in principle collective variants all satisfy it.
pub trait Bootstrapper {
	/// Re-encrypts one ciphertext to the residual top level.
	fn bootstrap(&self, ct: &Ciphertext) -> Result<Ciphertext>;

	/// Bootstraps a batch, preserving input order.
	fn bootstrap_many(&self, cts: &[Ciphertext]) -> Result<Vec<Ciphertext>>;

	/// Levels the circuit consumes.
	fn depth(&self) -> usize;

	/// The lowest admissible input level.
	fn minimum_input_level(&self) -> usize;

	/// The level outputs are returned at.
	fn output_level(&self) -> usize;
}

/// The homomorphic bootstrap evaluator.
///
/// All precomputed data (parameters, matrices, polynomial coefficients,
/// keys) sits behind shared references, so [`Evaluator::shallow_copy`] is
/// cheap and two copies may run concurrently on disjoint ciphertexts.
#[derive(Debug, Clone)]
pub struct Evaluator {
	params: Parameters,
	keys: Arc<EvaluationKeys>,
	res_eval: ckks::Evaluator,
	boot_eval: ckks::Evaluator,
	dft_eval: DftEvaluator,
	mod1_eval: Mod1Evaluator,
	c2s_matrix: Arc<DftMatrix>,
	s2c_matrix: Arc<DftMatrix>,
	mod1: Arc<Mod1Parameters>,
}

impl Evaluator {
	/// Builds the evaluator, planning both DFT matrices and compiling the
	/// modular reduction. Every key the configured circuit needs must be
	/// present or construction fails with [`Error::KeyMissing`].
	pub fn new(params: &Parameters, keys: &EvaluationKeys) -> Result<Self> {
		for element in params.galois_elements()? {
			if !keys.galois.contains_key(&element) {
				return Err(Error::KeyMissing(KeyKind::Galois));
			}
		}
		let ring_switch = params.residual().n() != params.bootstrapping().n();
		if ring_switch && keys.ring_to_larger.is_none() {
			return Err(Error::KeyMissing(KeyKind::RingToLarger));
		}
		if ring_switch && keys.ring_to_smaller.is_none() {
			return Err(Error::KeyMissing(KeyKind::RingToSmaller));
		}
		if params.ephemeral_secret_weight() > 0 {
			if keys.dense_to_sparse.is_none() {
				return Err(Error::KeyMissing(KeyKind::DenseToSparse));
			}
			if keys.sparse_to_dense.is_none() {
				return Err(Error::KeyMissing(KeyKind::SparseToDense));
			}
		}

		let boot = params.bootstrapping();
		let boot_eval = ckks::Evaluator::new(boot);
		let encoder = Encoder::new(boot);
		let c2s_matrix = DftMatrix::new(boot, &encoder, params.coeffs_to_slots())?;
		let s2c_matrix = DftMatrix::new(boot, &encoder, params.slots_to_coeffs())?;
		let mod1 = Mod1Parameters::new(boot, params.mod1(), params.mod1_level_q())?;
		if mod1.depth() != params.mod1_depth() {
			return Err(Error::LevelInconsistency(
				"modular reduction depth drifted from the parameter plan",
			));
		}
		Ok(Self {
			params: params.clone(),
			keys: Arc::new(keys.clone()),
			res_eval: ckks::Evaluator::new(params.residual()),
			dft_eval: DftEvaluator::new(&boot_eval),
			mod1_eval: Mod1Evaluator::new(&boot_eval),
			boot_eval,
			c2s_matrix: Arc::new(c2s_matrix),
			s2c_matrix: Arc::new(s2c_matrix),
			mod1: Arc::new(mod1),
		})
	}

	/// The parameter set of this evaluator.
	pub fn parameters(&self) -> &Parameters {
		&self.params
	}

	/// A copy sharing all read-only data (keys, matrices, polynomial
	/// coefficients) for concurrent use on disjoint ciphertexts.
	pub fn shallow_copy(&self) -> Self {
		self.clone()
	}

	/// Bootstraps a pair of conjugate-invariant ciphertexts through one
	/// standard-ring refresh: `ct_l` supplies the real axis, `ct_r` the
	/// imaginary one. A missing right element is treated as zero.
	pub fn evaluate_conjugate_invariant(
		&self,
		ct_l: &Ciphertext,
		ct_r: Option<&Ciphertext>,
	) -> Result<(Ciphertext, Ciphertext)> {
		if self.params.residual().ring_type() != RingType::ConjugateInvariant {
			return Err(Error::RingMismatch);
		}
		let lifted = match ct_r {
			Some(r) => {
				let i_r = self.res_eval.mul_by_i(r);
				self.res_eval.add(ct_l, &i_r)?
			}
			None => ct_l.clone(),
		};
		let refreshed = self.refresh_to_boot(&lifted)?;

		// Split the halves back on the real axis while the conjugation key
		// is still available, then return to the residual ring. The decode
		// scaling already halved both axes, so the split stays integral.
		let conj_key = self
			.keys
			.galois
			.get(&self.params.bootstrapping().ring().galois_element_conjugation())
			.ok_or(Error::KeyMissing(KeyKind::Galois))?;
		let conj = self.boot_eval.conjugate(&refreshed, conj_key)?;
		let real = self.boot_eval.add(&refreshed, &conj)?;
		let imag = self.boot_eval.div_by_i(&self.boot_eval.sub(&refreshed, &conj)?);
		Ok((
			self.finalize(real)?,
			self.finalize(imag)?,
		))
	}

	/// The full refresh, ending in the bootstrap ring at the residual top
	/// level (plus the reserved prime when configured), scale Δ_residual.
	#[instrument(level = "debug", skip_all)]
	fn refresh_to_boot(&self, ct: &Ciphertext) -> Result<Ciphertext> {
		if ct.level() < self.params.minimum_input_level() {
			return Err(Error::InvalidInputLevel {
				level: ct.level(),
				min: self.params.minimum_input_level(),
			});
		}
		let (scaled, err_scale) = self.scale_down(ct)?;
		let raised = self.mod_up(&scaled)?;
		if raised.level() != self.params.coeffs_to_slots().level_q {
			return Err(Error::LevelInconsistency(
				"modulus raise did not land on the encode level",
			));
		}

		let (ct_real, ct_imag) = self
			.dft_eval
			.coeffs_to_slots(&raised, &self.c2s_matrix, &self.keys.galois)?;

		let boot_scale = self.params.bootstrapping_scale();
		let reduced_real =
			self.mod1_eval
				.evaluate(&ct_real, &self.mod1, None, &self.keys.relinearization)?;
		let (mut s2c_real, mut s2c_imag) = match ct_imag {
			Some(imag) => {
				let reduced_imag = self.mod1_eval.evaluate(
					&imag,
					&self.mod1,
					None,
					&self.keys.relinearization,
				)?;
				(reduced_real, Some(reduced_imag))
			}
			None => (reduced_real, None),
		};
		s2c_real.scale = boot_scale * err_scale;
		if let Some(imag) = s2c_imag.as_mut() {
			imag.scale = boot_scale * err_scale;
		}

		let mut out = self.dft_eval.slots_to_coeffs(
			&s2c_real,
			s2c_imag.as_ref(),
			&self.s2c_matrix,
			&self.keys.galois,
		)?;
		// The slots-to-coeffs diagonals already fold the residual-scale
		// restoration, so only the bookkeeping moves.
		out.scale = self.params.residual().default_scale() * err_scale;
		out.log_slots = ct.log_slots;

		let expected = self.params.output_level() + usize::from(self.params.reserved_prime());
		if out.level() != expected {
			return Err(Error::LevelInconsistency(
				"decode did not land on the residual top level",
			));
		}
		debug!(
			level = out.level(),
			scale = out.scale,
			err_scale,
			"refresh complete"
		);
		Ok(out)
	}

	/// META-BTS refinement: repeatedly bootstraps the scaled residual error
	/// and subtracts it back out. Undoing the precision factor is a rounded
	/// division realised by the reserved prime's rescaling; without that
	/// prime the very first iteration already hits the precision ceiling.
	fn refine(&self, input: &Ciphertext, base: Ciphertext) -> Result<Ciphertext> {
		let iterations = match self.params.iterations() {
			Some(it) => it.clone(),
			None => return Ok(base),
		};
		if iterations.bootstrapping_precision.is_empty() {
			return Ok(base);
		}
		if !self.params.reserved_prime() {
			return Err(Error::EarlyStop);
		}
		let reserved_level = self.params.output_level() + 1;
		let q_reserved = self.params.bootstrapping().q()[reserved_level] as f64;

		let mut cur = base;
		let mut log_prec_sum = 0usize;
		for &log_prec in &iterations.bootstrapping_precision {
			log_prec_sum += log_prec;
			let prec = 2f64.powi(log_prec_sum as i32);
			let divider = (q_reserved / prec).round();
			if divider < 1.0 {
				// Precision ceiling: hand back what was achieved so far.
				debug!(log_prec_sum, "refinement stopped at the precision ceiling");
				return Ok(cur);
			}

			let aligned = self.res_import(&cur)?;
			let mut aligned = self.res_eval.to_level(&aligned, input.level());
			// The running output and the input agree up to the rounded
			// scale factor; force the ledgers together before isolating
			// the error.
			aligned.scale = input.scale;
			let mut diff = self.res_eval.sub(&aligned, input)?;
			diff = self.res_eval.mul_scalar(
				&diff,
				&BigInt::from_f64(prec).expect("precision step fits an integer"),
			);

			// Refresh the isolated error, then divide it back down through
			// the reserved prime.
			let refreshed = self.refresh_to_boot(&diff)?;
			let mut correction = self.boot_eval.mul_scalar(
				&refreshed,
				&BigInt::from_f64(divider).expect("divider fits an integer"),
			);
			correction.scale *= divider;
			self.boot_eval.rescale(&mut correction)?;
			// The rounded divider leaves a relative offset of at most
			// 2^-reserved_bits on the correction term.
			correction.scale = cur.scale;

			let cur_now = self
				.boot_eval
				.to_level(&cur, correction.level().min(cur.level()));
			cur = self.boot_eval.sub(&cur_now, &correction)?;
			trace!(log_prec_sum, level = cur.level(), "refinement iteration");
		}
		Ok(cur)
	}

	/// Drops any reserved headroom and returns the ciphertext to the
	/// residual ring.
	fn finalize(&self, mut ct: Ciphertext) -> Result<Ciphertext> {
		self.boot_eval
			.drop_to_level(&mut ct, self.params.output_level())?;
		self.export_to_residual(&ct)
	}

	/// Scale-down: land the message at `q0 / 2^LogMessageRatio`
	/// on the base prime, returning the ciphertext and the residual error
	/// factor of the rounded multiplier.
	fn scale_down(&self, ct: &Ciphertext) -> Result<(Ciphertext, f64)> {
		let residual = self.params.residual();
		let q = residual.q();
		let target = q[0] as f64
			/ 2f64.powi(self.params.mod1().log_message_ratio as i32);
		let mut ratio = target / ct.scale;
		for level in 1..=ct.level() {
			ratio *= q[level] as f64;
		}
		if ratio < 0.5 {
			return Err(Error::ScaleBelowHalf);
		}
		let factor = ratio.round();
		let mut out = ct.clone();
		if factor > 1.0 || ct.level() > 0 {
			out = self.res_eval.mul_scalar(
				&out,
				&BigInt::from_f64(factor).ok_or(Error::ScaleBelowHalf)?,
			);
			out.scale *= factor;
			let levels = out.level();
			self.res_eval.rescale_by(&mut out, levels)?;
		}
		let err_scale = out.scale / target;
		trace!(err_scale, factor, "scale down");
		Ok((out, err_scale))
	}

	/// ModUp: optional sparse-secret encapsulation, balanced
	/// lift of the base residues to the full chain, scale correction to the
	/// modular-reduction period, and the trace collapsing excess slots.
	fn mod_up(&self, ct: &Ciphertext) -> Result<Ciphertext> {
		let boot = self.params.bootstrapping();
		let mut working = self.boot_import(ct)?;

		if let Some(d2s) = &self.keys.dense_to_sparse {
			working = self.boot_eval.apply_evaluation_key(&working, d2s)?;
		}

		// Balanced lift from q0 to the full chain.
		let top = boot.max_level();
		for p in working.c.iter_mut() {
			p.to_coeff();
			p.expand_from_first(top)?;
			p.to_ntt();
		}

		if let Some(s2d) = &self.keys.sparse_to_dense {
			working = self.boot_eval.apply_evaluation_key(&working, s2d)?;
		}

		// Align the wrap period with the modular-reduction scale.
		let q0 = boot.q()[0] as f64;
		let shift = self.params.mod1().log_scale as i64 - q0.log2().round() as i64;
		if shift > 0 {
			working = self.boot_eval.mul_scalar(
				&working,
				&(BigInt::from(1) << shift as usize),
			);
		}

		// Collapse the excess slots so the doubled-dimension transform sees
		// a periodic ciphertext.
		let log_dim = self.c2s_matrix.log_dim();
		let excess = boot.log_max_slots() - log_dim;
		if excess > 0 {
			working = self.boot_eval.mul_pow2_inv(&working, excess)?;
			for t in log_dim..boot.log_max_slots() {
				let rotation = 1i64 << t;
				let element = boot.ring().galois_element(rotation);
				let key = self
					.keys
					.galois
					.get(&element)
					.ok_or(Error::KeyMissing(KeyKind::Galois))?;
				let rotated = self.boot_eval.rotate(&working, rotation, key)?;
				working = self.boot_eval.add(&working, &rotated)?;
			}
		}
		working.log_slots = self.params.log_max_slots();
		Ok(working)
	}

	/// Moves a residual-ring ciphertext into the bootstrap ring, embedding
	/// the coefficients and switching to the bootstrapping secret when the
	/// degrees differ.
	fn boot_import(&self, ct: &Ciphertext) -> Result<Ciphertext> {
		let boot = self.params.bootstrapping();
		let gap = boot.n() / self.params.residual().n();
		let mut out = Ciphertext {
			c: ct
				.c
				.iter()
				.map(|p| transplant(p, boot.ring(), gap, 1))
				.collect::<Result<Vec<_>>>()?,
			scale: ct.scale,
			log_slots: ct.log_slots,
		};
		if gap > 1 {
			let key = self
				.keys
				.ring_to_larger
				.as_ref()
				.ok_or(Error::KeyMissing(KeyKind::RingToLarger))?;
			out = self.boot_eval.apply_evaluation_key(&out, key)?;
		}
		Ok(out)
	}

	/// Returns a bootstrap-ring ciphertext to the residual ring, switching
	/// to the embedded residual secret and sampling the coefficient grid
	/// when the degrees differ.
	fn export_to_residual(&self, ct: &Ciphertext) -> Result<Ciphertext> {
		let residual = self.params.residual();
		let gap = self.params.bootstrapping().n() / residual.n();
		let mut working = ct.clone();
		if gap > 1 {
			let key = self
				.keys
				.ring_to_smaller
				.as_ref()
				.ok_or(Error::KeyMissing(KeyKind::RingToSmaller))?;
			working = self.boot_eval.apply_evaluation_key(&working, key)?;
		}
		Ok(Ciphertext {
			c: working
				.c
				.iter()
				.map(|p| transplant(p, residual.ring(), 1, gap))
				.collect::<Result<Vec<_>>>()?,
			scale: working.scale,
			log_slots: working.log_slots,
		})
	}

	/// Returns a bootstrap-ring ciphertext at residual levels to the
	/// residual context (switching and sampling when the degrees differ).
	fn res_import(&self, ct: &Ciphertext) -> Result<Ciphertext> {
		let residual = self.params.residual();
		let working = self
			.boot_eval
			.to_level(ct, ct.level().min(residual.max_level()));
		self.export_to_residual(&working)
	}

	/// Bootstraps a batch of sparse ciphertexts by packing chunks into the
	/// circuit's slot capacity, refreshing once per chunk, and unpacking in
	/// the bootstrap ring where the projection keys live.
	fn bootstrap_packed(&self, cts: &[Ciphertext]) -> Result<Vec<Ciphertext>> {
		let capacity = 1usize << (self.params.log_max_slots() - cts[0].log_slots);
		let mut out = Vec::with_capacity(cts.len());
		for chunk in cts.chunks(capacity) {
			let packed = crate::packing::pack(
				&self.res_eval,
				chunk,
				self.params.log_max_slots(),
			)?;
			debug_assert_eq!(packed.len(), 1);
			let refreshed = self.refresh_to_boot(&packed[0])?;
			let refreshed = self.refine(&packed[0], refreshed)?;
			let pieces = crate::packing::unpack(
				&self.boot_eval,
				&refreshed,
				cts[0].log_slots,
				chunk.len(),
				&self.keys.galois,
			)?;
			for piece in pieces {
				out.push(self.finalize(piece)?);
			}
		}
		Ok(out)
	}
}

impl Bootstrapper for Evaluator {
	fn bootstrap(&self, ct: &Ciphertext) -> Result<Ciphertext> {
		if self.params.residual().ring_type() != RingType::Standard {
			return Err(Error::RingMismatch);
		}
		let refreshed = self.refresh_to_boot(ct)?;
		let refreshed = self.refine(ct, refreshed)?;
		self.finalize(refreshed)
	}

	fn bootstrap_many(&self, cts: &[Ciphertext]) -> Result<Vec<Ciphertext>> {
		if cts.is_empty() {
			return Ok(Vec::new());
		}
		if self.params.residual().ring_type() == RingType::ConjugateInvariant {
			// Pairs share one refresh; an odd tail pairs with nothing.
			let mut out = Vec::with_capacity(cts.len());
			for pair in cts.chunks(2) {
				let (l, r) = self.evaluate_conjugate_invariant(&pair[0], pair.get(1))?;
				out.push(l);
				if pair.len() == 2 {
					out.push(r);
				}
			}
			return Ok(out);
		}
		let uniform_sparse = cts[0].log_slots < self.params.log_max_slots()
			&& cts.iter().all(|ct| ct.log_slots == cts[0].log_slots);
		if uniform_sparse {
			return self.bootstrap_packed(cts);
		}
		cts.par_iter()
			.map(|ct| self.shallow_copy().bootstrap(ct))
			.collect()
	}

	fn depth(&self) -> usize {
		self.params.depth()
	}

	fn minimum_input_level(&self) -> usize {
		self.params.minimum_input_level()
	}

	fn output_level(&self) -> usize {
		self.params.output_level()
	}
}

/// Re-expresses a polynomial in another ring context sharing the same prime
/// prefix, spreading coefficients by `spread` or sampling every `sample`-th
/// one. `spread` and `sample` are mutually exclusive stride factors.
fn transplant(
	poly: &Poly,
	target: &Arc<ckks::RingContext>,
	spread: usize,
	sample: usize,
) -> Result<Poly> {
	let mut src = poly.clone();
	if spread == 1 && sample == 1 {
		// Same degree: the rows carry over verbatim.
		let rows: Vec<Vec<u64>> = (0..src.rows()).map(|i| src.row(i).to_vec()).collect();
		return Ok(Poly::from_rows(target, rows, src.level() + 1, src.representation()));
	}
	src.to_coeff();
	let n_target = target.degree();
	let mut rows = Vec::with_capacity(src.level() + 1);
	for i in 0..=src.level() {
		let row = src.row(i);
		let mut out = vec![0u64; n_target];
		if spread > 1 {
			for (j, &c) in row.iter().enumerate() {
				out[j * spread] = c;
			}
		} else {
			for (j, slot) in out.iter_mut().enumerate() {
				*slot = row[j * sample];
			}
		}
		rows.push(out);
	}
	let mut out = Poly::from_rows(target, rows, src.level() + 1, Representation::Coefficient);
	out.to_ntt();
	Ok(out)
}

/// The secret-key oracle bootstrapper: decrypts and re-encrypts. Only for
/// tests and composed circuits wanting the abstract contract.
#[derive(Debug, Clone)]
pub struct SecretKeyBootstrapper {
	params: Parameters,
	encoder: Encoder,
	encryptor: ckks::Encryptor,
	decryptor: ckks::Decryptor,
}

impl SecretKeyBootstrapper {
	/// Creates the oracle from the residual secret.
	pub fn new(params: &Parameters, sk: &SecretKey) -> Self {
		let residual = params.residual();
		Self {
			params: params.clone(),
			encoder: Encoder::new(residual),
			encryptor: ckks::Encryptor::new(residual, sk),
			decryptor: ckks::Decryptor::new(residual, sk),
		}
	}
}

impl Bootstrapper for SecretKeyBootstrapper {
	fn bootstrap(&self, ct: &Ciphertext) -> Result<Ciphertext> {
		if ct.level() < self.minimum_input_level() {
			return Err(Error::InvalidInputLevel {
				level: ct.level(),
				min: self.minimum_input_level(),
			});
		}
		let values = self.decryptor.decrypt_decode(ct, &self.encoder)?;
		let residual = self.params.residual();
		let pt = self.encoder.encode(
			&values,
			residual.max_level(),
			residual.default_scale(),
			ct.log_slots,
		)?;
		Ok(self.encryptor.encrypt(&pt, &mut rand::thread_rng())?)
	}

	fn bootstrap_many(&self, cts: &[Ciphertext]) -> Result<Vec<Ciphertext>> {
		cts.iter().map(|ct| self.bootstrap(ct)).collect()
	}

	fn depth(&self) -> usize {
		self.params.depth()
	}

	fn minimum_input_level(&self) -> usize {
		self.params.minimum_input_level()
	}

	fn output_level(&self) -> usize {
		self.params.output_level()
	}
}
