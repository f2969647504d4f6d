use static_assertions::const_assert;

/// The evaluation-key kinds the bootstrap circuit may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
	/// The relinearisation key of the bootstrapping parameters.
	Relinearization,
	/// A Galois key for one rotation or the conjugation.
	Galois,
	/// The ring-degree switching key N1 -> N2.
	RingToLarger,
	/// The ring-degree switching key N2 -> N1.
	RingToSmaller,
	/// The dense-to-sparse encapsulation key.
	DenseToSparse,
	/// The sparse-to-dense encapsulation key.
	SparseToDense,
}

impl std::fmt::Display for KeyKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			KeyKind::Relinearization => "relinearization",
			KeyKind::Galois => "galois",
			KeyKind::RingToLarger => "ring degree N1 to N2",
			KeyKind::RingToSmaller => "ring degree N2 to N1",
			KeyKind::DenseToSparse => "dense to sparse",
			KeyKind::SparseToDense => "sparse to dense",
		};
		f.write_str(name)
	}
}

/// All errors surfaced by the bootstrapping core. Every kind is recoverable
/// by the caller; none panics.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
	/// A parameter invariant failed during construction.
	#[error("incompatible parameters: {0}")]
	ParameterCompatibility(&'static str),

	/// The prime generator could not satisfy the requested bit-width pool.
	#[error("prime pool exhausted")]
	PrimePoolExhausted,

	/// The x-mod-1 approximation type is not recognised.
	#[error("invalid mod-1 approximation type")]
	InvalidMod1Type,

	/// A discrete cosine approximation was requested below the minimum
	/// degree `2(K - 1)`.
	#[error("mod-1 degree {degree} is below the minimum {min} for this interval")]
	Mod1DegreeTooSmall {
		/// The requested degree.
		degree: usize,
		/// The minimum admissible degree.
		min: usize,
	},

	/// A continuous sine approximation cannot use double-angle lifting.
	#[error("double angle folding requires a cosine approximation")]
	DoubleAngleMisuse,

	/// The input ciphertext sits below the minimum bootstrappable level.
	#[error("input level {level} is below the minimum {min}")]
	InvalidInputLevel {
		/// The level of the offending ciphertext.
		level: usize,
		/// The minimum input level of the circuit.
		min: usize,
	},

	/// The scale-down step cannot reach the target message ratio.
	#[error("scale is below half of the target scaling factor")]
	ScaleBelowHalf,

	/// A required evaluation key is absent.
	#[error("missing evaluation key: {0}")]
	KeyMissing(KeyKind),

	/// The circuit-order invariants broke mid-pipeline.
	#[error("level inconsistency in the bootstrap pipeline: {0}")]
	LevelInconsistency(&'static str),

	/// The input ring type does not match the configured parameters.
	#[error("ciphertext ring type does not match the residual parameters")]
	RingMismatch,

	/// META-BTS cannot reach the requested precision without a reserved
	/// prime; the partial result is still usable.
	#[error("iteration precision ceiling reached without a reserved prime")]
	EarlyStop,

	/// The Remez iteration failed to converge.
	#[error("minimax approximation failed to converge")]
	Convergence,

	/// An error propagated from the scheme layer.
	#[error(transparent)]
	Ckks(#[from] ckks::Error),
}

const_assert!(std::mem::size_of::<Error>() <= 40);

/// The result type of the bootstrapping core.
pub type Result<T> = std::result::Result<T, Error>;
