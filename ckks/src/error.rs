use static_assertions::const_assert;

/// A type representing all errors that can occur in the CKKS scheme layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
	/// User failed to set a polynomial degree.
	#[error("polynomial degree not set")]
	DegreeNotSet,

	/// User failed to set a coefficient modulus.
	#[error("coefficient modulus not set")]
	CoefficientModulusNotSet,

	/// An argument failed eager validation.
	#[error("invalid argument: {0}")]
	InvalidArgument(&'static str),

	/// The NTT-friendly prime generator ran out of candidates.
	#[error("prime generation failed for {bit_size}-bit primes with nth root {nth_root}")]
	PrimeGeneration {
		/// Requested prime bit size.
		bit_size: usize,
		/// Required 2N-th (or 4N-th) root order.
		nth_root: u64,
	},

	/// A ciphertext does not retain enough primes for the requested operation.
	#[error("ciphertext level {level} is below the minimum {min}")]
	LevelTooLow {
		/// Level carried by the operand.
		level: usize,
		/// Minimum level the operation needs.
		min: usize,
	},

	/// Two operands live at incompatible levels.
	#[error("operand levels {0} and {1} are incompatible")]
	LevelMismatch(usize, usize),

	/// Two operands carry scales too far apart to combine exactly.
	#[error("operand scales differ beyond tolerance")]
	ScaleMismatch,

	/// A polynomial was supplied in the wrong representation.
	#[error("polynomial representation mismatch")]
	RepresentationMismatch,

	/// Operands belong to different parameter sets.
	#[error("incompatible parameter sets")]
	IncompatibleParameters,
}

const_assert!(std::mem::size_of::<Error>() <= 32);

/// The result type for CKKS operations.
pub type Result<T> = std::result::Result<T, Error>;
