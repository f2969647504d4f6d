use crate::error::{Error, Result};
use crate::poly::Poly;

/// An RLWE ciphertext: a vector of polynomials (two, or three transiently
/// between a multiplication and its relinearisation), a scale, and the
/// logical slot layout of the encrypted message.
#[derive(Debug, Clone, PartialEq)]
pub struct Ciphertext {
	/// The ciphertext polynomials, in NTT representation.
	pub c: Vec<Poly>,
	/// The current scale of the encrypted message.
	pub scale: f64,
	/// log2 of the logical slot count of the encrypted message.
	pub log_slots: usize,
}

impl Ciphertext {
	/// The level the ciphertext lives at.
	pub fn level(&self) -> usize {
		self.c[0].level()
	}

	/// The number of polynomials (2 for a relinearised ciphertext).
	pub fn degree(&self) -> usize {
		self.c.len()
	}

	/// Fails unless the ciphertext retains at least `min` levels.
	pub fn ensure_level(&self, min: usize) -> Result<()> {
		if self.level() < min {
			return Err(Error::LevelTooLow {
				level: self.level(),
				min,
			});
		}
		Ok(())
	}
}
