//! Error types for `abkit-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Rejected before any write took place.
  #[error("invalid input: {0}")]
  InvalidInput(String),

  #[error("experiment {0} has no variants")]
  NoVariants(i64),

  /// A uniqueness conflict was reported but the winning row could not be
  /// read back afterwards.
  #[error("{entity} for {key:?} missing after a uniqueness conflict")]
  ConflictUnresolved { entity: &'static str, key: String },

  #[error("storage error: {0}")]
  Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Wrap a backend error as [`Error::Storage`].
  pub fn storage(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Storage(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
