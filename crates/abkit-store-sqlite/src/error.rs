//! Error type for `abkit-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] abkit_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  /// The database has not been migrated to the schema this build expects.
  #[error("schema version {found} does not match expected {expected}; run the migration first")]
  SchemaOutdated { found: i64, expected: i64 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
