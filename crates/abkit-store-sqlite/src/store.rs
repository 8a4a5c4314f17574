//! [`SqliteStore`]: the SQLite implementation of [`ExperimentStore`].

use std::{path::Path, time::Duration};

use abkit_core::{
  Result as CoreResult, engine,
  experiment::{AssignRequest, Experiment, VariantStats},
  select::{RandomSource, ThreadRandom},
  store::ExperimentStore,
};
use rusqlite::TransactionBehavior;

use crate::{
  Error, Result,
  schema::{SCHEMA, SCHEMA_VERSION},
  tx::SqliteTx,
};

/// How long a connection waits on another writer's lock before failing.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Store ───────────────────────────────────────────────────────────────────

/// An experiment store backed by a single SQLite file.
///
/// Clones share one reference-counted connection.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) the database at `path`.
  ///
  /// The schema is not touched; call [`Self::migrate`] once when deploying
  /// and [`Self::ensure_schema`] before serving.
  pub async fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.configure(busy_timeout).await?;
    Ok(store)
  }

  /// Open an in-memory store with the schema already applied.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.configure(DEFAULT_BUSY_TIMEOUT).await?;
    store.migrate().await?;
    Ok(store)
  }

  async fn configure(&self, busy_timeout: Duration) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Apply the schema if the database is behind [`SCHEMA_VERSION`].
  /// Returns the version the database was at before.
  pub async fn migrate(&self) -> Result<i64> {
    let before = self
      .conn
      .call(|conn| {
        let version = conn.query_row("PRAGMA user_version", [], |r| r.get::<_, i64>(0))?;
        if version < SCHEMA_VERSION {
          conn.execute_batch(SCHEMA)?;
        }
        Ok(version)
      })
      .await?;

    if before < SCHEMA_VERSION {
      tracing::info!(from = before, to = SCHEMA_VERSION, "migrated schema");
    }
    Ok(before)
  }

  /// The `user_version` recorded in the database.
  pub async fn schema_version(&self) -> Result<i64> {
    Ok(
      self
        .conn
        .call(|conn| Ok(conn.query_row("PRAGMA user_version", [], |r| r.get::<_, i64>(0))?))
        .await?,
    )
  }

  /// Fail unless the database is at exactly [`SCHEMA_VERSION`].
  pub async fn ensure_schema(&self) -> Result<()> {
    let found = self.schema_version().await?;
    if found != SCHEMA_VERSION {
      return Err(Error::SchemaOutdated { found, expected: SCHEMA_VERSION });
    }
    Ok(())
  }

  /// [`ExperimentStore::assign`] with a caller-supplied random source.
  pub async fn assign_with<R>(&self, request: AssignRequest, mut rng: R) -> Result<String>
  where
    R: RandomSource + Send + 'static,
  {
    self
      .run(TransactionBehavior::Immediate, move |tx| {
        engine::assign(tx, &mut rng, &request)
      })
      .await
  }

  /// Run `f` inside one transaction on the connection thread.
  ///
  /// The transaction commits only if `f` succeeds; on error it is rolled back
  /// when dropped and the error is returned. If SQLite already rolled the
  /// transaction back on its own while `f` absorbed the failure, there is
  /// nothing left to commit and `f`'s result stands.
  pub(crate) async fn run<T, F>(&self, behavior: TransactionBehavior, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut SqliteTx<'_>) -> CoreResult<T> + Send + 'static,
  {
    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(behavior)?;
        let outcome = f(&mut SqliteTx::new(&tx));
        if outcome.is_ok() {
          if tx.is_autocommit() {
            tracing::warn!("transaction was rolled back by sqlite; skipping commit");
          } else {
            tx.commit()?;
          }
        }
        Ok(outcome)
      })
      .await?;

    Ok(outcome?)
  }
}

// ─── ExperimentStore impl ────────────────────────────────────────────────────

impl ExperimentStore for SqliteStore {
  type Error = Error;

  async fn assign(&self, request: &AssignRequest) -> Result<String> {
    self.assign_with(request.clone(), ThreadRandom).await
  }

  async fn track_goal(&self, experiment_key: &str, visitor: &str) -> Result<bool> {
    let experiment_key = experiment_key.to_owned();
    let visitor        = visitor.to_owned();

    self
      .run(TransactionBehavior::Immediate, move |tx| {
        engine::track_goal(tx, &experiment_key, &visitor)
      })
      .await
  }

  async fn compute_stats(&self, experiment_id: i64) -> Result<Vec<VariantStats>> {
    self
      .run(TransactionBehavior::Deferred, move |tx| {
        engine::compute_stats(tx, experiment_id)
      })
      .await
  }

  async fn list_experiments(&self) -> Result<Vec<Experiment>> {
    self
      .run(TransactionBehavior::Deferred, |tx| engine::list_experiments(tx))
      .await
  }

  async fn delete_experiment_data(&self, experiment_id: i64) -> Result<bool> {
    let cleared = self
      .run(TransactionBehavior::Immediate, move |tx| {
        engine::delete_experiment_data(tx, experiment_id)
      })
      .await?;
    if cleared {
      tracing::info!(experiment_id, "cleared experiment data");
    }
    Ok(cleared)
  }

  async fn delete_experiment(&self, experiment_id: i64) -> Result<bool> {
    let deleted = self
      .run(TransactionBehavior::Immediate, move |tx| {
        engine::delete_experiment(tx, experiment_id)
      })
      .await?;
    if deleted {
      tracing::info!(experiment_id, "deleted experiment");
    }
    Ok(deleted)
  }
}
