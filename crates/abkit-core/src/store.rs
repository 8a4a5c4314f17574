//! Storage seams.
//!
//! [`ExperimentTx`] is the synchronous unit of work the engine runs against:
//! one value of it corresponds to one open transaction in the backend.
//! [`ExperimentStore`] is the async surface that callers (HTTP layer, admin
//! tooling) depend on; a backend implements it by opening a transaction,
//! running the matching [`crate::engine`] function, and committing.

use std::future::Future;

use crate::{
  Result,
  experiment::{AssignRequest, Assignment, Experiment, Variant, VariantCounts, VariantStats},
};

// ─── Insert outcome ──────────────────────────────────────────────────────────

/// Result of an insert guarded by a uniqueness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
  Created,
  /// A row with the same unique key already exists. The caller re-reads it.
  Conflict,
}

// ─── Unit of work ────────────────────────────────────────────────────────────

/// Data access available inside a single store transaction.
///
/// Every method either completes or returns [`crate::Error::Storage`]; the
/// backend decides whether to commit based on the engine's result.
pub trait ExperimentTx {
  // ── Experiments ───────────────────────────────────────────────────────

  fn find_experiment(&mut self, key: &str) -> Result<Option<Experiment>>;

  fn find_experiment_by_id(&mut self, id: i64) -> Result<Option<Experiment>>;

  /// Insert an experiment. A key that already exists yields
  /// [`Insert::Conflict`] and leaves the stored name untouched.
  fn insert_experiment(&mut self, key: &str, name: Option<&str>) -> Result<Insert>;

  /// All experiments, highest id first.
  fn list_experiments(&mut self) -> Result<Vec<Experiment>>;

  // ── Variants ──────────────────────────────────────────────────────────

  /// Insert the variant, or overwrite the weight of an existing one.
  fn upsert_variant(&mut self, experiment_id: i64, key: &str, weight: u32) -> Result<()>;

  /// All variants of an experiment ordered by key.
  fn list_variants(&mut self, experiment_id: i64) -> Result<Vec<Variant>>;

  // ── Assignments ───────────────────────────────────────────────────────

  fn find_assignment(&mut self, experiment_id: i64, visitor: &str) -> Result<Option<Assignment>>;

  fn insert_assignment(
    &mut self,
    experiment_id: i64,
    variant_id: i64,
    visitor: &str,
  ) -> Result<Insert>;

  // ── Events ────────────────────────────────────────────────────────────

  fn event_exists(&mut self, experiment_id: i64, visitor: &str, event: &str) -> Result<bool>;

  fn insert_event(
    &mut self,
    experiment_id: i64,
    variant_id: i64,
    visitor: &str,
    event: &str,
  ) -> Result<Insert>;

  // ── Aggregation ───────────────────────────────────────────────────────

  /// One entry per variant of the experiment with its assignment count and
  /// the count of `event` rows. Variants without rows report zero.
  fn variant_counts(&mut self, experiment_id: i64, event: &str) -> Result<Vec<VariantCounts>>;

  // ── Administration ────────────────────────────────────────────────────

  /// Delete all events and assignments of an experiment.
  fn clear_experiment_data(&mut self, experiment_id: i64) -> Result<()>;

  /// Delete events, assignments, variants and the experiment row.
  fn remove_experiment(&mut self, experiment_id: i64) -> Result<()>;
}

// ─── Async store ─────────────────────────────────────────────────────────────

/// Abstraction over an experiment store backend.
///
/// Each method is one atomic unit of work: either all of its writes become
/// visible or none do. All methods return `Send` futures so the trait can be
/// used from multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait ExperimentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Return the visitor's sticky variant, assigning one on first call.
  fn assign<'a>(
    &'a self,
    request: &'a AssignRequest,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'a;

  /// Record the visitor's goal for the experiment at most once.
  ///
  /// `false` means there was nothing to record against (unknown experiment
  /// or unassigned visitor) or the write failed.
  fn track_goal<'a>(
    &'a self,
    experiment_key: &'a str,
    visitor: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Per-variant views, goals and conversion rate, ordered by variant key.
  fn compute_stats(
    &self,
    experiment_id: i64,
  ) -> impl Future<Output = Result<Vec<VariantStats>, Self::Error>> + Send + '_;

  /// All experiments, most recently created first.
  fn list_experiments(
    &self,
  ) -> impl Future<Output = Result<Vec<Experiment>, Self::Error>> + Send + '_;

  /// Clear assignments and goal events but keep the experiment and its
  /// variants. `false` if the experiment does not exist.
  fn delete_experiment_data(
    &self,
    experiment_id: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Delete the experiment and everything that belongs to it. `false` if the
  /// experiment does not exist.
  fn delete_experiment(
    &self,
    experiment_id: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}
