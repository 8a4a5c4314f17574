//! The assignment engine, goal tracker and stats aggregator.
//!
//! Each function here is one logical operation and expects to be called with
//! a freshly opened [`ExperimentTx`]. Uniqueness conflicts reported by the
//! store (another caller won a race) are resolved here by re-reading the
//! winning row; every other storage failure is returned to the caller.

use tracing::{debug, warn};

use crate::{
  Error, Result,
  experiment::{AssignRequest, Experiment, GOAL_EVENT, VariantStats},
  select::{RandomSource, select},
  store::{ExperimentTx, Insert},
};

// ─── Assignment ──────────────────────────────────────────────────────────────

/// Return the visitor's variant for the experiment, creating the experiment,
/// its variants and the assignment as needed.
///
/// An existing assignment is returned as-is: weights supplied on later calls
/// only take effect for visitors who have not been assigned yet.
pub fn assign<T, R>(tx: &mut T, rng: &mut R, request: &AssignRequest) -> Result<String>
where
  T: ExperimentTx + ?Sized,
  R: RandomSource + ?Sized,
{
  request.validate()?;

  let experiment = resolve_experiment(tx, request)?;

  if let Some(existing) = tx.find_assignment(experiment.id, &request.visitor)? {
    return Ok(existing.variant_key);
  }

  for (key, weight) in &request.weights {
    tx.upsert_variant(experiment.id, key, *weight)?;
  }

  let variants = tx.list_variants(experiment.id)?;
  let chosen = select(&variants, rng).ok_or(Error::NoVariants(experiment.id))?;

  match tx.insert_assignment(experiment.id, chosen.id, &request.visitor)? {
    Insert::Created => {
      debug!(
        experiment = %experiment.key,
        variant = %chosen.key,
        "assigned visitor",
      );
      Ok(chosen.key.clone())
    }
    Insert::Conflict => {
      debug!(
        experiment = %experiment.key,
        "concurrent assignment won; returning stored variant",
      );
      tx.find_assignment(experiment.id, &request.visitor)?
        .map(|a| a.variant_key)
        .ok_or_else(|| Error::ConflictUnresolved {
          entity: "assignment",
          key:    request.visitor.clone(),
        })
    }
  }
}

/// Find the experiment by key or create it. The display name is only written
/// by whoever creates the row.
fn resolve_experiment<T>(tx: &mut T, request: &AssignRequest) -> Result<Experiment>
where
  T: ExperimentTx + ?Sized,
{
  let key = &request.experiment_key;
  if let Some(experiment) = tx.find_experiment(key)? {
    return Ok(experiment);
  }

  if tx.insert_experiment(key, request.experiment_name.as_deref())? == Insert::Conflict {
    debug!(experiment = %key, "experiment created concurrently");
  }

  tx.find_experiment(key)?.ok_or_else(|| Error::ConflictUnresolved {
    entity: "experiment",
    key:    key.clone(),
  })
}

// ─── Goals ───────────────────────────────────────────────────────────────────

/// Record the visitor's goal for the experiment.
///
/// Returns `false` for an unknown experiment, an unassigned visitor, or a
/// failed insert. A goal that is already recorded returns `true` without
/// writing.
pub fn track_goal<T>(tx: &mut T, experiment_key: &str, visitor: &str) -> Result<bool>
where
  T: ExperimentTx + ?Sized,
{
  let Some(experiment) = tx.find_experiment(experiment_key)? else {
    return Ok(false);
  };
  let Some(assignment) = tx.find_assignment(experiment.id, visitor)? else {
    return Ok(false);
  };

  if tx.event_exists(experiment.id, visitor, GOAL_EVENT)? {
    return Ok(true);
  }

  match tx.insert_event(experiment.id, assignment.variant_id, visitor, GOAL_EVENT) {
    Ok(Insert::Created) => Ok(true),
    Ok(Insert::Conflict) => {
      debug!(experiment = %experiment_key, "goal recorded concurrently");
      Ok(true)
    }
    Err(e) => {
      warn!(experiment = %experiment_key, error = %e, "failed to record goal");
      Ok(false)
    }
  }
}

// ─── Stats ───────────────────────────────────────────────────────────────────

/// Views, goals and conversion rate for every variant of the experiment,
/// ordered by variant key. Unknown experiments yield an empty table.
pub fn compute_stats<T>(tx: &mut T, experiment_id: i64) -> Result<Vec<VariantStats>>
where
  T: ExperimentTx + ?Sized,
{
  let mut stats: Vec<VariantStats> = tx
    .variant_counts(experiment_id, GOAL_EVENT)?
    .into_iter()
    .map(VariantStats::from)
    .collect();
  stats.sort_by(|a, b| a.variant_key.cmp(&b.variant_key));
  Ok(stats)
}

// ─── Administration ──────────────────────────────────────────────────────────

pub fn list_experiments<T>(tx: &mut T) -> Result<Vec<Experiment>>
where
  T: ExperimentTx + ?Sized,
{
  tx.list_experiments()
}

/// Clear assignments and goal events, keeping the experiment and variants.
pub fn delete_experiment_data<T>(tx: &mut T, experiment_id: i64) -> Result<bool>
where
  T: ExperimentTx + ?Sized,
{
  if tx.find_experiment_by_id(experiment_id)?.is_none() {
    return Ok(false);
  }
  tx.clear_experiment_data(experiment_id)?;
  Ok(true)
}

/// Delete the experiment with its variants, assignments and events.
pub fn delete_experiment<T>(tx: &mut T, experiment_id: i64) -> Result<bool>
where
  T: ExperimentTx + ?Sized,
{
  if tx.find_experiment_by_id(experiment_id)?.is_none() {
    return Ok(false);
  }
  tx.remove_experiment(experiment_id)?;
  Ok(true)
}
