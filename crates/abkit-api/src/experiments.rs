//! Handlers for `/experiments` administration endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/experiments` | Newest first |
//! | `GET`    | `/experiments/{id}/stats` | Empty list for an unknown id |
//! | `DELETE` | `/experiments/{id}/data` | Clears assignments and goals |
//! | `DELETE` | `/experiments/{id}` | Removes the experiment entirely |

use abkit_core::{
  experiment::{Experiment, VariantStats},
  store::ExperimentStore,
};
use axum::{
  Json,
  extract::{Path, State},
};

use crate::{ApiState, Outcome, error::ApiError};

// ─── Read ─────────────────────────────────────────────────────────────────────

/// `GET /experiments`
pub async fn list<S>(
  State(state): State<ApiState<S>>,
) -> Result<Json<Vec<Experiment>>, ApiError>
where
  S: ExperimentStore,
{
  let experiments = state
    .store
    .list_experiments()
    .await
    .map_err(ApiError::store)?;
  Ok(Json(experiments))
}

/// `GET /experiments/{id}/stats`
pub async fn stats<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<i64>,
) -> Result<Json<Vec<VariantStats>>, ApiError>
where
  S: ExperimentStore,
{
  let stats = state
    .store
    .compute_stats(id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(stats))
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// `DELETE /experiments/{id}/data`
pub async fn delete_data<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<i64>,
) -> Result<Json<Outcome>, ApiError>
where
  S: ExperimentStore,
{
  let success = state
    .store
    .delete_experiment_data(id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(Outcome { success }))
}

/// `DELETE /experiments/{id}`
pub async fn delete_one<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<i64>,
) -> Result<Json<Outcome>, ApiError>
where
  S: ExperimentStore,
{
  let success = state
    .store
    .delete_experiment(id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(Outcome { success }))
}
