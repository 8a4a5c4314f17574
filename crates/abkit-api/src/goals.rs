//! Handlers for goal tracking.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/goal` | Body: `{"experiment":"cta","visitor"?:".."}` |
//! | `GET`  | `/goal` | `?experiment=cta[&visitor=..]`, for pixel/beacon callers |
//!
//! Both answer `{"success": bool}`. A missing visitor is a plain `false`.

use abkit_core::store::ExperimentStore;
use axum::{
  Json,
  extract::{Query, State},
  http::HeaderMap,
};
use serde::Deserialize;

use crate::{ApiState, Outcome, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct GoalParams {
  pub experiment: String,
  pub visitor:    Option<String>,
}

/// `GET /goal?experiment=..`
pub async fn track_query<S>(
  State(state): State<ApiState<S>>,
  headers: HeaderMap,
  Query(params): Query<GoalParams>,
) -> Result<Json<Outcome>, ApiError>
where
  S: ExperimentStore,
{
  track(&state, &headers, params).await
}

/// `POST /goal`
pub async fn track_json<S>(
  State(state): State<ApiState<S>>,
  headers: HeaderMap,
  Json(params): Json<GoalParams>,
) -> Result<Json<Outcome>, ApiError>
where
  S: ExperimentStore,
{
  track(&state, &headers, params).await
}

async fn track<S>(
  state: &ApiState<S>,
  headers: &HeaderMap,
  params: GoalParams,
) -> Result<Json<Outcome>, ApiError>
where
  S: ExperimentStore,
{
  let Some(visitor) = state.cookie.find(params.visitor, headers) else {
    tracing::debug!(experiment = %params.experiment, "goal without visitor");
    return Ok(Json(Outcome { success: false }));
  };

  let success = state
    .store
    .track_goal(&params.experiment, &visitor)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(Outcome { success }))
}
