//! Handler for `POST /assign`.
//!
//! Body: `{"experiment":"cta","name"?:"..","weights"?:{"A":50,"B":50},"visitor"?:".."}`
//!
//! Responds with the visitor's sticky variant. A visitor token is minted and
//! set as a cookie when the request carries neither a `visitor` nor a cookie.

use abkit_core::{
  experiment::{AssignRequest, Weights, default_weights},
  store::ExperimentStore,
};
use axum::{
  Json,
  extract::State,
  http::{HeaderMap, header},
  response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct AssignBody {
  pub experiment: String,
  pub name:       Option<String>,
  pub weights:    Option<Weights>,
  pub visitor:    Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssignResponse {
  pub experiment: String,
  pub variant:    String,
  pub visitor:    String,
}

/// `POST /assign`
pub async fn handler<S>(
  State(state): State<ApiState<S>>,
  headers: HeaderMap,
  Json(body): Json<AssignBody>,
) -> Result<Response, ApiError>
where
  S: ExperimentStore,
{
  let visitor = state.cookie.resolve(body.visitor, &headers);

  let mut request = AssignRequest::new(
    body.experiment,
    body.weights.unwrap_or_else(default_weights),
    visitor.token.clone(),
  );
  if let Some(name) = body.name {
    request = request.named(name);
  }
  request
    .validate()
    .map_err(|e| ApiError::BadRequest(e.to_string()))?;

  let variant = state.store.assign(&request).await.map_err(ApiError::store)?;

  let payload = Json(AssignResponse {
    experiment: request.experiment_key,
    variant,
    visitor: visitor.token.clone(),
  });

  if visitor.issued {
    let cookie = state.cookie.set_cookie(&visitor.token)?;
    Ok(([(header::SET_COOKIE, cookie)], payload).into_response())
  } else {
    Ok(payload.into_response())
  }
}
