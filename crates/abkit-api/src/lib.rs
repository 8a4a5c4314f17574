//! JSON HTTP API for abkit.
//!
//! Exposes an axum [`Router`] backed by any
//! [`abkit_core::store::ExperimentStore`]. TLS and admin auth are the
//! caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/ab", abkit_api::api_router(store, VisitorCookie::default()))
//! ```

pub mod assign;
pub mod error;
pub mod experiments;
pub mod goals;
pub mod visitor;

use std::sync::Arc;

use abkit_core::store::ExperimentStore;
use axum::{
  Router,
  routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};

pub use error::ApiError;
pub use visitor::VisitorCookie;

/// Shared handler state.
pub struct ApiState<S> {
  pub store:  Arc<S>,
  pub cookie: Arc<VisitorCookie>,
}

// Derived `Clone` would demand `S: Clone`.
impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self {
      store:  Arc::clone(&self.store),
      cookie: Arc::clone(&self.cookie),
    }
  }
}

/// `{"success": bool}` reply for goal and delete endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
  pub success: bool,
}

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>, cookie: VisitorCookie) -> Router<()>
where
  S: ExperimentStore + 'static,
{
  let state = ApiState { store, cookie: Arc::new(cookie) };

  Router::new()
    // Visitor-facing
    .route("/assign", post(assign::handler::<S>))
    .route("/goal", get(goals::track_query::<S>).post(goals::track_json::<S>))
    // Administration
    .route("/experiments", get(experiments::list::<S>))
    .route("/experiments/{id}", delete(experiments::delete_one::<S>))
    .route("/experiments/{id}/stats", get(experiments::stats::<S>))
    .route("/experiments/{id}/data", delete(experiments::delete_data::<S>))
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────
