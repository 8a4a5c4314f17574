//! Experiment types: experiments, their variants, and the per-visitor
//! records that hang off them.
//!
//! An experiment is created lazily the first time a visitor is assigned to
//! it. Assignments and goal events are immutable once written; the only way
//! to remove them is an administrative delete.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The single event name recorded by the goal tracker.
pub const GOAL_EVENT: &str = "goal";

// ─── Experiment ──────────────────────────────────────────────────────────────

/// A named test with one or more variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
  pub id:         i64,
  /// Externally chosen, globally unique identity.
  pub key:        String,
  /// Display name; only the value supplied on creation is ever stored.
  pub name:       Option<String>,
  /// Store-assigned creation timestamp.
  pub created_at: DateTime<Utc>,
}

// ─── Variant ─────────────────────────────────────────────────────────────────

/// One arm of an experiment. Unique on `(experiment_id, key)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
  pub id:            i64,
  pub experiment_id: i64,
  pub key:           String,
  pub name:          Option<String>,
  /// Relative selection weight. Zero is stored as-is and treated as one when
  /// selecting.
  pub weight:        u32,
}

impl Variant {
  /// The weight actually used by the selector.
  pub fn effective_weight(&self) -> u64 { u64::from(self.weight.max(1)) }
}

// ─── Assignment ──────────────────────────────────────────────────────────────

/// The sticky binding of one visitor to one variant within one experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
  pub experiment_id: i64,
  pub variant_id:    i64,
  pub variant_key:   String,
  pub visitor:       String,
  pub assigned_at:   DateTime<Utc>,
}

// ─── Requests ────────────────────────────────────────────────────────────────

/// Variant key → weight. A `BTreeMap` so reconciliation always walks the keys
/// in the same order.
pub type Weights = BTreeMap<String, u32>;

/// The weights used when a caller supplies none: an even A/B split.
pub fn default_weights() -> Weights {
  Weights::from([("A".to_owned(), 50), ("B".to_owned(), 50)])
}

/// Input to [`crate::engine::assign`] and
/// [`crate::store::ExperimentStore::assign`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignRequest {
  pub experiment_key:  String,
  pub experiment_name: Option<String>,
  pub weights:         Weights,
  pub visitor:         String,
}

impl AssignRequest {
  pub fn new(
    experiment_key: impl Into<String>,
    weights: Weights,
    visitor: impl Into<String>,
  ) -> Self {
    Self {
      experiment_key: experiment_key.into(),
      experiment_name: None,
      weights,
      visitor: visitor.into(),
    }
  }

  /// Set the display name used if this request creates the experiment.
  pub fn named(mut self, name: impl Into<String>) -> Self {
    self.experiment_name = Some(name.into());
    self
  }

  /// Reject requests that could never produce an assignment.
  pub fn validate(&self) -> Result<()> {
    if self.experiment_key.is_empty() {
      return Err(Error::InvalidInput("experiment key is empty".into()));
    }
    if self.visitor.is_empty() {
      return Err(Error::InvalidInput("visitor token is empty".into()));
    }
    if self.weights.is_empty() {
      return Err(Error::InvalidInput(format!(
        "no variants supplied for experiment {:?}",
        self.experiment_key
      )));
    }
    if self.weights.keys().any(String::is_empty) {
      return Err(Error::InvalidInput("variant key is empty".into()));
    }
    Ok(())
  }
}

// ─── Stats ───────────────────────────────────────────────────────────────────

/// Raw per-variant counts as read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantCounts {
  pub variant_key: String,
  pub views:       u64,
  pub goals:       u64,
}

/// One row of the statistics table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantStats {
  pub variant_key:     String,
  pub views:           u64,
  pub goals:           u64,
  /// Percentage rounded to two decimals; `0.0` without views.
  pub conversion_rate: f64,
}

impl From<VariantCounts> for VariantStats {
  fn from(counts: VariantCounts) -> Self {
    Self {
      conversion_rate: conversion_rate(counts.goals, counts.views),
      variant_key:     counts.variant_key,
      views:           counts.views,
      goals:           counts.goals,
    }
  }
}

/// `goals / views * 100`, rounded half away from zero to two decimals.
pub fn conversion_rate(goals: u64, views: u64) -> f64 {
  if views == 0 {
    return 0.0;
  }
  // Round in hundredths of a percent with integers so exact halves go up.
  let (goals, views) = (u128::from(goals), u128::from(views));
  let hundredths = (goals * 20_000 + views) / (2 * views);
  hundredths as f64 / 100.0
}
