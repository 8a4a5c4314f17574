//! Encoding and decoding helpers between domain types and the plain values
//! stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings. Decoding failures surface as
//! [`abkit_core::Error::Storage`] because they can only come from a corrupted
//! or foreign database.

use abkit_core::{
  Error as CoreError, Result as CoreResult,
  experiment::{Assignment, Experiment, Variant},
};
use chrono::{DateTime, Utc};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> CoreResult<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(CoreError::storage)
}

// ─── Counts ──────────────────────────────────────────────────────────────────

/// SQLite `COUNT(*)` is a signed integer; it is never negative.
pub fn decode_count(n: i64) -> u64 { u64::try_from(n).unwrap_or(0) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from an `experiments` row.
pub struct RawExperiment {
  pub id:         i64,
  pub key:        String,
  pub name:       Option<String>,
  pub created_at: String,
}

impl RawExperiment {
  pub const COLUMNS: &'static str = "id, experiment_key, name, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      key:        row.get(1)?,
      name:       row.get(2)?,
      created_at: row.get(3)?,
    })
  }

  pub fn into_experiment(self) -> CoreResult<Experiment> {
    Ok(Experiment {
      id:         self.id,
      key:        self.key,
      name:       self.name,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub fn variant_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Variant> {
  Ok(Variant {
    id:            row.get(0)?,
    experiment_id: row.get(1)?,
    key:           row.get(2)?,
    name:          row.get(3)?,
    weight:        row.get(4)?,
  })
}

/// Raw values from an `assignments` row joined with its variant.
pub struct RawAssignment {
  pub experiment_id: i64,
  pub variant_id:    i64,
  pub variant_key:   String,
  pub visitor:       String,
  pub assigned_at:   String,
}

impl RawAssignment {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      experiment_id: row.get(0)?,
      variant_id:    row.get(1)?,
      variant_key:   row.get(2)?,
      visitor:       row.get(3)?,
      assigned_at:   row.get(4)?,
    })
  }

  pub fn into_assignment(self) -> CoreResult<Assignment> {
    Ok(Assignment {
      experiment_id: self.experiment_id,
      variant_id:    self.variant_id,
      variant_key:   self.variant_key,
      visitor:       self.visitor,
      assigned_at:   decode_dt(&self.assigned_at)?,
    })
  }
}
