//! [`SqliteTx`]: the SQLite implementation of [`ExperimentTx`].
//!
//! Borrows a connection that already has a transaction open on it; commit
//! and rollback are the caller's job (see `SqliteStore::run`).

use abkit_core::{
  Error as CoreError, Result as CoreResult,
  experiment::{Assignment, Experiment, Variant, VariantCounts},
  store::{ExperimentTx, Insert},
};
use chrono::Utc;
use rusqlite::{ErrorCode, OptionalExtension as _, ffi, params};

use crate::encode::{
  RawAssignment, RawExperiment, decode_count, encode_dt, variant_from_row,
};

pub(crate) struct SqliteTx<'c> {
  conn: &'c rusqlite::Connection,
}

impl<'c> SqliteTx<'c> {
  pub(crate) fn new(conn: &'c rusqlite::Connection) -> Self { Self { conn } }
}

/// Map the outcome of an `INSERT` against a `UNIQUE` constraint.
fn guarded_insert(result: rusqlite::Result<usize>) -> CoreResult<Insert> {
  match result {
    Ok(_) => Ok(Insert::Created),
    Err(rusqlite::Error::SqliteFailure(err, _))
      if err.code == ErrorCode::ConstraintViolation
        && err.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
    {
      Ok(Insert::Conflict)
    }
    Err(e) => Err(CoreError::storage(e)),
  }
}

impl ExperimentTx for SqliteTx<'_> {
  // ── Experiments ─────────────────────────────────────────────────────────

  fn find_experiment(&mut self, key: &str) -> CoreResult<Option<Experiment>> {
    let raw = self
      .conn
      .query_row(
        &format!(
          "SELECT {} FROM experiments WHERE experiment_key = ?1",
          RawExperiment::COLUMNS
        ),
        params![key],
        RawExperiment::from_row,
      )
      .optional()
      .map_err(CoreError::storage)?;

    raw.map(RawExperiment::into_experiment).transpose()
  }

  fn find_experiment_by_id(&mut self, id: i64) -> CoreResult<Option<Experiment>> {
    let raw = self
      .conn
      .query_row(
        &format!("SELECT {} FROM experiments WHERE id = ?1", RawExperiment::COLUMNS),
        params![id],
        RawExperiment::from_row,
      )
      .optional()
      .map_err(CoreError::storage)?;

    raw.map(RawExperiment::into_experiment).transpose()
  }

  fn insert_experiment(&mut self, key: &str, name: Option<&str>) -> CoreResult<Insert> {
    guarded_insert(self.conn.execute(
      "INSERT INTO experiments (experiment_key, name, created_at) VALUES (?1, ?2, ?3)",
      params![key, name, encode_dt(Utc::now())],
    ))
  }

  fn list_experiments(&mut self) -> CoreResult<Vec<Experiment>> {
    let mut stmt = self
      .conn
      .prepare(&format!(
        "SELECT {} FROM experiments ORDER BY id DESC",
        RawExperiment::COLUMNS
      ))
      .map_err(CoreError::storage)?;

    let raws = stmt
      .query_map([], RawExperiment::from_row)
      .map_err(CoreError::storage)?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(CoreError::storage)?;

    raws.into_iter().map(RawExperiment::into_experiment).collect()
  }

  // ── Variants ────────────────────────────────────────────────────────────

  fn upsert_variant(&mut self, experiment_id: i64, key: &str, weight: u32) -> CoreResult<()> {
    self
      .conn
      .execute(
        "INSERT INTO variants (experiment_id, variant_key, name, weight)
         VALUES (?1, ?2, ?2, ?3)
         ON CONFLICT (experiment_id, variant_key) DO UPDATE SET weight = excluded.weight",
        params![experiment_id, key, weight],
      )
      .map_err(CoreError::storage)?;
    Ok(())
  }

  fn list_variants(&mut self, experiment_id: i64) -> CoreResult<Vec<Variant>> {
    let mut stmt = self
      .conn
      .prepare(
        "SELECT id, experiment_id, variant_key, name, weight
         FROM variants
         WHERE experiment_id = ?1
         ORDER BY variant_key",
      )
      .map_err(CoreError::storage)?;

    stmt
      .query_map(params![experiment_id], variant_from_row)
      .map_err(CoreError::storage)?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(CoreError::storage)
  }

  // ── Assignments ─────────────────────────────────────────────────────────

  fn find_assignment(
    &mut self,
    experiment_id: i64,
    visitor: &str,
  ) -> CoreResult<Option<Assignment>> {
    let raw = self
      .conn
      .query_row(
        "SELECT a.experiment_id, a.variant_id, v.variant_key, a.visitor, a.assigned_at
         FROM assignments a
         JOIN variants v ON v.id = a.variant_id
         WHERE a.experiment_id = ?1
           AND a.visitor = ?2",
        params![experiment_id, visitor],
        RawAssignment::from_row,
      )
      .optional()
      .map_err(CoreError::storage)?;

    raw.map(RawAssignment::into_assignment).transpose()
  }

  fn insert_assignment(
    &mut self,
    experiment_id: i64,
    variant_id: i64,
    visitor: &str,
  ) -> CoreResult<Insert> {
    guarded_insert(self.conn.execute(
      "INSERT INTO assignments (experiment_id, variant_id, visitor, assigned_at)
       VALUES (?1, ?2, ?3, ?4)",
      params![experiment_id, variant_id, visitor, encode_dt(Utc::now())],
    ))
  }

  // ── Events ──────────────────────────────────────────────────────────────

  fn event_exists(&mut self, experiment_id: i64, visitor: &str, event: &str) -> CoreResult<bool> {
    Ok(
      self
        .conn
        .query_row(
          "SELECT 1 FROM events
           WHERE experiment_id = ?1
             AND visitor = ?2
             AND event = ?3",
          params![experiment_id, visitor, event],
          |_| Ok(true),
        )
        .optional()
        .map_err(CoreError::storage)?
        .unwrap_or(false),
    )
  }

  fn insert_event(
    &mut self,
    experiment_id: i64,
    variant_id: i64,
    visitor: &str,
    event: &str,
  ) -> CoreResult<Insert> {
    guarded_insert(self.conn.execute(
      "INSERT INTO events (experiment_id, variant_id, visitor, event, created_at)
       VALUES (?1, ?2, ?3, ?4, ?5)",
      params![experiment_id, variant_id, visitor, event, encode_dt(Utc::now())],
    ))
  }

  // ── Aggregation ─────────────────────────────────────────────────────────

  fn variant_counts(&mut self, experiment_id: i64, event: &str) -> CoreResult<Vec<VariantCounts>> {
    // One row per variant, including variants nobody has seen yet.
    let mut stmt = self
      .conn
      .prepare(
        "SELECT
           v.variant_key,
           (SELECT COUNT(*) FROM assignments a WHERE a.variant_id = v.id) AS views,
           (SELECT COUNT(*) FROM events e
             WHERE e.variant_id = v.id AND e.event = ?2)                   AS goals
         FROM variants v
         WHERE v.experiment_id = ?1
         ORDER BY v.variant_key",
      )
      .map_err(CoreError::storage)?;

    stmt
      .query_map(params![experiment_id, event], |row| {
        Ok(VariantCounts {
          variant_key: row.get(0)?,
          views:       decode_count(row.get(1)?),
          goals:       decode_count(row.get(2)?),
        })
      })
      .map_err(CoreError::storage)?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(CoreError::storage)
  }

  // ── Administration ──────────────────────────────────────────────────────

  fn clear_experiment_data(&mut self, experiment_id: i64) -> CoreResult<()> {
    for sql in [
      "DELETE FROM events      WHERE experiment_id = ?1",
      "DELETE FROM assignments WHERE experiment_id = ?1",
    ] {
      self
        .conn
        .execute(sql, params![experiment_id])
        .map_err(CoreError::storage)?;
    }
    Ok(())
  }

  fn remove_experiment(&mut self, experiment_id: i64) -> CoreResult<()> {
    // Children first so foreign keys hold at every statement.
    self.clear_experiment_data(experiment_id)?;
    for sql in [
      "DELETE FROM variants    WHERE experiment_id = ?1",
      "DELETE FROM experiments WHERE id = ?1",
    ] {
      self
        .conn
        .execute(sql, params![experiment_id])
        .map_err(CoreError::storage)?;
    }
    Ok(())
  }
}
