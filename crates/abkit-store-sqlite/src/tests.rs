//! Integration tests for `SqliteStore` against in-memory and on-disk
//! databases.

use std::collections::BTreeSet;

use abkit_core::{
  experiment::{AssignRequest, VariantStats, Weights, default_weights},
  select::FixedDraw,
  store::{ExperimentStore, ExperimentTx, Insert},
};
use rusqlite::TransactionBehavior;

use crate::{DEFAULT_BUSY_TIMEOUT, Error, SCHEMA_VERSION, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn weights(pairs: &[(&str, u32)]) -> Weights {
  pairs.iter().map(|(k, w)| ((*k).to_owned(), *w)).collect()
}

async fn experiment_id(s: &SqliteStore, key: &str) -> i64 {
  s.list_experiments()
    .await
    .unwrap()
    .into_iter()
    .find(|e| e.key == key)
    .map(|e| e.id)
    .expect("experiment exists")
}

async fn count(s: &SqliteStore, table: &'static str) -> i64 {
  s.conn
    .call(move |conn| {
      Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| {
        r.get::<_, i64>(0)
      })?)
    })
    .await
    .unwrap()
}

// ─── Schema ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn in_memory_store_is_migrated() {
  let s = store().await;
  assert_eq!(s.schema_version().await.unwrap(), SCHEMA_VERSION);
  s.ensure_schema().await.unwrap();
}

#[tokio::test]
async fn unmigrated_file_is_rejected_until_migrated() {
  let dir = tempfile::tempdir().unwrap();
  let s = SqliteStore::open(dir.path().join("ab.sqlite"), DEFAULT_BUSY_TIMEOUT)
    .await
    .unwrap();

  let err = s.ensure_schema().await.unwrap_err();
  assert!(matches!(err, Error::SchemaOutdated { found: 0, .. }));

  assert_eq!(s.migrate().await.unwrap(), 0);
  s.ensure_schema().await.unwrap();

  // Second run is a no-op.
  assert_eq!(s.migrate().await.unwrap(), SCHEMA_VERSION);
}

// ─── Assignment ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn assign_creates_experiment_and_variants() {
  let s = store().await;
  let req = AssignRequest::new("cta", default_weights(), "v1").named("CTA button");

  let variant = s.assign(&req).await.unwrap();
  assert!(variant == "A" || variant == "B", "got {variant}");

  let experiments = s.list_experiments().await.unwrap();
  assert_eq!(experiments.len(), 1);
  assert_eq!(experiments[0].key, "cta");
  assert_eq!(experiments[0].name.as_deref(), Some("CTA button"));
  assert_eq!(count(&s, "variants").await, 2);
  assert_eq!(count(&s, "assignments").await, 1);
}

#[tokio::test]
async fn assignment_is_sticky() {
  let s = store().await;
  let first = s
    .assign_with(AssignRequest::new("cta", default_weights(), "v1"), FixedDraw(100))
    .await
    .unwrap();
  assert_eq!(first, "B");

  for draw in [1, 50, 100] {
    let again = s
      .assign_with(
        AssignRequest::new("cta", weights(&[("A", 100), ("B", 0)]), "v1"),
        FixedDraw(draw),
      )
      .await
      .unwrap();
    assert_eq!(again, "B");
  }
  assert_eq!(count(&s, "assignments").await, 1);
}

#[tokio::test]
async fn weights_update_only_for_new_assignments() {
  let s = store().await;
  s.assign_with(AssignRequest::new("cta", default_weights(), "v1"), FixedDraw(1))
    .await
    .unwrap();

  // Existing visitor: weights ignored.
  s.assign_with(
    AssignRequest::new("cta", weights(&[("A", 1), ("C", 1)]), "v1"),
    FixedDraw(1),
  )
  .await
  .unwrap();

  let id = experiment_id(&s, "cta").await;
  let keys: Vec<String> = s
    .compute_stats(id)
    .await
    .unwrap()
    .into_iter()
    .map(|st| st.variant_key)
    .collect();
  assert_eq!(keys, ["A", "B"]);

  // New visitor: A overwritten, C inserted, B untouched.
  // Key order A(1) B(50) C(1): draw 52 lands on C.
  let variant = s
    .assign_with(
      AssignRequest::new("cta", weights(&[("A", 1), ("C", 1)]), "v2"),
      FixedDraw(52),
    )
    .await
    .unwrap();
  assert_eq!(variant, "C");

  let stored: Vec<(String, u32)> = s
    .conn
    .call(|conn| {
      let mut stmt =
        conn.prepare("SELECT variant_key, weight FROM variants ORDER BY variant_key")?;
      let rows = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(rows)
    })
    .await
    .unwrap();
  assert_eq!(
    stored,
    vec![("A".to_owned(), 1), ("B".to_owned(), 50), ("C".to_owned(), 1)]
  );
}

#[tokio::test]
async fn variant_name_defaults_to_key() {
  let s = store().await;
  s.assign(&AssignRequest::new("cta", default_weights(), "v1"))
    .await
    .unwrap();

  let names: Vec<Option<String>> = s
    .conn
    .call(|conn| {
      let mut stmt = conn.prepare("SELECT name FROM variants ORDER BY variant_key")?;
      let rows = stmt
        .query_map([], |r| r.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(rows)
    })
    .await
    .unwrap();
  assert_eq!(names, vec![Some("A".to_owned()), Some("B".to_owned())]);
}

#[tokio::test]
async fn display_name_first_write_wins() {
  let s = store().await;
  s.assign(&AssignRequest::new("cta", default_weights(), "v1").named("First"))
    .await
    .unwrap();
  s.assign(&AssignRequest::new("cta", default_weights(), "v2").named("Second"))
    .await
    .unwrap();

  let experiments = s.list_experiments().await.unwrap();
  assert_eq!(experiments.len(), 1);
  assert_eq!(experiments[0].name.as_deref(), Some("First"));
}

#[tokio::test]
async fn empty_weights_fail_before_writing() {
  let s = store().await;
  let err = s
    .assign(&AssignRequest::new("cta", Weights::new(), "v1"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(abkit_core::Error::InvalidInput(_))));
  assert!(s.list_experiments().await.unwrap().is_empty());
}

#[tokio::test]
async fn single_variant_always_assigned() {
  let s = store().await;
  for i in 0..25 {
    let req = AssignRequest::new("solo", weights(&[("A", 1)]), format!("visitor-{i}"));
    assert_eq!(s.assign(&req).await.unwrap(), "A");
  }
}

// ─── Uniqueness constraints ──────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_assignment_insert_reports_conflict() {
  let s = store().await;
  s.assign_with(AssignRequest::new("cta", default_weights(), "v1"), FixedDraw(1))
    .await
    .unwrap();
  let id = experiment_id(&s, "cta").await;

  let outcome = s
    .run(TransactionBehavior::Immediate, move |tx| {
      let b = tx
        .list_variants(id)?
        .into_iter()
        .find(|v| v.key == "B")
        .unwrap();
      tx.insert_assignment(id, b.id, "v1")
    })
    .await
    .unwrap();
  assert_eq!(outcome, Insert::Conflict);

  // The original assignment survives untouched.
  let again = s
    .assign(&AssignRequest::new("cta", default_weights(), "v1"))
    .await
    .unwrap();
  assert_eq!(again, "A");
}

#[tokio::test]
async fn duplicate_goal_insert_reports_conflict() {
  let s = store().await;
  s.assign_with(AssignRequest::new("cta", default_weights(), "v1"), FixedDraw(1))
    .await
    .unwrap();
  assert!(s.track_goal("cta", "v1").await.unwrap());
  let id = experiment_id(&s, "cta").await;

  let outcome = s
    .run(TransactionBehavior::Immediate, move |tx| {
      let a = tx.find_assignment(id, "v1")?.unwrap();
      tx.insert_event(id, a.variant_id, "v1", "goal")
    })
    .await
    .unwrap();
  assert_eq!(outcome, Insert::Conflict);
  assert_eq!(count(&s, "events").await, 1);
}

#[tokio::test]
async fn failed_unit_of_work_rolls_back() {
  let s = store().await;
  let err = s
    .run(TransactionBehavior::Immediate, |tx| {
      tx.insert_experiment("doomed", None)?;
      Err::<(), _>(abkit_core::Error::InvalidInput("abort".into()))
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(abkit_core::Error::InvalidInput(_))));
  assert!(s.list_experiments().await.unwrap().is_empty());
}

// ─── Goals ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn goal_requires_experiment_and_assignment() {
  let s = store().await;
  assert!(!s.track_goal("missing", "v1").await.unwrap());

  s.assign(&AssignRequest::new("cta", default_weights(), "v1"))
    .await
    .unwrap();
  assert!(!s.track_goal("cta", "v2").await.unwrap());
  assert_eq!(count(&s, "events").await, 0);
}

#[tokio::test]
async fn goal_is_recorded_once() {
  let s = store().await;
  s.assign(&AssignRequest::new("cta", default_weights(), "v1"))
    .await
    .unwrap();

  for _ in 0..4 {
    assert!(s.track_goal("cta", "v1").await.unwrap());
  }
  assert_eq!(count(&s, "events").await, 1);
}

#[tokio::test]
async fn goal_insert_that_aborts_transaction_reports_false() {
  let s = store().await;
  s.assign(&AssignRequest::new("cta", default_weights(), "v1"))
    .await
    .unwrap();

  // Behaves like SQLITE_FULL: the failing statement ends the whole transaction.
  s.conn
    .call(|conn| {
      conn.execute_batch(
        "CREATE TRIGGER abort_goal BEFORE INSERT ON events
         BEGIN SELECT RAISE(ROLLBACK, 'out of space'); END;",
      )?;
      Ok(())
    })
    .await
    .unwrap();

  assert!(!s.track_goal("cta", "v1").await.unwrap());
  assert_eq!(count(&s, "events").await, 0);
  assert_eq!(count(&s, "assignments").await, 1);

  // The connection is left usable for the next unit of work.
  s.assign(&AssignRequest::new("cta", default_weights(), "v2"))
    .await
    .unwrap();
  assert_eq!(count(&s, "assignments").await, 2);
}

// ─── Stats ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn end_to_end_cta_scenario() {
  let s = store().await;
  let req = AssignRequest::new("cta", weights(&[("A", 50), ("B", 50)]), "v1");

  assert_eq!(s.assign_with(req.clone(), FixedDraw(1)).await.unwrap(), "A");
  assert_eq!(s.assign_with(req, FixedDraw(100)).await.unwrap(), "A");
  assert!(s.track_goal("cta", "v1").await.unwrap());
  assert!(s.track_goal("cta", "v1").await.unwrap());
  assert_eq!(count(&s, "events").await, 1);

  let id = experiment_id(&s, "cta").await;
  let stats = s.compute_stats(id).await.unwrap();
  assert_eq!(
    stats,
    vec![
      VariantStats {
        variant_key:     "A".into(),
        views:           1,
        goals:           1,
        conversion_rate: 100.0,
      },
      VariantStats {
        variant_key:     "B".into(),
        views:           0,
        goals:           0,
        conversion_rate: 0.0,
      },
    ]
  );
}

#[tokio::test]
async fn stats_count_views_and_goals_per_variant() {
  let s = store().await;
  // Draw 1 → A, draw 100 → B.
  for (visitor, draw) in [("v1", 1), ("v2", 1), ("v3", 1), ("v4", 100)] {
    s.assign_with(AssignRequest::new("cta", default_weights(), visitor), FixedDraw(draw))
      .await
      .unwrap();
  }
  s.track_goal("cta", "v1").await.unwrap();
  s.track_goal("cta", "v4").await.unwrap();

  let id = experiment_id(&s, "cta").await;
  let stats = s.compute_stats(id).await.unwrap();
  assert_eq!(stats.len(), 2);
  assert_eq!((stats[0].views, stats[0].goals), (3, 1));
  assert_eq!(stats[0].conversion_rate, 33.33);
  assert_eq!((stats[1].views, stats[1].goals), (1, 1));
  assert_eq!(stats[1].conversion_rate, 100.0);
}

#[tokio::test]
async fn stats_for_unknown_experiment_are_empty() {
  let s = store().await;
  assert!(s.compute_stats(999).await.unwrap().is_empty());
}

// ─── Administration ──────────────────────────────────────────────────────────

#[tokio::test]
async fn experiments_listed_most_recent_first() {
  let s = store().await;
  for key in ["alpha", "beta", "gamma"] {
    s.assign(&AssignRequest::new(key, default_weights(), "v1"))
      .await
      .unwrap();
  }
  let keys: Vec<String> = s
    .list_experiments()
    .await
    .unwrap()
    .into_iter()
    .map(|e| e.key)
    .collect();
  assert_eq!(keys, ["gamma", "beta", "alpha"]);
}

#[tokio::test]
async fn delete_experiment_data_keeps_definition() {
  let s = store().await;
  s.assign(&AssignRequest::new("cta", default_weights(), "v1"))
    .await
    .unwrap();
  s.track_goal("cta", "v1").await.unwrap();
  let id = experiment_id(&s, "cta").await;

  assert!(s.delete_experiment_data(id).await.unwrap());
  assert_eq!(count(&s, "assignments").await, 0);
  assert_eq!(count(&s, "events").await, 0);
  assert_eq!(count(&s, "variants").await, 2);

  let stats = s.compute_stats(id).await.unwrap();
  assert!(stats.iter().all(|st| st.views == 0 && st.goals == 0));

  assert!(!s.delete_experiment_data(id + 1).await.unwrap());
}

#[tokio::test]
async fn delete_experiment_cascades() {
  let s = store().await;
  s.assign(&AssignRequest::new("cta", default_weights(), "v1"))
    .await
    .unwrap();
  s.assign(&AssignRequest::new("other", default_weights(), "v1"))
    .await
    .unwrap();
  s.track_goal("cta", "v1").await.unwrap();
  let id = experiment_id(&s, "cta").await;

  assert!(s.delete_experiment(id).await.unwrap());
  assert!(!s.delete_experiment(id).await.unwrap());

  let keys: Vec<String> = s
    .list_experiments()
    .await
    .unwrap()
    .into_iter()
    .map(|e| e.key)
    .collect();
  assert_eq!(keys, ["other"]);
  assert_eq!(count(&s, "variants").await, 2);
  assert_eq!(count(&s, "assignments").await, 1);
  assert_eq!(count(&s, "events").await, 0);

  // The key is free again and the visitor starts fresh.
  s.assign(&AssignRequest::new("cta", default_weights(), "v1"))
    .await
    .unwrap();
  assert_eq!(count(&s, "assignments").await, 2);
}

// ─── Concurrency ─────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_assignments_across_connections_agree() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("ab.sqlite");

  let first = SqliteStore::open(&path, DEFAULT_BUSY_TIMEOUT).await.unwrap();
  first.migrate().await.unwrap();
  let second = SqliteStore::open(&path, DEFAULT_BUSY_TIMEOUT).await.unwrap();

  let mut handles = Vec::new();
  for i in 0..16 {
    let s = if i % 2 == 0 { first.clone() } else { second.clone() };
    handles.push(tokio::spawn(async move {
      let req = AssignRequest::new("race", weights(&[("A", 1), ("B", 1), ("C", 1)]), "v1");
      s.assign(&req).await
    }));
  }

  let mut variants = BTreeSet::new();
  for handle in handles {
    variants.insert(handle.await.unwrap().unwrap());
  }
  assert_eq!(variants.len(), 1, "visitor got several variants: {variants:?}");
  assert_eq!(count(&first, "assignments").await, 1);
  assert_eq!(count(&first, "experiments").await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_goals_record_one_event() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("ab.sqlite");

  let first = SqliteStore::open(&path, DEFAULT_BUSY_TIMEOUT).await.unwrap();
  first.migrate().await.unwrap();
  let second = SqliteStore::open(&path, DEFAULT_BUSY_TIMEOUT).await.unwrap();

  first
    .assign(&AssignRequest::new("cta", default_weights(), "v1"))
    .await
    .unwrap();

  let mut handles = Vec::new();
  for i in 0..16 {
    let s = if i % 2 == 0 { first.clone() } else { second.clone() };
    handles.push(tokio::spawn(async move { s.track_goal("cta", "v1").await }));
  }
  for handle in handles {
    assert!(handle.await.unwrap().unwrap());
  }
  assert_eq!(count(&second, "events").await, 1);
}
