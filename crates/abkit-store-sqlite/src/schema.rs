//! SQL schema for the abkit SQLite store.
//!
//! Applied by [`crate::SqliteStore::migrate`], never on the request path.
//! `PRAGMA user_version` records the applied version.

pub const SCHEMA_VERSION: i64 = 1;

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS experiments (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    experiment_key TEXT NOT NULL UNIQUE,
    name           TEXT,                -- first write wins
    created_at     TEXT NOT NULL        -- ISO 8601 UTC
);

CREATE TABLE IF NOT EXISTS variants (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    experiment_id  INTEGER NOT NULL REFERENCES experiments(id),
    variant_key    TEXT NOT NULL,
    name           TEXT,
    weight         INTEGER NOT NULL DEFAULT 1 CHECK (weight >= 0),
    UNIQUE (experiment_id, variant_key)
);

-- Sticky: one row per visitor per experiment, never updated.
CREATE TABLE IF NOT EXISTS assignments (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    experiment_id  INTEGER NOT NULL REFERENCES experiments(id),
    variant_id     INTEGER NOT NULL REFERENCES variants(id),
    visitor        TEXT NOT NULL,
    assigned_at    TEXT NOT NULL,
    UNIQUE (experiment_id, visitor)
);

-- At most one row per visitor, experiment and event name.
CREATE TABLE IF NOT EXISTS events (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    experiment_id  INTEGER NOT NULL REFERENCES experiments(id),
    variant_id     INTEGER NOT NULL REFERENCES variants(id),
    visitor        TEXT NOT NULL,
    event          TEXT NOT NULL,
    created_at     TEXT NOT NULL,
    UNIQUE (experiment_id, visitor, event)
);

CREATE INDEX IF NOT EXISTS assignments_variant_idx ON assignments(variant_id);
CREATE INDEX IF NOT EXISTS events_variant_idx      ON events(variant_id, event);

PRAGMA user_version = 1;
";
