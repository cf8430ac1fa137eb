//! SQL schema for the Rapport SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS nodes (
    node_id      TEXT PRIMARY KEY,
    org_id       TEXT NOT NULL,
    role         TEXT NOT NULL,
    status       TEXT NOT NULL,   -- 'active' | 'inactive' | 'churned'
    factors_json TEXT NOT NULL,
    lambda       REAL NOT NULL,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);

-- Append-only audit of λ recomputes.
CREATE TABLE IF NOT EXISTS lambda_changes (
    change_id       TEXT PRIMARY KEY,
    node_id         TEXT NOT NULL REFERENCES nodes(node_id),
    previous_lambda REAL NOT NULL,
    current_lambda  REAL NOT NULL,
    reason          TEXT NOT NULL,
    changed_at      TEXT NOT NULL
);

-- One edge per unordered pair; pair_key is '<smaller uuid>:<larger uuid>'.
CREATE TABLE IF NOT EXISTS edges (
    pair_key     TEXT PRIMARY KEY,
    node_a       TEXT NOT NULL,
    node_b       TEXT NOT NULL,
    org_id       TEXT NOT NULL,
    sigma        REAL NOT NULL,
    strategy     TEXT NOT NULL,
    factors_json TEXT NOT NULL,
    basis        TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    CHECK (node_a < node_b)
);

-- Undecayed density per measurement window; decay is applied on read.
CREATE TABLE IF NOT EXISTS density_samples (
    sample_id           TEXT PRIMARY KEY,
    pair_key            TEXT NOT NULL,
    frequency           REAL NOT NULL,
    depth               REAL NOT NULL,
    quality             REAL NOT NULL,
    density             REAL NOT NULL,
    decay_rate          REAL NOT NULL,
    last_interaction_at TEXT NOT NULL,
    measured_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS time_activities (
    activity_id    TEXT PRIMARY KEY,
    node_id        TEXT NOT NULL,
    counterpart_id TEXT,
    nature         TEXT NOT NULL,   -- 'invested' | 'saved' | 'created'
    real_minutes   REAL NOT NULL,
    lambda_at_time REAL NOT NULL,
    recorded_at    TEXT NOT NULL
);

-- Snapshots are strictly append-only.
CREATE TABLE IF NOT EXISTS snapshots (
    snapshot_id     TEXT PRIMARY KEY,
    entity_key      TEXT NOT NULL,   -- 'node:<uuid>' | 'pair:<uuid>:<uuid>'
    org_id          TEXT NOT NULL,
    value           REAL NOT NULL,
    monetary        REAL NOT NULL,
    components_json TEXT NOT NULL,
    health          TEXT NOT NULL,
    risk_level      TEXT,
    calculated_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS risk_records (
    risk_id         TEXT PRIMARY KEY,
    target_key      TEXT NOT NULL,
    org_id          TEXT NOT NULL,
    score           REAL NOT NULL,
    level           TEXT NOT NULL,
    days_to_action  INTEGER NOT NULL,
    recommendation  TEXT NOT NULL,
    status          TEXT NOT NULL,
    assignee        TEXT,
    resolution_note TEXT,
    history_json    TEXT NOT NULL DEFAULT '[]',
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS nodes_org_idx            ON nodes(org_id);
CREATE INDEX IF NOT EXISTS lambda_changes_node_idx  ON lambda_changes(node_id, changed_at);
CREATE INDEX IF NOT EXISTS density_pair_idx         ON density_samples(pair_key, measured_at);
CREATE INDEX IF NOT EXISTS activities_node_idx      ON time_activities(node_id, recorded_at);
CREATE INDEX IF NOT EXISTS activities_counter_idx   ON time_activities(counterpart_id);
CREATE INDEX IF NOT EXISTS snapshots_entity_idx     ON snapshots(entity_key, calculated_at);
CREATE INDEX IF NOT EXISTS snapshots_org_idx        ON snapshots(org_id);
CREATE INDEX IF NOT EXISTS risk_records_target_idx  ON risk_records(target_key, status);

PRAGMA user_version = 1;
";
