//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microsecond
//! precision, `Z` suffix) so that lexicographic order is chronological.
//! Simple enums use their snake_case names. Structured values (factors,
//! components, transition history) are stored as compact JSON.

use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, SecondsFormat, Utc};
use rapport_core::{
  density::DensitySample,
  edge::{PairKey, RelationshipEdge},
  ledger::TimeActivity,
  node::{LambdaChange, Node},
  risk::RiskRecord,
  snapshot::{EntityKey, ValuationSnapshot},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

/// Any `strum`-backed enum, pair key, or entity key.
pub fn encode_text(value: impl Display) -> String { value.to_string() }

pub fn decode_text<T>(column: &'static str, s: &str) -> Result<T>
where
  T: FromStr,
  T::Err: Display,
{
  s.parse().map_err(|e: T::Err| Error::Decode {
    column,
    message: e.to_string(),
  })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `nodes` row.
pub struct RawNode {
  pub node_id:      String,
  pub org_id:       String,
  pub role:         String,
  pub status:       String,
  pub factors_json: String,
  pub lambda:       f64,
  pub created_at:   String,
  pub updated_at:   String,
}

impl RawNode {
  pub const COLUMNS: &'static str =
    "node_id, org_id, role, status, factors_json, lambda, created_at, updated_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      node_id:      row.get(0)?,
      org_id:       row.get(1)?,
      role:         row.get(2)?,
      status:       row.get(3)?,
      factors_json: row.get(4)?,
      lambda:       row.get(5)?,
      created_at:   row.get(6)?,
      updated_at:   row.get(7)?,
    })
  }

  pub fn into_node(self) -> Result<Node> {
    Ok(Node {
      node_id:    decode_uuid(&self.node_id)?,
      org_id:     decode_uuid(&self.org_id)?,
      role:       self.role,
      status:     decode_text("status", &self.status)?,
      factors:    serde_json::from_str(&self.factors_json)?,
      lambda:     self.lambda,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

pub struct RawLambdaChange {
  pub change_id:  String,
  pub node_id:    String,
  pub previous:   f64,
  pub current:    f64,
  pub reason:     String,
  pub changed_at: String,
}

impl RawLambdaChange {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      change_id:  row.get(0)?,
      node_id:    row.get(1)?,
      previous:   row.get(2)?,
      current:    row.get(3)?,
      reason:     row.get(4)?,
      changed_at: row.get(5)?,
    })
  }

  pub fn into_change(self) -> Result<LambdaChange> {
    Ok(LambdaChange {
      change_id:  decode_uuid(&self.change_id)?,
      node_id:    decode_uuid(&self.node_id)?,
      previous:   self.previous,
      current:    self.current,
      reason:     self.reason,
      changed_at: decode_dt(&self.changed_at)?,
    })
  }
}

pub struct RawEdge {
  pub pair_key:     String,
  pub org_id:       String,
  pub sigma:        f64,
  pub strategy:     String,
  pub factors_json: String,
  pub basis:        String,
  pub created_at:   String,
  pub updated_at:   String,
}

impl RawEdge {
  pub const COLUMNS: &'static str =
    "pair_key, org_id, sigma, strategy, factors_json, basis, created_at, updated_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      pair_key:     row.get(0)?,
      org_id:       row.get(1)?,
      sigma:        row.get(2)?,
      strategy:     row.get(3)?,
      factors_json: row.get(4)?,
      basis:        row.get(5)?,
      created_at:   row.get(6)?,
      updated_at:   row.get(7)?,
    })
  }

  pub fn into_edge(self) -> Result<RelationshipEdge> {
    Ok(RelationshipEdge {
      pair:       decode_text::<PairKey>("pair_key", &self.pair_key)?,
      org_id:     decode_uuid(&self.org_id)?,
      sigma:      self.sigma,
      strategy:   decode_text("strategy", &self.strategy)?,
      factors:    serde_json::from_str(&self.factors_json)?,
      basis:      decode_text("basis", &self.basis)?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

pub struct RawDensity {
  pub sample_id:           String,
  pub pair_key:            String,
  pub frequency:           f64,
  pub depth:               f64,
  pub quality:             f64,
  pub density:             f64,
  pub decay_rate:          f64,
  pub last_interaction_at: String,
  pub measured_at:         String,
}

impl RawDensity {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      sample_id:           row.get(0)?,
      pair_key:            row.get(1)?,
      frequency:           row.get(2)?,
      depth:               row.get(3)?,
      quality:             row.get(4)?,
      density:             row.get(5)?,
      decay_rate:          row.get(6)?,
      last_interaction_at: row.get(7)?,
      measured_at:         row.get(8)?,
    })
  }

  pub fn into_sample(self) -> Result<DensitySample> {
    Ok(DensitySample {
      sample_id:           decode_uuid(&self.sample_id)?,
      pair:                decode_text("pair_key", &self.pair_key)?,
      frequency:           self.frequency,
      depth:               self.depth,
      quality:             self.quality,
      density:             self.density,
      decay_rate:          self.decay_rate,
      last_interaction_at: decode_dt(&self.last_interaction_at)?,
      measured_at:         decode_dt(&self.measured_at)?,
    })
  }
}

pub struct RawActivity {
  pub activity_id:    String,
  pub node_id:        String,
  pub counterpart_id: Option<String>,
  pub nature:         String,
  pub real_minutes:   f64,
  pub lambda_at_time: f64,
  pub recorded_at:    String,
}

impl RawActivity {
  pub const COLUMNS: &'static str =
    "activity_id, node_id, counterpart_id, nature, real_minutes, lambda_at_time, recorded_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      activity_id:    row.get(0)?,
      node_id:        row.get(1)?,
      counterpart_id: row.get(2)?,
      nature:         row.get(3)?,
      real_minutes:   row.get(4)?,
      lambda_at_time: row.get(5)?,
      recorded_at:    row.get(6)?,
    })
  }

  pub fn into_activity(self) -> Result<TimeActivity> {
    Ok(TimeActivity {
      activity_id:    decode_uuid(&self.activity_id)?,
      node_id:        decode_uuid(&self.node_id)?,
      counterpart_id: self.counterpart_id.as_deref().map(decode_uuid).transpose()?,
      nature:         decode_text("nature", &self.nature)?,
      real_minutes:   self.real_minutes,
      lambda_at_time: self.lambda_at_time,
      recorded_at:    decode_dt(&self.recorded_at)?,
    })
  }
}

pub struct RawSnapshot {
  pub snapshot_id:     String,
  pub entity_key:      String,
  pub org_id:          String,
  pub value:           f64,
  pub monetary:        f64,
  pub components_json: String,
  pub health:          String,
  pub risk_level:      Option<String>,
  pub calculated_at:   String,
}

impl RawSnapshot {
  pub const COLUMNS: &'static str = "snapshot_id, entity_key, org_id, value, monetary, \
                                     components_json, health, risk_level, calculated_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      snapshot_id:     row.get(0)?,
      entity_key:      row.get(1)?,
      org_id:          row.get(2)?,
      value:           row.get(3)?,
      monetary:        row.get(4)?,
      components_json: row.get(5)?,
      health:          row.get(6)?,
      risk_level:      row.get(7)?,
      calculated_at:   row.get(8)?,
    })
  }

  pub fn into_snapshot(self) -> Result<ValuationSnapshot> {
    Ok(ValuationSnapshot {
      snapshot_id:   decode_uuid(&self.snapshot_id)?,
      entity:        decode_text::<EntityKey>("entity_key", &self.entity_key)?,
      org_id:        decode_uuid(&self.org_id)?,
      value:         self.value,
      monetary:      self.monetary,
      components:    serde_json::from_str(&self.components_json)?,
      health:        decode_text("health", &self.health)?,
      risk_level:    self
        .risk_level
        .as_deref()
        .map(|s| decode_text("risk_level", s))
        .transpose()?,
      calculated_at: decode_dt(&self.calculated_at)?,
    })
  }
}

pub struct RawRiskRecord {
  pub risk_id:         String,
  pub target_key:      String,
  pub org_id:          String,
  pub score:           f64,
  pub level:           String,
  pub days_to_action:  u32,
  pub recommendation:  String,
  pub status:          String,
  pub assignee:        Option<String>,
  pub resolution_note: Option<String>,
  pub history_json:    String,
  pub created_at:      String,
  pub updated_at:      String,
}

impl RawRiskRecord {
  pub const COLUMNS: &'static str = "risk_id, target_key, org_id, score, level, days_to_action, \
                                     recommendation, status, assignee, resolution_note, \
                                     history_json, created_at, updated_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      risk_id:         row.get(0)?,
      target_key:      row.get(1)?,
      org_id:          row.get(2)?,
      score:           row.get(3)?,
      level:           row.get(4)?,
      days_to_action:  row.get(5)?,
      recommendation:  row.get(6)?,
      status:          row.get(7)?,
      assignee:        row.get(8)?,
      resolution_note: row.get(9)?,
      history_json:    row.get(10)?,
      created_at:      row.get(11)?,
      updated_at:      row.get(12)?,
    })
  }

  pub fn into_record(self) -> Result<RiskRecord> {
    Ok(RiskRecord {
      risk_id:         decode_uuid(&self.risk_id)?,
      target:          decode_text("target_key", &self.target_key)?,
      org_id:          decode_uuid(&self.org_id)?,
      score:           self.score,
      level:           decode_text("level", &self.level)?,
      days_to_action:  self.days_to_action,
      recommendation:  self.recommendation,
      status:          decode_text("status", &self.status)?,
      assignee:        self.assignee,
      resolution_note: self.resolution_note,
      history:         serde_json::from_str(&self.history_json)?,
      created_at:      decode_dt(&self.created_at)?,
      updated_at:      decode_dt(&self.updated_at)?,
    })
  }
}
