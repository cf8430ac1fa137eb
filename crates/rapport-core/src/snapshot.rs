//! Valuation snapshots and organisation rollups.
//!
//! A snapshot is immutable once calculated. A later recompute writes a new
//! snapshot; readers always take the latest one per entity.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{edge::PairKey, risk::RiskLevel};

// ─── Entity key ──────────────────────────────────────────────────────────────

/// What a snapshot or risk record is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityKey {
  Node(Uuid),
  Pair(PairKey),
}

impl fmt::Display for EntityKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Node(id) => write!(f, "node:{id}"),
      Self::Pair(pair) => write!(f, "pair:{pair}"),
    }
  }
}

impl FromStr for EntityKey {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.split_once(':') {
      Some(("node", id)) => Uuid::parse_str(id)
        .map(Self::Node)
        .map_err(|e| e.to_string()),
      Some(("pair", pair)) => pair.parse().map(Self::Pair),
      _ => Err(format!("unrecognised entity key: {s:?}")),
    }
  }
}

// ─── Health ──────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HealthStatus {
  Thriving,
  Healthy,
  Stable,
  AtRisk,
  Critical,
}

impl HealthStatus {
  pub fn from_risk_level(level: RiskLevel) -> Self {
    match level {
      RiskLevel::Minimal => Self::Thriving,
      RiskLevel::Low => Self::Healthy,
      RiskLevel::Moderate => Self::Stable,
      RiskLevel::High => Self::AtRisk,
      RiskLevel::Critical => Self::Critical,
    }
  }

  pub fn from_time_roi(roi: f64) -> Self {
    match roi {
      r if r >= 1.0 => Self::Thriving,
      r if r >= 0.5 => Self::Healthy,
      r if r >= 0.0 => Self::Stable,
      r if r >= -0.5 => Self::AtRisk,
      _ => Self::Critical,
    }
  }
}

// ─── Components ──────────────────────────────────────────────────────────────

/// The inputs and intermediate values behind a snapshot's `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueComponents {
  Pair {
    sigma:             f64,
    /// Undecayed density.
    density:           f64,
    decayed_density:   f64,
    idle_days:         f64,
    /// Λ, in STU.
    weighted_time:     f64,
    elapsed_months:    f64,
    /// Present for the multiplicative composition only.
    multiplier:        Option<f64>,
    activity_drop:     f64,
    churn_probability: f64,
  },
  Node {
    lambda:           f64,
    invested:         f64,
    saved:            f64,
    created:          f64,
    efficiency_ratio: f64,
    time_roi:         f64,
  },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationSnapshot {
  pub snapshot_id:   Uuid,
  pub entity:        EntityKey,
  pub org_id:        Uuid,
  /// V for a pair; NTV in STU for a node.
  pub value:         f64,
  /// `value × Ω`.
  pub monetary:      f64,
  pub components:    ValueComponents,
  pub health:        HealthStatus,
  pub risk_level:    Option<RiskLevel>,
  pub calculated_at: DateTime<Utc>,
}

// ─── Rollup ──────────────────────────────────────────────────────────────────

/// Organisation-wide totals built from the latest snapshot of each entity.
/// Snapshots may be slightly stale relative to each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrgRollup {
  pub org_id:               Uuid,
  pub pair_count:           usize,
  pub node_count:           usize,
  /// Σ V over pairs.
  pub total_value:          f64,
  pub mean_value:           f64,
  /// Σ NTV over nodes.
  pub total_net_time_value: f64,
  /// `(total_value + total_net_time_value) × Ω`.
  pub monetary_value:       f64,
  /// Pairs at `High` risk or worse.
  pub at_risk_count:        usize,
  pub as_of:                DateTime<Utc>,
}

impl OrgRollup {
  pub fn from_snapshots<'a>(
    org_id: Uuid,
    snapshots: impl IntoIterator<Item = &'a ValuationSnapshot>,
    omega: f64,
    as_of: DateTime<Utc>,
  ) -> Self {
    let mut rollup = Self {
      org_id,
      pair_count: 0,
      node_count: 0,
      total_value: 0.0,
      mean_value: 0.0,
      total_net_time_value: 0.0,
      monetary_value: 0.0,
      at_risk_count: 0,
      as_of,
    };

    for snapshot in snapshots.into_iter().filter(|s| s.org_id == org_id) {
      match snapshot.entity {
        EntityKey::Pair(_) => {
          rollup.pair_count += 1;
          rollup.total_value += snapshot.value;
          if snapshot.risk_level.is_some_and(|l| l >= RiskLevel::High) {
            rollup.at_risk_count += 1;
          }
        }
        EntityKey::Node(_) => {
          rollup.node_count += 1;
          rollup.total_net_time_value += snapshot.value;
        }
      }
    }

    if rollup.pair_count > 0 {
      rollup.mean_value = rollup.total_value / rollup.pair_count as f64;
    }
    rollup.monetary_value = (rollup.total_value + rollup.total_net_time_value) * omega;
    rollup
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn snapshot(entity: EntityKey, org_id: Uuid, value: f64, risk: Option<RiskLevel>) -> ValuationSnapshot {
    ValuationSnapshot {
      snapshot_id: Uuid::new_v4(),
      entity,
      org_id,
      value,
      monetary: value,
      components: ValueComponents::Node {
        lambda:           1.0,
        invested:         0.0,
        saved:            0.0,
        created:          0.0,
        efficiency_ratio: 0.0,
        time_roi:         0.0,
      },
      health: HealthStatus::Stable,
      risk_level: risk,
      calculated_at: Utc::now(),
    }
  }

  #[test]
  fn entity_key_string_form() {
    let node = EntityKey::Node(Uuid::new_v4());
    assert_eq!(node.to_string().parse::<EntityKey>().unwrap(), node);
    let pair = EntityKey::Pair(PairKey::new(Uuid::new_v4(), Uuid::new_v4()).unwrap());
    assert_eq!(pair.to_string().parse::<EntityKey>().unwrap(), pair);
    assert!("edge:123".parse::<EntityKey>().is_err());
  }

  #[test]
  fn health_from_roi() {
    assert_eq!(HealthStatus::from_time_roi(1.2), HealthStatus::Thriving);
    assert_eq!(HealthStatus::from_time_roi(0.5), HealthStatus::Healthy);
    assert_eq!(HealthStatus::from_time_roi(0.0), HealthStatus::Stable);
    assert_eq!(HealthStatus::from_time_roi(-0.2), HealthStatus::AtRisk);
    assert_eq!(HealthStatus::from_time_roi(-3.0), HealthStatus::Critical);
  }

  #[test]
  fn rollup_separates_pairs_and_nodes() {
    let org = Uuid::new_v4();
    let pair = |v, r| {
      snapshot(
        EntityKey::Pair(PairKey::new(Uuid::new_v4(), Uuid::new_v4()).unwrap()),
        org,
        v,
        Some(r),
      )
    };
    let snaps = vec![
      pair(10.0, RiskLevel::Low),
      pair(30.0, RiskLevel::Critical),
      snapshot(EntityKey::Node(Uuid::new_v4()), org, 4.0, None),
      snapshot(EntityKey::Node(Uuid::new_v4()), Uuid::new_v4(), 100.0, None),
    ];
    let rollup = OrgRollup::from_snapshots(org, &snaps, 2.0, Utc::now());
    assert_eq!(rollup.pair_count, 2);
    assert_eq!(rollup.node_count, 1);
    assert_eq!(rollup.total_value, 40.0);
    assert_eq!(rollup.mean_value, 20.0);
    assert_eq!(rollup.total_net_time_value, 4.0);
    assert_eq!(rollup.monetary_value, 88.0);
    assert_eq!(rollup.at_risk_count, 1);
  }
}
