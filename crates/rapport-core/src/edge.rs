//! Relationship edges between two nodes.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  sigma::{SigmaStrategy, SynergyFactors},
  Error, Result,
};

// ─── Pair key ────────────────────────────────────────────────────────────────

/// An unordered pair of distinct node ids, stored smaller-first so that
/// `(a, b)` and `(b, a)` produce the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PairKey {
  first:  Uuid,
  second: Uuid,
}

impl PairKey {
  pub fn new(a: Uuid, b: Uuid) -> Result<Self> {
    if a == b {
      return Err(Error::SelfPair(a));
    }
    let (first, second) = if a < b { (a, b) } else { (b, a) };
    Ok(Self { first, second })
  }

  pub fn first(&self) -> Uuid { self.first }

  pub fn second(&self) -> Uuid { self.second }

  pub fn contains(&self, node_id: Uuid) -> bool {
    self.first == node_id || self.second == node_id
  }

  /// The other member of the pair, if `node_id` is a member.
  pub fn other(&self, node_id: Uuid) -> Option<Uuid> {
    if node_id == self.first {
      Some(self.second)
    } else if node_id == self.second {
      Some(self.first)
    } else {
      None
    }
  }
}

impl fmt::Display for PairKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.first, self.second)
  }
}

impl FromStr for PairKey {
  type Err = String;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    let (a, b) = s
      .split_once(':')
      .ok_or_else(|| format!("pair key must be `<uuid>:<uuid>`, got {s:?}"))?;
    let a = Uuid::parse_str(a).map_err(|e| e.to_string())?;
    let b = Uuid::parse_str(b).map_err(|e| e.to_string())?;
    PairKey::new(a, b).map_err(|e| e.to_string())
  }
}

impl From<PairKey> for String {
  fn from(key: PairKey) -> Self { key.to_string() }
}

impl TryFrom<String> for PairKey {
  type Error = String;

  fn try_from(s: String) -> std::result::Result<Self, Self::Error> { s.parse() }
}

// ─── Edge ────────────────────────────────────────────────────────────────────

/// How the synergy factors were measured.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MeasurementBasis {
  #[default]
  Survey,
  Ai,
  Behavior,
}

/// At most one edge exists per [`PairKey`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipEdge {
  pub pair:       PairKey,
  /// Taken from the first node of the pair.
  pub org_id:     Uuid,
  pub sigma:      f64,
  /// Strategy that produced `sigma`.
  pub strategy:   SigmaStrategy,
  pub factors:    SynergyFactors,
  pub basis:      MeasurementBasis,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// An edge factor update. Missing factors keep their previous value, or
/// default to 0.5 for a new edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeFactorUpdate {
  pub node_a:         Uuid,
  pub node_b:         Uuid,
  pub compatibility:  Option<f64>,
  pub goal_alignment: Option<f64>,
  pub value_match:    Option<f64>,
  pub rhythm_sync:    Option<f64>,
  pub basis:          Option<MeasurementBasis>,
}

impl EdgeFactorUpdate {
  pub fn pair(&self) -> Result<PairKey> { PairKey::new(self.node_a, self.node_b) }

  /// Overlay onto existing factors. Range clamping is left to the σ strategy,
  /// which knows whether factors are signed.
  pub fn apply(&self, base: Option<&SynergyFactors>) -> SynergyFactors {
    let d = crate::factor::DEFAULT_FACTOR;
    let base = base.copied().unwrap_or(SynergyFactors {
      compatibility:  d,
      goal_alignment: d,
      value_match:    d,
      rhythm_sync:    d,
    });
    SynergyFactors {
      compatibility:  self.compatibility.unwrap_or(base.compatibility),
      goal_alignment: self.goal_alignment.unwrap_or(base.goal_alignment),
      value_match:    self.value_match.unwrap_or(base.value_match),
      rhythm_sync:    self.rhythm_sync.unwrap_or(base.rhythm_sync),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pair_key_is_unordered() {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    assert_eq!(PairKey::new(a, b).unwrap(), PairKey::new(b, a).unwrap());
  }

  #[test]
  fn pair_key_rejects_self() {
    let a = Uuid::new_v4();
    assert!(matches!(PairKey::new(a, a), Err(Error::SelfPair(id)) if id == a));
  }

  #[test]
  fn pair_key_string_form_parses_back() {
    let key = PairKey::new(Uuid::new_v4(), Uuid::new_v4()).unwrap();
    let parsed: PairKey = key.to_string().parse().unwrap();
    assert_eq!(parsed, key);
    assert!("not-a-pair".parse::<PairKey>().is_err());
  }

  #[test]
  fn other_member() {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let key = PairKey::new(a, b).unwrap();
    assert_eq!(key.other(a), Some(b));
    assert_eq!(key.other(b), Some(a));
    assert_eq!(key.other(Uuid::new_v4()), None);
  }

  #[test]
  fn update_overlays_existing_factors() {
    let update = EdgeFactorUpdate {
      node_a:         Uuid::new_v4(),
      node_b:         Uuid::new_v4(),
      compatibility:  Some(0.9),
      goal_alignment: None,
      value_match:    None,
      rhythm_sync:    None,
      basis:          None,
    };
    let base = SynergyFactors {
      compatibility:  0.1,
      goal_alignment: 0.2,
      value_match:    0.3,
      rhythm_sync:    0.4,
    };
    let out = update.apply(Some(&base));
    assert_eq!(out.compatibility, 0.9);
    assert_eq!(out.rhythm_sync, 0.4);
    assert_eq!(update.apply(None).goal_alignment, 0.5);
  }
}
