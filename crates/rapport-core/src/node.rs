//! Node: a participant whose time is valued.
//!
//! A node's λ is derived from its four bounded factors and is recomputed
//! whenever any factor changes. Nodes are never deleted; they move between
//! [`NodeStatus`] values instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::factor::{normalize_factor, Bounds, DEFAULT_FACTOR};

// ─── Status ──────────────────────────────────────────────────────────────────

/// Soft lifecycle state. There is no hard delete.
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
pub enum NodeStatus {
  #[default]
  Active,
  Inactive,
  Churned,
}

// ─── Factors ─────────────────────────────────────────────────────────────────

/// The four inputs to λ, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeFactors {
  /// How easily the node could be replaced. Inverted inside λ.
  pub replaceability: f64,
  pub influence:      f64,
  pub expertise:      f64,
  /// Network position (centrality).
  pub network:        f64,
}

impl Default for NodeFactors {
  fn default() -> Self {
    Self {
      replaceability: DEFAULT_FACTOR,
      influence:      DEFAULT_FACTOR,
      expertise:      DEFAULT_FACTOR,
      network:        DEFAULT_FACTOR,
    }
  }
}

impl NodeFactors {
  /// Clamp every factor into `[0, 1]`.
  pub fn normalized(&self) -> Self {
    Self {
      replaceability: normalize_factor("replaceability", Some(self.replaceability), Bounds::UNIT),
      influence:      normalize_factor("influence", Some(self.influence), Bounds::UNIT),
      expertise:      normalize_factor("expertise", Some(self.expertise), Bounds::UNIT),
      network:        normalize_factor("network", Some(self.network), Bounds::UNIT),
    }
  }
}

/// A partial set of factors. Absent fields keep their previous value (or the
/// default, for a new node).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FactorPatch {
  pub replaceability: Option<f64>,
  pub influence:      Option<f64>,
  pub expertise:      Option<f64>,
  pub network:        Option<f64>,
}

impl FactorPatch {
  /// Overlay this patch on `base` and normalise the result.
  pub fn apply(&self, base: &NodeFactors) -> NodeFactors {
    NodeFactors {
      replaceability: self.replaceability.unwrap_or(base.replaceability),
      influence:      self.influence.unwrap_or(base.influence),
      expertise:      self.expertise.unwrap_or(base.expertise),
      network:        self.network.unwrap_or(base.network),
    }
    .normalized()
  }

  pub fn is_empty(&self) -> bool {
    self.replaceability.is_none()
      && self.influence.is_none()
      && self.expertise.is_none()
      && self.network.is_none()
  }
}

// ─── Node ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
  pub node_id:    Uuid,
  /// Owning organisation. Tenancy checks happen outside this crate.
  pub org_id:     Uuid,
  /// Free-text role, e.g. "coach", "student", "department".
  pub role:       String,
  pub status:     NodeStatus,
  pub factors:    NodeFactors,
  /// Derived from `factors`; never set directly.
  pub lambda:     f64,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Input to node creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNode {
  pub org_id:  Uuid,
  pub role:    String,
  #[serde(default)]
  pub factors: FactorPatch,
}

/// A factor mutation arriving from interaction ingestion or a manual override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeFactorUpdate {
  pub node_id: Uuid,
  #[serde(default)]
  pub factors: FactorPatch,
  /// Why the factors changed; carried into the λ audit history.
  pub reason:  Option<String>,
}

// ─── Audit ───────────────────────────────────────────────────────────────────

/// One entry in a node's append-only λ history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LambdaChange {
  pub change_id:  Uuid,
  pub node_id:    Uuid,
  pub previous:   f64,
  pub current:    f64,
  pub reason:     String,
  pub changed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn patch_keeps_unset_fields() {
    let base = NodeFactors {
      replaceability: 0.2,
      influence:      0.8,
      expertise:      0.7,
      network:        0.6,
    };
    let patch = FactorPatch { influence: Some(0.4), ..Default::default() };
    let out = patch.apply(&base);
    assert_eq!(out.influence, 0.4);
    assert_eq!(out.replaceability, 0.2);
    assert_eq!(out.network, 0.6);
  }

  #[test]
  fn patch_clamps_new_values() {
    let patch = FactorPatch {
      replaceability: Some(-2.0),
      expertise: Some(9.0),
      ..Default::default()
    };
    let out = patch.apply(&NodeFactors::default());
    assert_eq!(out.replaceability, 0.0);
    assert_eq!(out.expertise, 1.0);
    assert_eq!(out.influence, DEFAULT_FACTOR);
  }

  #[test]
  fn status_round_trips_through_strings() {
    assert_eq!(NodeStatus::Churned.to_string(), "churned");
    assert_eq!("inactive".parse::<NodeStatus>().unwrap(), NodeStatus::Inactive);
  }
}
