//! Error types for `rapport-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::{
  edge::PairKey,
  risk::{RiskAction, RiskStatus},
  snapshot::EntityKey,
};

#[derive(Debug, Error)]
pub enum Error {
  #[error("node not found: {0}")]
  NodeNotFound(Uuid),

  #[error("relationship edge not found: {0}")]
  EdgeNotFound(PairKey),

  #[error("no density sample recorded for pair {0}")]
  DensityNotFound(PairKey),

  #[error("no valuation snapshot for {0}")]
  SnapshotNotFound(EntityKey),

  #[error("risk record not found: {0}")]
  RiskRecordNotFound(Uuid),

  #[error("a relationship needs two distinct nodes, got {0} twice")]
  SelfPair(Uuid),

  #[error("invalid engine configuration: {0}")]
  InvalidConfig(String),

  #[error("unknown strategy name: {0:?}")]
  UnknownStrategy(String),

  #[error("cannot {action} a risk record that is {from}")]
  InvalidTransition { from: RiskStatus, action: RiskAction },

  #[error("assigning a risk record requires a non-empty assignee")]
  MissingAssignee,

  #[error("resolving or dismissing a risk record requires a resolution note")]
  MissingResolutionNote,

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Whether this error reports a missing record rather than a bad request.
  pub fn is_not_found(&self) -> bool {
    matches!(
      self,
      Self::NodeNotFound(_)
        | Self::EdgeNotFound(_)
        | Self::DensityNotFound(_)
        | Self::SnapshotNotFound(_)
        | Self::RiskRecordNotFound(_)
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
