//! Risk classification and the risk record lifecycle.
//!
//! Scores in `[0, 1]` map onto five non-overlapping bands whose cutpoints,
//! day-to-action defaults and recommendations are configuration. A
//! [`RiskRecord`] then moves through a strictly linear workflow:
//!
//! ```text
//! OPEN ─assign→ ASSIGNED ─start→ IN_PROGRESS ─┬─resolve→  RESOLVED
//!   ↑                                         ├─dismiss→  DISMISSED
//!   └──────────────reopen──── ESCALATED ←─────┴─escalate
//! ```
//!
//! Reopening an escalated record raises its level by one tier.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  factor::Bounds,
  snapshot::EntityKey,
  Error, Result,
};

// ─── Levels ──────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RiskLevel {
  Minimal,
  Low,
  Moderate,
  High,
  Critical,
}

impl RiskLevel {
  pub const ALL: [RiskLevel; 5] = [
    RiskLevel::Minimal,
    RiskLevel::Low,
    RiskLevel::Moderate,
    RiskLevel::High,
    RiskLevel::Critical,
  ];

  fn index(self) -> usize { self as usize }

  /// One tier higher, saturating at `Critical`.
  pub fn escalated(self) -> Self {
    Self::ALL[(self.index() + 1).min(Self::ALL.len() - 1)]
  }
}

// ─── Bands ───────────────────────────────────────────────────────────────────

/// Band configuration. `cutpoints[i]` is the exclusive upper bound of level
/// `i`; anything at or above the last cutpoint is `Critical`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskBands {
  pub cutpoints:       [f64; 4],
  pub days_to_action:  [u32; 5],
  pub recommendations: [String; 5],
}

impl Default for RiskBands {
  fn default() -> Self {
    Self {
      cutpoints:       [0.10, 0.25, 0.45, 0.65],
      days_to_action:  [90, 60, 30, 14, 7],
      recommendations: [
        "maintain current engagement".to_owned(),
        "schedule a routine check-in".to_owned(),
        "plan a dedicated conversation this month".to_owned(),
        "arrange a one-on-one within two weeks".to_owned(),
        "intervene this week".to_owned(),
      ],
    }
  }
}

impl RiskBands {
  pub fn validate(&self) -> Result<()> {
    let mut prev = 0.0;
    for (i, cut) in self.cutpoints.iter().copied().enumerate() {
      if !(cut > prev && cut <= 1.0) {
        return Err(Error::InvalidConfig(format!(
          "risk cutpoints must be strictly ascending within (0, 1]; cutpoint {i} is {cut}"
        )));
      }
      prev = cut;
    }
    Ok(())
  }

  pub fn level_for(&self, score: f64) -> RiskLevel {
    let score = Bounds::UNIT.clamp(score);
    self
      .cutpoints
      .iter()
      .position(|cut| score < *cut)
      .map(|i| RiskLevel::ALL[i])
      .unwrap_or(RiskLevel::Critical)
  }

  /// Pure function of `score` and the configured bands.
  pub fn classify(&self, score: f64) -> Classification {
    let level = self.level_for(score);
    self.classification_for(level)
  }

  pub fn classification_for(&self, level: RiskLevel) -> Classification {
    Classification {
      level,
      days_to_action: self.days_to_action[level.index()],
      recommendation: self.recommendations[level.index()].clone(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
  pub level:          RiskLevel,
  pub days_to_action: u32,
  pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
  pub bands:       RiskBands,
  /// Pair recomputes at or above this level open a risk record.
  pub queue_floor: RiskLevel,
}

impl Default for RiskConfig {
  fn default() -> Self {
    Self {
      bands:       RiskBands::default(),
      queue_floor: RiskLevel::High,
    }
  }
}

// ─── Record lifecycle ────────────────────────────────────────────────────────

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
pub enum RiskStatus {
  Open,
  Assigned,
  InProgress,
  Resolved,
  Escalated,
  Dismissed,
}

impl RiskStatus {
  /// Resolved and dismissed records never change again.
  pub fn is_closed(self) -> bool { matches!(self, Self::Resolved | Self::Dismissed) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RiskAction {
  Assign { assignee: String },
  Start,
  Resolve { note: String },
  Dismiss { note: String },
  Escalate,
  Reopen,
}

impl fmt::Display for RiskAction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Assign { .. } => "assign",
      Self::Start => "start",
      Self::Resolve { .. } => "resolve",
      Self::Dismiss { .. } => "dismiss",
      Self::Escalate => "escalate",
      Self::Reopen => "reopen",
    })
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskTransition {
  pub from: RiskStatus,
  pub to:   RiskStatus,
  pub at:   DateTime<Utc>,
  pub note: Option<String>,
}

/// A queued follow-up produced by thresholding a churn probability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskRecord {
  pub risk_id:         Uuid,
  pub target:          EntityKey,
  pub org_id:          Uuid,
  pub score:           f64,
  pub level:           RiskLevel,
  pub days_to_action:  u32,
  pub recommendation:  String,
  pub status:          RiskStatus,
  pub assignee:        Option<String>,
  pub resolution_note: Option<String>,
  pub created_at:      DateTime<Utc>,
  pub updated_at:      DateTime<Utc>,
  pub history:         Vec<RiskTransition>,
}

impl RiskRecord {
  pub fn open(
    target: EntityKey,
    org_id: Uuid,
    score: f64,
    classification: Classification,
    now: DateTime<Utc>,
  ) -> Self {
    Self {
      risk_id: Uuid::new_v4(),
      target,
      org_id,
      score,
      level: classification.level,
      days_to_action: classification.days_to_action,
      recommendation: classification.recommendation,
      status: RiskStatus::Open,
      assignee: None,
      resolution_note: None,
      created_at: now,
      updated_at: now,
      history: Vec::new(),
    }
  }

  /// Apply `action`, or fail without modifying the record. `bands` supplies
  /// the day-to-action and recommendation for a reopened, escalated record.
  pub fn apply(&mut self, action: RiskAction, bands: &RiskBands, now: DateTime<Utc>) -> Result<()> {
    use RiskStatus::*;

    let invalid = |from: RiskStatus, action: RiskAction| Error::InvalidTransition { from, action };

    let (to, note) = match (self.status, action) {
      (Open, RiskAction::Assign { assignee }) => {
        let assignee = assignee.trim();
        if assignee.is_empty() {
          return Err(Error::MissingAssignee);
        }
        self.assignee = Some(assignee.to_owned());
        (Assigned, Some(format!("assigned to {assignee}")))
      }
      (Assigned, RiskAction::Start) => (InProgress, None),
      (InProgress, RiskAction::Resolve { note }) | (InProgress, RiskAction::Dismiss { note })
        if note.trim().is_empty() =>
      {
        return Err(Error::MissingResolutionNote);
      }
      (InProgress, RiskAction::Resolve { note }) => {
        self.resolution_note = Some(note.clone());
        (Resolved, Some(note))
      }
      (InProgress, RiskAction::Dismiss { note }) => {
        self.resolution_note = Some(note.clone());
        (Dismissed, Some(note))
      }
      (InProgress, RiskAction::Escalate) => (Escalated, None),
      (Escalated, RiskAction::Reopen) => {
        let classification = bands.classification_for(self.level.escalated());
        self.level = classification.level;
        self.days_to_action = classification.days_to_action;
        self.recommendation = classification.recommendation;
        self.assignee = None;
        (Open, Some(format!("reopened at {}", self.level)))
      }
      (from, action) => return Err(invalid(from, action)),
    };

    self.history.push(RiskTransition { from: self.status, to, at: now, note });
    self.status = to;
    self.updated_at = now;
    Ok(())
  }
}
