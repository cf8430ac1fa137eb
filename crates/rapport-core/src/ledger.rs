//! Time activities and the time ledger.
//!
//! Every minute recorded is tagged with a time nature and the λ in effect at
//! the moment it was recorded, so later λ changes never rewrite history:
//!
//! ```text
//! stu = real_hours × λ_at_time
//! NTV = T3_created − T1_invested + T2_saved
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  edge::PairKey,
  factor::{normalize_factor, Bounds},
};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TimeNature {
  /// T1: time spent.
  Invested,
  /// T2: time someone no longer has to spend.
  Saved,
  /// T3: time that produced lasting output.
  Created,
}

/// An interaction reported by the ingestion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
  pub from_node:     Uuid,
  /// Counterpart, when the time was spent with another node.
  pub to_node:       Option<Uuid>,
  pub real_minutes:  f64,
  pub activity_type: TimeNature,
  /// Defaults to the ingestion time.
  pub timestamp:     Option<DateTime<Utc>>,
}

/// A single atomic time record. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeActivity {
  pub activity_id:    Uuid,
  pub node_id:        Uuid,
  pub counterpart_id: Option<Uuid>,
  pub nature:         TimeNature,
  pub real_minutes:   f64,
  pub lambda_at_time: f64,
  pub recorded_at:    DateTime<Utc>,
}

impl TimeActivity {
  /// Build an activity from an interaction, stamping the current λ of the
  /// reporting node. Negative and NaN durations count as zero.
  pub fn from_interaction(interaction: &Interaction, lambda: f64, now: DateTime<Utc>) -> Self {
    let minutes = if interaction.real_minutes.is_nan() {
      tracing::debug!(factor = "real_minutes", "NaN duration recorded as zero");
      0.0
    } else {
      interaction.real_minutes
    };
    Self {
      activity_id:    Uuid::new_v4(),
      node_id:        interaction.from_node,
      counterpart_id: interaction.to_node,
      nature:         interaction.activity_type,
      real_minutes:   normalize_factor("real_minutes", Some(minutes), Bounds::NON_NEGATIVE),
      lambda_at_time: lambda,
      recorded_at:    interaction.timestamp.unwrap_or(now),
    }
  }

  pub fn real_hours(&self) -> f64 { self.real_minutes / 60.0 }

  /// λ-weighted hours.
  pub fn stu_value(&self) -> f64 { self.real_hours() * self.lambda_at_time }

  /// The pair this activity belongs to, if it has a distinct counterpart.
  pub fn pair(&self) -> Option<PairKey> {
    self
      .counterpart_id
      .and_then(|other| PairKey::new(self.node_id, other).ok())
  }
}

// ─── Ledger ──────────────────────────────────────────────────────────────────

/// STU totals per time nature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeLedger {
  pub invested: f64,
  pub saved:    f64,
  pub created:  f64,
}

impl TimeLedger {
  pub fn from_activities<'a>(activities: impl IntoIterator<Item = &'a TimeActivity>) -> Self {
    activities
      .into_iter()
      .fold(Self::default(), |mut ledger, activity| {
        let stu = activity.stu_value();
        match activity.nature {
          TimeNature::Invested => ledger.invested += stu,
          TimeNature::Saved => ledger.saved += stu,
          TimeNature::Created => ledger.created += stu,
        }
        ledger
      })
  }

  /// Net time value: `T3 − T1 + T2`.
  pub fn net_time_value(&self) -> f64 { self.created - self.invested + self.saved }

  /// `(T2 + T3) / T1`, or 0 with nothing invested.
  pub fn efficiency_ratio(&self) -> f64 {
    if self.invested <= 0.0 {
      return 0.0;
    }
    (self.saved + self.created) / self.invested
  }

  /// `NTV / T1`, or 0 with nothing invested.
  pub fn time_roi(&self) -> f64 {
    if self.invested <= 0.0 {
      return 0.0;
    }
    self.net_time_value() / self.invested
  }
}

/// Λ: the λ-weighted time both parties put into a pair:
/// `λ_A × t_A + λ_B × t_B`, using each record's λ at the time.
pub fn weighted_time<'a>(activities: impl IntoIterator<Item = &'a TimeActivity>) -> f64 {
  activities.into_iter().map(TimeActivity::stu_value).sum()
}

/// The most recent `recorded_at` among `activities`.
pub fn last_contact<'a>(
  activities: impl IntoIterator<Item = &'a TimeActivity>,
) -> Option<DateTime<Utc>> {
  activities.into_iter().map(|a| a.recorded_at).max()
}

/// Relative fall in real minutes between the previous window and the most
/// recent one: `max(0, 1 − recent / previous)`. Zero when the previous window
/// is empty.
pub fn activity_drop<'a>(
  activities: impl IntoIterator<Item = &'a TimeActivity>,
  now: DateTime<Utc>,
  window_days: u32,
) -> f64 {
  let window = Duration::days(i64::from(window_days));
  let recent_start = now - window;
  let previous_start = recent_start - window;

  let (recent, previous) =
    activities
      .into_iter()
      .fold((0.0, 0.0), |(recent, previous), a| {
        if a.recorded_at > recent_start && a.recorded_at <= now {
          (recent + a.real_minutes, previous)
        } else if a.recorded_at > previous_start && a.recorded_at <= recent_start {
          (recent, previous + a.real_minutes)
        } else {
          (recent, previous)
        }
      });

  if previous <= 0.0 {
    return 0.0;
  }
  Bounds::UNIT.clamp(1.0 - recent / previous)
}
