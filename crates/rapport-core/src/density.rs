//! P: relationship density, and its exponential decay while a pair is idle.
//!
//! The stored density is always the undecayed value measured over a window.
//! Decay is applied on read against the caller's clock, so a persisted sample
//! never goes stale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  edge::PairKey,
  factor::{normalize_factor, Bounds},
  Error, Result,
};

/// Bounds accepted for a per-day decay rate.
pub const DECAY_RATE_BOUNDS: Bounds = Bounds::new(0.0, 1.0);

const SECONDS_PER_DAY: f64 = 86_400.0;

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
pub enum DensityFormula {
  /// `√(F × D) × Q`
  #[default]
  GeometricMean,
  /// `F × D × Q`
  Product,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DensityConfig {
  pub formula:            DensityFormula,
  /// Used when a sample does not carry its own rate. Typically 0.01–0.05.
  pub default_decay_rate: f64,
}

impl Default for DensityConfig {
  fn default() -> Self {
    Self {
      formula:            DensityFormula::default(),
      default_decay_rate: 0.02,
    }
  }
}

impl DensityConfig {
  pub fn validate(&self) -> Result<()> {
    if !DECAY_RATE_BOUNDS.contains(self.default_decay_rate) {
      return Err(Error::InvalidConfig(format!(
        "density.default_decay_rate must be in [0, 1], got {}",
        self.default_decay_rate
      )));
    }
    Ok(())
  }
}

/// Density from frequency, depth and quality, each normalised to `[0, 1]`.
pub fn compute_density(
  frequency: f64,
  depth: f64,
  quality: f64,
  formula: DensityFormula,
) -> f64 {
  let f = normalize_factor("frequency", Some(frequency), Bounds::UNIT);
  let d = normalize_factor("depth", Some(depth), Bounds::UNIT);
  let q = normalize_factor("quality", Some(quality), Bounds::UNIT);
  let p = match formula {
    DensityFormula::GeometricMean => (f * d).sqrt() * q,
    DensityFormula::Product => f * d * q,
  };
  Bounds::UNIT.clamp(p)
}

/// `P × exp(−rate × idle_days)`. Negative idle time counts as zero.
pub fn decay(density: f64, decay_rate: f64, idle_days: f64) -> f64 {
  let rate = DECAY_RATE_BOUNDS.clamp(decay_rate);
  Bounds::UNIT.clamp(density) * (-rate * idle_days.max(0.0)).exp()
}

/// Whole and fractional days between `from` and `to`, floored at zero.
pub fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
  ((to - from).num_seconds().max(0) as f64) / SECONDS_PER_DAY
}

// ─── Samples ─────────────────────────────────────────────────────────────────

/// A windowed measurement of contact between a pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DensitySample {
  pub sample_id:           Uuid,
  pub pair:                PairKey,
  pub frequency:           f64,
  pub depth:               f64,
  pub quality:             f64,
  /// Undecayed density for the window.
  pub density:             f64,
  pub decay_rate:          f64,
  pub last_interaction_at: DateTime<Utc>,
  pub measured_at:         DateTime<Utc>,
}

impl DensitySample {
  /// Advance `last_interaction_at` to `contact` when that is later. Logged
  /// interactions reset idle time without rewriting the measured density.
  pub fn with_contact(mut self, contact: Option<DateTime<Utc>>) -> Self {
    if let Some(at) = contact
      && at > self.last_interaction_at
    {
      self.last_interaction_at = at;
    }
    self
  }

  pub fn idle_days(&self, now: DateTime<Utc>) -> f64 {
    days_between(self.last_interaction_at, now)
  }

  /// Apply idle decay as of `now`.
  pub fn decayed(&self, now: DateTime<Utc>) -> DecayedDensity {
    let idle_days = self.idle_days(now);
    DecayedDensity {
      raw: self.density,
      value: decay(self.density, self.decay_rate, idle_days),
      idle_days,
      computed_at: now,
    }
  }
}

/// Input to density recording. Missing factors default to 0.5.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDensitySample {
  pub node_a:              Uuid,
  pub node_b:              Uuid,
  pub frequency:           Option<f64>,
  pub depth:               Option<f64>,
  pub quality:             Option<f64>,
  pub decay_rate:          Option<f64>,
  pub last_interaction_at: DateTime<Utc>,
}

impl NewDensitySample {
  /// Normalise the inputs and compute P.
  pub fn into_sample(self, config: &DensityConfig, now: DateTime<Utc>) -> Result<DensitySample> {
    let pair = PairKey::new(self.node_a, self.node_b)?;
    let frequency = normalize_factor("frequency", self.frequency, Bounds::UNIT);
    let depth = normalize_factor("depth", self.depth, Bounds::UNIT);
    let quality = normalize_factor("quality", self.quality, Bounds::UNIT);
    let decay_rate = normalize_factor(
      "decay_rate",
      Some(self.decay_rate.unwrap_or(config.default_decay_rate)),
      DECAY_RATE_BOUNDS,
    );
    Ok(DensitySample {
      sample_id: Uuid::new_v4(),
      pair,
      frequency,
      depth,
      quality,
      density: compute_density(frequency, depth, quality, config.formula),
      decay_rate,
      last_interaction_at: self.last_interaction_at,
      measured_at: now,
    })
  }
}

/// A density value with the decay applied and the clock it was applied at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayedDensity {
  pub raw:         f64,
  pub value:       f64,
  pub idle_days:   f64,
  pub computed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use chrono::Duration;
  use proptest::prelude::*;

  use super::*;

  #[test]
  fn formulas_differ() {
    let gm = compute_density(0.64, 0.25, 0.5, DensityFormula::GeometricMean);
    let pr = compute_density(0.64, 0.25, 0.5, DensityFormula::Product);
    assert!((gm - 0.2).abs() < 1e-12);
    assert!((pr - 0.08).abs() < 1e-12);
  }

  #[test]
  fn decay_matches_closed_form() {
    let p = decay(0.8, 0.02, 30.0);
    assert!((p - 0.8 * (-0.6f64).exp()).abs() < 1e-12);
    assert_eq!(decay(0.8, 0.02, 0.0), 0.8);
    assert_eq!(decay(0.8, 0.02, -5.0), 0.8);
  }

  #[test]
  fn sample_decays_on_read() {
    let now = Utc::now();
    let sample = NewDensitySample {
      node_a:              Uuid::new_v4(),
      node_b:              Uuid::new_v4(),
      frequency:           Some(1.0),
      depth:               Some(1.0),
      quality:             Some(1.0),
      decay_rate:          Some(0.05),
      last_interaction_at: now - Duration::days(10),
    }
    .into_sample(&DensityConfig::default(), now)
    .unwrap();
    assert_eq!(sample.density, 1.0);

    let decayed = sample.decayed(now);
    assert!((decayed.idle_days - 10.0).abs() < 1e-9);
    assert!((decayed.value - (-0.5f64).exp()).abs() < 1e-9);
    assert_eq!(decayed.computed_at, now);

    let touched = sample.clone().with_contact(Some(now - Duration::days(2)));
    assert!((touched.idle_days(now) - 2.0).abs() < 1e-9);
    assert_eq!(touched.density, sample.density);

    // An older contact never pushes the idle clock back.
    let stale = sample.clone().with_contact(Some(now - Duration::days(30)));
    assert_eq!(stale.last_interaction_at, sample.last_interaction_at);
    assert_eq!(sample.clone().with_contact(None).last_interaction_at, sample.last_interaction_at);
  }

  #[test]
  fn sample_rejects_self_pair() {
    let id = Uuid::new_v4();
    let result = NewDensitySample {
      node_a:              id,
      node_b:              id,
      frequency:           None,
      depth:               None,
      quality:             None,
      decay_rate:          None,
      last_interaction_at: Utc::now(),
    }
    .into_sample(&DensityConfig::default(), Utc::now());
    assert!(matches!(result, Err(Error::SelfPair(_))));
  }

  proptest! {
    #[test]
    fn density_stays_in_unit_range(f in -2.0f64..2.0, d in -2.0f64..2.0, q in -2.0f64..2.0) {
      for formula in [DensityFormula::GeometricMean, DensityFormula::Product] {
        prop_assert!(Bounds::UNIT.contains(compute_density(f, d, q, formula)));
      }
    }

    #[test]
    fn decay_is_non_increasing(p in 0.0f64..1.0, rate in 0.0f64..0.1, days in 0.0f64..1000.0, more in 0.0f64..100.0) {
      prop_assert!(decay(p, rate, days + more) <= decay(p, rate, days));
    }
  }
}
