//! σ: the pairwise synergy coefficient, and the time-compounding multiplier
//! it drives.
//!
//! Three σ strategies coexist because different product iterations computed
//! it differently:
//!
//! | Strategy   | Inputs                          | Formula                       | Range     |
//! |------------|---------------------------------|-------------------------------|-----------|
//! | `weighted` | four factors in `[-1, 1]`       | `Σ wᵢ·fᵢ`                     | `[-1, 1]` |
//! | `rescaled` | four factors in `[0, 1]`        | `2 × (Σ wᵢ·fᵢ / Σ wᵢ) − 1`    | `[-1, 1]` |
//! | `inverse`  | observed value A, λ-time T      | `ln A / ln T`                 | `[-1, 3]` |
//!
//! The multiplier likewise has an `exponential` and a `bounded_growth` form.

use serde::{Deserialize, Serialize};

use crate::{
  factor::{normalize_factor, Bounds},
  Error, Result,
};

/// Range of the `inverse` strategy.
pub const INVERSE_SIGMA_BOUNDS: Bounds = Bounds::new(-1.0, 3.0);

/// Returned by the `inverse` strategy when the logarithms are undefined.
/// σ = 1 means value grew exactly in step with invested time.
pub const NEUTRAL_INVERSE_SIGMA: f64 = 1.0;

// ─── Strategy ────────────────────────────────────────────────────────────────

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
pub enum SigmaStrategy {
  /// Survey-era edges: signed factors, plain weighted sum.
  #[default]
  Weighted,
  /// AI-scored edges: unsigned factors mapped onto `[-1, 1]`.
  Rescaled,
  /// Back-solved from observed outcomes; pairs with the power-law value.
  Inverse,
}

// ─── Factors and weights ─────────────────────────────────────────────────────

/// The four compatibility sub-factors of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SynergyFactors {
  pub compatibility:  f64,
  pub goal_alignment: f64,
  pub value_match:    f64,
  pub rhythm_sync:    f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigmaWeights {
  pub compatibility:  f64,
  pub goal_alignment: f64,
  pub value_match:    f64,
  pub rhythm_sync:    f64,
}

impl Default for SigmaWeights {
  fn default() -> Self {
    Self {
      compatibility:  0.3,
      goal_alignment: 0.3,
      value_match:    0.2,
      rhythm_sync:    0.2,
    }
  }
}

impl SigmaWeights {
  const SUM_TOLERANCE: f64 = 0.01;

  fn as_array(&self) -> [f64; 4] {
    [self.compatibility, self.goal_alignment, self.value_match, self.rhythm_sync]
  }

  pub fn sum(&self) -> f64 { self.as_array().iter().sum() }

  /// Weights must be finite, non-negative, and sum to 1 (± 0.01).
  pub fn validate(&self) -> Result<()> {
    if self.as_array().iter().any(|w| !w.is_finite() || *w < 0.0) {
      return Err(Error::InvalidConfig(format!(
        "sigma weights must be non-negative, got {self:?}"
      )));
    }
    let sum = self.sum();
    if (sum - 1.0).abs() > Self::SUM_TOLERANCE {
      return Err(Error::InvalidConfig(format!(
        "sigma weights must sum to 1.0, got {sum}"
      )));
    }
    Ok(())
  }

  fn dot(&self, factors: &SynergyFactors, bounds: Bounds) -> f64 {
    self.compatibility * normalize_factor("compatibility", Some(factors.compatibility), bounds)
      + self.goal_alignment
        * normalize_factor("goal_alignment", Some(factors.goal_alignment), bounds)
      + self.value_match * normalize_factor("value_match", Some(factors.value_match), bounds)
      + self.rhythm_sync * normalize_factor("rhythm_sync", Some(factors.rhythm_sync), bounds)
  }
}

// ─── Strategies ──────────────────────────────────────────────────────────────

/// `σ = Σ wᵢ·fᵢ` over signed factors, clamped to `[-1, 1]`.
pub fn weighted_sigma(factors: &SynergyFactors, weights: &SigmaWeights) -> f64 {
  Bounds::SIGNED.clamp(weights.dot(factors, Bounds::SIGNED))
}

/// `σ = 2 × weighted_avg − 1` over unsigned factors.
pub fn rescaled_sigma(factors: &SynergyFactors, weights: &SigmaWeights) -> f64 {
  let total = weights.sum();
  if total <= 0.0 {
    return 0.0;
  }
  let avg = weights.dot(factors, Bounds::UNIT) / total;
  Bounds::SIGNED.clamp(2.0 * avg - 1.0)
}

/// `σ = ln(A) / ln(T)` where `A` is the observed value and `T` the λ-weighted
/// time that produced it. Returns [`NEUTRAL_INVERSE_SIGMA`] when `T ≤ 1` or
/// `A ≤ 0`.
pub fn inverse_sigma(observed_value: f64, weighted_time: f64) -> f64 {
  if !(observed_value.is_finite() && weighted_time.is_finite())
    || weighted_time <= 1.0
    || observed_value <= 0.0
  {
    return NEUTRAL_INVERSE_SIGMA;
  }
  INVERSE_SIGMA_BOUNDS.clamp(observed_value.ln() / weighted_time.ln())
}

/// An observed (value, time) pair used by the `inverse` strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservedOutcome {
  pub value:         f64,
  pub weighted_time: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigmaConfig {
  pub strategy: SigmaStrategy,
  pub weights:  SigmaWeights,
}

impl SigmaConfig {
  pub fn validate(&self) -> Result<()> { self.weights.validate() }

  /// Range of σ produced by the configured strategy.
  pub fn bounds(&self) -> Bounds {
    match self.strategy {
      SigmaStrategy::Weighted | SigmaStrategy::Rescaled => Bounds::SIGNED,
      SigmaStrategy::Inverse => INVERSE_SIGMA_BOUNDS,
    }
  }

  /// Compute σ with the configured strategy. The `inverse` strategy ignores
  /// `factors` and falls back to its neutral value when no outcome has been
  /// observed yet.
  pub fn compute(&self, factors: &SynergyFactors, observed: Option<ObservedOutcome>) -> f64 {
    match self.strategy {
      SigmaStrategy::Weighted => weighted_sigma(factors, &self.weights),
      SigmaStrategy::Rescaled => rescaled_sigma(factors, &self.weights),
      SigmaStrategy::Inverse => observed
        .map(|o| inverse_sigma(o.value, o.weighted_time))
        .unwrap_or(NEUTRAL_INVERSE_SIGMA),
    }
  }
}

// ─── Multiplier ──────────────────────────────────────────────────────────────

/// How σ compounds over elapsed time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SynergyMultiplier {
  /// `exp(σ × t_months / 12)`
  #[default]
  Exponential,
  /// For σ > 0: `max(1, s_max × (1 − exp(−σ·t/τ)))`; for σ ≤ 0: `exp(σ·t)`,
  /// with `t` and `τ` in years.
  BoundedGrowth { s_max: f64, tau_years: f64 },
}

impl SynergyMultiplier {
  pub fn validate(&self) -> Result<()> {
    if let Self::BoundedGrowth { s_max, tau_years } = *self {
      if !(s_max.is_finite() && s_max >= 1.0) {
        return Err(Error::InvalidConfig(format!(
          "multiplier.s_max must be at least 1.0, got {s_max}"
        )));
      }
      if !(tau_years.is_finite() && tau_years > 0.0) {
        return Err(Error::InvalidConfig(format!(
          "multiplier.tau_years must be positive, got {tau_years}"
        )));
      }
    }
    Ok(())
  }

  /// The multiplier after `t_months` of elapsed time. Negative elapsed time
  /// is treated as zero.
  pub fn apply(&self, sigma: f64, t_months: f64) -> f64 {
    let t_years = t_months.max(0.0) / 12.0;
    match *self {
      Self::Exponential => (sigma * t_years).exp(),
      Self::BoundedGrowth { s_max, tau_years } => {
        if sigma > 0.0 {
          (s_max * (1.0 - (-sigma * t_years / tau_years).exp())).max(1.0)
        } else {
          (sigma * t_years).exp()
        }
      }
    }
  }
}
