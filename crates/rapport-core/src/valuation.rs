//! The value engine: composes λ, σ and P with elapsed time into V, and
//! derives churn probability.
//!
//! Two compositions exist side by side:
//!
//! ```text
//! multiplicative:  V = P × Λ × multiplier(σ, t)
//! power law:       V = T^σ,  T = Λ,  σ clamped to [0.5, 3.0]
//! ```
//!
//! where `Λ = Σ λᵢ × timeᵢ` over both parties' contributions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  config::EngineConfig,
  density::{compute_density, DecayedDensity},
  factor::{normalize_factor, Bounds},
  lambda::compute_lambda,
  ledger::TimeLedger,
  node::NodeFactors,
  risk::Classification,
  sigma::{ObservedOutcome, SynergyFactors, SynergyMultiplier},
  snapshot::{HealthStatus, ValueComponents},
  Result,
};

/// σ range of the power-law family.
pub const POWER_LAW_SIGMA_BOUNDS: Bounds = Bounds::new(0.5, 3.0);

const DAYS_PER_MONTH: f64 = 30.44;

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
pub enum ValueComposition {
  #[default]
  Multiplicative,
  PowerLaw,
}

// ─── Formulas ────────────────────────────────────────────────────────────────

/// `V = P × Λ × multiplier(σ, t)`.
pub fn multiplicative_value(
  density: f64,
  weighted_time: f64,
  sigma: f64,
  elapsed_months: f64,
  multiplier: &SynergyMultiplier,
) -> f64 {
  Bounds::UNIT.clamp(density) * weighted_time.max(0.0) * multiplier.apply(sigma, elapsed_months)
}

/// `V = T^σ`. Zero when `T ≤ 0`; σ is clamped into the power-law range.
pub fn power_law_value(weighted_time: f64, sigma: f64) -> f64 {
  if !(weighted_time > 0.0) {
    return 0.0;
  }
  weighted_time.powf(normalize_factor("sigma", Some(sigma), POWER_LAW_SIGMA_BOUNDS))
}

/// Base churn risk by σ band plus `activity_drop × 0.3`, capped at 1.
///
/// | σ         | base |
/// |-----------|------|
/// | ≥ 0.5     | 0.05 |
/// | ≥ 0.2     | 0.15 |
/// | ≥ 0       | 0.30 |
/// | ≥ −0.3    | 0.50 |
/// | otherwise | 0.70 |
pub fn churn_probability(sigma: f64, activity_drop: f64) -> f64 {
  let base = match sigma {
    s if s >= 0.5 => 0.05,
    s if s >= 0.2 => 0.15,
    s if s >= 0.0 => 0.3,
    s if s >= -0.3 => 0.5,
    _ => 0.7,
  };
  let drop = normalize_factor("activity_drop", Some(activity_drop), Bounds::UNIT);
  (base + drop * 0.3).min(1.0)
}

/// Months between two instants, floored at zero.
pub fn months_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
  crate::density::days_between(from, to) / DAYS_PER_MONTH
}

// ─── Valuator ────────────────────────────────────────────────────────────────

/// Everything a pair valuation needs, already loaded by the caller.
#[derive(Debug, Clone, Copy)]
pub struct PairInputs {
  pub sigma:          f64,
  pub density:        DecayedDensity,
  /// Λ in STU.
  pub weighted_time:  f64,
  pub elapsed_months: f64,
  pub activity_drop:  f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairValuation {
  pub value:          f64,
  pub monetary:       f64,
  pub components:     ValueComponents,
  pub classification: Classification,
  pub health:         HealthStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeValuation {
  pub value:      f64,
  pub monetary:   f64,
  pub components: ValueComponents,
  pub health:     HealthStatus,
}

/// A validated [`EngineConfig`] bound to the pure calculators.
#[derive(Debug, Clone)]
pub struct Valuator {
  config: EngineConfig,
}

impl Valuator {
  /// Fails fast on an invalid configuration.
  pub fn new(config: EngineConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self { config })
  }

  pub fn config(&self) -> &EngineConfig { &self.config }

  pub fn lambda(&self, factors: &NodeFactors) -> f64 {
    compute_lambda(factors, &self.config.lambda)
  }

  pub fn sigma(&self, factors: &SynergyFactors, observed: Option<ObservedOutcome>) -> f64 {
    self.config.sigma.compute(factors, observed)
  }

  pub fn density(&self, frequency: f64, depth: f64, quality: f64) -> f64 {
    compute_density(frequency, depth, quality, self.config.density.formula)
  }

  pub fn multiplier(&self, sigma: f64, elapsed_months: f64) -> f64 {
    self.config.multiplier.apply(sigma, elapsed_months)
  }

  pub fn classify(&self, risk: f64) -> Classification {
    self.config.risk.bands.classify(risk)
  }

  pub fn monetary(&self, stu: f64) -> f64 { stu * self.config.omega }

  /// Compose V with the configured strategy and classify churn.
  pub fn value_pair(&self, inputs: &PairInputs) -> PairValuation {
    let (value, multiplier) = match self.config.composition {
      ValueComposition::Multiplicative => {
        let m = self.multiplier(inputs.sigma, inputs.elapsed_months);
        let v = multiplicative_value(
          inputs.density.value,
          inputs.weighted_time,
          inputs.sigma,
          inputs.elapsed_months,
          &self.config.multiplier,
        );
        (v, Some(m))
      }
      ValueComposition::PowerLaw => (power_law_value(inputs.weighted_time, inputs.sigma), None),
    };

    let churn = churn_probability(inputs.sigma, inputs.activity_drop);
    let classification = self.classify(churn);

    PairValuation {
      value,
      monetary: self.monetary(value),
      components: ValueComponents::Pair {
        sigma: inputs.sigma,
        density: inputs.density.raw,
        decayed_density: inputs.density.value,
        idle_days: inputs.density.idle_days,
        weighted_time: inputs.weighted_time,
        elapsed_months: inputs.elapsed_months,
        multiplier,
        activity_drop: inputs.activity_drop,
        churn_probability: churn,
      },
      health: HealthStatus::from_risk_level(classification.level),
      classification,
    }
  }

  /// A node's own value is its net time value.
  pub fn value_node(&self, lambda: f64, ledger: &TimeLedger) -> NodeValuation {
    let value = ledger.net_time_value();
    let time_roi = ledger.time_roi();
    NodeValuation {
      value,
      monetary: self.monetary(value),
      components: ValueComponents::Node {
        lambda,
        invested: ledger.invested,
        saved: ledger.saved,
        created: ledger.created,
        efficiency_ratio: ledger.efficiency_ratio(),
        time_roi,
      },
      health: HealthStatus::from_time_roi(time_roi),
    }
  }
}
