//! λ: a node's time constant.
//!
//! ```text
//! λ = clamp( 1 / max(R, ε) × I × E × N × base × k , family bounds )
//! ```
//!
//! Two clamp families exist. `standard` bounds λ to `[0.5, 10]`; `floored`
//! raises the minimum to `1.0` so no participant's hour is ever worth less
//! than a raw hour. A deployment picks one and keeps it.

use serde::{Deserialize, Serialize};

use crate::{
  factor::Bounds,
  node::NodeFactors,
  Error, Result,
};

pub const LAMBDA_MAX: f64 = 10.0;

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
pub enum LambdaFamily {
  /// `[0.5, 10.0]`
  Standard,
  /// `[1.0, 10.0]`
  #[default]
  Floored,
}

impl LambdaFamily {
  pub fn bounds(self) -> Bounds {
    match self {
      Self::Standard => Bounds::new(0.5, LAMBDA_MAX),
      Self::Floored => Bounds::new(1.0, LAMBDA_MAX),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LambdaConfig {
  pub family:     LambdaFamily,
  /// Floor applied to replaceability before inversion.
  pub epsilon:    f64,
  pub base:       f64,
  /// Industry constant.
  pub industry_k: f64,
}

impl Default for LambdaConfig {
  fn default() -> Self {
    Self {
      family:     LambdaFamily::default(),
      epsilon:    0.1,
      base:       1.0,
      industry_k: 0.3,
    }
  }
}

impl LambdaConfig {
  pub fn validate(&self) -> Result<()> {
    if !(self.epsilon > 0.0 && self.epsilon <= 1.0) {
      return Err(Error::InvalidConfig(format!(
        "lambda.epsilon must be in (0, 1], got {}",
        self.epsilon
      )));
    }
    if !(self.base.is_finite() && self.base > 0.0) {
      return Err(Error::InvalidConfig(format!(
        "lambda.base must be positive, got {}",
        self.base
      )));
    }
    if !(self.industry_k.is_finite() && self.industry_k > 0.0) {
      return Err(Error::InvalidConfig(format!(
        "lambda.industry_k must be positive, got {}",
        self.industry_k
      )));
    }
    Ok(())
  }
}

/// Compute λ for `factors`. Factors are normalised first.
pub fn compute_lambda(factors: &NodeFactors, config: &LambdaConfig) -> f64 {
  let f = factors.normalized();
  let r_factor = 1.0 / f.replaceability.max(config.epsilon);
  let raw = r_factor
    * f.influence
    * f.expertise
    * f.network
    * config.base
    * config.industry_k;
  config.family.bounds().clamp(raw)
}

#[cfg(test)]
mod tests {
  use proptest::prelude::*;

  use super::*;

  fn factors(r: f64, i: f64, e: f64, n: f64) -> NodeFactors {
    NodeFactors { replaceability: r, influence: i, expertise: e, network: n }
  }

  #[test]
  fn low_raw_value_is_floored_to_one() {
    // rFactor = 5.0, raw = 5.0 × 0.8 × 0.7 × 0.6 × 0.3 = 0.504
    let lambda = compute_lambda(&factors(0.2, 0.8, 0.7, 0.6), &LambdaConfig::default());
    assert_eq!(lambda, 1.0);
  }

  #[test]
  fn standard_family_keeps_values_above_half() {
    let config = LambdaConfig { family: LambdaFamily::Standard, ..Default::default() };
    let lambda = compute_lambda(&factors(0.2, 0.8, 0.7, 0.6), &config);
    assert!((lambda - 0.504).abs() < 1e-12);
  }

  #[test]
  fn zero_replaceability_uses_epsilon() {
    // 1 / 0.1 = 10, × 1 × 1 × 1 × 1 × 0.3 = 3.0
    let lambda = compute_lambda(&factors(0.0, 1.0, 1.0, 1.0), &LambdaConfig::default());
    assert!((lambda - 3.0).abs() < 1e-12);
  }

  #[test]
  fn large_values_cap_at_ten() {
    let config = LambdaConfig { industry_k: 5.0, ..Default::default() };
    assert_eq!(compute_lambda(&factors(0.0, 1.0, 1.0, 1.0), &config), LAMBDA_MAX);
  }

  #[test]
  fn rejects_non_positive_epsilon() {
    let config = LambdaConfig { epsilon: 0.0, ..Default::default() };
    assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
  }

  proptest! {
    #[test]
    fn lambda_stays_in_family_bounds(
      r in -1.0f64..2.0, i in -1.0f64..2.0, e in -1.0f64..2.0, n in -1.0f64..2.0,
      standard in any::<bool>(),
    ) {
      let family = if standard { LambdaFamily::Standard } else { LambdaFamily::Floored };
      let config = LambdaConfig { family, ..Default::default() };
      let lambda = compute_lambda(&factors(r, i, e, n), &config);
      prop_assert!((0.5..=10.0).contains(&lambda));
      prop_assert!(family.bounds().contains(lambda));
    }
  }
}
