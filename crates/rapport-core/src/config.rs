//! Engine configuration.
//!
//! Every field has a default, so an empty `[engine]` table is a valid
//! configuration. Validation runs when a [`crate::Valuator`] is built, never
//! during a calculation.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{
  density::DensityConfig,
  lambda::LambdaConfig,
  risk::RiskConfig,
  sigma::{SigmaConfig, SynergyMultiplier},
  valuation::ValueComposition,
  Error, Result,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub lambda:               LambdaConfig,
  pub sigma:                SigmaConfig,
  pub multiplier:           SynergyMultiplier,
  pub density:              DensityConfig,
  pub composition:          ValueComposition,
  pub risk:                 RiskConfig,
  /// Currency per STU.
  pub omega:                f64,
  /// Window length for the churn activity-drop comparison.
  pub activity_window_days: u32,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      lambda:               LambdaConfig::default(),
      sigma:                SigmaConfig::default(),
      multiplier:           SynergyMultiplier::default(),
      density:              DensityConfig::default(),
      composition:          ValueComposition::default(),
      risk:                 RiskConfig::default(),
      omega:                1.0,
      activity_window_days: 30,
    }
  }
}

impl EngineConfig {
  pub fn validate(&self) -> Result<()> {
    self.lambda.validate()?;
    self.sigma.validate()?;
    self.multiplier.validate()?;
    self.density.validate()?;
    self.risk.bands.validate()?;
    if !(self.omega.is_finite() && self.omega >= 0.0) {
      return Err(Error::InvalidConfig(format!(
        "omega must be a non-negative number, got {}",
        self.omega
      )));
    }
    if self.activity_window_days == 0 {
      return Err(Error::InvalidConfig(
        "activity_window_days must be at least 1".to_owned(),
      ));
    }
    Ok(())
  }
}

/// Parse a strategy name (`"power_law"`, `"rescaled"`, ...) into its enum,
/// mapping failures to [`Error::UnknownStrategy`].
pub fn parse_strategy<T: FromStr>(name: &str) -> Result<T> {
  name
    .trim()
    .parse()
    .map_err(|_| Error::UnknownStrategy(name.to_owned()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    density::DensityFormula,
    lambda::LambdaFamily,
    sigma::SigmaStrategy,
  };

  #[test]
  fn defaults_validate() {
    assert!(EngineConfig::default().validate().is_ok());
  }

  #[test]
  fn empty_json_uses_defaults() {
    let config: EngineConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config, EngineConfig::default());
  }

  #[test]
  fn nested_overrides_deserialize() {
    let config: EngineConfig = serde_json::from_value(serde_json::json!({
      "lambda": { "family": "standard" },
      "sigma": { "strategy": "rescaled" },
      "multiplier": { "kind": "bounded_growth", "s_max": 2.5, "tau_years": 2.0 },
      "density": { "formula": "product" },
      "composition": "power_law",
      "risk": { "queue_floor": "moderate" },
      "omega": 35.0
    }))
    .unwrap();
    assert_eq!(config.lambda.family, LambdaFamily::Standard);
    assert_eq!(config.lambda.industry_k, 0.3);
    assert_eq!(config.sigma.strategy, SigmaStrategy::Rescaled);
    assert_eq!(config.density.formula, DensityFormula::Product);
    assert_eq!(config.composition, ValueComposition::PowerLaw);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn unknown_strategy_name_fails() {
    let parsed: Result<ValueComposition> = parse_strategy("quadratic");
    assert!(matches!(parsed, Err(Error::UnknownStrategy(name)) if name == "quadratic"));
    let parsed: SigmaStrategy = parse_strategy(" inverse ").unwrap();
    assert_eq!(parsed, SigmaStrategy::Inverse);
  }

  #[test]
  fn unknown_strategy_in_config_fails_to_load() {
    let result = serde_json::from_str::<EngineConfig>(r#"{"composition": "quadratic"}"#);
    assert!(result.is_err());
  }

  #[test]
  fn bad_omega_fails_validation() {
    let config = EngineConfig { omega: -1.0, ..Default::default() };
    assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
  }
}
