//! Factor normalisation.
//!
//! Every raw factor passes through [`normalize`] before it reaches a
//! calculator. Out-of-range values are clamped, never rejected; missing and
//! NaN values fall back to [`DEFAULT_FACTOR`]. Clamping is logged at `debug`
//! so operators can audit which inputs were corrected.

use serde::{Deserialize, Serialize};

/// Substitute for a missing bounded factor.
pub const DEFAULT_FACTOR: f64 = 0.5;

/// A closed interval `[lo, hi]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
  pub lo: f64,
  pub hi: f64,
}

impl Bounds {
  /// `[0, 1]`: replaceability, influence, density inputs, probabilities.
  pub const UNIT: Bounds = Bounds::new(0.0, 1.0);
  /// `[-1, 1]`: signed synergy factors and σ.
  pub const SIGNED: Bounds = Bounds::new(-1.0, 1.0);
  /// `[0, +inf)`: durations.
  pub const NON_NEGATIVE: Bounds = Bounds::new(0.0, f64::INFINITY);

  pub const fn new(lo: f64, hi: f64) -> Self { Self { lo, hi } }

  pub fn contains(&self, value: f64) -> bool {
    value >= self.lo && value <= self.hi
  }

  /// Clamp `value` into the interval. NaN maps to the default factor,
  /// itself clamped.
  pub fn clamp(&self, value: f64) -> f64 {
    if value.is_nan() {
      return DEFAULT_FACTOR.clamp(self.lo, self.hi);
    }
    value.clamp(self.lo, self.hi)
  }
}

/// Clamp `factor` into `[lo, hi]`, substituting [`DEFAULT_FACTOR`] when it is
/// absent.
pub fn normalize(factor: Option<f64>, lo: f64, hi: f64) -> f64 {
  Bounds::new(lo, hi).clamp(factor.unwrap_or(DEFAULT_FACTOR))
}

/// [`normalize`] with an audit trail: emits a `debug` event naming the factor
/// whenever the value had to be corrected.
pub fn normalize_factor(name: &str, factor: Option<f64>, bounds: Bounds) -> f64 {
  let clamped = normalize(factor, bounds.lo, bounds.hi);
  match factor {
    None => {
      tracing::debug!(factor = name, default = clamped, "missing factor replaced with default");
    }
    Some(raw) if raw != clamped => {
      tracing::debug!(factor = name, raw, clamped, "factor clamped into range");
    }
    Some(_) => {}
  }
  clamped
}
