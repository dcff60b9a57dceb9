//! Standard-normal tail probabilities for lognormal ground-motion models.

use crate::error::{HazardError, Result};
use serde::{Deserialize, Serialize};

const D1: f64 = 0.049_867_347_0;
const D2: f64 = 0.021_141_006_1;
const D3: f64 = 0.003_277_626_3;
const D4: f64 = 0.000_038_003_6;
const D5: f64 = 0.000_048_890_6;
const D6: f64 = 0.000_005_383_0;

/// Standard normal CDF via the Abramowitz & Stegun 26.2.19 polynomial.
/// Accurate enough for hazard work between roughly -4 and +7.5 sigma.
pub fn cdf(z: f64) -> f64 {
    let v = z.abs();
    let poly = (((((D6 * v + D5) * v + D4) * v + D3) * v + D2) * v + D1) * v + 1.0;
    let tail = 0.5 * poly.powi(-16);
    if z < 0.0 {
        tail
    } else {
        1.0 - tail
    }
}

/// How the lognormal distribution is truncated.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Truncation {
    #[default]
    None,
    /// No ground motion above `level` sigma.
    Upper { level: f64 },
    /// No ground motion outside `±level` sigma.
    TwoSided { level: f64 },
}

impl Truncation {
    /// Two-sided truncation needs a positive level; upper truncation a
    /// non-negative one.
    pub fn check(&self) -> Result<()> {
        let ok = match *self {
            Truncation::None => true,
            Truncation::Upper { level } => level >= 0.0,
            Truncation::TwoSided { level } => level > 0.0,
        };
        if !ok {
            return Err(HazardError::Config(format!("invalid truncation {self:?}")));
        }
        Ok(())
    }
}

/// Probability that a standard-normal variate exceeds `z`, honoring
/// truncation.
pub fn exceed_prob(z: f64, truncation: Truncation) -> f64 {
    match truncation {
        Truncation::None => 1.0 - cdf(z),
        Truncation::Upper { level } => {
            if z > level {
                0.0
            } else {
                let p_up = cdf(level);
                (1.0 - cdf(z) / p_up).clamp(0.0, 1.0)
            }
        }
        Truncation::TwoSided { level } => {
            if z > level {
                0.0
            } else if z < -level {
                1.0
            } else {
                let p_up = cdf(level);
                let p_low = cdf(-level);
                ((p_up - cdf(z)) / (p_up - p_low)).clamp(0.0, 1.0)
            }
        }
    }
}

/// Exceedance probability of `ln_level` for a lognormal with log-mean
/// `mean` and log standard deviation `std_dev`. A zero deviation collapses
/// to a step function.
pub fn lognormal_exceedance(mean: f64, std_dev: f64, ln_level: f64, truncation: Truncation) -> f64 {
    if std_dev == 0.0 {
        return if ln_level >= mean { 0.0 } else { 1.0 };
    }
    exceed_prob((ln_level - mean) / std_dev, truncation)
}
