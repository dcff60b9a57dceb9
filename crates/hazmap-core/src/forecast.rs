//! Earthquake rupture forecast: sources and their ruptures.
//!
//! A forecast is loaded once per computation and shared read-only by every
//! worker. Nothing in here is mutated after loading.

use crate::error::{HazardError, Result};
use crate::geo::{min_distance_3d, min_horizontal_distance, Location};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Mechanism
// ---------------------------------------------------------------------------

/// Faulting style, used by ground-motion models that distinguish it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mechanism {
    StrikeSlip,
    Reverse,
    #[default]
    Unknown,
}

// ---------------------------------------------------------------------------
// Rupture
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rupture {
    pub magnitude: f64,
    /// Probability of occurrence within the forecast window.
    pub probability: f64,
    #[serde(default)]
    pub mechanism: Mechanism,
    /// Points sampling the rupture surface.
    pub surface: Vec<Location>,
}

impl Rupture {
    /// Joyner-Boore distance: closest horizontal distance to the surface.
    pub fn jb_distance(&self, site: &Location) -> f64 {
        min_horizontal_distance(site, &self.surface)
    }

    /// Closest 3-D distance to the surface.
    pub fn rupture_distance(&self, site: &Location) -> f64 {
        min_distance_3d(site, &self.surface)
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    /// Poisson sources combine ruptures multiplicatively; non-Poisson
    /// sources sum rupture contributions before combining.
    #[serde(default = "default_poissonian")]
    pub poissonian: bool,
    #[serde(default)]
    pub ruptures: Vec<Rupture>,
}

fn default_poissonian() -> bool {
    true
}

impl Source {
    /// Minimum distance from `site` to any rupture of this source. A source
    /// with no ruptures is infinitely far away.
    pub fn min_distance(&self, site: &Location) -> f64 {
        self.ruptures
            .iter()
            .map(|r| r.jb_distance(site))
            .fold(f64::INFINITY, f64::min)
    }

    pub fn num_ruptures(&self) -> usize {
        self.ruptures.len()
    }
}

// ---------------------------------------------------------------------------
// RuptureForecast
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuptureForecast {
    pub name: String,
    #[serde(default = "default_duration")]
    pub duration_years: f64,
    pub sources: Vec<Source>,
}

fn default_duration() -> f64 {
    1.0
}

impl RuptureForecast {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let forecast: RuptureForecast = serde_yaml::from_str(&data)?;
        forecast.validate()?;
        Ok(forecast)
    }

    /// Reject empty forecasts and out-of-range rupture probabilities.
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(HazardError::InvalidInput(format!(
                "forecast '{}' has no sources",
                self.name
            )));
        }
        for source in &self.sources {
            for (i, rupture) in source.ruptures.iter().enumerate() {
                check_probability(&source.name, i, rupture.probability)?;
            }
        }
        Ok(())
    }

    pub fn num_ruptures(&self) -> usize {
        self.sources.iter().map(Source::num_ruptures).sum()
    }
}

/// `p` must lie in `[0, 1)`.
pub fn check_probability(source: &str, rupture: usize, p: f64) -> Result<()> {
    if !(0.0..1.0).contains(&p) {
        return Err(HazardError::InvalidProbability {
            source_name: source.to_string(),
            rupture,
            probability: p,
        });
    }
    Ok(())
}
