//! Intensity measure types and the level axis the aggregator queries on.

use crate::error::{HazardError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntensityMeasure {
    /// Peak ground acceleration (g).
    Pga,
    /// Peak ground velocity (cm/s).
    Pgv,
    /// Spectral acceleration (g) at `period` seconds.
    Sa { period: f64 },
    /// Modified Mercalli intensity.
    Mmi,
}

impl IntensityMeasure {
    /// Amplitude-like measures are conventionally handled in log space.
    pub fn is_amplitude(&self) -> bool {
        !matches!(self, IntensityMeasure::Mmi)
    }

    pub fn supports_axis(&self, axis: LevelAxis) -> bool {
        match axis {
            LevelAxis::Linear => true,
            LevelAxis::Log => self.is_amplitude(),
        }
    }
}

impl fmt::Display for IntensityMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntensityMeasure::Pga => write!(f, "PGA"),
            IntensityMeasure::Pgv => write!(f, "PGV"),
            IntensityMeasure::Sa { period } => write!(f, "SA({period}s)"),
            IntensityMeasure::Mmi => write!(f, "MMI"),
        }
    }
}

// ---------------------------------------------------------------------------
// LevelAxis
// ---------------------------------------------------------------------------

/// Whether intensity levels are handed to the model as natural logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelAxis {
    #[default]
    Log,
    Linear,
}

impl LevelAxis {
    pub fn as_str(&self) -> &'static str {
        match self {
            LevelAxis::Log => "log",
            LevelAxis::Linear => "linear",
        }
    }

    /// Map linear levels onto this axis. Log space requires every level to
    /// be strictly positive.
    pub fn to_axis(&self, levels: &[f64]) -> Result<Vec<f64>> {
        match self {
            LevelAxis::Linear => Ok(levels.to_vec()),
            LevelAxis::Log => levels
                .iter()
                .map(|&x| {
                    if x > 0.0 {
                        Ok(x.ln())
                    } else {
                        Err(HazardError::InvalidInput(format!(
                            "level {x} has no logarithm; log-axis levels must be positive"
                        )))
                    }
                })
                .collect(),
        }
    }
}

impl fmt::Display for LevelAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LevelAxis {
    type Err = HazardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "log" => Ok(LevelAxis::Log),
            "linear" => Ok(LevelAxis::Linear),
            other => Err(HazardError::Config(format!(
                "unknown level axis '{other}' (expected log or linear)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Levels file
// ---------------------------------------------------------------------------

/// Parse a levels file: one level per line, blank lines and `#` comments
/// ignored. Levels must be finite and strictly increasing.
pub fn parse_levels(text: &str) -> Result<Vec<f64>> {
    let mut levels = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let value: f64 = line.parse().map_err(|_| {
            HazardError::InvalidInput(format!("levels line {}: '{line}' is not a number", n + 1))
        })?;
        if !value.is_finite() {
            return Err(HazardError::InvalidInput(format!(
                "levels line {}: level must be finite",
                n + 1
            )));
        }
        levels.push(value);
    }
    check_levels(&levels)?;
    Ok(levels)
}

pub fn load_levels(path: &Path) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)?;
    parse_levels(&text)
}

pub fn check_levels(levels: &[f64]) -> Result<()> {
    if levels.is_empty() {
        return Err(HazardError::InvalidInput("no intensity levels given".into()));
    }
    if levels.windows(2).any(|w| w[1] <= w[0]) {
        return Err(HazardError::InvalidInput(
            "intensity levels must be strictly increasing".into(),
        ));
    }
    Ok(())
}
