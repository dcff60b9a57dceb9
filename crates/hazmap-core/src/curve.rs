use crate::error::{HazardError, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

/// Allowed rise between neighbouring probabilities, for rounding noise.
const MONOTONE_TOLERANCE: f64 = 1e-9;

/// Exceedance probability as a function of intensity level for one site.
///
/// Levels are strictly increasing; probabilities lie in `[0, 1]` and never
/// increase with level. Built only by the aggregator or by
/// parsing a curve file, and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardCurve {
    levels: Vec<f64>,
    probabilities: Vec<f64>,
}

impl HazardCurve {
    pub fn new(levels: Vec<f64>, probabilities: Vec<f64>) -> Result<Self> {
        if levels.len() != probabilities.len() {
            return Err(HazardError::InvalidInput(format!(
                "curve has {} levels but {} probabilities",
                levels.len(),
                probabilities.len()
            )));
        }
        if levels.windows(2).any(|w| w[1] <= w[0]) {
            return Err(HazardError::InvalidInput(
                "curve levels must be strictly increasing".into(),
            ));
        }
        if let Some(p) = probabilities.iter().find(|p| !(0.0..=1.0).contains(*p)) {
            return Err(HazardError::InvalidInput(format!(
                "curve probability {p} is outside [0, 1]"
            )));
        }
        if let Some(i) = probabilities
            .windows(2)
            .position(|w| w[1] > w[0] + MONOTONE_TOLERANCE)
        {
            return Err(HazardError::InvalidInput(format!(
                "curve probability rises from {} to {} between levels {} and {}",
                probabilities[i],
                probabilities[i + 1],
                levels[i],
                levels[i + 1]
            )));
        }
        Ok(Self {
            levels,
            probabilities,
        })
    }

    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.levels
            .iter()
            .copied()
            .zip(self.probabilities.iter().copied())
    }

    /// True when every level has zero exceedance probability, which usually
    /// means no source came within range of the site.
    pub fn is_zero(&self) -> bool {
        self.probabilities.iter().all(|&p| p == 0.0)
    }

    /// Same number of levels with identical first and last level.
    pub fn matches_levels(&self, levels: &[f64]) -> bool {
        self.levels.len() == levels.len()
            && self.levels.first() == levels.first()
            && self.levels.last() == levels.last()
    }

    /// Text form: one `<level> <probability>` line per level. Uses the
    /// shortest round-trip float representation, so output is stable.
    pub fn to_text(&self) -> String {
        let mut out = String::with_capacity(self.levels.len() * 24);
        for (x, y) in self.points() {
            let _ = writeln!(out, "{x} {y}");
        }
        out
    }

    pub fn parse(text: &str) -> std::result::Result<Self, String> {
        let mut levels = Vec::new();
        let mut probabilities = Vec::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let (Some(x), Some(y), None) = (parts.next(), parts.next(), parts.next()) else {
                return Err(format!("line {}: expected '<level> <probability>'", n + 1));
            };
            let x: f64 = x
                .parse()
                .map_err(|_| format!("line {}: bad level '{x}'", n + 1))?;
            let y: f64 = y
                .parse()
                .map_err(|_| format!("line {}: bad probability '{y}'", n + 1))?;
            levels.push(x);
            probabilities.push(y);
        }
        if levels.is_empty() {
            return Err("empty curve".to_string());
        }
        Self::new(levels, probabilities).map_err(|e| e.to_string())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text).map_err(|reason| HazardError::CurveParse {
            path: path.display().to_string(),
            reason,
        })
    }
}
