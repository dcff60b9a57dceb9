//! Per-site hazard aggregation.
//!
//! Sources are treated as independent Poisson processes. For every retained
//! rupture with occurrence probability `p` and conditional exceedance
//! probability `c` at a level, the survival probability at that level is
//! multiplied by `(1 - p)^c`. The exceedance probability is `1 - survival`
//! if any rupture was used, and zero otherwise.

use crate::curve::HazardCurve;
use crate::error::{HazardError, Result};
use crate::forecast::RuptureForecast;
use crate::gmm::GroundMotionModel;
use crate::imt::{check_levels, LevelAxis};
use crate::site::Site;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Below this `ln(1 - p)` a Poisson rupture implies a practically infinite
/// number of events in the window.
const MIN_LN_SURVIVAL: f64 = -30.0;

// ---------------------------------------------------------------------------
// MagDistCutoff
// ---------------------------------------------------------------------------

/// Piecewise-linear `distance (km) -> minimum magnitude` filter. Ruptures
/// smaller than the interpolated magnitude at their distance are skipped.
/// Distances outside the table clamp to the end points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(f64, f64)>", into = "Vec<(f64, f64)>")]
pub struct MagDistCutoff {
    points: Vec<(f64, f64)>,
}

impl MagDistCutoff {
    pub fn new(points: Vec<(f64, f64)>) -> Result<Self> {
        if points.is_empty() {
            return Err(HazardError::Config(
                "magnitude-distance cutoff needs at least one point".into(),
            ));
        }
        if points.windows(2).any(|w| w[1].0 <= w[0].0) {
            return Err(HazardError::Config(
                "magnitude-distance cutoff distances must increase".into(),
            ));
        }
        Ok(Self { points })
    }

    pub fn min_magnitude(&self, distance: f64) -> f64 {
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];
        if distance <= first.0 {
            return first.1;
        }
        if distance >= last.0 {
            return last.1;
        }
        for w in self.points.windows(2) {
            let (d0, m0) = w[0];
            let (d1, m1) = w[1];
            if distance <= d1 {
                return m0 + (m1 - m0) * (distance - d0) / (d1 - d0);
            }
        }
        last.1
    }
}

impl TryFrom<Vec<(f64, f64)>> for MagDistCutoff {
    type Error = HazardError;

    fn try_from(points: Vec<(f64, f64)>) -> Result<Self> {
        Self::new(points)
    }
}

impl From<MagDistCutoff> for Vec<(f64, f64)> {
    fn from(c: MagDistCutoff) -> Self {
        c.points
    }
}

// ---------------------------------------------------------------------------
// CalcSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct CalcSettings {
    /// Sources and ruptures farther than this (km) are ignored.
    pub max_distance_km: f64,
    /// Axis on which levels are handed to the model.
    pub axis: LevelAxis,
    pub mag_dist_cutoff: Option<MagDistCutoff>,
}

impl CalcSettings {
    pub fn new(max_distance_km: f64, axis: LevelAxis) -> Self {
        Self {
            max_distance_km,
            axis,
            mag_dist_cutoff: None,
        }
    }
}

// ---------------------------------------------------------------------------
// HazardAggregator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HazardAggregator {
    settings: CalcSettings,
}

impl HazardAggregator {
    pub fn new(settings: CalcSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CalcSettings {
        &self.settings
    }

    /// Verify that `model` can be queried on the configured axis. Called once
    /// per worker so that a bad configuration fails before any site is done.
    pub fn check_model(&self, model: &dyn GroundMotionModel) -> Result<()> {
        if !model.supports_axis(self.settings.axis) {
            return Err(HazardError::UnsupportedAxis {
                axis: self.settings.axis.to_string(),
                imt: model.imt().to_string(),
            });
        }
        Ok(())
    }

    /// Compute the hazard curve for `site` at `levels` (linear units,
    /// strictly increasing). The returned curve is in linear units whatever
    /// the configured axis.
    pub fn compute_curve(
        &self,
        site: &Site,
        forecast: &RuptureForecast,
        model: &dyn GroundMotionModel,
        levels: &[f64],
    ) -> Result<HazardCurve> {
        // Every site sees the same verdict on the forecast, culled or not.
        forecast.validate()?;
        check_levels(levels)?;
        self.check_model(model)?;

        let axis = self.settings.axis;
        let max_distance = self.settings.max_distance_km;
        let axis_levels = axis.to_axis(levels)?;
        let n = levels.len();

        let mut survival = vec![1.0; n];
        let mut cond = vec![0.0; n];
        let mut source_sum = vec![0.0; n];
        let mut any_used = false;
        let mut retained = 0usize;
        let mut ruptures_used = 0usize;

        for source in &forecast.sources {
            if source.min_distance(&site.location) > max_distance {
                continue;
            }
            retained += 1;
            let mut source_used = false;
            if !source.poissonian {
                source_sum.fill(0.0);
            }

            for (i, rupture) in source.ruptures.iter().enumerate() {
                let distance = rupture.jb_distance(&site.location);
                if distance > max_distance {
                    continue;
                }
                if let Some(cutoff) = &self.settings.mag_dist_cutoff {
                    if rupture.magnitude < cutoff.min_magnitude(distance) {
                        continue;
                    }
                }
                source_used = true;
                ruptures_used += 1;

                model.exceedance_curve(rupture, site, &axis_levels, axis, &mut cond)?;
                if let Some(bad) = cond.iter().find(|c| !(0.0..=1.0).contains(*c)) {
                    return Err(HazardError::InvalidInput(format!(
                        "model '{}' returned conditional probability {bad} for source '{}' rupture {i}",
                        model.name(),
                        source.name
                    )));
                }

                let p = rupture.probability;
                if source.poissonian {
                    let ln_q = (-p).ln_1p();
                    if ln_q < MIN_LN_SURVIVAL {
                        return Err(HazardError::InvalidInput(format!(
                            "rupture {i} of source '{}' has probability {p}, too high for a Poisson source",
                            source.name
                        )));
                    }
                    for (s, &c) in survival.iter_mut().zip(&cond) {
                        *s *= (c * ln_q).exp();
                    }
                } else {
                    for (acc, &c) in source_sum.iter_mut().zip(&cond) {
                        *acc += p * c;
                    }
                }
            }

            if !source.poissonian && source_used {
                if let Some(total) = source_sum.iter().find(|&&t| t > 1.0) {
                    return Err(HazardError::InvalidInput(format!(
                        "non-Poisson source '{}' has total exceedance probability {total} > 1",
                        source.name
                    )));
                }
                for (s, &t) in survival.iter_mut().zip(&source_sum) {
                    *s *= 1.0 - t;
                }
            }
            any_used |= source_used;
        }

        debug!(
            site = site.index,
            retained, ruptures_used, "aggregated hazard curve"
        );

        let probabilities = if any_used {
            survival.iter().map(|s| 1.0 - s).collect()
        } else {
            vec![0.0; n]
        };
        HazardCurve::new(levels.to_vec(), probabilities)
    }
}
