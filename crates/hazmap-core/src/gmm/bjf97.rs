//! Boore, Joyner & Fumal (1997) attenuation relation for shallow crustal
//! earthquakes in western North America.

use super::gaussian::{lognormal_exceedance, Truncation};
use super::{param_or, GroundMotionModel, ModelSpec};
use crate::error::{HazardError, Result};
use crate::forecast::{Mechanism, Rupture};
use crate::imt::{IntensityMeasure, LevelAxis};
use crate::site::Site;
use serde::Deserialize;

/// ln-space mean returned beyond the model's distance limit.
const VERY_SMALL_MEAN: f64 = -35.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Coefficients {
    period: f64,
    b1ss: f64,
    b1rv: f64,
    b1all: f64,
    b2: f64,
    b3: f64,
    b5: f64,
    bv: f64,
    va: f64,
    h: f64,
    sigma1: f64,
    sigma_e: f64,
    sigma_ln_y: f64,
}

// period b1ss b1rv b1all b2 b3 b5 bv va h sigma1 sigmaE sigmaLnY; PGA is period 0
#[rustfmt::skip]
const TABLE: &[Coefficients] = &[
    c(0.00, -0.313, -0.117, -0.242, 0.527,  0.000, -0.778, -0.371, 1396.0, 5.57, 0.431, 0.184, 0.520),
    c(0.10,  1.006,  1.087,  1.059, 0.753, -0.226, -0.934, -0.212, 1112.0, 6.27, 0.440, 0.000, 0.479),
    c(0.20,  0.999,  1.170,  1.089, 0.711, -0.207, -0.924, -0.292, 2118.0, 7.02, 0.435, 0.009, 0.502),
    c(0.30,  0.598,  0.803,  0.700, 0.769, -0.161, -0.893, -0.401, 2133.0, 5.94, 0.440, 0.048, 0.522),
    c(0.50, -0.122,  0.087, -0.025, 0.884, -0.090, -0.846, -0.553, 1782.0, 4.13, 0.454, 0.115, 0.556),
    c(1.00, -1.133, -1.009, -1.080, 1.036, -0.032, -0.798, -0.698, 1406.0, 2.90, 0.474, 0.214, 0.613),
    c(2.00, -1.699, -1.801, -1.743, 1.085, -0.085, -0.812, -0.655, 1795.0, 5.85, 0.495, 0.276, 0.672),
];

#[allow(clippy::too_many_arguments)]
const fn c(
    period: f64,
    b1ss: f64,
    b1rv: f64,
    b1all: f64,
    b2: f64,
    b3: f64,
    b5: f64,
    bv: f64,
    va: f64,
    h: f64,
    sigma1: f64,
    sigma_e: f64,
    sigma_ln_y: f64,
) -> Coefficients {
    Coefficients {
        period,
        b1ss,
        b1rv,
        b1all,
        b2,
        b3,
        b5,
        bv,
        va,
        h,
        sigma1,
        sigma_e,
        sigma_ln_y,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    #[default]
    AverageHorizontal,
    RandomHorizontal,
}

#[derive(Debug, Clone)]
pub struct Bjf97 {
    imt: IntensityMeasure,
    coeff: Coefficients,
    component: Component,
    truncation: Truncation,
    max_distance_km: f64,
}

impl Bjf97 {
    pub const KEY: &'static str = "bjf97";

    pub fn new(imt: IntensityMeasure) -> Result<Self> {
        let period = match imt {
            IntensityMeasure::Pga => 0.0,
            IntensityMeasure::Sa { period } => period,
            other => {
                return Err(HazardError::Config(format!(
                    "{} does not support {other}",
                    Self::KEY
                )))
            }
        };
        let coeff = TABLE
            .iter()
            .find(|c| (c.period - period).abs() < 1e-6)
            .copied()
            .ok_or_else(|| {
                HazardError::Config(format!("{} has no coefficients for {imt}", Self::KEY))
            })?;
        Ok(Self {
            imt,
            coeff,
            component: Component::default(),
            truncation: Truncation::default(),
            max_distance_km: f64::MAX,
        })
    }

    pub fn from_spec(spec: &ModelSpec) -> Result<Box<dyn GroundMotionModel>> {
        let mut model = Self::new(spec.imt)?;
        model.component = param_or(spec, "component", Component::default())?;
        model.truncation = param_or(spec, "truncation", Truncation::default())?;
        model.truncation.check()?;
        model.max_distance_km = param_or(spec, "max_distance_km", f64::MAX)?;
        Ok(Box::new(model))
    }

    /// ln-space median ground motion.
    pub fn mean(&self, rupture: &Rupture, site: &Site) -> f64 {
        let rjb = rupture.jb_distance(&site.location);
        if rjb > self.max_distance_km {
            return VERY_SMALL_MEAN;
        }
        let c = &self.coeff;
        let b1 = match rupture.mechanism {
            Mechanism::StrikeSlip => c.b1ss,
            Mechanism::Reverse => c.b1rv,
            Mechanism::Unknown => c.b1all,
        };
        let dm = rupture.magnitude - 6.0;
        b1 + c.b2 * dm
            + c.b3 * dm * dm
            + c.b5 * (rjb * rjb + c.h * c.h).sqrt().ln()
            + c.bv * (site.params.vs30 / c.va).ln()
    }

    pub fn std_dev(&self) -> f64 {
        let c = &self.coeff;
        match self.component {
            Component::AverageHorizontal => (c.sigma_e * c.sigma_e + c.sigma1 * c.sigma1).sqrt(),
            Component::RandomHorizontal => c.sigma_ln_y,
        }
    }
}

impl GroundMotionModel for Bjf97 {
    fn name(&self) -> &str {
        Self::KEY
    }

    fn imt(&self) -> IntensityMeasure {
        self.imt
    }

    fn exceedance_probability(
        &self,
        rupture: &Rupture,
        site: &Site,
        level: f64,
        axis: LevelAxis,
    ) -> Result<f64> {
        let mut out = [0.0];
        self.exceedance_curve(rupture, site, &[level], axis, &mut out)?;
        Ok(out[0])
    }

    fn exceedance_curve(
        &self,
        rupture: &Rupture,
        site: &Site,
        levels: &[f64],
        axis: LevelAxis,
        out: &mut [f64],
    ) -> Result<()> {
        let mean = self.mean(rupture, site);
        let sd = self.std_dev();
        for (slot, &level) in out.iter_mut().zip(levels) {
            let ln_level = match axis {
                LevelAxis::Log => level,
                LevelAxis::Linear if level > 0.0 => level.ln(),
                LevelAxis::Linear => f64::NEG_INFINITY,
            };
            *slot = lognormal_exceedance(mean, sd, ln_level, self.truncation);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Location;
    use crate::site::SiteParams;

    fn site() -> Site {
        Site {
            index: 0,
            location: Location::new(34.0, -118.0),
            params: SiteParams::default(),
        }
    }

    fn rupture(mag: f64, lat: f64) -> Rupture {
        Rupture {
            magnitude: mag,
            probability: 0.01,
            mechanism: Mechanism::Unknown,
            surface: vec![Location::with_depth(lat, -118.0, 5.0)],
        }
    }

    #[test]
    fn pga_median_matches_hand_calculation() {
        let m = Bjf97::new(IntensityMeasure::Pga).unwrap();
        // rjb = 0, M = 6, vs30 = 760
        let mean = m.mean(&rupture(6.0, 34.0), &site());
        let expected = -0.242 + -0.778 * 5.57f64.ln() + -0.371 * (760.0f64 / 1396.0).ln();
        assert!((mean - expected).abs() < 1e-9);
    }

    #[test]
    fn larger_magnitude_raises_exceedance() {
        let m = Bjf97::new(IntensityMeasure::Pga).unwrap();
        let s = site();
        let level = 0.2f64.ln();
        let small = m
            .exceedance_probability(&rupture(5.5, 34.1), &s, level, LevelAxis::Log)
            .unwrap();
        let large = m
            .exceedance_probability(&rupture(7.0, 34.1), &s, level, LevelAxis::Log)
            .unwrap();
        assert!(large > small);
    }

    #[test]
    fn linear_and_log_axes_agree() {
        let m = Bjf97::new(IntensityMeasure::Pga).unwrap();
        let r = rupture(6.5, 34.2);
        let s = site();
        let a = m.exceedance_probability(&r, &s, 0.1, LevelAxis::Linear).unwrap();
        let b = m
            .exceedance_probability(&r, &s, 0.1f64.ln(), LevelAxis::Log)
            .unwrap();
        assert!((a - b).abs() < 1e-12);
    }

    #[test]
    fn zero_two_sided_truncation_is_a_config_error() {
        let level = serde_yaml::to_value(Truncation::TwoSided { level: 0.0 }).unwrap();
        let spec = ModelSpec::new(Bjf97::KEY, IntensityMeasure::Pga).with_param("truncation", level);
        let err = Bjf97::from_spec(&spec).err().unwrap();
        assert!(matches!(err, HazardError::Config(_)));

        let level = serde_yaml::to_value(Truncation::TwoSided { level: 3.0 }).unwrap();
        let spec = ModelSpec::new(Bjf97::KEY, IntensityMeasure::Pga).with_param("truncation", level);
        assert!(Bjf97::from_spec(&spec).is_ok());
    }

    #[test]
    fn unsupported_period_is_a_config_error() {
        assert!(Bjf97::new(IntensityMeasure::Sa { period: 0.77 }).is_err());
        assert!(Bjf97::new(IntensityMeasure::Mmi).is_err());
    }
}
