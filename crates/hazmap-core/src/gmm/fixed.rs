//! Constant conditional exceedance probability, independent of rupture,
//! site and level. Useful for calibrating a pipeline end to end.

use super::{param_or, GroundMotionModel, ModelSpec};
use crate::error::{HazardError, Result};
use crate::forecast::Rupture;
use crate::imt::{IntensityMeasure, LevelAxis};
use crate::site::Site;

#[derive(Debug, Clone)]
pub struct Fixed {
    imt: IntensityMeasure,
    probability: f64,
}

impl Fixed {
    pub const KEY: &'static str = "fixed";

    pub fn new(imt: IntensityMeasure, probability: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(HazardError::Config(format!(
                "fixed model probability {probability} outside [0,1]"
            )));
        }
        Ok(Self { imt, probability })
    }

    pub fn from_spec(spec: &ModelSpec) -> Result<Box<dyn GroundMotionModel>> {
        let p = param_or(spec, "probability", 0.5)?;
        Ok(Box::new(Self::new(spec.imt, p)?))
    }
}

impl GroundMotionModel for Fixed {
    fn name(&self) -> &str {
        Self::KEY
    }

    fn imt(&self) -> IntensityMeasure {
        self.imt
    }

    fn exceedance_probability(
        &self,
        _rupture: &Rupture,
        _site: &Site,
        _level: f64,
        _axis: LevelAxis,
    ) -> Result<f64> {
        Ok(self.probability)
    }
}
