//! Ground-motion models and the registry that resolves them by key.
//!
//! A model answers one question: given a rupture and a site, what is the
//! probability that the intensity measure exceeds a level? Models are built
//! from a `ModelSpec` artifact through `ModelRegistry`, once per worker, so
//! no instance is ever shared between threads.

pub mod bjf97;
pub mod fixed;
pub mod gaussian;

use crate::error::{HazardError, Result};
use crate::forecast::Rupture;
use crate::imt::{IntensityMeasure, LevelAxis};
use crate::site::Site;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;

pub use bjf97::Bjf97;
pub use fixed::Fixed;

// ---------------------------------------------------------------------------
// GroundMotionModel
// ---------------------------------------------------------------------------

pub trait GroundMotionModel: Send {
    /// Registry key this model was built from.
    fn name(&self) -> &str;

    fn imt(&self) -> IntensityMeasure;

    fn supports_axis(&self, axis: LevelAxis) -> bool {
        self.imt().supports_axis(axis)
    }

    /// Conditional probability that the intensity exceeds `level` (expressed
    /// on `axis`) given that `rupture` occurs.
    fn exceedance_probability(
        &self,
        rupture: &Rupture,
        site: &Site,
        level: f64,
        axis: LevelAxis,
    ) -> Result<f64>;

    /// Evaluate every level at once. Models with per-rupture setup cost
    /// override this to do the setup once.
    fn exceedance_curve(
        &self,
        rupture: &Rupture,
        site: &Site,
        levels: &[f64],
        axis: LevelAxis,
        out: &mut [f64],
    ) -> Result<()> {
        for (slot, &level) in out.iter_mut().zip(levels) {
            *slot = self.exceedance_probability(rupture, site, level, axis)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StagedModel / Staged
// ---------------------------------------------------------------------------

/// A model that keeps a "current rupture / current site" context which must
/// be set before each query.
pub trait StagedModel: Send {
    fn name(&self) -> &str;
    fn imt(&self) -> IntensityMeasure;
    fn set_site(&mut self, site: &Site);
    fn set_rupture(&mut self, rupture: &Rupture);
    fn exceed_probability(&self, level: f64, axis: LevelAxis) -> Result<f64>;
}

/// Adapts a `StagedModel` to the pure interface. The context is re-set on
/// every call, so no state leaks between queries. `Staged` is `Send` but not
/// `Sync`: one worker owns it.
pub struct Staged<M> {
    name: String,
    inner: RefCell<M>,
}

impl<M: StagedModel> Staged<M> {
    pub fn new(model: M) -> Self {
        Self {
            name: model.name().to_string(),
            inner: RefCell::new(model),
        }
    }

    pub fn into_inner(self) -> M {
        self.inner.into_inner()
    }
}

impl<M: StagedModel> GroundMotionModel for Staged<M> {
    fn name(&self) -> &str {
        &self.name
    }

    fn imt(&self) -> IntensityMeasure {
        self.inner.borrow().imt()
    }

    fn exceedance_probability(
        &self,
        rupture: &Rupture,
        site: &Site,
        level: f64,
        axis: LevelAxis,
    ) -> Result<f64> {
        let mut model = self.inner.borrow_mut();
        model.set_site(site);
        model.set_rupture(rupture);
        model.exceed_probability(level, axis)
    }
}

// ---------------------------------------------------------------------------
// ModelSpec
// ---------------------------------------------------------------------------

/// Serialized model artifact: a registry key, the intensity measure and
/// free-form parameters interpreted by the model's factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub model: String,
    #[serde(default = "default_imt")]
    pub imt: IntensityMeasure,
    #[serde(default)]
    pub params: BTreeMap<String, serde_yaml::Value>,
}

fn default_imt() -> IntensityMeasure {
    IntensityMeasure::Pga
}

impl ModelSpec {
    pub fn new(model: impl Into<String>, imt: IntensityMeasure) -> Self {
        Self {
            model: model.into(),
            imt,
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<serde_yaml::Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&data)?)
    }
}

/// Deserialize `params[key]`, or fall back to `default` when absent.
pub fn param_or<T: DeserializeOwned>(spec: &ModelSpec, key: &str, default: T) -> Result<T> {
    match spec.params.get(key) {
        None => Ok(default),
        Some(v) => serde_yaml::from_value(v.clone()).map_err(|e| {
            HazardError::Config(format!("model '{}' param '{key}': {e}", spec.model))
        }),
    }
}

// ---------------------------------------------------------------------------
// ModelRegistry
// ---------------------------------------------------------------------------

pub type ModelFactory = fn(&ModelSpec) -> Result<Box<dyn GroundMotionModel>>;

/// Maps stable string keys to model factories.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    factories: BTreeMap<String, ModelFactory>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

impl ModelRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in model.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.factories
            .insert(Bjf97::KEY.to_string(), Bjf97::from_spec as ModelFactory);
        reg.factories
            .insert(Fixed::KEY.to_string(), Fixed::from_spec as ModelFactory);
        reg
    }

    /// Register `factory` under `key`. Keys are unique.
    pub fn register(&mut self, key: &str, factory: ModelFactory) -> Result<()> {
        if self.factories.contains_key(key) {
            return Err(HazardError::Config(format!(
                "model key '{key}' is already registered"
            )));
        }
        self.factories.insert(key.to_string(), factory);
        Ok(())
    }

    pub fn keys(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Build a fresh model instance from `spec`.
    pub fn build(&self, spec: &ModelSpec) -> Result<Box<dyn GroundMotionModel>> {
        let factory = self
            .factories
            .get(&spec.model)
            .ok_or_else(|| HazardError::UnknownModel(spec.model.clone()))?;
        factory(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::Mechanism;
    use crate::geo::Location;
    use crate::site::SiteParams;

    fn site(lat: f64) -> Site {
        Site {
            index: 0,
            location: Location::new(lat, -118.0),
            params: SiteParams::default(),
        }
    }

    fn rupture(mag: f64) -> Rupture {
        Rupture {
            magnitude: mag,
            probability: 0.01,
            mechanism: Mechanism::Unknown,
            surface: vec![Location::new(34.0, -118.0)],
        }
    }

    #[test]
    fn registry_resolves_builtins() {
        let reg = ModelRegistry::with_builtins();
        assert_eq!(reg.keys(), vec!["bjf97", "fixed"]);
        let m = reg
            .build(&ModelSpec::new("fixed", IntensityMeasure::Pga).with_param("probability", 0.25))
            .unwrap();
        let p = m
            .exceedance_probability(&rupture(6.0), &site(34.0), 0.1, LevelAxis::Log)
            .unwrap();
        assert_eq!(p, 0.25);
    }

    #[test]
    fn unknown_key_is_an_error() {
        let reg = ModelRegistry::with_builtins();
        let err = reg
            .build(&ModelSpec::new("nope", IntensityMeasure::Pga))
            .err()
            .unwrap();
        assert!(matches!(err, HazardError::UnknownModel(k) if k == "nope"));
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut reg = ModelRegistry::with_builtins();
        assert!(reg.register("fixed", Fixed::from_spec).is_err());
    }

    #[test]
    fn bad_param_type_is_config_error() {
        let reg = ModelRegistry::with_builtins();
        let spec = ModelSpec::new("fixed", IntensityMeasure::Pga).with_param("probability", "high");
        assert!(matches!(reg.build(&spec).err(), Some(HazardError::Config(_))));
    }

    #[test]
    fn model_spec_yaml() {
        let yaml = "model: bjf97\nimt:\n  type: sa\n  period: 1.0\nparams:\n  component: random_horizontal\n";
        let spec: ModelSpec = serde_yaml::from_str(yaml).unwrap();
        let reg = ModelRegistry::with_builtins();
        let m = reg.build(&spec).unwrap();
        assert_eq!(m.imt(), IntensityMeasure::Sa { period: 1.0 });
    }

    /// Returns 1.0 only when the context was set for the rupture's own
    /// magnitude, proving the adapter re-sets state per call.
    struct Echo {
        site_lat: Option<f64>,
        mag: Option<f64>,
    }

    impl StagedModel for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn imt(&self) -> IntensityMeasure {
            IntensityMeasure::Mmi
        }
        fn set_site(&mut self, site: &Site) {
            self.site_lat = Some(site.location.lat);
        }
        fn set_rupture(&mut self, rupture: &Rupture) {
            self.mag = Some(rupture.magnitude);
        }
        fn exceed_probability(&self, level: f64, _axis: LevelAxis) -> Result<f64> {
            match (self.site_lat, self.mag) {
                (Some(_), Some(m)) if m > level => Ok(1.0),
                (Some(_), Some(_)) => Ok(0.0),
                _ => Err(HazardError::InvalidInput("context not set".into())),
            }
        }
    }

    #[test]
    fn staged_adapter_sets_context_each_call() {
        let staged = Staged::new(Echo {
            site_lat: None,
            mag: None,
        });
        let s = site(34.0);
        let hi = staged
            .exceedance_probability(&rupture(7.0), &s, 6.5, LevelAxis::Linear)
            .unwrap();
        let lo = staged
            .exceedance_probability(&rupture(6.0), &s, 6.5, LevelAxis::Linear)
            .unwrap();
        assert_eq!((hi, lo), (1.0, 0.0));
        assert!(!staged.supports_axis(LevelAxis::Log));
        assert_eq!(staged.into_inner().mag, Some(6.0));
    }
}
