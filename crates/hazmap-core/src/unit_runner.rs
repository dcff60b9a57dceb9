//! Executes one work unit: a contiguous site range computed with one
//! model instance and written as one curve file per site.
//!
//! A unit is stateless and idempotent. Every curve is computed before any
//! file is written, so a failing site leaves no partial output from this
//! attempt, and re-running overwrites identical bytes.

use crate::calc::HazardAggregator;
use crate::curve::HazardCurve;
use crate::error::{HazardError, Result};
use crate::forecast::RuptureForecast;
use crate::gmm::{ModelRegistry, ModelSpec};
use crate::imt::load_levels;
use crate::io::atomic_write;
use crate::partition::{UnitArtifacts, WorkUnit};
use crate::paths;
use crate::site::SiteGrid;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Deserialized unit inputs. Read-only once loaded, so one copy can be
/// shared by every worker of a process.
#[derive(Debug, Clone)]
pub struct UnitInputs {
    pub forecast: RuptureForecast,
    pub model: ModelSpec,
    pub grid: SiteGrid,
    pub levels: Vec<f64>,
}

impl UnitInputs {
    pub fn load(artifacts: &UnitArtifacts) -> Result<Self> {
        Ok(Self {
            forecast: RuptureForecast::load(&artifacts.forecast)?,
            model: ModelSpec::load(&artifacts.model)?,
            grid: SiteGrid::load(&artifacts.region)?,
            levels: load_levels(&artifacts.levels)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitReport {
    pub start: usize,
    pub end: usize,
    pub written: usize,
    pub skipped: usize,
    /// Curves with zero probability at every level.
    pub zero_curves: usize,
    pub elapsed_ms: u64,
    pub mean_curve_ms: f64,
}

#[derive(Debug, Clone)]
pub struct WorkUnitRunner {
    aggregator: HazardAggregator,
    out_dir: PathBuf,
    name_decimals: usize,
    skip_existing: bool,
}

impl WorkUnitRunner {
    pub fn new(aggregator: HazardAggregator, out_dir: impl Into<PathBuf>, name_decimals: usize) -> Self {
        Self {
            aggregator,
            out_dir: out_dir.into(),
            name_decimals,
            skip_existing: false,
        }
    }

    /// Leave sites whose curve file already holds a curve on the same levels.
    pub fn skip_existing(mut self, skip: bool) -> Self {
        self.skip_existing = skip;
        self
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Load the unit's artifacts and run it.
    pub fn run(&self, unit: &WorkUnit, registry: &ModelRegistry) -> Result<UnitReport> {
        let inputs = UnitInputs::load(&unit.artifacts)?;
        self.run_with(unit, &inputs, registry)
    }

    /// Run `unit` against already-loaded inputs. The model is built fresh
    /// from the registry and dropped when the unit ends.
    pub fn run_with(
        &self,
        unit: &WorkUnit,
        inputs: &UnitInputs,
        registry: &ModelRegistry,
    ) -> Result<UnitReport> {
        let started = Instant::now();
        let site_count = inputs.grid.len();
        if unit.end > site_count {
            return Err(HazardError::InvalidInput(format!(
                "work unit {unit} exceeds the grid's {site_count} sites"
            )));
        }
        info!(unit = %unit, sites = unit.len(), "starting work unit");

        let model = registry.build(&inputs.model)?;
        self.aggregator.check_model(model.as_ref())?;

        let mut pending: Vec<(PathBuf, HazardCurve)> = Vec::with_capacity(unit.len());
        let mut skipped = 0;
        let mut zero_curves = 0;
        let mut compute_time = std::time::Duration::ZERO;

        for index in unit.start..unit.end {
            let site = inputs.grid.site(index).ok_or_else(|| {
                HazardError::InvalidInput(format!("site {index} is not in the grid"))
            })?;
            let path = paths::curve_path(
                &self.out_dir,
                site.location.lat,
                site.location.lon,
                self.name_decimals,
            );
            if self.skip_existing && self.is_complete(&path, &inputs.levels) {
                debug!(site = index, path = %path.display(), "curve exists, skipping");
                skipped += 1;
                continue;
            }

            let t = Instant::now();
            let curve = self
                .aggregator
                .compute_curve(&site, &inputs.forecast, model.as_ref(), &inputs.levels)?;
            compute_time += t.elapsed();

            if curve.is_zero() {
                warn!(
                    site = index,
                    lat = site.location.lat,
                    lon = site.location.lon,
                    "hazard curve is zero at every level"
                );
                zero_curves += 1;
            }
            debug!(site = index, "computed curve");
            pending.push((path, curve));
        }

        for (path, curve) in &pending {
            atomic_write(path, curve.to_text().as_bytes())?;
        }

        let written = pending.len();
        let mean_curve_ms = if written > 0 {
            compute_time.as_secs_f64() * 1000.0 / written as f64
        } else {
            0.0
        };
        let report = UnitReport {
            start: unit.start,
            end: unit.end,
            written,
            skipped,
            zero_curves,
            elapsed_ms: started.elapsed().as_millis() as u64,
            mean_curve_ms,
        };
        info!(
            unit = %unit,
            written,
            skipped,
            zero_curves,
            mean_curve_ms,
            "work unit finished"
        );
        Ok(report)
    }

    fn is_complete(&self, path: &Path, levels: &[f64]) -> bool {
        path.exists() && HazardCurve::load(path).is_ok_and(|c| c.matches_levels(levels))
    }
}
