//! Fixture inputs shared by the unit tests.

use crate::forecast::{Mechanism, Rupture, RuptureForecast, Source};
use crate::geo::Location;
use crate::gmm::ModelSpec;
use crate::imt::IntensityMeasure;
use crate::partition::UnitArtifacts;
use crate::site::{SiteGrid, SiteParams};
use std::path::Path;

pub const LEVELS: &[f64] = &[0.01, 0.05, 0.1, 0.2, 0.5];

/// A `rows x cols` grid at 0.1 degree spacing anchored at 34N 118W.
pub fn grid(rows: usize, cols: usize) -> SiteGrid {
    SiteGrid::Gridded {
        min_lat: 34.0,
        max_lat: 34.0 + (rows - 1) as f64 * 0.1,
        min_lon: -118.0,
        max_lon: -118.0 + (cols - 1) as f64 * 0.1,
        spacing: 0.1,
        defaults: SiteParams::default(),
    }
}

pub fn forecast() -> RuptureForecast {
    let rupture = |lat: f64, mag: f64, p: f64| Rupture {
        magnitude: mag,
        probability: p,
        mechanism: Mechanism::StrikeSlip,
        surface: vec![
            Location::with_depth(lat, -117.8, 2.0),
            Location::with_depth(lat + 0.2, -117.7, 2.0),
        ],
    };
    RuptureForecast {
        name: "fixture".into(),
        duration_years: 50.0,
        sources: vec![
            Source {
                name: "near".into(),
                poissonian: true,
                ruptures: vec![rupture(34.2, 6.5, 0.02), rupture(34.3, 7.1, 0.005)],
            },
            Source {
                name: "cluster".into(),
                poissonian: false,
                ruptures: vec![rupture(35.0, 6.0, 0.1), rupture(35.1, 6.2, 0.05)],
            },
        ],
    }
}

pub fn model() -> ModelSpec {
    ModelSpec::new("bjf97", IntensityMeasure::Pga)
}

/// Write forecast, model, region and levels artifacts into `dir`.
pub fn write_inputs(dir: &Path, grid: &SiteGrid) -> UnitArtifacts {
    let artifacts = UnitArtifacts {
        forecast: dir.join("forecast.yaml"),
        model: dir.join("model.yaml"),
        region: dir.join("region.yaml"),
        levels: dir.join("levels.txt"),
    };
    std::fs::write(&artifacts.forecast, serde_yaml::to_string(&forecast()).unwrap()).unwrap();
    std::fs::write(&artifacts.model, serde_yaml::to_string(&model()).unwrap()).unwrap();
    std::fs::write(&artifacts.region, serde_yaml::to_string(grid).unwrap()).unwrap();
    let levels: String = LEVELS.iter().map(|l| format!("{l}\n")).collect();
    std::fs::write(&artifacts.levels, levels).unwrap();
    artifacts
}
