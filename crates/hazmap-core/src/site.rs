//! Sites and the ordered site grid that work units index into.
//!
//! The ordering is fixed by the grid definition: a gridded region is read
//! row by row starting with the southernmost latitude, west to east along
//! each row. Work units are half-open index ranges over this ordering, so it
//! must never change between planning and execution.

use crate::error::{HazardError, Result};
use crate::geo::Location;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// SiteParams / Site
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SiteParams {
    /// Average shear-wave velocity in the top 30 m (m/s).
    #[serde(default = "default_vs30")]
    pub vs30: f64,
    /// Depth to the 2.5 km/s shear-wave horizon (km), when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_2pt5: Option<f64>,
}

fn default_vs30() -> f64 {
    760.0
}

impl Default for SiteParams {
    fn default() -> Self {
        Self {
            vs30: default_vs30(),
            depth_2pt5: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    /// Position in the grid ordering.
    pub index: usize,
    pub location: Location,
    pub params: SiteParams,
}

// ---------------------------------------------------------------------------
// SiteGrid
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListedSite {
    pub lat: f64,
    pub lon: f64,
    #[serde(flatten)]
    pub params: SiteParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SiteGrid {
    /// Rectangular region sampled every `spacing` degrees.
    Gridded {
        min_lat: f64,
        max_lat: f64,
        min_lon: f64,
        max_lon: f64,
        spacing: f64,
        #[serde(default)]
        defaults: SiteParams,
    },
    /// Explicit ordered site list.
    List { sites: Vec<ListedSite> },
}

/// Tolerance for counting grid nodes so that `(max - min) / spacing` landing
/// a hair below an integer still includes the last row.
const NODE_EPS: f64 = 1e-9;

impl SiteGrid {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let grid: SiteGrid = serde_yaml::from_str(&data)?;
        grid.check()?;
        Ok(grid)
    }

    pub fn check(&self) -> Result<()> {
        match self {
            SiteGrid::Gridded {
                min_lat,
                max_lat,
                min_lon,
                max_lon,
                spacing,
                ..
            } => {
                if spacing.is_nan() || *spacing <= 0.0 {
                    return Err(HazardError::InvalidInput(format!(
                        "grid spacing must be positive, got {spacing}"
                    )));
                }
                if min_lat > max_lat || min_lon > max_lon {
                    return Err(HazardError::InvalidInput(
                        "grid bounds are inverted".to_string(),
                    ));
                }
                Ok(())
            }
            SiteGrid::List { .. } => Ok(()),
        }
    }

    fn dims(&self) -> (usize, usize) {
        match self {
            SiteGrid::Gridded {
                min_lat,
                max_lat,
                min_lon,
                max_lon,
                spacing,
                ..
            } => {
                let rows = ((max_lat - min_lat) / spacing + NODE_EPS).floor() as usize + 1;
                let cols = ((max_lon - min_lon) / spacing + NODE_EPS).floor() as usize + 1;
                (rows, cols)
            }
            SiteGrid::List { sites } => (sites.len(), 1),
        }
    }

    /// Number of sites (grid nodes).
    pub fn len(&self) -> usize {
        let (rows, cols) = self.dims();
        rows * cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `index`-th site in grid order, or `None` past the end.
    pub fn site(&self, index: usize) -> Option<Site> {
        if index >= self.len() {
            return None;
        }
        match self {
            SiteGrid::Gridded {
                min_lat,
                min_lon,
                spacing,
                defaults,
                ..
            } => {
                let (_, cols) = self.dims();
                let row = index / cols;
                let col = index % cols;
                Some(Site {
                    index,
                    location: Location::new(
                        min_lat + row as f64 * spacing,
                        min_lon + col as f64 * spacing,
                    ),
                    params: *defaults,
                })
            }
            SiteGrid::List { sites } => sites.get(index).map(|s| Site {
                index,
                location: Location::new(s.lat, s.lon),
                params: s.params,
            }),
        }
    }

    /// Iterate sites in `[start, end)`, clipped to the grid size.
    pub fn range(&self, start: usize, end: usize) -> impl Iterator<Item = Site> + '_ {
        let end = end.min(self.len());
        (start..end).filter_map(move |i| self.site(i))
    }
}
