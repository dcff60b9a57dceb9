//! Splitting the ordered site collection into work units.

use crate::error::{HazardError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// The input artifacts every work unit of a run reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitArtifacts {
    pub forecast: PathBuf,
    pub model: PathBuf,
    pub region: PathBuf,
    pub levels: PathBuf,
}

/// Half-open site-index range `[start, end)` plus the artifacts needed to
/// compute it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkUnit {
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub artifacts: UnitArtifacts,
}

impl WorkUnit {
    pub fn new(start: usize, end: usize, artifacts: UnitArtifacts) -> Self {
        Self {
            start,
            end,
            artifacts,
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.start..self.end).contains(&index)
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Split `[0, num_sites)` into contiguous units of `hint` sites; the last
/// unit takes the remainder. Zero sites yields no units.
pub fn partition(num_sites: usize, hint: usize, artifacts: &UnitArtifacts) -> Result<Vec<WorkUnit>> {
    if hint == 0 {
        return Err(HazardError::Config("sites_per_unit must be at least 1".into()));
    }
    Ok((0..num_sites)
        .step_by(hint)
        .map(|start| WorkUnit::new(start, (start + hint).min(num_sites), artifacts.clone()))
        .collect())
}

/// Check that `units` are non-empty, sorted, pairwise disjoint and inside
/// `[0, num_sites)`. With `full` set they must also leave no gap.
pub fn check_units(units: &[WorkUnit], num_sites: usize, full: bool) -> Result<()> {
    if units.is_empty() {
        return Err(HazardError::Graph("no work units".into()));
    }
    let mut next = 0;
    for unit in units {
        if unit.is_empty() {
            return Err(HazardError::Graph(format!("work unit {unit} is empty")));
        }
        if unit.start < next {
            return Err(HazardError::Graph(format!(
                "work unit {unit} overlaps or is out of order"
            )));
        }
        if full && unit.start != next {
            return Err(HazardError::Graph(format!(
                "sites [{next}, {}) are not covered by any work unit",
                unit.start
            )));
        }
        next = unit.end;
    }
    if next > num_sites || (full && next != num_sites) {
        return Err(HazardError::Graph(format!(
            "work units cover [0, {next}) but the grid has {num_sites} sites"
        )));
    }
    Ok(())
}
