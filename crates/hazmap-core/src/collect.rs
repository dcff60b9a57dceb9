//! Completeness check over the per-site curve files of a run.
//!
//! The collector never retries anything. It reads the curve tree, writes
//! `completeness.json` and hands the report to whoever decides what to do
//! about the gaps.

use crate::curve::HazardCurve;
use crate::error::{HazardError, Result};
use crate::io::atomic_write;
use crate::partition::{UnitArtifacts, WorkUnit};
use crate::paths;
use crate::site::SiteGrid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletenessReport {
    pub expected: usize,
    pub collected: usize,
    /// Site indices without a readable curve file, ascending.
    pub missing: Vec<usize>,
    /// Subset of `missing` whose file exists but does not parse.
    #[serde(default)]
    pub corrupt: Vec<usize>,
    /// Curve-like files that belong to no site of the grid.
    #[serde(default)]
    pub unexpected: Vec<PathBuf>,
    pub generated_at: DateTime<Utc>,
}

impl CompletenessReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn load(out: &Path) -> Result<Self> {
        let path = paths::completeness_path(out);
        let data = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, out: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        atomic_write(&paths::completeness_path(out), data.as_bytes())
    }
}

/// Curve file path of every site in grid order. Fails if two sites round to
/// the same file name.
pub fn expected_files(out: &Path, grid: &SiteGrid, decimals: usize) -> Result<Vec<PathBuf>> {
    let mut seen: HashMap<PathBuf, usize> = HashMap::with_capacity(grid.len());
    let mut files = Vec::with_capacity(grid.len());
    for site in grid.range(0, grid.len()) {
        let path = paths::curve_path(out, site.location.lat, site.location.lon, decimals);
        if let Some(&first) = seen.get(&path) {
            return Err(HazardError::NameCollision {
                first,
                second: site.index,
                name: paths::curve_file_name(site.location.lat, site.location.lon, decimals),
            });
        }
        seen.insert(path.clone(), site.index);
        files.push(path);
    }
    Ok(files)
}

/// Scan `<out>/curves` against the grid and write `<out>/completeness.json`.
pub fn collect(out: &Path, grid: &SiteGrid, decimals: usize) -> Result<CompletenessReport> {
    let expected = expected_files(out, grid, decimals)?;

    let mut missing = Vec::new();
    let mut corrupt = Vec::new();
    for (index, path) in expected.iter().enumerate() {
        if !path.exists() {
            missing.push(index);
            continue;
        }
        if let Err(e) = HazardCurve::load(path) {
            warn!(site = index, error = %e, "unreadable curve file");
            missing.push(index);
            corrupt.push(index);
        }
    }

    let known: HashSet<&PathBuf> = expected.iter().collect();
    let mut unexpected: Vec<PathBuf> = curve_files(&paths::curves_dir(out))?
        .into_iter()
        .filter(|p| !known.contains(p))
        .collect();
    unexpected.sort();

    let report = CompletenessReport {
        expected: expected.len(),
        collected: expected.len() - missing.len(),
        missing,
        corrupt,
        unexpected,
        generated_at: Utc::now(),
    };
    report.save(out)?;

    if report.is_complete() {
        info!(expected = report.expected, "all curves collected");
    } else {
        warn!(
            expected = report.expected,
            collected = report.collected,
            missing = report.missing.len(),
            "curves missing"
        );
    }
    Ok(report)
}

/// Every file under `dir` (recursively) whose name matches the curve naming
/// pattern. A missing directory has no files.
fn curve_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !dir.exists() {
        return Ok(files);
    }
    let mut stack = vec![dir.to_path_buf()];
    while let Some(d) = stack.pop() {
        for entry in std::fs::read_dir(&d)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                stack.push(path);
            } else if entry
                .file_name()
                .to_str()
                .is_some_and(paths::is_curve_file_name)
            {
                files.push(path);
            }
        }
    }
    Ok(files)
}

/// Coalesce missing site indices into contiguous units of at most `hint`
/// sites, for a targeted re-run.
pub fn repair_units(missing: &[usize], hint: usize, artifacts: &UnitArtifacts) -> Vec<WorkUnit> {
    let hint = hint.max(1);
    let mut sorted = missing.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut units: Vec<WorkUnit> = Vec::new();
    for index in sorted {
        match units.last_mut() {
            Some(u) if u.end == index && u.len() < hint => u.end += 1,
            _ => units.push(WorkUnit::new(index, index + 1, artifacts.clone())),
        }
    }
    units
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::{ListedSite, SiteParams};
    use crate::testutil;
    use tempfile::TempDir;

    fn write_all(out: &Path, grid: &SiteGrid) -> Vec<PathBuf> {
        let files = expected_files(out, grid, 4).unwrap();
        let curve = HazardCurve::new(vec![0.1, 0.2], vec![0.01, 0.001]).unwrap();
        for f in &files {
            atomic_write(f, curve.to_text().as_bytes()).unwrap();
        }
        files
    }

    #[test]
    fn reports_the_two_absent_sites() {
        let dir = TempDir::new().unwrap();
        let grid = testutil::grid(25, 10);
        assert_eq!(grid.len(), 250);
        let files = write_all(dir.path(), &grid);
        std::fs::remove_file(&files[17]).unwrap();
        std::fs::remove_file(&files[203]).unwrap();

        let report = collect(dir.path(), &grid, 4).unwrap();
        assert_eq!(report.expected, 250);
        assert_eq!(report.collected, 248);
        assert_eq!(report.missing, vec![17, 203]);
        assert!(report.corrupt.is_empty());
        assert!(!report.is_complete());

        let saved = CompletenessReport::load(dir.path()).unwrap();
        assert_eq!(saved.missing, vec![17, 203]);
    }

    #[test]
    fn complete_run() {
        let dir = TempDir::new().unwrap();
        let grid = testutil::grid(3, 3);
        write_all(dir.path(), &grid);
        let report = collect(dir.path(), &grid, 4).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.collected, 9);
    }

    #[test]
    fn corrupt_file_counts_as_missing() {
        let dir = TempDir::new().unwrap();
        let grid = testutil::grid(2, 2);
        let files = write_all(dir.path(), &grid);
        std::fs::write(&files[2], "not a curve\n").unwrap();

        let report = collect(dir.path(), &grid, 4).unwrap();
        assert_eq!(report.missing, vec![2]);
        assert_eq!(report.corrupt, vec![2]);
        assert_eq!(report.collected, 3);
    }

    #[test]
    fn out_of_range_probabilities_count_as_corrupt() {
        let dir = TempDir::new().unwrap();
        let grid = testutil::grid(2, 2);
        let files = write_all(dir.path(), &grid);
        std::fs::write(&files[0], "0.1 7.5\n0.2 -3\n").unwrap();
        std::fs::write(&files[3], "0.1 0.01\n0.2 0.5\n").unwrap();

        let report = collect(dir.path(), &grid, 4).unwrap();
        assert_eq!(report.corrupt, vec![0, 3]);
        assert_eq!(report.missing, vec![0, 3]);
        assert_eq!(report.collected, 2);
    }

    #[test]
    fn stray_curve_files_are_unexpected() {
        let dir = TempDir::new().unwrap();
        let grid = testutil::grid(1, 2);
        write_all(dir.path(), &grid);
        let stray = paths::curve_path(dir.path(), 10.0, 10.0, 4);
        atomic_write(&stray, b"0.1 0.5\n").unwrap();
        std::fs::write(paths::curves_dir(dir.path()).join("notes.md"), "x").unwrap();

        let report = collect(dir.path(), &grid, 4).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.unexpected, vec![stray]);
    }

    #[test]
    fn empty_output_dir_is_all_missing() {
        let dir = TempDir::new().unwrap();
        let grid = testutil::grid(1, 3);
        let report = collect(dir.path(), &grid, 4).unwrap();
        assert_eq!(report.missing, vec![0, 1, 2]);
        assert_eq!(report.collected, 0);
    }

    #[test]
    fn colliding_names_are_detected() {
        let site = |lat: f64| ListedSite {
            lat,
            lon: -118.0,
            params: SiteParams::default(),
        };
        let grid = SiteGrid::List {
            sites: vec![site(34.0), site(34.000_01), site(34.1)],
        };
        let err = expected_files(Path::new("/out"), &grid, 4).unwrap_err();
        assert!(matches!(
            err,
            HazardError::NameCollision { first: 0, second: 1, .. }
        ));
        assert!(expected_files(Path::new("/out"), &grid, 6).is_ok());
    }

    #[test]
    fn repair_units_coalesce_and_cap() {
        let a = UnitArtifacts::default();
        let units = repair_units(&[7, 3, 4, 5, 6, 20, 21, 40], 3, &a);
        let ranges: Vec<_> = units.iter().map(|u| (u.start, u.end)).collect();
        assert_eq!(ranges, vec![(3, 6), (6, 8), (20, 22), (40, 41)]);
        assert!(repair_units(&[], 10, &a).is_empty());
    }
}
