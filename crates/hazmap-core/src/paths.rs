use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// File and directory constants
// ---------------------------------------------------------------------------

pub const CONFIG_FILE: &str = "hazmap.yaml";

/// Sub-directories of the output directory.
pub const CURVES_DIR: &str = "curves";
pub const INPUTS_DIR: &str = "inputs";
pub const JOBS_DIR: &str = "jobs";

pub const COMPLETENESS_FILE: &str = "completeness.json";
pub const GRAPH_DAG_FILE: &str = "graph.dag";
pub const GRAPH_JSON_FILE: &str = "graph.json";

pub const CURVE_EXT: &str = "txt";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn curves_dir(out: &Path) -> PathBuf {
    out.join(CURVES_DIR)
}

pub fn inputs_dir(out: &Path) -> PathBuf {
    out.join(INPUTS_DIR)
}

pub fn jobs_dir(out: &Path) -> PathBuf {
    out.join(JOBS_DIR)
}

pub fn completeness_path(out: &Path) -> PathBuf {
    out.join(COMPLETENESS_FILE)
}

pub fn graph_dag_path(out: &Path) -> PathBuf {
    jobs_dir(out).join(GRAPH_DAG_FILE)
}

pub fn graph_json_path(out: &Path) -> PathBuf {
    jobs_dir(out).join(GRAPH_JSON_FILE)
}

// ---------------------------------------------------------------------------
// Curve file naming
// ---------------------------------------------------------------------------

/// Format a coordinate with a fixed number of decimals. Values that round
/// to zero are written without a sign so `-0.0000` never appears.
pub fn format_coord(value: f64, decimals: usize) -> String {
    let s = format!("{value:.decimals$}");
    match s.strip_prefix('-') {
        Some(rest) if rest.chars().all(|c| c == '0' || c == '.') => rest.to_string(),
        _ => s,
    }
}

/// `<lat>_<lon>.txt`, both rounded to `decimals` places.
pub fn curve_file_name(lat: f64, lon: f64, decimals: usize) -> String {
    format!(
        "{}_{}.{CURVE_EXT}",
        format_coord(lat, decimals),
        format_coord(lon, decimals)
    )
}

/// `<out>/curves/<lat>/<lat>_<lon>.txt`.
pub fn curve_path(out: &Path, lat: f64, lon: f64, decimals: usize) -> PathBuf {
    curves_dir(out)
        .join(format_coord(lat, decimals))
        .join(curve_file_name(lat, lon, decimals))
}

static CURVE_NAME_RE: OnceLock<Regex> = OnceLock::new();

fn curve_name_re() -> &'static Regex {
    CURVE_NAME_RE.get_or_init(|| Regex::new(r"^-?\d+(\.\d+)?_-?\d+(\.\d+)?\.txt$").unwrap())
}

/// True when `name` looks like a per-site curve file.
pub fn is_curve_file_name(name: &str) -> bool {
    curve_name_re().is_match(name)
}
