use super::{load_config, load_grid};
use crate::output::{index_ranges, print_json};
use anyhow::Context;
use hazmap_core::collect::{collect, CompletenessReport};
use std::fmt;
use std::path::Path;

/// Exit status for a collect that found missing sites under `--strict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectExit {
    Incomplete,
}

impl CollectExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            CollectExit::Incomplete => 2,
        }
    }
}

impl fmt::Display for CollectExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectExit::Incomplete => write!(f, "hazard map is incomplete"),
        }
    }
}

impl std::error::Error for CollectExit {}

pub fn run(root: &Path, strict: bool, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let grid = load_grid(root, &config)?;
    let out = config.output_dir(root);
    let report = collect(&out, &grid, config.output.name_decimals)
        .context("failed to collect curve files")?;

    if json {
        print_json(&report)?;
    } else {
        render_human(&report);
    }
    finish(&report, strict)
}

/// Map an incomplete report to `CollectExit` when `strict`.
pub(crate) fn finish(report: &CompletenessReport, strict: bool) -> anyhow::Result<()> {
    if strict && !report.is_complete() {
        return Err(CollectExit::Incomplete.into());
    }
    Ok(())
}

pub(crate) fn render_human(report: &CompletenessReport) {
    println!(
        "Collected {} of {} curve(s).",
        report.collected, report.expected
    );
    if !report.missing.is_empty() {
        println!(
            "Missing sites ({}): {}",
            report.missing.len(),
            index_ranges(&report.missing)
        );
        println!("Run `hazmap repair` to plan a re-run of the missing sites.");
    }
    if !report.corrupt.is_empty() {
        println!("Unreadable curve files at sites: {}", index_ranges(&report.corrupt));
    }
    for path in &report.unexpected {
        println!("[warning] unexpected curve file {}", path.display());
    }
}
