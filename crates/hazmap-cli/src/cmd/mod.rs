pub mod collect;
pub mod config;
pub mod execute;
pub mod models;
pub mod plan;
pub mod prepare;
pub mod repair;
pub mod run;
pub mod unit;

use anyhow::Context;
use hazmap_core::config::Config;
use hazmap_core::graph::{JobGraph, JobGraphBuilder, StageTemplates};
use hazmap_core::partition::WorkUnit;
use hazmap_core::site::SiteGrid;
use std::path::Path;

pub(crate) fn load_config(root: &Path) -> anyhow::Result<Config> {
    Config::load(root).context("failed to load hazmap.yaml")
}

pub(crate) fn load_grid(root: &Path, config: &Config) -> anyhow::Result<SiteGrid> {
    let path = root.join(&config.inputs.region);
    SiteGrid::load(&path).with_context(|| format!("failed to load region {}", path.display()))
}

/// Build the job graph for `units` from the run configuration. Partial
/// graphs are allowed for repair runs.
pub(crate) fn build_graph(
    root: &Path,
    config: &Config,
    grid: &SiteGrid,
    units: &[WorkUnit],
    partial: bool,
) -> anyhow::Result<JobGraph> {
    let templates = StageTemplates::standard(&config.execution.executable)
        .with_retries(config.execution.retries)
        .with_post_hooks(config.execution.post_hooks.clone());
    let graph = JobGraphBuilder::new(
        &config.name,
        templates,
        grid,
        config.output_dir(root),
        config.output.name_decimals,
    )
    .var("root", root.display())
    .var("max_distance", config.calculation.max_distance_km)
    .var("axis", config.calculation.level_axis)
    .partial(partial)
    .build(units)
    .context("failed to build job graph")?;
    Ok(graph)
}
