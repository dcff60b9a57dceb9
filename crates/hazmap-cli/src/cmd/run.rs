use super::{build_graph, collect, execute, load_config, load_grid};
use crate::output::print_json;
use hazmap_core::calc::HazardAggregator;
use hazmap_core::executor::{InProcessDispatch, LocalExecutor};
use hazmap_core::gmm::ModelRegistry;
use hazmap_core::partition::partition;
use hazmap_core::prepare::staged_artifacts;
use hazmap_core::unit_runner::WorkUnitRunner;
use std::path::Path;

/// Plan, compute and collect in one process, using the same job graph a
/// distributed run would submit.
pub fn run(
    root: &Path,
    threads: Option<usize>,
    skip_existing: bool,
    strict: bool,
    json: bool,
) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let grid = load_grid(root, &config)?;
    let out = config.output_dir(root);
    let sources = config.artifacts(root);

    let staged = staged_artifacts(&sources, &out)?;
    let units = partition(grid.len(), config.partition.sites_per_unit, &staged)?;
    let graph = build_graph(root, &config, &grid, &units, false)?;
    graph.write(&out)?;

    let aggregator = HazardAggregator::new(config.calc_settings());
    let runner = WorkUnitRunner::new(aggregator, &out, config.output.name_decimals)
        .skip_existing(skip_existing);
    let registry = ModelRegistry::with_builtins();
    let dispatch = InProcessDispatch::new(sources, runner, &registry, config.output.name_decimals);

    let executor = LocalExecutor::new(threads.unwrap_or(config.execution.threads))?;
    let report = executor.execute(&graph, &dispatch)?;
    let completeness = dispatch.completeness();

    if json {
        print_json(&serde_json::json!({
            "execution": report,
            "completeness": completeness,
        }))?;
    } else {
        execute::render_human(&report);
        if let Some(c) = &completeness {
            println!();
            collect::render_human(c);
        }
    }

    execute::check(&report)?;
    match &completeness {
        Some(c) => collect::finish(c, strict),
        None => anyhow::bail!("finish stage produced no completeness report"),
    }
}
