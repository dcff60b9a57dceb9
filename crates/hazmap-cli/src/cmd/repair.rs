use super::{build_graph, load_config, load_grid};
use crate::output::{index_ranges, print_json};
use anyhow::Context;
use hazmap_core::collect::{repair_units, CompletenessReport};
use hazmap_core::paths;
use hazmap_core::prepare::staged_artifacts;
use std::path::Path;

pub fn run(root: &Path, dry_run: bool, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let grid = load_grid(root, &config)?;
    let out = config.output_dir(root);
    let completeness = CompletenessReport::load(&out)
        .context("no completeness report found; run `hazmap collect` first")?;

    if completeness.is_complete() {
        if json {
            return print_json(&serde_json::json!({ "units": 0, "missing": [] }));
        }
        println!("Nothing to repair: all {} curve(s) present.", completeness.expected);
        return Ok(());
    }
    if completeness.expected != grid.len() {
        anyhow::bail!(
            "completeness report covers {} site(s) but the region has {}; run `hazmap collect` again",
            completeness.expected,
            grid.len()
        );
    }

    let staged = staged_artifacts(&config.artifacts(root), &out)?;
    let units = repair_units(
        &completeness.missing,
        config.partition.sites_per_unit,
        &staged,
    );
    let graph = build_graph(root, &config, &grid, &units, true)?;
    if !dry_run {
        graph.write(&out).context("failed to write repair graph")?;
    }

    if json {
        return print_json(&serde_json::json!({
            "units": units.len(),
            "missing": completeness.missing,
            "dry_run": dry_run,
            "graph": graph,
        }));
    }

    println!(
        "Repair plan: {} unit(s) covering sites {}",
        units.len(),
        index_ranges(&completeness.missing)
    );
    if dry_run {
        super::plan::print_stages(&graph);
    } else {
        println!("Wrote {}", paths::graph_dag_path(&out).display());
        println!("Run `hazmap execute` to re-run the missing sites.");
    }
    Ok(())
}
