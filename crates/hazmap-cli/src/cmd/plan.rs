use super::{build_graph, load_config, load_grid};
use crate::output::{print_json, print_table};
use anyhow::Context;
use hazmap_core::graph::{JobGraph, StageKind};
use hazmap_core::partition::partition;
use hazmap_core::paths;
use hazmap_core::prepare::staged_artifacts;
use std::path::Path;

pub fn run(root: &Path, dry_run: bool, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let grid = load_grid(root, &config)?;
    let out = config.output_dir(root);

    let staged = staged_artifacts(&config.artifacts(root), &out)?;
    let units = partition(grid.len(), config.partition.sites_per_unit, &staged)?;
    let graph = build_graph(root, &config, &grid, &units, false)?;

    if !dry_run {
        graph.write(&out).context("failed to write job graph")?;
    }

    if json {
        let value = serde_json::json!({
            "sites": grid.len(),
            "units": units.len(),
            "dry_run": dry_run,
            "dag": paths::graph_dag_path(&out),
            "graph": graph,
        });
        return print_json(&value);
    }

    println!(
        "Planned {} work unit(s) over {} site(s).",
        units.len(),
        grid.len()
    );
    if dry_run {
        print_stages(&graph);
    } else {
        println!("Wrote {}", paths::graph_dag_path(&out).display());
        println!("Wrote {}", paths::graph_json_path(&out).display());
    }
    Ok(())
}

pub(crate) fn print_stages(graph: &JobGraph) {
    let rows = graph
        .stages
        .iter()
        .map(|s| {
            let sites = match s.kind {
                StageKind::Compute { start, end } => (end - start).to_string(),
                _ => String::new(),
            };
            vec![s.name.clone(), s.kind.to_string(), sites, s.command_line()]
        })
        .collect();
    print_table(&["STAGE", "KIND", "SITES", "COMMAND"], rows);
}
