use super::load_config;
use crate::output::{print_json, print_table};
use anyhow::Context;
use hazmap_core::executor::{ExecutionReport, LocalExecutor, ProcessDispatch, StageStatus};
use hazmap_core::graph::JobGraph;
use std::path::Path;

pub fn run(
    root: &Path,
    threads: Option<usize>,
    cancel: &[String],
    json: bool,
) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let out = config.output_dir(root);
    let graph = JobGraph::load(&out).context("no job graph found; run `hazmap plan` first")?;

    for name in cancel {
        if graph.stage(name).is_none() {
            anyhow::bail!("cannot cancel '{name}': no such stage in {}", graph.name);
        }
    }

    let executor = LocalExecutor::new(threads.unwrap_or(config.execution.threads))?;
    for name in cancel {
        executor.cancel(name);
    }
    let dispatch = ProcessDispatch {
        working_dir: Some(root.to_path_buf()),
    };
    let report = executor.execute(&graph, &dispatch)?;

    if json {
        print_json(&report)?;
    } else {
        render_human(&report);
    }
    check(&report)
}

pub(crate) fn check(report: &ExecutionReport) -> anyhow::Result<()> {
    let failed: Vec<&str> = report.failed().map(|o| o.name.as_str()).collect();
    if !failed.is_empty() {
        anyhow::bail!("{} stage(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}

pub(crate) fn render_human(report: &ExecutionReport) {
    let rows = report
        .outcomes
        .iter()
        .map(|o| {
            let (status, detail) = match &o.status {
                StageStatus::Succeeded => ("succeeded", String::new()),
                StageStatus::Failed { reason } => ("failed", reason.clone()),
                StageStatus::Cancelled { reason } => ("cancelled", reason.clone()),
            };
            vec![
                o.name.clone(),
                status.to_string(),
                o.attempts.to_string(),
                detail,
            ]
        })
        .collect();
    print_table(&["STAGE", "STATUS", "ATTEMPTS", "DETAIL"], rows);

    let elapsed = report.finished_at - report.started_at;
    println!(
        "\n{}: {} stage(s) in {:.1}s",
        report.graph,
        report.outcomes.len(),
        elapsed.num_milliseconds() as f64 / 1000.0
    );
}
