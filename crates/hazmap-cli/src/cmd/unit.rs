use crate::output::print_json;
use anyhow::Context;
use clap::Args;
use hazmap_core::calc::{CalcSettings, HazardAggregator};
use hazmap_core::config::Config;
use hazmap_core::gmm::ModelRegistry;
use hazmap_core::imt::LevelAxis;
use hazmap_core::paths;
use hazmap_core::partition::{UnitArtifacts, WorkUnit};
use hazmap_core::unit_runner::{UnitReport, WorkUnitRunner};
use std::path::{Path, PathBuf};

#[derive(Args)]
pub struct UnitArgs {
    /// First site index (inclusive)
    #[arg(long)]
    pub start: usize,
    /// Last site index (exclusive)
    #[arg(long)]
    pub end: usize,
    #[arg(long)]
    pub forecast: PathBuf,
    #[arg(long)]
    pub model: PathBuf,
    #[arg(long)]
    pub region: PathBuf,
    #[arg(long)]
    pub levels: PathBuf,
    /// Ignore sources and ruptures farther than this (km)
    #[arg(long, default_value_t = 200.0)]
    pub max_distance: f64,
    /// Axis levels are handed to the model on (log or linear)
    #[arg(long, default_value_t = LevelAxis::Log)]
    pub axis: LevelAxis,
    /// Decimal places in curve file names
    #[arg(long, default_value_t = 4)]
    pub decimals: usize,
    #[arg(long, default_value = "output")]
    pub out: PathBuf,
    /// Keep curve files that already hold a curve on the same levels
    #[arg(long)]
    pub skip_existing: bool,
}

pub fn run(root: &Path, args: UnitArgs, json: bool) -> anyhow::Result<()> {
    if args.end <= args.start {
        anyhow::bail!("empty site range [{}, {})", args.start, args.end);
    }

    let mut settings = CalcSettings::new(args.max_distance, args.axis);
    // Magnitude-distance cutoff only comes from hazmap.yaml.
    if root.join(paths::CONFIG_FILE).is_file() {
        let config = Config::load(root).context("failed to load hazmap.yaml")?;
        settings.mag_dist_cutoff = config.calculation.magnitude_distance_cutoff;
    }

    let unit = WorkUnit::new(
        args.start,
        args.end,
        UnitArtifacts {
            forecast: args.forecast,
            model: args.model,
            region: args.region,
            levels: args.levels,
        },
    );
    let runner = WorkUnitRunner::new(HazardAggregator::new(settings), &args.out, args.decimals)
        .skip_existing(args.skip_existing);
    let registry = ModelRegistry::with_builtins();
    let report = runner
        .run(&unit, &registry)
        .with_context(|| format!("work unit {unit} failed"))?;

    if json {
        return print_json(&report);
    }
    render_human(&report, &args.out);
    Ok(())
}

fn render_human(report: &UnitReport, out: &Path) {
    println!(
        "Sites [{}, {}): {} written, {} skipped, {} zero curve(s)",
        report.start, report.end, report.written, report.skipped, report.zero_curves
    );
    println!(
        "Elapsed {} ms ({:.2} ms per curve), output in {}",
        report.elapsed_ms,
        report.mean_curve_ms,
        paths::curves_dir(out).display()
    );
}
