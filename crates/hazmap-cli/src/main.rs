mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{collect::CollectExit, config::ConfigSubcommand, unit::UnitArgs};
use hazmap_core::executor::INPUT_ERROR_EXIT;
use hazmap_core::HazardError;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "hazmap",
    about = "Probabilistic seismic hazard maps, partitioned into work units and run as a job graph",
    version,
    propagate_version = true
)]
struct Cli {
    /// Run root (default: nearest directory holding hazmap.yaml)
    #[arg(long, global = true, env = "HAZMAP_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Partition the site grid and write the job graph
    Plan {
        /// Print the graph without writing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Stage input artifacts under the output directory
    Prepare,

    /// Compute one work unit (a contiguous site range)
    Unit(UnitArgs),

    /// Check which sites have curve files and write completeness.json
    Collect {
        /// Exit with status 2 when any site is missing
        #[arg(long)]
        strict: bool,
    },

    /// Run the planned job graph locally, one process per stage
    Execute {
        /// Worker threads (default: execution.threads from hazmap.yaml)
        #[arg(long)]
        threads: Option<usize>,
        /// Stage to cancel before it starts (repeatable)
        #[arg(long = "cancel", value_name = "STAGE")]
        cancel: Vec<String>,
    },

    /// Plan and run the whole calculation in this process
    Run {
        #[arg(long)]
        threads: Option<usize>,
        /// Keep curve files that already exist
        #[arg(long)]
        skip_existing: bool,
        /// Exit with status 2 when any site is missing afterwards
        #[arg(long)]
        strict: bool,
    },

    /// Write a job graph covering only the sites the last collect found missing
    Repair {
        #[arg(long)]
        dry_run: bool,
    },

    /// List registered ground-motion models
    Models,

    /// Inspect the run configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } | Commands::Execute { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Plan { dry_run } => cmd::plan::run(&root, dry_run, cli.json),
        Commands::Prepare => cmd::prepare::run(&root, cli.json),
        Commands::Unit(args) => cmd::unit::run(&root, args, cli.json),
        Commands::Collect { strict } => cmd::collect::run(&root, strict, cli.json),
        Commands::Execute { threads, cancel } => {
            cmd::execute::run(&root, threads, &cancel, cli.json)
        }
        Commands::Run {
            threads,
            skip_existing,
            strict,
        } => cmd::run::run(&root, threads, skip_existing, strict, cli.json),
        Commands::Repair { dry_run } => cmd::repair::run(&root, dry_run, cli.json),
        Commands::Models => cmd::models::run(cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(exit_code(&e));
    }
}

/// 2 for an incomplete map under `--strict`, `INPUT_ERROR_EXIT` when the
/// failure traces back to bad input, 1 otherwise.
fn exit_code(e: &anyhow::Error) -> i32 {
    if let Some(exit) = e.downcast_ref::<CollectExit>() {
        return exit.exit_code();
    }
    let bad_input = e.chain().any(|cause| {
        cause
            .downcast_ref::<HazardError>()
            .is_some_and(HazardError::is_input_error)
    });
    if bad_input {
        INPUT_ERROR_EXIT
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn input_errors_get_their_own_exit_code() {
        let err = Err::<(), _>(HazardError::InvalidInput("p = 1".into()))
            .context("work unit [0, 1) failed")
            .unwrap_err();
        assert_eq!(exit_code(&err), INPUT_ERROR_EXIT);

        let err = Err::<(), _>(HazardError::Graph("no units".into()))
            .context("failed to build job graph")
            .unwrap_err();
        assert_eq!(exit_code(&err), 1);

        let err = anyhow::Error::from(CollectExit::Incomplete);
        assert_eq!(exit_code(&err), 2);
    }
}
