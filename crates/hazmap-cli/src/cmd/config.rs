use super::load_config;
use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use hazmap_core::config::{Config, WarnLevel};
use hazmap_core::paths;
use std::path::Path;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Write a default hazmap.yaml in the run root
    Init {
        /// Calculation name used for the job graph
        #[arg(long)]
        name: String,
        /// Overwrite an existing hazmap.yaml
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration, defaults filled in
    Show,

    /// Validate the config for common mistakes
    Validate,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Init { name, force } => init(root, &name, force),
        ConfigSubcommand::Show => show(root, json),
        ConfigSubcommand::Validate => validate(root, json),
    }
}

fn init(root: &Path, name: &str, force: bool) -> anyhow::Result<()> {
    let path = paths::config_path(root);
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    Config::new(name)
        .save(root)
        .context("failed to write hazmap.yaml")?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    if json {
        return print_json(&config);
    }
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let warnings = config.validate();

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
