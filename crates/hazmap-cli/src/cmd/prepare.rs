use super::load_config;
use crate::output::print_json;
use anyhow::Context;
use hazmap_core::prepare::prepare_inputs;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let out = config.output_dir(root);
    let staged =
        prepare_inputs(&config.artifacts(root), &out).context("failed to stage input artifacts")?;

    if json {
        return print_json(&staged);
    }
    println!("Staged inputs:");
    for path in [&staged.forecast, &staged.model, &staged.region, &staged.levels] {
        println!("  {}", path.display());
    }
    Ok(())
}
