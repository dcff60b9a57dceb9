//! The prepare stage: stage input artifacts under `<out>/inputs/` so every
//! compute stage reads the same copies, wherever it runs.

use crate::error::{HazardError, Result};
use crate::io::{copy_atomic, ensure_dir};
use crate::partition::UnitArtifacts;
use crate::paths;
use std::path::{Path, PathBuf};
use tracing::info;

fn staged_path(inputs: &Path, src: &Path) -> Result<PathBuf> {
    let name = src.file_name().ok_or_else(|| {
        HazardError::InvalidInput(format!("artifact path '{}' has no file name", src.display()))
    })?;
    Ok(inputs.join(name))
}

/// Where [`prepare_inputs`] puts each artifact. Nothing is copied.
pub fn staged_artifacts(src: &UnitArtifacts, out: &Path) -> Result<UnitArtifacts> {
    let inputs = paths::inputs_dir(out);
    Ok(UnitArtifacts {
        forecast: staged_path(&inputs, &src.forecast)?,
        model: staged_path(&inputs, &src.model)?,
        region: staged_path(&inputs, &src.region)?,
        levels: staged_path(&inputs, &src.levels)?,
    })
}

/// Copy every artifact into `<out>/inputs/` and return the staged paths.
pub fn prepare_inputs(src: &UnitArtifacts, out: &Path) -> Result<UnitArtifacts> {
    let staged = staged_artifacts(src, out)?;
    ensure_dir(&paths::inputs_dir(out))?;
    ensure_dir(&paths::curves_dir(out))?;

    let pairs = [
        (&src.forecast, &staged.forecast),
        (&src.model, &staged.model),
        (&src.region, &staged.region),
        (&src.levels, &staged.levels),
    ];
    let mut seen: Vec<&Path> = Vec::new();
    for (from, to) in pairs {
        if seen.contains(&to.as_path()) {
            return Err(HazardError::InvalidInput(format!(
                "two input artifacts share the file name '{}'",
                to.display()
            )));
        }
        seen.push(to);
        let bytes = copy_atomic(from, to).map_err(|e| match e {
            HazardError::Io(source) => HazardError::Staging {
                path: from.display().to_string(),
                source,
            },
            other => other,
        })?;
        info!(artifact = %to.display(), bytes, "staged input");
    }
    Ok(staged)
}
