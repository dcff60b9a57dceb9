use crate::calc::{CalcSettings, MagDistCutoff};
use crate::error::{HazardError, Result};
use crate::imt::LevelAxis;
use crate::partition::UnitArtifacts;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// InputsConfig
// ---------------------------------------------------------------------------

/// Input artifact paths, relative to the run root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputsConfig {
    #[serde(default = "default_forecast")]
    pub forecast: PathBuf,
    #[serde(default = "default_model")]
    pub model: PathBuf,
    #[serde(default = "default_region")]
    pub region: PathBuf,
    #[serde(default = "default_levels")]
    pub levels: PathBuf,
}

fn default_forecast() -> PathBuf {
    PathBuf::from("forecast.yaml")
}

fn default_model() -> PathBuf {
    PathBuf::from("model.yaml")
}

fn default_region() -> PathBuf {
    PathBuf::from("region.yaml")
}

fn default_levels() -> PathBuf {
    PathBuf::from("levels.txt")
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self {
            forecast: default_forecast(),
            model: default_model(),
            region: default_region(),
            levels: default_levels(),
        }
    }
}

// ---------------------------------------------------------------------------
// CalculationConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationConfig {
    #[serde(default = "default_max_distance")]
    pub max_distance_km: f64,
    #[serde(default)]
    pub level_axis: LevelAxis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnitude_distance_cutoff: Option<MagDistCutoff>,
}

fn default_max_distance() -> f64 {
    200.0
}

impl Default for CalculationConfig {
    fn default() -> Self {
        Self {
            max_distance_km: default_max_distance(),
            level_axis: LevelAxis::default(),
            magnitude_distance_cutoff: None,
        }
    }
}

// ---------------------------------------------------------------------------
// PartitionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionConfig {
    #[serde(default = "default_sites_per_unit")]
    pub sites_per_unit: usize,
}

fn default_sites_per_unit() -> usize {
    100
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            sites_per_unit: default_sites_per_unit(),
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Extra attempts per stage after the first failure.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Worker threads for local execution; 0 means one per core.
    #[serde(default)]
    pub threads: usize,
    /// Program named in emitted stage commands.
    #[serde(default = "default_executable")]
    pub executable: String,
    /// Shell commands run after each compute stage succeeds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_hooks: Vec<String>,
}

fn default_retries() -> u32 {
    3
}

fn default_executable() -> String {
    "hazmap".to_string()
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            threads: 0,
            executable: default_executable(),
            post_hooks: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// OutputConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    /// Decimal places used when naming curve files.
    #[serde(default = "default_name_decimals")]
    pub name_decimals: usize,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_name_decimals() -> usize {
    4
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            name_decimals: default_name_decimals(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub inputs: InputsConfig,
    #[serde(default)]
    pub calculation: CalculationConfig,
    #[serde(default)]
    pub partition: PartitionConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_version() -> u32 {
    1
}

impl Config {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: 1,
            name: name.into(),
            inputs: InputsConfig::default(),
            calculation: CalculationConfig::default(),
            partition: PartitionConfig::default(),
            execution: ExecutionConfig::default(),
            output: OutputConfig::default(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(HazardError::NotInitialized(root.display().to_string()));
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// Input artifacts resolved against `root`.
    pub fn artifacts(&self, root: &Path) -> UnitArtifacts {
        UnitArtifacts {
            forecast: root.join(&self.inputs.forecast),
            model: root.join(&self.inputs.model),
            region: root.join(&self.inputs.region),
            levels: root.join(&self.inputs.levels),
        }
    }

    pub fn output_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.output.dir)
    }

    pub fn calc_settings(&self) -> CalcSettings {
        CalcSettings {
            max_distance_km: self.calculation.max_distance_km,
            axis: self.calculation.level_axis,
            mag_dist_cutoff: self.calculation.magnitude_distance_cutoff.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut error = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message,
            })
        };

        if self.name.trim().is_empty() {
            error("name is empty".to_string());
        }
        let d = self.calculation.max_distance_km;
        if d.is_nan() || d <= 0.0 {
            error(format!("calculation.max_distance_km must be positive, got {d}"));
        }
        if self.partition.sites_per_unit == 0 {
            error("partition.sites_per_unit must be at least 1".to_string());
        }
        if self.execution.executable.trim().is_empty() {
            error("execution.executable is empty".to_string());
        }

        for (i, hook) in self.execution.post_hooks.iter().enumerate() {
            if hook.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("execution.post_hooks[{i}] is empty"),
                });
            }
        }
        if self.execution.retries > 10 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "execution.retries={} (>10 is unusual)",
                    self.execution.retries
                ),
            });
        }
        if self.output.name_decimals < 2 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "output.name_decimals={} makes neighbouring sites likely to share a file name",
                    self.output.name_decimals
                ),
            });
        }

        warnings
    }
}
