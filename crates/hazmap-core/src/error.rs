use thiserror::Error;

#[derive(Debug, Error)]
pub enum HazardError {
    #[error("not initialized: no hazmap.yaml found under {0}")]
    NotInitialized(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("rupture probability {probability} out of range [0,1) (source '{source_name}', rupture {rupture})")]
    InvalidProbability {
        source_name: String,
        rupture: usize,
        probability: f64,
    },

    #[error("unsupported intensity axis: {axis} is not available for {imt}")]
    UnsupportedAxis { axis: String, imt: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("unknown ground-motion model '{0}'")]
    UnknownModel(String),

    #[error("job graph error: {0}")]
    Graph(String),

    #[error("stage '{stage}' failed: {reason}")]
    Dispatch { stage: String, reason: String },

    #[error("malformed curve file {path}: {reason}")]
    CurveParse { path: String, reason: String },

    #[error("sites {first} and {second} both map to curve file '{name}'")]
    NameCollision {
        first: usize,
        second: usize,
        name: String,
    },

    #[error("cannot stage {path}: {source}")]
    Staging {
        path: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl HazardError {
    /// Input validation failures are never retried automatically.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            HazardError::InvalidInput(_)
                | HazardError::InvalidProbability { .. }
                | HazardError::UnsupportedAxis { .. }
                | HazardError::Config(_)
                | HazardError::UnknownModel(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, HazardError>;
