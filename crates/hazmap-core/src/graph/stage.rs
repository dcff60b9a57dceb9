use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// What a stage does, so an in-process dispatcher can run it without
/// parsing its command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageKind {
    Prepare,
    Compute { start: usize, end: usize },
    Finish,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Prepare => write!(f, "prepare"),
            StageKind::Compute { start, end } => write!(f, "compute [{start}, {end})"),
            StageKind::Finish => write!(f, "finish"),
        }
    }
}

/// An opaque executable description: program, arguments and the directory
/// the stage writes to, plus hooks run after the primary action succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub kind: StageKind,
    pub executable: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub output_dir: PathBuf,
    /// Attempts allowed after the first failure.
    #[serde(default)]
    pub retries: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_hooks: Vec<String>,
}

impl Stage {
    /// The command as one line, arguments with whitespace or quotes quoted.
    pub fn command_line(&self) -> String {
        let mut line = quote(&self.executable);
        for arg in &self.args {
            line.push(' ');
            line.push_str(&quote(arg));
        }
        line
    }
}

fn quote(word: &str) -> String {
    if !word.is_empty() && !word.contains(|c: char| c.is_whitespace() || c == '"' || c == '\'') {
        return word.to_string();
    }
    format!("\"{}\"", word.replace('\\', "\\\\").replace('"', "\\\""))
}
