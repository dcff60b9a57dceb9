//! The job graph: one prepare stage, one compute stage per work unit and
//! one finish stage, wired as a two-level fan-out/fan-in.
//!
//! The graph is emitted twice. The DAG text is for an external batch
//! scheduler and is never read back. The JSON form is what the local
//! executor loads.

pub mod builder;
pub mod stage;

use crate::error::{HazardError, Result};
use crate::io::atomic_write;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;

pub use builder::{JobGraphBuilder, StageTemplates};
pub use stage::{Stage, StageKind};

/// Parent -> child dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub parent: String,
    pub child: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobGraph {
    pub name: String,
    pub stages: Vec<Stage>,
    pub edges: Vec<Edge>,
}

impl JobGraph {
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn prepare(&self) -> Option<&Stage> {
        self.stages.iter().find(|s| s.kind == StageKind::Prepare)
    }

    pub fn finish(&self) -> Option<&Stage> {
        self.stages.iter().find(|s| s.kind == StageKind::Finish)
    }

    pub fn compute_stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages
            .iter()
            .filter(|s| matches!(s.kind, StageKind::Compute { .. }))
    }

    pub fn parents_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.child == name)
            .map(|e| e.parent.as_str())
    }

    pub fn children_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.parent == name)
            .map(|e| e.child.as_str())
    }

    /// Check the star shape: unique names, one prepare, one finish, at least
    /// one compute stage, and exactly the prepare -> compute -> finish edges.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for stage in &self.stages {
            if !names.insert(stage.name.as_str()) {
                return Err(HazardError::Graph(format!(
                    "duplicate stage name '{}'",
                    stage.name
                )));
            }
        }
        let count = |kind: StageKind| self.stages.iter().filter(|s| s.kind == kind).count();
        if count(StageKind::Prepare) != 1 || count(StageKind::Finish) != 1 {
            return Err(HazardError::Graph(
                "graph needs exactly one prepare and one finish stage".into(),
            ));
        }
        let (Some(prepare), Some(finish)) = (self.prepare(), self.finish()) else {
            return Err(HazardError::Graph("graph has no prepare or finish stage".into()));
        };
        let computes: Vec<&str> = self.compute_stages().map(|s| s.name.as_str()).collect();
        if computes.is_empty() {
            return Err(HazardError::Graph("graph has no compute stages".into()));
        }

        let mut want: HashSet<(&str, &str)> = HashSet::new();
        for &c in &computes {
            want.insert((prepare.name.as_str(), c));
            want.insert((c, finish.name.as_str()));
        }
        let have: HashSet<(&str, &str)> = self
            .edges
            .iter()
            .map(|e| (e.parent.as_str(), e.child.as_str()))
            .collect();
        if have.len() != self.edges.len() || have != want {
            return Err(HazardError::Graph(
                "edges must run prepare -> every compute stage -> finish".into(),
            ));
        }
        Ok(())
    }

    /// Textual DAG description for an external batch scheduler.
    pub fn to_dag_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# hazmap job graph: {}", self.name);
        let _ = writeln!(out, "# {} stages", self.stages.len());
        for stage in &self.stages {
            let _ = writeln!(out, "JOB {} {}", stage.name, stage.command_line());
            if stage.retries > 0 {
                let _ = writeln!(out, "RETRY {} {}", stage.name, stage.retries);
            }
            for hook in &stage.post_hooks {
                let _ = writeln!(out, "SCRIPT POST {} {}", stage.name, hook);
            }
        }
        for edge in &self.edges {
            let _ = writeln!(out, "PARENT {} CHILD {}", edge.parent, edge.child);
        }
        out
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write `jobs/graph.dag` and `jobs/graph.json` under `out`.
    pub fn write(&self, out: &Path) -> Result<()> {
        atomic_write(&paths::graph_dag_path(out), self.to_dag_text().as_bytes())?;
        atomic_write(&paths::graph_json_path(out), self.to_json()?.as_bytes())
    }

    /// Load and validate `jobs/graph.json` under `out`.
    pub fn load(out: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(paths::graph_json_path(out))?;
        let graph: JobGraph = serde_json::from_str(&data)?;
        graph.validate()?;
        Ok(graph)
    }
}
