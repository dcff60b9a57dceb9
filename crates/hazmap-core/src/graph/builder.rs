use super::{Edge, JobGraph, Stage, StageKind};
use crate::collect::expected_files;
use crate::error::{HazardError, Result};
use crate::partition::{check_units, WorkUnit};
use crate::site::SiteGrid;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::info;

pub const PREPARE_STAGE: &str = "prepare";
pub const FINISH_STAGE: &str = "finish";

/// Argument templates for the three stage kinds. `{name}` placeholders are
/// substituted per stage; compute stages additionally get `{start}`,
/// `{end}`, `{forecast}`, `{model}`, `{region}` and `{levels}` from their
/// work unit.
#[derive(Debug, Clone, PartialEq)]
pub struct StageTemplates {
    pub executable: String,
    pub prepare: Vec<String>,
    pub compute: Vec<String>,
    pub finish: Vec<String>,
    pub retries: u32,
    /// Attached to compute stages only.
    pub post_hooks: Vec<String>,
}

fn words(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl StageTemplates {
    /// Templates invoking the `hazmap` CLI subcommands.
    pub fn standard(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            prepare: words(&["prepare", "--root", "{root}"]),
            compute: words(&[
                "unit",
                "--start", "{start}",
                "--end", "{end}",
                "--forecast", "{forecast}",
                "--model", "{model}",
                "--region", "{region}",
                "--levels", "{levels}",
                "--max-distance", "{max_distance}",
                "--axis", "{axis}",
                "--decimals", "{decimals}",
                "--out", "{out}",
                "--root", "{root}",
            ]),
            finish: words(&["collect", "--root", "{root}"]),
            retries: 0,
            post_hooks: Vec::new(),
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_post_hooks(mut self, hooks: Vec<String>) -> Self {
        self.post_hooks = hooks;
        self
    }
}

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

fn placeholder_re() -> &'static Regex {
    PLACEHOLDER_RE.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").unwrap())
}

fn expand(template: &[String], vars: &BTreeMap<&str, String>) -> Result<Vec<String>> {
    template
        .iter()
        .map(|arg| {
            let mut unknown = None;
            let out = placeholder_re().replace_all(arg, |caps: &Captures| match vars.get(&caps[1]) {
                Some(v) => v.clone(),
                None => {
                    unknown.get_or_insert_with(|| caps[1].to_string());
                    String::new()
                }
            });
            match unknown {
                Some(key) => Err(HazardError::Graph(format!(
                    "unknown placeholder '{{{key}}}' in '{arg}'"
                ))),
                None => Ok(out.into_owned()),
            }
        })
        .collect()
}

/// Builds the prepare -> compute -> finish graph for a set of work units.
/// A graph is rebuilt from scratch whenever the partitioning changes.
#[derive(Debug, Clone)]
pub struct JobGraphBuilder<'a> {
    name: String,
    templates: StageTemplates,
    grid: &'a SiteGrid,
    out_dir: PathBuf,
    name_decimals: usize,
    vars: BTreeMap<&'static str, String>,
    partial: bool,
}

impl<'a> JobGraphBuilder<'a> {
    pub fn new(
        name: impl Into<String>,
        templates: StageTemplates,
        grid: &'a SiteGrid,
        out_dir: impl Into<PathBuf>,
        name_decimals: usize,
    ) -> Self {
        let out_dir = out_dir.into();
        let mut vars = BTreeMap::new();
        vars.insert("out", out_dir.display().to_string());
        vars.insert("decimals", name_decimals.to_string());
        Self {
            name: name.into(),
            templates,
            grid,
            out_dir,
            name_decimals,
            vars,
            partial: false,
        }
    }

    /// Set a placeholder value shared by every stage.
    pub fn var(mut self, key: &'static str, value: impl ToString) -> Self {
        self.vars.insert(key, value.to_string());
        self
    }

    /// Allow units that cover only part of the grid, as in a repair run.
    pub fn partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    pub fn build(&self, units: &[WorkUnit]) -> Result<JobGraph> {
        let site_count = self.grid.len();
        check_units(units, site_count, !self.partial)?;
        expected_files(&self.out_dir, self.grid, self.name_decimals)?;

        let width = site_count.saturating_sub(1).to_string().len();
        let stage = |name: String, kind: StageKind, args: Vec<String>, hooks: Vec<String>| Stage {
            name,
            kind,
            executable: self.templates.executable.clone(),
            args,
            output_dir: self.out_dir.clone(),
            retries: self.templates.retries,
            post_hooks: hooks,
        };

        let mut stages = Vec::with_capacity(units.len() + 2);
        stages.push(stage(
            PREPARE_STAGE.to_string(),
            StageKind::Prepare,
            expand(&self.templates.prepare, &self.vars)?,
            Vec::new(),
        ));

        let mut edges = Vec::with_capacity(units.len() * 2);
        for unit in units {
            let name = format!("curves_{:0width$}_{:0width$}", unit.start, unit.end);
            let mut vars = self.vars.clone();
            vars.insert("start", unit.start.to_string());
            vars.insert("end", unit.end.to_string());
            vars.insert("forecast", unit.artifacts.forecast.display().to_string());
            vars.insert("model", unit.artifacts.model.display().to_string());
            vars.insert("region", unit.artifacts.region.display().to_string());
            vars.insert("levels", unit.artifacts.levels.display().to_string());
            edges.push(Edge {
                parent: PREPARE_STAGE.to_string(),
                child: name.clone(),
            });
            stages.push(stage(
                name,
                StageKind::Compute {
                    start: unit.start,
                    end: unit.end,
                },
                expand(&self.templates.compute, &vars)?,
                self.templates.post_hooks.clone(),
            ));
        }

        for unit_stage in &stages[1..] {
            edges.push(Edge {
                parent: unit_stage.name.clone(),
                child: FINISH_STAGE.to_string(),
            });
        }
        stages.push(stage(
            FINISH_STAGE.to_string(),
            StageKind::Finish,
            expand(&self.templates.finish, &self.vars)?,
            Vec::new(),
        ));

        let graph = JobGraph {
            name: self.name.clone(),
            stages,
            edges,
        };
        graph.validate()?;
        info!(
            graph = %graph.name,
            units = units.len(),
            sites = site_count,
            "built job graph"
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{partition, UnitArtifacts};
    use crate::site::{ListedSite, SiteParams};
    use crate::testutil;

    fn artifacts() -> UnitArtifacts {
        UnitArtifacts {
            forecast: PathBuf::from("/o/inputs/forecast.yaml"),
            model: PathBuf::from("/o/inputs/model.yaml"),
            region: PathBuf::from("/o/inputs/region.yaml"),
            levels: PathBuf::from("/o/inputs/levels.txt"),
        }
    }

    fn builder(grid: &SiteGrid) -> JobGraphBuilder<'_> {
        JobGraphBuilder::new("socal", StageTemplates::standard("hazmap").with_retries(3), grid, "/o", 4)
            .var("root", "/run")
            .var("max_distance", 200.0)
            .var("axis", "log")
    }

    #[test]
    fn builds_star_with_padded_names() {
        let grid = testutil::grid(25, 10);
        let units = partition(grid.len(), 100, &artifacts()).unwrap();
        let graph = builder(&grid).build(&units).unwrap();

        let names: Vec<&str> = graph.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["prepare", "curves_000_100", "curves_100_200", "curves_200_250", "finish"]
        );
        assert_eq!(graph.edges.len(), 6);
        assert!(graph.stages.iter().all(|s| s.retries == 3));
    }

    #[test]
    fn compute_args_are_substituted() {
        let grid = testutil::grid(2, 5);
        let units = partition(grid.len(), 4, &artifacts()).unwrap();
        let graph = builder(&grid).build(&units).unwrap();
        let unit = graph.stage("curves_4_8").unwrap();
        assert_eq!(unit.kind, StageKind::Compute { start: 4, end: 8 });
        assert_eq!(
            unit.command_line(),
            "hazmap unit --start 4 --end 8 --forecast /o/inputs/forecast.yaml \
             --model /o/inputs/model.yaml --region /o/inputs/region.yaml \
             --levels /o/inputs/levels.txt --max-distance 200 --axis log \
             --decimals 4 --out /o --root /run"
        );
        assert_eq!(graph.prepare().unwrap().args, vec!["prepare", "--root", "/run"]);
        assert_eq!(graph.finish().unwrap().args, vec!["collect", "--root", "/run"]);
    }

    #[test]
    fn post_hooks_go_on_compute_stages() {
        let grid = testutil::grid(1, 4);
        let units = partition(grid.len(), 2, &artifacts()).unwrap();
        let templates = StageTemplates::standard("hazmap").with_post_hooks(vec!["sync.sh".into()]);
        let graph = JobGraphBuilder::new("t", templates, &grid, "/o", 4)
            .var("root", "/run")
            .var("max_distance", 50)
            .var("axis", "log")
            .build(&units)
            .unwrap();
        assert!(graph.compute_stages().all(|s| s.post_hooks == vec!["sync.sh"]));
        assert!(graph.prepare().unwrap().post_hooks.is_empty());
    }

    #[test]
    fn zero_units_is_fatal() {
        let grid = testutil::grid(2, 2);
        let err = builder(&grid).build(&[]).unwrap_err();
        assert!(matches!(err, HazardError::Graph(_)));
    }

    #[test]
    fn site_count_mismatch_is_fatal() {
        let grid = testutil::grid(2, 2);
        let units = partition(5, 2, &artifacts()).unwrap();
        assert!(builder(&grid).build(&units).is_err());
        let short = partition(3, 2, &artifacts()).unwrap();
        assert!(builder(&grid).build(&short).is_err());
    }

    #[test]
    fn partial_graph_for_repair() {
        let grid = testutil::grid(2, 5);
        let units = vec![WorkUnit::new(3, 4, artifacts()), WorkUnit::new(7, 9, artifacts())];
        assert!(builder(&grid).build(&units).is_err());
        let graph = builder(&grid).partial(true).build(&units).unwrap();
        assert_eq!(graph.compute_stages().count(), 2);
    }

    #[test]
    fn unknown_placeholder_is_fatal() {
        let grid = testutil::grid(1, 2);
        let units = partition(grid.len(), 2, &artifacts()).unwrap();
        let mut templates = StageTemplates::standard("hazmap");
        templates.finish.push("{bogus}".into());
        let err = JobGraphBuilder::new("t", templates, &grid, "/o", 4)
            .var("root", "/run")
            .var("max_distance", 1)
            .var("axis", "log")
            .build(&units)
            .unwrap_err();
        assert!(err.to_string().contains("{bogus}"));
    }

    #[test]
    fn name_collision_is_fatal_before_dispatch() {
        let site = |lat: f64| ListedSite {
            lat,
            lon: 0.0,
            params: SiteParams::default(),
        };
        let grid = SiteGrid::List {
            sites: vec![site(1.0), site(1.000_001)],
        };
        let units = partition(grid.len(), 1, &artifacts()).unwrap();
        let err = builder(&grid).build(&units).unwrap_err();
        assert!(matches!(err, HazardError::NameCollision { .. }));
    }
}
