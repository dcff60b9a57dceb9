//! Local execution of a job graph.
//!
//! `LocalExecutor` honours the graph's ordering on a rayon pool: prepare
//! runs alone, compute stages run concurrently with no ordering among
//! them, and finish runs once every compute stage is terminal. How a stage
//! is actually carried out is up to a `Dispatch` implementation.

use crate::collect::{collect, CompletenessReport};
use crate::error::{HazardError, Result};
use crate::gmm::ModelRegistry;
use crate::graph::{JobGraph, Stage, StageKind};
use crate::partition::{UnitArtifacts, WorkUnit};
use crate::prepare::prepare_inputs;
use crate::unit_runner::{UnitInputs, WorkUnitRunner};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Mutex, OnceLock};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Carries out one stage. Implementations are shared across pool threads.
pub trait Dispatch: Sync {
    fn dispatch(&self, stage: &Stage) -> Result<()>;

    /// Run one post hook after the stage's primary action succeeded.
    fn run_hook(&self, stage: &Stage, hook: &str) -> Result<()> {
        run_shell_hook(stage, hook)
    }
}

/// Run `hook` through `sh -c` with `HAZMAP_STAGE` and `HAZMAP_OUT` set.
pub fn run_shell_hook(stage: &Stage, hook: &str) -> Result<()> {
    let status = Command::new("sh")
        .arg("-c")
        .arg(hook)
        .env("HAZMAP_STAGE", &stage.name)
        .env("HAZMAP_OUT", &stage.output_dir)
        .stdin(Stdio::null())
        .status()
        .map_err(|e| HazardError::Dispatch {
            stage: stage.name.clone(),
            reason: format!("cannot spawn post hook: {e}"),
        })?;
    if !status.success() {
        return Err(HazardError::Dispatch {
            stage: stage.name.clone(),
            reason: format!("post hook '{hook}' exited with {status}"),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// StageOutcome / ExecutionReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    Failed { reason: String },
    Cancelled { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutcome {
    pub name: String,
    #[serde(flatten)]
    pub status: StageStatus,
    pub attempts: u32,
}

impl StageOutcome {
    fn cancelled(name: &str, attempts: u32, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            status: StageStatus::Cancelled {
                reason: reason.to_string(),
            },
            attempts,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == StageStatus::Succeeded
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub graph: String,
    /// One entry per stage, in graph order.
    pub outcomes: Vec<StageOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionReport {
    pub fn outcome(&self, name: &str) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(StageOutcome::succeeded)
    }

    pub fn failed(&self) -> impl Iterator<Item = &StageOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, StageStatus::Failed { .. }))
    }

    pub fn cancelled(&self) -> impl Iterator<Item = &StageOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, StageStatus::Cancelled { .. }))
    }
}

// ---------------------------------------------------------------------------
// LocalExecutor
// ---------------------------------------------------------------------------

pub struct LocalExecutor {
    pool: rayon::ThreadPool,
    cancelled: Mutex<HashSet<String>>,
}

impl LocalExecutor {
    /// `threads == 0` uses one thread per core.
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("hazmap-worker-{i}"))
            .build()
            .map_err(|e| HazardError::Config(format!("cannot start worker pool: {e}")))?;
        Ok(Self {
            pool,
            cancelled: Mutex::new(HashSet::new()),
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Cancel a stage that has not started yet. Cancelling prepare cancels
    /// everything downstream; cancelling a compute stage affects only it.
    pub fn cancel(&self, stage: &str) {
        info!(stage, "cancel requested");
        self.cancelled
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(stage.to_string());
    }

    fn is_cancelled(&self, stage: &str) -> bool {
        self.cancelled
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(stage)
    }

    pub fn execute(&self, graph: &JobGraph, dispatch: &dyn Dispatch) -> Result<ExecutionReport> {
        graph.validate()?;
        let started_at = Utc::now();
        let (Some(prepare), Some(finish)) = (graph.prepare(), graph.finish()) else {
            return Err(HazardError::Graph("graph has no prepare or finish stage".into()));
        };
        let computes: Vec<&Stage> = graph.compute_stages().collect();
        info!(
            graph = %graph.name,
            units = computes.len(),
            threads = self.threads(),
            "executing job graph"
        );

        let prepared = self.run_stage(prepare, dispatch);
        let mut outcomes = vec![prepared.clone()];

        if !prepared.succeeded() {
            warn!(stage = %prepare.name, "prepare did not succeed; cancelling downstream stages");
            let reason = format!("parent '{}' did not succeed", prepare.name);
            outcomes.extend(
                computes
                    .iter()
                    .map(|s| StageOutcome::cancelled(&s.name, 0, &reason)),
            );
            outcomes.push(StageOutcome::cancelled(&finish.name, 0, &reason));
        } else {
            let unit_outcomes: Vec<StageOutcome> = self.pool.install(|| {
                computes
                    .par_iter()
                    .map(|stage| self.run_stage(stage, dispatch))
                    .collect()
            });
            let failed = unit_outcomes.iter().filter(|o| !o.succeeded()).count();
            if failed > 0 {
                warn!(failed, total = unit_outcomes.len(), "some compute stages did not succeed");
            }
            outcomes.extend(unit_outcomes);
            outcomes.push(self.run_stage(finish, dispatch));
        }

        Ok(ExecutionReport {
            graph: graph.name.clone(),
            outcomes,
            started_at,
            finished_at: Utc::now(),
        })
    }

    fn run_stage(&self, stage: &Stage, dispatch: &dyn Dispatch) -> StageOutcome {
        let max_attempts = stage.retries + 1;
        let mut last_error = String::new();
        for attempt in 1..=max_attempts {
            if self.is_cancelled(&stage.name) {
                info!(stage = %stage.name, "stage cancelled");
                return StageOutcome::cancelled(&stage.name, attempt - 1, "cancelled by request");
            }
            info!(stage = %stage.name, kind = %stage.kind, attempt, "dispatching stage");
            let result = dispatch.dispatch(stage).and_then(|()| {
                stage
                    .post_hooks
                    .iter()
                    .try_for_each(|hook| dispatch.run_hook(stage, hook))
            });
            match result {
                Ok(()) => {
                    return StageOutcome {
                        name: stage.name.clone(),
                        status: StageStatus::Succeeded,
                        attempts: attempt,
                    }
                }
                Err(e) if e.is_input_error() => {
                    warn!(stage = %stage.name, error = %e, "stage failed on bad input; not retrying");
                    return StageOutcome {
                        name: stage.name.clone(),
                        status: StageStatus::Failed {
                            reason: e.to_string(),
                        },
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    warn!(stage = %stage.name, attempt, max_attempts, error = %e, "stage attempt failed");
                    last_error = e.to_string();
                }
            }
        }
        StageOutcome {
            name: stage.name.clone(),
            status: StageStatus::Failed { reason: last_error },
            attempts: max_attempts,
        }
    }
}

// ---------------------------------------------------------------------------
// ProcessDispatch
// ---------------------------------------------------------------------------

/// Exit status a stage command uses to report bad input. `ProcessDispatch`
/// turns it into an input error, so the stage is not retried.
pub const INPUT_ERROR_EXIT: i32 = 3;

/// Runs each stage's command as a child process.
#[derive(Debug, Clone, Default)]
pub struct ProcessDispatch {
    pub working_dir: Option<PathBuf>,
}

impl Dispatch for ProcessDispatch {
    fn dispatch(&self, stage: &Stage) -> Result<()> {
        let program = which::which(&stage.executable).map_err(|_| HazardError::Dispatch {
            stage: stage.name.clone(),
            reason: format!("executable '{}' not found", stage.executable),
        })?;
        let mut cmd = Command::new(program);
        cmd.args(&stage.args).stdin(Stdio::null());
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        let status = cmd.status().map_err(|e| HazardError::Dispatch {
            stage: stage.name.clone(),
            reason: format!("cannot spawn: {e}"),
        })?;
        if status.code() == Some(INPUT_ERROR_EXIT) {
            return Err(HazardError::InvalidInput(format!(
                "stage '{}' rejected its input ({status})",
                stage.name
            )));
        }
        if !status.success() {
            return Err(HazardError::Dispatch {
                stage: stage.name.clone(),
                reason: format!("command exited with {status}"),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// InProcessDispatch
// ---------------------------------------------------------------------------

/// Runs stages by calling the library directly: prepare stages the inputs
/// and loads them once, compute stages run a `WorkUnitRunner` against the
/// shared inputs, and finish collects.
pub struct InProcessDispatch<'a> {
    sources: UnitArtifacts,
    runner: WorkUnitRunner,
    registry: &'a ModelRegistry,
    name_decimals: usize,
    prepared: OnceLock<(UnitArtifacts, UnitInputs)>,
    report: Mutex<Option<CompletenessReport>>,
}

impl<'a> InProcessDispatch<'a> {
    pub fn new(
        sources: UnitArtifacts,
        runner: WorkUnitRunner,
        registry: &'a ModelRegistry,
        name_decimals: usize,
    ) -> Self {
        Self {
            sources,
            runner,
            registry,
            name_decimals,
            prepared: OnceLock::new(),
            report: Mutex::new(None),
        }
    }

    /// The completeness report produced by the finish stage, if it ran.
    pub fn completeness(&self) -> Option<CompletenessReport> {
        self.report
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn prepared(&self, stage: &Stage) -> Result<&(UnitArtifacts, UnitInputs)> {
        self.prepared.get().ok_or_else(|| HazardError::Dispatch {
            stage: stage.name.clone(),
            reason: "inputs have not been prepared".into(),
        })
    }
}

impl Dispatch for InProcessDispatch<'_> {
    fn dispatch(&self, stage: &Stage) -> Result<()> {
        let out = self.runner.out_dir();
        match stage.kind {
            StageKind::Prepare => {
                let staged = prepare_inputs(&self.sources, out)?;
                let inputs = UnitInputs::load(&staged)?;
                let _ = self.prepared.set((staged, inputs));
                Ok(())
            }
            StageKind::Compute { start, end } => {
                let (staged, inputs) = self.prepared(stage)?;
                let unit = WorkUnit::new(start, end, staged.clone());
                self.runner.run_with(&unit, inputs, self.registry)?;
                Ok(())
            }
            StageKind::Finish => {
                let (_, inputs) = self.prepared(stage)?;
                let report = collect(out, &inputs.grid, self.name_decimals)?;
                *self.report.lock().unwrap_or_else(|e| e.into_inner()) = Some(report);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::{CalcSettings, HazardAggregator};
    use crate::graph::{JobGraphBuilder, StageTemplates};
    use crate::imt::LevelAxis;
    use crate::partition::partition;
    use crate::testutil;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Records dispatch order; stages listed in `failures` fail that many
    /// times before succeeding (`usize::MAX` = always).
    #[derive(Default)]
    struct Scripted {
        log: Mutex<Vec<String>>,
        failures: HashMap<String, usize>,
        bad_input: HashSet<String>,
        seen: Mutex<HashMap<String, usize>>,
        hooks: AtomicUsize,
    }

    impl Scripted {
        fn failing(mut self, stage: &str, times: usize) -> Self {
            self.failures.insert(stage.to_string(), times);
            self
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    impl Dispatch for Scripted {
        fn dispatch(&self, stage: &Stage) -> Result<()> {
            self.log.lock().unwrap().push(stage.name.clone());
            if self.bad_input.contains(&stage.name) {
                return Err(HazardError::InvalidInput("bad".into()));
            }
            let mut seen = self.seen.lock().unwrap();
            let n = seen.entry(stage.name.clone()).or_default();
            *n += 1;
            match self.failures.get(&stage.name) {
                Some(&times) if *n <= times => Err(HazardError::Dispatch {
                    stage: stage.name.clone(),
                    reason: "scripted failure".into(),
                }),
                _ => Ok(()),
            }
        }

        fn run_hook(&self, _stage: &Stage, _hook: &str) -> Result<()> {
            self.hooks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn graph(retries: u32) -> JobGraph {
        let grid = testutil::grid(3, 3);
        let units = partition(grid.len(), 3, &UnitArtifacts::default()).unwrap();
        let templates = StageTemplates::standard("hazmap")
            .with_retries(retries)
            .with_post_hooks(vec!["true".into()]);
        JobGraphBuilder::new("test", templates, &grid, "/o", 4)
            .var("root", "/r")
            .var("max_distance", 100)
            .var("axis", "log")
            .build(&units)
            .unwrap()
    }

    fn executor() -> LocalExecutor {
        LocalExecutor::new(2).unwrap()
    }

    #[test]
    fn runs_prepare_first_and_finish_last() {
        let dispatch = Scripted::default();
        let report = executor().execute(&graph(3), &dispatch).unwrap();
        assert!(report.all_succeeded());
        let log = dispatch.log();
        assert_eq!(log.len(), 5);
        assert_eq!(log.first().unwrap(), "prepare");
        assert_eq!(log.last().unwrap(), "finish");
        assert_eq!(dispatch.hooks.load(Ordering::SeqCst), 3);
        let names: Vec<_> = report.outcomes.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["prepare", "curves_0_3", "curves_3_6", "curves_6_9", "finish"]);
    }

    #[test]
    fn transient_failure_is_retried() {
        let dispatch = Scripted::default().failing("curves_3_6", 2);
        let report = executor().execute(&graph(3), &dispatch).unwrap();
        let o = report.outcome("curves_3_6").unwrap();
        assert!(o.succeeded());
        assert_eq!(o.attempts, 3);
    }

    #[test]
    fn permanent_failure_leaves_siblings_and_finish_alone() {
        let dispatch = Scripted::default().failing("curves_0_3", usize::MAX);
        let report = executor().execute(&graph(2), &dispatch).unwrap();
        let o = report.outcome("curves_0_3").unwrap();
        assert!(matches!(o.status, StageStatus::Failed { .. }));
        assert_eq!(o.attempts, 3);
        assert!(report.outcome("curves_3_6").unwrap().succeeded());
        assert!(report.outcome("curves_6_9").unwrap().succeeded());
        assert!(report.outcome("finish").unwrap().succeeded());
        assert_eq!(report.failed().count(), 1);
    }

    #[test]
    fn failed_prepare_cancels_everything_downstream() {
        let dispatch = Scripted::default().failing("prepare", usize::MAX);
        let report = executor().execute(&graph(1), &dispatch).unwrap();
        assert_eq!(dispatch.log(), vec!["prepare", "prepare"]);
        assert_eq!(report.cancelled().count(), 4);
        assert!(report.cancelled().all(|o| o.attempts == 0));
    }

    #[test]
    fn cancelled_compute_stage_does_not_affect_siblings() {
        let dispatch = Scripted::default();
        let exec = executor();
        exec.cancel("curves_3_6");
        let report = exec.execute(&graph(0), &dispatch).unwrap();
        assert!(matches!(
            report.outcome("curves_3_6").unwrap().status,
            StageStatus::Cancelled { .. }
        ));
        assert!(report.outcome("curves_0_3").unwrap().succeeded());
        assert!(report.outcome("finish").unwrap().succeeded());
        assert!(!dispatch.log().contains(&"curves_3_6".to_string()));
    }

    #[test]
    fn cancelled_prepare_cancels_all() {
        let dispatch = Scripted::default();
        let exec = executor();
        exec.cancel("prepare");
        let report = exec.execute(&graph(0), &dispatch).unwrap();
        assert!(dispatch.log().is_empty());
        assert_eq!(report.cancelled().count(), 5);
    }

    #[test]
    fn input_errors_are_not_retried() {
        let mut dispatch = Scripted::default();
        dispatch.bad_input.insert("curves_6_9".into());
        let report = executor().execute(&graph(3), &dispatch).unwrap();
        assert_eq!(report.outcome("curves_6_9").unwrap().attempts, 1);
    }

    #[test]
    fn in_process_run_writes_every_curve() {
        let dir = TempDir::new().unwrap();
        let grid = testutil::grid(3, 4);
        let sources = testutil::write_inputs(dir.path(), &grid);
        let out = dir.path().join("out");
        let staged = crate::prepare::staged_artifacts(&sources, &out).unwrap();
        let units = partition(grid.len(), 5, &staged).unwrap();
        let graph = JobGraphBuilder::new("t", StageTemplates::standard("hazmap"), &grid, &out, 4)
            .var("root", dir.path().display())
            .var("max_distance", 200)
            .var("axis", "log")
            .build(&units)
            .unwrap();

        let registry = ModelRegistry::with_builtins();
        let runner = WorkUnitRunner::new(
            HazardAggregator::new(CalcSettings::new(200.0, LevelAxis::Log)),
            &out,
            4,
        );
        let dispatch = InProcessDispatch::new(sources, runner, &registry, 4);
        let report = executor().execute(&graph, &dispatch).unwrap();
        assert!(report.all_succeeded(), "{report:?}");

        let completeness = dispatch.completeness().unwrap();
        assert_eq!(completeness.expected, 12);
        assert!(completeness.is_complete());
        assert!(out.join("inputs/forecast.yaml").exists());
    }

    /// Puts a removed input file back after the first failed prepare.
    struct RestoreAfterFailure<'a> {
        inner: InProcessDispatch<'a>,
        path: std::path::PathBuf,
        contents: Vec<u8>,
        restored: AtomicUsize,
    }

    impl Dispatch for RestoreAfterFailure<'_> {
        fn dispatch(&self, stage: &Stage) -> Result<()> {
            let result = self.inner.dispatch(stage);
            if result.is_err() && stage.kind == StageKind::Prepare {
                self.restored.fetch_add(1, Ordering::SeqCst);
                std::fs::write(&self.path, &self.contents).unwrap();
            }
            result
        }
    }

    #[test]
    fn prepare_retries_after_unreadable_input() {
        let dir = TempDir::new().unwrap();
        let grid = testutil::grid(2, 2);
        let sources = testutil::write_inputs(dir.path(), &grid);
        let out = dir.path().join("out");
        let staged = crate::prepare::staged_artifacts(&sources, &out).unwrap();
        let units = partition(grid.len(), 2, &staged).unwrap();
        let templates = StageTemplates::standard("hazmap").with_retries(3);
        let graph = JobGraphBuilder::new("t", templates, &grid, &out, 4)
            .var("root", dir.path().display())
            .var("max_distance", 200)
            .var("axis", "log")
            .build(&units)
            .unwrap();

        let contents = std::fs::read(&sources.forecast).unwrap();
        std::fs::remove_file(&sources.forecast).unwrap();
        let registry = ModelRegistry::with_builtins();
        let runner = WorkUnitRunner::new(
            HazardAggregator::new(CalcSettings::new(200.0, LevelAxis::Log)),
            &out,
            4,
        );
        let dispatch = RestoreAfterFailure {
            path: sources.forecast.clone(),
            inner: InProcessDispatch::new(sources, runner, &registry, 4),
            contents,
            restored: AtomicUsize::new(0),
        };

        let report = executor().execute(&graph, &dispatch).unwrap();
        let prepare = report.outcome("prepare").unwrap();
        assert!(prepare.succeeded(), "{report:?}");
        assert_eq!(prepare.attempts, 2);
        assert_eq!(dispatch.restored.load(Ordering::SeqCst), 1);
        assert_eq!(report.cancelled().count(), 0);
        assert!(dispatch.inner.completeness().unwrap().is_complete());
    }

    #[test]
    fn compute_without_prepare_fails() {
        let registry = ModelRegistry::with_builtins();
        let runner = WorkUnitRunner::new(
            HazardAggregator::new(CalcSettings::new(200.0, LevelAxis::Log)),
            "/nonexistent",
            4,
        );
        let dispatch = InProcessDispatch::new(UnitArtifacts::default(), runner, &registry, 4);
        let g = graph(0);
        let stage = g.compute_stages().next().unwrap();
        assert!(dispatch.dispatch(stage).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn process_dispatch_reports_exit_status() {
        let mut stage = graph(0).stages[0].clone();
        stage.executable = "sh".into();
        stage.args = vec!["-c".into(), "exit 1".into()];
        let err = ProcessDispatch::default().dispatch(&stage).unwrap_err();
        assert!(!err.is_input_error());

        stage.args = vec!["-c".into(), format!("exit {INPUT_ERROR_EXIT}")];
        let err = ProcessDispatch::default().dispatch(&stage).unwrap_err();
        assert!(err.is_input_error());

        stage.args = vec!["-c".into(), "exit 0".into()];
        ProcessDispatch::default().dispatch(&stage).unwrap();

        stage.executable = "definitely-not-a-hazmap-binary".into();
        let err = ProcessDispatch::default().dispatch(&stage).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[cfg(unix)]
    #[test]
    fn failing_post_hook_fails_the_stage() {
        let stage = graph(0).stages[1].clone();
        assert!(run_shell_hook(&stage, "exit 1").is_err());
        run_shell_hook(&stage, "test \"$HAZMAP_STAGE\" = curves_0_3").unwrap();
    }
}
