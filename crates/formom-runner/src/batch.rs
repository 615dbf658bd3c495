use std::path::Path;

use formom_solver::{RunResult, SolveOutcome, SolvedInstance, SolverAdapter, SolverStatus, TerminationCondition};
use tracing::{error, info, warn};

use crate::input::ModelInput;

/// Where a run's data comes from
#[derive(Debug, Clone)]
pub enum RunSource {
    /// Input that passed upstream validation
    Ready(ModelInput),
    /// Input rejected upstream, with the reason; never built or solved
    Rejected(String),
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Run name, usually the objective file name
    pub name: String,
    pub source: RunSource,
}

impl RunRequest {
    pub fn new(name: impl Into<String>, input: ModelInput) -> Self {
        Self {
            name: name.into(),
            source: RunSource::Ready(input),
        }
    }

    pub fn rejected(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: RunSource::Rejected(reason.into()),
        }
    }
}

/// Terminal state of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Rejected upstream; no build or solve attempted
    Skipped,
    SolvedOptimal,
    /// Solver finished with status ok but without proving optimality
    SolvedNonOptimal,
    /// Model build failed or the solver reported a not-ok status
    Failed,
}

#[derive(Debug, Clone)]
pub struct RunRecord {
    pub name: String,
    pub state: RunState,
    /// The solved model; absent when no solve was attempted
    pub instance: Option<SolvedInstance>,
    pub outcome: SolveOutcome,
    /// Present only for optimal runs
    pub result: Option<RunResult>,
}

impl RunRecord {
    /// Run name without its file extension
    pub fn base_name(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.name)
    }

    pub fn objective_value(&self) -> Option<f64> {
        self.result.as_ref().and_then(|r| r.objective_value)
    }
}

/// Ordered record of every run in a batch, one entry per requested name
#[derive(Debug, Clone, Default)]
pub struct RunManifest {
    records: Vec<RunRecord>,
}

impl RunManifest {
    pub fn iter(&self) -> impl Iterator<Item = &RunRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&RunRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.name.as_str())
    }

    /// Partition run names by solver status, independent of optimality
    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for record in &self.records {
            let entry = (record.name.clone(), record.outcome.termination);
            match record.outcome.status {
                SolverStatus::Ok => summary.successful.push(entry),
                SolverStatus::Error => summary.failed.push(entry),
            }
        }
        summary
    }
}

impl<'a> IntoIterator for &'a RunManifest {
    type Item = &'a RunRecord;
    type IntoIter = std::slice::Iter<'a, RunRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Run names split by solver status, each with its termination condition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub successful: Vec<(String, TerminationCondition)>,
    pub failed: Vec<(String, TerminationCondition)>,
}

/// Runs objective variants one after another through a single adapter
pub struct BatchRunner {
    adapter: SolverAdapter,
}

impl BatchRunner {
    pub fn new(adapter: SolverAdapter) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &SolverAdapter {
        &self.adapter
    }

    /// Run every request in order. A failing run never stops the batch.
    pub fn run(&self, requests: impl IntoIterator<Item = RunRequest>) -> RunManifest {
        let records: Vec<RunRecord> = requests.into_iter().map(|r| self.run_one(r)).collect();

        let optimal = records.iter().filter(|r| r.state == RunState::SolvedOptimal).count();
        info!(runs = records.len(), optimal, "Batch finished");

        RunManifest { records }
    }

    pub fn run_one(&self, request: RunRequest) -> RunRecord {
        let RunRequest { name, source } = request;

        let input = match source {
            RunSource::Ready(input) => input,
            RunSource::Rejected(reason) => {
                warn!(run = %name, %reason, "Skipping rejected run");
                return RunRecord {
                    name,
                    state: RunState::Skipped,
                    instance: None,
                    outcome: SolveOutcome::failed(format!("Skipped: {}", reason)),
                    result: None,
                };
            }
        };

        let model = match input.build() {
            Ok(model) => model,
            Err(e) => {
                warn!(run = %name, error = %e, "Model build failed");
                return RunRecord {
                    name,
                    state: RunState::Failed,
                    instance: None,
                    outcome: SolveOutcome::failed(format!("Model build failed: {}", e)),
                    result: None,
                };
            }
        };

        let (outcome, instance) = self.adapter.solve(model);

        let (state, outcome, result) = if outcome.is_optimal() {
            match RunResult::extract(&outcome, &instance) {
                Ok(result) => (RunState::SolvedOptimal, outcome, Some(result)),
                Err(e) => {
                    error!(run = %name, error = %e, "Result extraction failed");
                    let outcome = SolveOutcome::new(SolverStatus::Error, outcome.termination)
                        .with_message(format!("Result extraction failed: {}", e));
                    (RunState::Failed, outcome, None)
                }
            }
        } else if outcome.is_ok() {
            (RunState::SolvedNonOptimal, outcome, None)
        } else {
            (RunState::Failed, outcome, None)
        };

        info!(
            run = %name,
            state = ?state,
            termination = %outcome.termination,
            objective = ?result.as_ref().and_then(|r| r.objective_value),
            "Run complete"
        );

        RunRecord {
            name,
            state,
            instance: Some(instance),
            outcome,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::ConstraintSpec;
    use formom_solver::{ConstraintKind, SolverKind};

    fn spec(kind: ConstraintKind, name: &str, row: &[(&str, f64)], rhs: f64) -> ConstraintSpec {
        ConstraintSpec {
            kind,
            name: name.to_string(),
            row: row.iter().map(|&(k, v)| (k.to_string(), v)).collect(),
            rhs,
        }
    }

    fn objective(terms: &[(&str, f64)]) -> indexmap::IndexMap<String, f64> {
        terms.iter().map(|&(k, v)| (k.to_string(), v)).collect()
    }

    fn runner() -> BatchRunner {
        BatchRunner::new(SolverAdapter::new(SolverKind::Simplex))
    }

    fn feasible(name: &str, coef: f64) -> RunRequest {
        RunRequest::new(
            name,
            ModelInput::new(
                objective(&[("x", coef), ("y", 1.0)]),
                vec![spec(ConstraintKind::Le, "cap", &[("x", 1.0), ("y", 1.0)], 5.0)],
            ),
        )
    }

    fn infeasible(name: &str) -> RunRequest {
        RunRequest::new(
            name,
            ModelInput::new(
                objective(&[("x", 1.0)]),
                vec![
                    spec(ConstraintKind::Ge, "lo", &[("x", 1.0)], 5.0),
                    spec(ConstraintKind::Le, "hi", &[("x", 1.0)], 3.0),
                ],
            ),
        )
    }

    #[test]
    fn test_trivial_run() {
        let record = runner().run_one(RunRequest::new(
            "trivial.json",
            ModelInput::new(
                objective(&[("x", 1.0)]),
                vec![spec(ConstraintKind::Le, "x_cap", &[("x", 1.0)], 5.0)],
            ),
        ));

        assert_eq!(record.state, RunState::SolvedOptimal);
        assert_eq!(record.outcome.status, SolverStatus::Ok);
        assert_eq!(record.outcome.termination, TerminationCondition::Optimal);
        let result = record.result.as_ref().unwrap();
        assert!((result.variables["x"] - 5.0).abs() < 1e-9);
        assert!((result.objective_value.unwrap() - 5.0).abs() < 1e-9);
        assert!(result.slack_le["x_cap"].abs() < 1e-9);
        assert_eq!(record.base_name(), "trivial");
    }

    #[test]
    fn test_failures_are_isolated() {
        let requests = vec![
            feasible("a.json", 2.0),
            infeasible("b.json"),
            feasible("c.json", 0.5),
            infeasible("d.json"),
            feasible("e.json", 1.0),
        ];

        let manifest = runner().run(requests);

        assert_eq!(manifest.len(), 5);
        assert_eq!(
            manifest.names().collect::<Vec<_>>(),
            vec!["a.json", "b.json", "c.json", "d.json", "e.json"]
        );

        let summary = manifest.summary();
        assert_eq!(summary.successful.len(), 3);
        assert_eq!(summary.failed.len(), 2);
        assert_eq!(
            summary.failed,
            vec![
                ("b.json".to_string(), TerminationCondition::Infeasible),
                ("d.json".to_string(), TerminationCondition::Infeasible),
            ]
        );

        let b = manifest.get("b.json").unwrap();
        assert_eq!(b.state, RunState::Failed);
        assert!(b.result.is_none());
        assert!(b.instance.is_some());
    }

    #[test]
    fn test_build_failure_and_rejected_runs() {
        let bad = RunRequest::new(
            "bad.json",
            ModelInput::new(
                objective(&[("x", 1.0)]),
                vec![spec(ConstraintKind::Le, "cap", &[("ghost", 1.0)], 1.0)],
            ),
        );
        let requests = vec![bad, RunRequest::rejected("lint.json", "missing header"), feasible("ok.json", 1.0)];

        let manifest = runner().run(requests);

        let bad = manifest.get("bad.json").unwrap();
        assert_eq!(bad.state, RunState::Failed);
        assert!(bad.instance.is_none());
        assert!(bad.outcome.message.as_ref().unwrap().contains("ghost"));

        let lint = manifest.get("lint.json").unwrap();
        assert_eq!(lint.state, RunState::Skipped);
        assert_eq!(lint.outcome.termination, TerminationCondition::Other);

        assert_eq!(manifest.get("ok.json").unwrap().state, RunState::SolvedOptimal);
        assert_eq!(manifest.summary().failed.len(), 2);
    }

    #[test]
    fn test_track_duals_off_from_config() {
        let config = crate::config::RunnerConfig::parse("[solver]\ntrack_duals = false\n").unwrap();
        let runner = BatchRunner::new(SolverAdapter::from_options(&config.solver.options()));

        let record = runner.run_one(feasible("nodual.json", 1.0));

        // The solve itself succeeds; asking for shadow prices does not
        assert_eq!(record.outcome.termination, TerminationCondition::Optimal);
        assert_eq!(record.state, RunState::Failed);
        assert!(record.result.is_none());
        let instance = record.instance.as_ref().unwrap();
        assert!(!instance.model().has_dual_suffix());
        assert!(instance.duals().is_none());
        assert_eq!(
            formom_solver::extract::shadow_prices(instance, true),
            Err(formom_solver::ExtractError::DualsUnavailable)
        );
        assert!(record.outcome.message.as_ref().unwrap().contains("not requested"));
    }

    #[test]
    fn test_non_optimal_keeps_outcome_without_result() {
        let adapter = SolverAdapter::with_backend(formom_solver::Solver::new().with_max_iterations(1));
        let request = RunRequest::new(
            "limited.json",
            ModelInput::new(
                objective(&[("x", 3.0), ("y", 2.0)]),
                vec![
                    spec(ConstraintKind::Le, "sum", &[("x", 1.0), ("y", 1.0)], 4.0),
                    spec(ConstraintKind::Le, "x_max", &[("x", 1.0)], 3.0),
                ],
            ),
        );

        let manifest = BatchRunner::new(adapter).run([request]);
        let record = manifest.get("limited.json").unwrap();

        assert_eq!(record.state, RunState::SolvedNonOptimal);
        assert!(record.result.is_none());
        assert_eq!(manifest.summary().successful.len(), 1);
    }
}
