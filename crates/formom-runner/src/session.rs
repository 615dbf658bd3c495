//! Load → run → export as explicit state transitions.
//!
//! Every action consumes the previous [`Session`] and returns the next one,
//! so no step can see or change state that belongs to another.

use std::path::Path;

use thiserror::Error;

use crate::batch::{BatchRunner, RunManifest, RunRequest};
use crate::export::Exporter;
use crate::report;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Nothing to {action}: no models are {needed}")]
    WrongStage { action: &'static str, needed: &'static str },
    #[error("Single mode takes exactly one objective, got {0}")]
    SingleModeCount(usize),
    #[error("No objectives were given")]
    NothingLoaded,
}

/// One objective file or a folder of them. Drives both behaviour and labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Single,
    Many,
}

impl RunMode {
    pub fn objective_label(self) -> &'static str {
        match self {
            RunMode::Single => "Objective file",
            RunMode::Many => "Objectives folder",
        }
    }

    pub fn run_label(self) -> &'static str {
        match self {
            RunMode::Single => "Run model",
            RunMode::Many => "Run all models",
        }
    }

    pub fn save_label(self) -> &'static str {
        match self {
            RunMode::Single => "Save output to file",
            RunMode::Many => "Save output to folder",
        }
    }
}

#[derive(Debug)]
pub enum Session {
    Empty {
        mode: RunMode,
    },
    Loaded {
        mode: RunMode,
        requests: Vec<RunRequest>,
        status: String,
    },
    Solved {
        mode: RunMode,
        manifest: RunManifest,
        status: String,
    },
}

impl Session {
    pub fn new(mode: RunMode) -> Self {
        Session::Empty { mode }
    }

    pub fn mode(&self) -> RunMode {
        match self {
            Session::Empty { mode } | Session::Loaded { mode, .. } | Session::Solved { mode, .. } => *mode,
        }
    }

    /// Switching mode discards anything loaded or solved
    pub fn with_mode(self, mode: RunMode) -> Session {
        if self.mode() == mode {
            self
        } else {
            Session::Empty { mode }
        }
    }

    /// Replace whatever was loaded or solved with new inputs. A refused load
    /// hands the current session back unchanged.
    pub fn load(self, requests: Vec<RunRequest>) -> Result<Session, (Session, SessionError)> {
        let mode = self.mode();
        if requests.is_empty() {
            return Err((self, SessionError::NothingLoaded));
        }
        if mode == RunMode::Single && requests.len() != 1 {
            return Err((self, SessionError::SingleModeCount(requests.len())));
        }
        let status = report::status_load(&requests);
        Ok(Session::Loaded { mode, requests, status })
    }

    pub fn run(self, runner: &BatchRunner) -> Result<Session, (Session, SessionError)> {
        let (mode, requests) = match self {
            Session::Loaded { mode, requests, .. } => (mode, requests),
            other => {
                let error = SessionError::WrongStage {
                    action: "run",
                    needed: "loaded",
                };
                return Err((other, error));
            }
        };

        let manifest = runner.run(requests);
        let status = match (mode, manifest.iter().next()) {
            (RunMode::Single, Some(record)) => report::status_run_single(record),
            _ => report::status_run_many(&manifest),
        };
        Ok(Session::Solved { mode, manifest, status })
    }

    /// Export the solved runs; returns the exporter's count (or -1) and a
    /// status message. The session itself is unchanged.
    pub fn export(&self, exporter: &Exporter, root: &Path) -> Result<(i64, String), SessionError> {
        let Session::Solved { manifest, .. } = self else {
            return Err(SessionError::WrongStage {
                action: "export",
                needed: "solved",
            });
        };
        let written = exporter.export_count(manifest, root);
        Ok((written, report::status_save(root, written)))
    }

    pub fn status(&self) -> &str {
        match self {
            Session::Empty { .. } => "",
            Session::Loaded { status, .. } | Session::Solved { status, .. } => status,
        }
    }

    pub fn manifest(&self) -> Option<&RunManifest> {
        match self {
            Session::Solved { manifest, .. } => Some(manifest),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{ExportFormat, EXPORT_FAILED};
    use crate::input::{ConstraintSpec, ModelInput};
    use formom_solver::{ConstraintKind, SolverAdapter, SolverKind};

    fn request(name: &str) -> RunRequest {
        RunRequest::new(
            name,
            ModelInput::new(
                [("x".to_string(), 1.0)].into_iter().collect(),
                vec![ConstraintSpec {
                    kind: ConstraintKind::Le,
                    name: "cap".to_string(),
                    row: [("x".to_string(), 1.0)].into_iter().collect(),
                    rhs: 5.0,
                }],
            ),
        )
    }

    fn runner() -> BatchRunner {
        BatchRunner::new(SolverAdapter::new(SolverKind::Simplex))
    }

    #[test]
    fn test_full_transition_chain() {
        let session = Session::new(RunMode::Many);
        let session = session.load(vec![request("a.json"), request("b.json")]).unwrap();
        assert!(session.status().contains("Loaded 2 of 2"));

        let session = session.run(&runner()).unwrap();
        assert_eq!(session.manifest().unwrap().len(), 2);
        assert!(session.status().contains("2 successful, 0 failed"));

        let root = tempfile::tempdir().unwrap();
        let (written, status) = session
            .export(&Exporter::new(ExportFormat::Text), root.path())
            .unwrap();
        assert_eq!(written, 2);
        assert!(status.contains("Saved 2 runs"));
    }

    #[test]
    fn test_single_mode_requires_one_objective() {
        let (_, err) = Session::new(RunMode::Single)
            .load(vec![request("a.json"), request("b.json")])
            .unwrap_err();
        assert_eq!(err, SessionError::SingleModeCount(2));

        let solved = Session::new(RunMode::Single)
            .load(vec![request("a.json")])
            .unwrap()
            .run(&runner())
            .unwrap();
        assert!(solved.status().contains("Ran a.json"));
    }

    #[test]
    fn test_out_of_order_actions() {
        let (session, err) = Session::new(RunMode::Many).run(&runner()).unwrap_err();
        assert!(matches!(err, SessionError::WrongStage { action: "run", .. }));
        assert!(matches!(session, Session::Empty { mode: RunMode::Many }));

        let loaded = Session::new(RunMode::Many).load(vec![request("a.json")]).unwrap();
        let root = tempfile::tempdir().unwrap();
        assert!(loaded.export(&Exporter::new(ExportFormat::Text), root.path()).is_err());
    }

    #[test]
    fn test_refused_load_keeps_solved_runs() {
        let solved = Session::new(RunMode::Many)
            .load(vec![request("a.json"), request("b.json")])
            .unwrap()
            .run(&runner())
            .unwrap();
        let status = solved.status().to_string();

        let (session, err) = solved.load(Vec::new()).unwrap_err();

        assert_eq!(err, SessionError::NothingLoaded);
        assert_eq!(session.manifest().unwrap().len(), 2);
        assert_eq!(session.status(), status);

        // A solved session cannot be run again, and stays solved
        let (session, _) = session.run(&runner()).unwrap_err();
        assert!(session.manifest().is_some());
    }

    #[test]
    fn test_mode_switch_resets() {
        let loaded = Session::new(RunMode::Many).load(vec![request("a.json")]).unwrap();

        let same = loaded.with_mode(RunMode::Many);
        assert!(matches!(same, Session::Loaded { .. }));

        let switched = same.with_mode(RunMode::Single);
        assert!(matches!(switched, Session::Empty { mode: RunMode::Single }));
        assert_eq!(switched.mode().run_label(), "Run model");
        assert_eq!(RunMode::Many.objective_label(), "Objectives folder");
    }

    #[test]
    fn test_export_to_missing_directory() {
        let solved = Session::new(RunMode::Single)
            .load(vec![request("a.json")])
            .unwrap()
            .run(&runner())
            .unwrap();
        let root = tempfile::tempdir().unwrap();

        let (written, status) = solved
            .export(&Exporter::new(ExportFormat::Text), &root.path().join("missing"))
            .unwrap();

        assert_eq!(written, EXPORT_FAILED);
        assert!(status.contains("Could not save"));
    }
}
