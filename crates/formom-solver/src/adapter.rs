use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::glpk::GlpkBackend;
use crate::model::{ConstraintKind, ConstraintRow, SparseModel};
use crate::outcome::{SolveOutcome, SolverStatus, TerminationCondition};
use crate::simplex::Solver;

/// Failure at the solver process boundary. Converted into a not-ok
/// [`SolveOutcome`] by [`SolverAdapter::solve`].
#[derive(Error, Debug)]
pub enum SolverProcessError {
    #[error("Could not start solver {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Solver I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Solver timed out after {0:?}")]
    Timeout(Duration),
    #[error("Solver exited with {0}")]
    ExitStatus(String),
    #[error("Could not read solver output: {0}")]
    Parse(String),
}

/// What a backend reports for one solve
#[derive(Debug, Clone, PartialEq)]
pub struct RawSolution {
    pub status: SolverStatus,
    pub termination: TerminationCondition,
    /// Primal values in model variable order, when the solver produced a point
    pub primal: Option<Vec<f64>>,
    /// Row duals in model row order (LE, GE, EQ), when available
    pub duals: Option<Vec<f64>>,
    pub message: Option<String>,
}

impl RawSolution {
    /// A solve that ended without a point
    pub fn without_point(
        status: SolverStatus,
        termination: TerminationCondition,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            termination,
            primal: None,
            duals: None,
            message: Some(message.into()),
        }
    }
}

/// An LP solver that can be handed a [`SparseModel`].
///
/// Implementations must not keep state between calls, so one backend can be
/// shared by independent solves.
pub trait SolverBackend: Send + Sync {
    /// Fixed identifier of the solver
    fn name(&self) -> &'static str;

    fn solve(&self, model: &SparseModel) -> Result<RawSolution, SolverProcessError>;
}

/// Solver identifiers understood by [`SolverAdapter::from_options`]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverKind {
    /// In-process two-phase simplex
    #[default]
    Simplex,
    /// GLPK's `glpsol` run as a child process
    Glpk,
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverKind::Simplex => f.write_str("simplex"),
            SolverKind::Glpk => f.write_str("glpk"),
        }
    }
}

impl FromStr for SolverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simplex" => Ok(SolverKind::Simplex),
            "glpk" | "glpsol" => Ok(SolverKind::Glpk),
            other => Err(format!("unknown solver: {}", other)),
        }
    }
}

/// Backend settings
#[derive(Debug, Clone)]
pub struct SolverOptions {
    pub kind: SolverKind,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub glpsol_path: PathBuf,
    pub timeout: Duration,
    pub track_duals: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            kind: SolverKind::Simplex,
            max_iterations: 10000,
            tolerance: 1e-9,
            glpsol_path: PathBuf::from("glpsol"),
            timeout: Duration::from_secs(300),
            track_duals: true,
        }
    }
}

/// A model after a solve call: the model itself plus whatever the solver
/// reported. All access is read-only.
#[derive(Debug, Clone)]
pub struct SolvedInstance {
    model: SparseModel,
    primal: Option<Vec<f64>>,
    duals: Option<IndexMap<String, f64>>,
}

impl SolvedInstance {
    fn new(model: SparseModel, raw: &RawSolution) -> Self {
        let primal = raw
            .primal
            .clone()
            .filter(|values| values.len() == model.num_variables());

        // Duals are only imported through the suffix
        let duals = match (&raw.duals, model.has_dual_suffix()) {
            (Some(duals), true) if duals.len() == model.num_constraints() => Some(
                model
                    .rows()
                    .zip(duals)
                    .map(|(row, &dual)| (row.kind.dual_key(&row.name), dual))
                    .collect(),
            ),
            _ => None,
        };

        Self { model, primal, duals }
    }

    pub fn model(&self) -> &SparseModel {
        &self.model
    }

    pub fn has_point(&self) -> bool {
        self.primal.is_some()
    }

    /// Primal value of a variable
    pub fn value(&self, variable: &str) -> Option<f64> {
        let j = self.model.variable_index(variable)?;
        self.primal.as_ref().map(|values| values[j])
    }

    /// Variable name -> primal value, in model order
    pub fn values(&self) -> Option<impl Iterator<Item = (&str, f64)>> {
        let primal = self.primal.as_ref()?;
        Some(self.model.variables().zip(primal.iter().copied()))
    }

    /// Dual values keyed `Family[constraint]`; `None` unless the dual
    /// suffix was attached and the solver produced duals
    pub fn duals(&self) -> Option<&IndexMap<String, f64>> {
        self.duals.as_ref()
    }

    pub fn objective_value(&self) -> Option<f64> {
        let primal = self.primal.as_ref()?;
        Some(
            self.model
                .objective_dense()
                .iter()
                .zip(primal)
                .map(|(c, x)| c * x)
                .sum(),
        )
    }

    /// Row body minus its lower bound (GE rows)
    pub fn lower_slack(&self, row: &ConstraintRow) -> Option<f64> {
        match row.kind {
            ConstraintKind::Ge => self.body(row).map(|body| body - row.rhs),
            ConstraintKind::Eq => Some(0.0),
            ConstraintKind::Le => None,
        }
    }

    /// Upper bound minus row body (LE rows)
    pub fn upper_slack(&self, row: &ConstraintRow) -> Option<f64> {
        match row.kind {
            ConstraintKind::Le => self.body(row).map(|body| row.rhs - body),
            ConstraintKind::Eq => Some(0.0),
            ConstraintKind::Ge => None,
        }
    }

    fn body(&self, row: &ConstraintRow) -> Option<f64> {
        let primal = self.primal.as_ref()?;
        Some(self.model.row_body(row, primal))
    }
}

/// Runs a [`SparseModel`] through a solver backend without letting process
/// failures escape
pub struct SolverAdapter {
    backend: Box<dyn SolverBackend>,
    track_duals: bool,
}

impl SolverAdapter {
    pub fn new(kind: SolverKind) -> Self {
        Self::from_options(&SolverOptions {
            kind,
            ..SolverOptions::default()
        })
    }

    pub fn from_options(options: &SolverOptions) -> Self {
        let backend: Box<dyn SolverBackend> = match options.kind {
            SolverKind::Simplex => Box::new(
                Solver::new()
                    .with_max_iterations(options.max_iterations)
                    .with_tolerance(options.tolerance),
            ),
            SolverKind::Glpk => Box::new(
                GlpkBackend::new(options.glpsol_path.clone()).with_timeout(options.timeout),
            ),
        };
        Self {
            backend,
            track_duals: options.track_duals,
        }
    }

    pub fn with_backend(backend: impl SolverBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            track_duals: true,
        }
    }

    /// Solve without attaching the dual suffix; shadow price extraction on
    /// the result fails
    pub fn without_duals(mut self) -> Self {
        self.track_duals = false;
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Solve synchronously. Always returns an outcome; callers must check it
    /// before reading values from the instance.
    pub fn solve(&self, mut model: SparseModel) -> (SolveOutcome, SolvedInstance) {
        if self.track_duals {
            model.attach_dual_suffix();
        }

        debug!(
            solver = self.backend.name(),
            variables = model.num_variables(),
            constraints = model.num_constraints(),
            "Solving model"
        );

        let raw = match self.backend.solve(&model) {
            Ok(raw) => raw,
            Err(e) => {
                error!(solver = self.backend.name(), error = %e, "Solver process failed");
                RawSolution::without_point(SolverStatus::Error, TerminationCondition::Other, e.to_string())
            }
        };

        let outcome = SolveOutcome {
            status: raw.status,
            termination: raw.termination,
            message: raw.message.clone(),
        };
        info!(
            solver = self.backend.name(),
            status = %outcome.status,
            termination = %outcome.termination,
            "Solved"
        );

        (outcome, SolvedInstance::new(model, &raw))
    }
}
