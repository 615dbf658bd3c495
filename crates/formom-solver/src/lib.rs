mod adapter;
pub mod extract;
mod glpk;
mod model;
mod outcome;
mod simplex;

pub use adapter::{
    RawSolution, SolvedInstance, SolverAdapter, SolverBackend, SolverKind, SolverOptions, SolverProcessError,
};
pub use extract::{ExtractError, RunResult};
pub use glpk::{parse_solution, write_lp, GlpkBackend};
pub use model::{is_internal, ConstraintKind, ConstraintRow, ModelError, SparseModel, INTERNAL_MARKER};
pub use outcome::{ParseOutcomeError, SolveOutcome, SolverStatus, TerminationCondition};
pub use simplex::Solver;
