use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Whether the solver finished normally with a usable point
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SolverStatus {
    /// The solver ran to completion and produced a point
    Ok,
    /// The solver failed, could not be reached, or proved there is no usable point
    Error,
}

/// How the solver stopped
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationCondition {
    Optimal,
    Infeasible,
    Unbounded,
    /// Iteration limit, process failure, or anything else
    Other,
}

/// Result classification of a single solve call. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    pub status: SolverStatus,
    pub termination: TerminationCondition,
    /// Diagnostic from the solver or the process boundary
    pub message: Option<String>,
}

impl SolveOutcome {
    pub fn new(status: SolverStatus, termination: TerminationCondition) -> Self {
        Self {
            status,
            termination,
            message: None,
        }
    }

    pub fn optimal() -> Self {
        Self::new(SolverStatus::Ok, TerminationCondition::Optimal)
    }

    /// Outcome for a solve that never produced solver output
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: SolverStatus::Error,
            termination: TerminationCondition::Other,
            message: Some(message.into()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.status, SolverStatus::Ok)
    }

    /// Only an optimal outcome may have its values read
    pub fn is_optimal(&self) -> bool {
        matches!(
            (self.status, self.termination),
            (SolverStatus::Ok, TerminationCondition::Optimal)
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unrecognised solver outcome: {0}")]
pub struct ParseOutcomeError(pub String);

impl fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverStatus::Ok => f.write_str("ok"),
            SolverStatus::Error => f.write_str("error"),
        }
    }
}

impl FromStr for SolverStatus {
    type Err = ParseOutcomeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(SolverStatus::Ok),
            "error" => Ok(SolverStatus::Error),
            other => Err(ParseOutcomeError(other.to_string())),
        }
    }
}

impl fmt::Display for TerminationCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerminationCondition::Optimal => "optimal",
            TerminationCondition::Infeasible => "infeasible",
            TerminationCondition::Unbounded => "unbounded",
            TerminationCondition::Other => "other",
        };
        f.write_str(s)
    }
}

impl FromStr for TerminationCondition {
    type Err = ParseOutcomeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "optimal" => Ok(TerminationCondition::Optimal),
            "infeasible" => Ok(TerminationCondition::Infeasible),
            "unbounded" => Ok(TerminationCondition::Unbounded),
            "other" => Ok(TerminationCondition::Other),
            other => Err(ParseOutcomeError(other.to_string())),
        }
    }
}
