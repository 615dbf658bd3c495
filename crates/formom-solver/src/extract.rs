//! Read-only extraction of named quantities from a solved instance.
//!
//! Callers must check [`SolveOutcome::is_optimal`] first; these functions only
//! guard against handles that carry no point or no duals at all.

use indexmap::IndexMap;
use thiserror::Error;

use crate::adapter::SolvedInstance;
use crate::model::{is_internal, ConstraintKind};
use crate::outcome::SolveOutcome;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Dual values were not requested before solving")]
    DualsUnavailable,
    #[error("Solved instance has no primal solution")]
    NoSolution,
}

/// Variable name -> primal value
pub fn variable_values(instance: &SolvedInstance, hide_internal: bool) -> Result<IndexMap<String, f64>, ExtractError> {
    let values = instance.values().ok_or(ExtractError::NoSolution)?;
    Ok(values
        .filter(|(name, _)| !(hide_internal && is_internal(name)))
        .map(|(name, value)| (name.to_string(), value))
        .collect())
}

/// Constraint name -> dual value, with the `Family[...]` wrapper removed
pub fn shadow_prices(instance: &SolvedInstance, hide_internal: bool) -> Result<IndexMap<String, f64>, ExtractError> {
    if !instance.model().has_dual_suffix() {
        return Err(ExtractError::DualsUnavailable);
    }
    let duals = instance.duals().ok_or(ExtractError::NoSolution)?;
    Ok(duals
        .iter()
        .filter(|(key, _)| !(hide_internal && is_internal(key)))
        .map(|(key, &dual)| (strip_family(key).to_string(), dual))
        .collect())
}

/// GE constraint name -> distance above its lower bound
pub fn slack_ge(instance: &SolvedInstance, hide_internal: bool) -> Result<IndexMap<String, f64>, ExtractError> {
    family_slack(instance, ConstraintKind::Ge, hide_internal)
}

/// LE constraint name -> distance below its upper bound
pub fn slack_le(instance: &SolvedInstance, hide_internal: bool) -> Result<IndexMap<String, f64>, ExtractError> {
    family_slack(instance, ConstraintKind::Le, hide_internal)
}

fn family_slack(
    instance: &SolvedInstance,
    kind: ConstraintKind,
    hide_internal: bool,
) -> Result<IndexMap<String, f64>, ExtractError> {
    instance
        .model()
        .constraints(kind)
        .filter(|row| !(hide_internal && is_internal(&row.name)))
        .map(|row| {
            let slack = match kind {
                ConstraintKind::Ge => instance.lower_slack(row),
                _ => instance.upper_slack(row),
            };
            slack.map(|s| (row.name.clone(), s)).ok_or(ExtractError::NoSolution)
        })
        .collect()
}

/// `GEConstraint[stand_12]` -> `stand_12`; keys without a wrapper pass through
pub fn strip_family(key: &str) -> &str {
    key.split_once('[')
        .and_then(|(_, rest)| rest.strip_suffix(']'))
        .unwrap_or(key)
}

/// Named quantities of one optimal run
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    /// Present only for optimal runs
    pub objective_value: Option<f64>,
    pub variables: IndexMap<String, f64>,
    pub shadow_prices: IndexMap<String, f64>,
    pub slack_ge: IndexMap<String, f64>,
    pub slack_le: IndexMap<String, f64>,
}

impl RunResult {
    /// Extract every reporting view, hiding internal names
    pub fn extract(outcome: &SolveOutcome, instance: &SolvedInstance) -> Result<Self, ExtractError> {
        Ok(Self {
            objective_value: if outcome.is_optimal() {
                instance.objective_value()
            } else {
                None
            },
            variables: variable_values(instance, true)?,
            shadow_prices: shadow_prices(instance, true)?,
            slack_ge: slack_ge(instance, true)?,
            slack_le: slack_le(instance, true)?,
        })
    }
}
