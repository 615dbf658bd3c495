use std::fmt;

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

/// Names containing this marker are solver bookkeeping and never reported
pub const INTERNAL_MARKER: &str = "dummy";

/// Whether a variable or constraint name denotes solver bookkeeping
pub fn is_internal(name: &str) -> bool {
    name.contains(INTERNAL_MARKER)
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Row {row} references undeclared variable {variable}")]
    MalformedModel { row: String, variable: String },
    #[error("Duplicate {kind} constraint name: {name}")]
    DuplicateName { kind: ConstraintKind, name: String },
    #[error("Duplicate variable name: {0}")]
    DuplicateVariable(String),
}

/// The three constraint families of a standard-form LP
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    /// Less than or equal (<=)
    Le,
    /// Greater than or equal (>=)
    Ge,
    /// Equal (=)
    Eq,
}

impl ConstraintKind {
    pub const ALL: [ConstraintKind; 3] = [ConstraintKind::Le, ConstraintKind::Ge, ConstraintKind::Eq];

    /// Name of the indexed constraint family, used to key dual values
    pub fn family(self) -> &'static str {
        match self {
            ConstraintKind::Le => "LEConstraint",
            ConstraintKind::Ge => "GEConstraint",
            ConstraintKind::Eq => "EQConstraint",
        }
    }

    /// Dual key for a constraint of this family, e.g. `LEConstraint[area_2021]`
    pub fn dual_key(self, name: &str) -> String {
        format!("{}[{}]", self.family(), name)
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConstraintKind::Le => "LE",
            ConstraintKind::Ge => "GE",
            ConstraintKind::Eq => "EQ",
        };
        f.write_str(s)
    }
}

/// A named constraint row with sparse coefficients
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintRow {
    /// Constraint name, unique within its family
    pub name: String,
    pub kind: ConstraintKind,
    /// Variable name -> coefficient; omitted variables have coefficient 0
    pub coefficients: IndexMap<String, f64>,
    /// Right-hand side value
    pub rhs: f64,
}

/// A maximize LP over non-negative variables with LE, GE and EQ families
#[derive(Debug, Clone, Default)]
pub struct SparseModel {
    variables: IndexSet<String>,
    objective: IndexMap<String, f64>,
    le: IndexMap<String, ConstraintRow>,
    ge: IndexMap<String, ConstraintRow>,
    eq: IndexMap<String, ConstraintRow>,
    dual_suffix: bool,
}

impl SparseModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(&mut self, name: impl Into<String>) -> Result<(), ModelError> {
        let name = name.into();
        if self.variables.contains(&name) {
            return Err(ModelError::DuplicateVariable(name));
        }
        self.variables.insert(name);
        Ok(())
    }

    /// Replace the objective. Every key must be a declared variable; on error
    /// the previous objective is kept.
    pub fn set_objective<I, S>(&mut self, coefficients: I) -> Result<(), ModelError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let coefficients = self.checked_row("objective", coefficients)?;
        self.objective = coefficients;
        Ok(())
    }

    /// Add a constraint row. Fails without touching the model if the row
    /// references an undeclared variable or reuses a name within its family.
    pub fn add_constraint<I, S>(
        &mut self,
        kind: ConstraintKind,
        name: impl Into<String>,
        coefficients: I,
        rhs: f64,
    ) -> Result<(), ModelError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let name = name.into();
        if self.family(kind).contains_key(&name) {
            return Err(ModelError::DuplicateName { kind, name });
        }
        let coefficients = self.checked_row(&name, coefficients)?;
        let row = ConstraintRow {
            name: name.clone(),
            kind,
            coefficients,
            rhs,
        };
        self.family_mut(kind).insert(name, row);
        Ok(())
    }

    fn checked_row<I, S>(&self, row: &str, coefficients: I) -> Result<IndexMap<String, f64>, ModelError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut checked = IndexMap::new();
        for (variable, coef) in coefficients {
            let variable = variable.into();
            if !self.variables.contains(&variable) {
                return Err(ModelError::MalformedModel {
                    row: row.to_string(),
                    variable,
                });
            }
            checked.insert(variable, coef);
        }
        Ok(checked)
    }

    fn family(&self, kind: ConstraintKind) -> &IndexMap<String, ConstraintRow> {
        match kind {
            ConstraintKind::Le => &self.le,
            ConstraintKind::Ge => &self.ge,
            ConstraintKind::Eq => &self.eq,
        }
    }

    fn family_mut(&mut self, kind: ConstraintKind) -> &mut IndexMap<String, ConstraintRow> {
        match kind {
            ConstraintKind::Le => &mut self.le,
            ConstraintKind::Ge => &mut self.ge,
            ConstraintKind::Eq => &mut self.eq,
        }
    }

    /// Attach the dual import/export suffix so a solve also reports row duals
    pub fn attach_dual_suffix(&mut self) {
        self.dual_suffix = true;
    }

    pub fn has_dual_suffix(&self) -> bool {
        self.dual_suffix
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(String::as_str)
    }

    pub fn variable_index(&self, name: &str) -> Option<usize> {
        self.variables.get_index_of(name)
    }

    pub fn objective_coefficient(&self, name: &str) -> f64 {
        self.objective.get(name).copied().unwrap_or(0.0)
    }

    /// Objective coefficients in variable order, absent terms as 0
    pub fn objective_dense(&self) -> Vec<f64> {
        self.variables
            .iter()
            .map(|v| self.objective_coefficient(v))
            .collect()
    }

    pub fn constraints(&self, kind: ConstraintKind) -> impl Iterator<Item = &ConstraintRow> {
        self.family(kind).values()
    }

    pub fn constraint(&self, kind: ConstraintKind, name: &str) -> Option<&ConstraintRow> {
        self.family(kind).get(name)
    }

    /// All rows in solver order: LE family, then GE, then EQ
    pub fn rows(&self) -> impl Iterator<Item = &ConstraintRow> {
        self.le.values().chain(self.ge.values()).chain(self.eq.values())
    }

    /// Row coefficients in variable order
    pub fn dense_row(&self, row: &ConstraintRow) -> Vec<f64> {
        let mut dense = vec![0.0; self.variables.len()];
        for (variable, &coef) in &row.coefficients {
            if let Some(j) = self.variable_index(variable) {
                dense[j] = coef;
            }
        }
        dense
    }

    /// Left-hand side value of a row at the given point (variable order)
    pub fn row_body(&self, row: &ConstraintRow, values: &[f64]) -> f64 {
        row.coefficients
            .iter()
            .filter_map(|(variable, &coef)| {
                self.variable_index(variable)
                    .and_then(|j| values.get(j))
                    .map(|&x| coef * x)
            })
            .sum()
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.le.len() + self.ge.len() + self.eq.len()
    }

    pub fn num_constraints_of(&self, kind: ConstraintKind) -> usize {
        self.family(kind).len()
    }
}
