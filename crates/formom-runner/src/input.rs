use std::fs;
use std::path::{Path, PathBuf};

use formom_solver::{ConstraintKind, ModelError, SparseModel};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::batch::{RunRequest, RunSource};

#[derive(Error, Debug)]
pub enum InputError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One constraint row as handed over by the input linter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSpec {
    pub kind: ConstraintKind,
    pub name: String,
    /// Variable name -> coefficient
    #[serde(default)]
    pub row: IndexMap<String, f64>,
    pub rhs: f64,
}

/// Objective plus constraints for one run. The objective's keys, in order,
/// are the model's variables.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelInput {
    pub objective: IndexMap<String, f64>,
    #[serde(default)]
    pub constraints: Vec<ConstraintSpec>,
}

impl ModelInput {
    pub fn new(objective: IndexMap<String, f64>, constraints: Vec<ConstraintSpec>) -> Self {
        Self { objective, constraints }
    }

    /// Assemble the sparse model. The dual suffix is left to the solver adapter.
    pub fn build(&self) -> Result<SparseModel, ModelError> {
        let mut model = SparseModel::new();
        for variable in self.objective.keys() {
            model.add_variable(variable.as_str())?;
        }
        model.set_objective(self.objective.iter().map(|(k, &v)| (k.as_str(), v)))?;

        for c in &self.constraints {
            model.add_constraint(
                c.kind,
                c.name.as_str(),
                c.row.iter().map(|(k, &v)| (k.as_str(), v)),
                c.rhs,
            )?;
        }

        debug!(
            variables = model.num_variables(),
            le = model.num_constraints_of(ConstraintKind::Le),
            ge = model.num_constraints_of(ConstraintKind::Ge),
            eq = model.num_constraints_of(ConstraintKind::Eq),
            "Built model"
        );
        Ok(model)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, InputError> {
    let source = fs::read_to_string(path).map_err(|source| InputError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&source).map_err(|source| InputError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a shared constraint set: a JSON array of constraint specs
pub fn read_constraints(path: impl AsRef<Path>) -> Result<Vec<ConstraintSpec>, InputError> {
    read_json(path.as_ref())
}

/// Read an objective: a JSON object of variable name -> coefficient
pub fn read_objective(path: impl AsRef<Path>) -> Result<IndexMap<String, f64>, InputError> {
    read_json(path.as_ref())
}

/// Every `*.json` file in a directory, sorted by file name
pub fn objective_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, InputError> {
    let dir = dir.as_ref();
    let read_err = |source| InputError::Read {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// One run per objective file against a shared constraint set. Objective
/// files that cannot be read become rejected runs rather than errors.
pub fn shared_runs(constraints: &[ConstraintSpec], objectives: &[PathBuf]) -> Vec<RunRequest> {
    objectives
        .iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let source = match read_objective(path) {
                Ok(objective) => RunSource::Ready(ModelInput::new(objective, constraints.to_vec())),
                Err(e) => RunSource::Rejected(e.to_string()),
            };
            RunRequest { name, source }
        })
        .collect()
}
