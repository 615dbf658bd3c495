//! `glpsol` as an out-of-process backend.
//!
//! The model is written in CPLEX LP format under positional aliases (`x1..`
//! for columns, `r1..` for rows) so arbitrary names survive the file format,
//! then read back from GLPK's plain-text basic solution (`-w`).

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::adapter::{RawSolution, SolverBackend, SolverProcessError};
use crate::model::{ConstraintKind, SparseModel};
use crate::outcome::{SolverStatus, TerminationCondition};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Runs GLPK's `glpsol` once per solve in a private scratch directory
#[derive(Debug, Clone)]
pub struct GlpkBackend {
    program: PathBuf,
    timeout: Duration,
}

impl GlpkBackend {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl SolverBackend for GlpkBackend {
    fn name(&self) -> &'static str {
        "glpk"
    }

    fn solve(&self, model: &SparseModel) -> Result<RawSolution, SolverProcessError> {
        // An LP file needs at least one column
        if model.num_variables() == 0 {
            return Ok(solve_without_columns(model));
        }

        let scratch = tempfile::tempdir()?;
        let lp_path = scratch.path().join("model.lp");
        let sol_path = scratch.path().join("model.sol");

        {
            let mut writer = BufWriter::new(File::create(&lp_path)?);
            write_lp(model, &mut writer)?;
            writer.flush()?;
        }

        debug!(program = %self.program.display(), lp = %lp_path.display(), "Starting glpsol");
        let mut child = Command::new(&self.program)
            .arg("--lp")
            .arg(&lp_path)
            .arg("-w")
            .arg(&sol_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| SolverProcessError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                // Reap the child before the scratch directory goes away
                let _ = child.kill();
                let _ = child.wait();
                return Err(SolverProcessError::Timeout(self.timeout));
            }
            thread::sleep(POLL_INTERVAL);
        };

        if !status.success() {
            return Err(SolverProcessError::ExitStatus(status.to_string()));
        }

        let text = fs::read_to_string(&sol_path)?;
        parse_solution(&text, model.num_variables(), model.num_constraints())
    }
}

/// Every row body is 0, so the model is feasible exactly when each bound
/// admits 0
fn solve_without_columns(model: &SparseModel) -> RawSolution {
    let admits_zero = |kind: ConstraintKind, rhs: f64| match kind {
        ConstraintKind::Le => rhs >= 0.0,
        ConstraintKind::Ge => rhs <= 0.0,
        ConstraintKind::Eq => rhs == 0.0,
    };
    if model.rows().all(|row| admits_zero(row.kind, row.rhs)) {
        RawSolution {
            status: SolverStatus::Ok,
            termination: TerminationCondition::Optimal,
            primal: Some(Vec::new()),
            duals: Some(vec![0.0; model.num_constraints()]),
            message: None,
        }
    } else {
        RawSolution::without_point(
            SolverStatus::Error,
            TerminationCondition::Infeasible,
            "No primal feasible solution",
        )
    }
}

/// Write the model as a CPLEX LP file. Every variable appears in the
/// objective so GLPK numbers the columns in model order.
pub fn write_lp(model: &SparseModel, out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, "\\* formom model *\\")?;
    writeln!(out, "Maximize")?;
    write!(out, " obj:")?;
    let objective = model.objective_dense();
    if objective.is_empty() {
        write!(out, " 0")?;
    }
    for (j, coef) in objective.iter().enumerate() {
        write_term(out, *coef, j)?;
    }
    writeln!(out)?;

    writeln!(out, "Subject To")?;
    for (i, row) in model.rows().enumerate() {
        write!(out, " r{}:", i + 1)?;
        let mut wrote = false;
        for (j, coef) in model.dense_row(row).into_iter().enumerate() {
            if coef != 0.0 {
                write_term(out, coef, j)?;
                wrote = true;
            }
        }
        if !wrote {
            write!(out, " 0 x1")?;
        }
        let op = match row.kind {
            ConstraintKind::Le => "<=",
            ConstraintKind::Ge => ">=",
            ConstraintKind::Eq => "=",
        };
        writeln!(out, " {} {}", op, row.rhs)?;
    }
    writeln!(out, "End")?;
    Ok(())
}

fn write_term(out: &mut impl Write, coef: f64, j: usize) -> std::io::Result<()> {
    if coef < 0.0 {
        write!(out, " - {} x{}", -coef, j + 1)
    } else {
        // adding zero turns -0.0 into 0
        write!(out, " + {} x{}", coef + 0.0, j + 1)
    }
}

/// Parse GLPK's plain-text basic solution:
///
/// ```text
/// s bas <rows> <cols> <primal status> <dual status> <objective>
/// i <row> <stat> <primal> <dual>
/// j <col> <stat> <primal> <dual>
/// e o f
/// ```
pub fn parse_solution(text: &str, n_cols: usize, n_rows: usize) -> Result<RawSolution, SolverProcessError> {
    let mut header: Option<(char, char)> = None;
    let mut primal = vec![0.0; n_cols];
    let mut duals = vec![0.0; n_rows];

    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.first().copied() {
            None | Some("c") | Some("e") => {}
            Some("s") => {
                if fields.len() < 7 || fields[1] != "bas" {
                    return Err(SolverProcessError::Parse(format!("unexpected solution line: {}", line)));
                }
                let rows = parse_number::<usize>(fields[2], line)?;
                let cols = parse_number::<usize>(fields[3], line)?;
                if rows != n_rows || cols != n_cols {
                    return Err(SolverProcessError::Parse(format!(
                        "solution has {} rows and {} columns, model has {} and {}",
                        rows, cols, n_rows, n_cols
                    )));
                }
                header = Some((status_char(fields[4]), status_char(fields[5])));
            }
            Some("i") | Some("j") => {
                if fields.len() < 5 {
                    return Err(SolverProcessError::Parse(format!("truncated line: {}", line)));
                }
                let index = parse_number::<usize>(fields[1], line)?;
                let value = parse_number::<f64>(fields[3], line)?;
                let dual = parse_number::<f64>(fields[4], line)?;
                let in_range = |len: usize| index >= 1 && index <= len;
                if fields[0] == "i" && in_range(n_rows) {
                    duals[index - 1] = dual;
                } else if fields[0] == "j" && in_range(n_cols) {
                    primal[index - 1] = value;
                } else {
                    return Err(SolverProcessError::Parse(format!("index out of range: {}", line)));
                }
            }
            Some(_) => {
                return Err(SolverProcessError::Parse(format!("unexpected solution line: {}", line)));
            }
        }
    }

    let Some((primal_status, dual_status)) = header else {
        return Err(SolverProcessError::Parse("missing solution header".to_string()));
    };

    let solution = match (primal_status, dual_status) {
        ('f', 'f') => RawSolution {
            status: SolverStatus::Ok,
            termination: TerminationCondition::Optimal,
            primal: Some(primal),
            duals: Some(duals),
            message: None,
        },
        ('n', _) | ('i', _) => RawSolution::without_point(
            SolverStatus::Error,
            TerminationCondition::Infeasible,
            "No primal feasible solution",
        ),
        ('f', 'n') => RawSolution::without_point(
            SolverStatus::Error,
            TerminationCondition::Unbounded,
            "Objective is unbounded",
        ),
        ('f', _) => RawSolution {
            status: SolverStatus::Ok,
            termination: TerminationCondition::Other,
            primal: Some(primal),
            duals: Some(duals),
            message: Some("Feasible point, optimality not proven".to_string()),
        },
        (p, d) => RawSolution::without_point(
            SolverStatus::Error,
            TerminationCondition::Other,
            format!("Solver stopped with primal status '{}' and dual status '{}'", p, d),
        ),
    };
    Ok(solution)
}

fn status_char(field: &str) -> char {
    field.chars().next().unwrap_or('u')
}

fn parse_number<T: std::str::FromStr>(field: &str, line: &str) -> Result<T, SolverProcessError> {
    field
        .parse()
        .map_err(|_| SolverProcessError::Parse(format!("bad number '{}' in line: {}", field, line)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_model() -> SparseModel {
        let mut model = SparseModel::new();
        model.add_variable("stand 1/PLSQ").unwrap();
        model.add_variable("y").unwrap();
        model.set_objective([("stand 1/PLSQ", 3.0)]).unwrap();
        model
            .add_constraint(ConstraintKind::Ge, "floor", [("y", -1.5)], -2.0)
            .unwrap();
        model
            .add_constraint(ConstraintKind::Le, "cap", [("stand 1/PLSQ", 1.0), ("y", 1.0)], 4.0)
            .unwrap();
        model
    }

    #[test]
    fn test_write_lp_uses_aliases() {
        let mut out = Vec::new();
        write_lp(&sample_model(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains(" obj: + 3 x1 + 0 x2\n"), "{}", text);
        // LE rows come first
        assert!(text.contains(" r1: + 1 x1 + 1 x2 <= 4\n"), "{}", text);
        assert!(text.contains(" r2: - 1.5 x2 >= -2\n"), "{}", text);
        assert!(!text.contains("PLSQ"));
        assert!(text.ends_with("End\n"));
    }

    #[test]
    fn test_parse_optimal_solution() {
        let text = "\
c Problem:
c Rows:       2
s bas 2 2 f f 12
i 1 u 4 3
i 2 b -0 0
j 1 b 4 0
j 2 l 0 -3
e o f
";
        let solution = parse_solution(text, 2, 2).unwrap();

        assert_eq!(solution.status, SolverStatus::Ok);
        assert_eq!(solution.termination, TerminationCondition::Optimal);
        assert_eq!(solution.primal, Some(vec![4.0, 0.0]));
        assert_eq!(solution.duals, Some(vec![3.0, 0.0]));
    }

    #[test]
    fn test_parse_infeasible_and_unbounded() {
        let infeasible = parse_solution("s bas 1 1 n f 0\ne o f\n", 1, 1).unwrap();
        assert_eq!(infeasible.status, SolverStatus::Error);
        assert_eq!(infeasible.termination, TerminationCondition::Infeasible);

        let unbounded = parse_solution("s bas 1 1 f n 0\ne o f\n", 1, 1).unwrap();
        assert_eq!(unbounded.termination, TerminationCondition::Unbounded);
        assert!(unbounded.primal.is_none());
    }

    #[test]
    fn test_parse_rejects_mismatched_shape() {
        let err = parse_solution("s bas 3 1 f f 0\ne o f\n", 1, 1).unwrap_err();
        assert!(matches!(err, SolverProcessError::Parse(_)));

        let err = parse_solution("s mip 1 1 o 0\n", 1, 1).unwrap_err();
        assert!(matches!(err, SolverProcessError::Parse(_)));

        assert!(parse_solution("e o f\n", 1, 1).is_err());
    }

    #[test]
    fn test_model_without_variables_skips_glpsol() {
        let backend = GlpkBackend::new("/nonexistent/glpsol");

        let mut model = SparseModel::new();
        model.add_constraint(ConstraintKind::Le, "empty", Vec::<(&str, f64)>::new(), 3.0).unwrap();
        let solution = backend.solve(&model).unwrap();
        assert_eq!(solution.termination, TerminationCondition::Optimal);
        assert_eq!(solution.primal, Some(Vec::new()));
        assert_eq!(solution.duals, Some(vec![0.0]));

        model.add_constraint(ConstraintKind::Ge, "unreachable", Vec::<(&str, f64)>::new(), 1.0).unwrap();
        let solution = backend.solve(&model).unwrap();
        assert_eq!(solution.status, SolverStatus::Error);
        assert_eq!(solution.termination, TerminationCondition::Infeasible);
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let backend = GlpkBackend::new("/nonexistent/glpsol");
        let err = backend.solve(&sample_model()).unwrap_err();
        assert!(matches!(err, SolverProcessError::Spawn { .. }));
    }
}
