use crate::adapter::{RawSolution, SolverBackend, SolverProcessError};
use crate::model::{ConstraintKind, SparseModel};
use crate::outcome::{SolverStatus, TerminationCondition};

/// Consecutive degenerate pivots before switching to Bland's rule
const DEGENERATE_STREAK: usize = 10;

/// In-process two-phase simplex solver for maximize LPs
#[derive(Debug, Clone)]
pub struct Solver {
    /// Maximum iterations per phase before giving up
    max_iterations: usize,
    /// Tolerance for floating point comparisons
    tolerance: f64,
}

impl Default for Solver {
    fn default() -> Self {
        Self {
            max_iterations: 10000,
            tolerance: 1e-9,
        }
    }
}

impl Solver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    /// Solve the model using the two-phase simplex method
    pub fn solve_model(&self, model: &SparseModel) -> RawSolution {
        let mut tableau = self.build_tableau(model);

        // Phase 1: Find initial basic feasible solution
        if tableau.n_artificial > 0 {
            match self.phase1(&mut tableau) {
                Phase1Result::Feasible => {}
                Phase1Result::Infeasible => {
                    return RawSolution::without_point(
                        SolverStatus::Error,
                        TerminationCondition::Infeasible,
                        "No primal feasible solution",
                    );
                }
                Phase1Result::IterationLimit => {
                    return RawSolution::without_point(
                        SolverStatus::Error,
                        TerminationCondition::Other,
                        format!("Iteration limit ({}) reached in phase 1", self.max_iterations),
                    );
                }
            }
        }

        // Phase 2: Optimize
        let (status, termination, message) = match self.phase2(&mut tableau) {
            SimplexResult::Optimal => (SolverStatus::Ok, TerminationCondition::Optimal, None),
            SimplexResult::Unbounded => {
                return RawSolution::without_point(
                    SolverStatus::Error,
                    TerminationCondition::Unbounded,
                    "Objective is unbounded",
                );
            }
            SimplexResult::IterationLimit => (
                SolverStatus::Ok,
                TerminationCondition::Other,
                Some(format!(
                    "Iteration limit ({}) reached in phase 2; point is feasible but not proven optimal",
                    self.max_iterations
                )),
            ),
        };

        RawSolution {
            status,
            termination,
            primal: Some(self.primal_values(&tableau)),
            duals: Some(self.row_duals(&tableau)),
            message,
        }
    }

    fn build_tableau(&self, model: &SparseModel) -> Tableau {
        let n_vars = model.num_variables();
        let n_constraints = model.num_constraints();

        // Lay out each row: flip to a non-negative RHS, then decide whether its
        // slack can start in the basis or an artificial is needed
        let mut rows = Vec::with_capacity(n_constraints);
        let mut n_slack = 0;
        let mut n_artificial = 0;
        for row in model.rows() {
            let flipped = row.rhs < 0.0;
            let sign = if flipped { -1.0 } else { 1.0 };
            let slack_coef = match row.kind {
                ConstraintKind::Le => Some(sign),
                ConstraintKind::Ge => Some(-sign),
                ConstraintKind::Eq => None,
            };
            if slack_coef.is_some() {
                n_slack += 1;
            }
            let needs_artificial = slack_coef != Some(1.0);
            if needs_artificial {
                n_artificial += 1;
            }
            rows.push((model.dense_row(row), row.rhs, flipped, slack_coef, needs_artificial));
        }

        let total_cols = n_vars + n_slack + n_artificial + 1; // +1 for RHS
        let rhs_col = total_cols - 1;

        let mut tableau = Tableau {
            data: vec![vec![0.0; total_cols]; n_constraints + 1],
            basic_vars: vec![0; n_constraints],
            rows: Vec::with_capacity(n_constraints),
            n_vars,
            n_slack,
            n_artificial,
        };

        let mut slack_idx = n_vars;
        let mut artificial_idx = n_vars + n_slack;

        for (i, (coefficients, rhs, flipped, slack_coef, needs_artificial)) in rows.into_iter().enumerate() {
            let sign = if flipped { -1.0 } else { 1.0 };
            for (j, coef) in coefficients.into_iter().enumerate() {
                tableau.data[i][j] = sign * coef;
            }
            tableau.data[i][rhs_col] = sign * rhs;

            let mut layout = RowLayout {
                flipped,
                slack: None,
                artificial: None,
            };
            if let Some(coef) = slack_coef {
                tableau.data[i][slack_idx] = coef;
                tableau.basic_vars[i] = slack_idx;
                layout.slack = Some((slack_idx, coef));
                slack_idx += 1;
            }
            if needs_artificial {
                tableau.data[i][artificial_idx] = 1.0;
                tableau.basic_vars[i] = artificial_idx;
                layout.artificial = Some(artificial_idx);
                artificial_idx += 1;
            }
            tableau.rows.push(layout);
        }

        // Objective row (last row) holds the reduced costs c - yA; the
        // simplex maximizes, so positive entries can still improve
        let obj_row = n_constraints;
        for (j, coef) in model.objective_dense().into_iter().enumerate() {
            tableau.data[obj_row][j] = coef;
        }

        tableau
    }

    fn phase1(&self, tableau: &mut Tableau) -> Phase1Result {
        // Auxiliary objective: maximize -sum(artificials)
        let n_constraints = tableau.data.len() - 1;
        let n_cols = tableau.data[0].len();
        let art_start = tableau.n_vars + tableau.n_slack;

        // Save original objective
        let orig_obj = tableau.data[n_constraints].clone();

        for j in 0..n_cols {
            tableau.data[n_constraints][j] = 0.0;
        }
        for j in art_start..(art_start + tableau.n_artificial) {
            tableau.data[n_constraints][j] = -1.0;
        }

        // Price out the basic artificials
        for i in 0..n_constraints {
            if tableau.basic_vars[i] >= art_start {
                for j in 0..n_cols {
                    tableau.data[n_constraints][j] += tableau.data[i][j];
                }
            }
        }

        match self.iterate(tableau, n_cols - 1) {
            // The auxiliary objective is bounded above by zero
            SimplexResult::Optimal | SimplexResult::Unbounded => {}
            SimplexResult::IterationLimit => return Phase1Result::IterationLimit,
        }

        // Any artificial left at a positive level means infeasible
        let rhs_col = n_cols - 1;
        for i in 0..n_constraints {
            if tableau.basic_vars[i] >= art_start && tableau.data[i][rhs_col].abs() > self.tolerance {
                return Phase1Result::Infeasible;
            }
        }

        self.drive_out_artificials(tableau);

        // Restore original objective and price out the basis
        tableau.data[n_constraints] = orig_obj;
        for i in 0..n_constraints {
            let basic = tableau.basic_vars[i];
            let ratio = tableau.data[n_constraints][basic];
            if ratio.abs() > self.tolerance {
                for j in 0..n_cols {
                    tableau.data[n_constraints][j] -= ratio * tableau.data[i][j];
                }
            }
        }

        Phase1Result::Feasible
    }

    /// Pivot zero-level artificials out of the basis so phase 2 cannot raise them
    fn drive_out_artificials(&self, tableau: &mut Tableau) {
        let n_constraints = tableau.data.len() - 1;
        let art_start = tableau.n_vars + tableau.n_slack;

        for i in 0..n_constraints {
            if tableau.basic_vars[i] < art_start {
                continue;
            }
            // Redundant rows have no real column to pivot on and stay put
            if let Some(col) = (0..art_start).find(|&j| tableau.data[i][j].abs() > self.tolerance) {
                self.pivot(tableau, i, col);
            }
        }
    }

    fn phase2(&self, tableau: &mut Tableau) -> SimplexResult {
        // Artificial columns never re-enter
        let exclude_from = tableau.n_vars + tableau.n_slack;
        self.iterate(tableau, exclude_from)
    }

    /// Pivot on columns `0..limit` until no reduced cost is positive.
    ///
    /// Uses the largest reduced cost while pivots make progress. After a run of
    /// degenerate pivots it falls back to Bland's rule, which cannot cycle.
    fn iterate(&self, tableau: &mut Tableau, limit: usize) -> SimplexResult {
        let rhs_col = tableau.data[0].len() - 1;
        let mut degenerate = 0;

        for _ in 0..self.max_iterations {
            let bland = degenerate >= DEGENERATE_STREAK;
            let Some(pivot_col) = self.find_pivot_column(tableau, limit, bland) else {
                return SimplexResult::Optimal;
            };
            let Some(pivot_row) = self.find_pivot_row(tableau, pivot_col) else {
                return SimplexResult::Unbounded;
            };
            if tableau.data[pivot_row][rhs_col].abs() <= self.tolerance {
                degenerate += 1;
            } else {
                degenerate = 0;
            }
            self.pivot(tableau, pivot_row, pivot_col);
        }
        SimplexResult::IterationLimit
    }

    /// Most positive reduced cost among columns `0..limit`, or with `bland`
    /// the first positive one
    fn find_pivot_column(&self, tableau: &Tableau, limit: usize, bland: bool) -> Option<usize> {
        let obj_row = tableau.data.len() - 1;

        if bland {
            return (0..limit).find(|&j| tableau.data[obj_row][j] > self.tolerance);
        }

        let mut max_val = self.tolerance;
        let mut max_col = None;

        for j in 0..limit {
            if tableau.data[obj_row][j] > max_val {
                max_val = tableau.data[obj_row][j];
                max_col = Some(j);
            }
        }

        max_col
    }

    /// Minimum ratio test; ties go to the lowest basic column
    fn find_pivot_row(&self, tableau: &Tableau, col: usize) -> Option<usize> {
        let n_constraints = tableau.data.len() - 1;
        let rhs_col = tableau.data[0].len() - 1;

        let mut min_ratio = f64::INFINITY;
        let mut min_row: Option<usize> = None;

        for i in 0..n_constraints {
            let val = tableau.data[i][col];
            if val > self.tolerance {
                let ratio = tableau.data[i][rhs_col] / val;
                let better = match min_row {
                    None => true,
                    Some(r) => {
                        ratio < min_ratio - self.tolerance
                            || ((ratio - min_ratio).abs() <= self.tolerance
                                && tableau.basic_vars[i] < tableau.basic_vars[r])
                    }
                };
                if better {
                    min_ratio = ratio;
                    min_row = Some(i);
                }
            }
        }

        min_row
    }

    fn pivot(&self, tableau: &mut Tableau, row: usize, col: usize) {
        let n_rows = tableau.data.len();
        let n_cols = tableau.data[0].len();

        tableau.basic_vars[row] = col;

        let pivot_val = tableau.data[row][col];
        for j in 0..n_cols {
            tableau.data[row][j] /= pivot_val;
        }

        for i in 0..n_rows {
            if i != row {
                let factor = tableau.data[i][col];
                if factor != 0.0 {
                    for j in 0..n_cols {
                        tableau.data[i][j] -= factor * tableau.data[row][j];
                    }
                }
            }
        }
    }

    fn primal_values(&self, tableau: &Tableau) -> Vec<f64> {
        let rhs_col = tableau.data[0].len() - 1;
        let mut values = vec![0.0; tableau.n_vars];
        for (i, &basic) in tableau.basic_vars.iter().enumerate() {
            if basic < tableau.n_vars {
                values[basic] = tableau.data[i][rhs_col];
            }
        }
        values
    }

    /// Dual of row i from the reduced cost of its identity column:
    /// d_k = 0 - y_i * a_ik, so y_i = -d_k / a_ik, negated back for flipped rows
    fn row_duals(&self, tableau: &Tableau) -> Vec<f64> {
        let obj_row = tableau.data.len() - 1;
        tableau
            .rows
            .iter()
            .map(|layout| {
                let (col, coef) = match (layout.slack, layout.artificial) {
                    (Some(slack), _) => slack,
                    (None, Some(artificial)) => (artificial, 1.0),
                    (None, None) => return 0.0,
                };
                let dual = -tableau.data[obj_row][col] / coef;
                let dual = if layout.flipped { -dual } else { dual };
                // Avoid reporting -0.0
                if dual.abs() <= self.tolerance { 0.0 } else { dual }
            })
            .collect()
    }
}

impl SolverBackend for Solver {
    fn name(&self) -> &'static str {
        "simplex"
    }

    fn solve(&self, model: &SparseModel) -> Result<RawSolution, SolverProcessError> {
        Ok(self.solve_model(model))
    }
}

struct Tableau {
    data: Vec<Vec<f64>>,
    basic_vars: Vec<usize>,
    rows: Vec<RowLayout>,
    n_vars: usize,
    n_slack: usize,
    n_artificial: usize,
}

/// Where a constraint row's identity columns live
struct RowLayout {
    flipped: bool,
    /// Slack/surplus column and its coefficient in the stored row
    slack: Option<(usize, f64)>,
    artificial: Option<usize>,
}

enum Phase1Result {
    Feasible,
    Infeasible,
    IterationLimit,
}

enum SimplexResult {
    Optimal,
    Unbounded,
    IterationLimit,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    fn xy_model() -> SparseModel {
        let mut model = SparseModel::new();
        model.add_variable("x").unwrap();
        model.add_variable("y").unwrap();
        model
    }

    #[test]
    fn test_simple_maximization() {
        // Maximize: 3x + 2y
        // Subject to:
        //   x + y <= 4
        //   x <= 3
        //   y <= 3
        // Optimal: x=3, y=1, obj=11
        let mut model = xy_model();
        model.set_objective([("x", 3.0), ("y", 2.0)]).unwrap();
        model.add_constraint(ConstraintKind::Le, "sum", [("x", 1.0), ("y", 1.0)], 4.0).unwrap();
        model.add_constraint(ConstraintKind::Le, "x_max", [("x", 1.0)], 3.0).unwrap();
        model.add_constraint(ConstraintKind::Le, "y_max", [("y", 1.0)], 3.0).unwrap();

        let solution = Solver::new().solve_model(&model);

        assert_eq!(solution.status, SolverStatus::Ok);
        assert_eq!(solution.termination, TerminationCondition::Optimal);
        let values = solution.primal.unwrap();
        assert!(close(values[0], 3.0), "x = {} (expected 3)", values[0]);
        assert!(close(values[1], 1.0), "y = {} (expected 1)", values[1]);

        // Relaxing sum gains 2 (via y); relaxing x_max gains 3 - 2 = 1
        let duals = solution.duals.unwrap();
        assert!(close(duals[0], 2.0), "sum dual = {}", duals[0]);
        assert!(close(duals[1], 1.0), "x_max dual = {}", duals[1]);
        assert!(close(duals[2], 0.0), "y_max dual = {}", duals[2]);
    }

    #[test]
    fn test_cost_minimization_with_ge() {
        // Maximize -(2x + 3y), i.e. minimize cost
        //   x + y >= 4
        //   x <= 3
        //   y <= 3
        // Optimal: x=3, y=1, cost=9
        let mut model = xy_model();
        model.set_objective([("x", -2.0), ("y", -3.0)]).unwrap();
        model.add_constraint(ConstraintKind::Ge, "sum", [("x", 1.0), ("y", 1.0)], 4.0).unwrap();
        model.add_constraint(ConstraintKind::Le, "x_max", [("x", 1.0)], 3.0).unwrap();
        model.add_constraint(ConstraintKind::Le, "y_max", [("y", 1.0)], 3.0).unwrap();

        let solution = Solver::new().solve_model(&model);

        assert_eq!(solution.termination, TerminationCondition::Optimal);
        let values = solution.primal.unwrap();
        assert!(close(values[0], 3.0), "x = {}", values[0]);
        assert!(close(values[1], 1.0), "y = {}", values[1]);

        // Rows are ordered LE (x_max, y_max) then GE (sum)
        let duals = solution.duals.unwrap();
        assert!(close(duals[0], 1.0), "x_max dual = {}", duals[0]);
        assert!(close(duals[1], 0.0), "y_max dual = {}", duals[1]);
        assert!(close(duals[2], -3.0), "sum dual = {}", duals[2]);
    }

    #[test]
    fn test_equality_dual() {
        // Maximize x + 2y subject to x + y = 10, y <= 4
        let mut model = xy_model();
        model.set_objective([("x", 1.0), ("y", 2.0)]).unwrap();
        model.add_constraint(ConstraintKind::Eq, "total", [("x", 1.0), ("y", 1.0)], 10.0).unwrap();
        model.add_constraint(ConstraintKind::Le, "y_cap", [("y", 1.0)], 4.0).unwrap();

        let solution = Solver::new().solve_model(&model);

        assert_eq!(solution.termination, TerminationCondition::Optimal);
        let values = solution.primal.unwrap();
        assert!(close(values[0], 6.0));
        assert!(close(values[1], 4.0));
        let duals = solution.duals.unwrap();
        assert!(close(duals[0], 1.0), "y_cap dual = {}", duals[0]);
        assert!(close(duals[1], 1.0), "total dual = {}", duals[1]);
    }

    #[test]
    fn test_negative_rhs() {
        // Maximize -x subject to -x <= -2 (x >= 2)
        let mut model = SparseModel::new();
        model.add_variable("x").unwrap();
        model.set_objective([("x", -1.0)]).unwrap();
        model.add_constraint(ConstraintKind::Le, "floor", [("x", -1.0)], -2.0).unwrap();

        let solution = Solver::new().solve_model(&model);

        assert_eq!(solution.termination, TerminationCondition::Optimal);
        assert!(close(solution.primal.unwrap()[0], 2.0));
        assert!(close(solution.duals.unwrap()[0], 1.0));
    }

    #[test]
    fn test_infeasible() {
        // x >= 5
        // x <= 3
        let mut model = SparseModel::new();
        model.add_variable("x").unwrap();
        model.set_objective([("x", 1.0)]).unwrap();
        model.add_constraint(ConstraintKind::Ge, "lower", [("x", 1.0)], 5.0).unwrap();
        model.add_constraint(ConstraintKind::Le, "upper", [("x", 1.0)], 3.0).unwrap();

        let solution = Solver::new().solve_model(&model);

        assert_eq!(solution.status, SolverStatus::Error);
        assert_eq!(solution.termination, TerminationCondition::Infeasible);
        assert!(solution.primal.is_none());
    }

    #[test]
    fn test_unbounded() {
        let mut model = xy_model();
        model.set_objective([("x", 1.0)]).unwrap();
        model.add_constraint(ConstraintKind::Le, "y_cap", [("y", 1.0)], 1.0).unwrap();

        let solution = Solver::new().solve_model(&model);

        assert_eq!(solution.status, SolverStatus::Error);
        assert_eq!(solution.termination, TerminationCondition::Unbounded);
    }

    #[test]
    fn test_iteration_limit_keeps_feasible_point() {
        let mut model = xy_model();
        model.set_objective([("x", 3.0), ("y", 2.0)]).unwrap();
        model.add_constraint(ConstraintKind::Le, "sum", [("x", 1.0), ("y", 1.0)], 4.0).unwrap();
        model.add_constraint(ConstraintKind::Le, "x_max", [("x", 1.0)], 3.0).unwrap();

        let solution = Solver::new().with_max_iterations(1).solve_model(&model);

        assert_eq!(solution.status, SolverStatus::Ok);
        assert_eq!(solution.termination, TerminationCondition::Other);
        assert!(solution.primal.is_some());
    }

    #[test]
    fn test_degenerate_cycling_model() {
        // Beale's example: largest-coefficient pivoting cycles through six
        // degenerate bases at the origin
        let mut model = SparseModel::new();
        for name in ["x4", "x5", "x6", "x7"] {
            model.add_variable(name).unwrap();
        }
        model
            .set_objective([("x4", 0.75), ("x5", -20.0), ("x6", 0.5), ("x7", -6.0)])
            .unwrap();
        model
            .add_constraint(
                ConstraintKind::Le,
                "r1",
                [("x4", 0.25), ("x5", -8.0), ("x6", -1.0), ("x7", 9.0)],
                0.0,
            )
            .unwrap();
        model
            .add_constraint(
                ConstraintKind::Le,
                "r2",
                [("x4", 0.5), ("x5", -12.0), ("x6", -0.5), ("x7", 3.0)],
                0.0,
            )
            .unwrap();
        model.add_constraint(ConstraintKind::Le, "r3", [("x6", 1.0)], 1.0).unwrap();

        let solution = Solver::new().solve_model(&model);

        assert_eq!(solution.status, SolverStatus::Ok);
        assert_eq!(solution.termination, TerminationCondition::Optimal);
        let values = solution.primal.unwrap();
        assert!(close(values[0], 1.0), "x4 = {}", values[0]);
        assert!(close(values[2], 1.0), "x6 = {}", values[2]);
        let objective: f64 = [0.75, -20.0, 0.5, -6.0].iter().zip(&values).map(|(c, x)| c * x).sum();
        assert!(close(objective, 1.25), "objective = {}", objective);

        let duals = solution.duals.unwrap();
        assert!(close(duals[0], 0.0), "r1 dual = {}", duals[0]);
        assert!(close(duals[1], 1.5), "r2 dual = {}", duals[1]);
        assert!(close(duals[2], 1.25), "r3 dual = {}", duals[2]);
    }

    #[test]
    fn test_redundant_equalities() {
        // Two copies of the same equality leave a zero-level artificial behind
        let mut model = xy_model();
        model.set_objective([("x", 1.0), ("y", 1.0)]).unwrap();
        model.add_constraint(ConstraintKind::Eq, "a", [("x", 1.0), ("y", 1.0)], 2.0).unwrap();
        model.add_constraint(ConstraintKind::Eq, "b", [("x", 2.0), ("y", 2.0)], 4.0).unwrap();

        let solution = Solver::new().solve_model(&model);

        assert_eq!(solution.termination, TerminationCondition::Optimal);
        let values = solution.primal.unwrap();
        assert!(close(values[0] + values[1], 2.0));
    }
}
