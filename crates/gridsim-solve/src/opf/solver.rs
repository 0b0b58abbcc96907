//! Hands a [`ConeProgram`] to `clarabel`'s native solver interface and keeps
//! the raw primal/dual vectors, bypassing `good_lp`'s `SolverModel` trait so
//! the nodal-balance duals (`spec.md` §4.6 "Require dual values") survive the
//! round trip (see `model.rs` for why).

use clarabel::algebra::CscMatrix;
use clarabel::solver::{DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus, SupportedConeT};

use gridsim_core::{GridSimError, GridSimResult};

use super::model::ConeProgram;

pub struct Solved {
    pub x: Vec<f64>,
    /// One entry per row of the program; rows `0..eq_row_count` are the
    /// equality-row duals (nodal balance among them, see `BalanceKey`).
    pub duals: Vec<f64>,
}

fn build_csc(n_rows: usize, n_cols: usize, triplets: &[(usize, usize, f64)]) -> CscMatrix<f64> {
    let mut columns: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n_cols];
    for &(row, col, value) in triplets {
        columns[col].push((row, value));
    }
    let mut colptr = Vec::with_capacity(n_cols + 1);
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();
    colptr.push(0);
    for column in &mut columns {
        column.sort_by_key(|&(row, _)| row);
        for &(row, value) in column.iter() {
            rowval.push(row);
            nzval.push(value);
        }
        colptr.push(rowval.len());
    }
    CscMatrix::new(n_rows, n_cols, colptr, rowval, nzval)
}

pub fn solve(program: &ConeProgram) -> GridSimResult<Solved> {
    let p = CscMatrix::zeros((program.n_vars, program.n_vars));
    let a = build_csc(program.n_rows, program.n_vars, &program.triplets);

    let mut cones = Vec::new();
    if program.eq_row_count > 0 {
        cones.push(SupportedConeT::ZeroConeT(program.eq_row_count));
    }
    if program.ineq_row_count > 0 {
        cones.push(SupportedConeT::NonnegativeConeT(program.ineq_row_count));
    }

    let settings = DefaultSettingsBuilder::default()
        .verbose(false)
        .build()
        .map_err(|e| GridSimError::Other(format!("clarabel settings: {e}")))?;

    let mut solver = DefaultSolver::new(&p, &program.q, &a, &program.b, &cones, settings);
    solver.solve();

    match solver.solution.status {
        SolverStatus::Solved => {
            tracing::debug!(n_vars = program.n_vars, n_rows = program.n_rows, "clarabel solver converged");
            Ok(Solved { x: solver.solution.x.clone(), duals: solver.solution.z.clone() })
        }
        other => {
            tracing::warn!(status = ?other, "clarabel solver did not reach an optimal solution");
            Err(GridSimError::InfeasibleSolver { status: format!("{other:?}"), termination: format!("{other:?}") })
        }
    }
}
