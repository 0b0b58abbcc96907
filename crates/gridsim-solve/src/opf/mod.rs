//! Linear optimal power flow (LOPF), spec.md §4.6.
//!
//! `run_lopf` builds the model (`model::build`), solves it against
//! `clarabel`'s native cone-program API (`solver::solve`), and — only once
//! the solver has returned a feasible optimum — writes dispatch, SOC, flows,
//! extended capacities, and bus marginal prices onto the network
//! (`result::apply`), matching the writer discipline spec.md §7 requires.

pub mod model;
pub mod result;
pub mod solver;
pub mod types;

pub use types::LopfSolution;

use gridsim_core::{GridSimResult, Network};

/// Build, solve, and apply a single LOPF spanning every current snapshot.
pub fn run_lopf(network: &mut Network) -> GridSimResult<LopfSolution> {
    let built = model::build(network)?;
    let program = model::to_cone_program(&built);
    tracing::debug!(
        n_vars = program.n_vars,
        n_rows = program.n_rows,
        eq_rows = program.eq_row_count,
        ineq_rows = program.ineq_row_count,
        "dispatching lopf to solver"
    );
    let solved = solver::solve(&program)?;
    let solution = result::apply(network, &built, &solved)?;
    tracing::info!(objective = solution.objective_value, snapshots = solution.snapshot_count, "lopf solved");
    Ok(solution)
}
