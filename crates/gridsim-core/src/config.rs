//! Network-wide solver configuration.

use serde::{Deserialize, Serialize};

/// Which formulation the LOPF model builder uses for passive branch flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DcOpfFormulation {
    /// Introduce a voltage-angle decision variable per bus and a branch-flow
    /// equality `f = (theta_0 - theta_1) / x_pu` per branch.
    Angles,
    /// Precompute the Power Transfer Distribution Factor matrix and express
    /// branch flow as a linear combination of nodal net injections.
    Ptdf,
}

impl Default for DcOpfFormulation {
    fn default() -> Self {
        DcOpfFormulation::Angles
    }
}

/// Tunable tolerances and solver knobs, attached to a [`crate::Network`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Newton-Raphson convergence tolerance on the max-norm of the power
    /// mismatch vector, in per-unit.
    pub nr_x_tol: f64,
    /// Newton-Raphson iteration cap before raising `NumericalDivergence`.
    pub nr_max_iterations: usize,
    /// Passive branch flow formulation used by the LOPF model builder.
    pub dc_opf_formulation: DcOpfFormulation,
    /// Entries of the PTDF matrix below this magnitude are treated as zero
    /// when building sparse LOPF flow constraints.
    pub ptdf_tolerance: f64,
    /// Optional system-wide CO2 emissions cap, in tonnes, over the snapshot
    /// set (weighted by `snapshot_weightings`).
    pub co2_limit: Option<f64>,
    /// Optional spatial reference id carried through from import, unused by
    /// the solvers themselves.
    pub srid: Option<i64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            nr_x_tol: 1e-6,
            nr_max_iterations: 100,
            dc_opf_formulation: DcOpfFormulation::Angles,
            ptdf_tolerance: 1e-8,
            co2_limit: None,
            srid: None,
        }
    }
}

impl NetworkConfig {
    pub fn with_nr_tolerance(mut self, tol: f64) -> Self {
        self.nr_x_tol = tol;
        self
    }

    pub fn with_nr_max_iterations(mut self, max_iterations: usize) -> Self {
        self.nr_max_iterations = max_iterations;
        self
    }

    pub fn with_dc_opf_formulation(mut self, formulation: DcOpfFormulation) -> Self {
        self.dc_opf_formulation = formulation;
        self
    }

    pub fn with_co2_limit(mut self, limit_t: f64) -> Self {
        self.co2_limit = Some(limit_t);
        self
    }
}
