//! Numerical solvers for `gridsim-core` networks: sparse matrix builders,
//! AC/DC power flow, and the linear optimal power flow (LOPF) model.

pub mod opf;
pub mod power_flow;
pub mod sparse;
pub mod topology_extras;

pub use power_flow::{run_ac_pf_network, run_dc_pf_network};
