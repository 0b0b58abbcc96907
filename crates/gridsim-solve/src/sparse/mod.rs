//! Admittance/susceptance matrix builders and their per-sub-network cache
//! (spec.md §4.3). Kept out of `gridsim-core` because they depend on
//! `sprs`/`num-complex`/`faer`, which the entity model has no need of.

pub mod bh;
pub mod ptdf;
pub mod ybus;

use std::collections::HashMap;

use gridsim_core::SubNetworkId;
use num_complex::Complex64;
use sprs::CsMat;

/// Cached matrices for one sub-network at its current topology. Invalidated
/// (dropped and rebuilt) whenever `Network::invalidate_topology` has been
/// called and `topology::analyse` runs again — callers key a fresh
/// `HashMap<SubNetworkId, SubNetworkMatrices>` off the just-computed
/// sub-network list rather than patching an existing cache in place.
#[derive(Debug, Clone)]
pub struct SubNetworkMatrices {
    /// Rows = branches in sub-network order, cols = `buses_o` order.
    pub y0: CsMat<Complex64>,
    pub y1: CsMat<Complex64>,
    /// Full nodal admittance matrix, `buses_o` order.
    pub y: CsMat<Complex64>,
    /// Signed-susceptance branch/bus matrix.
    pub h: CsMat<f64>,
    /// Nodal susceptance matrix, `buses_o` order, slack row/col included.
    pub b: CsMat<f64>,
    /// Power transfer distribution factors, branch x bus (`buses_o` order).
    /// `None` until computed on first request, since PTDF is comparatively
    /// expensive and many callers only need `Y`/`B`/`H`.
    pub ptdf: Option<CsMat<f64>>,
}

pub type MatrixCache = HashMap<SubNetworkId, SubNetworkMatrices>;
