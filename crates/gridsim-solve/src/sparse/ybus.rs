//! Complex nodal admittance matrix (spec.md §4.3 "Y").
//!
//! Grounded on `original_source/pf.py::calculate_Y`: per-branch series
//! admittance `y_se`, shunt admittance `y_sh` split half onto each end, tap
//! ratio and phase shift folded into a 2x2 primitive admittance block, then
//! assembled via branch/bus incidence.

use gridsim_core::{CurrentType, GridSimError, GridSimResult, Network, PassiveBranch, SubNetwork};
use num_complex::Complex64;
use sprs::{CsMat, TriMat};

use super::SubNetworkMatrices;

const DEG_TO_RAD: f64 = std::f64::consts::PI / 180.0;

/// Per-branch primitive admittance terms (spec.md §4.3).
struct Primitive {
    y00: Complex64,
    y01: Complex64,
    y10: Complex64,
    y11: Complex64,
}

fn branch_primitive(branch: &PassiveBranch) -> Primitive {
    let (r_pu, x_pu, g_pu, b_pu, tap_ratio, phase_shift_deg) = match branch {
        PassiveBranch::Line(l) => (l.r_pu, l.x_pu, l.g_pu, l.b_pu, 1.0, 0.0),
        PassiveBranch::Transformer(t) => (t.r_pu, t.x_pu, t.g_pu, t.b_pu, t.tap_ratio, t.phase_shift_deg),
    };

    let y_se = Complex64::new(1.0, 0.0) / Complex64::new(r_pu, x_pu);
    let y_sh = Complex64::new(g_pu, b_pu);
    let tau = if tap_ratio == 0.0 { 1.0 } else { tap_ratio };
    let phi = Complex64::from_polar(1.0, phase_shift_deg * DEG_TO_RAD);

    let y11 = y_se + 0.5 * y_sh;
    let y00 = y11 / Complex64::new(tau * tau, 0.0);
    let y01 = -y_se / (tau * phi);
    let y10 = -y_se / (tau * phi.conj());

    Primitive { y00, y01, y10, y11 }
}

/// Build `Y0`, `Y1` (num_branches x num_buses_o) and the full nodal `Y`
/// (num_buses_o x num_buses_o, including bus shunt admittances on the
/// diagonal) for one AC sub-network.
pub fn build(network: &Network, sub_network: &SubNetwork) -> GridSimResult<(CsMat<Complex64>, CsMat<Complex64>, CsMat<Complex64>)> {
    if sub_network.current_type != CurrentType::Ac {
        return Err(GridSimError::NotImplemented(
            "Y-bus construction is only defined for AC sub-networks".to_string(),
        ));
    }

    let n_buses = sub_network.buses_o.len();
    let n_branches = sub_network.branches.len();

    let mut y0 = TriMat::new((n_branches, n_buses));
    let mut y1 = TriMat::new((n_branches, n_buses));
    let mut y = TriMat::new((n_buses, n_buses));

    for (row, &branch_id) in sub_network.branches.iter().enumerate() {
        let branch = &network.passive_branches()[branch_id.value()];
        let from_idx = sub_network.index_of(branch.bus0()).ok_or_else(|| {
            GridSimError::Topology(format!("branch {branch_id} endpoint not found in its own sub-network"))
        })?;
        let to_idx = sub_network.index_of(branch.bus1()).ok_or_else(|| {
            GridSimError::Topology(format!("branch {branch_id} endpoint not found in its own sub-network"))
        })?;

        let p = branch_primitive(branch);

        y0.add_triplet(row, from_idx, p.y00);
        y0.add_triplet(row, to_idx, p.y01);
        y1.add_triplet(row, from_idx, p.y10);
        y1.add_triplet(row, to_idx, p.y11);

        y.add_triplet(from_idx, from_idx, p.y00);
        y.add_triplet(from_idx, to_idx, p.y01);
        y.add_triplet(to_idx, from_idx, p.y10);
        y.add_triplet(to_idx, to_idx, p.y11);
    }

    for &bus_id in &sub_network.buses_o {
        let idx = sub_network.index_of(bus_id).expect("bus_id drawn from buses_o");
        for shunt in network.shunts_at_bus(bus_id) {
            y.add_triplet(idx, idx, Complex64::new(shunt.g_pu, shunt.b_pu));
        }
    }

    Ok((y0.to_csr(), y1.to_csr(), y.to_csr()))
}

/// Rebuild every matrix kind for `sub_network` and return the full cache
/// entry. PTDF is left unpopulated — see [`super::ptdf::build`].
pub fn build_matrices(network: &Network, sub_network: &SubNetwork) -> GridSimResult<SubNetworkMatrices> {
    let (y0, y1, y) = build(network, sub_network)?;
    let (h, b) = super::bh::build(network, sub_network)?;
    Ok(SubNetworkMatrices { y0, y1, y, h, b, ptdf: None })
}
