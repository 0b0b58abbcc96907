//! Real susceptance matrices `H` and `B` (spec.md §4.3 "B and H"), shared by
//! DC power flow, the PTDF matrix, and the LOPF "angles" formulation.
//!
//! Grounded on `original_source/pf.py::calculate_B_H`: branch susceptance is
//! `1/x_pu` for AC sub-networks, `1/r_pu` for DC sub-networks (a DC line's
//! "reactance" is its resistive voltage drop).

use gridsim_core::{CurrentType, GridSimResult, Network, SubNetwork};
use sprs::{CsMat, TriMat};

/// Per-branch susceptance used in the linearised flow equations.
fn branch_susceptance(branch: &gridsim_core::PassiveBranch, current_type: CurrentType) -> f64 {
    match current_type {
        CurrentType::Ac => 1.0 / branch.x_pu(),
        CurrentType::Dc => 1.0 / branch.r_pu(),
    }
}

/// Build `H` (num_branches x num_buses_o signed susceptance) and
/// `B = incidence^T . H` (num_buses_o x num_buses_o).
pub fn build(network: &Network, sub_network: &SubNetwork) -> GridSimResult<(CsMat<f64>, CsMat<f64>)> {
    let n_buses = sub_network.buses_o.len();
    let n_branches = sub_network.branches.len();

    let mut h = TriMat::new((n_branches, n_buses));
    let mut b = TriMat::new((n_buses, n_buses));

    for (row, &branch_id) in sub_network.branches.iter().enumerate() {
        let branch = &network.passive_branches()[branch_id.value()];
        let from_idx = sub_network.index_of(branch.bus0()).expect("branch endpoint in its own sub-network");
        let to_idx = sub_network.index_of(branch.bus1()).expect("branch endpoint in its own sub-network");
        let susceptance = branch_susceptance(branch, sub_network.current_type);

        h.add_triplet(row, from_idx, susceptance);
        h.add_triplet(row, to_idx, -susceptance);

        b.add_triplet(from_idx, from_idx, susceptance);
        b.add_triplet(to_idx, to_idx, susceptance);
        b.add_triplet(from_idx, to_idx, -susceptance);
        b.add_triplet(to_idx, from_idx, -susceptance);
    }

    Ok((h.to_csr(), b.to_csr()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsim_core::units::{Kilovolts, MegavoltAmperes, Megawatts};
    use gridsim_core::{per_unit, topology, Bus, BusId, BranchId, CurrentType, GenId, Generator, Line};

    #[test]
    fn b_matrix_row_sums_to_zero() {
        let mut net = Network::new();
        let a = net.add_bus(Bus::new(BusId(0), "A", Kilovolts(400.0), CurrentType::Ac));
        let b_bus = net.add_bus(Bus::new(BusId(0), "B", Kilovolts(400.0), CurrentType::Ac));
        net.add_line(Line::new(BranchId(0), "A-B", a, b_bus, 0.0, 50.0, MegavoltAmperes(500.0)))
            .unwrap();
        net.add_generator(Generator::new(GenId(0), "G1", a, Megawatts(100.0)).as_slack());
        per_unit::calculate_dependent_values(&mut net);
        topology::analyse(&mut net).unwrap();

        let sn = &net.sub_networks()[0];
        let (_, b) = build(&net, sn).unwrap();
        let row_sum: f64 = (0..sn.buses_o.len()).map(|j| b.get(0, j).copied().unwrap_or(0.0)).sum();
        assert!(row_sum.abs() < 1e-9);
    }
}
