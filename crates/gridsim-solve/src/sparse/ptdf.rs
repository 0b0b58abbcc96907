//! Power Transfer Distribution Factor matrix (spec.md §4.3 "PTDF").
//!
//! Grounded on `original_source/pf.py::calculate_PTDF`: invert the reduced
//! (slack row/column dropped) susceptance matrix, pad a zero row/column back
//! in for the slack, then `PTDF = H . B_inv`.

use faer::prelude::*;
use faer::Mat;
use gridsim_core::{GridSimError, GridSimResult, Network, SubNetwork};
use sprs::{CsMat, TriMat};

/// Compute the PTDF matrix for `sub_network`, given its already-built `H`
/// and `B`. Entries below `tolerance` in absolute value are dropped.
pub fn build(h: &CsMat<f64>, b: &CsMat<f64>, tolerance: f64) -> GridSimResult<CsMat<f64>> {
    let n_buses = b.rows();
    let n_branches = h.rows();

    if n_buses <= 1 {
        // Degenerate shape: only the slack bus, nothing to distribute across.
        return Ok(TriMat::new((n_branches, n_buses)).to_csr());
    }

    let n_reduced = n_buses - 1;
    let mut b_reduced = Mat::<f64>::zeros(n_reduced, n_reduced);
    for i in 0..n_reduced {
        for j in 0..n_reduced {
            let value = b.get(i + 1, j + 1).copied().unwrap_or(0.0);
            b_reduced.write(i, j, value);
        }
    }

    let lu = b_reduced.partial_piv_lu();
    let identity = Mat::<f64>::identity(n_reduced, n_reduced);
    let b_inv_reduced = lu.solve(&identity);

    // Pad the slack row/column back in as zeros.
    let mut b_inv = Mat::<f64>::zeros(n_buses, n_buses);
    for i in 0..n_reduced {
        for j in 0..n_reduced {
            b_inv.write(i + 1, j + 1, b_inv_reduced.read(i, j));
        }
    }

    // PTDF = H . B_inv, dense accumulation since H is usually small per
    // sub-network; sparsify the result afterwards.
    let mut ptdf = TriMat::new((n_branches, n_buses));
    for row in 0..n_branches {
        let h_row: Vec<f64> = (0..n_buses).map(|col| h.get(row, col).copied().unwrap_or(0.0)).collect();
        for col in 0..n_buses {
            let mut value = 0.0;
            for k in 0..n_buses {
                value += h_row[k] * b_inv.read(k, col);
            }
            if value.abs() > tolerance {
                ptdf.add_triplet(row, col, value);
            }
        }
    }

    Ok(ptdf.to_csr())
}

/// Build and cache the PTDF matrix for `sub_network`, using its
/// already-computed `H`/`B` matrices and the network's `ptdf_tolerance`.
pub fn build_for_sub_network(network: &Network, sub_network: &SubNetwork, matrices: &mut super::SubNetworkMatrices) -> GridSimResult<()> {
    if matrices.ptdf.is_some() {
        return Ok(());
    }
    if sub_network.branches.is_empty() {
        return Err(GridSimError::Topology(format!(
            "sub-network {} has no branches; PTDF is undefined",
            sub_network.id
        )));
    }
    let ptdf = build(&matrices.h, &matrices.b, network.config.ptdf_tolerance)?;
    matrices.ptdf = Some(ptdf);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsim_core::units::{Kilovolts, MegavoltAmperes, Megawatts};
    use gridsim_core::{per_unit, topology, Bus, BusId, BranchId, CurrentType, GenId, Generator, Line};

    #[test]
    fn ptdf_for_two_bus_line_is_plus_minus_one() {
        let mut net = Network::new();
        let a = net.add_bus(Bus::new(BusId(0), "A", Kilovolts(400.0), CurrentType::Ac));
        let b_bus = net.add_bus(Bus::new(BusId(0), "B", Kilovolts(400.0), CurrentType::Ac));
        net.add_line(Line::new(BranchId(0), "A-B", a, b_bus, 0.0, 50.0, MegavoltAmperes(500.0)))
            .unwrap();
        net.add_generator(Generator::new(GenId(0), "G1", a, Megawatts(100.0)).as_slack());
        per_unit::calculate_dependent_values(&mut net);
        topology::analyse(&mut net).unwrap();

        let sn = &net.sub_networks()[0];
        let (h, b) = super::super::bh::build(&net, sn).unwrap();
        let ptdf = build(&h, &b, 1e-8).unwrap();

        // A single line carries 100% of any injection at the non-slack bus.
        let non_slack_col = sn.index_of(b_bus).unwrap();
        let value = ptdf.get(0, non_slack_col).copied().unwrap_or(0.0);
        assert!((value.abs() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn ptdf_is_empty_for_single_bus_sub_network() {
        let mut net = Network::new();
        net.add_bus(Bus::new(BusId(0), "A", Kilovolts(400.0), CurrentType::Ac));
        topology::analyse(&mut net).unwrap();
        let sn = &net.sub_networks()[0];
        let (h, b) = super::super::bh::build(&net, sn).unwrap();
        let ptdf = build(&h, &b, 1e-8).unwrap();
        assert_eq!(ptdf.rows(), 0);
    }
}
