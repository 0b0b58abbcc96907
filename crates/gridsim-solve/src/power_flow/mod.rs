//! Per-network power-flow drivers: run the sub-network-level solvers in
//! `ac_pf`/`dc_pf` once per sub-network per snapshot, then write results
//! back onto the `Network` (spec.md §4.4/§4.5, §7 "Result writer").
//!
//! Grounded on `original_source/pf.py::network_pf`/`network_lpf`'s
//! outer loop over `network.sub_networks`.

pub mod ac_pf;
pub mod dc_pf;

use gridsim_core::{CurrentType, GridSimError, GridSimResult, Network, PassiveBranch};
use num_complex::Complex64;

use crate::sparse::{bh, ybus};

/// Run nonlinear AC power flow on every AC sub-network for every snapshot.
/// DC sub-networks are rejected (`original_source/pf.py` raises
/// `NotImplementedError` for exactly this case).
pub fn run_ac_pf_network(network: &mut Network) -> GridSimResult<()> {
    if !network.dependent_values_calculated() {
        return Err(GridSimError::Configuration(
            "per-unit values have not been calculated; call per_unit::calculate_dependent_values first".to_string(),
        ));
    }
    if !network.topology_determined() {
        return Err(GridSimError::Configuration(
            "topology has not been analysed; call topology::analyse first".to_string(),
        ));
    }

    let n_snapshots = network.snapshots.len();
    let sub_networks = network.sub_networks().to_vec();

    // Build results into local buffers first; only write onto `Network`
    // once every sub-network/snapshot combination has succeeded (spec.md §7
    // "failures leave the network state exactly as before the call").
    struct BusResult {
        v_mag: f64,
        v_ang: f64,
    }
    let mut bus_results: Vec<Vec<Option<BusResult>>> = vec![vec![]; n_snapshots];
    let mut branch_results: Vec<Vec<(usize, Complex64, Complex64)>> = vec![vec![]; n_snapshots];

    for sn in &sub_networks {
        if sn.current_type != CurrentType::Ac {
            return Err(GridSimError::NotImplemented(
                "nonlinear power flow for DC sub-networks is not supported".to_string(),
            ));
        }
        let matrices = ybus::build_matrices(network, sn)?;

        for snapshot in 0..n_snapshots {
            let s_spec = ac_pf::nodal_injection(network, sn, snapshot);
            let v_fixed = ac_pf::v_mag_setpoints(network, sn);
            let solution = ac_pf::solve(
                sn,
                &matrices.y,
                &s_spec,
                &v_fixed,
                network.config.nr_x_tol,
                network.config.nr_max_iterations,
            )?;

            for (idx, &bus) in sn.buses_o.iter().enumerate() {
                let entry = &mut bus_results[snapshot];
                if entry.len() <= bus.value() {
                    entry.resize_with(network.buses().len(), || None);
                }
                entry[bus.value()] = Some(BusResult {
                    v_mag: solution.voltages[idx].norm(),
                    v_ang: solution.voltages[idx].arg(),
                });
            }

            for (row, &branch_id) in sn.branches.iter().enumerate() {
                let from_idx = sn.index_of(network.passive_branches()[branch_id.value()].bus0()).unwrap();
                let to_idx = sn.index_of(network.passive_branches()[branch_id.value()].bus1()).unwrap();
                let v_from = solution.voltages[from_idx];
                let v_to = solution.voltages[to_idx];
                let i0: Complex64 = matrices.y0.outer_view(row).unwrap().iter().map(|(c, v)| *v * solution.voltages[c]).sum();
                let i1: Complex64 = matrices.y1.outer_view(row).unwrap().iter().map(|(c, v)| *v * solution.voltages[c]).sum();
                let s0 = v_from * i0.conj();
                let s1 = v_to * i1.conj();
                branch_results[snapshot].push((branch_id.value(), s0, s1));
            }
        }
    }

    for snapshot in 0..n_snapshots {
        for (bus_idx, result) in bus_results[snapshot].iter().enumerate() {
            if let Some(r) = result {
                let bus = network.buses_mut().get_mut(bus_idx).expect("bus index in range");
                bus.v_mag_pu[snapshot] = r.v_mag;
                bus.v_ang_rad[snapshot] = r.v_ang;
            }
        }
        for &(branch_idx, s0, s1) in &branch_results[snapshot] {
            if let PassiveBranch::Line(l) = &mut network.passive_branches_mut()[branch_idx] {
                l.p0_mw[snapshot] = s0.re;
                l.q0_mvar[snapshot] = s0.im;
                l.p1_mw[snapshot] = s1.re;
                l.q1_mvar[snapshot] = s1.im;
            } else if let PassiveBranch::Transformer(t) = &mut network.passive_branches_mut()[branch_idx] {
                t.p0_mw[snapshot] = s0.re;
                t.q0_mvar[snapshot] = s0.im;
                t.p1_mw[snapshot] = s1.re;
                t.q1_mvar[snapshot] = s1.im;
            }
        }
    }

    Ok(())
}

/// Run linear DC power flow on every sub-network for every snapshot.
pub fn run_dc_pf_network(network: &mut Network) -> GridSimResult<()> {
    if !network.dependent_values_calculated() {
        return Err(GridSimError::Configuration(
            "per-unit values have not been calculated; call per_unit::calculate_dependent_values first".to_string(),
        ));
    }
    if !network.topology_determined() {
        return Err(GridSimError::Configuration(
            "topology has not been analysed; call topology::analyse first".to_string(),
        ));
    }

    let n_snapshots = network.snapshots.len();
    let sub_networks = network.sub_networks().to_vec();

    let mut delta_theta_by_snapshot: Vec<Vec<(usize, f64)>> = vec![vec![]; n_snapshots];
    let mut branch_flow_by_snapshot: Vec<Vec<(usize, f64)>> = vec![vec![]; n_snapshots];

    for sn in &sub_networks {
        let (h, b) = bh::build(network, sn)?;

        for snapshot in 0..n_snapshots {
            let p = dc_pf::nodal_p(network, sn, snapshot);
            let solution = dc_pf::solve(sn, &b, &h, &p)?;

            for (idx, &bus) in sn.buses_o.iter().enumerate() {
                delta_theta_by_snapshot[snapshot].push((bus.value(), solution.delta_theta[idx]));
            }
            for (row, &branch_id) in sn.branches.iter().enumerate() {
                branch_flow_by_snapshot[snapshot].push((branch_id.value(), solution.branch_flow[row]));
            }
        }
    }

    for snapshot in 0..n_snapshots {
        for &(bus_idx, delta_theta) in &delta_theta_by_snapshot[snapshot] {
            let bus = &mut network.buses_mut()[bus_idx];
            match bus.current_type {
                CurrentType::Ac => bus.v_ang_rad[snapshot] = delta_theta,
                CurrentType::Dc => {
                    bus.v_mag_pu[snapshot] = 1.0 + delta_theta;
                }
            }
        }
        for &(branch_idx, flow) in &branch_flow_by_snapshot[snapshot] {
            match &mut network.passive_branches_mut()[branch_idx] {
                PassiveBranch::Line(l) => l.p0_mw[snapshot] = flow,
                PassiveBranch::Transformer(t) => t.p0_mw[snapshot] = flow,
            }
        }
    }

    Ok(())
}
