//! Writes a solved LOPF model back onto the `Network` (spec.md §4.6
//! "extract... On success"), following the writer discipline of
//! `power_flow::mod`: everything below reads from the solved vectors and is
//! only ever called after `solver::solve` has already returned `Ok`.

use std::collections::HashMap;

use gridsim_core::units::{Megawatts, MegavoltAmperes};
use gridsim_core::{BusId, DcOpfFormulation, GridSimResult, Network, PassiveBranch};

use super::model::{BalanceKey, BuiltModel};
use super::solver::Solved;
use super::types::LopfSolution;
use crate::power_flow::dc_pf;
use crate::sparse::bh;

/// Write generator, storage, load, branch, and bus series back onto
/// `network`, plus any extended capacities and bus marginal prices.
pub fn apply(network: &mut Network, model: &BuiltModel, solved: &Solved) -> GridSimResult<LopfSolution> {
    let n_snapshots = network.snapshots.len();
    let x = &solved.x;

    for gen in network.generators_mut() {
        if let Some(&col) = model.vars.gen_p_nom.get(&gen.id) {
            gen.p_nom = Megawatts(x[col]);
        }
    }
    for t in 0..n_snapshots {
        for gen_id in model.vars.gen_p.keys().filter(|(_, tt)| *tt == t).map(|(g, _)| *g).collect::<Vec<_>>() {
            let col = model.vars.gen_p[&(gen_id, t)];
            network.generator_mut(gen_id).p_mw[t] = x[col];
        }
    }

    for storage in network.storage_units_mut() {
        if let Some(&col) = model.vars.storage_p_nom.get(&storage.id) {
            storage.p_nom = Megawatts(x[col]);
        }
    }
    for t in 0..n_snapshots {
        let storage_ids: Vec<_> = model.vars.storage_p_dispatch.keys().filter(|(_, tt)| *tt == t).map(|(s, _)| *s).collect();
        for storage_id in storage_ids {
            let dispatch = x[model.vars.storage_p_dispatch[&(storage_id, t)]];
            let store = x[model.vars.storage_p_store[&(storage_id, t)]];
            let storage = network.storage_unit_mut(storage_id);
            storage.p_mw[t] = dispatch - store;
            if let Some(&soc_col) = model.vars.soc.get(&(storage_id, t)) {
                storage.state_of_charge[t] = Some(x[soc_col]);
            }
        }
    }

    for load in network.loads_mut() {
        for t in 0..n_snapshots {
            load.p_mw[t] = load.p_set.get(t).copied().unwrap_or(0.0);
        }
    }

    for cb in network.controllable_branches_mut() {
        for t in 0..n_snapshots {
            if let Some(&col) = model.vars.controllable_p.get(&(cb.id, t)) {
                cb.p0_mw[t] = x[col];
                cb.p1_mw[t] = -x[col];
            }
        }
    }

    for branch in network.passive_branches_mut() {
        if let Some(&col) = model.vars.branch_s_nom.get(&branch.id()) {
            match branch {
                PassiveBranch::Line(l) => l.s_nom = MegavoltAmperes(x[col]),
                PassiveBranch::Transformer(tr) => tr.s_nom = MegavoltAmperes(x[col]),
            }
        }
    }

    // Bus angles, branch flows, and marginal prices.
    let sub_networks = network.sub_networks().to_vec();
    let mut theta_by_bus: HashMap<(BusId, usize), f64> = HashMap::new();
    let mut marginal_price: Vec<Vec<f64>> = vec![vec![0.0; network.buses().len()]; n_snapshots];

    let mut balance_row = 0usize;
    for key in &model.balance_keys {
        let dual = solved.duals.get(balance_row).copied().unwrap_or(0.0);
        match *key {
            BalanceKey::Bus(bus, t) => marginal_price[t][bus.value()] = dual,
            BalanceKey::SubNetwork(sn_id, t) => {
                for sn in &sub_networks {
                    if sn.id == sn_id {
                        for &bus in &sn.buses_o {
                            marginal_price[t][bus.value()] = dual;
                        }
                    }
                }
            }
        }
        balance_row += 1;
    }

    for sn in &sub_networks {
        if sn.branches.is_empty() {
            continue;
        }
        let (h, b) = bh::build(network, sn)?;
        for t in 0..n_snapshots {
            let delta_theta = match network.config.dc_opf_formulation {
                DcOpfFormulation::Angles => sn
                    .buses_o
                    .iter()
                    .map(|&bus| if Some(bus) == sn.slack_bus { 0.0 } else { model.vars.theta.get(&(bus, t)).map(|&c| x[c]).unwrap_or(0.0) })
                    .collect::<Vec<_>>(),
                DcOpfFormulation::Ptdf => {
                    let p = dc_pf::nodal_p(network, sn, t);
                    dc_pf::solve(sn, &b, &h, &p)?.delta_theta
                }
            };

            for (idx, &bus) in sn.buses_o.iter().enumerate() {
                theta_by_bus.insert((bus, t), delta_theta[idx]);
            }

            for (row, &branch_id) in sn.branches.iter().enumerate() {
                let flow: f64 = (0..sn.buses_o.len()).map(|col| h.get(row, col).copied().unwrap_or(0.0) * delta_theta[col]).sum();
                if let PassiveBranch::Line(l) = &mut network.passive_branches_mut()[branch_id.value()] {
                    l.p0_mw[t] = flow;
                    l.p1_mw[t] = -flow;
                } else if let PassiveBranch::Transformer(tr) = &mut network.passive_branches_mut()[branch_id.value()] {
                    tr.p0_mw[t] = flow;
                    tr.p1_mw[t] = -flow;
                }
            }
        }
    }

    for t in 0..n_snapshots {
        for bus in network.buses_mut() {
            if let Some(&theta) = theta_by_bus.get(&(bus.id, t)) {
                match bus.current_type {
                    gridsim_core::CurrentType::Ac => bus.v_ang_rad[t] = theta,
                    gridsim_core::CurrentType::Dc => {
                        bus.v_mag_pu[t] = 1.0 + theta;
                    }
                }
            }
            bus.marginal_price[t] = marginal_price[t][bus.id.value()];
        }
    }

    // Net bus p = sum of signed asset dispatch, minus controllable-branch flow.
    for t in 0..n_snapshots {
        let mut net_p = vec![0.0; network.buses().len()];
        for gen in network.generators() {
            net_p[gen.bus.value()] += gen.sign * gen.p_mw[t];
        }
        for storage in network.storage_units() {
            net_p[storage.bus.value()] += storage.sign * storage.p_mw[t];
        }
        for load in network.loads() {
            net_p[load.bus.value()] += load.sign * load.p_mw[t];
        }
        for cb in network.controllable_branches() {
            net_p[cb.bus0.value()] -= cb.p0_mw[t];
            net_p[cb.bus1.value()] -= cb.p1_mw[t];
        }
        for (idx, bus) in network.buses_mut().iter_mut().enumerate() {
            bus.p_mw[t] = net_p[idx];
        }
    }
    let objective_value: f64 = model.cost.iter().zip(x).map(|(c, v)| c * v).sum::<f64>() + model.cost_constant;
    Ok(LopfSolution { objective_value, snapshot_count: n_snapshots })
}
