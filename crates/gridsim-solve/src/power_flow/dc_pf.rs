//! Linear (DC) power flow (spec.md §4.5).
//!
//! Grounded on `original_source/pf.py::sub_network_lpf`: reduced `B` solve
//! for the non-slack angles, branch flows recovered as `H . Δθ`, slack
//! absorbs the imbalance.

use faer::prelude::*;
use faer::Mat;
use gridsim_core::{GridSimError, GridSimResult, Network, SubNetwork};
use sprs::CsMat;

/// Result of a DC power flow solve for one sub-network/snapshot.
#[derive(Debug, Clone)]
pub struct DcPowerFlowSolution {
    /// Δθ (AC) or Δθ·v_nom (DC), in `buses_o` order, slack entry always 0.
    pub delta_theta: Vec<f64>,
    /// Flow per branch, in sub-network branch order.
    pub branch_flow: Vec<f64>,
    /// Nodal net injection used as the right-hand side, in `buses_o` order.
    pub nodal_p: Vec<f64>,
}

/// Nodal real-power injection including shunt conductance (spec.md §4.5
/// "compute nodal p as in 4.4 (plus shunts' real conductance)").
pub fn nodal_p(network: &Network, sub_network: &SubNetwork, snapshot: usize) -> Vec<f64> {
    let mut p = vec![0.0; sub_network.buses_o.len()];
    for (idx, &bus) in sub_network.buses_o.iter().enumerate() {
        let mut value = 0.0;
        for gen in network.generators_at_bus(bus) {
            value += gen.sign * gen.p_set.get(snapshot).copied().unwrap_or(0.0);
        }
        for load in network.loads_at_bus(bus) {
            value += load.sign * load.p_set.get(snapshot).copied().unwrap_or(0.0);
        }
        for shunt in network.shunts_at_bus(bus) {
            value -= shunt.g_pu;
        }
        for cb in network.controllable_branches() {
            if cb.bus0 == bus {
                value -= cb.p0_mw.get(snapshot).copied().unwrap_or(0.0);
            }
            if cb.bus1 == bus {
                value -= cb.p1_mw.get(snapshot).copied().unwrap_or(0.0);
            }
        }
        p[idx] = value;
    }
    p
}

/// Solve `B[1:,1:] . Δθ[1:] = p[1:]`, `Δθ[0] = 0`, then `flow = H . Δθ`.
pub fn solve(sub_network: &SubNetwork, b: &CsMat<f64>, h: &CsMat<f64>, p: &[f64]) -> GridSimResult<DcPowerFlowSolution> {
    let n = sub_network.buses_o.len();
    let mut delta_theta = vec![0.0; n];

    if sub_network.branches.is_empty() {
        return Ok(DcPowerFlowSolution {
            delta_theta,
            branch_flow: Vec::new(),
            nodal_p: p.to_vec(),
        });
    }

    if n > 1 {
        let n_reduced = n - 1;
        let mut b_reduced = Mat::<f64>::zeros(n_reduced, n_reduced);
        for i in 0..n_reduced {
            for j in 0..n_reduced {
                b_reduced.write(i, j, b.get(i + 1, j + 1).copied().unwrap_or(0.0));
            }
        }
        let mut rhs = Mat::<f64>::zeros(n_reduced, 1);
        for i in 0..n_reduced {
            rhs.write(i, 0, p[i + 1]);
        }

        let lu = b_reduced.partial_piv_lu();
        let solution = lu.solve(&rhs);
        for i in 0..n_reduced {
            let v = solution.read(i, 0);
            if !v.is_finite() {
                return Err(GridSimError::Other(format!(
                    "DC power flow solve produced a non-finite angle for sub-network {}",
                    sub_network.id
                )));
            }
            delta_theta[i + 1] = v;
        }
    }

    let n_branches = h.rows();
    let mut branch_flow = vec![0.0; n_branches];
    for row in 0..n_branches {
        let mut value = 0.0;
        for col in 0..n {
            value += h.get(row, col).copied().unwrap_or(0.0) * delta_theta[col];
        }
        branch_flow[row] = value;
    }

    Ok(DcPowerFlowSolution { delta_theta, branch_flow, nodal_p: p.to_vec() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsim_core::units::{Kilovolts, MegavoltAmperes, Megawatts};
    use gridsim_core::{per_unit, topology, Bus, BusId, BranchId, CurrentType, GenId, Generator, Line, Load, LoadId};

    #[test]
    fn flow_equals_injection_for_radial_two_bus_network() {
        let mut net = Network::new();
        let a = net.add_bus(Bus::new(BusId(0), "A", Kilovolts(400.0), CurrentType::Ac));
        let b_bus = net.add_bus(Bus::new(BusId(0), "B", Kilovolts(400.0), CurrentType::Ac));
        net.add_line(Line::new(BranchId(0), "A-B", a, b_bus, 0.0, 50.0, MegavoltAmperes(500.0)))
            .unwrap();
        net.add_generator(Generator::new(GenId(0), "G1", a, Megawatts(100.0)).as_slack());
        net.add_load(Load::new(LoadId(0), "L1", b_bus));
        net.loads_mut()[0].p_set = vec![0.3];
        per_unit::calculate_dependent_values(&mut net);
        topology::analyse(&mut net).unwrap();

        let sn = net.sub_networks()[0].clone();
        let (h, b) = crate::sparse::bh::build(&net, &sn).unwrap();
        let p = nodal_p(&net, &sn, 0);
        let solution = solve(&sn, &b, &h, &p).unwrap();

        assert!((solution.branch_flow[0] - (-0.3)).abs() < 1e-9);
    }
}
