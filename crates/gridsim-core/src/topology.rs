//! Topology analyser: partitions a [`Network`] into synchronous sub-networks
//! and classifies each bus as Slack / PV / PQ (spec.md §4.2).
//!
//! Grounded on `original_source/pf.py::network_pf`'s `determine_network_topology`
//! (connected-components over the passive-branch graph) and its
//! `find_slack_bus`/`find_bus_controls` (bus-control promotion/demotion).

use std::collections::{HashSet, VecDeque};

use crate::{BranchRef, BusControl, BusId, DispatchKind, GridSimResult, Network, SubNetwork, SubNetworkId};

/// Recompute sub-networks and bus control classification from scratch.
///
/// Step 1-2 of spec.md §4.2 (build the multigraph, then drop controllable
/// edges) collapse here into a BFS that only ever traverses
/// `BranchRef::Passive` edges — `graph()` already holds both edge kinds, so
/// there is no need to materialise a second, reduced graph.
pub fn analyse(network: &mut Network) -> GridSimResult<()> {
    let n_buses = network.buses().len();
    let mut visited = vec![false; n_buses];
    let mut sub_networks = Vec::new();

    for start in 0..n_buses {
        if visited[start] {
            continue;
        }
        let mut members = Vec::new();
        let mut branch_ids = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(BusId::new(start));
        visited[start] = true;

        while let Some(bus) = queue.pop_front() {
            members.push(bus);
            let node = network.node_index(bus);
            for edge in network.graph().edges(node) {
                let BranchRef::Passive(idx) = *edge.weight() else {
                    continue;
                };
                branch_ids.insert(idx);
                let neighbour = network.graph()[edge.target()];
                if !visited[neighbour.value()] {
                    visited[neighbour.value()] = true;
                    queue.push_back(neighbour);
                }
            }
        }

        members.sort_by_key(|b| b.value());
        let current_type = network.bus(members[0]).current_type;
        let id = SubNetworkId::new(sub_networks.len());
        let mut branches: Vec<_> = branch_ids.into_iter().collect();
        branches.sort_unstable();
        let branches = branches
            .into_iter()
            .map(|idx| network.passive_branches()[idx].id())
            .collect();

        sub_networks.push(SubNetwork {
            id,
            current_type,
            buses: members,
            branches,
            slack_bus: None,
            slack_generator: None,
            buses_o: Vec::new(),
            pvs: Vec::new(),
            pqs: Vec::new(),
        });
    }

    for sn in &mut sub_networks {
        classify_bus_controls(network, sn);
    }

    for sn in &sub_networks {
        for &bus in &sn.buses {
            network.bus_mut(bus).sub_network = Some(sn.id);
        }
    }
    for sn in &sub_networks {
        for &branch_id in &sn.branches {
            for branch in network.passive_branches_mut() {
                if branch.id() == branch_id {
                    branch.set_sub_network(sn.id);
                    break;
                }
            }
        }
    }

    network.set_sub_networks(sub_networks);
    network.mark_topology_determined();
    Ok(())
}

/// Slack/PV/PQ selection for one sub-network (spec.md §4.2 "Slack and
/// bus-control selection"). Iterates generators in `Network` storage order
/// (entity-index order), matching the original's tie-break of "keep the
/// first Slack generator found, demote the rest" rather than sorting first.
fn classify_bus_controls(network: &mut Network, sn: &mut SubNetwork) {
    let member_buses: HashSet<BusId> = sn.buses.iter().copied().collect();

    let sub_generators: Vec<_> = network
        .generators()
        .iter()
        .filter(|g| member_buses.contains(&g.bus))
        .collect();

    if sub_generators.is_empty() {
        sn.slack_bus = Some(sn.buses[0]);
        sn.slack_generator = None;
    } else {
        let slack_candidates: Vec<_> = sub_generators
            .iter()
            .copied()
            .filter(|g| g.control == BusControl::Slack)
            .collect();
        let chosen = if let Some(first_slack) = slack_candidates.first() {
            if slack_candidates.len() > 1 {
                tracing::debug!(
                    sub_network = sn.id.value(),
                    kept = %first_slack.name,
                    demoted = slack_candidates.len() - 1,
                    "multiple slack generators on sub-network; keeping the first and demoting the rest to PV"
                );
            }
            *first_slack
        } else {
            // No generator marked Slack: promote the first generator found.
            let promoted = sub_generators[0];
            tracing::warn!(
                sub_network = sn.id.value(),
                bus = promoted.bus.value(),
                generator = %promoted.name,
                "no slack generator found; promoting first generator on sub-network"
            );
            promoted
        };
        sn.slack_bus = Some(chosen.bus);
        sn.slack_generator = Some(chosen.id);
    }

    let slack_bus = sn.slack_bus.unwrap();

    let mut pv_buses = Vec::new();
    let mut seen_pv = HashSet::new();
    for gen in &sub_generators {
        if gen.bus == slack_bus {
            continue;
        }
        let is_pv_control = gen.control == BusControl::Pv
            || (gen.control == BusControl::Slack && Some(gen.id) != sn.slack_generator);
        if is_pv_control && seen_pv.insert(gen.bus) {
            pv_buses.push(gen.bus);
        }
    }
    pv_buses.sort_by_key(|b| b.value());

    let pv_set: HashSet<BusId> = pv_buses.iter().copied().collect();
    let pq_buses: Vec<_> = sn
        .buses
        .iter()
        .copied()
        .filter(|b| *b != slack_bus && !pv_set.contains(b))
        .collect();

    for &bus in &sn.buses {
        let control = if bus == slack_bus {
            BusControl::Slack
        } else if pv_set.contains(&bus) {
            BusControl::Pv
        } else {
            BusControl::Pq
        };
        network.bus_mut(bus).control = control;
    }

    sn.pvs = pv_buses;
    sn.pqs = pq_buses;
    sn.buses_o = std::iter::once(slack_bus).chain(sn.pvpqs()).collect();
}

/// `true` if the generator's dispatch is pinned rather than a free decision
/// variable — used by `gridsim-solve`'s LOPF builder, not by topology
/// classification itself, but grounded alongside it since both read
/// `DispatchKind`.
pub fn is_inflexible(dispatch: DispatchKind) -> bool {
    matches!(dispatch, DispatchKind::Inflexible)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{Kilovolts, MegavoltAmperes, Megawatts, PerUnit};
    use crate::{Bus, BusId, BranchId, CurrentType, GenId, Generator, Line};

    fn two_bus_network() -> Network {
        let mut net = Network::new();
        let a = net.add_bus(Bus::new(BusId(0), "A", Kilovolts(400.0), CurrentType::Ac));
        let b = net.add_bus(Bus::new(BusId(0), "B", Kilovolts(400.0), CurrentType::Ac));
        net.add_line(Line::new(BranchId(0), "A-B", a, b, 0.01, 0.1, MegavoltAmperes(500.0)))
            .unwrap();
        net.add_generator(Generator::new(GenId(0), "G1", a, Megawatts(200.0)).as_slack());
        net
    }

    #[test]
    fn single_component_yields_one_sub_network() {
        let mut net = two_bus_network();
        analyse(&mut net).unwrap();
        assert_eq!(net.sub_networks().len(), 1);
        assert_eq!(net.sub_networks()[0].buses.len(), 2);
    }

    #[test]
    fn isolated_bus_forms_its_own_sub_network() {
        let mut net = two_bus_network();
        net.add_bus(Bus::new(BusId(0), "Isolated", Kilovolts(400.0), CurrentType::Ac));
        analyse(&mut net).unwrap();
        assert_eq!(net.sub_networks().len(), 2);
    }

    #[test]
    fn explicit_slack_generator_is_chosen() {
        let mut net = two_bus_network();
        analyse(&mut net).unwrap();
        let sn = &net.sub_networks()[0];
        assert_eq!(sn.slack_bus, Some(BusId(0)));
        assert_eq!(net.bus(BusId(0)).control, BusControl::Slack);
    }

    #[test]
    fn first_generator_promoted_to_slack_when_none_marked() {
        let mut net = Network::new();
        let a = net.add_bus(Bus::new(BusId(0), "A", Kilovolts(400.0), CurrentType::Ac));
        let b = net.add_bus(Bus::new(BusId(0), "B", Kilovolts(400.0), CurrentType::Ac));
        net.add_line(Line::new(BranchId(0), "A-B", a, b, 0.01, 0.1, MegavoltAmperes(500.0)))
            .unwrap();
        net.add_generator(Generator::new(GenId(0), "G1", a, Megawatts(100.0)));
        net.add_generator(Generator::new(GenId(0), "G2", b, Megawatts(100.0)));

        analyse(&mut net).unwrap();

        let sn = &net.sub_networks()[0];
        assert_eq!(sn.slack_bus, Some(a));
        assert_eq!(net.bus(a).control, BusControl::Slack);
    }

    #[test]
    fn pv_bus_classified_from_attached_generator() {
        let mut net = two_bus_network();
        let b = net.buses()[1].id;
        net.add_generator(Generator::new(GenId(0), "G2", b, Megawatts(50.0)).as_pv(PerUnit(1.02)));
        analyse(&mut net).unwrap();
        assert_eq!(net.bus(b).control, BusControl::Pv);
        assert_eq!(net.sub_networks()[0].pvs, vec![b]);
    }

    #[test]
    fn bus_with_no_generator_is_pq() {
        let mut net = two_bus_network();
        let b = net.buses()[1].id;
        analyse(&mut net).unwrap();
        assert_eq!(net.bus(b).control, BusControl::Pq);
        assert_eq!(net.sub_networks()[0].pqs, vec![b]);
    }

    #[test]
    fn buses_o_is_slack_followed_by_pvpqs() {
        let mut net = two_bus_network();
        analyse(&mut net).unwrap();
        let sn = &net.sub_networks()[0];
        assert_eq!(sn.buses_o[0], sn.slack_bus.unwrap());
        assert_eq!(sn.buses_o.len(), sn.buses.len());
    }

    #[test]
    fn sub_network_with_no_generators_uses_first_bus_as_slack() {
        let mut net = Network::new();
        let a = net.add_bus(Bus::new(BusId(0), "A", Kilovolts(400.0), CurrentType::Ac));
        let b = net.add_bus(Bus::new(BusId(0), "B", Kilovolts(400.0), CurrentType::Ac));
        net.add_line(Line::new(BranchId(0), "A-B", a, b, 0.01, 0.1, MegavoltAmperes(500.0)))
            .unwrap();
        analyse(&mut net).unwrap();
        assert_eq!(net.sub_networks()[0].slack_bus, Some(a));
        assert!(net.sub_networks()[0].slack_generator.is_none());
    }
}
