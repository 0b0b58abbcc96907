//! Optional topology utilities that sit alongside, but do not feed, the
//! solvers in this crate (spec.md §4.7).
//!
//! Grounded on `original_source/pf.py`: `aggregate_multi_graph` (parallel-line
//! reduction), `find_tree` (minimum spanning tree + per-branch orientation),
//! and `find_cycles` (fundamental cycle basis). `find_tree`/`find_cycles` are
//! the basis PTDF and the transport-model cycle constraints use internally in
//! the original; here they're exposed standalone for callers who want the
//! decomposition without running a full solve.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::unionfind::UnionFind;

use gridsim_core::{BranchId, BusId, GridSimResult, Line, Network, PassiveBranch, SubNetwork};

/// Build a new network with parallel lines between the same bus pair
/// collapsed to a single equivalent line. Non-destructive: `network` is left
/// untouched and the result still needs [`gridsim_core::per_unit`] and
/// [`gridsim_core::topology::analyse`] run on it before it can be solved,
/// since branch ids and per-unit fields are freshly assigned.
///
/// Matches `aggregate_multi_graph`: series reactance/resistance combine as a
/// harmonic sum (parallel impedances), shunt admittance and thermal limits
/// sum, and cost/length average over the parallel group. Transformers and
/// controllable branches are never aggregated.
pub fn aggregate_parallel_branches(network: &Network) -> Network {
    let mut groups: HashMap<(BusId, BusId), Vec<usize>> = HashMap::new();
    for (idx, branch) in network.passive_branches().iter().enumerate() {
        if let PassiveBranch::Line(_) = branch {
            let key = ordered_pair(branch.bus0(), branch.bus1());
            groups.entry(key).or_default().push(idx);
        }
    }

    let mut aggregated: HashMap<usize, Line> = HashMap::new();
    let mut dropped: HashSet<usize> = HashSet::new();
    for idxs in groups.values() {
        if idxs.len() < 2 {
            continue;
        }
        let lines: Vec<&Line> = idxs
            .iter()
            .map(|&i| match &network.passive_branches()[i] {
                PassiveBranch::Line(l) => l,
                PassiveBranch::Transformer(_) => unreachable!("grouped by Line variant above"),
            })
            .collect();
        aggregated.insert(idxs[0], combine_parallel_lines(&lines));
        for &i in &idxs[1..] {
            dropped.insert(i);
        }
    }

    let mut result = Network::new();
    result.config = network.config.clone();
    for bus in network.buses() {
        result.add_bus(bus.clone());
    }
    for source in network.sources() {
        result.add_source(source.clone());
    }
    for gen in network.generators() {
        result.add_generator(gen.clone());
    }
    for storage in network.storage_units() {
        result.add_storage_unit(storage.clone());
    }
    for load in network.loads() {
        result.add_load(load.clone());
    }
    for shunt in network.shunts() {
        result.add_shunt(shunt.clone());
    }
    for (idx, branch) in network.passive_branches().iter().enumerate() {
        if dropped.contains(&idx) {
            continue;
        }
        match branch {
            PassiveBranch::Line(l) => {
                let line = aggregated.remove(&idx).unwrap_or_else(|| l.clone());
                result.add_line(line).expect("endpoints copied from source network");
            }
            PassiveBranch::Transformer(t) => {
                result.add_transformer(t.clone()).expect("endpoints copied from source network");
            }
        }
    }
    for cb in network.controllable_branches() {
        result.add_controllable_branch(cb.clone()).expect("endpoints copied from source network");
    }
    result.set_snapshots(network.snapshots.clone(), network.snapshot_weightings.clone());
    result
}

fn ordered_pair(a: BusId, b: BusId) -> (BusId, BusId) {
    if a.value() <= b.value() {
        (a, b)
    } else {
        (b, a)
    }
}

fn combine_parallel_lines(lines: &[&Line]) -> Line {
    let first = lines[0];
    let n = lines.len() as f64;
    let harmonic = |f: fn(&Line) -> f64| -> f64 { 1.0 / lines.iter().map(|l| 1.0 / f(l)).sum::<f64>() };
    let sum = |f: fn(&Line) -> f64| -> f64 { lines.iter().map(|l| f(l)).sum() };
    let mean = |f: fn(&Line) -> f64| -> f64 { lines.iter().map(|l| f(l)).sum::<f64>() / n };

    let mut combined = Line::new(
        first.id,
        first.name.clone(),
        first.bus0,
        first.bus1,
        harmonic(|l| l.r),
        harmonic(|l| l.x),
        gridsim_core::units::MegavoltAmperes(sum(|l| l.s_nom.0)),
    );
    combined.g = sum(|l| l.g);
    combined.b = sum(|l| l.b);
    combined.s_nom_min = gridsim_core::units::MegavoltAmperes(sum(|l| l.s_nom_min.0));
    combined.s_nom_max = gridsim_core::units::MegavoltAmperes(sum(|l| l.s_nom_max.0));
    combined.capital_cost = mean(|l| l.capital_cost);
    combined.length = mean(|l| l.length);
    combined.s_nom_extendable = lines.iter().any(|l| l.s_nom_extendable);
    combined
}

/// One branch's place in a sub-network's spanning tree: the buses it feeds
/// downstream of the slack, and the sign convention for positive flow
/// relative to the branch's own `bus0`/`bus1` orientation (`find_tree`).
#[derive(Debug, Clone)]
pub struct TreeBranch {
    pub branch: BranchId,
    /// `+1` if the branch's `bus0 -> bus1` direction points away from the
    /// slack along the tree, `-1` if it points toward the slack.
    pub sign: f64,
}

/// Minimum spanning tree of a sub-network's branches, rooted at the
/// highest-degree bus (`find_tree`'s slack choice, independent of the bus
/// actually marked `slack_bus` by [`gridsim_core::topology::analyse`]).
#[derive(Debug, Clone)]
pub struct SpanningTree {
    pub root: BusId,
    pub tree_branches: Vec<TreeBranch>,
    /// Branches in `sub_network.branches` that did not end up in the tree.
    pub cycle_branches: Vec<BranchId>,
}

/// Build the minimum spanning tree of a sub-network's branch set, treating
/// every branch as unit weight (the original weights by `r`/`x`; absent a
/// clear per-call choice between the two here, unit weight keeps the
/// selection deterministic and reproducible from topology alone).
pub fn find_tree(network: &Network, sn: &SubNetwork) -> GridSimResult<SpanningTree> {
    let root = highest_degree_bus(network, sn);

    // Kruskal's with unit weights: any spanning tree works since all weights
    // are equal, so insertion order over `sn.branches` already gives one.
    let bus_index: HashMap<BusId, usize> = sn.buses_o.iter().copied().enumerate().collect();
    let mut uf = UnionFind::new(sn.buses_o.len());
    let mut tree_set = HashSet::new();
    let mut cycle_branches = Vec::new();

    for &branch_id in &sn.branches {
        let branch = &network.passive_branches()[branch_id.value()];
        let (a, b) = (bus_index[&branch.bus0()], bus_index[&branch.bus1()]);
        if uf.find(a) != uf.find(b) {
            uf.union(a, b);
            tree_set.insert(branch_id);
        } else {
            cycle_branches.push(branch_id);
        }
    }

    // Orient each tree branch by BFS distance from `root`: a branch points
    // "away from the slack" if its bus1 is farther from root than its bus0.
    let mut adjacency: HashMap<BusId, Vec<(BusId, BranchId)>> = HashMap::new();
    for &branch_id in &tree_set {
        let branch = &network.passive_branches()[branch_id.value()];
        adjacency.entry(branch.bus0()).or_default().push((branch.bus1(), branch_id));
        adjacency.entry(branch.bus1()).or_default().push((branch.bus0(), branch_id));
    }
    let mut depth: HashMap<BusId, usize> = HashMap::new();
    depth.insert(root, 0);
    let mut queue = VecDeque::new();
    queue.push_back(root);
    while let Some(bus) = queue.pop_front() {
        let d = depth[&bus];
        for &(neighbour, _) in adjacency.get(&bus).into_iter().flatten() {
            if !depth.contains_key(&neighbour) {
                depth.insert(neighbour, d + 1);
                queue.push_back(neighbour);
            }
        }
    }

    let mut tree_branches = Vec::with_capacity(tree_set.len());
    for &branch_id in &tree_set {
        let branch = &network.passive_branches()[branch_id.value()];
        let (bus0, bus1) = (branch.bus0(), branch.bus1());
        let sign = if depth.get(&bus1).copied().unwrap_or(0) > depth.get(&bus0).copied().unwrap_or(0) { 1.0 } else { -1.0 };
        tree_branches.push(TreeBranch { branch: branch_id, sign });
    }

    Ok(SpanningTree { root, tree_branches, cycle_branches })
}

/// One fundamental cycle induced by a non-tree branch: the tree branches it
/// closes the loop through, signed by whether traversing the cycle in the
/// non-tree branch's `bus0 -> bus1` direction agrees with that tree branch's
/// own orientation (`find_cycles`).
#[derive(Debug, Clone)]
pub struct Cycle {
    pub closing_branch: BranchId,
    pub members: Vec<(BranchId, f64)>,
}

/// Fundamental cycle basis of a sub-network, one cycle per branch left out
/// of [`find_tree`]'s spanning tree. `petgraph` has no direct equivalent of
/// networkx's `cycle_basis`, so this walks each non-tree branch's two
/// endpoints up to their lowest common ancestor in the tree.
pub fn find_cycles(network: &Network, sn: &SubNetwork, tree: &SpanningTree) -> Vec<Cycle> {
    let mut parent: HashMap<BusId, (BusId, BranchId, f64)> = HashMap::new();
    let mut adjacency: HashMap<BusId, Vec<(BusId, BranchId, f64)>> = HashMap::new();
    for tb in &tree.tree_branches {
        let branch = &network.passive_branches()[tb.branch.value()];
        let (bus0, bus1) = (branch.bus0(), branch.bus1());
        adjacency.entry(bus0).or_default().push((bus1, tb.branch, tb.sign));
        adjacency.entry(bus1).or_default().push((bus0, tb.branch, -tb.sign));
    }
    let mut visited = HashSet::new();
    visited.insert(tree.root);
    let mut queue = VecDeque::new();
    queue.push_back(tree.root);
    while let Some(bus) = queue.pop_front() {
        for &(neighbour, branch_id, sign) in adjacency.get(&bus).into_iter().flatten() {
            if visited.insert(neighbour) {
                parent.insert(neighbour, (bus, branch_id, sign));
                queue.push_back(neighbour);
            }
        }
    }

    // `ancestors` walks from `bus` up to the root, each entry's edge being the
    // one that leads back toward `bus` (i.e. not the edge to its own parent).
    let ancestors = |bus: BusId| -> Vec<BusId> {
        let mut chain = vec![bus];
        let mut cur = bus;
        while let Some(&(p, _, _)) = parent.get(&cur) {
            chain.push(p);
            cur = p;
        }
        chain
    };
    // Edges from `bus` up to (excluding) `lca`, signed in the away-from-root
    // convention `find_tree` uses for `tree_branches`.
    let edges_to = |bus: BusId, lca: BusId| -> Vec<(BranchId, f64)> {
        let mut edges = Vec::new();
        let mut cur = bus;
        while cur != lca {
            let &(p, branch_id, sign) = parent.get(&cur).expect("bus reachable from tree root");
            edges.push((branch_id, -sign));
            cur = p;
        }
        edges
    };

    let mut cycles = Vec::with_capacity(tree.cycle_branches.len());
    for &closing in &tree.cycle_branches {
        let branch = &network.passive_branches()[closing.value()];
        let (bus0, bus1) = (branch.bus0(), branch.bus1());
        let ancestors0 = ancestors(bus0);
        let on_ancestors1: HashSet<BusId> = ancestors(bus1).into_iter().collect();
        let lca = ancestors0.into_iter().find(|b| on_ancestors1.contains(b)).unwrap_or(tree.root);

        let mut members = vec![(closing, 1.0)];
        members.extend(edges_to(bus0, lca));
        members.extend(edges_to(bus1, lca).into_iter().map(|(branch_id, sign)| (branch_id, -sign)));
        cycles.push(Cycle { closing_branch: closing, members });
    }
    cycles
}

fn highest_degree_bus(network: &Network, sn: &SubNetwork) -> BusId {
    let mut degree: HashMap<BusId, usize> = sn.buses_o.iter().map(|&b| (b, 0)).collect();
    for &branch_id in &sn.branches {
        let branch = &network.passive_branches()[branch_id.value()];
        *degree.entry(branch.bus0()).or_insert(0) += 1;
        *degree.entry(branch.bus1()).or_insert(0) += 1;
    }
    sn.buses_o
        .iter()
        .copied()
        .max_by_key(|b| degree.get(b).copied().unwrap_or(0))
        .unwrap_or(sn.slack_bus.unwrap_or(sn.buses_o[0]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsim_core::units::{Kilovolts, MegavoltAmperes};
    use gridsim_core::{Bus, BusId as Bid, CurrentType};

    fn two_parallel_lines() -> Network {
        let mut net = Network::new();
        let a = net.add_bus(Bus::new(Bid(0), "A", Kilovolts(400.0), CurrentType::Ac));
        let b = net.add_bus(Bus::new(Bid(0), "B", Kilovolts(400.0), CurrentType::Ac));
        net.add_line(Line::new(BranchId::new(0), "L1", a, b, 0.02, 0.2, MegavoltAmperes(500.0))).unwrap();
        net.add_line(Line::new(BranchId::new(0), "L2", a, b, 0.02, 0.2, MegavoltAmperes(500.0))).unwrap();
        net
    }

    #[test]
    fn aggregate_parallel_branches_collapses_to_one_line() {
        let net = two_parallel_lines();
        let agg = aggregate_parallel_branches(&net);
        assert_eq!(agg.passive_branches().len(), 1);
        match &agg.passive_branches()[0] {
            PassiveBranch::Line(l) => {
                assert!((l.r - 0.01).abs() < 1e-9);
                assert!((l.s_nom.0 - 1000.0).abs() < 1e-9);
            }
            PassiveBranch::Transformer(_) => panic!("expected a line"),
        }
    }

    #[test]
    fn aggregate_parallel_branches_leaves_source_untouched() {
        let net = two_parallel_lines();
        let _ = aggregate_parallel_branches(&net);
        assert_eq!(net.passive_branches().len(), 2);
    }

    #[test]
    fn single_lines_are_not_aggregated() {
        let mut net = Network::new();
        let a = net.add_bus(Bus::new(Bid(0), "A", Kilovolts(400.0), CurrentType::Ac));
        let b = net.add_bus(Bus::new(Bid(0), "B", Kilovolts(400.0), CurrentType::Ac));
        net.add_line(Line::new(BranchId::new(0), "L1", a, b, 0.02, 0.2, MegavoltAmperes(500.0))).unwrap();
        let agg = aggregate_parallel_branches(&net);
        assert_eq!(agg.passive_branches().len(), 1);
    }

    fn three_bus_ring() -> Network {
        let mut net = Network::new();
        let a = net.add_bus(Bus::new(Bid(0), "A", Kilovolts(400.0), CurrentType::Ac));
        let b = net.add_bus(Bus::new(Bid(0), "B", Kilovolts(400.0), CurrentType::Ac));
        let c = net.add_bus(Bus::new(Bid(0), "C", Kilovolts(400.0), CurrentType::Ac));
        net.add_line(Line::new(BranchId::new(0), "A-B", a, b, 0.01, 0.1, MegavoltAmperes(500.0))).unwrap();
        net.add_line(Line::new(BranchId::new(0), "B-C", b, c, 0.01, 0.1, MegavoltAmperes(500.0))).unwrap();
        net.add_line(Line::new(BranchId::new(0), "C-A", c, a, 0.01, 0.1, MegavoltAmperes(500.0))).unwrap();
        gridsim_core::topology::analyse(&mut net).unwrap();
        net
    }

    #[test]
    fn find_tree_leaves_exactly_one_branch_for_the_ring() {
        let net = three_bus_ring();
        let sn = &net.sub_networks()[0];
        let tree = find_tree(&net, sn).unwrap();
        assert_eq!(tree.tree_branches.len(), 2);
        assert_eq!(tree.cycle_branches.len(), 1);
    }

    #[test]
    fn find_cycles_yields_one_cycle_spanning_the_ring() {
        let net = three_bus_ring();
        let sn = &net.sub_networks()[0];
        let tree = find_tree(&net, sn).unwrap();
        let cycles = find_cycles(&net, sn, &tree);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].members.len(), 3);
    }
}
