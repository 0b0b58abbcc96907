//! Builds the LOPF linear program (spec.md §4.6) and hands it to `clarabel`.
//!
//! Variable declaration uses `good_lp`'s `variables!()`/`variable()` builder,
//! the way the teacher's `dc_opf.rs` declares `gen_vars`/`theta_vars` — but
//! unlike the teacher, the constraint matrix is assembled directly (as plain
//! `(column, coefficient)` rows) rather than through `good_lp`'s
//! `Expression`/`constraint!`/`SolverModel::solve()`, because extracting true
//! nodal-balance duals means solving against `clarabel`'s native cone-program
//! API ourselves (see `solve` below) instead of going through `good_lp`'s
//! solver trait, which does not surface them.

use std::collections::HashMap;

use good_lp::{variable, variables};

use gridsim_core::{BranchId, BusId, CurrentType, DcOpfFormulation, GenId, GridSimError, GridSimResult, Network, StorageId, SubNetworkId};

use crate::sparse::{bh, ptdf};

pub type Col = usize;

/// One scalar decision variable per (entity, snapshot) pair, or one per
/// entity for investment variables.
#[derive(Debug, Default)]
pub struct VarIndex {
    pub gen_p: HashMap<(GenId, usize), Col>,
    pub gen_p_nom: HashMap<GenId, Col>,
    pub storage_p_dispatch: HashMap<(StorageId, usize), Col>,
    pub storage_p_store: HashMap<(StorageId, usize), Col>,
    pub storage_p_nom: HashMap<StorageId, Col>,
    pub soc: HashMap<(StorageId, usize), Col>,
    pub branch_s_nom: HashMap<BranchId, Col>,
    pub controllable_p: HashMap<(BranchId, usize), Col>,
    pub theta: HashMap<(BusId, usize), Col>,
}

/// What a nodal-balance equality row corresponds to, so its dual can be
/// written back as `marginal_price` after solving.
#[derive(Debug, Clone, Copy)]
pub enum BalanceKey {
    Bus(BusId, usize),
    SubNetwork(SubNetworkId, usize),
}

/// A fully assembled LP, expressed as plain columns/rows ready for
/// translation into `clarabel`'s native matrices.
pub struct BuiltModel {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub cost: Vec<f64>,
    pub cost_constant: f64,
    /// Equality rows; the first `balance_keys.len()` of these are the
    /// nodal-balance rows, in the same order as `balance_keys`.
    pub eq_rows: Vec<(HashMap<Col, f64>, f64)>,
    pub balance_keys: Vec<BalanceKey>,
    /// `coeffs . x <= rhs` rows.
    pub ineq_rows: Vec<(HashMap<Col, f64>, f64)>,
    pub vars: VarIndex,
}

fn add_coeff(row: &mut HashMap<Col, f64>, col: Col, coeff: f64) {
    *row.entry(col).or_insert(0.0) += coeff;
}

fn merge_scaled(dst: &mut HashMap<Col, f64>, src: &HashMap<Col, f64>, scale: f64) {
    for (&col, &coeff) in src {
        add_coeff(dst, col, coeff * scale);
    }
}

struct Pool {
    builder: good_lp::ProblemVariables,
    lower: Vec<f64>,
    upper: Vec<f64>,
    cost: Vec<f64>,
}

impl Pool {
    fn new() -> Self {
        Self { builder: variables!(), lower: Vec::new(), upper: Vec::new(), cost: Vec::new() }
    }

    fn add(&mut self, lower: f64, upper: f64) -> Col {
        self.builder.add(variable().min(lower).max(upper));
        self.lower.push(lower);
        self.upper.push(upper);
        self.cost.push(0.0);
        self.lower.len() - 1
    }
}

/// Build the LOPF model for every snapshot of `network` (spec.md §4.6).
/// `network` must already have per-unit values and topology determined.
pub fn build(network: &Network) -> GridSimResult<BuiltModel> {
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
    let weights = &network.snapshot_weightings;
    let formulation = network.config.dc_opf_formulation;

    let mut pool = Pool::new();
    let mut vars = VarIndex::default();
    let mut eq_rows: Vec<(HashMap<Col, f64>, f64)> = Vec::new();
    let mut ineq_rows: Vec<(HashMap<Col, f64>, f64)> = Vec::new();
    let mut balance_keys: Vec<BalanceKey> = Vec::new();

    // --- generator dispatch + investment variables ---
    for gen in network.generators() {
        if gen.p_nom_extendable {
            let col = pool.add(gen.p_nom_min.0, gen.p_nom_max.0);
            vars.gen_p_nom.insert(gen.id, col);
        }
        for t in 0..n_snapshots {
            let (lower, upper) = if gen.p_nom_extendable {
                (f64::NEG_INFINITY, f64::INFINITY)
            } else {
                (gen.p_nom.0 * gen.p_min_pu_at(t)?, gen.p_nom.0 * gen.p_max_pu_at(t)?)
            };
            let col = pool.add(lower, upper);
            pool.cost[col] = gen.marginal_cost * weights.get(t).copied().unwrap_or(1.0);
            vars.gen_p.insert((gen.id, t), col);

            if gen.p_nom_extendable {
                let p_nom_col = vars.gen_p_nom[&gen.id];
                let p_max_pu = gen.p_max_pu_at(t)?;
                let p_min_pu = gen.p_min_pu_at(t)?;
                let mut upper_row = HashMap::new();
                add_coeff(&mut upper_row, col, 1.0);
                add_coeff(&mut upper_row, p_nom_col, -p_max_pu);
                ineq_rows.push((upper_row, 0.0));
                let mut lower_row = HashMap::new();
                add_coeff(&mut lower_row, col, -1.0);
                add_coeff(&mut lower_row, p_nom_col, p_min_pu);
                ineq_rows.push((lower_row, 0.0));
            }
        }
        if gen.p_nom_extendable {
            let p_nom_col = vars.gen_p_nom[&gen.id];
            pool.cost[p_nom_col] += gen.capital_cost;
        }
    }
    // Capital-cost baseline subtracts existing capacity (spec.md §4.6).
    let mut cost_constant = 0.0;
    for gen in network.generators() {
        if gen.p_nom_extendable {
            cost_constant -= gen.capital_cost * gen.p_nom.0;
        }
    }

    // --- storage dispatch/store/SOC/investment variables ---
    for storage in network.storage_units() {
        if storage.p_nom_extendable {
            let col = pool.add(storage.p_nom_min.0, storage.p_nom_max.0);
            vars.storage_p_nom.insert(storage.id, col);
            pool.cost[col] += storage.capital_cost;
            cost_constant -= storage.capital_cost * storage.p_nom.0;
        }

        let mut soc_prev: Option<(Option<Col>, f64)> = None; // (variable column if free, constant contribution)
        for t in 0..n_snapshots {
            let dispatch_upper = if storage.p_nom_extendable { f64::INFINITY } else { storage.p_nom.0 };
            let dispatch_col = pool.add(0.0, dispatch_upper);
            let store_col = pool.add(0.0, dispatch_upper);
            pool.cost[dispatch_col] = storage.marginal_cost * weights.get(t).copied().unwrap_or(1.0);
            vars.storage_p_dispatch.insert((storage.id, t), dispatch_col);
            vars.storage_p_store.insert((storage.id, t), store_col);

            if storage.p_nom_extendable {
                let p_nom_col = vars.storage_p_nom[&storage.id];
                let mut d_row = HashMap::new();
                add_coeff(&mut d_row, dispatch_col, 1.0);
                add_coeff(&mut d_row, p_nom_col, -1.0);
                ineq_rows.push((d_row, 0.0));
                let mut s_row = HashMap::new();
                add_coeff(&mut s_row, store_col, 1.0);
                add_coeff(&mut s_row, p_nom_col, -1.0);
                ineq_rows.push((s_row, 0.0));
            }

            let w = weights.get(t).copied().unwrap_or(1.0);
            let standing = (1.0 - storage.standing_loss).powf(w);
            let inflow = storage.inflow.get(t).copied().unwrap_or(0.0) * w;

            let fixed = storage.state_of_charge.get(t).copied().flatten();
            if let Some(value) = fixed {
                // Open Question resolution: fixed cells get no decision
                // variable; the numeric value is substituted directly.
                soc_prev = Some((None, value));
                continue;
            }

            let soc_col = pool.add(0.0, f64::INFINITY);
            vars.soc.insert((storage.id, t), soc_col);

            let mut row = HashMap::new();
            add_coeff(&mut row, soc_col, 1.0);
            add_coeff(&mut row, store_col, -storage.efficiency_store * w);
            add_coeff(&mut row, dispatch_col, w / storage.efficiency_dispatch);
            let rhs = match soc_prev {
                None => storage.state_of_charge_initial * standing + inflow,
                Some((Some(prev_col), _)) => {
                    add_coeff(&mut row, prev_col, -standing);
                    inflow
                }
                Some((None, value)) => value * standing + inflow,
            };
            eq_rows.push((row, rhs));

            let upper_bound_col_coeff = if storage.p_nom_extendable {
                let p_nom_col = vars.storage_p_nom[&storage.id];
                let mut ub_row = HashMap::new();
                add_coeff(&mut ub_row, soc_col, 1.0);
                add_coeff(&mut ub_row, p_nom_col, -storage.max_hours);
                Some((ub_row, 0.0))
            } else {
                let mut ub_row = HashMap::new();
                add_coeff(&mut ub_row, soc_col, 1.0);
                Some((ub_row, storage.max_hours * storage.p_nom.0))
            };
            if let Some(row) = upper_bound_col_coeff {
                ineq_rows.push(row);
            }

            soc_prev = Some((Some(soc_col), 0.0));
        }
    }

    // --- controllable branches (fixed p_min/p_max; no investment variable) ---
    for cb in network.controllable_branches() {
        for t in 0..n_snapshots {
            let col = pool.add(cb.p_min.0, cb.p_max.0);
            vars.controllable_p.insert((cb.id, t), col);
        }
    }

    // --- passive branch investment (extendable lines/transformers) ---
    for branch in network.passive_branches() {
        let (extendable, s_nom, s_nom_min, s_nom_max) = match branch {
            gridsim_core::PassiveBranch::Line(l) => (l.s_nom_extendable, l.s_nom, l.s_nom_min, l.s_nom_max),
            gridsim_core::PassiveBranch::Transformer(t) => (t.s_nom_extendable, t.s_nom, t.s_nom_min, t.s_nom_max),
        };
        if extendable {
            let col = pool.add(s_nom_min.0, s_nom_max.0);
            vars.branch_s_nom.insert(branch.id(), col);
            let capital_cost = match branch {
                gridsim_core::PassiveBranch::Line(l) => l.capital_cost,
                gridsim_core::PassiveBranch::Transformer(t) => t.capital_cost,
            };
            pool.cost[col] += capital_cost;
            cost_constant -= capital_cost * s_nom.0;
        }
    }

    // --- angles-formulation voltage-angle variables ---
    if formulation == DcOpfFormulation::Angles {
        for sn in network.sub_networks() {
            for &bus in &sn.buses_o {
                if Some(bus) == sn.slack_bus {
                    continue;
                }
                for t in 0..n_snapshots {
                    let col = pool.add(-1.0e6, 1.0e6);
                    vars.theta.insert((bus, t), col);
                }
            }
        }
    }

    // --- power_balance expression per bus per snapshot (generators, storage, loads) ---
    let mut power_balance: HashMap<(BusId, usize), (HashMap<Col, f64>, f64)> = HashMap::new();
    for bus in network.buses() {
        for t in 0..n_snapshots {
            power_balance.insert((bus.id, t), (HashMap::new(), 0.0));
        }
    }
    for gen in network.generators() {
        for t in 0..n_snapshots {
            let col = vars.gen_p[&(gen.id, t)];
            let entry = power_balance.get_mut(&(gen.bus, t)).expect("bus exists");
            add_coeff(&mut entry.0, col, gen.sign);
        }
    }
    for storage in network.storage_units() {
        for t in 0..n_snapshots {
            let dispatch_col = vars.storage_p_dispatch[&(storage.id, t)];
            let store_col = vars.storage_p_store[&(storage.id, t)];
            let entry = power_balance.get_mut(&(storage.bus, t)).expect("bus exists");
            add_coeff(&mut entry.0, dispatch_col, storage.sign);
            add_coeff(&mut entry.0, store_col, -storage.sign);
        }
    }
    for load in network.loads() {
        for t in 0..n_snapshots {
            let value = load.sign * load.p_set.get(t).copied().unwrap_or(0.0);
            let entry = power_balance.get_mut(&(load.bus, t)).expect("bus exists");
            entry.1 += value;
        }
    }
    for cb in network.controllable_branches() {
        for t in 0..n_snapshots {
            let col = vars.controllable_p[&(cb.id, t)];
            if let Some(entry) = power_balance.get_mut(&(cb.bus0, t)) {
                add_coeff(&mut entry.0, col, -1.0);
            }
            if let Some(entry) = power_balance.get_mut(&(cb.bus1, t)) {
                add_coeff(&mut entry.0, col, 1.0);
            }
        }
    }

    // --- passive branch flow + nodal balance + thermal limits ---
    for sn in network.sub_networks() {
        if sn.branches.is_empty() {
            // No passive branches: each bus balances on its own.
            for &bus in &sn.buses_o {
                for t in 0..n_snapshots {
                    let (coeffs, constant) = power_balance[&(bus, t)].clone();
                    eq_rows.push((coeffs, -constant));
                    balance_keys.push(BalanceKey::Bus(bus, t));
                }
            }
            continue;
        }

        let (h, b) = bh::build(network, sn)?;

        match formulation {
            DcOpfFormulation::Angles => {
                // flow[br,t] is a row over theta columns; built per-snapshot
                // since theta columns are snapshot-indexed.
                for t in 0..n_snapshots {
                    let mut flow_exprs: Vec<HashMap<Col, f64>> = Vec::with_capacity(sn.branches.len());
                    for &branch_id in &sn.branches {
                        let branch = &network.passive_branches()[branch_id.value()];
                        let susceptance = match sn.current_type {
                            CurrentType::Ac => 1.0 / branch.x_pu(),
                            CurrentType::Dc => 1.0 / branch.r_pu(),
                        };
                        let mut expr = HashMap::new();
                        if let Some(&col) = vars.theta.get(&(branch.bus0(), t)) {
                            add_coeff(&mut expr, col, susceptance);
                        }
                        if let Some(&col) = vars.theta.get(&(branch.bus1(), t)) {
                            add_coeff(&mut expr, col, -susceptance);
                        }
                        flow_exprs.push(expr);

                        let extendable_col = vars.branch_s_nom.get(&branch_id).copied();
                        let limit = match branch {
                            gridsim_core::PassiveBranch::Line(l) => l.s_nom.0,
                            gridsim_core::PassiveBranch::Transformer(tr) => tr.s_nom.0,
                        };
                        push_thermal_limit_rows(&mut ineq_rows, flow_exprs.last().unwrap(), extendable_col, limit);
                    }

                    for &bus in &sn.buses_o {
                        let (mut coeffs, constant) = power_balance[&(bus, t)].clone();
                        for (row, &branch_id) in sn.branches.iter().enumerate() {
                            let branch = &network.passive_branches()[branch_id.value()];
                            let coeff = if branch.bus0() == bus {
                                -1.0
                            } else if branch.bus1() == bus {
                                1.0
                            } else {
                                continue;
                            };
                            merge_scaled(&mut coeffs, &flow_exprs[row], coeff);
                        }
                        eq_rows.push((coeffs, -constant));
                        balance_keys.push(BalanceKey::Bus(bus, t));
                    }
                }
            }
            DcOpfFormulation::Ptdf => {
                let ptdf_matrix = ptdf::build(&h, &b, network.config.ptdf_tolerance)?;
                for t in 0..n_snapshots {
                    // flow[br,t] = sum_j PTDF[br,j] * power_balance[bus_j,t]
                    for (row, &branch_id) in sn.branches.iter().enumerate() {
                        let mut flow_row = HashMap::new();
                        let mut flow_constant = 0.0;
                        for (j, &bus_j) in sn.buses_o.iter().enumerate() {
                            let coeff = ptdf_matrix.get(row, j).copied().unwrap_or(0.0);
                            if coeff == 0.0 {
                                continue;
                            }
                            let (ref pb_coeffs, pb_constant) = power_balance[&(bus_j, t)];
                            merge_scaled(&mut flow_row, pb_coeffs, coeff);
                            flow_constant += coeff * pb_constant;
                        }
                        let branch = &network.passive_branches()[branch_id.value()];
                        let extendable_col = vars.branch_s_nom.get(&branch_id).copied();
                        let limit = match branch {
                            gridsim_core::PassiveBranch::Line(l) => l.s_nom.0,
                            gridsim_core::PassiveBranch::Transformer(tr) => tr.s_nom.0,
                        };
                        // Constant term folds into the row's implicit rhs via
                        // a shifted bound: coeffs.x <= limit - constant.
                        push_thermal_limit_rows_with_constant(&mut ineq_rows, &flow_row, flow_constant, extendable_col, limit);
                    }

                    // Nodal balance collapses to one sum-over-sub-network row.
                    let mut coeffs = HashMap::new();
                    let mut constant = 0.0;
                    for &bus in &sn.buses_o {
                        let (pb_coeffs, pb_constant) = &power_balance[&(bus, t)];
                        merge_scaled(&mut coeffs, pb_coeffs, 1.0);
                        constant += pb_constant;
                    }
                    eq_rows.push((coeffs, -constant));
                    balance_keys.push(BalanceKey::SubNetwork(sn.id, t));
                }
            }
        }
    }

    // --- emissions cap ---
    if let Some(co2_limit) = network.config.co2_limit {
        let mut row = HashMap::new();
        for gen in network.generators() {
            let Some(source_id) = gen.source else { continue };
            let source = &network.sources()[source_id.value()];
            if source.co2_emissions_t_per_mwh == 0.0 {
                continue;
            }
            let rate = source.co2_emissions_t_per_mwh / gen.efficiency;
            for t in 0..n_snapshots {
                let col = vars.gen_p[&(gen.id, t)];
                let w = weights.get(t).copied().unwrap_or(1.0);
                add_coeff(&mut row, col, rate * w);
            }
        }
        if !row.is_empty() {
            ineq_rows.push((row, co2_limit));
        }
    }

    Ok(BuiltModel {
        lower: pool.lower,
        upper: pool.upper,
        cost: pool.cost,
        cost_constant,
        eq_rows,
        balance_keys,
        ineq_rows,
        vars,
    })
}

fn push_thermal_limit_rows(rows: &mut Vec<(HashMap<Col, f64>, f64)>, flow: &HashMap<Col, f64>, extendable_col: Option<Col>, fixed_limit: f64) {
    push_thermal_limit_rows_with_constant(rows, flow, 0.0, extendable_col, fixed_limit)
}

fn push_thermal_limit_rows_with_constant(
    rows: &mut Vec<(HashMap<Col, f64>, f64)>,
    flow: &HashMap<Col, f64>,
    flow_constant: f64,
    extendable_col: Option<Col>,
    fixed_limit: f64,
) {
    let mut upper = flow.clone();
    let mut lower = HashMap::new();
    for (&col, &coeff) in flow {
        add_coeff(&mut lower, col, -coeff);
    }
    match extendable_col {
        Some(s_nom_col) => {
            add_coeff(&mut upper, s_nom_col, -1.0);
            add_coeff(&mut lower, s_nom_col, -1.0);
            rows.push((upper, -flow_constant));
            rows.push((lower, flow_constant));
        }
        None => {
            rows.push((upper, fixed_limit - flow_constant));
            rows.push((lower, fixed_limit + flow_constant));
        }
    }
}

/// Describes the cone-program handed to `clarabel`: `A x + s = b`, `s in K`,
/// minimising `q . x` (no quadratic term; this is a pure LP).
pub struct ConeProgram {
    pub n_vars: usize,
    pub q: Vec<f64>,
    pub triplets: Vec<(usize, usize, f64)>,
    pub n_rows: usize,
    pub b: Vec<f64>,
    pub eq_row_count: usize,
    pub ineq_row_count: usize,
}

/// Lower/upper bounds are expressed as inequality rows (two per bound that
/// is finite), appended after the named inequality rows, since `clarabel`
/// has no separate notion of a box-constrained variable.
pub fn to_cone_program(model: &BuiltModel) -> ConeProgram {
    let n_vars = model.lower.len();
    let mut triplets = Vec::new();
    let mut b = Vec::new();

    for (row, (coeffs, rhs)) in model.eq_rows.iter().enumerate() {
        for (&col, &coeff) in coeffs {
            triplets.push((row, col, coeff));
        }
        b.push(*rhs);
    }
    let eq_row_count = model.eq_rows.len();

    let mut row = eq_row_count;
    for (coeffs, rhs) in &model.ineq_rows {
        for (&col, &coeff) in coeffs {
            triplets.push((row, col, coeff));
        }
        b.push(*rhs);
        row += 1;
    }

    for col in 0..n_vars {
        if model.upper[col].is_finite() {
            triplets.push((row, col, 1.0));
            b.push(model.upper[col]);
            row += 1;
        }
        if model.lower[col].is_finite() {
            triplets.push((row, col, -1.0));
            b.push(-model.lower[col]);
            row += 1;
        }
    }
    let ineq_row_count = row - eq_row_count;

    ConeProgram { n_vars, q: model.cost.clone(), triplets, n_rows: row, b, eq_row_count, ineq_row_count }
}
