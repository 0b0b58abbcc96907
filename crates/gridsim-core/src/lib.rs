//! Entity-relationship network model for power-systems analysis.
//!
//! A [`Network`] holds buses, one-port components (generators, storage
//! units, loads, shunt impedances) and branches (lines, transformers,
//! converters, transport links), each identified by a stable integer id
//! rather than a string name — a fixed, explicit component registry instead
//! of introspecting class hierarchies at runtime. Buses and passive branches
//! additionally form an undirected multigraph (`petgraph::UnGraph`) used by
//! [`topology`] to discover synchronous islands ("sub-networks") and
//! classify bus control type.
//!
//! Per-snapshot quantities (voltage, power, state of charge, ...) are held
//! as `Vec<f64>` fields on each entity, one slot per snapshot, rather than a
//! single scalar — see [`Network::set_snapshots`].

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod per_unit;
pub mod topology;
pub mod units;

use petgraph::graph::{NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};

pub use config::{DcOpfFormulation, NetworkConfig};
pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{GridSimError, GridSimResult};
pub use units::{Degrees, Kilovolts, Megavars, MegavoltAmperes, Megawatts, PerUnit, Radians};

macro_rules! newtype_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub usize);

        impl $name {
            #[inline]
            pub const fn new(value: usize) -> Self {
                Self(value)
            }

            #[inline]
            pub const fn value(self) -> usize {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

newtype_id!(BusId);
newtype_id!(GenId);
newtype_id!(StorageId);
newtype_id!(LoadId);
newtype_id!(ShuntId);
newtype_id!(BranchId);
newtype_id!(SourceId);
newtype_id!(SubNetworkId);

/// AC or DC current type, carried by buses and inherited by their sub-network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurrentType {
    Ac,
    Dc,
}

/// Bus control classification assigned by the topology analyser (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusControl {
    Pq,
    Pv,
    Slack,
}

/// Generator dispatch kind (spec.md §3 Generator.dispatch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchKind {
    /// Fixed scalar p_min_pu/p_max_pu; dispatchable within those bounds.
    Flexible,
    /// Per-snapshot p_min_pu/p_max_pu time series (e.g. wind, solar).
    Variable,
    /// p_set is not a decision variable; dispatches exactly as set.
    Inflexible,
}

/// Which passive-branch-flow formulation the LOPF model builder uses.
///
/// Re-exported from [`config`] for convenience; see `gridsim-solve::opf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchEnd {
    From,
    To,
}

/// Electrical node. The variable of interest is a complex voltage.
#[derive(Debug, Clone)]
pub struct Bus {
    pub id: BusId,
    pub name: String,
    pub v_nom_kv: Kilovolts,
    pub current_type: CurrentType,
    pub control: BusControl,
    pub v_mag_min_pu: Option<PerUnit>,
    pub v_mag_max_pu: Option<PerUnit>,
    pub x: f64,
    pub y: f64,
    pub sub_network: Option<SubNetworkId>,

    /// Per-snapshot series, one slot per entry in `Network::snapshots`.
    pub v_mag_pu: Vec<f64>,
    pub v_ang_rad: Vec<f64>,
    pub p_mw: Vec<f64>,
    pub q_mvar: Vec<f64>,
    pub marginal_price: Vec<f64>,
}

impl Bus {
    pub fn new(id: BusId, name: impl Into<String>, v_nom_kv: Kilovolts, current_type: CurrentType) -> Self {
        Self {
            id,
            name: name.into(),
            v_nom_kv,
            current_type,
            control: BusControl::Pq,
            v_mag_min_pu: None,
            v_mag_max_pu: None,
            x: 0.0,
            y: 0.0,
            sub_network: None,
            v_mag_pu: Vec::new(),
            v_ang_rad: Vec::new(),
            p_mw: Vec::new(),
            q_mvar: Vec::new(),
            marginal_price: Vec::new(),
        }
    }
}

/// Fuel/technology source referenced by a [`Generator`].
#[derive(Debug, Clone)]
pub struct Source {
    pub id: SourceId,
    pub name: String,
    pub co2_emissions_t_per_mwh: f64,
}

impl Source {
    pub fn new(id: SourceId, name: impl Into<String>, co2_emissions_t_per_mwh: f64) -> Self {
        Self {
            id,
            name: name.into(),
            co2_emissions_t_per_mwh,
        }
    }
}

/// Generator attached to one bus.
#[derive(Debug, Clone)]
pub struct Generator {
    pub id: GenId,
    pub name: String,
    pub bus: BusId,
    pub source: Option<SourceId>,
    pub dispatch: DispatchKind,
    pub sign: f64,
    pub control: BusControl,
    pub p_nom: Megawatts,
    pub p_nom_min: Megawatts,
    pub p_nom_max: Megawatts,
    pub p_nom_extendable: bool,
    pub p_min_pu_fixed: f64,
    pub p_max_pu_fixed: f64,
    pub p_min_pu_series: Option<Vec<f64>>,
    pub p_max_pu_series: Option<Vec<f64>>,
    pub efficiency: f64,
    pub marginal_cost: f64,
    pub capital_cost: f64,
    pub voltage_setpoint_pu: Option<PerUnit>,

    pub p_set: Vec<f64>,
    pub q_set: Vec<f64>,
    pub p_mw: Vec<f64>,
    pub q_mvar: Vec<f64>,
}

impl Generator {
    pub fn new(id: GenId, name: impl Into<String>, bus: BusId, p_nom: Megawatts) -> Self {
        Self {
            id,
            name: name.into(),
            bus,
            source: None,
            dispatch: DispatchKind::Flexible,
            sign: 1.0,
            control: BusControl::Pq,
            p_nom,
            p_nom_min: Megawatts(0.0),
            p_nom_max: Megawatts(f64::INFINITY),
            p_nom_extendable: false,
            p_min_pu_fixed: 0.0,
            p_max_pu_fixed: 1.0,
            p_min_pu_series: None,
            p_max_pu_series: None,
            efficiency: 1.0,
            marginal_cost: 0.0,
            capital_cost: 0.0,
            voltage_setpoint_pu: None,
            p_set: Vec::new(),
            q_set: Vec::new(),
            p_mw: Vec::new(),
            q_mvar: Vec::new(),
        }
    }

    pub fn with_cost(mut self, marginal_cost: f64, capital_cost: f64) -> Self {
        self.marginal_cost = marginal_cost;
        self.capital_cost = capital_cost;
        self
    }

    pub fn as_slack(mut self) -> Self {
        self.control = BusControl::Slack;
        self
    }

    pub fn as_pv(mut self, voltage_setpoint_pu: PerUnit) -> Self {
        self.control = BusControl::Pv;
        self.voltage_setpoint_pu = Some(voltage_setpoint_pu);
        self
    }

    pub fn extendable(mut self, p_nom_min: Megawatts, p_nom_max: Megawatts) -> Self {
        self.p_nom_extendable = true;
        self.p_nom_min = p_nom_min;
        self.p_nom_max = p_nom_max;
        self
    }

    /// p_max_pu for a given snapshot index, honouring fixed vs. variable dispatch.
    pub fn p_max_pu_at(&self, snapshot: usize) -> GridSimResult<f64> {
        match self.dispatch {
            DispatchKind::Variable => self
                .p_max_pu_series
                .as_ref()
                .and_then(|s| s.get(snapshot).copied())
                .ok_or_else(|| {
                    GridSimError::NotImplemented(format!(
                        "generator '{}' is Variable dispatch but has no p_max_pu for snapshot {}",
                        self.name, snapshot
                    ))
                }),
            _ => Ok(self.p_max_pu_fixed),
        }
    }

    pub fn p_min_pu_at(&self, snapshot: usize) -> GridSimResult<f64> {
        match self.dispatch {
            DispatchKind::Variable => self
                .p_min_pu_series
                .as_ref()
                .and_then(|s| s.get(snapshot).copied())
                .ok_or_else(|| {
                    GridSimError::NotImplemented(format!(
                        "generator '{}' is Variable dispatch but has no p_min_pu for snapshot {}",
                        self.name, snapshot
                    ))
                }),
            _ => Ok(self.p_min_pu_fixed),
        }
    }
}

/// Battery/storage unit. Extends [`Generator`] with state-of-charge dynamics.
#[derive(Debug, Clone)]
pub struct StorageUnit {
    pub id: StorageId,
    pub name: String,
    pub bus: BusId,
    pub sign: f64,
    pub p_nom: Megawatts,
    pub p_nom_min: Megawatts,
    pub p_nom_max: Megawatts,
    pub p_nom_extendable: bool,
    pub marginal_cost: f64,
    pub capital_cost: f64,

    pub state_of_charge_initial: f64,
    pub max_hours: f64,
    pub efficiency_store: f64,
    pub efficiency_dispatch: f64,
    pub standing_loss: f64,
    pub inflow: Vec<f64>,

    /// `None` at a snapshot means the SOC is free (a decision variable);
    /// `Some(v)` pins it to `v` for that snapshot.
    pub state_of_charge: Vec<Option<f64>>,
    pub p_mw: Vec<f64>,
}

impl StorageUnit {
    pub fn new(id: StorageId, name: impl Into<String>, bus: BusId, p_nom: Megawatts, max_hours: f64) -> Self {
        Self {
            id,
            name: name.into(),
            bus,
            sign: 1.0,
            p_nom,
            p_nom_min: Megawatts(0.0),
            p_nom_max: Megawatts(f64::INFINITY),
            p_nom_extendable: false,
            marginal_cost: 0.0,
            capital_cost: 0.0,
            state_of_charge_initial: 0.0,
            max_hours,
            efficiency_store: 1.0,
            efficiency_dispatch: 1.0,
            standing_loss: 0.0,
            inflow: Vec::new(),
            state_of_charge: Vec::new(),
            p_mw: Vec::new(),
        }
    }
}

/// Load (negative injection) attached to one bus.
#[derive(Debug, Clone)]
pub struct Load {
    pub id: LoadId,
    pub name: String,
    pub bus: BusId,
    pub sign: f64,
    pub p_set: Vec<f64>,
    pub q_set: Vec<f64>,
    pub p_mw: Vec<f64>,
    pub q_mvar: Vec<f64>,
}

impl Load {
    pub fn new(id: LoadId, name: impl Into<String>, bus: BusId) -> Self {
        Self {
            id,
            name: name.into(),
            bus,
            sign: -1.0,
            p_set: Vec::new(),
            q_set: Vec::new(),
            p_mw: Vec::new(),
            q_mvar: Vec::new(),
        }
    }
}

/// Fixed shunt admittance attached to one bus.
#[derive(Debug, Clone)]
pub struct ShuntImpedance {
    pub id: ShuntId,
    pub name: String,
    pub bus: BusId,
    pub g: f64,
    pub b: f64,
    pub g_pu: f64,
    pub b_pu: f64,
    pub p_mw: Vec<f64>,
    pub q_mvar: Vec<f64>,
}

impl ShuntImpedance {
    pub fn new(id: ShuntId, name: impl Into<String>, bus: BusId, g: f64, b: f64) -> Self {
        Self {
            id,
            name: name.into(),
            bus,
            g,
            b,
            g_pu: 0.0,
            b_pu: 0.0,
            p_mw: Vec::new(),
            q_mvar: Vec::new(),
        }
    }
}

/// Overhead/underground line between two buses.
#[derive(Debug, Clone)]
pub struct Line {
    pub id: BranchId,
    pub name: String,
    pub bus0: BusId,
    pub bus1: BusId,
    pub r: f64,
    pub x: f64,
    pub g: f64,
    pub b: f64,
    pub length: f64,
    pub s_nom: MegavoltAmperes,
    pub s_nom_extendable: bool,
    pub s_nom_min: MegavoltAmperes,
    pub s_nom_max: MegavoltAmperes,
    pub v_ang_min: Option<Radians>,
    pub v_ang_max: Option<Radians>,
    pub capital_cost: f64,
    pub sub_network: Option<SubNetworkId>,

    // filled in by the per-unit calculator (spec.md §4.1)
    pub r_pu: f64,
    pub x_pu: f64,
    pub g_pu: f64,
    pub b_pu: f64,

    pub p0_mw: Vec<f64>,
    pub q0_mvar: Vec<f64>,
    pub p1_mw: Vec<f64>,
    pub q1_mvar: Vec<f64>,
}

impl Line {
    pub fn new(id: BranchId, name: impl Into<String>, bus0: BusId, bus1: BusId, r: f64, x: f64, s_nom: MegavoltAmperes) -> Self {
        Self {
            id,
            name: name.into(),
            bus0,
            bus1,
            r,
            x,
            g: 0.0,
            b: 0.0,
            length: 1.0,
            s_nom,
            s_nom_extendable: false,
            s_nom_min: MegavoltAmperes(0.0),
            s_nom_max: MegavoltAmperes(f64::INFINITY),
            v_ang_min: None,
            v_ang_max: None,
            capital_cost: 0.0,
            sub_network: None,
            r_pu: 0.0,
            x_pu: 0.0,
            g_pu: 0.0,
            b_pu: 0.0,
            p0_mw: Vec::new(),
            q0_mvar: Vec::new(),
            p1_mw: Vec::new(),
            q1_mvar: Vec::new(),
        }
    }
}

/// Two-winding transformer. Per-unit impedances are referenced to `s_nom`
/// rather than to bus nominal voltage (spec.md §4.1).
#[derive(Debug, Clone)]
pub struct Transformer {
    pub id: BranchId,
    pub name: String,
    pub bus0: BusId,
    pub bus1: BusId,
    pub r: f64,
    pub x: f64,
    pub g: f64,
    pub b: f64,
    pub s_nom: MegavoltAmperes,
    pub s_nom_extendable: bool,
    pub s_nom_min: MegavoltAmperes,
    pub s_nom_max: MegavoltAmperes,
    pub tap_ratio: f64,
    pub phase_shift_deg: f64,
    pub capital_cost: f64,
    pub sub_network: Option<SubNetworkId>,

    pub r_pu: f64,
    pub x_pu: f64,
    pub g_pu: f64,
    pub b_pu: f64,

    pub p0_mw: Vec<f64>,
    pub q0_mvar: Vec<f64>,
    pub p1_mw: Vec<f64>,
    pub q1_mvar: Vec<f64>,
}

impl Transformer {
    pub fn new(id: BranchId, name: impl Into<String>, bus0: BusId, bus1: BusId, r: f64, x: f64, s_nom: MegavoltAmperes) -> Self {
        Self {
            id,
            name: name.into(),
            bus0,
            bus1,
            r,
            x,
            g: 0.0,
            b: 0.0,
            s_nom,
            s_nom_extendable: false,
            s_nom_min: MegavoltAmperes(0.0),
            s_nom_max: MegavoltAmperes(f64::INFINITY),
            tap_ratio: 1.0,
            phase_shift_deg: 0.0,
            capital_cost: 0.0,
            sub_network: None,
            r_pu: 0.0,
            x_pu: 0.0,
            g_pu: 0.0,
            b_pu: 0.0,
            p0_mw: Vec::new(),
            q0_mvar: Vec::new(),
            p1_mw: Vec::new(),
            q1_mvar: Vec::new(),
        }
    }
}

/// A passive branch: either a [`Line`] or a [`Transformer`]. Both carry
/// sub-network connectivity (spec.md §3/§4.2).
#[derive(Debug, Clone)]
pub enum PassiveBranch {
    Line(Line),
    Transformer(Transformer),
}

impl PassiveBranch {
    pub fn id(&self) -> BranchId {
        match self {
            PassiveBranch::Line(l) => l.id,
            PassiveBranch::Transformer(t) => t.id,
        }
    }

    pub fn bus0(&self) -> BusId {
        match self {
            PassiveBranch::Line(l) => l.bus0,
            PassiveBranch::Transformer(t) => t.bus0,
        }
    }

    pub fn bus1(&self) -> BusId {
        match self {
            PassiveBranch::Line(l) => l.bus1,
            PassiveBranch::Transformer(t) => t.bus1,
        }
    }

    pub fn sub_network(&self) -> Option<SubNetworkId> {
        match self {
            PassiveBranch::Line(l) => l.sub_network,
            PassiveBranch::Transformer(t) => t.sub_network,
        }
    }

    pub fn set_sub_network(&mut self, sn: SubNetworkId) {
        match self {
            PassiveBranch::Line(l) => l.sub_network = Some(sn),
            PassiveBranch::Transformer(t) => t.sub_network = Some(sn),
        }
    }

    pub fn r_pu(&self) -> f64 {
        match self {
            PassiveBranch::Line(l) => l.r_pu,
            PassiveBranch::Transformer(t) => t.r_pu,
        }
    }

    pub fn x_pu(&self) -> f64 {
        match self {
            PassiveBranch::Line(l) => l.x_pu,
            PassiveBranch::Transformer(t) => t.x_pu,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            PassiveBranch::Line(l) => &l.name,
            PassiveBranch::Transformer(t) => &t.name,
        }
    }
}

/// Converter or transport link: a controllable branch whose flow is set
/// directly rather than arising from impedance (spec.md §3). Does not
/// create sub-network connectivity.
#[derive(Debug, Clone)]
pub struct ControllableBranch {
    pub id: BranchId,
    pub name: String,
    pub kind: ControllableKind,
    pub bus0: BusId,
    pub bus1: BusId,
    pub p_min: Megawatts,
    pub p_max: Megawatts,
    pub capital_cost: f64,
    pub p_set: Vec<f64>,
    pub p0_mw: Vec<f64>,
    pub p1_mw: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllableKind {
    Converter,
    TransportLink,
}

impl ControllableBranch {
    pub fn new(id: BranchId, name: impl Into<String>, kind: ControllableKind, bus0: BusId, bus1: BusId) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            bus0,
            bus1,
            p_min: Megawatts(f64::NEG_INFINITY),
            p_max: Megawatts(f64::INFINITY),
            capital_cost: 0.0,
            p_set: Vec::new(),
            p0_mw: Vec::new(),
            p1_mw: Vec::new(),
        }
    }
}

/// Maximal connected component of passive branches of one current type
/// (spec.md §4.2). Holds the canonical bus ordering used by every matrix
/// builder; the matrices themselves (Y, B, H, PTDF) are cached in
/// `gridsim-solve` keyed by `SubNetworkId`, since they depend on sparse
/// linear-algebra types this crate does not take a dependency on.
#[derive(Debug, Clone)]
pub struct SubNetwork {
    pub id: SubNetworkId,
    pub current_type: CurrentType,
    pub buses: Vec<BusId>,
    pub branches: Vec<BranchId>,
    pub slack_bus: Option<BusId>,
    pub slack_generator: Option<GenId>,
    /// `[slack] ++ pvpqs`, dense index `i` == position in this vector.
    pub buses_o: Vec<BusId>,
    pub pvs: Vec<BusId>,
    pub pqs: Vec<BusId>,
}

impl SubNetwork {
    /// `pvpqs = concat(pvs, pqs)` (spec.md §4.2).
    pub fn pvpqs(&self) -> Vec<BusId> {
        self.pvs.iter().chain(self.pqs.iter()).copied().collect()
    }

    /// Dense index of `bus` within `buses_o`, the canonical internal numbering.
    pub fn index_of(&self, bus: BusId) -> Option<usize> {
        self.buses_o.iter().position(|&b| b == bus)
    }
}

/// Edge weight of the topology multigraph: identifies which branch
/// collection and id an edge corresponds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchRef {
    Passive(usize),
    Controllable(usize),
}

/// The full network: entities, snapshots, topology graph and config.
#[derive(Clone)]
pub struct Network {
    graph: UnGraph<BusId, BranchRef>,
    bus_nodes: Vec<NodeIndex>,

    buses: Vec<Bus>,
    generators: Vec<Generator>,
    storage_units: Vec<StorageUnit>,
    loads: Vec<Load>,
    shunts: Vec<ShuntImpedance>,
    passive_branches: Vec<PassiveBranch>,
    controllable_branches: Vec<ControllableBranch>,
    sources: Vec<Source>,
    sub_networks: Vec<SubNetwork>,

    pub snapshots: Vec<String>,
    pub snapshot_weightings: Vec<f64>,
    pub config: NetworkConfig,

    topology_determined: bool,
    dependent_values_calculated: bool,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    pub fn new() -> Self {
        Self {
            graph: UnGraph::new_undirected(),
            bus_nodes: Vec::new(),
            buses: Vec::new(),
            generators: Vec::new(),
            storage_units: Vec::new(),
            loads: Vec::new(),
            shunts: Vec::new(),
            passive_branches: Vec::new(),
            controllable_branches: Vec::new(),
            sources: Vec::new(),
            sub_networks: Vec::new(),
            snapshots: vec!["now".to_string()],
            snapshot_weightings: vec![1.0],
            config: NetworkConfig::default(),
            topology_determined: false,
            dependent_values_calculated: false,
        }
    }

    /// Replace the snapshot list, resizing every per-snapshot series with
    /// the component-specific default fill (spec.md §3 "Lifecycles").
    pub fn set_snapshots(&mut self, snapshots: Vec<String>, weightings: Vec<f64>) {
        assert_eq!(snapshots.len(), weightings.len());
        let n = snapshots.len();
        self.snapshots = snapshots;
        self.snapshot_weightings = weightings;
        for bus in &mut self.buses {
            resize_fill(&mut bus.v_mag_pu, n, 1.0);
            resize_fill(&mut bus.v_ang_rad, n, 0.0);
            resize_fill(&mut bus.p_mw, n, 0.0);
            resize_fill(&mut bus.q_mvar, n, 0.0);
            resize_fill(&mut bus.marginal_price, n, 0.0);
        }
        for gen in &mut self.generators {
            resize_fill(&mut gen.p_set, n, 0.0);
            resize_fill(&mut gen.q_set, n, 0.0);
            resize_fill(&mut gen.p_mw, n, 0.0);
            resize_fill(&mut gen.q_mvar, n, 0.0);
        }
        for su in &mut self.storage_units {
            resize_fill(&mut su.inflow, n, 0.0);
            resize_fill(&mut su.p_mw, n, 0.0);
            su.state_of_charge.resize(n, None);
        }
        for load in &mut self.loads {
            resize_fill(&mut load.p_set, n, 0.0);
            resize_fill(&mut load.q_set, n, 0.0);
            resize_fill(&mut load.p_mw, n, 0.0);
            resize_fill(&mut load.q_mvar, n, 0.0);
        }
        for sh in &mut self.shunts {
            resize_fill(&mut sh.p_mw, n, 0.0);
            resize_fill(&mut sh.q_mvar, n, 0.0);
        }
        for branch in &mut self.passive_branches {
            match branch {
                PassiveBranch::Line(l) => {
                    resize_fill(&mut l.p0_mw, n, 0.0);
                    resize_fill(&mut l.q0_mvar, n, 0.0);
                    resize_fill(&mut l.p1_mw, n, 0.0);
                    resize_fill(&mut l.q1_mvar, n, 0.0);
                }
                PassiveBranch::Transformer(t) => {
                    resize_fill(&mut t.p0_mw, n, 0.0);
                    resize_fill(&mut t.q0_mvar, n, 0.0);
                    resize_fill(&mut t.p1_mw, n, 0.0);
                    resize_fill(&mut t.q1_mvar, n, 0.0);
                }
            }
        }
        for cb in &mut self.controllable_branches {
            resize_fill(&mut cb.p_set, n, 0.0);
            resize_fill(&mut cb.p0_mw, n, 0.0);
            resize_fill(&mut cb.p1_mw, n, 0.0);
        }
    }

    pub fn add_bus(&mut self, mut bus: Bus) -> BusId {
        let id = BusId::new(self.buses.len());
        bus.id = id;
        resize_fill(&mut bus.v_mag_pu, self.snapshots.len(), 1.0);
        resize_fill(&mut bus.v_ang_rad, self.snapshots.len(), 0.0);
        resize_fill(&mut bus.p_mw, self.snapshots.len(), 0.0);
        resize_fill(&mut bus.q_mvar, self.snapshots.len(), 0.0);
        resize_fill(&mut bus.marginal_price, self.snapshots.len(), 0.0);
        self.buses.push(bus);
        let node = self.graph.add_node(id);
        self.bus_nodes.push(node);
        self.invalidate_topology();
        id
    }

    pub fn add_generator(&mut self, mut gen: Generator) -> GenId {
        let id = GenId::new(self.generators.len());
        gen.id = id;
        resize_fill(&mut gen.p_set, self.snapshots.len(), 0.0);
        resize_fill(&mut gen.q_set, self.snapshots.len(), 0.0);
        resize_fill(&mut gen.p_mw, self.snapshots.len(), 0.0);
        resize_fill(&mut gen.q_mvar, self.snapshots.len(), 0.0);
        self.generators.push(gen);
        self.invalidate_topology();
        id
    }

    pub fn add_storage_unit(&mut self, mut su: StorageUnit) -> StorageId {
        let id = StorageId::new(self.storage_units.len());
        su.id = id;
        resize_fill(&mut su.inflow, self.snapshots.len(), 0.0);
        resize_fill(&mut su.p_mw, self.snapshots.len(), 0.0);
        su.state_of_charge.resize(self.snapshots.len(), None);
        self.storage_units.push(su);
        self.invalidate_topology();
        id
    }

    pub fn add_load(&mut self, mut load: Load) -> LoadId {
        let id = LoadId::new(self.loads.len());
        load.id = id;
        resize_fill(&mut load.p_set, self.snapshots.len(), 0.0);
        resize_fill(&mut load.q_set, self.snapshots.len(), 0.0);
        resize_fill(&mut load.p_mw, self.snapshots.len(), 0.0);
        resize_fill(&mut load.q_mvar, self.snapshots.len(), 0.0);
        self.loads.push(load);
        id
    }

    pub fn add_shunt(&mut self, mut sh: ShuntImpedance) -> ShuntId {
        let id = ShuntId::new(self.shunts.len());
        sh.id = id;
        resize_fill(&mut sh.p_mw, self.snapshots.len(), 0.0);
        resize_fill(&mut sh.q_mvar, self.snapshots.len(), 0.0);
        self.shunts.push(sh);
        id
    }

    pub fn add_source(&mut self, mut src: Source) -> SourceId {
        let id = SourceId::new(self.sources.len());
        src.id = id;
        self.sources.push(src);
        id
    }

    pub fn add_line(&mut self, mut line: Line) -> GridSimResult<BranchId> {
        self.check_branch_endpoints(line.bus0, line.bus1)?;
        let id = BranchId::new(self.passive_branches.len());
        line.id = id;
        resize_fill(&mut line.p0_mw, self.snapshots.len(), 0.0);
        resize_fill(&mut line.q0_mvar, self.snapshots.len(), 0.0);
        resize_fill(&mut line.p1_mw, self.snapshots.len(), 0.0);
        resize_fill(&mut line.q1_mvar, self.snapshots.len(), 0.0);
        let idx = self.passive_branches.len();
        let (bus0, bus1) = (line.bus0, line.bus1);
        self.passive_branches.push(PassiveBranch::Line(line));
        self.graph
            .add_edge(self.bus_nodes[bus0.value()], self.bus_nodes[bus1.value()], BranchRef::Passive(idx));
        self.invalidate_topology();
        Ok(id)
    }

    pub fn add_transformer(&mut self, mut tr: Transformer) -> GridSimResult<BranchId> {
        self.check_branch_endpoints(tr.bus0, tr.bus1)?;
        let id = BranchId::new(self.passive_branches.len());
        tr.id = id;
        resize_fill(&mut tr.p0_mw, self.snapshots.len(), 0.0);
        resize_fill(&mut tr.q0_mvar, self.snapshots.len(), 0.0);
        resize_fill(&mut tr.p1_mw, self.snapshots.len(), 0.0);
        resize_fill(&mut tr.q1_mvar, self.snapshots.len(), 0.0);
        let idx = self.passive_branches.len();
        let (bus0, bus1) = (tr.bus0, tr.bus1);
        self.passive_branches.push(PassiveBranch::Transformer(tr));
        self.graph
            .add_edge(self.bus_nodes[bus0.value()], self.bus_nodes[bus1.value()], BranchRef::Passive(idx));
        self.invalidate_topology();
        Ok(id)
    }

    pub fn add_controllable_branch(&mut self, mut cb: ControllableBranch) -> GridSimResult<BranchId> {
        self.check_branch_endpoints(cb.bus0, cb.bus1)?;
        let id = BranchId::new(self.controllable_branches.len());
        cb.id = id;
        resize_fill(&mut cb.p_set, self.snapshots.len(), 0.0);
        resize_fill(&mut cb.p0_mw, self.snapshots.len(), 0.0);
        resize_fill(&mut cb.p1_mw, self.snapshots.len(), 0.0);
        let idx = self.controllable_branches.len();
        let (bus0, bus1) = (cb.bus0, cb.bus1);
        self.controllable_branches.push(cb);
        // Controllable branches participate in the full multigraph (spec.md
        // §4.2 step 1) but are removed before connected components are
        // found (step 2), so `topology::analyse` ignores this edge kind.
        self.graph
            .add_edge(self.bus_nodes[bus0.value()], self.bus_nodes[bus1.value()], BranchRef::Controllable(idx));
        self.invalidate_topology();
        Ok(id)
    }

    fn check_branch_endpoints(&self, bus0: BusId, bus1: BusId) -> GridSimResult<()> {
        if bus0.value() >= self.buses.len() {
            return Err(GridSimError::Topology(format!("branch endpoint bus {bus0} does not exist")));
        }
        if bus1.value() >= self.buses.len() {
            return Err(GridSimError::Topology(format!("branch endpoint bus {bus1} does not exist")));
        }
        if self.buses[bus0.value()].current_type != self.buses[bus1.value()].current_type {
            return Err(GridSimError::Topology(format!(
                "branch endpoints {bus0} and {bus1} have mismatched current_type"
            )));
        }
        Ok(())
    }

    /// Mark cached topology, matrices and sub-network classification stale.
    /// `gridsim-solve`'s matrix caches key off `SubNetworkId` and must be
    /// dropped whenever this is called (spec.md §5).
    pub fn invalidate_topology(&mut self) {
        self.topology_determined = false;
    }

    pub fn topology_determined(&self) -> bool {
        self.topology_determined
    }

    pub fn mark_topology_determined(&mut self) {
        self.topology_determined = true;
    }

    pub fn dependent_values_calculated(&self) -> bool {
        self.dependent_values_calculated
    }

    pub fn mark_dependent_values_calculated(&mut self) {
        self.dependent_values_calculated = true;
    }

    pub fn graph(&self) -> &UnGraph<BusId, BranchRef> {
        &self.graph
    }

    pub fn node_index(&self, bus: BusId) -> NodeIndex {
        self.bus_nodes[bus.value()]
    }

    pub fn buses(&self) -> &[Bus] {
        &self.buses
    }

    pub fn buses_mut(&mut self) -> &mut [Bus] {
        &mut self.buses
    }

    pub fn bus(&self, id: BusId) -> &Bus {
        &self.buses[id.value()]
    }

    pub fn bus_mut(&mut self, id: BusId) -> &mut Bus {
        &mut self.buses[id.value()]
    }

    pub fn generators(&self) -> &[Generator] {
        &self.generators
    }

    pub fn generators_mut(&mut self) -> &mut [Generator] {
        &mut self.generators
    }

    pub fn generator(&self, id: GenId) -> &Generator {
        &self.generators[id.value()]
    }

    pub fn generator_mut(&mut self, id: GenId) -> &mut Generator {
        &mut self.generators[id.value()]
    }

    pub fn storage_units(&self) -> &[StorageUnit] {
        &self.storage_units
    }

    pub fn storage_units_mut(&mut self) -> &mut [StorageUnit] {
        &mut self.storage_units
    }

    pub fn storage_unit_mut(&mut self, id: StorageId) -> &mut StorageUnit {
        &mut self.storage_units[id.value()]
    }

    pub fn loads(&self) -> &[Load] {
        &self.loads
    }

    pub fn loads_mut(&mut self) -> &mut [Load] {
        &mut self.loads
    }

    pub fn shunts(&self) -> &[ShuntImpedance] {
        &self.shunts
    }

    pub fn shunts_mut(&mut self) -> &mut [ShuntImpedance] {
        &mut self.shunts
    }

    pub fn passive_branches(&self) -> &[PassiveBranch] {
        &self.passive_branches
    }

    pub fn passive_branches_mut(&mut self) -> &mut [PassiveBranch] {
        &mut self.passive_branches
    }

    pub fn controllable_branches(&self) -> &[ControllableBranch] {
        &self.controllable_branches
    }

    pub fn controllable_branches_mut(&mut self) -> &mut [ControllableBranch] {
        &mut self.controllable_branches
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn sub_networks(&self) -> &[SubNetwork] {
        &self.sub_networks
    }

    pub fn set_sub_networks(&mut self, sub_networks: Vec<SubNetwork>) {
        self.sub_networks = sub_networks;
    }

    pub fn generators_at_bus(&self, bus: BusId) -> impl Iterator<Item = &Generator> {
        self.generators.iter().filter(move |g| g.bus == bus)
    }

    pub fn loads_at_bus(&self, bus: BusId) -> impl Iterator<Item = &Load> {
        self.loads.iter().filter(move |l| l.bus == bus)
    }

    pub fn storage_units_at_bus(&self, bus: BusId) -> impl Iterator<Item = &StorageUnit> {
        self.storage_units.iter().filter(move |s| s.bus == bus)
    }

    pub fn shunts_at_bus(&self, bus: BusId) -> impl Iterator<Item = &ShuntImpedance> {
        self.shunts.iter().filter(move |s| s.bus == bus)
    }

    pub fn total_generation_mw(&self, snapshot: usize) -> f64 {
        self.generators.iter().filter_map(|g| g.p_mw.get(snapshot)).sum()
    }

    pub fn total_load_mw(&self, snapshot: usize) -> f64 {
        self.loads.iter().filter_map(|l| l.p_set.get(snapshot)).sum()
    }

    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            bus_count: self.buses.len(),
            generator_count: self.generators.len(),
            storage_count: self.storage_units.len(),
            load_count: self.loads.len(),
            passive_branch_count: self.passive_branches.len(),
            controllable_branch_count: self.controllable_branches.len(),
            sub_network_count: self.sub_networks.len(),
        }
    }

    /// Structural validation beyond what `check_branch_endpoints` already
    /// enforces at insertion time: reports one-ports attached to buses that
    /// no longer exist, and PV generator duplicates on a bus (spec.md §3
    /// invariant "PV bus list contains no duplicates on bus").
    pub fn validate_into(&self, diag: &mut Diagnostics) {
        for gen in &self.generators {
            if gen.bus.value() >= self.buses.len() {
                diag.add_error_with_entity("reference", "generator references non-existent bus", &gen.name);
            }
        }
        for load in &self.loads {
            if load.bus.value() >= self.buses.len() {
                diag.add_error_with_entity("reference", "load references non-existent bus", &load.name);
            }
        }
        let mut pv_buses = std::collections::HashSet::new();
        for gen in self.generators.iter().filter(|g| g.control == BusControl::Pv) {
            if !pv_buses.insert(gen.bus) {
                diag.add_validation_warning(&gen.name, "more than one PV generator on the same bus");
            }
        }
        if self.buses.is_empty() {
            diag.add_warning("validation", "network has no buses");
        }
    }
}

fn resize_fill(v: &mut Vec<f64>, n: usize, fill: f64) {
    v.resize(n, fill);
}

/// Summary statistics over a [`Network`].
#[derive(Debug, Clone, Copy)]
pub struct NetworkStats {
    pub bus_count: usize,
    pub generator_count: usize,
    pub storage_count: usize,
    pub load_count: usize,
    pub passive_branch_count: usize,
    pub controllable_branch_count: usize,
    pub sub_network_count: usize,
}

impl std::fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} buses, {} generators, {} storage units, {} loads, {} passive branches, {} controllable branches, {} sub-networks",
            self.bus_count,
            self.generator_count,
            self.storage_count,
            self.load_count,
            self.passive_branch_count,
            self.controllable_branch_count,
            self.sub_network_count
        )
    }
}
