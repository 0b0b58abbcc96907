//! LOPF solution summary (spec.md §4.6).
//!
//! Dispatch, SOC, flows, extended capacities, and bus marginal prices are
//! written directly onto the `Network` (the same "writer" discipline as
//! `power_flow`); this struct only carries the values a caller cannot
//! recover by re-reading the network afterwards. Grounded on the teacher's
//! `OpfSolution`, re-keyed from `HashMap<String, f64>` (name-keyed) to the
//! typed-id entity model this port uses throughout.

/// Outcome of a successful LOPF solve.
#[derive(Debug, Clone)]
pub struct LopfSolution {
    pub objective_value: f64,
    /// Number of snapshots the single LP spanned.
    pub snapshot_count: usize,
}
