//! Per-unit normalisation of branch and shunt impedances (spec.md §4.1).
//!
//! Lines and shunt impedances are normalised to their attached bus's nominal
//! voltage; transformers are normalised to their own rated apparent power,
//! since a transformer's per-unit reference is `s_nom`, not the bus voltage
//! on either side.

use crate::{Network, PassiveBranch};

/// Populate `r_pu`/`x_pu`/`g_pu`/`b_pu` on every line, transformer and shunt
/// impedance. Idempotent — recomputes from the physical (ohm/siemens) fields
/// each time, so calling it twice is harmless.
pub fn calculate_dependent_values(network: &mut Network) {
    let v_nom_by_bus: Vec<f64> = network.buses().iter().map(|b| b.v_nom_kv.0).collect();

    for branch in network.passive_branches_mut() {
        match branch {
            PassiveBranch::Line(line) => {
                let v_nom = v_nom_by_bus[line.bus0.value()];
                let v_nom_sq = v_nom * v_nom;
                line.r_pu = line.r / v_nom_sq;
                line.x_pu = line.x / v_nom_sq;
                line.g_pu = line.g * v_nom_sq;
                line.b_pu = line.b * v_nom_sq;
            }
            PassiveBranch::Transformer(tr) => {
                let s_base = tr.s_nom.0;
                tr.r_pu = tr.r / s_base;
                tr.x_pu = tr.x / s_base;
                tr.g_pu = tr.g * s_base;
                tr.b_pu = tr.b * s_base;
            }
        }
    }

    for shunt in network.shunts_mut() {
        let v_nom = v_nom_by_bus[shunt.bus.value()];
        let v_nom_sq = v_nom * v_nom;
        shunt.g_pu = shunt.g * v_nom_sq;
        shunt.b_pu = shunt.b * v_nom_sq;
    }

    network.mark_dependent_values_calculated();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{Kilovolts, MegavoltAmperes};
    use crate::{Bus, BusId, BranchId, CurrentType, Line, ShuntId, ShuntImpedance, Transformer};

    #[test]
    fn line_impedance_normalised_by_bus_voltage_squared() {
        let mut net = Network::new();
        let a = net.add_bus(Bus::new(BusId(0), "A", Kilovolts(400.0), CurrentType::Ac));
        let b = net.add_bus(Bus::new(BusId(0), "B", Kilovolts(400.0), CurrentType::Ac));
        net.add_line(Line::new(BranchId(0), "A-B", a, b, 16.0, 80.0, MegavoltAmperes(500.0)))
            .unwrap();

        calculate_dependent_values(&mut net);

        let line = &net.passive_branches()[0];
        let v_nom_sq = 400.0 * 400.0;
        assert!((line.r_pu() - 16.0 / v_nom_sq).abs() < 1e-12);
        assert!((line.x_pu() - 80.0 / v_nom_sq).abs() < 1e-12);
    }

    #[test]
    fn transformer_impedance_normalised_by_s_nom() {
        let mut net = Network::new();
        let a = net.add_bus(Bus::new(BusId(0), "A", Kilovolts(400.0), CurrentType::Ac));
        let b = net.add_bus(Bus::new(BusId(0), "B", Kilovolts(110.0), CurrentType::Ac));
        net.add_transformer(Transformer::new(BranchId(0), "T1", a, b, 0.01, 0.12, MegavoltAmperes(250.0)))
            .unwrap();

        calculate_dependent_values(&mut net);

        let tr = &net.passive_branches()[0];
        assert!((tr.r_pu() - 0.01 / 250.0).abs() < 1e-12);
        assert!((tr.x_pu() - 0.12 / 250.0).abs() < 1e-12);
    }

    #[test]
    fn shunt_normalised_like_a_line_at_its_bus() {
        let mut net = Network::new();
        let a = net.add_bus(Bus::new(BusId(0), "A", Kilovolts(20.0), CurrentType::Ac));
        net.add_shunt(ShuntImpedance::new(ShuntId(0), "Sh1", a, 0.0, 0.5));

        calculate_dependent_values(&mut net);

        let v_nom_sq = 20.0 * 20.0;
        assert!((net.shunts()[0].b_pu - 0.5 * v_nom_sq).abs() < 1e-12);
    }

    #[test]
    fn calculate_dependent_values_is_idempotent() {
        let mut net = Network::new();
        let a = net.add_bus(Bus::new(BusId(0), "A", Kilovolts(400.0), CurrentType::Ac));
        let b = net.add_bus(Bus::new(BusId(0), "B", Kilovolts(400.0), CurrentType::Ac));
        net.add_line(Line::new(BranchId(0), "A-B", a, b, 16.0, 80.0, MegavoltAmperes(500.0)))
            .unwrap();

        calculate_dependent_values(&mut net);
        let first = net.passive_branches()[0].x_pu();
        calculate_dependent_values(&mut net);
        let second = net.passive_branches()[0].x_pu();
        assert_eq!(first, second);
        assert!(net.dependent_values_calculated());
    }
}
