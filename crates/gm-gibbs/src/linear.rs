//! Analytic linear Gibbs-energy backend.
//!
//! Each entry carries G(P,T) = g0 - s0*(T - T0) + v0*(P - P0) with constant
//! entropy and volume. This is the built-in backend for tests and the demo
//! catalog; a tabulated database implements the same `GibbsModel` trait.

use crate::error::{GibbsError, GibbsResult};
use crate::model::{EndmemberGibbs, GibbsModel};
use crate::oxides::ChemicalSystem;
use gm_core::Conditions;

/// Reference conditions of the linear expansion (12 kbar, 1100 C).
pub const T0_K: f64 = 1373.15;
pub const P0_KBAR: f64 = 12.0;

/// One endmember of the linear backend.
///
/// Composition is keyed by component name so the same entry works in a reduced
/// test system and in the full oxide space.
#[derive(Debug, Clone)]
pub struct LinearEntry {
    pub id: String,
    /// Gibbs energy at (P0, T0) [kJ/mol]
    pub g0: f64,
    /// Molar entropy [kJ/(mol K)]
    pub s0: f64,
    /// Molar volume [kJ/kbar == 10 cm3]
    pub v0: f64,
    /// Moles of oxide per formula unit
    pub composition: Vec<(String, f64)>,
    /// Normalization scale passed through to the engine
    pub factor: f64,
}

impl LinearEntry {
    pub fn new(id: &str, g0: f64, s0: f64, v0: f64, composition: &[(&str, f64)]) -> Self {
        Self {
            id: id.to_string(),
            g0,
            s0,
            v0,
            composition: composition
                .iter()
                .map(|(n, v)| (n.to_string(), *v))
                .collect(),
            factor: 1.0,
        }
    }
}

/// Table-of-entries `GibbsModel` backend.
#[derive(Debug, Clone, Default)]
pub struct LinearGibbsModel {
    entries: Vec<LinearEntry>,
}

impl LinearGibbsModel {
    pub fn new(entries: Vec<LinearEntry>) -> Self {
        Self { entries }
    }

    pub fn push(&mut self, entry: LinearEntry) {
        self.entries.push(entry);
    }

    fn find(&self, id: &str) -> Option<&LinearEntry> {
        self.entries.iter().find(|e| e.id == id)
    }
}

impl GibbsModel for LinearGibbsModel {
    fn name(&self) -> &str {
        "linear"
    }

    fn knows(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    fn endmember(
        &self,
        id: &str,
        conditions: Conditions,
        system: &ChemicalSystem,
    ) -> GibbsResult<EndmemberGibbs> {
        let entry = self.find(id).ok_or_else(|| GibbsError::UnknownEndmember {
            name: id.to_string(),
        })?;

        let gbase = entry.g0 - entry.s0 * (conditions.t_k - T0_K)
            + entry.v0 * (conditions.p_kbar - P0_KBAR);

        let mut composition = vec![0.0; system.len()];
        for (name, moles) in &entry.composition {
            let idx = system
                .index_of(name)
                .ok_or(GibbsError::MalformedComposition {
                    what: "endmember references a component outside the chemical system",
                })?;
            composition[idx] = *moles;
        }

        Ok(EndmemberGibbs {
            gbase,
            composition,
            factor: entry.factor,
        })
    }
}

/// Small built-in endmember catalog over KNCFMASHTOCr.
///
/// Entropy and volume values are in the right ballpark for the named minerals;
/// they exist so the CLI can run out of the box, not as a calibrated database.
pub fn demo_catalog() -> LinearGibbsModel {
    LinearGibbsModel::new(vec![
        // Pure phases
        LinearEntry::new("q", -990.0, 0.1043, 2.269, &[("SiO2", 1.0)]),
        LinearEntry::new("crst", -988.2, 0.1098, 2.587, &[("SiO2", 1.0)]),
        LinearEntry::new("ru", -1030.0, 0.0505, 1.882, &[("TiO2", 1.0)]),
        LinearEntry::new("sill", -2800.0, 0.0955, 4.986, &[("SiO2", 1.0), ("Al2O3", 1.0)]),
        LinearEntry::new("H2O", -280.0, 0.0695, 1.807, &[("H2O", 1.0)]),
        // Olivine endmembers
        LinearEntry::new("fo", -2250.0, 0.0951, 4.366, &[("SiO2", 1.0), ("MgO", 2.0)]),
        LinearEntry::new("fa", -1560.0, 0.1510, 4.631, &[("SiO2", 1.0), ("FeO", 2.0)]),
        // Plagioclase endmembers
        LinearEntry::new(
            "ab",
            -3990.0,
            0.2074,
            10.067,
            &[("SiO2", 3.0), ("Al2O3", 0.5), ("Na2O", 0.5)],
        ),
        LinearEntry::new(
            "an",
            -4480.0,
            0.1993,
            10.079,
            &[("SiO2", 2.0), ("Al2O3", 1.0), ("CaO", 1.0)],
        ),
        LinearEntry::new(
            "san",
            -4030.0,
            0.2143,
            10.871,
            &[("SiO2", 3.0), ("Al2O3", 0.5), ("K2O", 0.5)],
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_expansion_matches_hand_value() {
        let model = demo_catalog();
        let sys = ChemicalSystem::kncfmashtocr();
        let c = Conditions::from_kbar_kelvin(P0_KBAR + 2.0, T0_K + 100.0);
        let em = model.endmember("q", c, &sys).unwrap();
        let expect = -990.0 - 0.1043 * 100.0 + 2.269 * 2.0;
        assert!((em.gbase - expect).abs() < 1e-9);
        assert!((em.composition[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn unknown_endmember_is_an_error() {
        let model = demo_catalog();
        let sys = ChemicalSystem::kncfmashtocr();
        let c = Conditions::from_kbar_kelvin(10.0, 1000.0);
        let err = model.endmember("nope", c, &sys).unwrap_err();
        assert!(matches!(err, GibbsError::UnknownEndmember { .. }));
    }
}
