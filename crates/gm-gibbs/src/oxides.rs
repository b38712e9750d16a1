//! Oxide components and the chemical-system basis.

use crate::error::{GibbsError, GibbsResult};

/// The component basis of a run: oxide names and their molar masses.
///
/// Every composition vector, Gamma vector and phase composition in the engine
/// is indexed against one `ChemicalSystem`; its length fixes the dimension of
/// the mass-balance system. Small test systems (one or two components) use the
/// same type as the full KNCFMASHTOCr space.
#[derive(Debug, Clone, PartialEq)]
pub struct ChemicalSystem {
    components: Vec<String>,
    /// Molar mass per component [g/mol]
    molar_masses: Vec<f64>,
}

impl ChemicalSystem {
    /// Build a system from parallel name / molar-mass lists.
    pub fn new(components: Vec<String>, molar_masses: Vec<f64>) -> GibbsResult<Self> {
        if components.is_empty() || components.len() != molar_masses.len() {
            return Err(GibbsError::MalformedComposition {
                what: "component and molar-mass lists must be non-empty and equal length",
            });
        }
        if molar_masses.iter().any(|m| !m.is_finite() || *m <= 0.0) {
            return Err(GibbsError::NonPhysical { what: "molar mass" });
        }
        Ok(Self {
            components,
            molar_masses,
        })
    }

    /// The 11-oxide KNCFMASHTOCr space of the igneous database.
    pub fn kncfmashtocr() -> Self {
        let components = [
            "SiO2", "Al2O3", "CaO", "MgO", "FeO", "K2O", "Na2O", "TiO2", "O", "Cr2O3", "H2O",
        ];
        let molar_masses = [
            60.08, 101.96, 56.08, 40.30, 71.85, 94.2, 61.98, 79.88, 16.0, 151.99, 18.015,
        ];
        Self {
            components: components.iter().map(|s| s.to_string()).collect(),
            molar_masses: molar_masses.to_vec(),
        }
    }

    /// Number of tracked components (the `len_ox` of every vector).
    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.components
    }

    pub fn molar_masses(&self) -> &[f64] {
        &self.molar_masses
    }

    /// Index of a component name, if tracked.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.components.iter().position(|c| c == name)
    }

    /// Molar mass of a phase composition vector [g/mol].
    pub fn molar_mass_of(&self, composition: &[f64]) -> f64 {
        composition
            .iter()
            .zip(&self.molar_masses)
            .map(|(c, m)| c * m)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kncfmashtocr_has_eleven_components() {
        let sys = ChemicalSystem::kncfmashtocr();
        assert_eq!(sys.len(), 11);
        assert_eq!(sys.index_of("SiO2"), Some(0));
        assert_eq!(sys.index_of("H2O"), Some(10));
        assert_eq!(sys.index_of("ZrO2"), None);
    }

    #[test]
    fn mismatched_lists_rejected() {
        let err = ChemicalSystem::new(vec!["SiO2".into()], vec![]).unwrap_err();
        assert!(matches!(err, GibbsError::MalformedComposition { .. }));
    }

    #[test]
    fn molar_mass_weights_composition() {
        let sys = ChemicalSystem::new(vec!["A".into(), "B".into()], vec![10.0, 20.0]).unwrap();
        let m = sys.molar_mass_of(&[0.5, 0.5]);
        assert!((m - 15.0).abs() < 1e-12);
    }
}
