//! Bulk-rock composition.

use crate::error::{GibbsError, GibbsResult};
use crate::oxides::ChemicalSystem;
use gm_core::Conditions;

/// Bulk composition plus the conditions it is solved at.
///
/// The oxide vector is mole-fraction normalized at construction and immutable
/// during a solve; only P,T change between points. Components with zero bulk
/// concentration are recorded so potential computations can exclude them
/// (a chemical potential of an absent component is singular).
#[derive(Debug, Clone, PartialEq)]
pub struct BulkComposition {
    composition: Vec<f64>,
    nonzero: Vec<usize>,
    /// Conditions of the current point (the only mutable part).
    pub conditions: Conditions,
}

impl BulkComposition {
    /// Normalize and validate a raw oxide vector against the system basis.
    pub fn new(
        system: &ChemicalSystem,
        raw: &[f64],
        conditions: Conditions,
    ) -> GibbsResult<Self> {
        if raw.len() != system.len() {
            return Err(GibbsError::MalformedComposition {
                what: "bulk vector length does not match chemical system",
            });
        }
        let mut sum = 0.0;
        for v in raw {
            if !v.is_finite() {
                return Err(GibbsError::MalformedComposition {
                    what: "non-finite bulk entry",
                });
            }
            if *v < 0.0 {
                return Err(GibbsError::MalformedComposition {
                    what: "negative bulk entry",
                });
            }
            sum += v;
        }
        if sum <= 0.0 {
            return Err(GibbsError::MalformedComposition {
                what: "bulk vector sums to zero",
            });
        }

        let composition: Vec<f64> = raw.iter().map(|v| v / sum).collect();
        let nonzero = composition
            .iter()
            .enumerate()
            .filter(|(_, v)| **v > 0.0)
            .map(|(i, _)| i)
            .collect();

        Ok(Self {
            composition,
            nonzero,
            conditions,
        })
    }

    /// Normalized oxide mole fractions (sum = 1).
    pub fn composition(&self) -> &[f64] {
        &self.composition
    }

    /// Indices of components present in the bulk.
    pub fn nonzero(&self) -> &[usize] {
        &self.nonzero
    }

    /// Restriction of an arbitrary full-dimension vector to the nonzero rows.
    pub fn restrict(&self, full: &[f64]) -> Vec<f64> {
        self.nonzero.iter().map(|&i| full[i]).collect()
    }

    /// Update the point conditions, leaving the composition untouched.
    pub fn set_conditions(&mut self, conditions: Conditions) {
        self.conditions = conditions;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn two_component_system() -> ChemicalSystem {
        ChemicalSystem::new(vec!["A".into(), "B".into()], vec![50.0, 60.0]).unwrap()
    }

    #[test]
    fn normalizes_and_finds_zeros() {
        let sys = ChemicalSystem::new(
            vec!["A".into(), "B".into(), "C".into()],
            vec![50.0, 60.0, 70.0],
        )
        .unwrap();
        let bulk = BulkComposition::new(
            &sys,
            &[2.0, 0.0, 6.0],
            Conditions::from_kbar_kelvin(10.0, 1000.0),
        )
        .unwrap();
        assert!((bulk.composition()[0] - 0.25).abs() < 1e-12);
        assert_eq!(bulk.nonzero(), &[0, 2]);
    }

    #[test]
    fn rejects_zero_sum() {
        let sys = two_component_system();
        let err = BulkComposition::new(&sys, &[0.0, 0.0], Conditions::from_kbar_kelvin(1.0, 500.0))
            .unwrap_err();
        assert!(matches!(err, GibbsError::MalformedComposition { .. }));
    }

    proptest! {
        // Normalized oxide vector must sum to 1 within 1e-10.
        #[test]
        fn normalization_sums_to_one(a in 1e-6f64..1e3, b in 0.0f64..1e3) {
            let sys = two_component_system();
            let bulk = BulkComposition::new(
                &sys,
                &[a, b],
                Conditions::from_kbar_kelvin(1.0, 500.0),
            ).unwrap();
            let sum: f64 = bulk.composition().iter().sum();
            prop_assert!((sum - 1.0).abs() < 1e-10);
        }
    }
}
