//! Phase database: allocation, per-point evaluation, reset.

use crate::error::{PhaseError, PhaseResult};
use crate::pure::PurePhaseRef;
use crate::solution::{SolidSolutionRef, SolutionModel};
use gm_core::Conditions;
use gm_gibbs::{ChemicalSystem, GibbsModel};
use tracing::warn;

/// Capacities derived from run configuration.
#[derive(Debug, Clone, Copy)]
pub struct DatabaseConfig {
    /// Pseudocompound buffer capacity per solid solution
    pub max_pseudocompounds: usize,
    /// Phase-instance pool capacity downstream
    pub max_active_phases: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_pseudocompounds: 256,
            max_active_phases: 16,
        }
    }
}

/// All reference records in scope for one chemical system.
///
/// Allocated once at startup; workers clone it so every worker owns a fully
/// private copy during the per-point solve.
#[derive(Debug, Clone)]
pub struct PhaseDatabase {
    pub system: ChemicalSystem,
    pub config: DatabaseConfig,
    pub pure_phases: Vec<PurePhaseRef>,
    pub solutions: Vec<SolidSolutionRef>,
}

impl PhaseDatabase {
    /// Build the database, validating every name against the Gibbs model.
    ///
    /// An unrecognized pure phase or solution endmember skips only that phase
    /// (with a warning); ending up with no phases at all is fatal.
    pub fn initialize(
        system: ChemicalSystem,
        pure_names: &[&str],
        solution_models: Vec<SolutionModel>,
        model: &dyn GibbsModel,
        config: DatabaseConfig,
    ) -> PhaseResult<Self> {
        let n_ox = system.len();

        let mut pure_phases = Vec::with_capacity(pure_names.len());
        for name in pure_names {
            if model.knows(name) {
                pure_phases.push(PurePhaseRef::new(name, n_ox));
            } else {
                warn!(phase = name, model = model.name(), "unknown pure phase, skipped");
            }
        }

        let mut solutions = Vec::with_capacity(solution_models.len());
        for sm in solution_models {
            sm.validate()?;
            if let Some(missing) = sm.endmembers.iter().find(|em| !model.knows(em)) {
                warn!(
                    solution = sm.name.as_str(),
                    endmember = missing.as_str(),
                    "solution has an unknown endmember, skipped"
                );
                continue;
            }
            solutions.push(SolidSolutionRef::new(sm, n_ox, config.max_pseudocompounds));
        }

        if pure_phases.is_empty() && solutions.is_empty() {
            return Err(PhaseError::Config {
                what: "no phase in scope survives name validation".to_string(),
            });
        }

        Ok(Self {
            system,
            config,
            pure_phases,
            solutions,
        })
    }

    /// Query the Gibbs model for every relevant endmember and pure phase at
    /// the given conditions. Pure data population, no iteration.
    pub fn evaluate_endmembers(
        &mut self,
        model: &dyn GibbsModel,
        conditions: Conditions,
    ) -> PhaseResult<()> {
        for pp in &mut self.pure_phases {
            let em = model.endmember(&pp.name, conditions, &self.system)?;
            pp.gbase = em.gbase;
            pp.composition = em.composition;
            pp.factor = em.factor;
        }
        for ss in &mut self.solutions {
            for (i, name) in ss.model.endmembers.clone().iter().enumerate() {
                let em = model.endmember(name, conditions, &self.system)?;
                ss.gbase[i] = em.gbase;
                for (c, v) in em.composition.iter().enumerate() {
                    ss.em_comp[(i, c)] = *v;
                }
                ss.em_factor[i] = em.factor;
            }
        }
        Ok(())
    }

    /// Clear per-point state (buffers, seeds, derived properties) without
    /// touching any allocation.
    pub fn reset(&mut self) {
        for pp in &mut self.pure_phases {
            pp.reset();
        }
        for ss in &mut self.solutions {
            ss.reset();
        }
    }

    pub fn pure_index(&self, name: &str) -> Option<usize> {
        self.pure_phases.iter().position(|p| p.name == name)
    }

    pub fn solution_index(&self, name: &str) -> Option<usize> {
        self.solutions.iter().position(|s| s.name() == name)
    }

    /// Look up a solution by name or fail with `UnknownPhase`.
    pub fn solution_named(&self, name: &str) -> PhaseResult<&SolidSolutionRef> {
        self.solution_index(name)
            .map(|i| &self.solutions[i])
            .ok_or_else(|| PhaseError::UnknownPhase {
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gm_gibbs::{demo_catalog, LinearEntry, LinearGibbsModel};

    fn demo_db() -> PhaseDatabase {
        let system = ChemicalSystem::kncfmashtocr();
        let model = demo_catalog();
        PhaseDatabase::initialize(
            system,
            &["q", "ru"],
            vec![
                SolutionModel::ideal("ol", &["fo", "fa"]),
                SolutionModel::ideal("pl", &["ab", "an"]),
            ],
            &model,
            DatabaseConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn unknown_names_are_skipped_not_fatal() {
        let system = ChemicalSystem::kncfmashtocr();
        let model = demo_catalog();
        let db = PhaseDatabase::initialize(
            system,
            &["q", "not-a-phase"],
            vec![SolutionModel::ideal("bogus", &["fo", "not-an-em"])],
            &model,
            DatabaseConfig::default(),
        )
        .unwrap();
        assert_eq!(db.pure_phases.len(), 1);
        assert!(db.solutions.is_empty());
    }

    #[test]
    fn empty_database_is_a_config_error() {
        let system = ChemicalSystem::kncfmashtocr();
        let model = LinearGibbsModel::new(vec![LinearEntry::new(
            "only",
            -1.0,
            0.0,
            0.0,
            &[("SiO2", 1.0)],
        )]);
        let err = PhaseDatabase::initialize(
            system,
            &["missing"],
            vec![],
            &model,
            DatabaseConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PhaseError::Config { .. }));
    }

    #[test]
    fn evaluate_endmembers_populates_energies_and_compositions() {
        let mut db = demo_db();
        let model = demo_catalog();
        db.evaluate_endmembers(&model, Conditions::from_kbar_kelvin(12.0, 1373.15))
            .unwrap();
        let q = &db.pure_phases[db.pure_index("q").unwrap()];
        assert!((q.gbase - -990.0).abs() < 1e-9);
        assert!((q.composition[0] - 1.0).abs() < 1e-12);

        let ol = db.solution_named("ol").unwrap();
        // fo carries 2 MgO
        let mgo = db.system.index_of("MgO").unwrap();
        assert!((ol.em_comp[(0, mgo)] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn reset_clears_buffers_and_reseeds() {
        let mut db = demo_db();
        db.solutions[0].iguess[0] = 0.9;
        db.reset();
        assert!((db.solutions[0].iguess[0] - 0.5).abs() < 1e-12);
        assert!(db.solutions[0].buffer.is_empty());
    }
}
