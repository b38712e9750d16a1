//! Gibbs-energy model trait.

use crate::error::GibbsResult;
use crate::oxides::ChemicalSystem;
use gm_core::Conditions;

/// Standard-state data for one endmember or pure phase at fixed (P,T).
#[derive(Debug, Clone, PartialEq)]
pub struct EndmemberGibbs {
    /// Standard-state molar Gibbs energy [kJ/mol]
    pub gbase: f64,
    /// Oxide composition, indexed against the run's `ChemicalSystem`
    pub composition: Vec<f64>,
    /// Normalization scale (mole vs. atom basis); 1.0 for mole basis
    pub factor: f64,
}

/// Trait for standard-state Gibbs-energy backends.
///
/// Implementations must be thread-safe (Send + Sync): per-worker database
/// copies call into one shared model, and the post-processing stencil queries
/// it thousands of times per point. Queries must be deterministic in
/// (id, conditions).
pub trait GibbsModel: Send + Sync {
    /// Backend name (for logging).
    fn name(&self) -> &str;

    /// True if `id` resolves to a known endmember or pure phase.
    fn knows(&self, id: &str) -> bool;

    /// Standard-state Gibbs energy and composition at the given conditions.
    fn endmember(
        &self,
        id: &str,
        conditions: Conditions,
        system: &ChemicalSystem,
    ) -> GibbsResult<EndmemberGibbs>;
}
