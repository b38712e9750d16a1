//! Phase-instance pool and the per-phase state machine.
//!
//! Status transitions follow IN -> ACT -> (HLD | RMV) -> (REIN | stays RMV).
//! A removed instance is flag-reset, not destroyed: the backing storage is a
//! fixed-capacity pool reused across iterations and points, and a removed
//! phase keeps its cycle history so oscillation is visible across
//! reintroductions.

use crate::error::{SolverError, SolverResult};
use gm_phases::PhysicalProperties;

/// Which reference record an instance points back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    Pure(usize),
    Solution(usize),
}

/// Active-set membership of one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStatus {
    /// Part of the minimizing active set with nonzero molar amount
    Active,
    /// Out of the active set but re-evaluated every iteration
    Hold,
    /// Out of consideration; may be reintroduced by a favorable driving force
    Removed,
}

/// One occurrence of a phase in the current assemblage.
///
/// Several instances may reference the same solution model (solvus splitting);
/// they differ in compositional coordinates.
#[derive(Debug, Clone)]
pub struct PhaseInstance {
    pub kind: PhaseKind,
    /// Compositional coordinates (empty for pure phases)
    pub x: Vec<f64>,
    /// Endmember proportions (empty for pure phases)
    pub p: Vec<f64>,
    /// Endmember chemical potentials (gbase for pure phases)
    pub mu: Vec<f64>,
    /// Oxide composition
    pub comp: Vec<f64>,
    /// Molar Gibbs energy
    pub gibbs: f64,
    pub factor: f64,
    /// Molar amount in the assemblage
    pub amount: f64,
    pub status: PhaseStatus,
    /// Elementary feasibility against the bulk (the IN flag)
    pub in_scope: bool,
    /// ACT<->RMV flips observed for this phase
    pub cycles: u32,
    /// Set when the cycle detector pinned this phase to Hold
    pub forced_hold: bool,
    /// Set on the iteration a removed phase re-entered the active set
    pub reintroduced: bool,
    /// False when the last local refinement exhausted its budget
    pub refine_converged: bool,
    /// Endmember chemical potentials at the 7 stencil conditions, filled by
    /// post-processing
    pub mu_stencil: Vec<Vec<f64>>,
    pub props: PhysicalProperties,
}

impl PhaseInstance {
    pub fn pure(idx: usize, comp: Vec<f64>, gbase: f64, factor: f64, amount: f64) -> Self {
        Self {
            kind: PhaseKind::Pure(idx),
            x: Vec::new(),
            p: Vec::new(),
            mu: vec![gbase],
            comp,
            gibbs: gbase,
            factor,
            amount,
            status: PhaseStatus::Active,
            in_scope: true,
            cycles: 0,
            forced_hold: false,
            reintroduced: false,
            refine_converged: true,
            mu_stencil: Vec::new(),
            props: PhysicalProperties::default(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PhaseStatus::Active
    }

    /// Apply a status transition, counting ACT<->RMV oscillation.
    pub fn set_status(&mut self, status: PhaseStatus) {
        let flip = matches!(
            (self.status, status),
            (PhaseStatus::Active, PhaseStatus::Removed)
                | (PhaseStatus::Removed, PhaseStatus::Active)
        );
        if flip {
            self.cycles += 1;
        }
        self.reintroduced =
            self.status == PhaseStatus::Removed && status == PhaseStatus::Active;
        self.status = status;
        if status != PhaseStatus::Active {
            self.amount = 0.0;
        }
    }
}

/// Fixed-capacity pool of phase instances.
#[derive(Debug, Clone)]
pub struct Assemblage {
    instances: Vec<PhaseInstance>,
    capacity: usize,
}

impl Assemblage {
    pub fn new(capacity: usize) -> Self {
        Self {
            instances: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PhaseInstance> {
        self.instances.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PhaseInstance> {
        self.instances.iter_mut()
    }

    pub fn get(&self, i: usize) -> &PhaseInstance {
        &self.instances[i]
    }

    pub fn get_mut(&mut self, i: usize) -> &mut PhaseInstance {
        &mut self.instances[i]
    }

    pub fn active_indices(&self) -> Vec<usize> {
        (0..self.instances.len())
            .filter(|&i| self.instances[i].is_active())
            .collect()
    }

    pub fn n_active(&self) -> usize {
        self.instances.iter().filter(|i| i.is_active()).count()
    }

    /// Add an instance, reusing a removed slot of the same kind when one
    /// exists (flag reset rather than construction). Errors when the pool is
    /// truly full.
    pub fn push(&mut self, instance: PhaseInstance) -> SolverResult<usize> {
        if let Some(slot) = self
            .instances
            .iter()
            .position(|i| i.status == PhaseStatus::Removed && i.kind == instance.kind)
        {
            let cycles = self.instances[slot].cycles;
            let forced = self.instances[slot].forced_hold;
            let mut inst = instance;
            inst.cycles = cycles;
            inst.forced_hold = forced;
            self.instances[slot] = inst;
            // slot reuse is a RMV -> ACT flip
            self.instances[slot].cycles += 1;
            self.instances[slot].reintroduced = true;
            return Ok(slot);
        }
        if self.instances.len() >= self.capacity {
            return Err(SolverError::PoolExhausted {
                capacity: self.capacity,
            });
        }
        self.instances.push(instance);
        Ok(self.instances.len() - 1)
    }

    /// Instance indices referencing a given solution model.
    pub fn solution_instances(&self, ss_idx: usize) -> Vec<usize> {
        (0..self.instances.len())
            .filter(|&i| self.instances[i].kind == PhaseKind::Solution(ss_idx))
            .collect()
    }

    /// Total Gibbs energy of the active set, amount-weighted.
    pub fn total_gibbs(&self) -> f64 {
        self.instances
            .iter()
            .filter(|i| i.is_active())
            .map(|i| i.amount * i.gibbs)
            .sum()
    }

    /// Mass-balance residual vector over the given component indices:
    /// sum over active instances of amount * composition, minus bulk.
    pub fn mass_balance_residual(&self, bulk: &[f64], nonzero: &[usize]) -> Vec<f64> {
        nonzero
            .iter()
            .map(|&c| {
                let total: f64 = self
                    .instances
                    .iter()
                    .filter(|i| i.is_active())
                    .map(|i| i.amount * i.comp[c])
                    .sum();
                total - bulk[c]
            })
            .collect()
    }
}
