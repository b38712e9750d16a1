//! Per-point driver: one P-T-bulk condition from reset to result.
//!
//! Mode 0 runs the whole stack (levelling, iteration, post-processing).
//! Mode 1 evaluates fixed solution compositions with no search. Mode 3 stops
//! after first-stage levelling. Mode 2 of the historical option surface is
//! deliberately not implemented.
//!
//! A point that fails to converge is still a result: the best available state
//! goes out with its residual and quality flag, and the caller decides what
//! to make of it.

use crate::assemblage::{Assemblage, PhaseKind, PhaseStatus};
use crate::error::{SolverError, SolverResult};
use crate::levelling::{level, LevellingMode};
use crate::pge::{pge, seed_assemblage, ConvergenceQuality, PgeConfig};
use crate::postprocess::{postprocess, StencilConfig, SystemProperties};
use crate::refine::RefineConfig;
use gm_core::numeric::Tolerances;
use gm_core::{Conditions, PointTimer};
use gm_gibbs::{BulkComposition, GibbsModel};
use gm_phases::{PhaseDatabase, PhysicalProperties};
use tracing::{info, info_span};

/// Solving mode, numbered as on the historical command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveMode {
    /// 0: levelling + iteration + post-processing
    Full,
    /// 1: evaluate given solution compositions, no search
    FixedComposition,
    /// 3: first-stage levelling only
    LevellingOnly,
}

/// A fixed-composition record for mode 1.
#[derive(Debug, Clone)]
pub struct FixedPhase {
    pub solution: String,
    pub x: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct PointConfig {
    pub mode: SolveMode,
    pub refine: RefineConfig,
    pub pge: PgeConfig,
    pub stencil: StencilConfig,
    pub tolerances: Tolerances,
    /// Dual-potential starting guess overriding the levelling duals
    pub initial_gamma: Option<Vec<f64>>,
    /// Run the property stencil after convergence (mode 0 only)
    pub compute_properties: bool,
    /// Mode-1 records
    pub fixed: Vec<FixedPhase>,
}

impl Default for PointConfig {
    fn default() -> Self {
        Self {
            mode: SolveMode::Full,
            refine: RefineConfig::default(),
            pge: PgeConfig::default(),
            stencil: StencilConfig::default(),
            tolerances: Tolerances::default(),
            initial_gamma: None,
            compute_properties: true,
            fixed: Vec::new(),
        }
    }
}

/// One stable phase of the emitted result.
#[derive(Debug, Clone)]
pub struct StablePhase {
    pub name: String,
    pub amount: f64,
    /// Compositional coordinates; empty for a pure phase
    pub x: Vec<f64>,
    pub p: Vec<f64>,
    pub mu: Vec<f64>,
    pub comp: Vec<f64>,
    pub gibbs: f64,
    pub props: PhysicalProperties,
}

#[derive(Debug, Clone)]
pub struct PointSolution {
    pub conditions: Conditions,
    pub mode: SolveMode,
    pub stable_phases: Vec<StablePhase>,
    pub gamma: Vec<f64>,
    pub total_gibbs: f64,
    pub iterations: usize,
    /// Largest mass-balance residual component; NaN in mode 1
    pub residual: f64,
    pub quality: ConvergenceQuality,
    pub system: Option<SystemProperties>,
    pub elapsed_ms: f64,
}

fn phase_name(db: &PhaseDatabase, kind: PhaseKind) -> String {
    match kind {
        PhaseKind::Pure(i) => db.pure_phases[i].name.clone(),
        PhaseKind::Solution(s) => db.solutions[s].name().to_string(),
    }
}

fn collect_stable(db: &PhaseDatabase, asm: &Assemblage) -> Vec<StablePhase> {
    asm.iter()
        .filter(|inst| inst.status == PhaseStatus::Active)
        .map(|inst| StablePhase {
            name: phase_name(db, inst.kind),
            amount: inst.amount,
            x: inst.x.clone(),
            p: inst.p.clone(),
            mu: inst.mu.clone(),
            comp: inst.comp.clone(),
            gibbs: inst.gibbs,
            props: inst.props,
        })
        .collect()
}

fn max_residual(asm: &Assemblage, bulk: &BulkComposition) -> f64 {
    asm.mass_balance_residual(bulk.composition(), bulk.nonzero())
        .iter()
        .fold(0.0_f64, |acc, r| acc.max(r.abs()))
}

/// Solve one point. The database is reset and repopulated for the given
/// conditions; inter-point state never leaks through it.
pub fn solve_point(
    db: &mut PhaseDatabase,
    model: &dyn GibbsModel,
    bulk: &BulkComposition,
    cfg: &PointConfig,
) -> SolverResult<PointSolution> {
    let span = info_span!(
        "point",
        p_kbar = bulk.conditions.p_kbar,
        t_k = bulk.conditions.t_k,
        mode = ?cfg.mode
    );
    let _guard = span.enter();
    let timer = PointTimer::start();

    db.reset();
    db.evaluate_endmembers(model, bulk.conditions)?;

    let solution = match cfg.mode {
        SolveMode::Full => solve_full(db, model, bulk, cfg, &timer)?,
        SolveMode::LevellingOnly => solve_levelling_only(db, bulk, cfg, &timer)?,
        SolveMode::FixedComposition => solve_fixed(db, bulk, cfg, &timer)?,
    };

    info!(
        n_stable = solution.stable_phases.len(),
        gibbs = solution.total_gibbs,
        iterations = solution.iterations,
        residual = solution.residual,
        quality = ?solution.quality,
        elapsed_ms = solution.elapsed_ms,
        "point finished"
    );
    Ok(solution)
}

fn solve_full(
    db: &mut PhaseDatabase,
    model: &dyn GibbsModel,
    bulk: &BulkComposition,
    cfg: &PointConfig,
    timer: &PointTimer,
) -> SolverResult<PointSolution> {
    let lev = level(db, bulk, LevellingMode::Full, &cfg.refine, &cfg.tolerances)?;
    let mut asm = seed_assemblage(db, &lev, db.config.max_active_phases)?;

    let gamma0 = cfg.initial_gamma.clone().unwrap_or_else(|| lev.gamma.clone());
    let out = pge(db, &mut asm, bulk, &gamma0, &cfg.pge, &cfg.tolerances)?;

    let system = if cfg.compute_properties {
        Some(postprocess(
            db,
            model,
            &mut asm,
            bulk,
            &out.gamma,
            &cfg.stencil,
            &cfg.tolerances,
        )?)
    } else {
        None
    };

    Ok(PointSolution {
        conditions: bulk.conditions,
        mode: cfg.mode,
        stable_phases: collect_stable(db, &asm),
        gamma: out.gamma,
        total_gibbs: out.total_gibbs,
        iterations: out.iterations,
        residual: out.residual,
        quality: out.quality,
        system,
        elapsed_ms: timer.elapsed_ms(),
    })
}

fn solve_levelling_only(
    db: &mut PhaseDatabase,
    bulk: &BulkComposition,
    cfg: &PointConfig,
    timer: &PointTimer,
) -> SolverResult<PointSolution> {
    let lev = level(
        db,
        bulk,
        LevellingMode::FirstStageOnly,
        &cfg.refine,
        &cfg.tolerances,
    )?;
    let asm = seed_assemblage(db, &lev, db.config.max_active_phases)?;
    let residual = max_residual(&asm, bulk);
    Ok(PointSolution {
        conditions: bulk.conditions,
        mode: cfg.mode,
        stable_phases: collect_stable(db, &asm),
        gamma: lev.gamma,
        total_gibbs: lev.gibbs,
        iterations: 0,
        residual,
        quality: ConvergenceQuality::Converged,
        system: None,
        elapsed_ms: timer.elapsed_ms(),
    })
}

fn solve_fixed(
    db: &mut PhaseDatabase,
    bulk: &BulkComposition,
    cfg: &PointConfig,
    timer: &PointTimer,
) -> SolverResult<PointSolution> {
    if cfg.fixed.is_empty() {
        return Err(SolverError::Numeric {
            what: "fixed-composition mode needs at least one phase record".to_string(),
        });
    }

    let mut stable = Vec::with_capacity(cfg.fixed.len());
    let mut total_gibbs = 0.0;
    for rec in &cfg.fixed {
        let ss = db.solution_named(&rec.solution)?;
        let eval = ss.evaluate(
            bulk.conditions.t_k,
            &rec.x,
            cfg.tolerances.site_fraction,
        )?;
        total_gibbs += eval.gibbs;
        stable.push(StablePhase {
            name: ss.name().to_string(),
            amount: f64::NAN,
            x: eval.x,
            p: eval.p,
            mu: eval.mu,
            comp: eval.comp,
            gibbs: eval.gibbs,
            props: PhysicalProperties::default(),
        });
    }

    Ok(PointSolution {
        conditions: bulk.conditions,
        mode: cfg.mode,
        stable_phases: stable,
        gamma: cfg
            .initial_gamma
            .clone()
            .unwrap_or_else(|| vec![0.0; db.system.len()]),
        total_gibbs,
        iterations: 0,
        residual: f64::NAN,
        quality: ConvergenceQuality::Converged,
        system: None,
        elapsed_ms: timer.elapsed_ms(),
    })
}
