//! Partitioning Gibbs-energy iteration: the continuous second stage.
//!
//! Starting from the levelled assemblage, each outer iteration refines the
//! active and held solution phases against the current duals, then solves one
//! coupled linear system for the dual and amount corrections: the mass-balance
//! rows see the compositional response of every solution phase to a dual
//! perturbation, so a bulk residual tilts Gamma until the refined compositions
//! can carry the bulk. The phase roster updates afterwards: phases whose
//! amount collapses are removed, excluded phases with a negative driving force
//! are brought (back) in. A phase that oscillates between removal and
//! reintroduction too many times is forced onto hold for the rest of the
//! point.

use crate::assemblage::{Assemblage, PhaseInstance, PhaseKind, PhaseStatus};
use crate::error::{SolverError, SolverResult};
use crate::levelling::{admissible, LevellingOutcome};
use crate::refine::{gradient, refine, RefineConfig};
use gm_core::numeric::{ensure_finite, nearly_equal, Tolerances};
use gm_gibbs::BulkComposition;
use gm_phases::{PhaseDatabase, SolidSolutionRef};
use nalgebra::{DMatrix, DVector};
use tracing::{debug, trace};

#[derive(Debug, Clone)]
pub struct PgeConfig {
    /// Outer-iteration cap; 0 means unlimited. A point that hits the cap is
    /// not converged.
    pub max_iterations: usize,
    /// Under-relaxation factor applied to the dual update, in (0, 1]
    pub gamma_relax: f64,
    /// Amounts below this are treated as phase-out
    pub min_amount: f64,
    /// Activation/removal flips tolerated before a phase is forced on hold
    pub max_cycles: u32,
    /// Seed amount for a reintroduced or added phase
    pub reintro_amount: f64,
    pub refine: RefineConfig,
}

impl Default for PgeConfig {
    fn default() -> Self {
        Self {
            max_iterations: 128,
            gamma_relax: 0.8,
            min_amount: 1e-8,
            max_cycles: 4,
            reintro_amount: 1e-4,
            refine: RefineConfig {
                max_evals: 200,
                ..RefineConfig::default()
            },
        }
    }
}

/// How the iteration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceQuality {
    /// Mass balance and roster both settled within tolerance
    Converged,
    /// Iteration cap hit with a loose but usable mass balance
    Acceptable,
    Failed,
}

#[derive(Debug, Clone)]
pub struct PgeOutcome {
    pub gamma: Vec<f64>,
    pub iterations: usize,
    /// Largest mass-balance residual component at exit
    pub residual: f64,
    pub quality: ConvergenceQuality,
    pub total_gibbs: f64,
}

/// Driving force of a candidate phase against the current duals.
fn driving_force(gibbs: f64, comp: &[f64], gamma: &[f64]) -> f64 {
    gibbs - gamma.iter().zip(comp).map(|(g, c)| g * c).sum::<f64>()
}

/// Seed the working assemblage from the levelled basis.
pub fn seed_assemblage(
    db: &PhaseDatabase,
    levelled: &LevellingOutcome,
    capacity: usize,
) -> SolverResult<Assemblage> {
    let n_ox = db.system.len();
    let mut asm = Assemblage::new(capacity);
    for ph in &levelled.basis {
        let mut inst = match ph.kind {
            PhaseKind::Pure(i) => {
                let pp = &db.pure_phases[i];
                PhaseInstance::pure(i, pp.composition.clone(), pp.gbase, pp.factor, ph.amount)
            }
            PhaseKind::Solution(_) => PhaseInstance {
                kind: ph.kind,
                x: ph.x.clone(),
                p: ph.p.clone(),
                mu: ph.mu.clone(),
                comp: ph.comp.clone(),
                gibbs: ph.gibbs,
                factor: ph.factor,
                amount: ph.amount,
                ..PhaseInstance::pure(0, vec![0.0; n_ox], 0.0, 1.0, 0.0)
            },
        };
        inst.status = PhaseStatus::Active;
        asm.push(inst)?;
    }
    Ok(asm)
}

/// Re-refine every active and held solution instance against the current
/// duals. Held instances stay out of the solve but keep tracking the duals,
/// so their driving force is current when the roster is revisited.
fn refresh_solution_instances(
    db: &PhaseDatabase,
    asm: &mut Assemblage,
    gamma: &[f64],
    t_k: f64,
    cfg: &PgeConfig,
    tol: &Tolerances,
) -> SolverResult<()> {
    for idx in 0..asm.len() {
        let inst = asm.get(idx);
        if !matches!(inst.status, PhaseStatus::Active | PhaseStatus::Hold) {
            continue;
        }
        let PhaseKind::Solution(s) = inst.kind else {
            continue;
        };
        let seed = inst.x.clone();
        let r = refine(&db.solutions[s], &seed, gamma, t_k, &cfg.refine, tol)?;
        let inst = asm.get_mut(idx);
        inst.x = r.eval.x;
        inst.p = r.eval.p;
        inst.mu = r.eval.mu;
        inst.comp = r.eval.comp;
        inst.gibbs = r.eval.gibbs;
        inst.factor = r.eval.factor;
        inst.refine_converged = r.converged;
    }
    Ok(())
}

/// Step used for the finite-difference curvature of the refinement objective.
const FD_STEP: f64 = 1e-6;
/// Coordinates closer than this to a box bound are treated as pinned.
const FREE_MARGIN: f64 = 1e-5;

/// Compositional response of a refined solution instance to a dual
/// perturbation, restricted to the bulk's components.
///
/// At an interior refinement minimum the coordinates obey H dx = dcomp^T
/// dGamma, so the oxide composition responds as dcomp H^-1 dcomp^T. The
/// curvature H comes from central differences of the levelled gradient;
/// bound-pinned coordinates do not respond. None when every coordinate is
/// pinned.
fn dual_response(
    ss: &SolidSolutionRef,
    x: &[f64],
    gamma: &[f64],
    t_k: f64,
    nonzero: &[usize],
) -> SolverResult<Option<DMatrix<f64>>> {
    let n_x = ss.model.n_xeos();
    let free: Vec<usize> = (0..n_x)
        .filter(|&j| {
            let (lo, hi) = ss.model.bounds[j];
            x[j] > lo + FREE_MARGIN && x[j] < hi - FREE_MARGIN
        })
        .collect();
    if free.is_empty() {
        return Ok(None);
    }

    let mut h = DMatrix::<f64>::zeros(free.len(), free.len());
    for (col, &j) in free.iter().enumerate() {
        let mut xp = x.to_vec();
        xp[j] += FD_STEP;
        let mut xm = x.to_vec();
        xm[j] -= FD_STEP;
        let gp = gradient(ss, &ss.evaluate_unchecked(t_k, &xp)?, gamma);
        let gm = gradient(ss, &ss.evaluate_unchecked(t_k, &xm)?, gamma);
        for (row, &i) in free.iter().enumerate() {
            h[(row, col)] = (gp[i] - gm[i]) / (2.0 * FD_STEP);
        }
    }

    // dcomp/dx = em_comp^T dpdx, restricted to the bulk's components and the
    // free coordinates
    let dpdx = ss.model.dpdx();
    let n_em = ss.model.n_em();
    let mut b = DMatrix::<f64>::zeros(nonzero.len(), free.len());
    for (row, &c) in nonzero.iter().enumerate() {
        for (col, &j) in free.iter().enumerate() {
            b[(row, col)] = (0..n_em).map(|i| ss.em_comp[(i, c)] * dpdx[(i, j)]).sum();
        }
    }

    let svd = h.svd(true, true);
    let hinv_bt = svd
        .solve(&b.transpose(), 1e-10)
        .map_err(|e| SolverError::Numeric { what: e.to_string() })?;
    Ok(Some(&b * hinv_bt))
}

/// One coupled partitioning solve over the active set.
///
/// Unknowns are the dual correction (per present component) and the amount
/// correction (per active phase). The mass-balance rows carry the
/// amount-weighted compositional response of the solution phases, which is
/// what couples a bulk residual back into the duals; the tangency rows drive
/// the driving force of every active phase to zero. Returns the full-space
/// dual correction and the amount corrections aligned with the active set.
fn solve_partition(
    db: &PhaseDatabase,
    asm: &Assemblage,
    bulk: &BulkComposition,
    gamma: &[f64],
    cfg: &PgeConfig,
) -> SolverResult<(Vec<f64>, Vec<f64>)> {
    let active = asm.active_indices();
    let nonzero = bulk.nonzero();
    let m = nonzero.len();
    let p = active.len();
    let t_k = bulk.conditions.t_k;

    let mut kkt = DMatrix::<f64>::zeros(m + p, m + p);
    let mut rhs = DVector::<f64>::zeros(m + p);
    let mut carried = vec![0.0; m];

    for (col, &idx) in active.iter().enumerate() {
        let inst = asm.get(idx);
        let comp = bulk.restrict(&inst.comp);
        for (row, c) in comp.iter().enumerate() {
            kkt[(row, m + col)] = *c;
            kkt[(m + col, row)] = *c;
            carried[row] += inst.amount * c;
        }
        rhs[m + col] = driving_force(inst.gibbs, &inst.comp, gamma);

        if let PhaseKind::Solution(s) = inst.kind {
            if let Some(r) = dual_response(&db.solutions[s], &inst.x, gamma, t_k, nonzero)? {
                // a freshly reintroduced phase still gets a usable response
                let w = inst.amount.max(cfg.reintro_amount);
                for row in 0..m {
                    for c in 0..m {
                        kkt[(row, c)] += w * r[(row, c)];
                    }
                }
            }
        }
    }
    let target = bulk.restrict(bulk.composition());
    for row in 0..m {
        rhs[row] = target[row] - carried[row];
    }

    let svd = kkt.svd(true, true);
    let sol = svd
        .solve(&rhs, 1e-12)
        .map_err(|e| SolverError::Numeric { what: e.to_string() })?;

    let mut dgamma = vec![0.0; gamma.len()];
    for (col, &ox) in nonzero.iter().enumerate() {
        dgamma[ox] = sol[col];
    }
    let dn = (0..p).map(|i| sol[m + i]).collect();
    Ok((dgamma, dn))
}

/// Drop active phases whose amount fell through the floor. The most negative
/// goes first; at least one phase always stays. Returns how many were
/// removed.
fn remove_collapsed(asm: &mut Assemblage, cfg: &PgeConfig) -> usize {
    let mut removed = 0;
    loop {
        let active = asm.active_indices();
        if active.len() <= 1 {
            break;
        }
        let worst = active
            .into_iter()
            .map(|i| (i, asm.get(i).amount))
            .filter(|(_, a)| *a < cfg.min_amount)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        let Some((idx, _)) = worst else { break };
        let inst = asm.get_mut(idx);
        inst.amount = 0.0;
        inst.set_status(PhaseStatus::Removed);
        if inst.cycles > cfg.max_cycles {
            inst.forced_hold = true;
            inst.set_status(PhaseStatus::Hold);
        }
        removed += 1;
    }
    removed
}

/// Merge active instances of one solution that refined onto the same
/// composition. The survivor absorbs the amount; the duplicate is removed,
/// which keeps it eligible for reintroduction at a distant composition.
fn merge_coincident(asm: &mut Assemblage, tol: &Tolerances) -> usize {
    let active = asm.active_indices();
    let mut merged = 0;
    for ai in 0..active.len() {
        for bi in (ai + 1)..active.len() {
            let (i, j) = (active[ai], active[bi]);
            let (a, b) = (asm.get(i), asm.get(j));
            if a.kind != b.kind
                || !matches!(a.kind, PhaseKind::Solution(_))
                || !a.is_active()
                || !b.is_active()
            {
                continue;
            }
            let coincident = a
                .x
                .iter()
                .zip(&b.x)
                .all(|(p, q)| nearly_equal(*p, *q, tol.solvus_merge, 0.0));
            if coincident {
                let amount = b.amount;
                asm.get_mut(i).amount += amount;
                let dup = asm.get_mut(j);
                dup.amount = 0.0;
                dup.set_status(PhaseStatus::Removed);
                merged += 1;
            }
        }
    }
    merged
}

/// Bring back removed phases, add never-seen pure phases with a favorable
/// driving force, and split off a fresh instance of a solution when a
/// buffered candidate is favorable at a composition distant from every
/// current instance. Force-held phases and phases outside the bulk's
/// component scope stay out. Returns how many came in.
fn reintroduce(
    db: &PhaseDatabase,
    asm: &mut Assemblage,
    bulk: &BulkComposition,
    gamma: &[f64],
    t_k: f64,
    cfg: &PgeConfig,
    tol: &Tolerances,
) -> SolverResult<usize> {
    let nonzero = bulk.nonzero();
    let mut added = 0;

    for i in 0..asm.len() {
        let inst = asm.get(i);
        if inst.status != PhaseStatus::Removed || inst.forced_hold || !inst.in_scope {
            continue;
        }
        // a removed solution instance sitting on an active twin would merge
        // right back; leave it out until the compositions separate
        if let PhaseKind::Solution(s) = inst.kind {
            let coincident = asm.solution_instances(s).iter().any(|&other| {
                let o = asm.get(other);
                o.is_active()
                    && o.x
                        .iter()
                        .zip(&inst.x)
                        .all(|(p, q)| nearly_equal(*p, *q, tol.solvus_merge, 0.0))
            });
            if coincident {
                continue;
            }
        }
        let df = driving_force(inst.gibbs, &inst.comp, gamma);
        if df < -tol.driving_force {
            let inst = asm.get_mut(i);
            inst.amount = cfg.reintro_amount;
            inst.set_status(PhaseStatus::Active);
            if inst.cycles > cfg.max_cycles {
                inst.forced_hold = true;
                inst.amount = 0.0;
                inst.set_status(PhaseStatus::Hold);
            } else {
                added += 1;
            }
        }
    }

    // pure phases never seeded into the pool; one carrying a component the
    // bulk lacks enters once as an out-of-scope marker and is never consulted
    // again
    for (i, pp) in db.pure_phases.iter().enumerate() {
        let seen = asm.iter().any(|inst| inst.kind == PhaseKind::Pure(i));
        if seen {
            continue;
        }
        if !admissible(&pp.composition, nonzero) {
            let mut marker =
                PhaseInstance::pure(i, pp.composition.clone(), pp.gbase, pp.factor, 0.0);
            marker.status = PhaseStatus::Removed;
            marker.in_scope = false;
            asm.push(marker)?;
            continue;
        }
        let df = driving_force(pp.gbase, &pp.composition, gamma);
        if df < -tol.driving_force {
            asm.push(PhaseInstance::pure(
                i,
                pp.composition.clone(),
                pp.gbase,
                pp.factor,
                cfg.reintro_amount,
            ))?;
            added += 1;
        }
    }

    // solvus split: a buffered candidate that undercuts the current duals at
    // a composition no existing instance covers becomes a new instance
    for (s, ss) in db.solutions.iter().enumerate() {
        let existing: Vec<Vec<f64>> = asm
            .solution_instances(s)
            .into_iter()
            .filter(|&i| asm.get(i).is_active())
            .map(|i| asm.get(i).x.clone())
            .collect();

        let mut best: Option<(f64, Vec<f64>)> = None;
        for pc in ss.buffer.iter() {
            if !admissible(&pc.comp, nonzero) {
                continue;
            }
            // buffer energies were levelled against an older Gamma; re-derive
            // the raw energy at the candidate coordinates
            let Ok(eval) = ss.evaluate_unchecked(t_k, &pc.x) else {
                continue;
            };
            let df = driving_force(eval.gibbs, &eval.comp, gamma);
            if df < -tol.driving_force && best.as_ref().map_or(true, |(b, _)| df < *b) {
                best = Some((df, pc.x.clone()));
            }
        }
        let Some((_, seed)) = best else { continue };
        let distant = existing.iter().all(|x| {
            x.iter()
                .zip(&seed)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0_f64, f64::max)
                > tol.solvus_merge
        });
        if !distant && !existing.is_empty() {
            continue;
        }
        let r = refine(ss, &seed, gamma, t_k, &cfg.refine, tol)?;
        if driving_force(r.eval.gibbs, &r.eval.comp, gamma) >= -tol.driving_force {
            continue;
        }
        // the refined candidate may have slid onto an existing instance
        let still_distant = existing.iter().all(|x| {
            x.iter()
                .zip(&r.eval.x)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0_f64, f64::max)
                > tol.solvus_merge
        });
        if !still_distant {
            continue;
        }
        asm.push(PhaseInstance {
            kind: PhaseKind::Solution(s),
            x: r.eval.x,
            p: r.eval.p,
            mu: r.eval.mu,
            comp: r.eval.comp,
            gibbs: r.eval.gibbs,
            factor: r.eval.factor,
            amount: cfg.reintro_amount,
            refine_converged: r.converged,
            ..PhaseInstance::pure(0, vec![0.0; db.system.len()], 0.0, 1.0, 0.0)
        })?;
        added += 1;
    }
    Ok(added)
}

/// Run the iteration to convergence or the iteration cap.
pub fn pge(
    db: &PhaseDatabase,
    asm: &mut Assemblage,
    bulk: &BulkComposition,
    gamma0: &[f64],
    cfg: &PgeConfig,
    tol: &Tolerances,
) -> SolverResult<PgeOutcome> {
    let t_k = bulk.conditions.t_k;
    let mut gamma = gamma0.to_vec();
    let mut residual = f64::INFINITY;
    let mut iterations = 0usize;
    let cap = if cfg.max_iterations == 0 {
        usize::MAX
    } else {
        cfg.max_iterations
    };

    while iterations < cap {
        iterations += 1;

        refresh_solution_instances(db, asm, &gamma, t_k, cfg, tol)?;
        let merged = merge_coincident(asm, tol);

        let (dgamma, dn) = solve_partition(db, asm, bulk, &gamma, cfg)?;
        for &ox in bulk.nonzero() {
            gamma[ox] += cfg.gamma_relax * dgamma[ox];
            ensure_finite(gamma[ox], "dual potential")
                .map_err(|e| SolverError::Numeric { what: e.to_string() })?;
        }
        let active = asm.active_indices();
        for (&idx, &d) in active.iter().zip(&dn) {
            asm.get_mut(idx).amount += d;
        }
        residual = asm
            .mass_balance_residual(bulk.composition(), bulk.nonzero())
            .iter()
            .fold(0.0_f64, |acc, r| acc.max(r.abs()));

        let removed = remove_collapsed(asm, cfg);
        let added = reintroduce(db, asm, bulk, &gamma, t_k, cfg, tol)?;

        trace!(
            iteration = iterations,
            residual,
            n_active = asm.n_active(),
            merged,
            removed,
            added,
            "outer iteration"
        );

        if merged == 0 && removed == 0 && added == 0 && residual < tol.mass_balance {
            debug!(iterations, residual, "iteration converged");
            return Ok(PgeOutcome {
                gamma,
                iterations,
                residual,
                quality: ConvergenceQuality::Converged,
                total_gibbs: asm.total_gibbs(),
            });
        }
    }

    let quality = if residual < 1e-4 {
        ConvergenceQuality::Acceptable
    } else {
        ConvergenceQuality::Failed
    };
    debug!(iterations, residual, ?quality, "iteration cap reached");
    Ok(PgeOutcome {
        gamma,
        iterations,
        residual,
        quality,
        total_gibbs: asm.total_gibbs(),
    })
}
