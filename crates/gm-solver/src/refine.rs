//! Pseudocompound generation and bounded local refinement.
//!
//! Generation samples the compositional-coordinate box on a regular grid,
//! filters site-fraction feasibility, and retains the lowest-energy candidates
//! in the solution's bounded buffer. Refinement runs a projected-gradient
//! descent with backtracking line search from each retained candidate, under
//! box bounds and the linear site-fraction constraints, with a hard
//! evaluation budget.
//!
//! Energies are levelled against the caller's Gamma hyperplane: the objective
//! is G(x) - Gamma . comp(x), which is the phase's driving force up to sign.

use crate::error::SolverResult;
use gm_core::numeric::Tolerances;
use gm_phases::{Pseudocompound, SolidSolutionRef, SolutionEval};
use tracing::trace;

/// Local-refinement configuration.
#[derive(Debug, Clone)]
pub struct RefineConfig {
    /// Maximum objective evaluations per refinement; 0 means unlimited
    pub max_evals: usize,
    /// Initial line-search step along the negative gradient
    pub initial_step: f64,
    /// Backtracking factor
    pub backtrack: f64,
    /// Line-search attempts per iteration
    pub max_backtracks: usize,
    /// Grid-point budget for pseudocompound generation
    pub grid_budget: usize,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            max_evals: 2000,
            initial_step: 0.1,
            backtrack: 0.5,
            max_backtracks: 25,
            grid_budget: 512,
        }
    }
}

/// Result of one local refinement.
#[derive(Debug, Clone)]
pub struct Refined {
    pub eval: SolutionEval,
    /// Objective value G - Gamma . comp at the refined coordinates
    pub objective: f64,
    /// Largest site-fraction violation at the solution (tie-break key)
    pub sf_residual: f64,
    /// False when the evaluation budget ran out first
    pub converged: bool,
    pub evals: usize,
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Project coordinates into the box, then pull back inside the simplex if the
/// proportions closed below zero.
fn project(ss: &SolidSolutionRef, x: &mut [f64]) {
    for (xi, (lo, hi)) in x.iter_mut().zip(&ss.model.bounds) {
        *xi = xi.clamp(*lo, *hi);
    }
    let sum: f64 = x.iter().sum();
    if sum > 1.0 {
        let scale = (1.0 - 1e-9) / sum;
        for xi in x.iter_mut() {
            *xi *= scale;
        }
    }
}

fn feasible(ss: &SolidSolutionRef, eval: &SolutionEval, sf_tol: f64) -> bool {
    let viol = match &ss.model.sites {
        Some(sites) => sites.violation(&eval.sf),
        None => eval.p.iter().fold(0.0_f64, |acc, v| acc.max(-v)),
    };
    viol <= sf_tol
}

fn sf_residual(ss: &SolidSolutionRef, eval: &SolutionEval) -> f64 {
    match &ss.model.sites {
        Some(sites) => sites.violation(&eval.sf),
        None => eval.p.iter().fold(0.0_f64, |acc, v| acc.max(-v)),
    }
}

/// Objective gradient with respect to the compositional coordinates:
/// dpdx^T (dG/dp - em_comp * Gamma).
pub(crate) fn gradient(ss: &SolidSolutionRef, eval: &SolutionEval, gamma: &[f64]) -> Vec<f64> {
    let n_em = ss.model.n_em();
    let n_x = ss.model.n_xeos();
    let mut hyper = vec![0.0; n_em];
    for i in 0..n_em {
        let mut plane = 0.0;
        for (c, g) in gamma.iter().enumerate() {
            plane += g * ss.em_comp[(i, c)];
        }
        hyper[i] = eval.dgdp[i] - plane;
    }
    (0..n_x).map(|j| hyper[j] - hyper[n_em - 1]).collect()
}

/// Gradient with outward components at active box bounds zeroed.
fn projected_gradient(ss: &SolidSolutionRef, x: &[f64], grad: &[f64]) -> Vec<f64> {
    grad.iter()
        .enumerate()
        .map(|(j, g)| {
            let (lo, hi) = ss.model.bounds[j];
            if (x[j] <= lo + 1e-12 && *g > 0.0) || (x[j] >= hi - 1e-12 && *g < 0.0) {
                0.0
            } else {
                *g
            }
        })
        .collect()
}

/// Bounded nonlinear local minimization of the levelled Gibbs energy.
///
/// Never fails on non-convergence: a budget-exhausted refinement comes back
/// flagged `converged = false` and stays usable for the current iteration.
pub fn refine(
    ss: &SolidSolutionRef,
    seed: &[f64],
    gamma: &[f64],
    t_k: f64,
    cfg: &RefineConfig,
    tol: &Tolerances,
) -> SolverResult<Refined> {
    let budget = if cfg.max_evals == 0 {
        usize::MAX
    } else {
        cfg.max_evals
    };

    let mut x = seed.to_vec();
    project(ss, &mut x);

    let mut eval = ss.evaluate_unchecked(t_k, &x)?;
    let mut f = eval.gibbs - dot(gamma, &eval.comp);
    let mut evals = 1usize;
    let mut converged = false;

    while evals < budget {
        let grad = gradient(ss, &eval, gamma);
        let pgrad = projected_gradient(ss, &x, &grad);
        let gnorm = dot(&pgrad, &pgrad).sqrt();
        if gnorm < tol.refine_grad {
            converged = true;
            break;
        }

        // backtracking line search along -grad, rejecting infeasible trials
        let mut alpha = cfg.initial_step / gnorm.max(1.0);
        let mut improved = false;
        for _ in 0..cfg.max_backtracks {
            let mut x_try: Vec<f64> = x.iter().zip(&pgrad).map(|(xi, g)| xi - alpha * g).collect();
            project(ss, &mut x_try);
            let eval_try = ss.evaluate_unchecked(t_k, &x_try)?;
            evals += 1;
            let f_try = eval_try.gibbs - dot(gamma, &eval_try.comp);
            if feasible(ss, &eval_try, tol.site_fraction) && f_try < f - 1e-14 {
                x = x_try;
                eval = eval_try;
                f = f_try;
                improved = true;
                break;
            }
            alpha *= cfg.backtrack;
            if evals >= budget {
                break;
            }
        }

        if !improved {
            // no feasible descent at line-search resolution: stationary
            converged = true;
            break;
        }
    }

    let sf_res = sf_residual(ss, &eval);
    trace!(
        solution = ss.name(),
        objective = f,
        evals,
        converged,
        "local refinement finished"
    );
    Ok(Refined {
        eval,
        objective: f,
        sf_residual: sf_res,
        converged,
        evals,
    })
}

/// Discretize the coordinate box and retain the lowest-energy feasible grid
/// points in the solution's buffer. Infeasible points are discarded, never
/// surfaced.
pub fn generate_pseudocompounds(
    ss: &mut SolidSolutionRef,
    gamma: &[f64],
    t_k: f64,
    cfg: &RefineConfig,
    tol: &Tolerances,
) -> SolverResult<usize> {
    let n_x = ss.model.n_xeos();
    ss.buffer.clear();

    // per-dimension level count from the total point budget
    let levels = (cfg.grid_budget as f64)
        .powf(1.0 / n_x as f64)
        .floor()
        .clamp(2.0, 21.0) as usize;

    let mut idx = vec![0usize; n_x];
    let mut kept = 0usize;
    loop {
        let x: Vec<f64> = idx
            .iter()
            .enumerate()
            .map(|(j, &k)| {
                let (lo, hi) = ss.model.bounds[j];
                lo + (hi - lo) * k as f64 / (levels - 1) as f64
            })
            .collect();

        if let Ok(eval) = ss.evaluate(t_k, &x, tol.site_fraction) {
            let objective = eval.gibbs - dot(gamma, &eval.comp);
            ss.buffer.insert(Pseudocompound {
                gibbs: objective,
                x: eval.x,
                p: eval.p,
                mu: eval.mu,
                comp: eval.comp,
                factor: eval.factor,
                converged: true,
            });
            kept += 1;
        }

        // odometer over the grid
        let mut dim = 0;
        loop {
            if dim == n_x {
                return Ok(kept);
            }
            idx[dim] += 1;
            if idx[dim] < levels {
                break;
            }
            idx[dim] = 0;
            dim += 1;
        }
    }
}

/// Refine every retained candidate and rebuild the buffer from the refined
/// results, merging duplicates that converged to the same minimum.
///
/// Tie-break: candidates whose objectives agree within tolerance keep the one
/// with the lowest site-fraction residual.
pub fn refine_retained(
    ss: &mut SolidSolutionRef,
    gamma: &[f64],
    t_k: f64,
    cfg: &RefineConfig,
    tol: &Tolerances,
) -> SolverResult<Vec<Refined>> {
    let seeds: Vec<Vec<f64>> = ss.buffer.iter().map(|pc| pc.x.clone()).collect();
    let mut refined: Vec<Refined> = Vec::with_capacity(seeds.len());

    for seed in seeds {
        let r = refine(ss, &seed, gamma, t_k, cfg, tol)?;
        // merge with an existing minimum if the coordinates collapsed
        let dup = refined.iter_mut().find(|existing| {
            existing
                .eval
                .x
                .iter()
                .zip(&r.eval.x)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0_f64, f64::max)
                < tol.solvus_merge
        });
        match dup {
            Some(existing) => {
                let better = r.objective < existing.objective - tol.gibbs_tie
                    || ((r.objective - existing.objective).abs() <= tol.gibbs_tie
                        && r.sf_residual < existing.sf_residual);
                if better {
                    *existing = r;
                }
            }
            None => refined.push(r),
        }
    }

    refined.sort_by(|a, b| a.objective.total_cmp(&b.objective));

    ss.buffer.clear();
    for r in &refined {
        ss.buffer.insert(Pseudocompound {
            gibbs: r.objective,
            x: r.eval.x.clone(),
            p: r.eval.p.clone(),
            mu: r.eval.mu.clone(),
            comp: r.eval.comp.clone(),
            factor: r.eval.factor,
            converged: r.converged,
        });
    }
    Ok(refined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gm_phases::{MixingModel, SolidSolutionRef, SolutionModel};

    fn binary_ideal() -> SolidSolutionRef {
        let model = SolutionModel::ideal("bin", &["a", "b"]);
        let mut ss = SolidSolutionRef::new(model, 2, 16);
        ss.gbase = vec![-50.0, -50.0];
        ss.em_comp[(0, 0)] = 1.0;
        ss.em_comp[(1, 1)] = 1.0;
        ss
    }

    #[test]
    fn ideal_binary_refines_to_midpoint() {
        let ss = binary_ideal();
        let tol = Tolerances::default();
        let cfg = RefineConfig::default();
        let r = refine(&ss, &[0.2], &[0.0, 0.0], 1000.0, &cfg, &tol).unwrap();
        assert!(r.converged);
        assert!((r.eval.x[0] - 0.5).abs() < 1e-5, "x = {}", r.eval.x[0]);
    }

    #[test]
    fn refining_a_minimum_stays_put() {
        // seed = the minimum itself: coordinates must not move, energy must
        // not rise
        let ss = binary_ideal();
        let tol = Tolerances::default();
        let cfg = RefineConfig::default();
        let seed_eval = ss.evaluate(1000.0, &[0.5], tol.site_fraction).unwrap();
        let r = refine(&ss, &[0.5], &[0.0, 0.0], 1000.0, &cfg, &tol).unwrap();
        assert!(r.converged);
        assert!((r.eval.x[0] - 0.5).abs() < 1e-7);
        assert!(r.eval.gibbs <= seed_eval.gibbs + 1e-12);
    }

    #[test]
    fn budget_exhaustion_flags_non_converged() {
        let ss = binary_ideal();
        let tol = Tolerances::default();
        let cfg = RefineConfig {
            max_evals: 2,
            ..RefineConfig::default()
        };
        let r = refine(&ss, &[0.05], &[0.0, 0.0], 1000.0, &cfg, &tol).unwrap();
        assert!(!r.converged);
    }

    #[test]
    fn generation_fills_buffer_with_feasible_points_only() {
        let mut ss = binary_ideal();
        let tol = Tolerances::default();
        let cfg = RefineConfig {
            grid_budget: 11,
            ..RefineConfig::default()
        };
        let kept = generate_pseudocompounds(&mut ss, &[0.0, 0.0], 1000.0, &cfg, &tol).unwrap();
        assert!(kept > 0);
        assert!(!ss.buffer.is_empty());
        for pc in ss.buffer.iter() {
            assert!(pc.p.iter().all(|p| *p >= -tol.site_fraction));
        }
    }

    #[test]
    fn gamma_hyperplane_tilts_the_minimum() {
        // favour endmember 0 through Gamma; minimum moves to x > 0.5
        let ss = binary_ideal();
        let tol = Tolerances::default();
        let cfg = RefineConfig::default();
        let r = refine(&ss, &[0.5], &[5.0, 0.0], 1000.0, &cfg, &tol).unwrap();
        assert!(r.eval.x[0] > 0.6);
    }

    #[test]
    fn asymmetric_model_still_refines() {
        let model = SolutionModel::ideal("vl", &["a", "b"]).with_mixing(MixingModel::Asymmetric {
            w: vec![6.0],
            v: vec![1.0, 1.4],
        });
        let mut ss = SolidSolutionRef::new(model, 2, 8);
        ss.gbase = vec![-20.0, -25.0];
        ss.em_comp[(0, 0)] = 1.0;
        ss.em_comp[(1, 1)] = 1.0;
        let tol = Tolerances::default();
        let cfg = RefineConfig::default();
        let r = refine(&ss, &[0.4], &[0.0, 0.0], 900.0, &cfg, &tol).unwrap();
        assert!(r.converged);
        assert!(r.eval.x[0] > 0.0 && r.eval.x[0] < 1.0);
    }
}
