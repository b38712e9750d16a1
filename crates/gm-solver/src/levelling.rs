//! Simplex levelling: the combinatorial first stage of a point solve.
//!
//! A dense two-phase simplex picks the non-negative phase amounts that
//! minimize total Gibbs energy subject to mass balance, over a discrete
//! candidate set. Stage one uses pure phases and raw solution endmembers.
//! In full mode the stage-one duals seed pseudocompound generation and
//! refinement, and the simplex re-runs over the enriched candidate set until
//! the duals settle.
//!
//! Pivoting follows Bland's rule, so candidate order is the tie-break: pure
//! phases are listed before pseudocompounds and enter the basis first when
//! reduced costs tie.

use crate::assemblage::PhaseKind;
use crate::error::{SolverError, SolverResult};
use crate::refine::{generate_pseudocompounds, refine_retained, RefineConfig};
use gm_core::numeric::Tolerances;
use gm_gibbs::BulkComposition;
use gm_phases::PhaseDatabase;
use nalgebra::{DMatrix, DVector};
use tracing::debug;

const PIVOT_EPS: f64 = 1e-11;
const GAMMA_SETTLE: f64 = 1e-6;
const MAX_STAGES: usize = 4;

/// Whether levelling runs its discrete stage only or the full
/// generate-refine-relevel loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevellingMode {
    Full,
    FirstStageOnly,
}

/// One phase in the levelled basis.
#[derive(Debug, Clone)]
pub struct LevelledPhase {
    pub kind: PhaseKind,
    pub amount: f64,
    /// Compositional coordinates; empty for a pure phase
    pub x: Vec<f64>,
    pub p: Vec<f64>,
    pub mu: Vec<f64>,
    pub comp: Vec<f64>,
    pub gibbs: f64,
    pub factor: f64,
}

#[derive(Debug, Clone)]
pub struct LevellingOutcome {
    /// Chemical-potential duals over the full oxide basis; zero on absent
    /// components
    pub gamma: Vec<f64>,
    pub basis: Vec<LevelledPhase>,
    /// Total Gibbs energy of the levelled assemblage
    pub gibbs: f64,
    /// Simplex pivots across all stages
    pub pivots: usize,
    pub stages: usize,
}

#[derive(Debug, Clone)]
struct Candidate {
    kind: PhaseKind,
    x: Vec<f64>,
    p: Vec<f64>,
    mu: Vec<f64>,
    comp: Vec<f64>,
    gibbs: f64,
    factor: f64,
}

/// A candidate is admissible only if it carries no mass in any component the
/// bulk lacks.
pub(crate) fn admissible(comp: &[f64], nonzero: &[usize]) -> bool {
    comp.iter()
        .enumerate()
        .all(|(i, v)| nonzero.contains(&i) || v.abs() < 1e-12)
}

fn discrete_candidates(db: &PhaseDatabase, nonzero: &[usize]) -> Vec<Candidate> {
    let mut out = Vec::new();
    for (i, pp) in db.pure_phases.iter().enumerate() {
        if !admissible(&pp.composition, nonzero) {
            continue;
        }
        out.push(Candidate {
            kind: PhaseKind::Pure(i),
            x: Vec::new(),
            p: vec![1.0],
            mu: vec![pp.gbase],
            comp: pp.composition.clone(),
            gibbs: pp.gbase,
            factor: pp.factor,
        });
    }
    // solution endmembers as discrete vertices; energies come straight from
    // the endmember records so the configurational term never hits ln(0)
    for (s, ss) in db.solutions.iter().enumerate() {
        let n_em = ss.model.n_em();
        let n_x = ss.model.n_xeos();
        for em in 0..n_em {
            let comp: Vec<f64> = (0..ss.em_comp.ncols()).map(|c| ss.em_comp[(em, c)]).collect();
            if !admissible(&comp, nonzero) {
                continue;
            }
            let mut x = vec![0.0; n_x];
            if em < n_x {
                x[em] = 1.0;
            }
            let mut p = vec![0.0; n_em];
            p[em] = 1.0;
            out.push(Candidate {
                kind: PhaseKind::Solution(s),
                x,
                p,
                mu: vec![ss.gbase[em]; n_em],
                comp,
                gibbs: ss.gbase[em],
                factor: ss.em_factor[em],
            });
        }
    }
    out
}

fn buffered_candidates(db: &PhaseDatabase, gamma_full: &[f64], nonzero: &[usize]) -> Vec<Candidate> {
    let mut out = Vec::new();
    for (s, ss) in db.solutions.iter().enumerate() {
        for pc in ss.buffer.iter() {
            if !admissible(&pc.comp, nonzero) {
                continue;
            }
            // buffer energies are levelled against gamma; restore raw G
            let raw: f64 = pc.gibbs
                + gamma_full
                    .iter()
                    .zip(&pc.comp)
                    .map(|(g, c)| g * c)
                    .sum::<f64>();
            out.push(Candidate {
                kind: PhaseKind::Solution(s),
                x: pc.x.clone(),
                p: pc.p.clone(),
                mu: pc.mu.clone(),
                comp: pc.comp.clone(),
                gibbs: raw,
                factor: pc.factor,
            });
        }
    }
    out
}

/// Dense two-phase simplex, Bland's rule. Returns basic column indices, their
/// amounts, and the pivot count.
fn solve_lp(
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    cost: &[f64],
) -> SolverResult<(Vec<(usize, f64)>, usize)> {
    let m = a.nrows();
    let n = a.ncols();

    // tableau: n candidate columns, m artificials, rhs; last row is the
    // objective
    let mut t = DMatrix::<f64>::zeros(m + 1, n + m + 1);
    for i in 0..m {
        for j in 0..n {
            t[(i, j)] = a[(i, j)];
        }
        t[(i, n + i)] = 1.0;
        t[(i, n + m)] = b[i];
    }
    let mut basis: Vec<usize> = (n..n + m).collect();

    // phase 1 objective: minimize the artificial sum
    for j in 0..n + m + 1 {
        let col_sum: f64 = (0..m).map(|i| t[(i, j)]).sum();
        t[(m, j)] = if (n..n + m).contains(&j) { 0.0 } else { -col_sum };
    }

    let mut pivots = 0usize;
    for phase in 0..2 {
        let allowed = if phase == 0 { n + m } else { n };
        loop {
            // Bland: lowest-index column with negative reduced cost
            let entering = (0..allowed).find(|&j| t[(m, j)] < -PIVOT_EPS && !basis.contains(&j));
            let Some(j) = entering else { break };

            // ratio test, ties broken by lowest basis index
            let mut leave: Option<(usize, f64)> = None;
            for i in 0..m {
                if t[(i, j)] > PIVOT_EPS {
                    let ratio = t[(i, n + m)] / t[(i, j)];
                    let better = match leave {
                        None => true,
                        Some((li, lr)) => {
                            ratio < lr - PIVOT_EPS
                                || (ratio < lr + PIVOT_EPS && basis[i] < basis[li])
                        }
                    };
                    if better {
                        leave = Some((i, ratio));
                    }
                }
            }
            let Some((r, _)) = leave else {
                return Err(SolverError::Numeric {
                    what: "unbounded levelling subproblem".to_string(),
                });
            };

            // pivot
            let piv = t[(r, j)];
            for col in 0..n + m + 1 {
                t[(r, col)] /= piv;
            }
            for row in 0..m + 1 {
                if row != r {
                    let f = t[(row, j)];
                    if f != 0.0 {
                        for col in 0..n + m + 1 {
                            t[(row, col)] -= f * t[(r, col)];
                        }
                    }
                }
            }
            basis[r] = j;
            pivots += 1;
            if pivots > 50 * (n + m) {
                return Err(SolverError::Numeric {
                    what: "levelling simplex failed to terminate".to_string(),
                });
            }
        }

        if phase == 0 {
            let infeas: f64 = basis
                .iter()
                .enumerate()
                .filter(|(_, &j)| j >= n)
                .map(|(i, _)| t[(i, n + m)])
                .sum();
            if infeas > 1e-9 {
                return Err(SolverError::InfeasibleBulk {
                    what: format!("no phase combination balances the bulk (residual {infeas:.3e})"),
                });
            }
            // rebuild the objective row from the real cost, priced out over
            // the current basis
            for j in 0..n + m {
                t[(m, j)] = if j < n { cost[j] } else { 0.0 };
            }
            t[(m, n + m)] = 0.0;
            for i in 0..m {
                if basis[i] < n {
                    let c = cost[basis[i]];
                    if c != 0.0 {
                        for col in 0..n + m + 1 {
                            t[(m, col)] -= c * t[(i, col)];
                        }
                    }
                }
            }
        }
    }

    let solution = basis
        .iter()
        .enumerate()
        .filter(|(_, &j)| j < n)
        .map(|(i, &j)| (j, t[(i, n + m)].max(0.0)))
        .collect();
    Ok((solution, pivots))
}

/// Duals of the mass-balance constraints: least-squares solve of
/// B^T Gamma = c_B over the basic columns.
fn duals(a: &DMatrix<f64>, cost: &[f64], basic: &[(usize, f64)]) -> SolverResult<Vec<f64>> {
    let m = a.nrows();
    let k = basic.len();
    let mut bt = DMatrix::<f64>::zeros(k, m);
    let mut cb = DVector::<f64>::zeros(k);
    for (row, (j, _)) in basic.iter().enumerate() {
        for c in 0..m {
            bt[(row, c)] = a[(c, *j)];
        }
        cb[row] = cost[*j];
    }
    let svd = bt.svd(true, true);
    let gamma = svd
        .solve(&cb, 1e-12)
        .map_err(|e| SolverError::Numeric { what: e.to_string() })?;
    Ok(gamma.iter().copied().collect())
}

fn run_simplex(
    candidates: &[Candidate],
    bulk: &BulkComposition,
    n_ox: usize,
) -> SolverResult<(Vec<(usize, f64)>, Vec<f64>, usize)> {
    let nonzero = bulk.nonzero();
    let m = nonzero.len();
    let n = candidates.len();
    if n == 0 {
        return Err(SolverError::InfeasibleBulk {
            what: "no admissible candidate phase for this bulk".to_string(),
        });
    }

    let mut a = DMatrix::<f64>::zeros(m, n);
    for (j, cand) in candidates.iter().enumerate() {
        for (row, &ox) in nonzero.iter().enumerate() {
            a[(row, j)] = cand.comp[ox];
        }
    }
    let b = DVector::from_iterator(m, nonzero.iter().map(|&i| bulk.composition()[i]));
    let cost: Vec<f64> = candidates.iter().map(|c| c.gibbs).collect();

    let (basic, pivots) = solve_lp(&a, &b, &cost)?;
    let gamma_r = duals(&a, &cost, &basic)?;

    let mut gamma_full = vec![0.0; n_ox];
    for (row, &ox) in nonzero.iter().enumerate() {
        gamma_full[ox] = gamma_r[row];
    }
    Ok((basic, gamma_full, pivots))
}

/// Levelling entry point. Populates the solution buffers and seeds as a side
/// effect in full mode.
pub fn level(
    db: &mut PhaseDatabase,
    bulk: &BulkComposition,
    mode: LevellingMode,
    refine_cfg: &RefineConfig,
    tol: &Tolerances,
) -> SolverResult<LevellingOutcome> {
    let n_ox = db.system.len();
    let t_k = bulk.conditions.t_k;

    let mut candidates = discrete_candidates(db, bulk.nonzero());
    let (mut basic, mut gamma, mut pivots) = run_simplex(&candidates, bulk, n_ox)?;
    let mut stages = 1usize;

    if mode == LevellingMode::Full && !db.solutions.is_empty() {
        while stages < MAX_STAGES {
            for s in 0..db.solutions.len() {
                generate_pseudocompounds(&mut db.solutions[s], &gamma, t_k, refine_cfg, tol)?;
                refine_retained(&mut db.solutions[s], &gamma, t_k, refine_cfg, tol)?;
            }

            candidates = discrete_candidates(db, bulk.nonzero());
            candidates.extend(buffered_candidates(db, &gamma, bulk.nonzero()));
            let (next_basic, next_gamma, p) = run_simplex(&candidates, bulk, n_ox)?;
            pivots += p;
            stages += 1;

            let shift = gamma
                .iter()
                .zip(&next_gamma)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0_f64, f64::max);
            basic = next_basic;
            gamma = next_gamma;
            if shift < GAMMA_SETTLE {
                break;
            }
        }
    }

    let mut basis = Vec::with_capacity(basic.len());
    let mut gibbs = 0.0;
    for (j, amount) in &basic {
        let c = &candidates[*j];
        gibbs += amount * c.gibbs;
        if let PhaseKind::Solution(s) = c.kind {
            if !c.x.is_empty() {
                // seed the iterative stage from the levelled coordinates,
                // nudged off any vertex so ln terms stay finite
                let (lo, hi) = (1e-4, 1.0 - 1e-4);
                db.solutions[s].iguess = c.x.iter().map(|v| v.clamp(lo, hi)).collect();
            }
        }
        basis.push(LevelledPhase {
            kind: c.kind,
            amount: *amount,
            x: c.x.clone(),
            p: c.p.clone(),
            mu: c.mu.clone(),
            comp: c.comp.clone(),
            gibbs: c.gibbs,
            factor: c.factor,
        });
    }

    debug!(
        stages,
        pivots,
        basis_len = basis.len(),
        gibbs,
        "levelling finished"
    );
    Ok(LevellingOutcome {
        gamma,
        basis,
        gibbs,
        pivots,
        stages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gm_core::Conditions;
    use gm_gibbs::{ChemicalSystem, LinearEntry, LinearGibbsModel};
    use gm_phases::{DatabaseConfig, SolutionModel};

    fn one_component_db() -> (PhaseDatabase, LinearGibbsModel) {
        let system = ChemicalSystem::new(vec!["A".into()], vec![60.0]).unwrap();
        let model = LinearGibbsModel::new(vec![
            LinearEntry::new("alpha", -100.0, 0.0, 0.0, &[("A", 1.0)]),
            LinearEntry::new("beta", -90.0, 0.0, 0.0, &[("A", 1.0)]),
        ]);
        let db = PhaseDatabase::initialize(
            system,
            &["alpha", "beta"],
            vec![],
            &model,
            DatabaseConfig::default(),
        )
        .unwrap();
        (db, model)
    }

    fn binary_solution_db() -> (PhaseDatabase, LinearGibbsModel) {
        let system = ChemicalSystem::new(vec!["A".into(), "B".into()], vec![60.0, 70.0]).unwrap();
        let model = LinearGibbsModel::new(vec![
            LinearEntry::new("ea", -100.0, 0.0, 0.0, &[("A", 1.0)]),
            LinearEntry::new("eb", -100.0, 0.0, 0.0, &[("B", 1.0)]),
        ]);
        let db = PhaseDatabase::initialize(
            system,
            &[],
            vec![SolutionModel::ideal("bin", &["ea", "eb"])],
            &model,
            DatabaseConfig::default(),
        )
        .unwrap();
        (db, model)
    }

    fn conditions() -> Conditions {
        Conditions::from_kbar_kelvin(10.0, 1000.0)
    }

    #[test]
    fn picks_the_lower_energy_polymorph() {
        let (mut db, model) = one_component_db();
        db.evaluate_endmembers(&model, conditions()).unwrap();
        let bulk = BulkComposition::new(&db.system, &[1.0], conditions()).unwrap();
        let out = level(
            &mut db,
            &bulk,
            LevellingMode::FirstStageOnly,
            &RefineConfig::default(),
            &Tolerances::default(),
        )
        .unwrap();
        assert_eq!(out.basis.len(), 1);
        assert!(matches!(out.basis[0].kind, PhaseKind::Pure(0)));
        assert!((out.basis[0].amount - 1.0).abs() < 1e-9);
        assert!((out.gamma[0] - -100.0).abs() < 1e-9);
    }

    #[test]
    fn basis_size_matches_active_components() {
        let (mut db, model) = binary_solution_db();
        db.evaluate_endmembers(&model, conditions()).unwrap();
        let bulk = BulkComposition::new(&db.system, &[1.0, 1.0], conditions()).unwrap();
        let out = level(
            &mut db,
            &bulk,
            LevellingMode::Full,
            &RefineConfig::default(),
            &Tolerances::default(),
        )
        .unwrap();
        assert_eq!(out.basis.len(), bulk.nonzero().len());
        for ph in &out.basis {
            assert!(ph.amount >= 0.0);
        }
    }

    #[test]
    fn full_mode_undercuts_the_endmember_mechanical_mixture() {
        // the ideal mixing term makes an interior pseudocompound strictly
        // cheaper than the two-endmember mixture
        let (mut db, model) = binary_solution_db();
        db.evaluate_endmembers(&model, conditions()).unwrap();
        let bulk = BulkComposition::new(&db.system, &[1.0, 1.0], conditions()).unwrap();

        let first = level(
            &mut db,
            &bulk,
            LevellingMode::FirstStageOnly,
            &RefineConfig::default(),
            &Tolerances::default(),
        )
        .unwrap();
        db.reset();
        db.evaluate_endmembers(&model, conditions()).unwrap();
        let full = level(
            &mut db,
            &bulk,
            LevellingMode::Full,
            &RefineConfig::default(),
            &Tolerances::default(),
        )
        .unwrap();
        assert!(full.gibbs < first.gibbs - 1e-6);
    }

    #[test]
    fn candidate_with_mass_in_absent_component_is_excluded() {
        let system = ChemicalSystem::new(vec!["A".into(), "B".into()], vec![60.0, 70.0]).unwrap();
        let model = LinearGibbsModel::new(vec![
            LinearEntry::new("pa", -100.0, 0.0, 0.0, &[("A", 1.0)]),
            // cheaper but needs B, which the bulk lacks
            LinearEntry::new("pab", -500.0, 0.0, 0.0, &[("A", 1.0), ("B", 1.0)]),
        ]);
        let mut db = PhaseDatabase::initialize(
            system,
            &["pa", "pab"],
            vec![],
            &model,
            DatabaseConfig::default(),
        )
        .unwrap();
        db.evaluate_endmembers(&model, conditions()).unwrap();
        let bulk = BulkComposition::new(&db.system, &[1.0, 0.0], conditions()).unwrap();
        let out = level(
            &mut db,
            &bulk,
            LevellingMode::FirstStageOnly,
            &RefineConfig::default(),
            &Tolerances::default(),
        )
        .unwrap();
        assert_eq!(out.basis.len(), 1);
        assert!(matches!(out.basis[0].kind, PhaseKind::Pure(0)));
    }

    #[test]
    fn infeasible_bulk_is_reported() {
        let system = ChemicalSystem::new(vec!["A".into(), "B".into()], vec![60.0, 70.0]).unwrap();
        let model = LinearGibbsModel::new(vec![LinearEntry::new(
            "pa",
            -100.0,
            0.0,
            0.0,
            &[("A", 1.0)],
        )]);
        let mut db = PhaseDatabase::initialize(
            system,
            &["pa"],
            vec![],
            &model,
            DatabaseConfig::default(),
        )
        .unwrap();
        db.evaluate_endmembers(&model, conditions()).unwrap();
        // no candidate carries B
        let bulk = BulkComposition::new(&db.system, &[1.0, 1.0], conditions()).unwrap();
        let err = level(
            &mut db,
            &bulk,
            LevellingMode::FirstStageOnly,
            &RefineConfig::default(),
            &Tolerances::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SolverError::InfeasibleBulk { .. }));
    }
}
