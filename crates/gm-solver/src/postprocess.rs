//! Finite-difference post-processing of the converged assemblage.
//!
//! Physical properties come from a seven-point stencil of endmember chemical
//! potentials over (P, T). Solid solutions are re-refined at every stencil
//! point from the converged coordinates, since the optimal composition drifts
//! with P,T; their properties are the proportion-weighted endmember
//! contributions. A degenerate stencil denominator flags only the affected
//! property as NaN; the rest of the point survives. The active-phase set is
//! never altered here.

use crate::assemblage::{Assemblage, PhaseKind};
use crate::error::SolverResult;
use crate::refine::{refine, RefineConfig};
use gm_core::numeric::Tolerances;
use gm_gibbs::{BulkComposition, GibbsModel};
use gm_phases::{PhaseDatabase, PhysicalProperties};
use tracing::debug;

/// Stencil offsets as multiples of (dp, dt). Order matters: the derivative
/// formulas below index into it.
const STENCIL: [(f64, f64); 7] = [
    (0.0, 1.0),
    (0.0, -1.0),
    (1.0, 1.0),
    (1.0, -1.0),
    (2.0, 0.0),
    (1.0, 0.0),
    (0.0, 0.0),
];

const DEGENERATE: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct StencilConfig {
    /// Pressure step [kbar]
    pub dp_kbar: f64,
    /// Temperature step [K]
    pub dt_k: f64,
    pub refine: RefineConfig,
}

impl Default for StencilConfig {
    fn default() -> Self {
        Self {
            dp_kbar: 2e-3,
            dt_k: 0.2,
            refine: RefineConfig {
                max_evals: 200,
                ..RefineConfig::default()
            },
        }
    }
}

/// Bulk-system aggregates over the active assemblage.
#[derive(Debug, Clone, Copy)]
pub struct SystemProperties {
    /// Total volume [kJ/kbar == 10 cm3]
    pub volume: f64,
    /// Density [kg/m3]
    pub density: f64,
    /// Heat capacity [kJ/K] over the whole assemblage
    pub heat_capacity: f64,
    /// Volume-weighted expansivity [1/K]
    pub expansivity: f64,
    /// Volume-weighted shear modulus [kbar]
    pub shear_modulus: f64,
}

/// Properties of one phase from its endmember chemical-potential stencil.
///
/// `mu` has one row per stencil point; `w` weights the endmember columns
/// (phase proportions for a solution, [1.0] for a pure phase). Per endmember:
/// V from the forward pressure difference, cp from the temperature curvature,
/// expansivity from the mixed difference over the volume, and the shear
/// modulus from -dGdP / (d2G/dP2 - (d2G/dPdT)^2 / (d2G/dT2)).
fn phase_props(mu: &[Vec<f64>], w: &[f64], dp: f64, dt: f64, t_k: f64, mass: f64) -> PhysicalProperties {
    let has_dp = dp.abs() > DEGENERATE;
    let has_dt = dt.abs() > DEGENERATE;

    let mut volume = if has_dp { 0.0 } else { f64::NAN };
    let mut cp = if has_dt { 0.0 } else { f64::NAN };
    let mut alpha = if has_dp && has_dt { 0.0 } else { f64::NAN };
    let mut shear = if has_dp && has_dt { 0.0 } else { f64::NAN };

    for (j, &wj) in w.iter().enumerate() {
        let m = |k: usize| mu[k][j];
        let dgdp = if has_dp { (m(5) - m(6)) / dp } else { f64::NAN };
        if has_dp {
            volume += dgdp * wj;
        }
        if has_dt {
            let d2t = (m(0) - 2.0 * m(6) + m(1)) / (dt * dt);
            cp += -t_k * d2t * wj;
            if has_dp {
                // d2G/dPdT from the off-axis points against the T-axis pair
                let dvdt = ((m(2) - m(3)) / (2.0 * dt) - (m(0) - m(1)) / (2.0 * dt)) / dp;
                alpha += if dgdp.abs() > DEGENERATE {
                    dvdt / dgdp * wj
                } else {
                    f64::NAN
                };
                let d2p = (m(4) - 2.0 * m(5) + m(6)) / (dp * dp);
                let denom = if d2t.abs() > DEGENERATE {
                    d2p - dvdt * dvdt / d2t
                } else {
                    f64::NAN
                };
                shear += if denom.is_finite() && denom.abs() > DEGENERATE {
                    -dgdp / denom * wj
                } else {
                    f64::NAN
                };
            }
        }
    }

    let density = if volume.is_finite() && volume.abs() > DEGENERATE {
        // density in kg/m3: mass g/mol over volume kJ/kbar (= 10 cm3)
        mass * 1000.0 / (volume * 10.0)
    } else {
        f64::NAN
    };
    PhysicalProperties {
        volume,
        density,
        heat_capacity: cp,
        expansivity: alpha,
        shear_modulus: shear,
    }
}

/// Evaluate the stencil and attach physical properties to every active phase
/// instance, then aggregate the system values.
///
/// The database's endmember energies are restored to the base conditions on
/// the way out.
pub fn postprocess(
    db: &mut PhaseDatabase,
    model: &dyn GibbsModel,
    asm: &mut Assemblage,
    bulk: &BulkComposition,
    gamma: &[f64],
    cfg: &StencilConfig,
    tol: &Tolerances,
) -> SolverResult<SystemProperties> {
    let base = bulk.conditions;
    let active = asm.active_indices();

    for idx in active.iter() {
        asm.get_mut(*idx).mu_stencil.clear();
    }

    // endmember chemical potentials per active phase per stencil point
    for (mp, mt) in STENCIL.iter() {
        let cond = base.perturbed(mp * cfg.dp_kbar, mt * cfg.dt_k);
        db.evaluate_endmembers(model, cond)?;
        for &idx in active.iter() {
            let inst = asm.get(idx);
            let mu = match inst.kind {
                PhaseKind::Pure(i) => vec![db.pure_phases[i].gbase],
                PhaseKind::Solution(s) => {
                    let r = refine(&db.solutions[s], &inst.x, gamma, cond.t_k, &cfg.refine, tol)?;
                    r.eval.mu
                }
            };
            asm.get_mut(idx).mu_stencil.push(mu);
        }
    }
    db.evaluate_endmembers(model, base)?;

    // per-phase properties
    for &idx in &active {
        let inst = asm.get(idx);
        let w = match inst.kind {
            PhaseKind::Pure(_) => vec![1.0],
            PhaseKind::Solution(_) => inst.p.clone(),
        };
        let mass = db.system.molar_mass_of(&inst.comp);
        let props = phase_props(&inst.mu_stencil, &w, cfg.dp_kbar, cfg.dt_k, base.t_k, mass);
        asm.get_mut(idx).props = props;
    }

    // system aggregates: extensive sums, volume-weighted intensive values
    let mut volume = 0.0;
    let mut mass = 0.0;
    let mut heat_capacity = 0.0;
    let mut alpha_v = 0.0;
    let mut shear_v = 0.0;
    for &idx in &active {
        let inst = asm.get(idx);
        let pv = inst.amount * inst.props.volume;
        volume += pv;
        mass += inst.amount * db.system.molar_mass_of(&inst.comp);
        heat_capacity += inst.amount * inst.props.heat_capacity;
        alpha_v += pv * inst.props.expansivity;
        shear_v += pv * inst.props.shear_modulus;
    }
    let (density, expansivity, shear_modulus) = if volume.abs() > DEGENERATE {
        (mass * 1000.0 / (volume * 10.0), alpha_v / volume, shear_v / volume)
    } else {
        (f64::NAN, f64::NAN, f64::NAN)
    };

    debug!(volume, density, heat_capacity, "post-processing finished");
    Ok(SystemProperties {
        volume,
        density,
        heat_capacity,
        expansivity,
        shear_modulus,
    })
}
