//! Solid-solution reference records and mixing energetics.
//!
//! A solution model is parameterized by compositional coordinates
//! x in [lb, ub]^(n_em - 1); endmember proportions follow as p_i = x_i for
//! i < n_em-1 and p_last = 1 - sum(x), so proportions close to 1 by
//! construction and the proportion Jacobian dp/dx is constant.

use crate::error::{PhaseError, PhaseResult};
use crate::pseudocompound::PseudocompoundBuffer;
use gm_core::numeric::R_KJ;
use nalgebra::DMatrix;

/// Proportion floor inside logarithms; grid vertices sit exactly on p = 0.
const LN_EPS: f64 = 1e-12;

/// Excess-energy formulation of a solution model.
///
/// A small closed set of variants rather than one generic record with unused
/// interaction arrays: each variant owns exactly the parameters its formula
/// reads.
#[derive(Debug, Clone, PartialEq)]
pub enum MixingModel {
    /// No excess terms; ideal one-site mixing only.
    Ideal,
    /// Symmetric (regular) model: W_ij over the upper triangle i < j,
    /// flattened row-major, len n_em*(n_em-1)/2 [kJ/mol].
    Symmetric { w: Vec<f64> },
    /// Asymmetric van-Laar model: triangle W_ij plus a size parameter per
    /// endmember.
    Asymmetric { w: Vec<f64>, v: Vec<f64> },
}

impl MixingModel {
    /// Index into the flattened upper triangle, i < j.
    fn tri(n_em: usize, i: usize, j: usize) -> usize {
        debug_assert!(i < j && j < n_em);
        i * n_em - i * (i + 1) / 2 + (j - i - 1)
    }

    fn w_at(w: &[f64], n_em: usize, i: usize, j: usize) -> f64 {
        if i == j {
            0.0
        } else if i < j {
            w[Self::tri(n_em, i, j)]
        } else {
            w[Self::tri(n_em, j, i)]
        }
    }

    /// Excess Gibbs energy at proportions `p` [kJ/mol].
    pub fn excess_energy(&self, p: &[f64]) -> f64 {
        let n = p.len();
        match self {
            Self::Ideal => 0.0,
            Self::Symmetric { w } => {
                let mut g = 0.0;
                for i in 0..n {
                    for j in (i + 1)..n {
                        g += Self::w_at(w, n, i, j) * p[i] * p[j];
                    }
                }
                g
            }
            Self::Asymmetric { w, v } => {
                let vbar: f64 = p.iter().zip(v).map(|(pi, vi)| pi * vi).sum();
                if vbar <= 0.0 {
                    return 0.0;
                }
                let mut g = 0.0;
                for i in 0..n {
                    for j in (i + 1)..n {
                        let a = 2.0 * Self::w_at(w, n, i, j) / (v[i] + v[j]);
                        g += a * p[i] * v[i] * p[j] * v[j] / vbar;
                    }
                }
                g
            }
        }
    }

    /// Raw partial derivatives dG_ex/dp_k at fixed other proportions.
    pub fn excess_partials(&self, p: &[f64], out: &mut [f64]) {
        let n = p.len();
        match self {
            Self::Ideal => out.iter_mut().for_each(|o| *o = 0.0),
            Self::Symmetric { w } => {
                for k in 0..n {
                    out[k] = (0..n)
                        .filter(|&j| j != k)
                        .map(|j| Self::w_at(w, n, k, j) * p[j])
                        .sum();
                }
            }
            Self::Asymmetric { w, v } => {
                let vbar: f64 = p.iter().zip(v).map(|(pi, vi)| pi * vi).sum();
                if vbar <= 0.0 {
                    out.iter_mut().for_each(|o| *o = 0.0);
                    return;
                }
                let gex = self.excess_energy(p);
                for k in 0..n {
                    let cross: f64 = (0..n)
                        .filter(|&j| j != k)
                        .map(|j| {
                            2.0 * Self::w_at(w, n, k, j) / (v[k] + v[j]) * p[j] * v[j]
                        })
                        .sum();
                    out[k] = v[k] / vbar * (cross - gex);
                }
            }
        }
    }

    /// Interaction-parameter count expected for `n_em` endmembers.
    pub fn expected_w_len(n_em: usize) -> usize {
        n_em * (n_em - 1) / 2
    }
}

/// Linear site-fraction constraints: sf = coeff * p + offset, feasible when
/// every entry is >= -tol.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteFractions {
    /// n_sf x n_em
    pub coeff: DMatrix<f64>,
    pub offset: Vec<f64>,
}

impl SiteFractions {
    pub fn n_sf(&self) -> usize {
        self.coeff.nrows()
    }

    pub fn evaluate(&self, p: &[f64], out: &mut [f64]) {
        for (r, o) in out.iter_mut().enumerate() {
            let mut acc = self.offset[r];
            for (c, pc) in p.iter().enumerate() {
                acc += self.coeff[(r, c)] * pc;
            }
            *o = acc;
        }
    }

    /// Largest constraint violation (0 when feasible).
    pub fn violation(&self, sf: &[f64]) -> f64 {
        sf.iter().fold(0.0_f64, |acc, v| acc.max(-v))
    }
}

/// Static definition of one solution model.
#[derive(Debug, Clone)]
pub struct SolutionModel {
    pub name: String,
    pub endmembers: Vec<String>,
    pub mixing: MixingModel,
    /// Box bounds per compositional coordinate
    pub bounds: Vec<(f64, f64)>,
    /// None means the only site constraints are p >= 0
    pub sites: Option<SiteFractions>,
}

impl SolutionModel {
    /// Ideal model over the full simplex with default p >= 0 constraints.
    pub fn ideal(name: &str, endmembers: &[&str]) -> Self {
        let n_xeos = endmembers.len() - 1;
        Self {
            name: name.to_string(),
            endmembers: endmembers.iter().map(|s| s.to_string()).collect(),
            mixing: MixingModel::Ideal,
            bounds: vec![(0.0, 1.0); n_xeos],
            sites: None,
        }
    }

    pub fn with_mixing(mut self, mixing: MixingModel) -> Self {
        self.mixing = mixing;
        self
    }

    pub fn with_sites(mut self, sites: SiteFractions) -> Self {
        self.sites = Some(sites);
        self
    }

    pub fn n_em(&self) -> usize {
        self.endmembers.len()
    }

    pub fn n_xeos(&self) -> usize {
        self.endmembers.len() - 1
    }

    pub fn n_sf(&self) -> usize {
        self.sites.as_ref().map_or(self.n_em(), SiteFractions::n_sf)
    }

    /// Endmember proportions from compositional coordinates.
    pub fn proportions(&self, x: &[f64], p: &mut [f64]) {
        let n_x = self.n_xeos();
        let mut sum = 0.0;
        for i in 0..n_x {
            p[i] = x[i];
            sum += x[i];
        }
        p[n_x] = 1.0 - sum;
    }

    /// Constant dp/dx Jacobian: identity stacked over a -1 row (n_em x n_xeos).
    pub fn dpdx(&self) -> DMatrix<f64> {
        let (n_em, n_x) = (self.n_em(), self.n_xeos());
        let mut m = DMatrix::zeros(n_em, n_x);
        for j in 0..n_x {
            m[(j, j)] = 1.0;
            m[(n_em - 1, j)] = -1.0;
        }
        m
    }

    /// Validate parameter shapes at database build time.
    pub fn validate(&self) -> PhaseResult<()> {
        let n_em = self.n_em();
        if n_em < 2 {
            return Err(PhaseError::Config {
                what: format!("solution '{}' needs at least two endmembers", self.name),
            });
        }
        if self.bounds.len() != self.n_xeos() {
            return Err(PhaseError::Dimension {
                what: "bounds length must equal n_em - 1",
            });
        }
        let w_len = MixingModel::expected_w_len(n_em);
        match &self.mixing {
            MixingModel::Ideal => {}
            MixingModel::Symmetric { w } => {
                if w.len() != w_len {
                    return Err(PhaseError::Dimension {
                        what: "symmetric interaction triangle has the wrong length",
                    });
                }
            }
            MixingModel::Asymmetric { w, v } => {
                if w.len() != w_len || v.len() != n_em {
                    return Err(PhaseError::Dimension {
                        what: "van-Laar parameters have the wrong length",
                    });
                }
                if v.iter().any(|vi| *vi <= 0.0) {
                    return Err(PhaseError::Config {
                        what: format!("solution '{}' has a non-positive size parameter", self.name),
                    });
                }
            }
        }
        if let Some(sites) = &self.sites {
            if sites.coeff.ncols() != n_em || sites.offset.len() != sites.coeff.nrows() {
                return Err(PhaseError::Dimension {
                    what: "site-fraction matrix shape does not match endmember count",
                });
            }
        }
        Ok(())
    }
}

/// Full evaluation of a solution at one composition.
#[derive(Debug, Clone)]
pub struct SolutionEval {
    pub x: Vec<f64>,
    pub p: Vec<f64>,
    pub sf: Vec<f64>,
    /// Endmember chemical potentials (tangent rule, includes excess) [kJ/mol]
    pub mu: Vec<f64>,
    /// Raw partials dG/dp_i, for gradient assembly [kJ/mol]
    pub dgdp: Vec<f64>,
    /// Total molar Gibbs energy of the mixture [kJ/mol]
    pub gibbs: f64,
    /// Oxide composition of the mixture
    pub comp: Vec<f64>,
    /// Mixture normalization scale
    pub factor: f64,
}

/// Runtime record for one solution model.
///
/// `gbase`, `em_comp` and `em_factor` are repopulated every point from the
/// Gibbs model; `iguess` persists across PGE iterations to seed local
/// refinement; the buffer is overwritten every generation round.
#[derive(Debug, Clone)]
pub struct SolidSolutionRef {
    pub model: SolutionModel,
    /// Standard-state energy per endmember at the current point [kJ/mol]
    pub gbase: Vec<f64>,
    /// n_em x n_ox endmember composition matrix
    pub em_comp: DMatrix<f64>,
    pub em_factor: Vec<f64>,
    pub buffer: PseudocompoundBuffer,
    /// Seed coordinates for the next local refinement
    pub iguess: Vec<f64>,
}

impl SolidSolutionRef {
    pub fn new(model: SolutionModel, n_ox: usize, buffer_capacity: usize) -> Self {
        let n_em = model.n_em();
        let n_x = model.n_xeos();
        let iguess = model
            .bounds
            .iter()
            .map(|(lo, hi)| 0.5 * (lo + hi))
            .collect();
        debug_assert_eq!(n_x, model.bounds.len());
        Self {
            model,
            gbase: vec![0.0; n_em],
            em_comp: DMatrix::zeros(n_em, n_ox),
            em_factor: vec![1.0; n_em],
            buffer: PseudocompoundBuffer::new(buffer_capacity),
            iguess,
        }
    }

    pub fn name(&self) -> &str {
        &self.model.name
    }

    /// Per-point reset; allocations and the model definition survive.
    pub fn reset(&mut self) {
        self.buffer.clear();
        for (g, (lo, hi)) in self.iguess.iter_mut().zip(&self.model.bounds) {
            *g = 0.5 * (lo + hi);
        }
    }

    /// Oxide composition of a proportion vector: em_comp^T * p.
    pub fn mixture_composition(&self, p: &[f64], out: &mut [f64]) {
        for (c, o) in out.iter_mut().enumerate() {
            *o = (0..p.len()).map(|i| self.em_comp[(i, c)] * p[i]).sum();
        }
    }

    /// Evaluate Gibbs energy, chemical potentials and site fractions at `x`,
    /// rejecting compositions outside the feasible region.
    pub fn evaluate(&self, t_k: f64, x: &[f64], sf_tol: f64) -> PhaseResult<SolutionEval> {
        let eval = self.evaluate_unchecked(t_k, x)?;
        let viol = match &self.model.sites {
            Some(sites) => sites.violation(&eval.sf),
            None => eval.p.iter().fold(0.0_f64, |acc, v| acc.max(-v)),
        };
        if viol > sf_tol {
            return Err(PhaseError::Infeasible {
                what: "site-fraction constraint violated",
            });
        }
        Ok(eval)
    }

    /// Evaluate without the feasibility gate (used by the refiner's line
    /// search, which filters feasibility separately).
    pub fn evaluate_unchecked(&self, t_k: f64, x: &[f64]) -> PhaseResult<SolutionEval> {
        let n_em = self.model.n_em();
        if x.len() != self.model.n_xeos() {
            return Err(PhaseError::Dimension {
                what: "compositional coordinate vector has the wrong length",
            });
        }

        let mut p = vec![0.0; n_em];
        self.model.proportions(x, &mut p);

        let rt = R_KJ * t_k;
        let g_ex = self.model.mixing.excess_energy(&p);
        let mut ex_partials = vec![0.0; n_em];
        self.model.mixing.excess_partials(&p, &mut ex_partials);

        // G = sum p (g0 + RT ln p) + G_ex, with the log floored near vertices
        let mut gibbs = g_ex;
        let mut dgdp = vec![0.0; n_em];
        for i in 0..n_em {
            let pi = p[i].max(LN_EPS);
            gibbs += p[i] * (self.gbase[i] + rt * pi.ln());
            dgdp[i] = self.gbase[i] + rt * (pi.ln() + 1.0) + ex_partials[i];
        }

        // Tangent rule: mu_i = G + dG/dp_i - sum_k p_k dG/dp_k
        let pdg: f64 = p.iter().zip(&dgdp).map(|(pi, di)| pi * di).sum();
        let mu: Vec<f64> = dgdp.iter().map(|di| gibbs + di - pdg).collect();

        let mut sf = vec![0.0; self.model.n_sf()];
        match &self.model.sites {
            Some(sites) => sites.evaluate(&p, &mut sf),
            None => sf.copy_from_slice(&p),
        }

        let mut comp = vec![0.0; self.em_comp.ncols()];
        self.mixture_composition(&p, &mut comp);
        let factor: f64 = p.iter().zip(&self.em_factor).map(|(pi, fi)| pi * fi).sum();

        Ok(SolutionEval {
            x: x.to_vec(),
            p,
            sf,
            mu,
            dgdp,
            gibbs,
            comp,
            factor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary_ref(mixing: MixingModel) -> SolidSolutionRef {
        let model = SolutionModel::ideal("ss", &["em0", "em1"]).with_mixing(mixing);
        let mut ss = SolidSolutionRef::new(model, 2, 8);
        ss.gbase = vec![-100.0, -100.0];
        ss.em_comp[(0, 0)] = 1.0;
        ss.em_comp[(1, 1)] = 1.0;
        ss
    }

    #[test]
    fn proportions_close_to_one() {
        let model = SolutionModel::ideal("s", &["a", "b", "c"]);
        let mut p = vec![0.0; 3];
        model.proportions(&[0.2, 0.3], &mut p);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-14);
        assert!((p[2] - 0.5).abs() < 1e-14);
    }

    #[test]
    fn ideal_binary_minimum_sits_at_the_midpoint() {
        let ss = binary_ref(MixingModel::Ideal);
        let mid = ss.evaluate(1000.0, &[0.5], 1e-8).unwrap();
        let off = ss.evaluate(1000.0, &[0.3], 1e-8).unwrap();
        assert!(mid.gibbs < off.gibbs);
        // equal gbase, equal proportions: both potentials equal G
        assert!((mid.mu[0] - mid.mu[1]).abs() < 1e-10);
        assert!((mid.mu[0] - mid.gibbs).abs() < 1e-10);
    }

    #[test]
    fn ideal_mu_matches_closed_form() {
        let ss = binary_ref(MixingModel::Ideal);
        let e = ss.evaluate(1000.0, &[0.25], 1e-8).unwrap();
        let rt = R_KJ * 1000.0;
        assert!((e.mu[0] - (-100.0 + rt * 0.25_f64.ln())).abs() < 1e-9);
        assert!((e.mu[1] - (-100.0 + rt * 0.75_f64.ln())).abs() < 1e-9);
    }

    #[test]
    fn symmetric_excess_energy_and_partials_agree() {
        let mix = MixingModel::Symmetric { w: vec![10.0] };
        let p = [0.4, 0.6];
        assert!((mix.excess_energy(&p) - 10.0 * 0.4 * 0.6).abs() < 1e-12);

        // central difference on the raw partial
        let mut partials = [0.0; 2];
        mix.excess_partials(&p, &mut partials);
        let h = 1e-6;
        let num =
            (mix.excess_energy(&[0.4 + h, 0.6]) - mix.excess_energy(&[0.4 - h, 0.6])) / (2.0 * h);
        assert!((partials[0] - num).abs() < 1e-6);
    }

    #[test]
    fn van_laar_partials_agree_with_numeric() {
        let mix = MixingModel::Asymmetric {
            w: vec![12.0, 8.0, 4.0],
            v: vec![1.0, 1.5, 0.8],
        };
        let p = [0.2, 0.5, 0.3];
        let mut partials = [0.0; 3];
        mix.excess_partials(&p, &mut partials);
        let h = 1e-6;
        for k in 0..3 {
            let mut hi = p;
            let mut lo = p;
            hi[k] += h;
            lo[k] -= h;
            let num = (mix.excess_energy(&hi) - mix.excess_energy(&lo)) / (2.0 * h);
            assert!(
                (partials[k] - num).abs() < 1e-5,
                "partial {k}: {} vs {num}",
                partials[k]
            );
        }
    }

    #[test]
    fn infeasible_coordinates_are_rejected() {
        let ss = binary_ref(MixingModel::Ideal);
        // x = 1.2 drives p_last negative
        let err = ss.evaluate(1000.0, &[1.2], 1e-8).unwrap_err();
        assert!(matches!(err, PhaseError::Infeasible { .. }));
    }

    #[test]
    fn model_validation_catches_bad_triangle() {
        let model = SolutionModel::ideal("bad", &["a", "b", "c"])
            .with_mixing(MixingModel::Symmetric { w: vec![1.0] });
        assert!(model.validate().is_err());
    }
}
