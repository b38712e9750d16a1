//! Per-point and per-run report types.
//!
//! Reports serialize to JSON; NaN-flagged values (degenerate stencil
//! denominators, mode-1 amounts) become nulls rather than poisoning the
//! document. `summary()` renders the screen text printed after each point.

use chrono::Utc;
use gm_solver::{ConvergenceQuality, PointSolution, StablePhase};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseReport {
    pub name: String,
    /// Molar amount; absent in mode 1
    pub amount: Option<f64>,
    pub x: Vec<f64>,
    pub proportions: Vec<f64>,
    pub mu: Vec<f64>,
    pub gibbs: f64,
    pub volume: Option<f64>,
    pub density: Option<f64>,
    pub heat_capacity: Option<f64>,
    pub expansivity: Option<f64>,
    pub shear_modulus: Option<f64>,
}

impl PhaseReport {
    fn from_phase(ph: &StablePhase) -> Self {
        Self {
            name: ph.name.clone(),
            amount: finite(ph.amount),
            x: ph.x.clone(),
            proportions: ph.p.clone(),
            mu: ph.mu.clone(),
            gibbs: ph.gibbs,
            volume: finite(ph.props.volume),
            density: finite(ph.props.density),
            heat_capacity: finite(ph.props.heat_capacity),
            expansivity: finite(ph.props.expansivity),
            shear_modulus: finite(ph.props.shear_modulus),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemReport {
    pub volume: Option<f64>,
    pub density: Option<f64>,
    pub heat_capacity: Option<f64>,
    pub expansivity: Option<f64>,
    pub shear_modulus: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointReport {
    pub index: usize,
    pub pressure_kbar: f64,
    pub temperature_c: f64,
    pub stable_phases: Vec<PhaseReport>,
    pub gamma: Vec<f64>,
    pub gibbs_system: f64,
    pub iterations: usize,
    pub residual: Option<f64>,
    /// "converged", "acceptable" or "failed"
    pub quality: String,
    /// Hard per-point failure (infeasible bulk, pool exhaustion); the point
    /// is still part of the run
    pub error: Option<String>,
    pub system: Option<SystemReport>,
    pub elapsed_ms: f64,
}

fn quality_str(q: ConvergenceQuality) -> &'static str {
    match q {
        ConvergenceQuality::Converged => "converged",
        ConvergenceQuality::Acceptable => "acceptable",
        ConvergenceQuality::Failed => "failed",
    }
}

impl PointReport {
    pub fn from_solution(index: usize, sol: &PointSolution) -> Self {
        Self {
            index,
            pressure_kbar: sol.conditions.p_kbar,
            temperature_c: sol.conditions.t_k - 273.15,
            stable_phases: sol.stable_phases.iter().map(PhaseReport::from_phase).collect(),
            gamma: sol.gamma.clone(),
            gibbs_system: sol.total_gibbs,
            iterations: sol.iterations,
            residual: finite(sol.residual),
            quality: quality_str(sol.quality).to_string(),
            error: None,
            system: sol.system.map(|s| SystemReport {
                volume: finite(s.volume),
                density: finite(s.density),
                heat_capacity: finite(s.heat_capacity),
                expansivity: finite(s.expansivity),
                shear_modulus: finite(s.shear_modulus),
            }),
            elapsed_ms: sol.elapsed_ms,
        }
    }

    /// Placeholder report for a point whose solve failed outright.
    pub fn from_error(index: usize, p_kbar: f64, t_c: f64, err: &dyn std::error::Error) -> Self {
        Self {
            index,
            pressure_kbar: p_kbar,
            temperature_c: t_c,
            stable_phases: Vec::new(),
            gamma: Vec::new(),
            gibbs_system: f64::NAN,
            iterations: 0,
            residual: None,
            quality: "failed".to_string(),
            error: Some(err.to_string()),
            system: None,
            elapsed_ms: 0.0,
        }
    }

    /// Screen summary in the classic one-point layout.
    pub fn summary(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(
            s,
            "point {:>4}  P = {:7.3} kbar  T = {:8.2} C  [{}]",
            self.index, self.pressure_kbar, self.temperature_c, self.quality
        );
        if let Some(err) = &self.error {
            let _ = writeln!(s, "  error: {err}");
            return s;
        }
        for ph in &self.stable_phases {
            match ph.amount {
                Some(n) => {
                    let _ = writeln!(s, "  {:<10} n = {:10.6}", ph.name, n);
                }
                None => {
                    let _ = writeln!(s, "  {:<10} (fixed composition)", ph.name);
                }
            }
        }
        let gamma = self
            .gamma
            .iter()
            .map(|g| format!("{g:9.3}"))
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(s, "  Gamma: [{gamma}]");
        let _ = writeln!(
            s,
            "  G = {:.6} kJ   iterations = {}   residual = {}   {:.1} ms",
            self.gibbs_system,
            self.iterations,
            self.residual
                .map(|r| format!("{r:.3e}"))
                .unwrap_or_else(|| "-".to_string()),
            self.elapsed_ms
        );
        if let Some(sys) = &self.system {
            if let (Some(rho), Some(cp)) = (sys.density, sys.heat_capacity) {
                let _ = writeln!(s, "  rho = {rho:.1} kg/m3   Cp = {cp:.5} kJ/K");
            }
        }
        s
    }
}

/// Whole-run document written by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub generated_at: String,
    pub n_points: usize,
    pub points: Vec<PointReport>,
}

impl RunReport {
    pub fn new(points: Vec<PointReport>) -> Self {
        Self {
            generated_at: Utc::now().to_rfc3339(),
            n_points: points.len(),
            points,
        }
    }
}
