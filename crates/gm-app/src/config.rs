//! Run configuration: the engine knobs one invocation carries.

use gm_solver::{PgeConfig, PointConfig, RefineConfig, SolveMode, StencilConfig};

/// Options governing a whole run (every point shares them; per-point data
/// lives in the input records).
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: SolveMode,
    /// Worker count; 0 means one per available core
    pub n_workers: usize,
    /// Pseudocompound grid budget per solution
    pub n_pc: usize,
    /// Local-refinement evaluation budget; 0 = unlimited
    pub max_evals: usize,
    /// Outer-iteration cap; 0 = unlimited
    pub max_iterations: usize,
    pub compute_properties: bool,
    /// Dual-potential starting guess shared by all points lacking their own
    pub initial_gamma: Option<Vec<f64>>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: SolveMode::Full,
            n_workers: 0,
            n_pc: 512,
            max_evals: 2000,
            max_iterations: 128,
            compute_properties: true,
            initial_gamma: None,
        }
    }
}

impl RunConfig {
    /// Per-point solver configuration with this run's budgets applied.
    pub fn point_config(&self) -> PointConfig {
        let refine = RefineConfig {
            max_evals: self.max_evals,
            grid_budget: self.n_pc,
            ..RefineConfig::default()
        };
        // refinements nested inside the iteration and the stencil always stay
        // bounded, whatever the outer budget says
        let inner_evals = if self.max_evals == 0 {
            200
        } else {
            self.max_evals.min(200)
        };
        PointConfig {
            mode: self.mode,
            refine: refine.clone(),
            pge: PgeConfig {
                max_iterations: self.max_iterations,
                refine: RefineConfig {
                    max_evals: inner_evals,
                    ..refine.clone()
                },
                ..PgeConfig::default()
            },
            stencil: StencilConfig {
                refine: RefineConfig {
                    max_evals: inner_evals,
                    ..refine
                },
                ..StencilConfig::default()
            },
            initial_gamma: self.initial_gamma.clone(),
            compute_properties: self.compute_properties,
            ..PointConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budgets_flow_into_the_point_config() {
        let cfg = RunConfig {
            n_pc: 64,
            max_evals: 500,
            max_iterations: 7,
            ..RunConfig::default()
        };
        let pc = cfg.point_config();
        assert_eq!(pc.refine.grid_budget, 64);
        assert_eq!(pc.refine.max_evals, 500);
        assert_eq!(pc.pge.max_iterations, 7);
        // inner refinement budgets stay bounded
        assert_eq!(pc.pge.refine.max_evals, 200);
    }
}
