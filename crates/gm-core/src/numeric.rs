use crate::GmError;

/// Floating point type used throughout the engine
pub type Real = f64;

/// Gas constant in kJ/(mol K); Gibbs energies are carried in kJ/mol.
pub const R_KJ: Real = 0.008_314_462_618;

/// Tolerance set threaded through the minimization stack.
///
/// One instance covers the solver invariants (mass-balance residual, driving
/// force, site-fraction feasibility) so the same numbers are used everywhere a
/// feasibility or convergence decision is made.
#[derive(Clone, Copy, Debug)]
pub struct Tolerances {
    /// Mass-balance residual norm at convergence
    pub mass_balance: Real,
    /// Driving-force violation allowed for non-active candidates
    pub driving_force: Real,
    /// Site-fraction non-negativity slack
    pub site_fraction: Real,
    /// Gradient norm at which a local refinement is converged
    pub refine_grad: Real,
    /// Gibbs-energy window within which refined candidates tie-break
    pub gibbs_tie: Real,
    /// Compositional-coordinate distance under which two instances of one
    /// solution model are merged (solvus collapse)
    pub solvus_merge: Real,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            mass_balance: 1e-9,
            driving_force: 1e-7,
            site_fraction: 1e-8,
            refine_grad: 1e-9,
            gibbs_tie: 1e-8,
            solvus_merge: 1e-3,
        }
    }
}

pub fn nearly_equal(a: Real, b: Real, abs: Real, rel: Real) -> bool {
    let diff = (a - b).abs();
    if diff <= abs {
        return true;
    }
    diff <= rel * a.abs().max(b.abs())
}

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, GmError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(GmError::NonFinite { what, value: v })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearly_equal_basic() {
        assert!(nearly_equal(1.0, 1.0 + 1e-12, 1e-10, 1e-9));
        assert!(nearly_equal(0.0, 1e-13, 1e-12, 1e-9));
        assert!(!nearly_equal(1.0, 1.0 + 1e-6, 1e-12, 1e-9));
    }

    #[test]
    fn ensure_finite_detects_nan() {
        let err = ensure_finite(Real::NAN, "test").unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("Non-finite"));
    }
}
