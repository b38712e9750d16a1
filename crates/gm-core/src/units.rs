// gm-core/src/units.rs

use uom::si::f64::{Pressure as UomPressure, ThermodynamicTemperature as UomTemperature};

// Public canonical unit types at the API boundary (SI, f64)
pub type Pressure = UomPressure;
pub type Temperature = UomTemperature;

const PA_PER_KBAR: f64 = 1.0e8;

#[inline]
pub fn kbar(v: f64) -> Pressure {
    use uom::si::pressure::pascal;
    Pressure::new::<pascal>(v * PA_PER_KBAR)
}

#[inline]
pub fn degc(v: f64) -> Temperature {
    use uom::si::thermodynamic_temperature::degree_celsius;
    Temperature::new::<degree_celsius>(v)
}

/// Engine-internal P,T conditions.
///
/// The minimization stack works in the database's native units (kbar, K) and
/// perturbs both values inside nested finite-difference loops, so they are
/// carried as plain floats. Construction from uom types keeps unit conversion
/// at the boundary.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Conditions {
    /// Pressure [kbar]
    pub p_kbar: f64,
    /// Temperature [K]
    pub t_k: f64,
}

impl Conditions {
    pub fn new(p: Pressure, t: Temperature) -> Self {
        Self {
            p_kbar: p.value / PA_PER_KBAR,
            t_k: t.value,
        }
    }

    /// Construct directly from database-native values (kbar, K).
    pub fn from_kbar_kelvin(p_kbar: f64, t_k: f64) -> Self {
        Self { p_kbar, t_k }
    }

    /// Shifted copy, used by the finite-difference stencil.
    pub fn perturbed(self, dp_kbar: f64, dt_k: f64) -> Self {
        Self {
            p_kbar: self.p_kbar + dp_kbar,
            t_k: self.t_k + dt_k,
        }
    }
}
