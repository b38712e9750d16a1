//! Pure-phase reference records.

/// Physical properties derived by the finite-difference post-processor.
///
/// Values start as NaN and stay NaN for any property whose stencil denominator
/// degenerates; a NaN here never invalidates the rest of the point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalProperties {
    /// Molar volume [kJ/kbar == 10 cm3/mol]
    pub volume: f64,
    /// Density [kg/m3]
    pub density: f64,
    /// Isobaric heat capacity [kJ/(mol K)]
    pub heat_capacity: f64,
    /// Thermal expansivity [1/K]
    pub expansivity: f64,
    /// Shear modulus [kbar]
    pub shear_modulus: f64,
}

impl Default for PhysicalProperties {
    fn default() -> Self {
        Self {
            volume: f64::NAN,
            density: f64::NAN,
            heat_capacity: f64::NAN,
            expansivity: f64::NAN,
            shear_modulus: f64::NAN,
        }
    }
}

/// Reference record for one pure (fixed-composition) phase.
///
/// Allocated once at startup; `gbase`, `composition` and `factor` are
/// repopulated from the Gibbs model every point, `props` by post-processing.
#[derive(Debug, Clone)]
pub struct PurePhaseRef {
    pub name: String,
    /// Oxide composition over the run's chemical system
    pub composition: Vec<f64>,
    /// Standard-state molar Gibbs energy at the current point [kJ/mol]
    pub gbase: f64,
    /// Normalization scale (mole vs. atom basis)
    pub factor: f64,
    pub props: PhysicalProperties,
}

impl PurePhaseRef {
    pub fn new(name: &str, n_ox: usize) -> Self {
        Self {
            name: name.to_string(),
            composition: vec![0.0; n_ox],
            gbase: 0.0,
            factor: 1.0,
            props: PhysicalProperties::default(),
        }
    }

    /// Per-point reset; keeps the allocation, drops derived values.
    pub fn reset(&mut self) {
        self.props = PhysicalProperties::default();
    }
}
