//! Multi-point input file and the built-in test bulks.
//!
//! The input file is YAML, one record per P-T point. Pressure is in kbar and
//! temperature in degrees Celsius (the file convention of the field); records
//! may override the run's bulk and Gamma, and carry fixed-composition phases
//! for mode 1.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// One solved condition read from the input file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointRecord {
    pub pressure_kbar: f64,
    pub temperature_c: f64,
    /// Initial Gamma for this point, full oxide dimension
    #[serde(default)]
    pub gamma: Option<Vec<f64>>,
    /// Raw bulk override, full oxide dimension, any positive scale
    #[serde(default)]
    pub bulk: Option<Vec<f64>>,
    /// Mode-1 fixed solution compositions
    #[serde(default)]
    pub fixed: Vec<FixedRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FixedRecord {
    pub solution: String,
    pub x: Vec<f64>,
}

/// Parse the YAML point list.
pub fn parse_points(text: &str) -> AppResult<Vec<PointRecord>> {
    let records: Vec<PointRecord> = serde_yaml::from_str(text)?;
    if records.is_empty() {
        return Err(AppError::Config {
            what: "input file holds no points".to_string(),
        });
    }
    Ok(records)
}

pub fn read_points(path: &Path) -> AppResult<Vec<PointRecord>> {
    parse_points(&fs::read_to_string(path)?)
}

/// Built-in raw bulk compositions over KNCFMASHTOCr, selected by `--test`.
///
/// 0: lherzolite (KLB-1 style), 1: basalt (RE-46 style). Values are molar
/// oxide amounts, normalized downstream.
pub fn builtin_bulk(test: usize) -> AppResult<Vec<f64>> {
    match test {
        0 => Ok(vec![
            38.494, 1.776, 2.824, 50.566, 5.886, 0.01, 0.25, 0.10, 0.096, 0.109, 0.0,
        ]),
        1 => Ok(vec![
            50.72, 9.16, 15.21, 16.25, 7.06, 0.01, 1.47, 0.39, 0.35, 0.01, 0.0,
        ]),
        other => Err(AppError::Config {
            what: format!("unknown built-in bulk {other} (have 0 and 1)"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_record() {
        let yaml = "- pressure_kbar: 12.0\n  temperature_c: 1100.0\n";
        let points = parse_points(yaml).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].pressure_kbar, 12.0);
        assert!(points[0].gamma.is_none());
        assert!(points[0].fixed.is_empty());
    }

    #[test]
    fn parses_gamma_bulk_and_fixed_phases() {
        let yaml = r#"
- pressure_kbar: 10.0
  temperature_c: 900.0
  gamma: [-1000.0, -900.0]
  bulk: [2.0, 1.0]
  fixed:
    - solution: ol
      x: [0.4]
"#;
        let points = parse_points(yaml).unwrap();
        assert_eq!(points[0].gamma.as_deref(), Some(&[-1000.0, -900.0][..]));
        assert_eq!(points[0].fixed[0].solution, "ol");
    }

    #[test]
    fn empty_input_is_a_config_error() {
        assert!(matches!(
            parse_points("[]"),
            Err(AppError::Config { .. })
        ));
    }

    #[test]
    fn builtin_bulks_cover_the_full_system() {
        let b = builtin_bulk(0).unwrap();
        assert_eq!(b.len(), 11);
        assert!(builtin_bulk(7).is_err());
    }
}
