//! Multi-point run execution.
//!
//! Points are independent, so the run is split round-robin across workers:
//! worker w solves the records whose index is congruent to w modulo the
//! worker count, against its own private database clone. Workers join at the
//! end and a single writer merges the partial outputs back into input order.
//! A point that errors hard still produces a (failed) report; the run always
//! completes.

use gm_core::{degc, kbar, Conditions};
use gm_gibbs::{BulkComposition, GibbsModel};
use gm_phases::PhaseDatabase;
use gm_solver::{solve_point, FixedPhase, PointConfig, SolveMode};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::error::{AppError, AppResult};
use crate::input::PointRecord;
use crate::report::{PointReport, RunReport};

fn point_config_for(record: &PointRecord, base: &PointConfig) -> PointConfig {
    let mut cfg = base.clone();
    if record.gamma.is_some() {
        cfg.initial_gamma = record.gamma.clone();
    }
    cfg.fixed = record
        .fixed
        .iter()
        .map(|f| FixedPhase {
            solution: f.solution.clone(),
            x: f.x.clone(),
        })
        .collect();
    cfg
}

fn solve_record(
    db: &mut PhaseDatabase,
    model: &dyn GibbsModel,
    record: &PointRecord,
    default_bulk: &[f64],
    base: &PointConfig,
    index: usize,
) -> PointReport {
    // unit conversion happens here, at the input boundary
    let conditions = Conditions::new(kbar(record.pressure_kbar), degc(record.temperature_c));
    let raw = record.bulk.as_deref().unwrap_or(default_bulk);
    let bulk = match BulkComposition::new(&db.system, raw, conditions) {
        Ok(b) => b,
        Err(e) => {
            warn!(index, error = %e, "point rejected before solving");
            return PointReport::from_error(index, record.pressure_kbar, record.temperature_c, &e);
        }
    };
    let cfg = point_config_for(record, base);
    match solve_point(db, model, &bulk, &cfg) {
        Ok(sol) => PointReport::from_solution(index, &sol),
        Err(e) => {
            warn!(index, error = %e, "point failed");
            PointReport::from_error(index, record.pressure_kbar, record.temperature_c, &e)
        }
    }
}

/// Solve every record and return the merged, input-ordered run report.
pub fn run_points(
    db: &PhaseDatabase,
    model: &dyn GibbsModel,
    records: &[PointRecord],
    default_bulk: &[f64],
    cfg: &RunConfig,
) -> AppResult<RunReport> {
    if records.is_empty() {
        return Err(AppError::Config {
            what: "nothing to solve".to_string(),
        });
    }
    if cfg.mode == SolveMode::FixedComposition && records.iter().any(|r| r.fixed.is_empty()) {
        return Err(AppError::Config {
            what: "fixed-composition mode needs a fixed phase on every record".to_string(),
        });
    }

    let n_workers = if cfg.n_workers == 0 {
        rayon::current_num_threads().max(1)
    } else {
        cfg.n_workers
    };
    let base = cfg.point_config();
    info!(n_points = records.len(), n_workers, mode = ?cfg.mode, "run started");

    // round-robin partitions; collect() is the join barrier
    let partials: Vec<Vec<PointReport>> = (0..n_workers)
        .into_par_iter()
        .map(|w| {
            let mut worker_db = db.clone();
            (w..records.len())
                .step_by(n_workers)
                .map(|i| solve_record(&mut worker_db, model, &records[i], default_bulk, &base, i))
                .collect()
        })
        .collect();

    // single-writer ordered merge
    let mut points: Vec<PointReport> = partials.into_iter().flatten().collect();
    points.sort_by_key(|p| p.index);

    let n_failed = points.iter().filter(|p| p.error.is_some()).count();
    info!(n_failed, "run finished");
    Ok(RunReport::new(points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gm_gibbs::{ChemicalSystem, LinearEntry, LinearGibbsModel};
    use gm_phases::{DatabaseConfig, SolutionModel};

    fn binary_setup() -> (PhaseDatabase, LinearGibbsModel) {
        let system = ChemicalSystem::new(vec!["A".into(), "B".into()], vec![60.0, 70.0]).unwrap();
        let model = LinearGibbsModel::new(vec![
            LinearEntry::new("ea", -100.0, 0.01, 1.0, &[("A", 1.0)]),
            LinearEntry::new("eb", -100.0, 0.01, 1.0, &[("B", 1.0)]),
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

    fn record(p: f64, t: f64) -> PointRecord {
        PointRecord {
            pressure_kbar: p,
            temperature_c: t,
            gamma: None,
            bulk: None,
            fixed: Vec::new(),
        }
    }

    #[test]
    fn reports_come_back_in_input_order() {
        let (db, model) = binary_setup();
        let records: Vec<PointRecord> =
            (0..5).map(|i| record(10.0 + i as f64, 900.0)).collect();
        let cfg = RunConfig {
            n_workers: 2,
            compute_properties: false,
            ..RunConfig::default()
        };
        let run = run_points(&db, &model, &records, &[1.0, 1.0], &cfg).unwrap();
        assert_eq!(run.n_points, 5);
        for (i, p) in run.points.iter().enumerate() {
            assert_eq!(p.index, i);
            assert!((p.pressure_kbar - (10.0 + i as f64)).abs() < 1e-12);
            assert_eq!(p.quality, "converged");
        }
    }

    #[test]
    fn bad_point_fails_alone_not_the_run() {
        let (db, model) = binary_setup();
        let mut bad = record(11.0, 900.0);
        bad.bulk = Some(vec![0.0, 0.0]);
        let records = vec![record(10.0, 900.0), bad, record(12.0, 900.0)];
        let cfg = RunConfig {
            compute_properties: false,
            ..RunConfig::default()
        };
        let run = run_points(&db, &model, &records, &[1.0, 1.0], &cfg).unwrap();
        assert_eq!(run.points[0].quality, "converged");
        assert_eq!(run.points[1].quality, "failed");
        assert!(run.points[1].error.is_some());
        assert_eq!(run.points[2].quality, "converged");
    }

    #[test]
    fn per_record_gamma_overrides_the_run_default() {
        let mut rec = record(10.0, 900.0);
        rec.gamma = Some(vec![-120.0, -120.0]);
        let base = RunConfig {
            compute_properties: false,
            ..RunConfig::default()
        }
        .point_config();
        let cfg = point_config_for(&rec, &base);
        assert_eq!(cfg.initial_gamma.as_deref(), Some(&[-120.0, -120.0][..]));
    }

    #[test]
    fn fixed_mode_requires_fixed_records() {
        let (db, model) = binary_setup();
        let cfg = RunConfig {
            mode: SolveMode::FixedComposition,
            ..RunConfig::default()
        };
        let err = run_points(&db, &model, &[record(10.0, 900.0)], &[1.0, 1.0], &cfg).unwrap_err();
        assert!(matches!(err, AppError::Config { .. }));
    }
}
