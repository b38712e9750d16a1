use clap::Parser;
use std::fs;
use std::path::PathBuf;

use gm_app::{
    builtin_bulk, read_points, run_points, AppError, AppResult, PointRecord, RunConfig, RunReport,
};
use gm_gibbs::{demo_catalog, ChemicalSystem};
use gm_phases::{DatabaseConfig, PhaseDatabase, SolutionModel};
use gm_solver::SolveMode;

#[derive(Parser)]
#[command(name = "gm-cli")]
#[command(about = "gibbsmin - Gibbs free-energy minimization for mineral assemblages", long_about = None)]
struct Cli {
    /// Solving mode: 0 full, 1 fixed-composition, 3 levelling-only
    #[arg(long, default_value_t = 0)]
    mode: u8,

    /// Verbose solver logging
    #[arg(long, short)]
    verbose: bool,

    /// Pressure [kbar] for a single-point run
    #[arg(long, default_value_t = 12.0)]
    pres: f64,

    /// Temperature [C] for a single-point run
    #[arg(long, default_value_t = 1100.0)]
    temp: f64,

    /// Raw bulk composition, comma-separated oxide moles in system order
    #[arg(long, value_delimiter = ',')]
    bulk: Option<Vec<f64>>,

    /// Initial Gamma, comma-separated, full oxide dimension
    #[arg(long, value_delimiter = ',')]
    gam: Option<Vec<f64>>,

    /// Solve only the first N points of the input file
    #[arg(long)]
    n_points: Option<usize>,

    /// Pseudocompound grid budget per solution
    #[arg(long, default_value_t = 512)]
    n_pc: usize,

    /// Local-refinement evaluation budget (0 = unlimited)
    #[arg(long, default_value_t = 2000)]
    maxeval: usize,

    /// Multi-point YAML input file
    #[arg(long)]
    file: Option<PathBuf>,

    /// Built-in test bulk index (0 lherzolite, 1 basalt)
    #[arg(long, default_value_t = 0)]
    test: usize,

    /// JSON report output path
    #[arg(long)]
    out: Option<PathBuf>,

    /// Worker count (0 = one per core)
    #[arg(long, default_value_t = 0)]
    workers: usize,
}

fn solve_mode(mode: u8) -> AppResult<SolveMode> {
    match mode {
        0 => Ok(SolveMode::Full),
        1 => Ok(SolveMode::FixedComposition),
        2 => Err(AppError::Config {
            what: "mode 2 (local minima search) is not implemented".to_string(),
        }),
        3 => Ok(SolveMode::LevellingOnly),
        other => Err(AppError::Config {
            what: format!("unknown solving mode {other}"),
        }),
    }
}

/// Database of the built-in demo catalog: pure SiO2/TiO2/aluminosilicate
/// phases plus olivine and plagioclase solutions over KNCFMASHTOCr.
fn demo_database() -> AppResult<PhaseDatabase> {
    let db = PhaseDatabase::initialize(
        ChemicalSystem::kncfmashtocr(),
        &["q", "crst", "ru", "sill", "H2O"],
        vec![
            SolutionModel::ideal("ol", &["fo", "fa"]),
            SolutionModel::ideal("pl", &["ab", "an", "san"]),
        ],
        &demo_catalog(),
        DatabaseConfig::default(),
    )?;
    Ok(db)
}

fn main() -> AppResult<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let mode = solve_mode(cli.mode)?;
    let model = demo_catalog();
    let db = demo_database()?;

    let mut records = match &cli.file {
        Some(path) => read_points(path)?,
        None => vec![PointRecord {
            pressure_kbar: cli.pres,
            temperature_c: cli.temp,
            gamma: None,
            bulk: None,
            fixed: Vec::new(),
        }],
    };
    if let Some(n) = cli.n_points {
        records.truncate(n);
    }

    let default_bulk = match &cli.bulk {
        Some(raw) => raw.clone(),
        None => builtin_bulk(cli.test)?,
    };
    if default_bulk.len() != db.system.len() {
        return Err(AppError::Config {
            what: format!(
                "bulk has {} entries, the chemical system {}",
                default_bulk.len(),
                db.system.len()
            ),
        });
    }

    let cfg = RunConfig {
        mode,
        n_workers: cli.workers,
        n_pc: cli.n_pc,
        max_evals: cli.maxeval,
        initial_gamma: cli.gam.clone(),
        ..RunConfig::default()
    };

    let report = run_points(&db, &model, &records, &default_bulk, &cfg)?;
    for point in &report.points {
        print!("{}", point.summary());
    }

    emit_report(&report, cli.out.as_deref())?;
    Ok(())
}

fn emit_report(report: &RunReport, out: Option<&std::path::Path>) -> AppResult<()> {
    let json = serde_json::to_string_pretty(report)?;
    match out {
        Some(path) => {
            fs::write(path, json)?;
            println!("report written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_2_is_rejected() {
        assert!(solve_mode(2).is_err());
        assert!(solve_mode(9).is_err());
        assert!(matches!(solve_mode(3), Ok(SolveMode::LevellingOnly)));
    }

    #[test]
    fn demo_database_builds() {
        let db = demo_database().unwrap();
        assert_eq!(db.pure_phases.len(), 5);
        assert_eq!(db.solutions.len(), 2);
    }
}
