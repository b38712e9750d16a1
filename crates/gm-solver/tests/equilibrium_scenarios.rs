//! End-to-end solves through the public API, demo catalog included.

use gm_core::numeric::Tolerances;
use gm_core::Conditions;
use gm_gibbs::{demo_catalog, BulkComposition, ChemicalSystem, LinearEntry, LinearGibbsModel};
use gm_phases::{DatabaseConfig, MixingModel, PhaseDatabase, SolutionModel};
use gm_solver::{
    solve_point, ConvergenceQuality, PgeConfig, PointConfig, SolveMode,
};

fn demo_db() -> PhaseDatabase {
    PhaseDatabase::initialize(
        ChemicalSystem::kncfmashtocr(),
        &["q", "ru"],
        vec![SolutionModel::ideal("ol", &["fo", "fa"])],
        &demo_catalog(),
        DatabaseConfig::default(),
    )
    .unwrap()
}

fn demo_bulk(db: &PhaseDatabase) -> BulkComposition {
    // SiO2-rich olivine-bearing bulk; only components the phase set can carry
    let mut raw = vec![0.0; db.system.len()];
    raw[db.system.index_of("SiO2").unwrap()] = 0.60;
    raw[db.system.index_of("MgO").unwrap()] = 0.25;
    raw[db.system.index_of("FeO").unwrap()] = 0.15;
    BulkComposition::new(&db.system, &raw, Conditions::from_kbar_kelvin(12.0, 1373.15)).unwrap()
}

#[test]
fn demo_catalog_point_converges_with_mass_balance() {
    let mut db = demo_db();
    let model = demo_catalog();
    let bulk = demo_bulk(&db);
    let sol = solve_point(&mut db, &model, &bulk, &PointConfig::default()).unwrap();

    assert_eq!(sol.quality, ConvergenceQuality::Converged);
    assert!(!sol.stable_phases.is_empty());

    // amount-weighted phase compositions reproduce the bulk
    let tol = Tolerances::default();
    for (c, b) in bulk.nonzero().iter().map(|&i| {
        let total: f64 = sol
            .stable_phases
            .iter()
            .map(|ph| ph.amount * ph.comp[i])
            .sum();
        (total, bulk.composition()[i])
    }) {
        assert!((c - b).abs() < tol.mass_balance * 100.0, "{c} vs {b}");
    }

    // quartz and olivine both carry SiO2; olivine must hold all the MgO+FeO
    let ol = sol.stable_phases.iter().find(|p| p.name == "ol").unwrap();
    assert!(ol.amount > 0.0);
    assert!(ol.x[0] > 0.0 && ol.x[0] < 1.0);

    let sys = sol.system.unwrap();
    assert!(sys.volume > 0.0);
    assert!(sys.density > 0.0);
}

#[test]
fn symmetric_solvus_splits_into_two_instances() {
    // a regular solution with W far above 2RT unmixes; the 50/50 bulk must
    // come out as two coexisting compositions of the same model
    let system = ChemicalSystem::new(vec!["A".into(), "B".into()], vec![60.0, 70.0]).unwrap();
    let model = LinearGibbsModel::new(vec![
        LinearEntry::new("ea", -100.0, 0.0, 1.0, &[("A", 1.0)]),
        LinearEntry::new("eb", -100.0, 0.0, 1.0, &[("B", 1.0)]),
    ]);
    let sm = SolutionModel::ideal("reg", &["ea", "eb"])
        .with_mixing(MixingModel::Symmetric { w: vec![30.0] });
    let mut db = PhaseDatabase::initialize(
        system,
        &[],
        vec![sm],
        &model,
        DatabaseConfig::default(),
    )
    .unwrap();
    let bulk = BulkComposition::new(
        &db.system,
        &[1.0, 1.0],
        Conditions::from_kbar_kelvin(10.0, 1000.0),
    )
    .unwrap();
    let sol = solve_point(&mut db, &model, &bulk, &PointConfig::default()).unwrap();

    assert_eq!(sol.quality, ConvergenceQuality::Converged);
    assert_eq!(sol.stable_phases.len(), 2);
    let (a, b) = (&sol.stable_phases[0], &sol.stable_phases[1]);
    assert_eq!(a.name, "reg");
    assert_eq!(b.name, "reg");
    // the two limbs are mirrored around the midpoint and well apart
    assert!((a.x[0] - b.x[0]).abs() > 0.2);
    assert!((a.x[0] + b.x[0] - 1.0).abs() < 1e-3);
}

#[test]
fn levelling_only_mode_reports_the_basis() {
    let mut db = demo_db();
    let model = demo_catalog();
    let bulk = demo_bulk(&db);
    let cfg = PointConfig {
        mode: SolveMode::LevellingOnly,
        ..PointConfig::default()
    };
    let sol = solve_point(&mut db, &model, &bulk, &cfg).unwrap();
    assert_eq!(sol.iterations, 0);
    assert_eq!(sol.stable_phases.len(), bulk.nonzero().len());
    assert!(sol.stable_phases.iter().all(|p| p.amount >= 0.0));
}

#[test]
fn iteration_cap_emits_a_flagged_result_not_an_error() {
    // one iteration with near-frozen duals and a deliberately wrong Gamma
    // cannot settle the roster; the point must still come out, flagged
    let system = ChemicalSystem::new(vec!["A".into()], vec![60.0]).unwrap();
    let model = LinearGibbsModel::new(vec![
        LinearEntry::new("alpha", -100.0, 0.0, 1.0, &[("A", 1.0)]),
        LinearEntry::new("beta", -90.0, 0.0, 1.0, &[("A", 1.0)]),
    ]);
    let mut db = PhaseDatabase::initialize(
        system,
        &["alpha", "beta"],
        vec![],
        &model,
        DatabaseConfig::default(),
    )
    .unwrap();
    let bulk = BulkComposition::new(
        &db.system,
        &[1.0],
        Conditions::from_kbar_kelvin(10.0, 1000.0),
    )
    .unwrap();
    let cfg = PointConfig {
        pge: PgeConfig {
            max_iterations: 1,
            gamma_relax: 1e-9,
            ..PgeConfig::default()
        },
        initial_gamma: Some(vec![0.0]),
        compute_properties: false,
        ..PointConfig::default()
    };
    let sol = solve_point(&mut db, &model, &bulk, &cfg).unwrap();
    assert_ne!(sol.quality, ConvergenceQuality::Failed);
    assert_ne!(sol.quality, ConvergenceQuality::Converged);
    assert_eq!(sol.iterations, 1);
}

#[test]
fn database_is_reusable_across_points() {
    let mut db = demo_db();
    let model = demo_catalog();
    let bulk = demo_bulk(&db);
    let first = solve_point(&mut db, &model, &bulk, &PointConfig::default()).unwrap();

    // same bulk, hotter point; the reset must leave no state behind
    let mut raw = vec![0.0; db.system.len()];
    raw[db.system.index_of("SiO2").unwrap()] = 0.60;
    raw[db.system.index_of("MgO").unwrap()] = 0.25;
    raw[db.system.index_of("FeO").unwrap()] = 0.15;
    let bulk2 = BulkComposition::new(
        &db.system,
        &raw,
        Conditions::from_kbar_kelvin(12.0, 1473.15),
    )
    .unwrap();
    let second = solve_point(&mut db, &model, &bulk2, &PointConfig::default()).unwrap();

    assert_eq!(first.quality, ConvergenceQuality::Converged);
    assert_eq!(second.quality, ConvergenceQuality::Converged);
    // entropy carries a temperature dependence: energies must differ
    assert!((first.total_gibbs - second.total_gibbs).abs() > 1e-6);
}
