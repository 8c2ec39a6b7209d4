//! Scenario files and batch output on disk.

use std::path::PathBuf;

use battle_core::prelude::*;
use battle_headless::batch::{run_batch, verify_determinism, BatchConfig, BatchResults};
use battle_headless::scenario::{Scenario, ScenarioError};

fn scenarios_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios")
}

#[test]
fn test_shipped_scenarios_deploy_and_finish() {
    let mut found = 0;
    for entry in std::fs::read_dir(scenarios_dir()).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("ron") {
            continue;
        }
        found += 1;

        let scenario = Scenario::load(&path).unwrap();
        let report = scenario.build_battle(Some(1)).unwrap().into_report();
        assert!(report.frames <= scenario.max_frames, "{}", path.display());
        assert_eq!(
            report.events.last().map(|e| e.kind),
            Some(CombatEventKind::BattleEnded)
        );
    }
    assert!(found >= 2, "expected shipped scenarios in {}", scenarios_dir().display());
}

#[test]
fn test_corridor_scenario_shape() {
    let scenario = Scenario::load(scenarios_dir().join("corridor.ron")).unwrap();
    assert_eq!(scenario.board.obstacles.len(), 6);
    assert_eq!(scenario.team_size(Team::One), 2);

    let battle = scenario.build_battle(Some(5)).unwrap();
    assert_eq!(battle.grid().state(GridPos::new(0, 5)), Some(CellState::Obstacle));
    assert_eq!(battle.unit(UnitId(3)).unwrap().level(), 2);
}

#[test]
fn test_archetype_overrides_apply() {
    let scenario = Scenario::load(scenarios_dir().join("hex_backline.ron")).unwrap();
    let battle = scenario.build_battle(Some(5)).unwrap();
    let archer = battle
        .units()
        .find(|unit| unit.archetype() == Archetype::Archer)
        .unwrap();
    assert_eq!(archer.max_health(), Fixed::from_num(80));
    assert_eq!(archer.max_mana(), Fixed::from_num(60));
}

#[test]
fn test_scenario_from_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mirror.ron");
    std::fs::write(
        &path,
        r#"Scenario(
            name: "mirror",
            units: [
                (archetype: Tank, team: 1, position: (3, 3)),
                (archetype: Tank, team: 2, position: (3, 4)),
            ],
        )"#,
    )
    .unwrap();

    let scenario = Scenario::resolve(path.to_str().unwrap()).unwrap();
    assert_eq!(scenario.name, "mirror");
    assert_eq!(scenario.config(), CombatConfig::default());
}

#[test]
fn test_malformed_file_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.ron");
    std::fs::write(&path, "Scenario(name: ").unwrap();
    assert!(matches!(Scenario::load(&path), Err(ScenarioError::ParseError(_))));
}

#[test]
fn test_batch_results_save_load() {
    let dir = tempfile::tempdir().unwrap();
    let config = BatchConfig::new("duel", 6).with_output(dir.path().to_path_buf());
    let results = run_batch(config, &Scenario::duel());

    let path = dir.path().join("nested").join("batch_results.json");
    results.save(&path).unwrap();
    assert!(path.exists());

    let loaded = BatchResults::load(&path).unwrap();
    assert_eq!(loaded.battles, results.battles);
    assert_eq!(loaded.config.scenario, "duel");
    assert_eq!(loaded.summary.total_battles, 6);
}

#[test]
fn test_shipped_scenarios_are_deterministic() {
    let scenario = Scenario::load(scenarios_dir().join("hex_backline.ron")).unwrap();
    assert!(verify_determinism(&scenario, 99, 3).unwrap());
}
