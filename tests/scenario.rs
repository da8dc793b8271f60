use std::path::PathBuf;

use tempfile::tempdir;
use tickcity::{
    commands::{Command, CommandError},
    engine::EngineBuilder,
    grid::Tile,
    scenario::ScenarioLoader,
    snapshot::SnapshotWriter,
    tile::BuildingStatus,
};

fn scenario_loader() -> ScenarioLoader {
    ScenarioLoader::new(env!("CARGO_MANIFEST_DIR"))
}

fn scenario_path(name: &str) -> PathBuf {
    PathBuf::from("scenarios").join(name)
}

#[test]
fn river_valley_builds_its_map() {
    let loader = scenario_loader();
    let scenario = loader.load(scenario_path("river_valley.yaml")).unwrap();
    let definitions = loader.definitions(&scenario).unwrap();
    let state = scenario.build_state(&definitions).unwrap();

    assert_eq!(state.grid.width(), 12);
    assert_eq!(state.start_epoch_seconds, 1_700_000_000);
    assert_eq!(state.great_people.get("Hammurabi"), Some(&1));
    assert!(state.has_tech("Banking"));
    assert_eq!(
        state.building(Tile::new(2, 2)).unwrap().status,
        BuildingStatus::Building
    );
    // The natural wonder keeps its tile hidden until explored.
    assert!(!state.is_explored(Tile::new(10, 8)));
    assert_eq!(state.buildings().count(), 15);
}

#[test]
fn missing_scenario_reports_path() {
    let err = scenario_loader()
        .load(scenario_path("does_not_exist.yaml"))
        .unwrap_err();
    assert!(format!("{err:#}").contains("does_not_exist.yaml"));
}

#[test]
fn engine_writes_snapshots_on_interval() {
    let loader = scenario_loader();
    let scenario = loader.load(scenario_path("hamlet.yaml")).unwrap();
    let definitions = loader.definitions(&scenario).unwrap();
    let mut state = scenario.build_state(&definitions).unwrap();
    let temp = tempdir().unwrap();

    let mut settings = scenario.engine_settings();
    settings.snapshot_dir = Some(temp.path().to_path_buf());
    let mut engine = EngineBuilder::new(settings, definitions)
        .with_standard_systems()
        .build();

    let mut ticks = Vec::new();
    engine
        .run_with_hook(&mut state, 30, |summary| ticks.push(summary.tick))
        .unwrap();
    assert_eq!(ticks, (1..=30).collect::<Vec<_>>());

    let reader = SnapshotWriter::new(temp.path(), scenario.snapshot_interval_ticks);
    let snapshots = reader.list_snapshots().unwrap();
    assert_eq!(snapshots.len(), 3);
    let world = reader.load_world(&snapshots[2]).unwrap();
    assert_eq!(world.tick, 30);
    assert_eq!(world.scenario, "hamlet");
    assert_eq!(world.buildings.len(), 3);
}

#[test]
fn placed_building_is_constructed() {
    let loader = scenario_loader();
    let scenario = loader.load(scenario_path("hamlet.yaml")).unwrap();
    let definitions = loader.definitions(&scenario).unwrap();
    let mut state = scenario.build_state(&definitions).unwrap();
    let mut engine = EngineBuilder::new(scenario.engine_settings(), definitions)
        .with_standard_systems()
        .build();

    let tile = Tile::new(2, 3);
    engine
        .apply(
            &mut state,
            Command::Place {
                tile,
                building: "WheatFarm".into(),
            },
        )
        .unwrap();
    let occupied = engine.apply(
        &mut state,
        Command::Place {
            tile,
            building: "Hut".into(),
        },
    );
    assert_eq!(occupied, Err(CommandError::Occupied(tile)));

    engine.run(&mut state, 80).unwrap();
    let farm = state.building(tile).unwrap();
    assert_eq!(farm.status, BuildingStatus::Completed);
    assert!(farm.amount("Wheat") > 0.0);
}
