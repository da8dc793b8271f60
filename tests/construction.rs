use tickcity::{
    building_logic::building_percentage,
    definitions::Definitions,
    engine::{Engine, EngineBuilder, EngineSettings},
    events::SimEvent,
    grid::{Grid, Tile},
    scenario::ScenarioLoader,
    tick::GlobalBucket,
    tile::{Building, BuildingStatus},
    world::GameState,
};

const DEPOT_DEFINITIONS: &str = r#"
resources:
  Worker: { can_store: false, can_price: false }
  Science: { can_price: false }
  Wood: {}
buildings:
  LoggingCamp:
    output: { Wood: 1 }
  Depot:
    construction: { Wood: 10 }
"#;

fn scenario_loader() -> ScenarioLoader {
    ScenarioLoader::new(env!("CARGO_MANIFEST_DIR"))
}

fn hamlet() -> (Engine, GameState) {
    let loader = scenario_loader();
    let scenario = loader.load("scenarios/hamlet.yaml").unwrap();
    let definitions = loader.definitions(&scenario).unwrap();
    let state = scenario.build_state(&definitions).unwrap();
    let engine = EngineBuilder::new(scenario.engine_settings(), definitions)
        .with_standard_systems()
        .build();
    (engine, state)
}

#[test]
fn seconds_left_uses_builder_throughput() {
    let definitions = Definitions::from_yaml_str(DEPOT_DEFINITIONS).unwrap();
    let mut state = GameState::new(Grid::new(4, 4));
    let tile = Tile::new(1, 1);
    let def = definitions.building("Depot").unwrap().clone();
    state.tiles.get_mut(&tile).unwrap().building = Some(Building::new("Depot", &def));
    let mut engine = EngineBuilder::new(EngineSettings::new("depot"), definitions).build();

    let (empty, partial) = engine.with_context(|ctx| {
        ctx.tick
            .next_mut()
            .add_global(GlobalBucket::BuilderCapacity, 19.0, "test");
        ctx.tick.swap();
        ctx.cache.clear();
        let empty = building_percentage(ctx, &state, tile);
        state.building_mut(tile).unwrap().add_resource("Wood", 30.0);
        let partial = building_percentage(ctx, &state, tile);
        (empty, partial)
    });
    assert_eq!(empty.seconds_left, Some(5));
    assert_eq!(empty.percent, 0.0);
    assert_eq!(partial.seconds_left, Some(4));
    assert!((partial.percent - 0.3).abs() < 1e-9);
}

#[test]
fn progress_before_first_tick() {
    let (mut engine, state) = hamlet();
    let hut = Tile::new(4, 2);
    let progress = engine.construction_progress(&state, hut);
    assert_eq!(progress.percent, 0.0);
    assert_eq!(progress.seconds_left, Some(10));
    let done = engine.construction_progress(&state, Tile::new(3, 2));
    assert_eq!(done.percent, 1.0);
    assert_eq!(done.seconds_left, Some(0));
}

#[test]
fn hut_is_built_from_nearby_wood() {
    let (mut engine, mut state) = hamlet();
    let hut = Tile::new(4, 2);
    let summaries = engine.run(&mut state, 60).unwrap();

    let completed_at = summaries.iter().find_map(|summary| {
        summary
            .events
            .iter()
            .any(|event| {
                matches!(event, SimEvent::BuildingComplete { tile, building } if *tile == hut && building == "Hut")
            })
            .then_some(summary.tick)
    });
    assert!(completed_at.is_some(), "hut never completed");

    let building = state.building(hut).unwrap();
    assert_eq!(building.status, BuildingStatus::Completed);
    assert_eq!(building.level, 1);
    assert!(building.amount("Wood") >= 0.0);
    let camp = state.building(Tile::new(3, 2)).unwrap();
    assert!(camp.amount("Wood") < 260.0);
}

#[test]
fn upgrade_runs_back_through_construction() {
    let (mut engine, mut state) = hamlet();
    let hut = Tile::new(4, 2);
    engine
        .apply(
            &mut state,
            tickcity::Command::Upgrade {
                tile: hut,
                levels: 1,
            },
        )
        .unwrap();
    assert_eq!(state.building(hut).unwrap().desired_level, 2);

    let summaries = engine.run(&mut state, 120).unwrap();
    let events: Vec<&SimEvent> = summaries.iter().flat_map(|s| s.events.iter()).collect();
    let built = events
        .iter()
        .position(|event| matches!(event, SimEvent::BuildingComplete { tile, .. } if *tile == hut));
    let upgraded = events.iter().position(|event| {
        matches!(event, SimEvent::UpgradeComplete { tile, level: 2, .. } if *tile == hut)
    });
    assert!(built.is_some() && upgraded.is_some());
    assert!(built < upgraded);
    let building = state.building(hut).unwrap();
    assert_eq!(building.level, 2);
    assert_eq!(building.status, BuildingStatus::Completed);
}
