use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tickcity::{engine::EngineBuilder, events::SimEvent, scenario::ScenarioLoader};

#[derive(Debug, Parser)]
#[command(author, version, about = "Deterministic city economy runner")]
struct Cli {
    /// Path to the scenario YAML file
    #[arg(long, default_value = "scenarios/river_valley.yaml")]
    scenario: PathBuf,

    /// Override tick count (uses scenario default when omitted)
    #[arg(long)]
    ticks: Option<u64>,

    /// Override snapshot interval in ticks
    #[arg(long)]
    snapshot_interval: Option<u64>,

    /// Write JSON snapshots to this directory
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let loader = ScenarioLoader::new(".");
    let scenario = loader.load(&cli.scenario)?;
    init_tracing(&scenario.logging.level);

    let definitions = loader.definitions(&scenario)?;
    let mut state = scenario.build_state(&definitions)?;
    let ticks = scenario.ticks(cli.ticks);

    let mut settings = scenario.engine_settings();
    if let Some(interval) = cli.snapshot_interval {
        settings.snapshot_interval_ticks = interval;
    }
    settings.snapshot_dir = cli.snapshot_dir;

    let mut engine = EngineBuilder::new(settings, definitions)
        .with_standard_systems()
        .build();
    info!(scenario = %scenario.name, ticks, "starting run");

    let mut completed = 0usize;
    let mut last = None;
    engine.run_with_hook(&mut state, ticks, |summary| {
        completed += summary
            .events
            .iter()
            .filter(|event| {
                matches!(
                    event,
                    SimEvent::BuildingComplete { .. } | SimEvent::UpgradeComplete { .. }
                )
            })
            .count();
        last = Some(summary.clone());
    })?;

    let happiness = last
        .as_ref()
        .and_then(|summary| summary.happiness)
        .map(|value| format!("{value:.0}"))
        .unwrap_or_else(|| "n/a".to_string());
    println!(
        "Scenario '{}' completed for {} ticks. Empire value: {:.1}, happiness: {}, constructions finished: {}, transports in flight: {}",
        scenario.name,
        ticks,
        last.as_ref().map(|summary| summary.total_value).unwrap_or(0.0),
        happiness,
        completed,
        state.transports().count(),
    );
    Ok(())
}
