use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::building_logic::{self, ConstructionProgress, CostTable};
use crate::cache::IntraTickCache;
use crate::commands::{self, Command, CommandError};
use crate::config::GameOptions;
use crate::definitions::{Definitions, WORKER};
use crate::effects::EffectRegistry;
use crate::events::SimEvent;
use crate::grid::Tile;
use crate::snapshot::SnapshotWriter;
use crate::systems::{
    HappinessSystem, PricingSystem, ProductionSystem, ScienceSystem, TransportationSystem,
    UnlockablesSystem,
};
use crate::tick::TickEngine;
use crate::world::GameState;

pub struct EngineSettings {
    pub scenario_name: String,
    pub snapshot_interval_ticks: u64,
    pub snapshot_dir: Option<PathBuf>,
    pub summary_interval_ticks: u64,
    pub options: GameOptions,
}

impl EngineSettings {
    pub fn new(scenario_name: impl Into<String>) -> Self {
        Self {
            scenario_name: scenario_name.into(),
            snapshot_interval_ticks: 0,
            snapshot_dir: None,
            summary_interval_ticks: 60,
            options: GameOptions::default(),
        }
    }
}

pub struct EngineBuilder {
    settings: EngineSettings,
    definitions: Definitions,
    systems: Vec<Box<dyn System>>,
    effects: EffectRegistry,
}

impl EngineBuilder {
    pub fn new(settings: EngineSettings, definitions: Definitions) -> Self {
        Self {
            settings,
            definitions,
            systems: Vec::new(),
            effects: EffectRegistry::standard(),
        }
    }

    pub fn with_system(mut self, system: impl System + 'static) -> Self {
        self.systems.push(Box::new(system));
        self
    }

    pub fn push_system(&mut self, system: impl System + 'static) {
        self.systems.push(Box::new(system));
    }

    /// The full tick pipeline in resolution order.
    pub fn with_standard_systems(self) -> Self {
        self.with_system(UnlockablesSystem::new())
            .with_system(PricingSystem::new())
            .with_system(TransportationSystem::new())
            .with_system(ProductionSystem::new())
            .with_system(HappinessSystem::new())
            .with_system(ScienceSystem::new())
    }

    pub fn with_effects(mut self, effects: EffectRegistry) -> Self {
        self.effects = effects;
        self
    }

    pub fn build(self) -> Engine {
        let snapshot_writer = self
            .settings
            .snapshot_dir
            .as_ref()
            .map(|dir| SnapshotWriter::new(dir, self.settings.snapshot_interval_ticks));
        Engine {
            definitions: self.definitions,
            systems: self.systems,
            tick: TickEngine::new(),
            cache: IntraTickCache::new(),
            costs: CostTable::new(),
            effects: self.effects,
            snapshot_writer,
            settings: self.settings,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TickSummary {
    pub tick: u64,
    pub events: Vec<SimEvent>,
    pub workers_available: f64,
    pub workers_busy: f64,
    pub happiness: Option<f64>,
    pub total_value: f64,
    pub not_producing: usize,
    pub transports_in_flight: usize,
}

pub struct Engine {
    definitions: Definitions,
    systems: Vec<Box<dyn System>>,
    tick: TickEngine,
    cache: IntraTickCache,
    costs: CostTable,
    effects: EffectRegistry,
    snapshot_writer: Option<SnapshotWriter>,
    settings: EngineSettings,
}

impl Engine {
    pub fn tick(&mut self, state: &mut GameState) -> Result<TickSummary> {
        self.tick.swap();
        self.cache.clear();
        let mut events = Vec::new();
        let tick_number = state.tick();
        for system in &mut self.systems {
            let mut ctx = SystemContext {
                tick_number,
                tick: &mut self.tick,
                cache: &mut self.cache,
                defs: &self.definitions,
                options: &self.settings.options,
                costs: &self.costs,
                effects: &self.effects,
                events: &mut events,
            };
            system
                .run(&mut ctx, state)
                .with_context(|| format!("system {} failed at tick {tick_number}", system.name()))?;
        }
        state.tick += 1;

        let summary = self.summarize(state, events);
        if self.settings.summary_interval_ticks > 0
            && summary.tick % self.settings.summary_interval_ticks == 0
        {
            debug!(
                tick = summary.tick,
                workers_available = summary.workers_available,
                workers_busy = summary.workers_busy,
                happiness = ?summary.happiness,
                total_value = summary.total_value,
                not_producing = summary.not_producing,
                transports = summary.transports_in_flight,
                "tick summary"
            );
        }
        if let Some(writer) = self.snapshot_writer.as_mut() {
            writer.maybe_write(
                state,
                &self.tick.next().not_producing_reasons,
                &self.settings.scenario_name,
            )?;
        }
        Ok(summary)
    }

    pub fn run(&mut self, state: &mut GameState, ticks: u64) -> Result<Vec<TickSummary>> {
        let mut summaries = Vec::with_capacity(ticks as usize);
        for _ in 0..ticks {
            summaries.push(self.tick(state)?);
        }
        Ok(summaries)
    }

    /// Run `ticks` ticks, handing each summary to `hook` as it is produced.
    pub fn run_with_hook(
        &mut self,
        state: &mut GameState,
        ticks: u64,
        mut hook: impl FnMut(&TickSummary),
    ) -> Result<()> {
        for _ in 0..ticks {
            let summary = self.tick(state)?;
            hook(&summary);
        }
        Ok(())
    }

    fn summarize(&self, state: &GameState, events: Vec<SimEvent>) -> TickSummary {
        let current = self.tick.current();
        let next = self.tick.next();
        TickSummary {
            tick: state.tick(),
            events,
            workers_available: (current.workers_available.get(WORKER).copied().unwrap_or(0.0)
                * current.worker_percentage())
            .floor(),
            workers_busy: current.workers_used.get(WORKER).copied().unwrap_or(0.0),
            happiness: next.happiness.as_ref().map(|h| h.value),
            total_value: next.total_value,
            not_producing: next.not_producing_reasons.len(),
            transports_in_flight: state.transports().count(),
        }
    }

    /// Apply a host command between ticks.
    pub fn apply(
        &mut self,
        state: &mut GameState,
        command: Command,
    ) -> Result<Vec<SimEvent>, CommandError> {
        let events = commands::apply(state, &self.definitions, command)?;
        self.cache.clear();
        Ok(events)
    }

    /// Run a query against the engine's tick data outside of a tick.
    pub fn with_context<R>(&mut self, f: impl FnOnce(&mut SystemContext<'_>) -> R) -> R {
        let mut events = Vec::new();
        let mut ctx = SystemContext {
            tick_number: 0,
            tick: &mut self.tick,
            cache: &mut self.cache,
            defs: &self.definitions,
            options: &self.settings.options,
            costs: &self.costs,
            effects: &self.effects,
            events: &mut events,
        };
        f(&mut ctx)
    }

    pub fn construction_progress(&mut self, state: &GameState, tile: Tile) -> ConstructionProgress {
        self.with_context(|ctx| building_logic::building_percentage(ctx, state, tile))
    }

    pub fn tick_data(&self) -> &TickEngine {
        &self.tick
    }

    pub fn definitions(&self) -> &Definitions {
        &self.definitions
    }

    pub fn costs(&self) -> &CostTable {
        &self.costs
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }
}

pub struct SystemContext<'a> {
    pub tick_number: u64,
    pub tick: &'a mut TickEngine,
    pub cache: &'a mut IntraTickCache,
    pub defs: &'a Definitions,
    pub options: &'a GameOptions,
    pub costs: &'a CostTable,
    pub effects: &'a EffectRegistry,
    pub events: &'a mut Vec<SimEvent>,
}

pub trait System {
    fn name(&self) -> &str;
    fn run(&mut self, ctx: &mut SystemContext<'_>, state: &mut GameState) -> Result<()>;
}
