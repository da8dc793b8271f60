//! Per-tick derived data and the double buffer that holds it.
//!
//! `current` is what the previous tick produced and is read-only while a tick resolves.
//! `next` accumulates everything the running tick produces. The one live value is the
//! worker-usage ledger on `current`: transportation and production draw from the same pool
//! in priority order, so every draw must see the draws before it.

use std::collections::{BTreeMap, BTreeSet};
use std::mem;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::definitions::{BuildingType, Resource, ResourceMap, WORKER};
use crate::grid::Tile;
use crate::happiness::Happiness;

/// Additive bonus per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Multiplier {
    pub input: f64,
    pub output: f64,
    pub worker: f64,
    pub storage: f64,
}

impl Multiplier {
    pub fn get(&self, category: MultiplierCategory) -> f64 {
        match category {
            MultiplierCategory::Input => self.input,
            MultiplierCategory::Output => self.output,
            MultiplierCategory::Worker => self.worker,
            MultiplierCategory::Storage => self.storage,
        }
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            input: self.input * factor,
            output: self.output * factor,
            worker: self.worker * factor,
            storage: self.storage * factor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MultiplierCategory {
    Input,
    Output,
    Worker,
    Storage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiplierWithSource {
    #[serde(flatten)]
    pub value: Multiplier,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalBucket {
    Happiness,
    BuilderCapacity,
    SciencePerIdleWorker,
    SciencePerBusyWorker,
    TransportCapacity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalMultiplier {
    pub value: f64,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NotProducingReason {
    NotEnoughResources,
    NotEnoughWorkers,
    StorageFull,
    TurnedOff,
    NotOnDeposit,
    NoActiveTransports,
}

/// Zone in which in-flight transports burn no fuel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FreeTransportZone {
    pub center: Tile,
    pub radius: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickData {
    pub workers_available: ResourceMap,
    pub workers_used: ResourceMap,
    pub workers_assignment: BTreeMap<Tile, f64>,
    pub electrified: BTreeMap<Tile, u32>,
    pub resources_by_tile: BTreeMap<Resource, Vec<Tile>>,
    pub not_producing_reasons: BTreeMap<Tile, NotProducingReason>,
    pub special_buildings: BTreeMap<BuildingType, Tile>,
    pub player_trade_buildings: BTreeSet<Tile>,
    pub total_value: f64,
    pub happiness: Option<Happiness>,
    pub global_multipliers: BTreeMap<GlobalBucket, Vec<GlobalMultiplier>>,
    pub tile_multipliers: BTreeMap<Tile, Vec<MultiplierWithSource>>,
    pub building_multipliers: BTreeMap<BuildingType, Vec<MultiplierWithSource>>,
    /// Input/output/worker/storage bonuses that apply to every building.
    pub all_building_multipliers: Vec<MultiplierWithSource>,
    pub unlocked_buildings: BTreeSet<BuildingType>,
    pub happiness_exemptions: BTreeSet<Tile>,
    pub free_transport: Vec<FreeTransportZone>,
}

impl TickData {
    pub fn empty() -> Self {
        let mut global_multipliers = BTreeMap::new();
        global_multipliers.insert(
            GlobalBucket::BuilderCapacity,
            vec![GlobalMultiplier {
                value: 1.0,
                source: "Base".to_string(),
            }],
        );
        Self {
            workers_available: ResourceMap::new(),
            workers_used: ResourceMap::new(),
            workers_assignment: BTreeMap::new(),
            electrified: BTreeMap::new(),
            resources_by_tile: BTreeMap::new(),
            not_producing_reasons: BTreeMap::new(),
            special_buildings: BTreeMap::new(),
            player_trade_buildings: BTreeSet::new(),
            total_value: 0.0,
            happiness: None,
            global_multipliers,
            tile_multipliers: BTreeMap::new(),
            building_multipliers: BTreeMap::new(),
            all_building_multipliers: Vec::new(),
            unlocked_buildings: BTreeSet::new(),
            happiness_exemptions: BTreeSet::new(),
            free_transport: Vec::new(),
        }
    }

    pub fn global(&self, bucket: GlobalBucket) -> f64 {
        self.global_multipliers
            .get(&bucket)
            .map(|m| m.iter().map(|g| g.value).sum())
            .unwrap_or(0.0)
    }

    pub fn worker_percentage(&self) -> f64 {
        self.happiness
            .as_ref()
            .map(|h| h.worker_percentage)
            .unwrap_or(1.0)
    }

    pub fn add_global(&mut self, bucket: GlobalBucket, value: f64, source: &str) {
        self.global_multipliers
            .entry(bucket)
            .or_default()
            .push(GlobalMultiplier {
                value,
                source: source.to_string(),
            });
    }

    pub fn add_tile_multiplier(&mut self, tile: Tile, value: Multiplier, source: &str) {
        self.tile_multipliers
            .entry(tile)
            .or_default()
            .push(MultiplierWithSource {
                value,
                source: source.to_string(),
            });
    }

    pub fn add_building_multiplier(&mut self, building: &str, value: Multiplier, source: &str) {
        self.building_multipliers
            .entry(building.to_string())
            .or_default()
            .push(MultiplierWithSource {
                value,
                source: source.to_string(),
            });
    }

    pub fn add_all_building_multiplier(&mut self, value: Multiplier, source: &str) {
        self.all_building_multipliers.push(MultiplierWithSource {
            value,
            source: source.to_string(),
        });
    }

    pub fn add_workers(&mut self, res: &str, amount: f64) {
        *self.workers_available.entry(res.to_string()).or_insert(0.0) += amount;
    }

    pub fn set_reason(&mut self, tile: Tile, reason: NotProducingReason) {
        self.not_producing_reasons.insert(tile, reason);
    }

    pub fn clear_reason(&mut self, tile: Tile) {
        self.not_producing_reasons.remove(&tile);
    }
}

impl Default for TickData {
    fn default() -> Self {
        Self::empty()
    }
}

pub struct TickEngine {
    current: TickData,
    next: TickData,
}

impl TickEngine {
    pub fn new() -> Self {
        Self {
            current: TickData::empty(),
            next: TickData::empty(),
        }
    }

    /// Freeze what the last tick accumulated and start a fresh accumulator.
    pub fn swap(&mut self) {
        self.current = mem::replace(&mut self.next, TickData::empty());
    }

    pub fn current(&self) -> &TickData {
        &self.current
    }

    pub fn next(&self) -> &TickData {
        &self.next
    }

    pub fn next_mut(&mut self) -> &mut TickData {
        &mut self.next
    }

    /// Workers of `res` still free this tick. Happiness scales only the `Worker` pool.
    pub fn available_workers(&self, res: &str) -> f64 {
        let available = self.current.workers_available.get(res).copied().unwrap_or(0.0);
        let percentage = if res == WORKER {
            self.current.worker_percentage()
        } else {
            1.0
        };
        let used = self.current.workers_used.get(res).copied().unwrap_or(0.0);
        (available * percentage).floor() - used
    }

    /// Draw from the live pool. This is the only write ever made to `current`.
    pub fn use_workers(&mut self, res: &str, amount: f64, tile: Option<Tile>) {
        if amount < 0.0 {
            warn!(resource = res, amount, "ignoring negative worker draw");
            return;
        }
        *self
            .current
            .workers_used
            .entry(res.to_string())
            .or_insert(0.0) += amount;
        if let Some(tile) = tile {
            *self.current.workers_assignment.entry(tile).or_insert(0.0) += amount;
        }
    }
}

impl Default for TickEngine {
    fn default() -> Self {
        Self::new()
    }
}
