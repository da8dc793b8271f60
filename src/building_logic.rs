//! Derived building values: cost curves, IO after multipliers, storage, workers, builders.
//!
//! Everything here reads the frozen `current` tick data and never writes game state, so the
//! same inputs always give the same answer within a tick.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::warn;

use crate::cache::{IoDirection, IoFlags};
use crate::definitions::{BuildingSpecial, BuildingType, Definitions, Feature, ResourceMap, WORKER};
use crate::engine::SystemContext;
use crate::grid::Tile;
use crate::market;
use crate::tick::{GlobalBucket, MultiplierCategory, TickEngine};
use crate::tile::{clamp_priority, Building, Capability, InputMode, ResourceImportOptions};
use crate::world::GameState;

const EPS: f64 = 1e-9;

/// One hour of production.
pub const STORAGE_TO_PRODUCTION: f64 = 3600.0;
const COST_MULTIPLIER: f64 = 10.0;
const COST_GROWTH: f64 = 1.5;
const BANKING_LEVEL: u32 = 10;

/// Memoized construction costs. Lives for the whole run since it depends only on definitions.
#[derive(Default)]
pub struct CostTable {
    per_level: RefCell<HashMap<(BuildingType, u32), Rc<ResourceMap>>>,
    total: RefCell<HashMap<(BuildingType, u32, u32), Rc<ResourceMap>>>,
}

impl CostTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn building_cost(&self, defs: &Definitions, kind: &str, level: u32) -> Rc<ResourceMap> {
        let key = (kind.to_string(), level);
        if let Some(hit) = self.per_level.borrow().get(&key) {
            return Rc::clone(hit);
        }
        let cost = Rc::new(compute_building_cost(defs, kind, level));
        self.per_level.borrow_mut().insert(key, Rc::clone(&cost));
        cost
    }

    /// Sum of the per-level costs from `from` up to but excluding `to`.
    pub fn total_building_cost(
        &self,
        defs: &Definitions,
        kind: &str,
        from: u32,
        to: u32,
    ) -> Rc<ResourceMap> {
        let key = (kind.to_string(), from, to);
        if let Some(hit) = self.total.borrow().get(&key) {
            return Rc::clone(hit);
        }
        let mut total = ResourceMap::new();
        for level in from..to {
            add_resources(&mut total, &self.building_cost(defs, kind, level));
        }
        let total = Rc::new(total);
        self.total.borrow_mut().insert(key, Rc::clone(&total));
        total
    }
}

pub fn wonder_cost_multiplier(defs: &Definitions, kind: &str) -> f64 {
    let (tech, age) = defs.tech_and_age_index(kind);
    let tech = tech as f64;
    (100.0 + 100.0 * tech * tech + 5f64.powi(age as i32) * COST_GROWTH.powf(tech)).round()
}

fn compute_building_cost(defs: &Definitions, kind: &str, level: u32) -> ResourceMap {
    let Some(def) = defs.building(kind) else {
        return ResourceMap::new();
    };
    let base = match &def.construction {
        Some(construction) if !construction.is_empty() => construction,
        _ => &def.input,
    };
    let growth = COST_GROWTH.powi(level as i32);
    if defs.is_world_wonder(kind) {
        let multiplier = wonder_cost_multiplier(defs, kind);
        base.iter()
            .map(|(res, amount)| {
                let price = defs.price(res);
                let price = if price > EPS { price } else { 1.0 };
                (res.clone(), growth * multiplier * amount / price)
            })
            .collect()
    } else {
        base.iter()
            .map(|(res, amount)| (res.clone(), growth * COST_MULTIPLIER * amount))
            .collect()
    }
}

pub fn resources_value(defs: &Definitions, resources: &ResourceMap) -> f64 {
    resources
        .iter()
        .filter(|(res, _)| defs.can_price(res))
        .map(|(res, amount)| defs.price(res) * amount)
        .sum()
}

/// Priced value of everything spent to bring the building to its current level.
pub fn building_value(ctx: &SystemContext<'_>, building: &Building) -> f64 {
    let spent = ctx
        .costs
        .total_building_cost(ctx.defs, &building.kind, 0, building.level);
    resources_value(ctx.defs, &spent)
}

pub fn has_enough_resources(have: &ResourceMap, need: &ResourceMap) -> bool {
    need.iter()
        .all(|(res, amount)| have.get(res).copied().unwrap_or(0.0) >= *amount)
}

pub fn add_resources(target: &mut ResourceMap, add: &ResourceMap) {
    for (res, amount) in add {
        *target.entry(res.clone()).or_insert(0.0) += amount;
    }
}

/// Deduct `cost`, clamping any component that would go negative to zero.
pub fn deduct_resources(target: &mut ResourceMap, cost: &ResourceMap) {
    for (res, amount) in cost {
        let entry = target.entry(res.clone()).or_insert(0.0);
        if *entry + EPS < *amount {
            warn!(resource = %res, have = *entry, need = *amount, "deduction clamped to zero");
            *entry = 0.0;
        } else {
            *entry = (*entry - amount).max(0.0);
        }
    }
}

pub fn filter_transportable(defs: &Definitions, resources: &ResourceMap) -> ResourceMap {
    resources
        .iter()
        .filter(|(res, _)| defs.is_transportable(res))
        .map(|(res, v)| (res.clone(), *v))
        .collect()
}

pub fn storage_required(defs: &Definitions, resources: &ResourceMap) -> f64 {
    resources
        .iter()
        .filter(|(res, _)| defs.is_transportable(res))
        .map(|(_, v)| *v)
        .sum()
}

pub fn has_feature(state: &GameState, feature: Feature) -> bool {
    state.has_tech(feature.tech())
}

pub fn total_multiplier_for(
    ctx: &SystemContext<'_>,
    state: &GameState,
    tile: Tile,
    category: MultiplierCategory,
    base: f64,
) -> f64 {
    let current = ctx.tick.current();
    let mut result = base;
    if let Some(list) = current.tile_multipliers.get(&tile) {
        result += list.iter().map(|m| m.value.get(category)).sum::<f64>();
    }
    if let Some(building) = state.building(tile) {
        if let Some(list) = current.building_multipliers.get(&building.kind) {
            result += list.iter().map(|m| m.value.get(category)).sum::<f64>();
        }
    }
    result += current
        .all_building_multipliers
        .iter()
        .map(|m| m.value.get(category))
        .sum::<f64>();
    result
}

pub fn building_io(
    ctx: &SystemContext<'_>,
    state: &GameState,
    tile: Tile,
    direction: IoDirection,
    flags: IoFlags,
) -> Rc<ResourceMap> {
    ctx.cache.building_io(tile, direction, flags, || {
        compute_building_io(ctx, state, tile, direction, flags)
    })
}

fn compute_building_io(
    ctx: &SystemContext<'_>,
    state: &GameState,
    tile: Tile,
    direction: IoDirection,
    flags: IoFlags,
) -> ResourceMap {
    let Some(building) = state.building(tile) else {
        return ResourceMap::new();
    };
    let Some(def) = ctx.defs.building(&building.kind) else {
        return ResourceMap::new();
    };
    let mut resources = match direction {
        IoDirection::Input => def.input.clone(),
        IoDirection::Output => def.output.clone(),
    };
    match &building.capability {
        Capability::Market(market_data) => match direction {
            IoDirection::Input => {
                for res in &market_data.sell_resources {
                    resources.insert(res.clone(), 1.0);
                }
            }
            IoDirection::Output => {
                for res in &market_data.sell_resources {
                    if let Some(buy) = market_data.available_resources.get(res) {
                        let ratio = market::buy_amount(
                            1.0,
                            market::market_price(ctx.defs, state, tile, res),
                            market::market_price(ctx.defs, state, tile, buy),
                        );
                        resources.insert(buy.clone(), ratio);
                    }
                }
            }
        },
        Capability::Clone(clone_data) => {
            if let Some(res) = &clone_data.input_resource {
                let amount = match direction {
                    IoDirection::Input => 1.0,
                    IoDirection::Output => 2.0,
                };
                resources.insert(res.clone(), amount);
            }
        }
        _ => {}
    }
    if direction == IoDirection::Input {
        if let Some(imports) = building.resource_imports() {
            // Imports are flat per-cycle amounts, untouched by level and multipliers.
            return imports
                .resource_imports
                .iter()
                .map(|(res, import)| (res.clone(), import.per_cycle))
                .collect();
        }
    }
    let mut scale = building.level as f64;
    if flags.contains(IoFlags::CAPACITY) {
        scale *= building.capacity;
    }
    if flags.contains(IoFlags::MULTIPLIER) {
        let category = match direction {
            IoDirection::Input => MultiplierCategory::Input,
            IoDirection::Output => MultiplierCategory::Output,
        };
        scale *= total_multiplier_for(ctx, state, tile, category, 1.0);
    }
    for value in resources.values_mut() {
        *value *= scale;
    }
    resources
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Storage {
    pub base: f64,
    pub multiplier: f64,
    pub total: f64,
    pub used: f64,
}

pub fn resource_import_capacity(level: u32, multiplier: f64) -> f64 {
    multiplier * level as f64 * 10.0
}

pub fn storage_for(ctx: &SystemContext<'_>, state: &GameState, tile: Tile) -> Storage {
    let Some(building) = state.building(tile) else {
        return Storage {
            base: 0.0,
            multiplier: 1.0,
            total: 0.0,
            used: 0.0,
        };
    };
    let used = storage_required(ctx.defs, &building.resources);
    let multiplier = total_multiplier_for(ctx, state, tile, MultiplierCategory::Storage, 1.0);
    let level = building.level;
    let base = match &building.capability {
        Capability::Market(_) => level as f64 * STORAGE_TO_PRODUCTION * 10.0,
        Capability::Warehouse { .. } => {
            resource_import_capacity(level, 1.0) * STORAGE_TO_PRODUCTION * 10.0
        }
        Capability::Caravansary(_) | Capability::ResourceImport(_) => {
            resource_import_capacity(level, 1.0) * STORAGE_TO_PRODUCTION
        }
        Capability::Plain | Capability::Clone(_) => {
            let input = building_io(ctx, state, tile, IoDirection::Input, IoFlags::MULTIPLIER);
            let output = building_io(ctx, state, tile, IoDirection::Output, IoFlags::MULTIPLIER);
            60.0 * storage_required(ctx.defs, &input)
                + STORAGE_TO_PRODUCTION * storage_required(ctx.defs, &output)
        }
    };
    Storage {
        base,
        multiplier,
        total: base * multiplier,
        used,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerRequirement {
    pub raw_output: f64,
    pub multiplier: f64,
    pub output: f64,
}

/// Workers needed to run the building, counting only the outputs `counts` accepts.
pub fn workers_for(
    ctx: &SystemContext<'_>,
    state: &GameState,
    tile: Tile,
    counts: impl Fn(&str) -> bool,
) -> WorkerRequirement {
    let output = building_io(ctx, state, tile, IoDirection::Output, IoFlags::CAPACITY);
    let raw_output: f64 = output
        .iter()
        .filter(|(res, _)| counts(res))
        .map(|(_, v)| *v)
        .sum();
    let multiplier = total_multiplier_for(ctx, state, tile, MultiplierCategory::Worker, 1.0);
    let multiplier = if multiplier > EPS { multiplier } else { 1.0 };
    WorkerRequirement {
        raw_output,
        multiplier,
        output: (raw_output / multiplier).ceil(),
    }
}

/// Workers for everything except the worker output itself.
pub fn production_workers(ctx: &SystemContext<'_>, state: &GameState, tile: Tile) -> f64 {
    workers_for(ctx, state, tile, |res| res != WORKER).output
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuilderCapacity {
    pub multiplier: f64,
    pub base: f64,
    pub total: f64,
}

pub fn builder_capacity(ctx: &SystemContext<'_>, state: &GameState, tile: Tile) -> BuilderCapacity {
    let multiplier = ctx.tick.current().global(GlobalBucket::BuilderCapacity)
        + total_multiplier_for(ctx, state, tile, MultiplierCategory::Worker, 0.0);
    let base = match state.building(tile) {
        Some(b) if ctx.defs.is_world_wonder(&b.kind) => {
            let (tech, age) = ctx.defs.tech_and_age_index(&b.kind);
            (5f64.powi(age as i32) + tech as f64 * 2.0).round()
        }
        Some(b) => b.level.max(1) as f64,
        None => 0.0,
    };
    BuilderCapacity {
        multiplier,
        base,
        total: multiplier * base,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstructionProgress {
    pub percent: f64,
    /// `None` when nothing is being delivered.
    pub seconds_left: Option<u64>,
}

pub fn building_percentage(
    ctx: &SystemContext<'_>,
    state: &GameState,
    tile: Tile,
) -> ConstructionProgress {
    let Some(building) = state.building(tile) else {
        return ConstructionProgress {
            percent: 0.0,
            seconds_left: None,
        };
    };
    if building.is_completed() {
        return ConstructionProgress {
            percent: 1.0,
            seconds_left: Some(0),
        };
    }
    let cost = ctx
        .costs
        .building_cost(ctx.defs, &building.kind, building.level);
    let mut total_cost = 0.0;
    let mut in_storage = 0.0;
    for (res, amount) in cost.iter() {
        total_cost += amount;
        in_storage += building.amount(res).clamp(0.0, *amount);
    }
    if total_cost <= EPS {
        return ConstructionProgress {
            percent: 1.0,
            seconds_left: Some(0),
        };
    }
    let throughput = builder_capacity(ctx, state, tile).total;
    let seconds_left = if throughput > EPS {
        Some(((total_cost - in_storage) / throughput).ceil() as u64)
    } else {
        None
    };
    ConstructionProgress {
        percent: in_storage / total_cost,
        seconds_left,
    }
}

pub fn current_priority(state: &GameState, building: &Building) -> u32 {
    if !has_feature(state, Feature::BuildingPriority) {
        return crate::tile::DEFAULT_PRIORITY;
    }
    if building.is_completed() {
        clamp_priority(building.production_priority)
    } else {
        clamp_priority(building.construction_priority)
    }
}

/// Stockpile capacity and max multiple in effect, falling back to defaults until unlocked.
pub fn stockpile(state: &GameState, building: &Building) -> (f64, f64) {
    if has_feature(state, Feature::Stockpile) {
        (
            building.stockpile_capacity as f64,
            building.stockpile_max_limit(),
        )
    } else {
        (
            crate::tile::DEFAULT_STOCKPILE_CAPACITY as f64,
            crate::tile::DEFAULT_STOCKPILE_MAX as f64,
        )
    }
}

pub fn input_mode(state: &GameState, building: &Building) -> (InputMode, Option<u32>) {
    if !has_feature(state, Feature::InputMode) {
        return (InputMode::Distance, None);
    }
    // Managed imports only pull from the neighborhood they are sized for.
    let managed = building.is_completed()
        && building
            .resource_imports()
            .map(|ri| ri.options.contains(ResourceImportOptions::MANAGED_IMPORT))
            .unwrap_or(false);
    if managed {
        (building.input_mode, Some(crate::tile::MANAGED_IMPORT_RANGE))
    } else {
        (building.input_mode, building.max_input_distance)
    }
}

/// The headquarter, which banks science. Looked up from last tick's registry first.
pub fn headquarter(ctx: &SystemContext<'_>, state: &GameState) -> Option<Tile> {
    let is_hq = |kind: &str| ctx.defs.special(kind) == Some(BuildingSpecial::Hq);
    ctx.tick
        .current()
        .special_buildings
        .iter()
        .find(|(kind, tile)| is_hq(kind) && state.building(**tile).is_some())
        .map(|(_, tile)| *tile)
        .or_else(|| {
            state
                .buildings()
                .find(|(_, b)| b.is_completed() && is_hq(&b.kind))
                .map(|(tile, _)| tile)
        })
}

/// Unused import capacity: total capacity minus what is already committed per cycle.
pub fn resource_import_idle_capacity(ctx: &SystemContext<'_>, state: &GameState, tile: Tile) -> f64 {
    let Some(building) = state.building(tile) else {
        return 0.0;
    };
    let Some(imports) = building.resource_imports() else {
        return 0.0;
    };
    let multiplier = total_multiplier_for(ctx, state, tile, MultiplierCategory::Output, 1.0);
    let committed: f64 = imports.resource_imports.values().map(|i| i.per_cycle).sum();
    resource_import_capacity(building.level, multiplier) - committed
}

/// How much of `res` the source may hand over to `target` without starving itself.
pub fn available_resource(
    ctx: &SystemContext<'_>,
    state: &GameState,
    source: Tile,
    target: Tile,
    res: &str,
) -> f64 {
    let Some(building) = state.building(source) else {
        return 0.0;
    };
    let stored = building.amount(res);
    if stored <= 0.0 {
        return 0.0;
    }
    if let Some(imports) = building.resource_imports() {
        let same_type = state
            .building(target)
            .map(|b| b.kind == building.kind)
            .unwrap_or(false);
        if same_type && !imports.options.contains(ResourceImportOptions::EXPORT_TO_SAME_TYPE) {
            return 0.0;
        }
        if let Some(import) = imports.resource_imports.get(res) {
            if !imports.options.contains(ResourceImportOptions::EXPORT_BELOW_CAP) {
                return (stored - import.cap).max(0.0);
            }
        }
        return stored;
    }
    let input = building_io(ctx, state, source, IoDirection::Input, IoFlags::ALL);
    match input.get(res) {
        Some(per_cycle) => {
            let (capacity, max) = stockpile(state, building);
            let reserved = (max + capacity) * per_cycle;
            if reserved.is_infinite() {
                0.0
            } else {
                (stored - reserved).max(0.0)
            }
        }
        None => stored,
    }
}

pub fn has_required_deposit(ctx: &SystemContext<'_>, state: &GameState, tile: Tile) -> bool {
    let Some(data) = state.tiles.get(&tile) else {
        return false;
    };
    let Some(building) = data.building.as_ref() else {
        return false;
    };
    match ctx.defs.building(&building.kind) {
        Some(def) => def.deposit.iter().all(|d| data.deposit.contains(d)),
        None => true,
    }
}

pub fn power_required(electrification: u32) -> f64 {
    4f64.powi(electrification as i32).round()
}

pub fn can_be_electrified(defs: &Definitions, kind: &str) -> bool {
    defs.building(kind).map(|b| b.power).unwrap_or(false)
}

/// Banking grants extra storage to high level buildings.
pub fn banking_applies(state: &GameState, building: &Building) -> bool {
    state.has_tech("Banking") && building.level >= BANKING_LEVEL
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScienceFromWorkers {
    pub workers_after_happiness: f64,
    pub workers_busy: f64,
    pub from_idle: f64,
    pub from_busy: f64,
    pub total: f64,
}

pub fn science_from_workers(tick: &TickEngine) -> ScienceFromWorkers {
    let current = tick.current();
    let available = current.workers_available.get(WORKER).copied().unwrap_or(0.0);
    let workers_after_happiness = (available * current.worker_percentage()).floor();
    let workers_busy = current.workers_used.get(WORKER).copied().unwrap_or(0.0);
    let idle = (workers_after_happiness - workers_busy).max(0.0);
    let from_idle = current.global(GlobalBucket::SciencePerIdleWorker) * idle;
    let from_busy = current.global(GlobalBucket::SciencePerBusyWorker) * workers_busy;
    ScienceFromWorkers {
        workers_after_happiness,
        workers_busy,
        from_idle,
        from_busy,
        total: from_idle + from_busy,
    }
}
