//! Per-tile state machine: construction, upgrades and production.
//!
//! Buildings resolve in a fixed order (priority desc, tier asc, tile asc) and draw from the live
//! worker pool as they go, so earlier buildings can starve later ones.

mod autopilot;

pub use autopilot::{tick_warehouse_autopilot, update_managed_imports};

use tracing::info;

use crate::building_logic::{
    self, builder_capacity, building_io, building_value, current_priority, deduct_resources,
    filter_transportable, has_enough_resources, has_feature, storage_for, storage_required,
    total_multiplier_for, Storage,
};
use crate::cache::{IoDirection, IoFlags};
use crate::definitions::{Definitions, Feature, ResourceMap, POWER, SCIENCE, WORKER};
use crate::engine::SystemContext;
use crate::events::SimEvent;
use crate::grid::Tile;
use crate::market;
use crate::tick::{Multiplier, MultiplierCategory, NotProducingReason};
use crate::tile::{BuildingStatus, Capability, ResourceImportOptions, WarehouseOptions};
use crate::transport::transport_resource;
use crate::world::GameState;

/// Order in which buildings resolve this tick.
pub fn resolution_order(defs: &Definitions, state: &GameState) -> Vec<Tile> {
    let mut order: Vec<(u32, u32, Tile)> = state
        .buildings()
        .map(|(tile, b)| (current_priority(state, b), defs.building_tier(&b.kind), tile))
        .collect();
    order.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));
    order.into_iter().map(|(_, _, tile)| tile).collect()
}

pub fn tick_tiles(ctx: &mut SystemContext<'_>, state: &mut GameState) {
    for tile in resolution_order(ctx.defs, state) {
        tick_tile(ctx, state, tile);
    }
}

pub fn tick_tile(ctx: &mut SystemContext<'_>, state: &mut GameState, tile: Tile) {
    let Some(data) = state.tiles.get_mut(&tile) else {
        return;
    };
    let explored = data.explored;
    let Some(building) = data.building.as_mut() else {
        return;
    };
    if ctx.defs.is_natural_wonder(&building.kind) && !explored {
        return;
    }
    if building.desired_level > building.level {
        if building.status == BuildingStatus::Completed {
            building.status = BuildingStatus::Upgrading;
        }
    } else {
        building.desired_level = building.level;
    }
    if building.is_completed() {
        produce(ctx, state, tile);
    } else {
        construct(ctx, state, tile);
    }
}

fn construct(ctx: &mut SystemContext<'_>, state: &mut GameState, tile: Tile) {
    let Some(building) = state.building(tile) else {
        return;
    };
    let kind = building.kind.clone();
    let cost = ctx.costs.building_cost(ctx.defs, &kind, building.level);
    let builders = builder_capacity(ctx, state, tile).total;

    let mut completed = true;
    let mut short = Vec::new();
    for (res, amount) in cost.iter() {
        let arrived = state.building(tile).map(|b| b.amount(res)).unwrap_or(0.0);
        if arrived >= *amount {
            continue;
        }
        completed = false;
        let remaining = amount - arrived - ctx.cache.amount_in_transit(state, tile, res);
        if remaining > 0.0 {
            short.push((res.clone(), remaining));
        }
    }
    if !short.is_empty() {
        if ctx.tick.available_workers(WORKER) > 0.0 {
            ctx.tick.next_mut().clear_reason(tile);
            // Builder throughput is shared evenly by every resource still missing. Each run's
            // only cost is its transport fuel.
            let per_resource = builders / short.len() as f64;
            for (res, remaining) in short {
                transport_resource(ctx, state, &res, remaining.min(per_resource), per_resource, tile);
            }
        } else {
            ctx.tick
                .next_mut()
                .set_reason(tile, NotProducingReason::NotEnoughWorkers);
        }
    }
    if !completed {
        return;
    }

    let defaults = ctx.options.building_defaults.get(&kind).cloned();
    let Some(building) = state.building_mut(tile) else {
        return;
    };
    building.level += 1;
    deduct_resources(&mut building.resources, &cost);
    match building.status {
        BuildingStatus::Building => {
            building.status = BuildingStatus::Completed;
            if let Some(defaults) = defaults {
                defaults.apply(building);
            }
            info!(%tile, building = %kind, "construction complete");
            ctx.events.push(SimEvent::BuildingComplete {
                tile,
                building: kind,
            });
        }
        BuildingStatus::Upgrading if building.level >= building.desired_level => {
            building.status = BuildingStatus::Completed;
            info!(%tile, building = %kind, level = building.level, "upgrade complete");
            ctx.events.push(SimEvent::UpgradeComplete {
                tile,
                building: kind,
                level: building.level,
            });
        }
        _ => {}
    }
}

/// Registries, value and source index for a completed building.
fn record_completed(ctx: &mut SystemContext<'_>, state: &GameState, tile: Tile) {
    let Some(building) = state.building(tile) else {
        return;
    };
    let defs = ctx.defs;
    let mut value = building_value(ctx, building);
    let banking = building_logic::banking_applies(state, building);
    let next = ctx.tick.next_mut();
    if banking {
        next.add_tile_multiplier(
            tile,
            Multiplier {
                storage: 1.0,
                ..Default::default()
            },
            "Banking",
        );
    }
    if matches!(building.capability, Capability::Caravansary(_)) {
        next.player_trade_buildings.insert(tile);
    }
    if defs.is_special(&building.kind) {
        next.special_buildings.insert(building.kind.clone(), tile);
    }
    for (res, amount) in &building.resources {
        if *amount <= 0.0 {
            continue;
        }
        if defs.can_price(res) {
            value += defs.price(res) * amount;
        }
        next.resources_by_tile.entry(res.clone()).or_default().push(tile);
    }
    next.total_value += value;
}

fn produce(ctx: &mut SystemContext<'_>, state: &mut GameState, tile: Tile) {
    record_completed(ctx, state, tile);

    let Some(building) = state.building(tile) else {
        return;
    };
    let defs = ctx.defs;
    let Some(def) = defs.building(&building.kind) else {
        return;
    };
    if building.capability == Capability::Plain && def.input.is_empty() && def.output.is_empty() {
        return;
    }
    if !building_logic::has_required_deposit(ctx, state, tile) {
        ctx.tick
            .next_mut()
            .set_reason(tile, NotProducingReason::NotOnDeposit);
        return;
    }
    if building.capacity <= 0.0 {
        ctx.tick
            .next_mut()
            .set_reason(tile, NotProducingReason::TurnedOff);
        return;
    }

    let managed = building
        .resource_imports()
        .map(|ri| ri.options.contains(ResourceImportOptions::MANAGED_IMPORT))
        .unwrap_or(false);
    if managed {
        update_managed_imports(ctx, state, tile);
    }

    let storage = storage_for(ctx, state, tile);
    let mut has_transported = request_inputs(ctx, state, tile, &storage);

    let autopilot = state
        .building(tile)
        .and_then(|b| b.warehouse_options())
        .map(|o| o.contains(WarehouseOptions::AUTOPILOT))
        .unwrap_or(false);
    if autopilot && has_feature(state, Feature::WarehouseUpgrade) {
        has_transported |= tick_warehouse_autopilot(ctx, state, tile);
    }

    let Some(building) = state.building(tile) else {
        return;
    };
    if building.is_resource_import() {
        if !has_transported {
            ctx.tick
                .next_mut()
                .set_reason(tile, NotProducingReason::NoActiveTransports);
        }
        return;
    }
    if building.market().is_some() {
        trade(ctx, state, tile, &storage);
        return;
    }
    manufacture(ctx, state, tile, &storage);
}

/// Ask for the inputs this building wants stockpiled. Returns whether every configured input
/// is either on its way or already at its cap.
fn request_inputs(
    ctx: &mut SystemContext<'_>,
    state: &mut GameState,
    tile: Tile,
    storage: &Storage,
) -> bool {
    let Some(building) = state.building(tile) else {
        return false;
    };
    let input = filter_transportable(
        ctx.defs,
        &building_io(ctx, state, tile, IoDirection::Input, IoFlags::ALL),
    );
    let worker_capacity = total_multiplier_for(ctx, state, tile, MultiplierCategory::Worker, 1.0);
    let (stockpile_capacity, stockpile_max) = building_logic::stockpile(state, building);

    let mut requests = Vec::new();
    let mut active = false;
    for (res, per_cycle) in input.iter() {
        let amount = per_cycle * stockpile_capacity;
        if amount <= 0.0 {
            continue;
        }
        if storage.used + amount > storage.total {
            continue;
        }
        let max = match building.resource_imports() {
            Some(ri) => ri.resource_imports.get(res).map(|i| i.cap).unwrap_or(0.0),
            None => stockpile_max * amount,
        };
        let have = building.amount(res) + ctx.cache.amount_in_transit(state, tile, res);
        if have > max {
            active = true;
            continue;
        }
        requests.push((res.clone(), amount));
    }
    for (res, amount) in requests {
        let left = transport_resource(ctx, state, &res, amount, worker_capacity, tile);
        if left < amount {
            active = true;
        }
    }
    active
}

fn trade(ctx: &mut SystemContext<'_>, state: &mut GameState, tile: Tile, storage: &Storage) {
    let Some(building) = state.building(tile) else {
        return;
    };
    let Some(market_data) = building.market() else {
        return;
    };
    let output_multiplier = total_multiplier_for(ctx, state, tile, MultiplierCategory::Output, 1.0);
    let per_tick = building.capacity * building.level as f64 * output_multiplier;
    let mut trades = Vec::new();
    let mut used = storage.used;
    let mut storage_full = false;
    let mut stock = building.resources.clone();
    for sell in &market_data.sell_resources {
        let Some(buy) = market_data.available_resources.get(sell) else {
            continue;
        };
        let have = stock.get(sell).copied().unwrap_or(0.0);
        let amount = per_tick.min(have).max(0.0);
        if amount <= 0.0 {
            continue;
        }
        let bought = market::buy_amount(
            amount,
            market::market_price(ctx.defs, state, tile, sell),
            market::market_price(ctx.defs, state, tile, buy),
        );
        if used - amount + bought > storage.total {
            storage_full = true;
            continue;
        }
        used += bought - amount;
        *stock.entry(sell.clone()).or_insert(0.0) -= amount;
        *stock.entry(buy.clone()).or_insert(0.0) += bought;
        trades.push((sell.clone(), amount, buy.clone(), bought));
    }
    if storage_full {
        ctx.tick
            .next_mut()
            .set_reason(tile, NotProducingReason::StorageFull);
    }
    let Some(building) = state.building_mut(tile) else {
        return;
    };
    let mut total_bought = 0.0;
    for (sell, amount, buy, bought) in trades {
        deduct_resources(&mut building.resources, &ResourceMap::from([(sell, amount)]));
        building.add_resource(&buy, bought);
        total_bought += bought;
    }
    if total_bought > 0.0 {
        let kind = building.kind.clone();
        ctx.events.push(SimEvent::Floater {
            tile,
            amount: total_bought,
        });
        ctx.events.push(SimEvent::ProductionComplete {
            tile,
            building: kind,
        });
    }
}

fn manufacture(ctx: &mut SystemContext<'_>, state: &mut GameState, tile: Tile, storage: &Storage) {
    let defs = ctx.defs;
    let Some(building) = state.building(tile) else {
        return;
    };
    let kind = building.kind.clone();
    let input = filter_transportable(
        defs,
        &building_io(ctx, state, tile, IoDirection::Input, IoFlags::ALL),
    );
    let output = building_io(ctx, state, tile, IoDirection::Output, IoFlags::ALL);
    let workers = building_logic::production_workers(ctx, state, tile);

    // Clone factories only copy what was actually delivered, never their own output.
    let clone_input = building.clone_data().and_then(|clone| {
        let res = clone.input_resource.clone()?;
        let required = input.get(&res).copied().unwrap_or(0.0);
        let delivered = clone.transported_amount.min(building.amount(&res));
        Some((res, required, delivered))
    });
    if let Some((_, required, delivered)) = &clone_input {
        if delivered < required {
            ctx.tick
                .next_mut()
                .set_reason(tile, NotProducingReason::NotEnoughResources);
            return;
        }
    }

    let (stockpile_capacity, _) = building_logic::stockpile(state, building);
    let has_storage = output.is_empty()
        || storage.used
            + storage_required(defs, &output)
            + storage_required(defs, &input) * stockpile_capacity
            <= storage.total;
    let has_workers = ctx.tick.available_workers(WORKER) >= workers;
    let has_input = has_enough_resources(&building.resources, &input);

    if !has_workers {
        ctx.tick
            .next_mut()
            .set_reason(tile, NotProducingReason::NotEnoughWorkers);
        return;
    }
    if !has_input {
        ctx.tick
            .next_mut()
            .set_reason(tile, NotProducingReason::NotEnoughResources);
        return;
    }
    if !has_storage {
        // Storage only blocks what has to be stored; pool outputs still flow.
        let pooled: ResourceMap = output
            .iter()
            .filter(|(res, _)| !defs.is_transportable(res))
            .map(|(res, v)| (res.clone(), *v))
            .collect();
        if !pooled.is_empty() {
            let pooled_workers = building_logic::workers_for(ctx, state, tile, |res| {
                res != WORKER && !defs.is_transportable(res)
            })
            .output;
            ctx.tick.use_workers(WORKER, pooled_workers, Some(tile));
            if let Some(building) = state.building_mut(tile) {
                deduct_resources(&mut building.resources, &input);
            }
            let next = ctx.tick.next_mut();
            for (res, v) in &pooled {
                next.add_workers(res, *v);
            }
        }
        if pooled.len() < output.len() {
            ctx.tick
                .next_mut()
                .set_reason(tile, NotProducingReason::StorageFull);
        }
        return;
    }

    electrify(ctx, state, tile);

    ctx.tick.use_workers(WORKER, workers, Some(tile));
    let headquarter = building_logic::headquarter(ctx, state);
    let Some(building) = state.building_mut(tile) else {
        return;
    };
    deduct_resources(&mut building.resources, &input);
    if let Some((_, required, _)) = clone_input {
        if let Some(clone) = building.clone_data_mut() {
            clone.transported_amount = (clone.transported_amount - required).max(0.0);
        }
    }
    let mut stored = 0.0;
    let mut science = 0.0;
    for (res, v) in output.iter() {
        if !defs.is_transportable(res) {
            ctx.tick.next_mut().add_workers(res, *v);
        } else if res == SCIENCE && headquarter.is_some() {
            science += v;
        } else {
            building.add_resource(res, *v);
            stored += v;
        }
    }
    if science > 0.0 {
        if let Some(hq) = headquarter.and_then(|hq| state.building_mut(hq)) {
            hq.add_resource(SCIENCE, science);
        }
    }
    let amount = stored + science;
    if amount > 0.0 {
        ctx.events.push(SimEvent::Floater { tile, amount });
    }
    ctx.events.push(SimEvent::ProductionComplete {
        tile,
        building: kind,
    });
}

/// Spend power for the building's electrification level and schedule the bonus for next tick.
fn electrify(ctx: &mut SystemContext<'_>, state: &mut GameState, tile: Tile) {
    if !has_feature(state, Feature::Electricity) {
        return;
    }
    let defs = ctx.defs;
    let Some(building) = state.building_mut(tile) else {
        return;
    };
    if building.electrification == 0 || !building_logic::can_be_electrified(defs, &building.kind) {
        return;
    }
    building.electrification = building.electrification.min(building.level);
    let level = building.electrification;
    let required = building_logic::power_required(level);
    if ctx.tick.available_workers(POWER) < required {
        return;
    }
    ctx.tick.use_workers(POWER, required, Some(tile));
    let next = ctx.tick.next_mut();
    next.add_tile_multiplier(
        tile,
        Multiplier {
            input: level as f64,
            output: level as f64,
            ..Default::default()
        },
        "Electrification",
    );
    next.electrified.insert(tile, level);
}
