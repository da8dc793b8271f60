use crate::building_logic::{
    available_resource, building_io, resource_import_capacity, resource_import_idle_capacity,
    storage_for, total_multiplier_for,
};
use crate::cache::{IoDirection, IoFlags};
use crate::definitions::{Resource, ResourceMap, WORKER};
use crate::engine::SystemContext;
use crate::grid::Tile;
use crate::tick::{GlobalBucket, MultiplierCategory};
use crate::tile::{ResourceImport, WarehouseOptions, MANAGED_IMPORT_RANGE};
use crate::transport::{add_transportation, fuel_for};
use crate::world::GameState;

/// Pull surplus from nearby buildings whose storage is full. Returns whether anything moved.
pub fn tick_warehouse_autopilot(ctx: &mut SystemContext<'_>, state: &mut GameState, tile: Tile) -> bool {
    let Some(options) = state.building(tile).and_then(|b| b.warehouse_options()) else {
        return false;
    };
    let respect_cap = options.contains(WarehouseOptions::AUTOPILOT_RESPECT_CAP);

    let mut capacity = resource_import_idle_capacity(ctx, state, tile);
    let per_worker = total_multiplier_for(ctx, state, tile, MultiplierCategory::Worker, 1.0)
        + ctx.tick.current().global(GlobalBucket::TransportCapacity);
    let workers = ctx.tick.available_workers(WORKER);
    if per_worker > 0.0 && (capacity / per_worker).ceil() > workers {
        capacity = workers * per_worker;
    }
    let storage = storage_for(ctx, state, tile);
    capacity = capacity.min(storage.total - storage.used).max(0.0);
    if capacity <= 0.0 {
        return false;
    }

    let mut sources: Vec<Tile> = ctx
        .cache
        .storage_full(ctx.tick.current())
        .iter()
        .copied()
        .filter(|from| *from != tile)
        .collect();
    sources.sort_by_key(|from| (state.grid.distance(*from, tile), *from));

    let mut transported = false;
    for from in sources {
        let candidates = candidates(ctx, state, from);
        let distance = state.grid.distance(from, tile);
        let upgraded = if distance <= 1 { f64::INFINITY } else { per_worker };
        for (res, stock) in candidates {
            let exportable = available_resource(ctx, state, from, tile, &res);
            let mut amount = stock.min(exportable).min(capacity);
            if respect_cap {
                match cap_headroom(ctx, state, tile, &res) {
                    Some(headroom) => amount = amount.min(headroom),
                    None => continue,
                }
            }
            if amount <= 0.0 {
                continue;
            }
            let available = ctx.tick.available_workers(WORKER);
            if available <= 0.0 {
                return transported;
            }
            let mut fuel = fuel_for(amount, upgraded);
            if fuel > available {
                amount = amount * available / fuel;
                fuel = available;
            }
            add_transportation(ctx, state, &res, amount, fuel, from, tile);
            transported = true;
            capacity -= amount;
            if capacity <= 0.0 {
                return transported;
            }
        }
    }
    transported
}

/// Produced resources the source holds, largest stock first.
fn candidates(ctx: &SystemContext<'_>, state: &GameState, from: Tile) -> Vec<(Resource, f64)> {
    let Some(source) = state.building(from) else {
        return Vec::new();
    };
    let output = building_io(ctx, state, from, IoDirection::Output, IoFlags::NONE);
    let mut candidates: Vec<(Resource, f64)> = source
        .resources
        .iter()
        .filter(|(res, amount)| {
            **amount > 0.0 && output.contains_key(*res) && ctx.defs.is_transportable(res)
        })
        .map(|(res, amount)| (res.clone(), *amount))
        .collect();
    candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    candidates
}

/// Room left under the warehouse's own import cap. `None` for resources it does not import.
fn cap_headroom(ctx: &SystemContext<'_>, state: &GameState, tile: Tile, res: &str) -> Option<f64> {
    let building = state.building(tile)?;
    let import = building.resource_imports()?.resource_imports.get(res)?;
    let have = building.amount(res) + ctx.cache.amount_in_transit(state, tile, res);
    Some((import.cap - have).max(0.0))
}

/// Resize a managed import building's imports to what its working neighbors produce.
pub fn update_managed_imports(ctx: &mut SystemContext<'_>, state: &mut GameState, tile: Tile) {
    let Some(building) = state.building(tile) else {
        return;
    };
    let output_multiplier = total_multiplier_for(ctx, state, tile, MultiplierCategory::Output, 1.0);
    let capacity = resource_import_capacity(building.level, output_multiplier);
    let storage = storage_for(ctx, state, tile).total;

    let current = ctx.tick.current();
    let mut produced = ResourceMap::new();
    for neighbor in state.grid.tiles_in_range(tile, MANAGED_IMPORT_RANGE) {
        let working = state
            .building(neighbor)
            .map(|b| b.is_completed() && !current.not_producing_reasons.contains_key(&neighbor))
            .unwrap_or(false);
        if !working {
            continue;
        }
        let output = building_io(ctx, state, neighbor, IoDirection::Output, IoFlags::ALL);
        for (res, value) in output.iter() {
            if ctx.defs.is_transportable(res) && *value > 0.0 {
                *produced.entry(res.clone()).or_insert(0.0) += value;
            }
        }
    }
    let total: f64 = produced.values().sum();
    if total <= 0.0 {
        return;
    }
    let per_capacity = capacity / total;
    let per_storage = storage / total;
    if let Some(imports) = state.building_mut(tile).and_then(|b| b.resource_imports_mut()) {
        imports.resource_imports = produced
            .into_iter()
            .map(|(res, value)| {
                let import = ResourceImport {
                    per_cycle: (per_capacity * value).floor(),
                    cap: (per_storage * value).floor(),
                };
                (res, import)
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::Definitions;
    use crate::engine::{Engine, EngineBuilder, EngineSettings};
    use crate::grid::Grid;
    use crate::tick::NotProducingReason;
    use crate::tile::{Building, ResourceImportOptions};

    fn engine() -> Engine {
        EngineBuilder::new(EngineSettings::new("autopilot"), Definitions::builtin().unwrap()).build()
    }

    fn place(state: &mut GameState, engine: &Engine, tile: Tile, kind: &str) {
        let def = engine.definitions().building(kind).unwrap();
        state.tiles.get_mut(&tile).unwrap().building = Some(Building::completed(kind, def, 1));
    }

    fn autopilot_state(engine: &Engine, wheat: f64) -> (GameState, Tile, Tile) {
        let mut state = GameState::new(Grid::new(6, 6));
        state.unlocked_tech.insert("Machinery".into());
        let warehouse = Tile::new(2, 2);
        let farm = Tile::new(3, 2);
        place(&mut state, engine, warehouse, "Warehouse");
        place(&mut state, engine, farm, "WheatFarm");
        state.building_mut(farm).unwrap().add_resource("Wheat", wheat);
        if let Some(crate::tile::Capability::Warehouse {
            warehouse_options, ..
        }) = state.building_mut(warehouse).map(|b| &mut b.capability)
        {
            *warehouse_options = WarehouseOptions::AUTOPILOT;
        }
        (state, warehouse, farm)
    }

    fn prime(ctx: &mut SystemContext<'_>, workers: f64, full: Tile) {
        ctx.tick.next_mut().add_workers(WORKER, workers);
        ctx.tick
            .next_mut()
            .set_reason(full, NotProducingReason::StorageFull);
        ctx.tick.swap();
        ctx.cache.clear();
    }

    #[test]
    fn test_adjacent_autopilot_moves_idle_capacity_for_one_worker() {
        let mut engine = engine();
        let (mut state, warehouse, farm) = autopilot_state(&engine, 3600.0);
        let moved = engine.with_context(|ctx| {
            prime(ctx, 20.0, farm);
            let moved = tick_warehouse_autopilot(ctx, &mut state, warehouse);
            assert_eq!(ctx.tick.available_workers(WORKER), 19.0);
            moved
        });
        assert!(moved);
        let flights: Vec<_> = state.transports().collect();
        assert_eq!(flights.len(), 1);
        assert_eq!(flights[0].amount, 10.0);
        assert_eq!(flights[0].fuel_amount, 1.0);
        assert_eq!(flights[0].from, farm);
        assert_eq!(state.building(farm).unwrap().amount("Wheat"), 3590.0);
    }

    #[test]
    fn test_small_stock_moves_everything() {
        let mut engine = engine();
        let (mut state, warehouse, farm) = autopilot_state(&engine, 4.0);
        engine.with_context(|ctx| {
            prime(ctx, 20.0, farm);
            tick_warehouse_autopilot(ctx, &mut state, warehouse);
        });
        let flight = state.transports().next().unwrap();
        assert_eq!(flight.amount, 4.0);
    }

    #[test]
    fn test_capacity_limited_by_workers() {
        let mut engine = engine();
        let (mut state, warehouse, farm) = autopilot_state(&engine, 3600.0);
        engine.with_context(|ctx| {
            prime(ctx, 3.0, farm);
            tick_warehouse_autopilot(ctx, &mut state, warehouse);
        });
        assert_eq!(state.transports().next().unwrap().amount, 3.0);
    }

    #[test]
    fn test_respect_cap() {
        let mut engine = engine();
        let (mut state, warehouse, farm) = autopilot_state(&engine, 3600.0);
        if let Some(b) = state.building_mut(warehouse) {
            if let crate::tile::Capability::Warehouse {
                imports,
                warehouse_options,
            } = &mut b.capability
            {
                *warehouse_options =
                    WarehouseOptions::AUTOPILOT.with(WarehouseOptions::AUTOPILOT_RESPECT_CAP);
                imports.resource_imports.insert(
                    "Wheat".into(),
                    ResourceImport {
                        per_cycle: 0.0,
                        cap: 6.0,
                    },
                );
            }
            b.add_resource("Wheat", 4.0);
        }
        engine.with_context(|ctx| {
            prime(ctx, 20.0, farm);
            tick_warehouse_autopilot(ctx, &mut state, warehouse);
        });
        assert_eq!(state.transports().next().unwrap().amount, 2.0);
    }

    #[test]
    fn test_respect_cap_skips_resources_not_imported() {
        let mut engine = engine();
        let (mut state, warehouse, farm) = autopilot_state(&engine, 3600.0);
        if let Some(crate::tile::Capability::Warehouse {
            warehouse_options, ..
        }) = state.building_mut(warehouse).map(|b| &mut b.capability)
        {
            *warehouse_options =
                WarehouseOptions::AUTOPILOT.with(WarehouseOptions::AUTOPILOT_RESPECT_CAP);
        }
        let moved = engine.with_context(|ctx| {
            prime(ctx, 20.0, farm);
            tick_warehouse_autopilot(ctx, &mut state, warehouse)
        });
        assert!(!moved);
        assert_eq!(state.transports().count(), 0);
        assert_eq!(state.building(farm).unwrap().amount("Wheat"), 3600.0);
    }

    #[test]
    fn test_source_keeps_its_reserved_input() {
        let mut engine = engine();
        let (mut state, warehouse, farm) = autopilot_state(&engine, 0.0);
        state.tiles.get_mut(&farm).unwrap().building = None;
        let factory = Tile::new(3, 2);
        place(&mut state, &engine, factory, "CloneFactory");
        {
            let b = state.building_mut(factory).unwrap();
            b.clone_data_mut().unwrap().input_resource = Some("Wheat".into());
            b.add_resource("Wheat", 8.0);
        }
        engine.with_context(|ctx| {
            prime(ctx, 20.0, factory);
            tick_warehouse_autopilot(ctx, &mut state, warehouse);
        });
        // One cycle of input times (stockpile max 5 + capacity 1) stays behind.
        let flight = state.transports().next().unwrap();
        assert_eq!(flight.amount, 2.0);
        assert_eq!(state.building(factory).unwrap().amount("Wheat"), 6.0);
    }

    #[test]
    fn test_managed_import_splits_capacity_by_output() {
        let mut engine = engine();
        let mut state = GameState::new(Grid::new(8, 8));
        let warehouse = Tile::new(3, 3);
        place(&mut state, &engine, warehouse, "Warehouse");
        place(&mut state, &engine, Tile::new(4, 3), "WheatFarm");
        place(&mut state, &engine, Tile::new(2, 3), "WheatFarm");
        place(&mut state, &engine, Tile::new(3, 4), "FlourMill");
        if let Some(ri) = state
            .building_mut(warehouse)
            .and_then(|b| b.resource_imports_mut())
        {
            ri.options = ResourceImportOptions::MANAGED_IMPORT;
        }
        engine.with_context(|ctx| {
            ctx.tick.swap();
            ctx.cache.clear();
            update_managed_imports(ctx, &mut state, warehouse);
        });
        let imports = &state.building(warehouse).unwrap().resource_imports().unwrap().resource_imports;
        // Wheat 2 + Flour 1 share a capacity of 10 and storage of 360000.
        assert_eq!(imports["Wheat"].per_cycle, 6.0);
        assert_eq!(imports["Flour"].per_cycle, 3.0);
        assert_eq!(imports["Wheat"].cap, 240000.0);
        assert_eq!(imports["Flour"].cap, 120000.0);
    }
}
