//! Moving goods between tiles.
//!
//! Transports draw fuel from the shared worker pool when they are dispatched and again every
//! tick they are in flight. A transport that cannot pay stalls in place and retries next tick.

use tracing::warn;

use crate::building_logic::{self, has_feature, storage_for};
use crate::definitions::{Feature, WORKER};
use crate::engine::SystemContext;
use crate::grid::{Grid, Tile};
use crate::tick::{FreeTransportZone, GlobalBucket, TickEngine};
use crate::tile::{Capability, InputMode};
use crate::world::{GameState, Transportation};

/// Workers needed to move `amount` at `capacity` per worker. Never less than one.
pub fn fuel_for(amount: f64, capacity: f64) -> f64 {
    if capacity.is_infinite() || capacity <= 0.0 {
        return 1.0;
    }
    (amount / capacity).ceil().max(1.0)
}

fn is_warehouse(state: &GameState, tile: Tile) -> bool {
    matches!(
        state.building(tile).map(|b| &b.capability),
        Some(Capability::Warehouse { .. })
    )
}

/// Transport capacity per worker between two tiles.
pub fn transport_capacity(
    ctx: &SystemContext<'_>,
    state: &GameState,
    worker_capacity: f64,
    from: Tile,
    to: Tile,
) -> f64 {
    if has_feature(state, Feature::WarehouseUpgrade)
        && (is_warehouse(state, from) || is_warehouse(state, to))
        && state.grid.distance(from, to) <= 1
    {
        return f64::INFINITY;
    }
    worker_capacity + ctx.tick.current().global(GlobalBucket::TransportCapacity)
}

fn sorted_sources(ctx: &SystemContext<'_>, state: &GameState, res: &str, target: Tile) -> Vec<Tile> {
    let Some(tiles) = ctx.tick.current().resources_by_tile.get(res) else {
        return Vec::new();
    };
    let (mode, max_distance) = state
        .building(target)
        .map(|b| building_logic::input_mode(state, b))
        .unwrap_or((InputMode::Distance, None));
    let grid = &state.grid;
    let mut sources: Vec<(Tile, u32, f64)> = tiles
        .iter()
        .filter(|tile| **tile != target)
        .map(|tile| {
            let distance = grid.distance(*tile, target);
            let key = match mode {
                InputMode::Distance => 0.0,
                InputMode::Amount => state.building(*tile).map(|b| b.amount(res)).unwrap_or(0.0),
                InputMode::StoragePercentage => {
                    let storage = storage_for(ctx, state, *tile);
                    if storage.total > 0.0 {
                        storage.used / storage.total
                    } else {
                        0.0
                    }
                }
            };
            (*tile, distance, key)
        })
        .filter(|(_, distance, _)| max_distance.map_or(true, |max| *distance <= max))
        .collect();
    sources.sort_by(|a, b| match mode {
        InputMode::Distance => a.1.cmp(&b.1).then(a.0.cmp(&b.0)),
        InputMode::Amount | InputMode::StoragePercentage => {
            b.2.total_cmp(&a.2).then(a.1.cmp(&b.1)).then(a.0.cmp(&b.0))
        }
    });
    sources.into_iter().map(|(tile, _, _)| tile).collect()
}

fn produces(ctx: &SystemContext<'_>, kind: &str, res: &str) -> bool {
    ctx.defs
        .building(kind)
        .map(|def| def.output.contains_key(res))
        .unwrap_or(false)
}

/// Pull up to `amount` of `res` towards `target` from the tiles holding it, ordered by the
/// target's input mode. Returns the amount that could not be dispatched.
pub fn transport_resource(
    ctx: &mut SystemContext<'_>,
    state: &mut GameState,
    res: &str,
    amount: f64,
    worker_capacity: f64,
    target: Tile,
) -> f64 {
    let mut amount_left = amount;
    if ctx.tick.available_workers(WORKER) <= 0.0 {
        return amount_left;
    }
    let clone_target = state
        .building(target)
        .map(|b| b.is_completed() && b.clone_data().is_some())
        .unwrap_or(false);
    for source in sorted_sources(ctx, state, res, target) {
        match state.building(source) {
            Some(b) if b.is_completed() => {
                // Clone factories only take from buildings that make the resource.
                if clone_target && !produces(ctx, &b.kind, res) {
                    continue;
                }
            }
            _ => continue,
        }
        let available = building_logic::available_resource(ctx, state, source, target, res);
        if available <= 0.0 {
            continue;
        }
        let capacity = transport_capacity(ctx, state, worker_capacity, source, target);
        let fuel_left = ctx.tick.available_workers(WORKER);
        let wanted = available.min(amount_left);
        let fuel = fuel_for(wanted, capacity);
        if fuel_left >= fuel {
            add_transportation(ctx, state, res, wanted, fuel, source, target);
            amount_left -= wanted;
            if amount_left <= 0.0 {
                return 0.0;
            }
        } else if fuel_left > 0.0 {
            // Short on workers: send what the remaining fuel can carry, then stop.
            let partial = wanted * fuel_left / fuel;
            add_transportation(ctx, state, res, partial, fuel_left, source, target);
            return amount_left - partial;
        } else {
            return amount_left;
        }
    }
    amount_left
}

/// Dispatch one transport: take the goods from the source, pay the first tick of fuel and
/// queue the record at the destination.
pub fn add_transportation(
    ctx: &mut SystemContext<'_>,
    state: &mut GameState,
    res: &str,
    amount: f64,
    fuel_amount: f64,
    from: Tile,
    to: Tile,
) {
    if let Some(source) = state.building_mut(from) {
        let entry = source.resources.entry(res.to_string()).or_insert(0.0);
        if *entry + 1e-9 < amount {
            warn!(tile = %from, resource = res, have = *entry, amount, "source short for transport");
        }
        *entry = (*entry - amount).max(0.0);
    }
    ctx.tick.use_workers(WORKER, fuel_amount, None);
    state.transport_id += 1;
    let transport = Transportation {
        id: state.transport_id,
        from,
        to,
        resource: res.to_string(),
        amount,
        ticks_required: state.grid.distance(from, to),
        ticks_spent: 0,
        fuel: WORKER.to_string(),
        fuel_amount,
        current_fuel_amount: fuel_amount,
        has_enough_fuel: true,
    };
    state.transportation.entry(to).or_default().push(transport);
    ctx.cache.record_transport(to, res, amount);
}

fn in_free_zone(grid: &Grid, zones: &[FreeTransportZone], transport: &Transportation) -> bool {
    if zones.is_empty() {
        return false;
    }
    let t = if transport.ticks_required == 0 {
        1.0
    } else {
        transport.ticks_spent as f32 / transport.ticks_required as f32
    };
    let position = grid.lerp(transport.from, transport.to, t);
    zones
        .iter()
        .any(|zone| position.distance_to(zone.center.to_hex()).unsigned_abs() <= zone.radius)
}

fn advance(
    tick: &mut TickEngine,
    storable_fuel: bool,
    free: bool,
    transport: &mut Transportation,
) {
    if storable_fuel {
        transport.ticks_spent += 1;
        transport.has_enough_fuel = true;
        return;
    }
    transport.current_fuel_amount = if free { 0.0 } else { transport.fuel_amount };
    if tick.available_workers(&transport.fuel) >= transport.current_fuel_amount {
        tick.use_workers(&transport.fuel, transport.current_fuel_amount, None);
        transport.ticks_spent += 1;
        transport.has_enough_fuel = true;
    } else {
        transport.has_enough_fuel = false;
    }
}

/// Advance every in-flight transport by one tick and deliver the ones that arrive.
pub fn tick_transportations(ctx: &mut SystemContext<'_>, state: &mut GameState) {
    let zones = ctx.tick.current().free_transport.clone();
    let grid = &state.grid;
    let mut arrived = Vec::new();
    for queue in state.transportation.values_mut() {
        let mut kept = Vec::with_capacity(queue.len());
        for mut transport in queue.drain(..) {
            let storable_fuel = ctx.defs.is_transportable(&transport.fuel);
            let free = in_free_zone(grid, &zones, &transport);
            advance(ctx.tick, storable_fuel, free, &mut transport);
            if transport.ticks_spent >= transport.ticks_required {
                arrived.push(transport);
            } else {
                kept.push(transport);
            }
        }
        *queue = kept;
    }
    state.transportation.retain(|_, queue| !queue.is_empty());
    for transport in arrived {
        deliver(state, transport);
    }
}

fn deliver(state: &mut GameState, transport: Transportation) {
    let Some(building) = state.building_mut(transport.to) else {
        warn!(
            id = transport.id,
            to = %transport.to,
            resource = %transport.resource,
            amount = transport.amount,
            "destination gone, dropping delivery"
        );
        return;
    };
    building.add_resource(&transport.resource, transport.amount);
    if let Some(clone) = building.clone_data_mut() {
        if clone.input_resource.as_deref() == Some(transport.resource.as_str()) {
            clone.transported_amount += transport.amount;
        }
    }
}

/// Order in-flight transports deterministically for inspection.
pub fn in_flight(state: &GameState) -> Vec<&Transportation> {
    let mut all: Vec<&Transportation> = state.transports().collect();
    all.sort_by_key(|t| t.id);
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::Definitions;
    use crate::engine::{Engine, EngineBuilder, EngineSettings};
    use crate::tile::Building;

    fn engine() -> Engine {
        EngineBuilder::new(EngineSettings::new("transport"), Definitions::builtin().unwrap()).build()
    }

    fn place(state: &mut GameState, engine: &Engine, tile: Tile, kind: &str, wood: f64) {
        let def = engine.definitions().building(kind).unwrap();
        let mut building = Building::completed(kind, def, 1);
        if wood > 0.0 {
            building.add_resource("Wood", wood);
        }
        state.tiles.get_mut(&tile).unwrap().building = Some(building);
    }

    fn prime(ctx: &mut SystemContext<'_>, workers: f64, wood_at: &[Tile]) {
        ctx.tick.next_mut().add_workers(WORKER, workers);
        ctx.tick
            .next_mut()
            .resources_by_tile
            .insert("Wood".to_string(), wood_at.to_vec());
        ctx.tick.swap();
        ctx.cache.clear();
    }

    #[test]
    fn test_fuel_is_at_least_one_worker() {
        assert_eq!(fuel_for(5.0, f64::INFINITY), 1.0);
        assert_eq!(fuel_for(0.5, 10.0), 1.0);
        assert_eq!(fuel_for(25.0, 10.0), 3.0);
    }

    #[test]
    fn test_nearest_source_first() {
        let mut engine = engine();
        let mut state = GameState::new(Grid::new(10, 10));
        let target = Tile::new(0, 0);
        let near = Tile::new(1, 0);
        let far = Tile::new(5, 0);
        place(&mut state, &engine, target, "Hut", 0.0);
        place(&mut state, &engine, near, "LoggingCamp", 3.0);
        place(&mut state, &engine, far, "LoggingCamp", 50.0);
        let left = engine.with_context(|ctx| {
            prime(ctx, 10.0, &[far, near]);
            transport_resource(ctx, &mut state, "Wood", 5.0, 1.0, target)
        });
        assert_eq!(left, 0.0);
        let flights = in_flight(&state);
        assert_eq!(flights.len(), 2);
        assert_eq!(flights[0].from, near);
        assert_eq!(flights[0].amount, 3.0);
        assert_eq!(flights[1].from, far);
        assert_eq!(flights[1].amount, 2.0);
        assert_eq!(flights[1].ticks_required, 5);
        assert_eq!(state.building(near).unwrap().amount("Wood"), 0.0);
    }

    #[test]
    fn test_partial_transport_when_fuel_is_short() {
        let mut engine = engine();
        let mut state = GameState::new(Grid::new(10, 10));
        let target = Tile::new(0, 0);
        let source = Tile::new(2, 0);
        place(&mut state, &engine, target, "Hut", 0.0);
        place(&mut state, &engine, source, "LoggingCamp", 100.0);
        let left = engine.with_context(|ctx| {
            prime(ctx, 2.0, &[source]);
            let left = transport_resource(ctx, &mut state, "Wood", 40.0, 10.0, target);
            assert_eq!(ctx.tick.available_workers(WORKER), 0.0);
            left
        });
        let flights = in_flight(&state);
        assert_eq!(flights.len(), 1);
        assert_eq!(flights[0].amount, 20.0);
        assert_eq!(flights[0].fuel_amount, 2.0);
        assert_eq!(left, 20.0);
    }

    #[test]
    fn test_no_workers_no_transport() {
        let mut engine = engine();
        let mut state = GameState::new(Grid::new(4, 4));
        let target = Tile::new(0, 0);
        let source = Tile::new(1, 0);
        place(&mut state, &engine, target, "Hut", 0.0);
        place(&mut state, &engine, source, "LoggingCamp", 10.0);
        let left = engine.with_context(|ctx| {
            prime(ctx, 0.0, &[source]);
            transport_resource(ctx, &mut state, "Wood", 5.0, 1.0, target)
        });
        assert_eq!(left, 5.0);
        assert!(state.transportation.is_empty());
    }

    #[test]
    fn test_stalled_transport_retries() {
        let mut engine = engine();
        let mut state = GameState::new(Grid::new(10, 10));
        let target = Tile::new(0, 0);
        let source = Tile::new(2, 0);
        place(&mut state, &engine, target, "Hut", 0.0);
        place(&mut state, &engine, source, "LoggingCamp", 10.0);
        engine.with_context(|ctx| {
            prime(ctx, 1.0, &[source]);
            transport_resource(ctx, &mut state, "Wood", 5.0, 10.0, target);
            // The dispatch used the only worker, so the first leg stalls.
            tick_transportations(ctx, &mut state);
        });
        let flight = in_flight(&state)[0].clone();
        assert!(!flight.has_enough_fuel);
        assert_eq!(flight.ticks_spent, 0);

        engine.with_context(|ctx| {
            prime(ctx, 1.0, &[]);
            tick_transportations(ctx, &mut state);
            prime(ctx, 1.0, &[]);
            tick_transportations(ctx, &mut state);
        });
        assert!(state.transportation.is_empty());
        assert_eq!(state.building(target).unwrap().amount("Wood"), 5.0);
    }

    #[test]
    fn test_missing_destination_drops_cargo() {
        let mut engine = engine();
        let mut state = GameState::new(Grid::new(4, 4));
        let target = Tile::new(0, 0);
        let source = Tile::new(1, 0);
        place(&mut state, &engine, target, "Hut", 0.0);
        place(&mut state, &engine, source, "LoggingCamp", 10.0);
        engine.with_context(|ctx| {
            prime(ctx, 5.0, &[source]);
            transport_resource(ctx, &mut state, "Wood", 5.0, 10.0, target);
        });
        state.tiles.get_mut(&target).unwrap().building = None;
        engine.with_context(|ctx| {
            prime(ctx, 5.0, &[]);
            tick_transportations(ctx, &mut state);
        });
        assert!(state.transportation.is_empty());
        assert_eq!(state.building(source).unwrap().amount("Wood"), 5.0);
    }

    #[test]
    fn test_clone_factory_only_pulls_from_producers() {
        let mut engine = engine();
        let mut state = GameState::new(Grid::new(10, 10));
        let factory = Tile::new(0, 0);
        let warehouse = Tile::new(1, 0);
        let farm = Tile::new(3, 0);
        place(&mut state, &engine, factory, "CloneFactory", 0.0);
        place(&mut state, &engine, warehouse, "Warehouse", 0.0);
        place(&mut state, &engine, farm, "WheatFarm", 0.0);
        if let Some(clone) = state.building_mut(factory).and_then(|b| b.clone_data_mut()) {
            clone.input_resource = Some("Wheat".into());
        }
        state.building_mut(warehouse).unwrap().add_resource("Wheat", 50.0);
        state.building_mut(farm).unwrap().add_resource("Wheat", 50.0);
        engine.with_context(|ctx| {
            ctx.tick.next_mut().add_workers(WORKER, 10.0);
            ctx.tick
                .next_mut()
                .resources_by_tile
                .insert("Wheat".to_string(), vec![warehouse, farm]);
            ctx.tick.swap();
            ctx.cache.clear();
            transport_resource(ctx, &mut state, "Wheat", 1.0, 1.0, factory);
        });
        let flights = in_flight(&state);
        assert_eq!(flights.len(), 1);
        assert_eq!(flights[0].from, farm);
        assert_eq!(state.building(warehouse).unwrap().amount("Wheat"), 50.0);
    }

    #[test]
    fn test_free_zone_costs_nothing() {
        let mut engine = engine();
        let mut state = GameState::new(Grid::new(10, 10));
        let target = Tile::new(0, 0);
        let source = Tile::new(2, 0);
        place(&mut state, &engine, target, "Hut", 0.0);
        place(&mut state, &engine, source, "LoggingCamp", 10.0);
        engine.with_context(|ctx| {
            prime(ctx, 1.0, &[source]);
            transport_resource(ctx, &mut state, "Wood", 5.0, 10.0, target);
        });
        engine.with_context(|ctx| {
            ctx.tick.next_mut().free_transport.push(FreeTransportZone {
                center: Tile::new(1, 0),
                radius: 2,
            });
            ctx.tick.swap();
            tick_transportations(ctx, &mut state);
            assert_eq!(ctx.tick.available_workers(WORKER), 0.0);
        });
        let flight = in_flight(&state)[0].clone();
        assert!(flight.has_enough_fuel);
        assert_eq!(flight.current_fuel_amount, 0.0);
        assert_eq!(flight.ticks_spent, 1);
    }
}
