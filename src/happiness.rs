//! City-wide happiness and the worker percentage it feeds into the next tick.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::definitions::Definitions;
use crate::tick::{GlobalBucket, NotProducingReason, TickData};
use crate::world::GameState;

pub const HAPPINESS_MIN: f64 = -50.0;
pub const HAPPINESS_MAX: f64 = 50.0;
const AGE_BONUS: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Happiness {
    pub from_unlocked_tech: f64,
    pub from_unlocked_age: f64,
    pub from_building_types: f64,
    pub from_wonders: f64,
    pub from_highest_tier_building: f64,
    pub from_buildings: f64,
    pub from_global: f64,
    pub value: f64,
    pub worker_percentage: f64,
    pub normalized: f64,
}

pub fn worker_percentage(value: f64) -> f64 {
    (100.0 + 2.0 * value) / 100.0
}

fn is_well_stocked(reason: Option<&NotProducingReason>) -> bool {
    matches!(
        reason,
        None | Some(NotProducingReason::StorageFull) | Some(NotProducingReason::NotEnoughWorkers)
    )
}

/// Aggregate happiness from research, wonders and the building mix. Reads only `current`.
pub fn calculate_happiness(defs: &Definitions, state: &GameState, current: &TickData) -> Happiness {
    let from_unlocked_tech = state.unlocked_tech.len() as f64;
    let from_unlocked_age = state
        .unlocked_tech
        .iter()
        .filter_map(|t| defs.age_of_tech(t))
        .max()
        .map(|idx| AGE_BONUS * (idx as f64 + 1.0))
        .unwrap_or(0.0);

    let mut stocked_types = BTreeSet::new();
    let mut highest_tier = 0u32;
    let mut wonders = 0u32;
    let mut penalized = 0u32;
    for (tile, building) in state.buildings() {
        if defs.is_natural_wonder(&building.kind) {
            if state.is_explored(tile) {
                wonders += 1;
            }
            continue;
        }
        if !building.is_completed() {
            continue;
        }
        if defs.is_world_wonder(&building.kind) {
            wonders += 1;
            continue;
        }
        if defs.is_special(&building.kind) {
            continue;
        }
        let reason = current.not_producing_reasons.get(&tile);
        if is_well_stocked(reason) {
            stocked_types.insert(building.kind.as_str());
        }
        if reason.is_none() {
            highest_tier = highest_tier.max(defs.building_tier(&building.kind));
        }
        let exempt = defs
            .building(&building.kind)
            .map(|d| d.happiness_exempt)
            .unwrap_or(false)
            || current.happiness_exemptions.contains(&tile);
        if !exempt {
            penalized += 1;
        }
    }

    let from_building_types = stocked_types.len() as f64;
    let from_wonders = wonders as f64;
    let from_highest_tier_building = highest_tier as f64;
    let from_buildings = -(penalized as f64);
    let from_global = current.global(GlobalBucket::Happiness);
    let value = (from_unlocked_tech
        + from_unlocked_age
        + from_building_types
        + from_wonders
        + from_highest_tier_building
        + from_buildings
        + from_global)
        .clamp(HAPPINESS_MIN, HAPPINESS_MAX);
    Happiness {
        from_unlocked_tech,
        from_unlocked_age,
        from_building_types,
        from_wonders,
        from_highest_tier_building,
        from_buildings,
        from_global,
        value,
        worker_percentage: worker_percentage(value),
        normalized: (value - HAPPINESS_MIN) / (HAPPINESS_MAX - HAPPINESS_MIN),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Grid, Tile};
    use crate::tile::Building;

    fn place(state: &mut GameState, defs: &Definitions, tile: Tile, kind: &str) {
        let def = defs.building(kind).unwrap();
        state.tiles.get_mut(&tile).unwrap().building = Some(Building::completed(kind, def, 1));
    }

    #[test]
    fn test_worker_percentage_formula() {
        assert_eq!(worker_percentage(0.0), 1.0);
        assert_eq!(worker_percentage(50.0), 2.0);
        assert_eq!(worker_percentage(-50.0), 0.0);
    }

    #[test]
    fn test_counts_buildings_and_types() {
        let defs = Definitions::builtin().unwrap();
        let mut state = GameState::new(Grid::new(6, 6));
        place(&mut state, &defs, Tile::new(0, 0), "Headquarter");
        place(&mut state, &defs, Tile::new(1, 0), "WheatFarm");
        place(&mut state, &defs, Tile::new(2, 0), "WheatFarm");
        place(&mut state, &defs, Tile::new(3, 0), "FlourMill");
        let mut current = TickData::empty();
        current.set_reason(Tile::new(3, 0), NotProducingReason::NotEnoughResources);
        let h = calculate_happiness(&defs, &state, &current);
        assert_eq!(h.from_buildings, -3.0);
        assert_eq!(h.from_building_types, 1.0);
        assert_eq!(h.from_highest_tier_building, 1.0);
        assert_eq!(h.value, -1.0);
        assert!((h.worker_percentage - 0.98).abs() < 1e-9);
    }

    #[test]
    fn test_value_is_clamped() {
        let defs = Definitions::builtin().unwrap();
        let state = GameState::new(Grid::new(2, 2));
        let mut current = TickData::empty();
        current.add_global(GlobalBucket::Happiness, 500.0, "test");
        let h = calculate_happiness(&defs, &state, &current);
        assert_eq!(h.value, HAPPINESS_MAX);
        assert_eq!(h.normalized, 1.0);
    }

    #[test]
    fn test_research_and_age_bonus() {
        let defs = Definitions::builtin().unwrap();
        let mut state = GameState::new(Grid::new(2, 2));
        state.unlocked_tech.insert("Agriculture".into());
        state.unlocked_tech.insert("Banking".into());
        let h = calculate_happiness(&defs, &state, &TickData::empty());
        assert_eq!(h.from_unlocked_tech, 2.0);
        assert_eq!(h.from_unlocked_age, 20.0);
    }
}
