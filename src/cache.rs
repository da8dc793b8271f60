//! Per-tick memoization.
//!
//! Cleared at the start of every tick and whenever a command changes the map between ticks.
//! Values are shared behind `Rc` and never mutated once stored.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::definitions::{BuildingType, Resource, ResourceMap};
use crate::grid::Tile;
use crate::tick::{NotProducingReason, TickData};
use crate::world::GameState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoDirection {
    Input,
    Output,
}

/// Which adjustments `building_io` applies on top of `definition × level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IoFlags(u8);

impl IoFlags {
    pub const NONE: Self = Self(0);
    pub const CAPACITY: Self = Self(1);
    pub const MULTIPLIER: Self = Self(2);
    pub const ALL: Self = Self(3);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

type IoKey = (Tile, IoDirection, IoFlags);

#[derive(Default)]
pub struct IntraTickCache {
    building_io: RefCell<HashMap<IoKey, Rc<ResourceMap>>>,
    buildings_by_type: RefCell<Option<Rc<BTreeMap<BuildingType, Vec<Tile>>>>>,
    storage_full: RefCell<Option<Rc<Vec<Tile>>>>,
    in_transit: RefCell<Option<HashMap<(Tile, Resource), f64>>>,
}

impl IntraTickCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.building_io.get_mut().clear();
        *self.buildings_by_type.get_mut() = None;
        *self.storage_full.get_mut() = None;
        *self.in_transit.get_mut() = None;
    }

    pub fn building_io(
        &self,
        tile: Tile,
        direction: IoDirection,
        flags: IoFlags,
        compute: impl FnOnce() -> ResourceMap,
    ) -> Rc<ResourceMap> {
        let key = (tile, direction, flags);
        if let Some(hit) = self.building_io.borrow().get(&key) {
            return Rc::clone(hit);
        }
        let value = Rc::new(compute());
        self.building_io
            .borrow_mut()
            .insert(key, Rc::clone(&value));
        value
    }

    pub fn buildings_by_type(&self, state: &GameState) -> Rc<BTreeMap<BuildingType, Vec<Tile>>> {
        if let Some(hit) = self.buildings_by_type.borrow().as_ref() {
            return Rc::clone(hit);
        }
        let mut index: BTreeMap<BuildingType, Vec<Tile>> = BTreeMap::new();
        for (tile, building) in state.buildings() {
            index.entry(building.kind.clone()).or_default().push(tile);
        }
        let index = Rc::new(index);
        *self.buildings_by_type.borrow_mut() = Some(Rc::clone(&index));
        index
    }

    pub fn tiles_of_type(&self, state: &GameState, kind: &str) -> Vec<Tile> {
        self.buildings_by_type(state)
            .get(kind)
            .cloned()
            .unwrap_or_default()
    }

    /// Tiles that reported `StorageFull` last tick.
    pub fn storage_full(&self, current: &TickData) -> Rc<Vec<Tile>> {
        if let Some(hit) = self.storage_full.borrow().as_ref() {
            return Rc::clone(hit);
        }
        let tiles: Vec<Tile> = current
            .not_producing_reasons
            .iter()
            .filter(|(_, reason)| **reason == NotProducingReason::StorageFull)
            .map(|(tile, _)| *tile)
            .collect();
        let tiles = Rc::new(tiles);
        *self.storage_full.borrow_mut() = Some(Rc::clone(&tiles));
        tiles
    }

    pub fn amount_in_transit(&self, state: &GameState, to: Tile, res: &str) -> f64 {
        let mut slot = self.in_transit.borrow_mut();
        let index = slot.get_or_insert_with(|| {
            let mut index = HashMap::new();
            for transport in state.transports() {
                *index
                    .entry((transport.to, transport.resource.clone()))
                    .or_insert(0.0) += transport.amount;
            }
            index
        });
        index.get(&(to, res.to_string())).copied().unwrap_or(0.0)
    }

    /// Keep the transit index in step with a transport created this tick.
    pub fn record_transport(&self, to: Tile, res: &str, amount: f64) {
        if let Some(index) = self.in_transit.borrow_mut().as_mut() {
            *index.entry((to, res.to_string())).or_insert(0.0) += amount;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;

    #[test]
    fn test_building_io_memoized_until_clear() {
        let mut cache = IntraTickCache::new();
        let tile = Tile::new(0, 0);
        let mut calls = 0;
        let mut compute = || {
            calls += 1;
            ResourceMap::from([("Wood".to_string(), 1.0)])
        };
        let a = cache.building_io(tile, IoDirection::Output, IoFlags::ALL, &mut compute);
        let b = cache.building_io(tile, IoDirection::Output, IoFlags::ALL, &mut compute);
        assert!(Rc::ptr_eq(&a, &b));
        cache.clear();
        cache.building_io(tile, IoDirection::Output, IoFlags::ALL, &mut compute);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_storage_full_reads_reasons() {
        let cache = IntraTickCache::new();
        let mut data = TickData::empty();
        data.set_reason(Tile::new(1, 0), NotProducingReason::StorageFull);
        data.set_reason(Tile::new(2, 0), NotProducingReason::TurnedOff);
        assert_eq!(*cache.storage_full(&data), vec![Tile::new(1, 0)]);
    }

    #[test]
    fn test_recorded_transport_updates_index() {
        let cache = IntraTickCache::new();
        let state = GameState::new(Grid::new(3, 3));
        let to = Tile::new(1, 1);
        assert_eq!(cache.amount_in_transit(&state, to, "Wood"), 0.0);
        cache.record_transport(to, "Wood", 4.0);
        assert_eq!(cache.amount_in_transit(&state, to, "Wood"), 4.0);
    }
}
