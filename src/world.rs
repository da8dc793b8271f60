use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::definitions::{BuildingType, Resource};
use crate::grid::{Grid, Tile};
use crate::tick::NotProducingReason;
use crate::tile::{Building, BuildingStatus, TileData};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transportation {
    pub id: u64,
    pub from: Tile,
    pub to: Tile,
    pub resource: Resource,
    pub amount: f64,
    pub ticks_required: u32,
    pub ticks_spent: u32,
    pub fuel: Resource,
    pub fuel_amount: f64,
    pub current_fuel_amount: f64,
    pub has_enough_fuel: bool,
}

/// Everything a save needs: the map, research, great people, in-flight transports and the
/// tick counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    pub grid: Grid,
    pub tiles: BTreeMap<Tile, TileData>,
    #[serde(default)]
    pub unlocked_tech: BTreeSet<String>,
    #[serde(default)]
    pub great_people: BTreeMap<String, u32>,
    /// In-flight transports keyed by destination tile.
    #[serde(default)]
    pub transportation: BTreeMap<Tile, Vec<Transportation>>,
    pub tick: u64,
    pub transport_id: u64,
    /// Hour bucket the market pairings were last drawn for.
    pub last_price_updated: Option<u64>,
    /// Simulation clock origin, in seconds.
    pub start_epoch_seconds: u64,
}

impl GameState {
    pub fn new(grid: Grid) -> Self {
        let tiles = grid
            .all_tiles()
            .map(|tile| (tile, TileData::new(tile)))
            .collect();
        Self {
            grid,
            tiles,
            unlocked_tech: BTreeSet::new(),
            great_people: BTreeMap::new(),
            transportation: BTreeMap::new(),
            tick: 0,
            transport_id: 0,
            last_price_updated: None,
            start_epoch_seconds: 0,
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn building(&self, tile: Tile) -> Option<&Building> {
        self.tiles.get(&tile).and_then(|t| t.building.as_ref())
    }

    pub fn building_mut(&mut self, tile: Tile) -> Option<&mut Building> {
        self.tiles.get_mut(&tile).and_then(|t| t.building.as_mut())
    }

    pub fn buildings(&self) -> impl Iterator<Item = (Tile, &Building)> {
        self.tiles
            .iter()
            .filter_map(|(tile, data)| data.building.as_ref().map(|b| (*tile, b)))
    }

    pub fn is_explored(&self, tile: Tile) -> bool {
        self.tiles.get(&tile).map(|t| t.explored).unwrap_or(false)
    }

    pub fn has_tech(&self, tech: &str) -> bool {
        self.unlocked_tech.contains(tech)
    }

    pub fn amount_in_transit(&self, to: Tile, res: &str) -> f64 {
        self.transportation
            .get(&to)
            .map(|queue| {
                queue
                    .iter()
                    .filter(|t| t.resource == res)
                    .map(|t| t.amount)
                    .sum()
            })
            .unwrap_or(0.0)
    }

    pub fn transports(&self) -> impl Iterator<Item = &Transportation> {
        self.transportation.values().flatten()
    }

    pub fn find_first(&self, kind: &str) -> Option<Tile> {
        self.buildings()
            .find(|(_, b)| b.kind == kind)
            .map(|(tile, _)| tile)
    }

    pub fn snapshot(&self, scenario: &str) -> WorldSnapshot {
        let reasons = BTreeMap::new();
        self.snapshot_with_reasons(scenario, &reasons)
    }

    pub fn snapshot_with_reasons(
        &self,
        scenario: &str,
        reasons: &BTreeMap<Tile, NotProducingReason>,
    ) -> WorldSnapshot {
        let buildings = self
            .buildings()
            .map(|(tile, b)| BuildingSnapshot {
                x: tile.x(),
                y: tile.y(),
                kind: b.kind.clone(),
                level: b.level,
                status: b.status,
                not_producing: reasons.get(&tile).copied(),
                stored: b.resources.values().filter(|v| **v > 0.0).sum(),
            })
            .collect();
        WorldSnapshot {
            scenario: scenario.to_string(),
            tick: self.tick,
            unlocked_tech: self.unlocked_tech.iter().cloned().collect(),
            transports_in_flight: self.transports().count(),
            buildings,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BuildingSnapshot {
    pub x: u16,
    pub y: u16,
    #[serde(rename = "type")]
    pub kind: BuildingType,
    pub level: u32,
    pub status: BuildingStatus,
    pub not_producing: Option<NotProducingReason>,
    pub stored: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub scenario: String,
    pub tick: u64,
    pub unlocked_tech: Vec<String>,
    pub transports_in_flight: usize,
    pub buildings: Vec<BuildingSnapshot>,
}
