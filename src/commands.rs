//! Host commands applied between ticks.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::definitions::{BuildingType, Definitions, Resource, ResourceMap};
use crate::events::SimEvent;
use crate::grid::Tile;
use crate::tile::{
    clamp_priority, Building, Capability, InputMode, MarketOptions, ResourceImport,
    ResourceImportOptions, WarehouseOptions, STOCKPILE_CAPACITY_MAX, STOCKPILE_MAX_MAX,
};
use crate::world::GameState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Place {
        tile: Tile,
        building: BuildingType,
    },
    Upgrade {
        tile: Tile,
        levels: u32,
    },
    Remove {
        tile: Tile,
    },
    SetPriority {
        tile: Tile,
        construction: Option<u32>,
        production: Option<u32>,
    },
    SetCapacity {
        tile: Tile,
        capacity: f64,
    },
    SetElectrification {
        tile: Tile,
        level: u32,
    },
    SetInputMode {
        tile: Tile,
        mode: InputMode,
        max_distance: Option<u32>,
    },
    SetStockpile {
        tile: Tile,
        capacity: Option<u32>,
        max: Option<u32>,
    },
    Explore {
        tile: Tile,
    },
    SetMarketSell {
        tile: Tile,
        resource: Resource,
        sell: bool,
    },
    SetMarketOptions {
        tile: Tile,
        options: MarketOptions,
    },
    SetResourceImport {
        tile: Tile,
        resource: Resource,
        per_cycle: f64,
        cap: f64,
    },
    SetResourceImportOptions {
        tile: Tile,
        options: ResourceImportOptions,
    },
    SetWarehouseOptions {
        tile: Tile,
        options: WarehouseOptions,
    },
    SetCloneInput {
        tile: Tile,
        resource: Option<Resource>,
    },
    UnlockTech {
        tech: String,
    },
    /// Externally resolved deliveries, such as fulfilled player trades.
    AddResources {
        tile: Tile,
        resources: ResourceMap,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("tile {0} is outside the map")]
    InvalidTile(Tile),
    #[error("tile {0} has not been explored")]
    Unexplored(Tile),
    #[error("tile {0} already has a building")]
    Occupied(Tile),
    #[error("tile {0} has no building")]
    NoBuilding(Tile),
    #[error("unknown building type {0}")]
    UnknownBuilding(String),
    #[error("unknown resource {0}")]
    UnknownResource(String),
    #[error("unknown tech {0}")]
    UnknownTech(String),
    #[error("building at {tile} does not support {action}")]
    Unsupported { tile: Tile, action: &'static str },
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: f64 },
}

fn building_at(state: &mut GameState, tile: Tile) -> Result<&mut Building, CommandError> {
    if !state.grid.is_valid(tile) {
        return Err(CommandError::InvalidTile(tile));
    }
    state.building_mut(tile).ok_or(CommandError::NoBuilding(tile))
}

fn known_resource(defs: &Definitions, res: &str) -> Result<(), CommandError> {
    if defs.resource(res).is_some() {
        Ok(())
    } else {
        Err(CommandError::UnknownResource(res.to_string()))
    }
}

pub fn apply(
    state: &mut GameState,
    defs: &Definitions,
    command: Command,
) -> Result<Vec<SimEvent>, CommandError> {
    let mut events = Vec::new();
    match command {
        Command::Place { tile, building } => {
            let def = defs
                .building(&building)
                .ok_or_else(|| CommandError::UnknownBuilding(building.clone()))?;
            let data = state
                .tiles
                .get_mut(&tile)
                .ok_or(CommandError::InvalidTile(tile))?;
            if !data.explored {
                return Err(CommandError::Unexplored(tile));
            }
            if data.building.is_some() {
                return Err(CommandError::Occupied(tile));
            }
            data.building = Some(Building::new(&building, def));
            info!(%tile, building = %building, "construction started");
        }
        Command::Upgrade { tile, levels } => {
            let building = building_at(state, tile)?;
            building.desired_level = building.desired_level.max(building.level) + levels;
        }
        Command::Remove { tile } => {
            building_at(state, tile)?;
            if let Some(data) = state.tiles.get_mut(&tile) {
                data.building = None;
            }
            info!(%tile, "building removed");
        }
        Command::SetPriority {
            tile,
            construction,
            production,
        } => {
            let building = building_at(state, tile)?;
            if let Some(p) = construction {
                building.construction_priority = clamp_priority(p);
            }
            if let Some(p) = production {
                building.production_priority = clamp_priority(p);
            }
        }
        Command::SetCapacity { tile, capacity } => {
            if !capacity.is_finite() {
                return Err(CommandError::InvalidValue {
                    field: "capacity",
                    value: capacity,
                });
            }
            building_at(state, tile)?.capacity = capacity.clamp(0.0, 1.0);
        }
        Command::SetElectrification { tile, level } => {
            let building = building_at(state, tile)?;
            if level > 0 && !defs.building(&building.kind).map(|d| d.power).unwrap_or(false) {
                return Err(CommandError::Unsupported {
                    tile,
                    action: "electrification",
                });
            }
            building.electrification = level.min(building.level);
        }
        Command::SetInputMode {
            tile,
            mode,
            max_distance,
        } => {
            let building = building_at(state, tile)?;
            building.input_mode = mode;
            building.max_input_distance = max_distance;
        }
        Command::SetStockpile { tile, capacity, max } => {
            let building = building_at(state, tile)?;
            if let Some(c) = capacity {
                building.stockpile_capacity = c.min(STOCKPILE_CAPACITY_MAX);
            }
            if let Some(m) = max {
                building.stockpile_max = m.min(STOCKPILE_MAX_MAX);
            }
        }
        Command::Explore { tile } => {
            let data = state
                .tiles
                .get_mut(&tile)
                .ok_or(CommandError::InvalidTile(tile))?;
            if !data.explored {
                data.explored = true;
                events.push(SimEvent::TileExplored { tile });
            }
        }
        Command::SetMarketSell {
            tile,
            resource,
            sell,
        } => {
            known_resource(defs, &resource)?;
            let market = building_at(state, tile)?
                .market_mut()
                .ok_or(CommandError::Unsupported {
                    tile,
                    action: "selling",
                })?;
            if sell {
                market.sell_resources.insert(resource);
            } else {
                market.sell_resources.remove(&resource);
            }
        }
        Command::SetMarketOptions { tile, options } => {
            building_at(state, tile)?
                .market_mut()
                .ok_or(CommandError::Unsupported {
                    tile,
                    action: "market options",
                })?
                .options = options;
        }
        Command::SetResourceImport {
            tile,
            resource,
            per_cycle,
            cap,
        } => {
            known_resource(defs, &resource)?;
            for (field, value) in [("per_cycle", per_cycle), ("cap", cap)] {
                if !value.is_finite() || value < 0.0 {
                    return Err(CommandError::InvalidValue { field, value });
                }
            }
            let imports = building_at(state, tile)?
                .resource_imports_mut()
                .ok_or(CommandError::Unsupported {
                    tile,
                    action: "imports",
                })?;
            if per_cycle == 0.0 && cap == 0.0 {
                imports.resource_imports.remove(&resource);
            } else {
                imports
                    .resource_imports
                    .insert(resource, ResourceImport { per_cycle, cap });
            }
        }
        Command::SetResourceImportOptions { tile, options } => {
            building_at(state, tile)?
                .resource_imports_mut()
                .ok_or(CommandError::Unsupported {
                    tile,
                    action: "import options",
                })?
                .options = options;
        }
        Command::SetWarehouseOptions { tile, options } => match &mut building_at(state, tile)?
            .capability
        {
            Capability::Warehouse {
                warehouse_options, ..
            } => *warehouse_options = options,
            _ => {
                return Err(CommandError::Unsupported {
                    tile,
                    action: "warehouse options",
                })
            }
        },
        Command::SetCloneInput { tile, resource } => {
            if let Some(res) = &resource {
                known_resource(defs, res)?;
            }
            let clone = building_at(state, tile)?
                .clone_data_mut()
                .ok_or(CommandError::Unsupported {
                    tile,
                    action: "cloning",
                })?;
            if clone.input_resource != resource {
                clone.input_resource = resource;
                clone.transported_amount = 0.0;
            }
        }
        Command::UnlockTech { tech } => {
            if !defs.techs.contains_key(&tech) {
                return Err(CommandError::UnknownTech(tech));
            }
            info!(tech = %tech, "tech unlocked");
            state.unlocked_tech.insert(tech);
        }
        Command::AddResources { tile, resources } => {
            for (res, amount) in &resources {
                known_resource(defs, res)?;
                if !amount.is_finite() {
                    return Err(CommandError::InvalidValue {
                        field: "resources",
                        value: *amount,
                    });
                }
            }
            let building = building_at(state, tile)?;
            for (res, amount) in &resources {
                building.add_resource(res, *amount);
                if building.amount(res) < 0.0 {
                    building.resources.insert(res.clone(), 0.0);
                }
            }
        }
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;
    use crate::tile::{BuildingStatus, PRIORITY_MAX};

    fn setup() -> (GameState, Definitions) {
        let mut state = GameState::new(Grid::new(4, 4));
        for data in state.tiles.values_mut() {
            data.explored = true;
        }
        (state, Definitions::builtin().unwrap())
    }

    #[test]
    fn test_place_and_remove() {
        let (mut state, defs) = setup();
        let tile = Tile::new(1, 1);
        apply(
            &mut state,
            &defs,
            Command::Place {
                tile,
                building: "Hut".into(),
            },
        )
        .unwrap();
        assert_eq!(state.building(tile).unwrap().status, BuildingStatus::Building);
        let again = apply(
            &mut state,
            &defs,
            Command::Place {
                tile,
                building: "Hut".into(),
            },
        );
        assert_eq!(again, Err(CommandError::Occupied(tile)));
        apply(&mut state, &defs, Command::Remove { tile }).unwrap();
        assert!(state.building(tile).is_none());
    }

    #[test]
    fn test_unexplored_tile_rejects_placement() {
        let mut state = GameState::new(Grid::new(4, 4));
        let defs = Definitions::builtin().unwrap();
        let tile = Tile::new(0, 0);
        let err = apply(
            &mut state,
            &defs,
            Command::Place {
                tile,
                building: "Hut".into(),
            },
        );
        assert_eq!(err, Err(CommandError::Unexplored(tile)));
        let events = apply(&mut state, &defs, Command::Explore { tile }).unwrap();
        assert_eq!(events, vec![SimEvent::TileExplored { tile }]);
    }

    #[test]
    fn test_settings_are_clamped() {
        let (mut state, defs) = setup();
        let tile = Tile::new(2, 2);
        let def = defs.building("Blacksmith").unwrap();
        state.tiles.get_mut(&tile).unwrap().building = Some(Building::completed("Blacksmith", def, 2));
        apply(
            &mut state,
            &defs,
            Command::SetPriority {
                tile,
                construction: None,
                production: Some(99),
            },
        )
        .unwrap();
        apply(
            &mut state,
            &defs,
            Command::SetStockpile {
                tile,
                capacity: Some(50),
                max: Some(80),
            },
        )
        .unwrap();
        apply(&mut state, &defs, Command::SetElectrification { tile, level: 5 }).unwrap();
        let b = state.building(tile).unwrap();
        assert_eq!(b.production_priority, PRIORITY_MAX);
        assert_eq!(b.stockpile_capacity, STOCKPILE_CAPACITY_MAX);
        assert_eq!(b.stockpile_max, STOCKPILE_MAX_MAX);
        assert_eq!(b.electrification, 2);
    }

    #[test]
    fn test_capability_commands_check_building_kind() {
        let (mut state, defs) = setup();
        let tile = Tile::new(0, 1);
        let def = defs.building("Hut").unwrap();
        state.tiles.get_mut(&tile).unwrap().building = Some(Building::completed("Hut", def, 1));
        let err = apply(
            &mut state,
            &defs,
            Command::SetMarketSell {
                tile,
                resource: "Wood".into(),
                sell: true,
            },
        );
        assert!(matches!(err, Err(CommandError::Unsupported { .. })));
    }

    #[test]
    fn test_commands_parse_from_yaml() {
        let yaml = "command: upgrade\ntile: 65537\nlevels: 2\n";
        let command: Command = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            command,
            Command::Upgrade {
                tile: Tile::new(1, 1),
                levels: 2
            }
        );
    }

    #[test]
    fn test_non_finite_resources_are_rejected() {
        let (mut state, defs) = setup();
        let tile = Tile::new(2, 2);
        apply(
            &mut state,
            &defs,
            Command::Place {
                tile,
                building: "Hut".into(),
            },
        )
        .unwrap();
        let err = apply(
            &mut state,
            &defs,
            Command::AddResources {
                tile,
                resources: ResourceMap::from([
                    ("Stone".to_string(), 4.0),
                    ("Wood".to_string(), f64::NAN),
                ]),
            },
        )
        .unwrap_err();
        assert!(matches!(err, CommandError::InvalidValue { field: "resources", .. }));
        assert!(state.building(tile).unwrap().resources.is_empty());

        apply(
            &mut state,
            &defs,
            Command::AddResources {
                tile,
                resources: ResourceMap::from([("Wood".to_string(), 3.0)]),
            },
        )
        .unwrap();
        assert_eq!(state.building(tile).unwrap().amount("Wood"), 3.0);
    }
}
