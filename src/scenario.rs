use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

use crate::config::{BuildingDefaults, GameOptions, LoggingConfig};
use crate::definitions::{BuildingType, Definitions, Resource, ResourceMap};
use crate::engine::EngineSettings;
use crate::grid::{Grid, Tile};
use crate::tile::{
    Building, Capability, MarketOptions, ResourceImport, ResourceImportOptions, WarehouseOptions,
};
use crate::world::GameState;

fn default_snapshot_interval_ticks() -> u64 {
    600
}

fn default_level() -> u32 {
    1
}

fn default_explored() -> bool {
    true
}

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("map size {width}x{height} is invalid")]
    InvalidMap { width: u16, height: u16 },
    #[error("({x},{y}) is outside the map")]
    OutOfBounds { x: u16, y: u16 },
    #[error("more than one building placed at ({x},{y})")]
    Occupied { x: u16, y: u16 },
    #[error("unknown building type {0}")]
    UnknownBuilding(String),
    #[error("unknown resource {0}")]
    UnknownResource(String),
    #[error("unknown tech {0}")]
    UnknownTech(String),
    #[error("unknown great person {0}")]
    UnknownGreatPerson(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    /// Definitions file relative to the scenario base dir. Built-in tables when omitted.
    #[serde(default)]
    pub definitions: Option<PathBuf>,
    pub map: MapConfig,
    #[serde(default)]
    pub start_epoch_seconds: u64,
    #[serde(default)]
    pub ticks: Option<u64>,
    #[serde(default = "default_snapshot_interval_ticks")]
    pub snapshot_interval_ticks: u64,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub options: GameOptions,
    #[serde(default)]
    pub unlocked_tech: Vec<String>,
    #[serde(default)]
    pub great_people: BTreeMap<String, u32>,
    #[serde(default)]
    pub tiles: Vec<ScenarioTile>,
    #[serde(default)]
    pub buildings: Vec<ScenarioBuilding>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MapConfig {
    pub width: u16,
    pub height: u16,
    #[serde(default)]
    pub explore_all: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioTile {
    pub x: u16,
    pub y: u16,
    #[serde(default = "default_explored")]
    pub explored: bool,
    #[serde(default)]
    pub deposit: Vec<Resource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioBuilding {
    pub x: u16,
    pub y: u16,
    #[serde(rename = "type")]
    pub kind: BuildingType,
    /// Level 0 places a construction site.
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub desired_level: Option<u32>,
    #[serde(default)]
    pub resources: ResourceMap,
    #[serde(default)]
    pub settings: BuildingDefaults,
    #[serde(default)]
    pub electrification: u32,
    #[serde(default)]
    pub imports: BTreeMap<Resource, ResourceImport>,
    #[serde(default)]
    pub import_options: ResourceImportOptions,
    #[serde(default)]
    pub warehouse_options: WarehouseOptions,
    #[serde(default)]
    pub sell_resources: BTreeSet<Resource>,
    #[serde(default)]
    pub market_options: MarketOptions,
    #[serde(default)]
    pub clone_input: Option<Resource>,
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let scenario: Scenario = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(scenario)
    }

    pub fn definitions(&self, scenario: &Scenario) -> Result<Definitions> {
        match &scenario.definitions {
            Some(file) => {
                let path = self.base_dir.join(file);
                Definitions::from_file(&path)
                    .with_context(|| format!("Failed to load definitions {}", path.display()))
            }
            None => Definitions::builtin().context("Failed to load built-in definitions"),
        }
    }
}

impl Scenario {
    pub fn ticks(&self, override_ticks: Option<u64>) -> u64 {
        override_ticks.or(self.ticks).unwrap_or(3600)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        let mut settings = EngineSettings::new(self.name.clone());
        settings.snapshot_interval_ticks = self.snapshot_interval_ticks;
        settings.summary_interval_ticks = self.logging.summary_interval_ticks;
        settings.options = self.options.clone();
        settings
    }

    pub fn build_state(&self, defs: &Definitions) -> Result<GameState, ScenarioError> {
        let (width, height) = (self.map.width, self.map.height);
        if width == 0 || height == 0 {
            return Err(ScenarioError::InvalidMap { width, height });
        }
        let mut state = GameState::new(Grid::new(width, height));
        state.start_epoch_seconds = self.start_epoch_seconds;

        for tech in &self.unlocked_tech {
            if !defs.techs.contains_key(tech) {
                return Err(ScenarioError::UnknownTech(tech.clone()));
            }
            state.unlocked_tech.insert(tech.clone());
        }
        for (person, level) in &self.great_people {
            if !defs.great_people.contains_key(person) {
                return Err(ScenarioError::UnknownGreatPerson(person.clone()));
            }
            state.great_people.insert(person.clone(), *level);
        }

        if self.map.explore_all {
            for data in state.tiles.values_mut() {
                data.explored = true;
            }
        }
        for tile in &self.tiles {
            let data = state
                .tiles
                .get_mut(&Tile::new(tile.x, tile.y))
                .ok_or(ScenarioError::OutOfBounds { x: tile.x, y: tile.y })?;
            data.explored = tile.explored;
            for res in &tile.deposit {
                known_resource(defs, res)?;
                data.deposit.insert(res.clone());
            }
        }

        for placed in &self.buildings {
            let building = placed.build(defs)?;
            let (x, y) = (placed.x, placed.y);
            let data = state
                .tiles
                .get_mut(&Tile::new(x, y))
                .ok_or(ScenarioError::OutOfBounds { x, y })?;
            if data.building.is_some() {
                return Err(ScenarioError::Occupied { x, y });
            }
            // Natural wonders keep the tile's own exploration flag.
            if !defs.is_natural_wonder(&placed.kind) {
                data.explored = true;
            }
            data.building = Some(building);
        }
        Ok(state)
    }
}

impl ScenarioBuilding {
    fn build(&self, defs: &Definitions) -> Result<Building, ScenarioError> {
        let def = defs
            .building(&self.kind)
            .ok_or_else(|| ScenarioError::UnknownBuilding(self.kind.clone()))?;
        let mut building = if self.level == 0 {
            Building::new(&self.kind, def)
        } else {
            Building::completed(&self.kind, def, self.level)
        };
        if let Some(desired) = self.desired_level {
            building.desired_level = desired.max(building.level);
        }
        self.settings.apply(&mut building);
        building.electrification = self.electrification.min(building.level);
        for (res, amount) in &self.resources {
            known_resource(defs, res)?;
            building.add_resource(res, *amount);
        }
        for res in self
            .imports
            .keys()
            .chain(self.sell_resources.iter())
            .chain(self.clone_input.iter())
        {
            known_resource(defs, res)?;
        }

        match &mut building.capability {
            Capability::ResourceImport(data) | Capability::Caravansary(data) => {
                data.resource_imports = self.imports.clone();
                data.options = self.import_options;
            }
            Capability::Warehouse {
                imports,
                warehouse_options,
            } => {
                imports.resource_imports = self.imports.clone();
                imports.options = self.import_options;
                *warehouse_options = self.warehouse_options;
            }
            Capability::Market(market) => {
                market.sell_resources = self.sell_resources.clone();
                market.options = self.market_options;
            }
            Capability::Clone(clone) => clone.input_resource = self.clone_input.clone(),
            Capability::Plain => {}
        }
        Ok(building)
    }
}

fn known_resource(defs: &Definitions, res: &str) -> Result<(), ScenarioError> {
    if defs.resource(res).is_some() {
        Ok(())
    } else {
        Err(ScenarioError::UnknownResource(res.to_string()))
    }
}
