//! Tiles and the buildings placed on them.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::definitions::{BuildingDefinition, BuildingKind, BuildingType, Resource, ResourceMap};
use crate::grid::Tile;

pub const PRIORITY_MIN: u32 = 1;
pub const PRIORITY_MAX: u32 = 10;
pub const DEFAULT_PRIORITY: u32 = 5;
pub const STOCKPILE_CAPACITY_MAX: u32 = 10;
pub const STOCKPILE_MAX_MAX: u32 = 50;
pub const DEFAULT_STOCKPILE_CAPACITY: u32 = 1;
pub const DEFAULT_STOCKPILE_MAX: u32 = 5;
pub const MANAGED_IMPORT_RANGE: u32 = 2;

macro_rules! option_flags {
    ($name:ident { $($flag:ident = $bit:expr),* $(,)? }) => {
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u8);

        impl $name {
            $(pub const $flag: Self = Self($bit);)*

            pub fn empty() -> Self {
                Self(0)
            }

            pub fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0 && other.0 != 0
            }

            pub fn with(self, other: Self) -> Self {
                Self(self.0 | other.0)
            }

            pub fn without(self, other: Self) -> Self {
                Self(self.0 & !other.0)
            }
        }
    };
}

option_flags!(ResourceImportOptions {
    EXPORT_BELOW_CAP = 1,
    EXPORT_TO_SAME_TYPE = 2,
    MANAGED_IMPORT = 4,
});

option_flags!(WarehouseOptions {
    AUTOPILOT = 1,
    AUTOPILOT_RESPECT_CAP = 2,
});

option_flags!(MarketOptions {
    CLEAR_AFTER_UPDATE = 1,
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileData {
    pub tile: Tile,
    #[serde(default)]
    pub explored: bool,
    #[serde(default)]
    pub deposit: BTreeSet<Resource>,
    #[serde(default)]
    pub building: Option<Building>,
}

impl TileData {
    pub fn new(tile: Tile) -> Self {
        Self {
            tile,
            explored: false,
            deposit: BTreeSet::new(),
            building: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildingStatus {
    Building,
    Upgrading,
    Completed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    #[default]
    Distance,
    Amount,
    StoragePercentage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceImport {
    pub per_cycle: f64,
    pub cap: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceImportData {
    #[serde(default)]
    pub resource_imports: BTreeMap<Resource, ResourceImport>,
    #[serde(default)]
    pub options: ResourceImportOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
    #[serde(default)]
    pub sell_resources: BTreeSet<Resource>,
    /// Sell resource to the resource it is exchanged for.
    #[serde(default)]
    pub available_resources: BTreeMap<Resource, Resource>,
    #[serde(default)]
    pub options: MarketOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloneData {
    pub input_resource: Option<Resource>,
    #[serde(default)]
    pub transported_amount: f64,
}

/// Capability payload, selected by the building definition's kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Capability {
    #[default]
    Plain,
    Market(MarketData),
    ResourceImport(ResourceImportData),
    Warehouse {
        imports: ResourceImportData,
        warehouse_options: WarehouseOptions,
    },
    Caravansary(ResourceImportData),
    Clone(CloneData),
}

impl Capability {
    pub fn for_kind(kind: BuildingKind) -> Self {
        match kind {
            BuildingKind::Plain => Capability::Plain,
            BuildingKind::Market => Capability::Market(MarketData::default()),
            BuildingKind::ResourceImport => {
                Capability::ResourceImport(ResourceImportData::default())
            }
            BuildingKind::Warehouse => Capability::Warehouse {
                imports: ResourceImportData::default(),
                warehouse_options: WarehouseOptions::empty(),
            },
            BuildingKind::Caravansary => Capability::Caravansary(ResourceImportData::default()),
            BuildingKind::Clone => Capability::Clone(CloneData::default()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Building {
    #[serde(rename = "type")]
    pub kind: BuildingType,
    pub level: u32,
    pub desired_level: u32,
    pub status: BuildingStatus,
    #[serde(default)]
    pub resources: ResourceMap,
    /// Fraction of full production, 0 turns the building off.
    pub capacity: f64,
    pub stockpile_capacity: u32,
    pub stockpile_max: u32,
    pub construction_priority: u32,
    pub production_priority: u32,
    #[serde(default)]
    pub electrification: u32,
    #[serde(default)]
    pub input_mode: InputMode,
    #[serde(default)]
    pub max_input_distance: Option<u32>,
    #[serde(default)]
    pub capability: Capability,
}

impl Building {
    /// A fresh construction site.
    pub fn new(kind: &str, def: &BuildingDefinition) -> Self {
        Self {
            kind: kind.to_string(),
            level: 0,
            desired_level: 1,
            status: BuildingStatus::Building,
            resources: ResourceMap::new(),
            capacity: 1.0,
            stockpile_capacity: DEFAULT_STOCKPILE_CAPACITY,
            stockpile_max: DEFAULT_STOCKPILE_MAX,
            construction_priority: DEFAULT_PRIORITY,
            production_priority: DEFAULT_PRIORITY,
            electrification: 0,
            input_mode: InputMode::Distance,
            max_input_distance: None,
            capability: Capability::for_kind(def.kind),
        }
    }

    /// A building that starts out finished at `level`.
    pub fn completed(kind: &str, def: &BuildingDefinition, level: u32) -> Self {
        let mut building = Self::new(kind, def);
        building.level = level;
        building.desired_level = level;
        building.status = BuildingStatus::Completed;
        building
    }

    pub fn is_completed(&self) -> bool {
        self.status == BuildingStatus::Completed
    }

    pub fn amount(&self, res: &str) -> f64 {
        self.resources.get(res).copied().unwrap_or(0.0)
    }

    pub fn add_resource(&mut self, res: &str, amount: f64) {
        *self.resources.entry(res.to_string()).or_insert(0.0) += amount;
    }

    /// Stockpile multiple of input, unlimited when set to zero.
    pub fn stockpile_max_limit(&self) -> f64 {
        if self.stockpile_max == 0 {
            f64::INFINITY
        } else {
            self.stockpile_max as f64
        }
    }

    pub fn resource_imports(&self) -> Option<&ResourceImportData> {
        match &self.capability {
            Capability::ResourceImport(data) | Capability::Caravansary(data) => Some(data),
            Capability::Warehouse { imports, .. } => Some(imports),
            _ => None,
        }
    }

    pub fn resource_imports_mut(&mut self) -> Option<&mut ResourceImportData> {
        match &mut self.capability {
            Capability::ResourceImport(data) | Capability::Caravansary(data) => Some(data),
            Capability::Warehouse { imports, .. } => Some(imports),
            _ => None,
        }
    }

    pub fn is_resource_import(&self) -> bool {
        self.resource_imports().is_some()
    }

    pub fn warehouse_options(&self) -> Option<WarehouseOptions> {
        match &self.capability {
            Capability::Warehouse {
                warehouse_options, ..
            } => Some(*warehouse_options),
            _ => None,
        }
    }

    pub fn market(&self) -> Option<&MarketData> {
        match &self.capability {
            Capability::Market(data) => Some(data),
            _ => None,
        }
    }

    pub fn market_mut(&mut self) -> Option<&mut MarketData> {
        match &mut self.capability {
            Capability::Market(data) => Some(data),
            _ => None,
        }
    }

    pub fn clone_data(&self) -> Option<&CloneData> {
        match &self.capability {
            Capability::Clone(data) => Some(data),
            _ => None,
        }
    }

    pub fn clone_data_mut(&mut self) -> Option<&mut CloneData> {
        match &mut self.capability {
            Capability::Clone(data) => Some(data),
            _ => None,
        }
    }
}

pub fn clamp_priority(value: u32) -> u32 {
    value.clamp(PRIORITY_MIN, PRIORITY_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_def(kind: BuildingKind) -> BuildingDefinition {
        BuildingDefinition {
            input: ResourceMap::new(),
            output: ResourceMap::new(),
            construction: None,
            deposit: BTreeSet::new(),
            special: None,
            kind,
            power: false,
            happiness_exempt: false,
        }
    }

    #[test]
    fn test_new_building_is_construction_site() {
        let b = Building::new("Hut", &plain_def(BuildingKind::Plain));
        assert_eq!(b.level, 0);
        assert_eq!(b.status, BuildingStatus::Building);
        assert_eq!(b.capability, Capability::Plain);
    }

    #[test]
    fn test_warehouse_is_resource_import() {
        let b = Building::new("Warehouse", &plain_def(BuildingKind::Warehouse));
        assert!(b.is_resource_import());
        assert_eq!(b.warehouse_options(), Some(WarehouseOptions::empty()));
        assert!(b.market().is_none());
    }

    #[test]
    fn test_option_flags() {
        let opts = WarehouseOptions::AUTOPILOT.with(WarehouseOptions::AUTOPILOT_RESPECT_CAP);
        assert!(opts.contains(WarehouseOptions::AUTOPILOT));
        assert!(!opts
            .without(WarehouseOptions::AUTOPILOT)
            .contains(WarehouseOptions::AUTOPILOT));
        assert!(!WarehouseOptions::empty().contains(WarehouseOptions::empty()));
    }

    #[test]
    fn test_stockpile_zero_is_unlimited() {
        let mut b = Building::new("Hut", &plain_def(BuildingKind::Plain));
        b.stockpile_max = 0;
        assert!(b.stockpile_max_limit().is_infinite());
    }

    #[test]
    fn test_priority_clamped() {
        assert_eq!(clamp_priority(0), PRIORITY_MIN);
        assert_eq!(clamp_priority(42), PRIORITY_MAX);
    }
}
