//! Player options and runtime configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::definitions::BuildingType;
use crate::tile::{
    clamp_priority, Building, InputMode, STOCKPILE_CAPACITY_MAX, STOCKPILE_MAX_MAX,
};

/// Settings copied onto a building of a type when its construction finishes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildingDefaults {
    pub capacity: Option<f64>,
    pub stockpile_capacity: Option<u32>,
    pub stockpile_max: Option<u32>,
    pub construction_priority: Option<u32>,
    pub production_priority: Option<u32>,
    pub input_mode: Option<InputMode>,
    pub max_input_distance: Option<u32>,
}

impl BuildingDefaults {
    pub fn apply(&self, building: &mut Building) {
        if let Some(capacity) = self.capacity {
            building.capacity = capacity.clamp(0.0, 1.0);
        }
        if let Some(v) = self.stockpile_capacity {
            building.stockpile_capacity = v.min(STOCKPILE_CAPACITY_MAX);
        }
        if let Some(v) = self.stockpile_max {
            building.stockpile_max = v.min(STOCKPILE_MAX_MAX);
        }
        if let Some(v) = self.construction_priority {
            building.construction_priority = clamp_priority(v);
        }
        if let Some(v) = self.production_priority {
            building.production_priority = clamp_priority(v);
        }
        if let Some(mode) = self.input_mode {
            building.input_mode = mode;
        }
        if self.max_input_distance.is_some() {
            building.max_input_distance = self.max_input_distance;
        }
    }
}

fn default_free_transport_radius() -> u32 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameOptions {
    #[serde(default)]
    pub building_defaults: BTreeMap<BuildingType, BuildingDefaults>,
    /// Radius, in tiles, of the zone where transports burn no fuel.
    #[serde(default = "default_free_transport_radius")]
    pub free_transport_radius: u32,
}

impl Default for GameOptions {
    fn default() -> Self {
        Self {
            building_defaults: BTreeMap::new(),
            free_transport_radius: default_free_transport_radius(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit a per-tick summary at debug level every this many ticks.
    #[serde(default = "default_summary_interval")]
    pub summary_interval_ticks: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_summary_interval() -> u64 {
    60
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            summary_interval_ticks: default_summary_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::Definitions;

    #[test]
    fn test_defaults_are_clamped_on_apply() {
        let defs = Definitions::builtin().unwrap();
        let mut building = Building::new("FlourMill", defs.building("FlourMill").unwrap());
        let defaults = BuildingDefaults {
            capacity: Some(3.0),
            stockpile_capacity: Some(99),
            production_priority: Some(0),
            input_mode: Some(InputMode::Amount),
            ..Default::default()
        };
        defaults.apply(&mut building);
        assert_eq!(building.capacity, 1.0);
        assert_eq!(building.stockpile_capacity, STOCKPILE_CAPACITY_MAX);
        assert_eq!(building.production_priority, 1);
        assert_eq!(building.input_mode, InputMode::Amount);
        assert_eq!(building.stockpile_max, crate::tile::DEFAULT_STOCKPILE_MAX);
    }

    #[test]
    fn test_options_parse_with_defaults() {
        let yaml = r#"
building_defaults:
  WheatFarm:
    production_priority: 8
"#;
        let options: GameOptions = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(options.free_transport_radius, 2);
        assert_eq!(
            options.building_defaults["WheatFarm"].production_priority,
            Some(8)
        );
    }

    #[test]
    fn test_logging_defaults() {
        let logging: LoggingConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(logging.level, "info");
        assert_eq!(logging.summary_interval_ticks, 60);
    }
}
