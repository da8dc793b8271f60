//! Static definition tables: resources, buildings, techs, ages and great people.
//!
//! Tables are read-only once loaded. Tier and price are derived at load time from the
//! production graph and the tech tree.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::tick::{GlobalBucket, Multiplier};

pub type Resource = String;
pub type BuildingType = String;
pub type ResourceMap = BTreeMap<Resource, f64>;

pub const WORKER: &str = "Worker";
pub const POWER: &str = "Power";
pub const SCIENCE: &str = "Science";

const BUILTIN_DEFINITIONS: &str = include_str!("../data/definitions.yaml");

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("failed to read definitions: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse definitions: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("{owner} references unknown resource {resource}")]
    UnknownResource { owner: String, resource: String },
    #[error("{owner} references unknown building {building}")]
    UnknownBuilding { owner: String, building: String },
    #[error("tech {tech} references unknown age {age}")]
    UnknownAge { tech: String, age: String },
    #[error("tech {tech} requires unknown tech {required}")]
    UnknownTech { tech: String, required: String },
    #[error("required resource {0} is missing from the resource table")]
    MissingCoreResource(&'static str),
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDefinition {
    #[serde(default = "default_true")]
    pub can_store: bool,
    #[serde(default = "default_true")]
    pub can_price: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildingSpecial {
    Hq,
    WorldWonder,
    NaturalWonder,
}

/// Which capability payload a freshly placed building of this type carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildingKind {
    #[default]
    Plain,
    Market,
    ResourceImport,
    Warehouse,
    Caravansary,
    Clone,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingDefinition {
    #[serde(default)]
    pub input: ResourceMap,
    #[serde(default)]
    pub output: ResourceMap,
    #[serde(default)]
    pub construction: Option<ResourceMap>,
    #[serde(default)]
    pub deposit: BTreeSet<Resource>,
    #[serde(default)]
    pub special: Option<BuildingSpecial>,
    #[serde(default)]
    pub kind: BuildingKind,
    /// Can be electrified once electricity is available.
    #[serde(default)]
    pub power: bool,
    #[serde(default)]
    pub happiness_exempt: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgeDefinition {
    pub idx: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechDefinition {
    pub column: u32,
    pub age: String,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub unlock_building: Vec<BuildingType>,
    #[serde(default)]
    pub building_multiplier: BTreeMap<BuildingType, Multiplier>,
    #[serde(default)]
    pub all_building_multiplier: Option<Multiplier>,
    #[serde(default)]
    pub global_multiplier: BTreeMap<GlobalBucket, f64>,
}

/// Great person bonuses, applied once per owned level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GreatPersonDefinition {
    #[serde(default)]
    pub building_multiplier: BTreeMap<BuildingType, Multiplier>,
    #[serde(default)]
    pub all_building_multiplier: Option<Multiplier>,
    #[serde(default)]
    pub global_multiplier: BTreeMap<GlobalBucket, f64>,
}

/// Gameplay mechanics gated behind a tech.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    BuildingPriority,
    Stockpile,
    WarehouseUpgrade,
    Electricity,
    InputMode,
}

impl Feature {
    pub fn tech(self) -> &'static str {
        match self {
            Feature::BuildingPriority => "Herding",
            Feature::Stockpile => "HorsebackRiding",
            Feature::WarehouseUpgrade => "Machinery",
            Feature::Electricity => "Electricity",
            Feature::InputMode => "Housing",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Definitions {
    pub resources: BTreeMap<Resource, ResourceDefinition>,
    pub buildings: BTreeMap<BuildingType, BuildingDefinition>,
    #[serde(default)]
    pub ages: BTreeMap<String, AgeDefinition>,
    #[serde(default)]
    pub techs: BTreeMap<String, TechDefinition>,
    #[serde(default)]
    pub great_people: BTreeMap<String, GreatPersonDefinition>,
    #[serde(skip)]
    building_tier: BTreeMap<BuildingType, u32>,
    #[serde(skip)]
    resource_tier: BTreeMap<Resource, u32>,
    #[serde(skip)]
    resource_price: BTreeMap<Resource, f64>,
    #[serde(skip)]
    unlock_tech: BTreeMap<BuildingType, String>,
}

impl Definitions {
    pub fn builtin() -> Result<Self, DefinitionError> {
        Self::from_yaml_str(BUILTIN_DEFINITIONS)
    }

    pub fn from_yaml_str(data: &str) -> Result<Self, DefinitionError> {
        let defs: Definitions = serde_yaml::from_str(data)?;
        defs.validated()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DefinitionError> {
        let data = fs::read_to_string(path)?;
        Self::from_yaml_str(&data)
    }

    fn validated(mut self) -> Result<Self, DefinitionError> {
        for core in [WORKER, SCIENCE] {
            if !self.resources.contains_key(core) {
                return Err(DefinitionError::MissingCoreResource(core));
            }
        }
        for (name, building) in &self.buildings {
            let referenced = building
                .input
                .keys()
                .chain(building.output.keys())
                .chain(building.construction.iter().flat_map(|c| c.keys()))
                .chain(building.deposit.iter());
            for res in referenced {
                if !self.resources.contains_key(res) {
                    return Err(DefinitionError::UnknownResource {
                        owner: name.clone(),
                        resource: res.clone(),
                    });
                }
            }
        }
        for (name, tech) in &self.techs {
            if !self.ages.contains_key(&tech.age) {
                return Err(DefinitionError::UnknownAge {
                    tech: name.clone(),
                    age: tech.age.clone(),
                });
            }
            for required in &tech.requires {
                if !self.techs.contains_key(required) {
                    return Err(DefinitionError::UnknownTech {
                        tech: name.clone(),
                        required: required.clone(),
                    });
                }
            }
            for building in tech
                .unlock_building
                .iter()
                .chain(tech.building_multiplier.keys())
            {
                if !self.buildings.contains_key(building) {
                    return Err(DefinitionError::UnknownBuilding {
                        owner: name.clone(),
                        building: building.clone(),
                    });
                }
            }
        }
        self.derive_unlock_techs();
        self.derive_tiers();
        self.derive_prices();
        Ok(self)
    }

    fn derive_unlock_techs(&mut self) {
        let mut techs: Vec<(&String, &TechDefinition)> = self.techs.iter().collect();
        techs.sort_by(|a, b| a.1.column.cmp(&b.1.column).then_with(|| a.0.cmp(b.0)));
        let mut unlock = BTreeMap::new();
        for (name, tech) in techs {
            for building in &tech.unlock_building {
                unlock.entry(building.clone()).or_insert_with(|| name.clone());
            }
        }
        self.unlock_tech = unlock;
    }

    fn transportable_inputs<'a>(&'a self, def: &'a BuildingDefinition) -> Vec<&'a Resource> {
        def.input
            .keys()
            .filter(|r| self.is_transportable(r))
            .collect()
    }

    fn derive_tiers(&mut self) {
        let mut building_tier: BTreeMap<BuildingType, u32> = BTreeMap::new();
        let mut resource_tier: BTreeMap<Resource, u32> = BTreeMap::new();
        for _ in 0..=self.buildings.len() {
            let mut changed = false;
            for (name, def) in &self.buildings {
                if def.special.is_some() || building_tier.contains_key(name) {
                    continue;
                }
                let inputs = self.transportable_inputs(def);
                let tier = if inputs.is_empty() {
                    Some(1)
                } else {
                    inputs
                        .iter()
                        .map(|r| resource_tier.get(*r).copied())
                        .collect::<Option<Vec<u32>>>()
                        .map(|tiers| 1 + tiers.into_iter().max().unwrap_or(0))
                };
                let Some(tier) = tier else { continue };
                building_tier.insert(name.clone(), tier);
                for res in def.output.keys().filter(|r| self.is_transportable(r)) {
                    let entry = resource_tier.entry(res.clone()).or_insert(tier);
                    *entry = (*entry).min(tier);
                }
                changed = true;
            }
            if !changed {
                break;
            }
        }
        let unresolved = self
            .buildings
            .iter()
            .filter(|(name, def)| def.special.is_none() && !building_tier.contains_key(*name))
            .count();
        if unresolved > 0 {
            debug!(unresolved, "buildings without a resolvable tier");
        }
        self.building_tier = building_tier;
        self.resource_tier = resource_tier;
    }

    fn derive_prices(&mut self) {
        let mut price: BTreeMap<Resource, f64> = BTreeMap::new();
        for (name, def) in &self.resources {
            if !def.can_price {
                price.insert(name.clone(), 0.0);
            }
        }
        for _ in 0..=self.buildings.len() {
            let mut changed = false;
            for (name, def) in &self.buildings {
                if def.special.is_some() {
                    continue;
                }
                let outputs: Vec<(&Resource, f64)> = def
                    .output
                    .iter()
                    .filter(|(r, _)| self.is_transportable(r) && !price.contains_key(*r))
                    .map(|(r, v)| (r, *v))
                    .collect();
                if outputs.is_empty() {
                    continue;
                }
                let inputs = self.transportable_inputs(def);
                let value = if inputs.is_empty() {
                    let column = self
                        .unlock_tech
                        .get(name)
                        .and_then(|t| self.techs.get(t))
                        .map(|t| t.column)
                        .unwrap_or(0);
                    Some(1.0 + column as f64)
                } else {
                    let mut total = 0.0;
                    let mut known = true;
                    for res in inputs {
                        match price.get(res) {
                            Some(p) => total += p * def.input[res],
                            None => known = false,
                        }
                    }
                    let out: f64 = def
                        .output
                        .iter()
                        .filter(|(r, _)| self.is_transportable(r))
                        .map(|(_, v)| *v)
                        .sum();
                    if known && out > 0.0 {
                        Some(total / out)
                    } else {
                        None
                    }
                };
                if let Some(value) = value {
                    for (res, _) in outputs {
                        price.insert(res.clone(), value);
                    }
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        self.resource_price = price;
    }

    pub fn resource(&self, res: &str) -> Option<&ResourceDefinition> {
        self.resources.get(res)
    }

    pub fn building(&self, building: &str) -> Option<&BuildingDefinition> {
        self.buildings.get(building)
    }

    /// Storable resources are the only ones that can sit in a building or travel on a route.
    pub fn is_transportable(&self, res: &str) -> bool {
        self.resources.get(res).map(|r| r.can_store).unwrap_or(false)
    }

    pub fn can_price(&self, res: &str) -> bool {
        self.resources.get(res).map(|r| r.can_price).unwrap_or(false)
    }

    pub fn is_special(&self, building: &str) -> bool {
        self.special(building).is_some()
    }

    pub fn special(&self, building: &str) -> Option<BuildingSpecial> {
        self.buildings.get(building).and_then(|b| b.special)
    }

    pub fn is_world_wonder(&self, building: &str) -> bool {
        self.special(building) == Some(BuildingSpecial::WorldWonder)
    }

    pub fn is_natural_wonder(&self, building: &str) -> bool {
        self.special(building) == Some(BuildingSpecial::NaturalWonder)
    }

    pub fn building_tier(&self, building: &str) -> u32 {
        self.building_tier.get(building).copied().unwrap_or(0)
    }

    pub fn resource_tier(&self, res: &str) -> u32 {
        self.resource_tier.get(res).copied().unwrap_or(0)
    }

    pub fn price(&self, res: &str) -> f64 {
        self.resource_price.get(res).copied().unwrap_or(0.0)
    }

    pub fn unlock_tech(&self, building: &str) -> Option<&str> {
        self.unlock_tech.get(building).map(String::as_str)
    }

    /// Column of the unlocking tech and index of its age, both zero when nothing unlocks it.
    pub fn tech_and_age_index(&self, building: &str) -> (u32, u32) {
        let Some(tech) = self.unlock_tech(building).and_then(|t| self.techs.get(t)) else {
            return (0, 0);
        };
        let age = self.ages.get(&tech.age).map(|a| a.idx).unwrap_or(0);
        (tech.column, age)
    }

    pub fn age_of_tech(&self, tech: &str) -> Option<u32> {
        self.techs
            .get(tech)
            .and_then(|t| self.ages.get(&t.age))
            .map(|a| a.idx)
    }

    pub fn storable_priced_resources(&self) -> Vec<Resource> {
        self.resources
            .iter()
            .filter(|(_, r)| r.can_store && r.can_price)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Resources that appear as an output of at least one of the given buildings.
    pub fn resources_produced_by<'a>(
        &self,
        buildings: impl IntoIterator<Item = &'a BuildingType>,
    ) -> BTreeSet<Resource> {
        buildings
            .into_iter()
            .filter_map(|b| self.buildings.get(b))
            .flat_map(|b| b.output.keys().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_definitions_load() {
        let defs = Definitions::builtin().expect("builtin definitions parse");
        assert!(defs.building("Headquarter").is_some());
        assert!(!defs.is_transportable(WORKER));
        assert!(defs.is_transportable("Wood"));
        assert!(!defs.can_price(SCIENCE));
    }

    #[test]
    fn test_tiers_follow_production_chain() {
        let defs = Definitions::builtin().unwrap();
        assert_eq!(defs.building_tier("WheatFarm"), 1);
        assert_eq!(defs.building_tier("FlourMill"), 2);
        assert_eq!(defs.building_tier("Bakery"), 3);
        assert_eq!(defs.resource_tier("Flour"), 2);
    }

    #[test]
    fn test_prices_follow_inputs() {
        let defs = Definitions::builtin().unwrap();
        let wheat = defs.price("Wheat");
        assert!(wheat >= 1.0);
        let flour = defs.price("Flour");
        let mill = defs.building("FlourMill").unwrap();
        let expected = wheat * mill.input["Wheat"] / mill.output["Flour"];
        assert!((flour - expected).abs() < 1e-9);
        assert_eq!(defs.price(WORKER), 0.0);
    }

    #[test]
    fn test_unknown_resource_rejected() {
        let yaml = r#"
resources:
  Worker: { can_store: false, can_price: false }
  Science: { can_price: false }
buildings:
  Mine:
    output: { Gold: 1 }
"#;
        let err = Definitions::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownResource { .. }));
    }

    #[test]
    fn test_wonder_tech_and_age_index() {
        let defs = Definitions::builtin().unwrap();
        let (tech, age) = defs.tech_and_age_index("HangingGarden");
        let unlock = defs.unlock_tech("HangingGarden").unwrap();
        assert_eq!(tech, defs.techs[unlock].column);
        assert_eq!(Some(age), defs.age_of_tech(unlock));
    }
}
