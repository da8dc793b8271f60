//! Wonder effects.
//!
//! Each completed wonder with a registered effect is evaluated once per tick. Effects are
//! plain functions from the wonder's position to a list of commands; the unlockables system
//! applies the commands to the `next` tick data.

use std::collections::BTreeMap;

use crate::definitions::BuildingType;
use crate::grid::{Grid, Tile};
use crate::tick::{FreeTransportZone, GlobalBucket, Multiplier, TickData};

const NEIGHBOR_RANGE: u32 = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum EffectCommand {
    TileMultiplier { tile: Tile, value: Multiplier },
    BuildingMultiplier { building: BuildingType, value: Multiplier },
    Global { bucket: GlobalBucket, value: f64 },
    HappinessExemption { tile: Tile },
    FreeTransport { center: Tile, radius: u32 },
}

pub struct EffectInput<'a> {
    pub tile: Tile,
    pub level: u32,
    pub grid: &'a Grid,
    pub free_transport_radius: u32,
}

pub type EffectFn = fn(&EffectInput<'_>) -> Vec<EffectCommand>;

#[derive(Default)]
pub struct EffectRegistry {
    effects: BTreeMap<BuildingType, EffectFn>,
}

impl EffectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn standard() -> Self {
        Self::new()
            .with("HangingGarden", hanging_garden)
            .with("MausoleumAtHalicarnassus", mausoleum)
            .with("Stonehenge", stonehenge)
            .with("ColossusOfRhodes", colossus_of_rhodes)
            .with("ChichenItza", chichen_itza)
            .with("LighthouseOfAlexandria", lighthouse)
    }

    pub fn with(mut self, building: &str, effect: EffectFn) -> Self {
        self.register(building, effect);
        self
    }

    pub fn register(&mut self, building: &str, effect: EffectFn) {
        self.effects.insert(building.to_string(), effect);
    }

    pub fn contains(&self, building: &str) -> bool {
        self.effects.contains_key(building)
    }

    pub fn evaluate(&self, building: &str, input: &EffectInput<'_>) -> Vec<EffectCommand> {
        match self.effects.get(building) {
            Some(effect) => effect(input),
            None => Vec::new(),
        }
    }
}

pub fn apply_commands(next: &mut TickData, commands: Vec<EffectCommand>, source: &str) {
    for command in commands {
        match command {
            EffectCommand::TileMultiplier { tile, value } => {
                next.add_tile_multiplier(tile, value, source)
            }
            EffectCommand::BuildingMultiplier { building, value } => {
                next.add_building_multiplier(&building, value, source)
            }
            EffectCommand::Global { bucket, value } => next.add_global(bucket, value, source),
            EffectCommand::HappinessExemption { tile } => {
                next.happiness_exemptions.insert(tile);
            }
            EffectCommand::FreeTransport { center, radius } => {
                next.free_transport.push(FreeTransportZone { center, radius })
            }
        }
    }
}

fn hanging_garden(_input: &EffectInput<'_>) -> Vec<EffectCommand> {
    vec![EffectCommand::Global {
        bucket: GlobalBucket::BuilderCapacity,
        value: 1.0,
    }]
}

fn mausoleum(input: &EffectInput<'_>) -> Vec<EffectCommand> {
    vec![EffectCommand::FreeTransport {
        center: input.tile,
        radius: input.free_transport_radius,
    }]
}

fn stonehenge(input: &EffectInput<'_>) -> Vec<EffectCommand> {
    input
        .grid
        .tiles_in_range(input.tile, NEIGHBOR_RANGE)
        .into_iter()
        .map(|tile| EffectCommand::TileMultiplier {
            tile,
            value: Multiplier {
                output: 1.0,
                ..Default::default()
            },
        })
        .collect()
}

fn colossus_of_rhodes(input: &EffectInput<'_>) -> Vec<EffectCommand> {
    vec![EffectCommand::Global {
        bucket: GlobalBucket::Happiness,
        value: 5.0 * input.level.max(1) as f64,
    }]
}

fn chichen_itza(input: &EffectInput<'_>) -> Vec<EffectCommand> {
    input
        .grid
        .tiles_in_range(input.tile, NEIGHBOR_RANGE)
        .into_iter()
        .map(|tile| EffectCommand::HappinessExemption { tile })
        .collect()
}

fn lighthouse(_input: &EffectInput<'_>) -> Vec<EffectCommand> {
    vec![EffectCommand::Global {
        bucket: GlobalBucket::TransportCapacity,
        value: 1.0,
    }]
}
