use anyhow::Result;
use tracing::warn;

use crate::{
    effects::{apply_commands, EffectInput},
    engine::{System, SystemContext},
    tile::BuildingStatus,
    world::GameState,
};

/// Pushes research, great people and wonder effects into next tick's multipliers.
pub struct UnlockablesSystem;

impl UnlockablesSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UnlockablesSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for UnlockablesSystem {
    fn name(&self) -> &str {
        "unlockables"
    }

    fn run(&mut self, ctx: &mut SystemContext<'_>, state: &mut GameState) -> Result<()> {
        let defs = ctx.defs;
        let next = ctx.tick.next_mut();
        for tech in &state.unlocked_tech {
            let Some(def) = defs.techs.get(tech) else {
                warn!(tech = %tech, "unlocked tech has no definition");
                continue;
            };
            next.unlocked_buildings
                .extend(def.unlock_building.iter().cloned());
            for (building, multiplier) in &def.building_multiplier {
                next.add_building_multiplier(building, *multiplier, tech);
            }
            if let Some(multiplier) = def.all_building_multiplier {
                next.add_all_building_multiplier(multiplier, tech);
            }
            for (bucket, value) in &def.global_multiplier {
                next.add_global(*bucket, *value, tech);
            }
        }

        for (person, level) in &state.great_people {
            let Some(def) = defs.great_people.get(person) else {
                warn!(person = %person, "great person has no definition");
                continue;
            };
            let level = *level as f64;
            for (building, multiplier) in &def.building_multiplier {
                next.add_building_multiplier(building, multiplier.scaled(level), person);
            }
            if let Some(multiplier) = def.all_building_multiplier {
                next.add_all_building_multiplier(multiplier.scaled(level), person);
            }
            for (bucket, value) in &def.global_multiplier {
                next.add_global(*bucket, value * level, person);
            }
        }

        for (tile, building) in state.buildings() {
            if building.status != BuildingStatus::Completed || !ctx.effects.contains(&building.kind)
            {
                continue;
            }
            if defs.is_natural_wonder(&building.kind) && !state.is_explored(tile) {
                continue;
            }
            let input = EffectInput {
                tile,
                level: building.level,
                grid: &state.grid,
                free_transport_radius: ctx.options.free_transport_radius,
            };
            let commands = ctx.effects.evaluate(&building.kind, &input);
            apply_commands(ctx.tick.next_mut(), commands, &building.kind);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::Definitions;
    use crate::engine::{EngineBuilder, EngineSettings};
    use crate::grid::{Grid, Tile};
    use crate::tick::GlobalBucket;
    use crate::tile::Building;

    #[test]
    fn test_research_people_and_wonders_reach_next() {
        let defs = Definitions::builtin().unwrap();
        let mut state = GameState::new(Grid::new(8, 8));
        state.unlocked_tech.insert("Agriculture".into());
        state.unlocked_tech.insert("Herding".into());
        state.great_people.insert("Imhotep".into(), 2);
        state.great_people.insert("Archimedes".into(), 3);
        let garden = Tile::new(4, 4);
        let def = defs.building("HangingGarden").unwrap().clone();
        state.tiles.get_mut(&garden).unwrap().building =
            Some(Building::completed("HangingGarden", &def, 1));

        let mut engine = EngineBuilder::new(EngineSettings::new("unlock"), defs).build();
        let next = engine.with_context(|ctx| {
            UnlockablesSystem::new().run(ctx, &mut state).unwrap();
            ctx.tick.next().clone()
        });
        assert!(next.unlocked_buildings.contains("WheatFarm"));
        assert!(next.unlocked_buildings.contains("Bakery"));
        assert_eq!(next.building_multipliers["WheatFarm"][0].value.output, 1.0);
        // Base 1, Imhotep 2 levels, Hanging Garden 1.
        assert_eq!(next.global(GlobalBucket::BuilderCapacity), 4.0);
        assert_eq!(next.all_building_multipliers.len(), 1);
        assert_eq!(next.all_building_multipliers[0].value.storage, 3.0);
        assert_eq!(next.all_building_multipliers[0].source, "Archimedes");
    }
}
