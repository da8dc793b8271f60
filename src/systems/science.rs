use anyhow::Result;
use tracing::debug;

use crate::{
    building_logic::{headquarter, science_from_workers},
    definitions::SCIENCE,
    engine::{System, SystemContext},
    world::GameState,
};

/// Credits science earned by idle and busy workers to the headquarter.
pub struct ScienceSystem;

impl ScienceSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ScienceSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for ScienceSystem {
    fn name(&self) -> &str {
        "science"
    }

    fn run(&mut self, ctx: &mut SystemContext<'_>, state: &mut GameState) -> Result<()> {
        let science = science_from_workers(ctx.tick);
        if science.total <= 0.0 {
            return Ok(());
        }
        match headquarter(ctx, state).and_then(|hq| state.building_mut(hq)) {
            Some(hq) => hq.add_resource(SCIENCE, science.total),
            None => debug!(amount = science.total, "no headquarter to bank science"),
        }
        Ok(())
    }
}
