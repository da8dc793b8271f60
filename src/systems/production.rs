use anyhow::Result;
use tracing::trace;

use crate::{
    engine::{System, SystemContext},
    scheduler,
    world::GameState,
};

pub struct ProductionSystem;

impl ProductionSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ProductionSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for ProductionSystem {
    fn name(&self) -> &str {
        "production"
    }

    fn run(&mut self, ctx: &mut SystemContext<'_>, state: &mut GameState) -> Result<()> {
        scheduler::tick_tiles(ctx, state);
        trace!(
            tick = ctx.tick_number,
            reasons = ctx.tick.next().not_producing_reasons.len(),
            "tiles resolved"
        );
        Ok(())
    }
}
