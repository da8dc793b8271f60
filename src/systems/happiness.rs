use anyhow::Result;

use crate::{
    engine::{System, SystemContext},
    happiness::calculate_happiness,
    world::GameState,
};

/// Happiness from this tick's view of the city, feeding next tick's worker percentage.
pub struct HappinessSystem;

impl HappinessSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HappinessSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for HappinessSystem {
    fn name(&self) -> &str {
        "happiness"
    }

    fn run(&mut self, ctx: &mut SystemContext<'_>, state: &mut GameState) -> Result<()> {
        let happiness = calculate_happiness(ctx.defs, state, ctx.tick.current());
        ctx.tick.next_mut().happiness = Some(happiness);
        Ok(())
    }
}
