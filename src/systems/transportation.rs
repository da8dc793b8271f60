use anyhow::Result;

use crate::{
    engine::{System, SystemContext},
    transport,
    world::GameState,
};

/// Advances in-flight transports before any building resolves.
pub struct TransportationSystem;

impl TransportationSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TransportationSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for TransportationSystem {
    fn name(&self) -> &str {
        "transportation"
    }

    fn run(&mut self, ctx: &mut SystemContext<'_>, state: &mut GameState) -> Result<()> {
        transport::tick_transportations(ctx, state);
        Ok(())
    }
}
