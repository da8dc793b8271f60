use anyhow::Result;
use tracing::debug;

use crate::{
    engine::{System, SystemContext},
    events::SimEvent,
    grid::Tile,
    market::{pair_resources, price_bucket},
    tile::MarketOptions,
    world::GameState,
};

/// Redraws market pairings when the hour bucket turns over.
pub struct PricingSystem;

impl PricingSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PricingSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for PricingSystem {
    fn name(&self) -> &str {
        "pricing"
    }

    fn run(&mut self, ctx: &mut SystemContext<'_>, state: &mut GameState) -> Result<()> {
        let bucket = price_bucket(state);
        let forced = state.last_price_updated != Some(bucket);
        if forced {
            state.last_price_updated = Some(bucket);
            debug!(bucket, "market prices updated");
            ctx.events.push(SimEvent::PriceUpdated { bucket });
        }

        let produced = ctx
            .defs
            .resources_produced_by(ctx.tick.next().unlocked_buildings.iter());
        let tradeable: Vec<_> = ctx
            .defs
            .storable_priced_resources()
            .into_iter()
            .filter(|res| produced.contains(res))
            .collect();

        let markets: Vec<Tile> = state
            .buildings()
            .filter(|(_, b)| b.is_completed() && b.market().is_some())
            .map(|(tile, _)| tile)
            .collect();
        for tile in markets {
            let Some(market) = state.building_mut(tile).and_then(|b| b.market_mut()) else {
                continue;
            };
            if forced || market.available_resources.is_empty() {
                market.available_resources = pair_resources(bucket, tile, &tradeable);
            }
            if forced && market.options.contains(MarketOptions::CLEAR_AFTER_UPDATE) {
                market.sell_resources.clear();
            } else {
                market
                    .sell_resources
                    .retain(|res| market.available_resources.contains_key(res));
            }
        }
        Ok(())
    }
}
