//! Market prices and buy/sell pairing.
//!
//! Prices fluctuate once per hour bucket of the simulation clock. Within a bucket the price of
//! a resource at a tile never changes.

use std::collections::BTreeMap;

use crate::definitions::{Definitions, Resource};
use crate::grid::Tile;
use crate::rng;
use crate::world::GameState;

pub const HOUR_SECONDS: u64 = 3600;
const FLUCTUATION_MIN: f64 = 0.75;
const FLUCTUATION_SPAN: f64 = 0.5;

/// Hour bucket of the simulation clock at the state's current tick.
pub fn price_bucket(state: &GameState) -> u64 {
    (state.start_epoch_seconds + state.tick) / HOUR_SECONDS
}

pub fn fluctuation(bucket: u64, tile: Tile, res: &str) -> f64 {
    FLUCTUATION_MIN + rng::tile_resource_unit(bucket, tile, res) * FLUCTUATION_SPAN
}

pub fn market_price(defs: &Definitions, state: &GameState, tile: Tile, res: &str) -> f64 {
    let bucket = state.last_price_updated.unwrap_or_else(|| price_bucket(state));
    defs.price(res) * fluctuation(bucket, tile, res)
}

/// Amount of the buy resource received for `sell_amount` of the sell resource.
pub fn buy_amount(sell_amount: f64, sell_price: f64, buy_price: f64) -> f64 {
    if buy_price <= 0.0 {
        return 0.0;
    }
    sell_amount * sell_price / buy_price
}

/// Pair every resource with a different one to buy, reproducibly for (bucket, tile).
///
/// Buy and sell orders are drawn from the same seed, so each sell resource is paired with
/// the next resource in the shuffled order that is not itself.
pub fn pair_resources(bucket: u64, tile: Tile, resources: &[Resource]) -> BTreeMap<Resource, Resource> {
    let mut pairs = BTreeMap::new();
    if resources.len() < 2 {
        return pairs;
    }
    let mut sell = resources.to_vec();
    let mut buy = resources.to_vec();
    rng::shuffle_for_tile(bucket, tile, &mut sell);
    rng::shuffle_for_tile(bucket, tile, &mut buy);
    let mut idx = 0;
    for res in sell {
        while buy[idx % buy.len()] == res {
            idx += 1;
        }
        pairs.insert(res, buy[idx % buy.len()].clone());
    }
    pairs
}
