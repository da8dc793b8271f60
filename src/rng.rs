//! Deterministic random number generation
//!
//! Nothing in the simulation keeps a long-lived RNG. Every random draw is made from a fresh
//! ChaCha8 stream whose seed is derived from the inputs that identify the draw, so the same
//! (hour bucket, tile, resource) always yields the same value on every run.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use xxhash_rust::xxh32::xxh32;

use crate::grid::Tile;

const NAME_HASH_SEED: u32 = 0x5eed;

/// Fold a sequence of words into one seed.
pub fn derive_seed(parts: &[u64]) -> u64 {
    let mut seed: u64 = 0x9e37_79b9_7f4a_7c15;
    for (i, part) in parts.iter().enumerate() {
        seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        seed ^= part.wrapping_mul(1103515245 + 2 * i as u64 + 1);
    }
    seed.wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407)
}

/// Stable hash of a definition name.
pub fn name_hash(name: &str) -> u64 {
    xxh32(name.as_bytes(), NAME_HASH_SEED) as u64
}

pub fn seeded(parts: &[u64]) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(derive_seed(parts))
}

/// Uniform draw in `[0, 1)` for a resource at a tile within an hour bucket.
pub fn tile_resource_unit(bucket: u64, tile: Tile, resource: &str) -> f64 {
    let mut rng = seeded(&[bucket, tile.raw() as u64, name_hash(resource)]);
    rng.gen::<f64>()
}

/// Shuffle deterministically for a tile within an hour bucket.
pub fn shuffle_for_tile<T>(bucket: u64, tile: Tile, items: &mut [T]) {
    let mut rng = seeded(&[bucket, tile.raw() as u64]);
    items.shuffle(&mut rng);
}
