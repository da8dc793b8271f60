//! Hex grid in odd-r offset coordinates.
//!
//! Tiles are addressed by a packed key, `(x << 16) + y`, so they order and hash as plain
//! integers. Geometry (distance, neighbors, ranges, interpolation) runs on `hexx` axial
//! coordinates.

use std::fmt;

use hexx::Hex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tile(u32);

impl Tile {
    pub fn new(x: u16, y: u16) -> Self {
        Self(((x as u32) << 16) + y as u32)
    }

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn x(self) -> u16 {
        ((self.0 >> 16) & 0xffff) as u16
    }

    pub fn y(self) -> u16 {
        (self.0 & 0xffff) as u16
    }

    /// Axial coordinates of an odd-r offset tile.
    pub fn to_hex(self) -> Hex {
        let x = self.x() as i32;
        let y = self.y() as i32;
        Hex::new(x - (y - (y & 1)) / 2, y)
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x(), self.y())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    width: u16,
    height: u16,
}

impl Grid {
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn is_valid(&self, tile: Tile) -> bool {
        tile.x() < self.width && tile.y() < self.height
    }

    /// The in-bounds tile at an axial coordinate.
    pub fn tile_at(&self, hex: Hex) -> Option<Tile> {
        let y = hex.y;
        let x = hex.x + (y - (y & 1)) / 2;
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some(Tile::new(x as u16, y as u16))
    }

    pub fn distance(&self, a: Tile, b: Tile) -> u32 {
        a.to_hex().distance_to(b.to_hex()).unsigned_abs()
    }

    pub fn neighbors(&self, tile: Tile) -> Vec<Tile> {
        tile.to_hex()
            .all_neighbors()
            .into_iter()
            .filter_map(|hex| self.tile_at(hex))
            .collect()
    }

    /// Every in-bounds tile within `range` of `center`, excluding the center itself.
    pub fn tiles_in_range(&self, center: Tile, range: u32) -> Vec<Tile> {
        let origin = center.to_hex();
        let mut result: Vec<Tile> = origin
            .range(range)
            .filter(|hex| *hex != origin)
            .filter_map(|hex| self.tile_at(hex))
            .collect();
        result.sort();
        result
    }

    pub fn all_tiles(&self) -> impl Iterator<Item = Tile> + '_ {
        (0..self.width).flat_map(move |x| (0..self.height).map(move |y| Tile::new(x, y)))
    }

    /// Hex a fraction `t` of the way from `from` to `to`, rounded to the nearest hex.
    pub fn lerp(&self, from: Tile, to: Tile, t: f32) -> Hex {
        from.to_hex().lerp(to.to_hex(), t)
    }
}
