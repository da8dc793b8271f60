use serde::{Deserialize, Serialize};

use crate::definitions::BuildingType;
use crate::grid::Tile;

/// Notifications raised while a tick resolves, for whoever renders or reacts to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SimEvent {
    BuildingComplete { tile: Tile, building: BuildingType },
    UpgradeComplete { tile: Tile, building: BuildingType, level: u32 },
    ProductionComplete { tile: Tile, building: BuildingType },
    Floater { tile: Tile, amount: f64 },
    PriceUpdated { bucket: u64 },
    TileExplored { tile: Tile },
}
