pub mod building_logic;
pub mod cache;
pub mod commands;
pub mod config;
pub mod definitions;
pub mod effects;
pub mod engine;
pub mod events;
pub mod grid;
pub mod happiness;
pub mod market;
pub mod rng;
pub mod scenario;
pub mod scheduler;
pub mod snapshot;
pub mod systems;
pub mod tick;
pub mod tile;
pub mod transport;
pub mod world;

pub use commands::{Command, CommandError};
pub use definitions::Definitions;
pub use engine::{Engine, EngineBuilder, EngineSettings, TickSummary};
pub use grid::{Grid, Tile};
pub use scenario::{Scenario, ScenarioLoader};
pub use world::GameState;
