//! Periodic JSON checkpoints of the world.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::grid::Tile;
use crate::tick::NotProducingReason;
use crate::world::{GameState, WorldSnapshot};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub scenario: String,
    pub tick: u64,
    pub timestamp: String,
    pub building_count: usize,
}

pub struct SnapshotWriter {
    output_dir: PathBuf,
    interval_ticks: u64,
    last_snapshot_tick: u64,
}

impl SnapshotWriter {
    pub fn new(output_dir: impl AsRef<Path>, interval_ticks: u64) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            interval_ticks,
            last_snapshot_tick: 0,
        }
    }

    pub fn should_snapshot(&self, tick: u64) -> bool {
        if self.interval_ticks == 0 {
            return false;
        }
        tick > 0 && tick - self.last_snapshot_tick >= self.interval_ticks
    }

    /// Write a checkpoint if the interval has elapsed since the last one.
    pub fn maybe_write(
        &mut self,
        state: &GameState,
        reasons: &BTreeMap<Tile, NotProducingReason>,
        scenario: &str,
    ) -> Result<Option<PathBuf>> {
        if !self.should_snapshot(state.tick()) {
            return Ok(None);
        }
        let snapshot = state.snapshot_with_reasons(scenario, reasons);
        self.write(&snapshot).map(Some)
    }

    pub fn write(&mut self, snapshot: &WorldSnapshot) -> Result<PathBuf> {
        let dir = self.output_dir.join(format!("snapshot_{:08}", snapshot.tick));
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create snapshot dir {}", dir.display()))?;

        let metadata = SnapshotMetadata {
            scenario: snapshot.scenario.clone(),
            tick: snapshot.tick,
            timestamp: chrono::Utc::now().to_rfc3339(),
            building_count: snapshot.buildings.len(),
        };
        fs::write(
            dir.join("metadata.json"),
            serde_json::to_string_pretty(&metadata)?,
        )?;
        fs::write(dir.join("world.json"), serde_json::to_string_pretty(snapshot)?)?;

        self.last_snapshot_tick = snapshot.tick;
        info!(tick = snapshot.tick, dir = %dir.display(), "snapshot written");
        Ok(dir)
    }

    pub fn load_metadata(&self, snapshot_dir: impl AsRef<Path>) -> Result<SnapshotMetadata> {
        let path = snapshot_dir.as_ref().join("metadata.json");
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn load_world(&self, snapshot_dir: impl AsRef<Path>) -> Result<WorldSnapshot> {
        let path = snapshot_dir.as_ref().join("world.json");
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn list_snapshots(&self) -> Result<Vec<PathBuf>> {
        let mut snapshots = Vec::new();
        if !self.output_dir.exists() {
            return Ok(snapshots);
        }
        for entry in fs::read_dir(&self.output_dir)? {
            let path = entry?.path();
            let is_snapshot = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with("snapshot_"))
                .unwrap_or(false);
            if path.is_dir() && is_snapshot {
                snapshots.push(path);
            }
        }
        snapshots.sort();
        Ok(snapshots)
    }
}
