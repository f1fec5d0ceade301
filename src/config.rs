use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};

use crate::geo::Position;
use crate::scoring::ScoringConfig;

/// Where the session pulls geofences from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedSource {
    JsonFile { path: PathBuf },
    Sqlite { path: PathBuf },
}

impl Default for FeedSource {
    fn default() -> Self {
        FeedSource::JsonFile {
            path: PathBuf::from("geofences.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// How long a fence stays silent after it alerted.
    pub cooldown_secs: u64,
    /// Watch samples closer than this to the last evaluated position are ignored.
    pub min_movement_m: f64,
    pub health_check_interval_secs: u64,
    pub geofence_refresh_secs: u64,
    /// Gap between samples when replaying a recorded track.
    pub replay_interval_ms: u64,
    /// Shown until the first successful fix. Never evaluated against fences.
    pub default_position: Option<Position>,
    pub feed: FeedSource,
    pub scoring: ScoringConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 30,
            min_movement_m: 10.0,
            health_check_interval_secs: 45,
            geofence_refresh_secs: 60,
            replay_interval_ms: 1_000,
            default_position: None,
            feed: FeedSource::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Read `path` if it exists; otherwise defaults. Missing fields fall back
    /// to their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        } else {
            MonitorConfig::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cooldown_secs == 0 {
            bail!("cooldown_secs must be greater than zero");
        }
        if !self.min_movement_m.is_finite() || self.min_movement_m < 0.0 {
            bail!("min_movement_m must be a non-negative number");
        }
        if self.health_check_interval_secs == 0 || self.geofence_refresh_secs == 0 {
            bail!("timer intervals must be greater than zero");
        }
        if let Some(position) = &self.default_position {
            if !position.is_valid() {
                bail!("default_position {position:?} is out of range");
            }
        }
        self.scoring.validate()
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }
}
