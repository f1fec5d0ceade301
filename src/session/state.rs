use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::geo::Position;
use crate::location::PositionError;
use crate::models::GeofenceSnapshot;
use crate::monitor::ViolationMonitor;
use crate::scoring::{RiskLevel, SafetyScore};

/// Mutable state owned by one monitoring session. Only the session's
/// operations touch it, always under the session lock.
pub struct SessionState {
    pub geofences: GeofenceSnapshot,
    pub monitor: ViolationMonitor,
    pub score: SafetyScore,
    pub last_error: Option<PositionError>,
    pub rng: StdRng,
}

impl SessionState {
    pub fn new(monitor: ViolationMonitor, score: SafetyScore, rng: StdRng) -> Self {
        Self {
            geofences: GeofenceSnapshot::new(),
            monitor,
            score,
            last_error: None,
            rng,
        }
    }

    pub fn position(&self) -> Option<Position> {
        self.monitor.last_position()
    }
}

/// Point-in-time view of a session for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub position: Option<Position>,
    pub place_name: Option<String>,
    pub score: SafetyScore,
    pub risk_level: RiskLevel,
    pub geofence_count: usize,
    pub active_geofence_count: usize,
    pub rejected_geofences: usize,
    pub outstanding_alerts: Vec<String>,
    pub monitoring: bool,
    pub last_error: Option<PositionError>,
}
