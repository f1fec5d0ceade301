//! Tourist safety monitoring: geofence violation alerts with a cool-down,
//! a heuristic safety score, and the session that drives both from a
//! position feed.

pub mod config;
pub mod db;
pub mod feed;
pub mod geo;
pub mod location;
pub mod models;
pub mod monitor;
pub mod scoring;
pub mod session;
pub mod utils;

pub use config::{FeedSource, MonitorConfig};
pub use db::Database;
pub use feed::{GeofenceFeed, JsonFileFeed, StaticFeed};
pub use geo::{haversine_distance_m, Position};
pub use location::{PositionError, PositionSource, ReplaySource};
pub use models::{Geofence, GeofenceRecord, GeofenceSnapshot, Notice, ViolationAlert};
pub use monitor::{PositionUpdate, ViolationMonitor};
pub use scoring::{RiskLevel, SafetyScore, SafetyScoreEngine, ScoringConfig};
pub use session::{ChannelSink, MonitoringSession, SessionEvent, SessionSnapshot};
pub use utils::init_logging;
