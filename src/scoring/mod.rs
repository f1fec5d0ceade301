pub mod config;
pub mod engine;
pub mod health;

pub use config::ScoringConfig;
pub use engine::{RiskLevel, SafetyScore, SafetyScoreEngine, ScoreBreakdown};
pub use health::{apply_health_check, run_health_check, HealthCheckOutcome, HealthEscalation};
