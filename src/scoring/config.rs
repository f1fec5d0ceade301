use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Weights and thresholds for the safety score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Score before any factor applies, and the score while no position is known.
    pub base_score: i32,
    /// Subtracted when the position is inside any active geofence.
    pub restricted_penalty: i32,

    /// Night runs from `night_start_hour` to midnight and from midnight
    /// through `night_end_hour`, inclusive. The window must wrap midnight,
    /// so `night_start_hour` is always later than `night_end_hour`.
    pub night_start_hour: u32,
    pub night_end_hour: u32,
    pub night_penalty: i32,
    /// Morning runs `morning_start_hour..=morning_end_hour`.
    pub morning_start_hour: u32,
    pub morning_end_hour: u32,
    pub morning_bonus: i32,

    /// Uniform jitter drawn from [-amplitude, +amplitude].
    pub jitter_amplitude: f64,

    pub min_score: i32,
    pub max_score: i32,

    /// Health check: candidate = previous ± step * risk, risk drawn from 0..=max_risk_factor.
    pub health_step: i32,
    pub max_risk_factor: u32,
    /// Minimum change for the health check to replace the score.
    pub adopt_threshold: i32,
    pub high_risk_below: i32,
    pub very_safe_above: i32,

    /// Risk bands for the status summary.
    pub low_risk_from: i32,
    pub medium_risk_from: i32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_score: 80,
            restricted_penalty: 30,
            night_start_hour: 22,
            night_end_hour: 5,
            night_penalty: 15,
            morning_start_hour: 6,
            morning_end_hour: 8,
            morning_bonus: 5,
            jitter_amplitude: 5.0,
            min_score: 20,
            max_score: 100,
            health_step: 1,
            max_risk_factor: 3,
            adopt_threshold: 5,
            high_risk_below: 60,
            very_safe_above: 85,
            low_risk_from: 80,
            medium_risk_from: 60,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_score >= self.max_score {
            bail!(
                "min_score ({}) must be below max_score ({})",
                self.min_score,
                self.max_score
            );
        }
        if !self.jitter_amplitude.is_finite() || self.jitter_amplitude < 0.0 {
            bail!("jitter_amplitude must be a non-negative number");
        }
        if self.night_start_hour > 23 || self.night_end_hour > 23 {
            bail!("night hours must be within 0..=23");
        }
        if self.night_start_hour <= self.night_end_hour {
            bail!(
                "night window must wrap midnight: start {} is not after end {}",
                self.night_start_hour,
                self.night_end_hour
            );
        }
        if self.morning_start_hour > self.morning_end_hour || self.morning_end_hour > 23 {
            bail!("morning hours must form a range within 0..=23");
        }
        if self.health_step < 0 || self.adopt_threshold < 0 {
            bail!("health_step and adopt_threshold must not be negative");
        }
        if self.medium_risk_from > self.low_risk_from {
            bail!("medium_risk_from must not exceed low_risk_from");
        }
        Ok(())
    }
}
