use std::sync::Arc;

use chrono::{Local, Timelike};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::geo::{BoundingBoxRegions, Position, RegionResolver};
use crate::models::GeofenceSnapshot;
use crate::scoring::config::ScoringConfig;

/// Integer score kept within the configured bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SafetyScore(i32);

impl SafetyScore {
    /// Round and clamp. Non-finite input lands on the lower bound.
    pub fn clamped(raw: f64, config: &ScoringConfig) -> Self {
        if !raw.is_finite() {
            return Self(config.min_score);
        }
        let rounded = raw.round().clamp(config.min_score as f64, config.max_score as f64);
        Self(rounded as i32)
    }

    pub fn value(self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for SafetyScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn for_score(score: SafetyScore, config: &ScoringConfig) -> Self {
        if score.value() >= config.low_risk_from {
            RiskLevel::Low
        } else if score.value() >= config.medium_risk_from {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    pub fn summary(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Monitoring active • Low risk",
            RiskLevel::Medium => "Monitoring active • Medium risk",
            RiskLevel::High => "Monitoring active • High risk detected",
        }
    }
}

/// Individual contributions to a score, before rounding and clamping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub base: i32,
    pub restricted_penalty: i32,
    pub region_offset: i32,
    pub time_adjustment: i32,
    pub jitter: f64,
}

impl ScoreBreakdown {
    /// Sum of every factor except jitter.
    pub fn deterministic_total(&self) -> i32 {
        self.base + self.restricted_penalty + self.region_offset + self.time_adjustment
    }

    pub fn score(&self, config: &ScoringConfig) -> SafetyScore {
        SafetyScore::clamped(self.deterministic_total() as f64 + self.jitter, config)
    }
}

/// Recomputes the safety score from scratch for each position.
#[derive(Clone)]
pub struct SafetyScoreEngine {
    config: ScoringConfig,
    regions: Arc<dyn RegionResolver>,
}

impl Default for SafetyScoreEngine {
    fn default() -> Self {
        Self::new(ScoringConfig::default(), Arc::new(BoundingBoxRegions::default()))
    }
}

impl SafetyScoreEngine {
    pub fn new(config: ScoringConfig, regions: Arc<dyn RegionResolver>) -> Self {
        Self { config, regions }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn regions(&self) -> &dyn RegionResolver {
        self.regions.as_ref()
    }

    /// Factor breakdown for `position` at local `hour`. Without a position
    /// (or with an invalid one) only the base score applies.
    pub fn breakdown<R: Rng>(
        &self,
        position: Option<&Position>,
        fences: &GeofenceSnapshot,
        hour: u32,
        rng: &mut R,
    ) -> ScoreBreakdown {
        let Some(position) = position.filter(|p| p.is_valid()) else {
            return ScoreBreakdown {
                base: self.config.base_score,
                restricted_penalty: 0,
                region_offset: 0,
                time_adjustment: 0,
                jitter: 0.0,
            };
        };

        let restricted_penalty = if fences.containing(position).is_some() {
            -self.config.restricted_penalty
        } else {
            0
        };

        let amplitude = self.config.jitter_amplitude;
        let jitter = if amplitude > 0.0 {
            rng.gen_range(-amplitude..=amplitude)
        } else {
            0.0
        };

        ScoreBreakdown {
            base: self.config.base_score,
            restricted_penalty,
            region_offset: self.regions.score_offset(position),
            time_adjustment: self.time_adjustment(hour),
            jitter,
        }
    }

    pub fn compute<R: Rng>(
        &self,
        position: Option<&Position>,
        fences: &GeofenceSnapshot,
        hour: u32,
        rng: &mut R,
    ) -> SafetyScore {
        self.breakdown(position, fences, hour, rng).score(&self.config)
    }

    /// [`compute`](Self::compute) at the current local hour.
    pub fn compute_now<R: Rng>(
        &self,
        position: Option<&Position>,
        fences: &GeofenceSnapshot,
        rng: &mut R,
    ) -> SafetyScore {
        self.compute(position, fences, Local::now().hour(), rng)
    }

    pub fn time_adjustment(&self, hour: u32) -> i32 {
        let c = &self.config;
        if hour >= c.night_start_hour || hour <= c.night_end_hour {
            -c.night_penalty
        } else if (c.morning_start_hour..=c.morning_end_hour).contains(&hour) {
            c.morning_bonus
        } else {
            0
        }
    }

    pub fn risk_level(&self, score: SafetyScore) -> RiskLevel {
        RiskLevel::for_score(score, &self.config)
    }

    pub fn default_score(&self) -> SafetyScore {
        SafetyScore::clamped(self.config.base_score as f64, &self.config)
    }
}
