use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::scoring::config::ScoringConfig;
use crate::scoring::engine::SafetyScore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HealthEscalation {
    /// Adopted score fell below the high-risk threshold; raise an alert.
    HighRisk,
    /// Adopted score rose above the very-safe threshold; update the summary only.
    VerySafe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthCheckOutcome {
    pub previous: SafetyScore,
    pub candidate: SafetyScore,
    pub adopted: bool,
    pub escalation: Option<HealthEscalation>,
}

impl HealthCheckOutcome {
    /// Score the session should hold after this check.
    pub fn resulting_score(&self) -> SafetyScore {
        if self.adopted {
            self.candidate
        } else {
            self.previous
        }
    }
}

/// Nudge `previous` by `step * risk_factor` in the given direction and decide
/// whether the change is large enough to adopt.
pub fn apply_health_check(
    previous: SafetyScore,
    risk_factor: u32,
    rising: bool,
    config: &ScoringConfig,
) -> HealthCheckOutcome {
    let magnitude = config.health_step.saturating_mul(risk_factor as i32);
    let delta = if rising { magnitude } else { -magnitude };
    let candidate = SafetyScore::clamped((previous.value() + delta) as f64, config);

    let adopted = (candidate.value() - previous.value()).abs() >= config.adopt_threshold;
    let escalation = if !adopted {
        None
    } else if candidate.value() < config.high_risk_below {
        Some(HealthEscalation::HighRisk)
    } else if candidate.value() > config.very_safe_above {
        Some(HealthEscalation::VerySafe)
    } else {
        None
    };

    HealthCheckOutcome {
        previous,
        candidate,
        adopted,
        escalation,
    }
}

/// One health-check tick with a random risk factor and direction.
pub fn run_health_check<R: Rng>(
    previous: SafetyScore,
    config: &ScoringConfig,
    rng: &mut R,
) -> HealthCheckOutcome {
    let risk_factor = rng.gen_range(0..=config.max_risk_factor);
    let rising = rng.gen_bool(0.5);
    apply_health_check(previous, risk_factor, rising, config)
}
