use std::collections::HashMap;

use chrono::Utc;
use tokio::time::{Duration, Instant};

use crate::geo::Position;
use crate::models::{GeofenceSnapshot, ViolationAlert};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);
pub const DEFAULT_MIN_MOVEMENT_M: f64 = 10.0;

/// What happened to a position handed to [`ViolationMonitor::update_position_at`].
#[derive(Debug, Clone, PartialEq)]
pub enum PositionUpdate {
    /// The position was evaluated; carries the alerts it newly raised.
    Evaluated(Vec<ViolationAlert>),
    /// Moved no more than the jitter threshold since the last evaluation.
    BelowThreshold { moved_m: f64 },
    /// Non-finite or out-of-range coordinates.
    Rejected,
}

/// Tracks which fences have an outstanding alert and gates evaluation on
/// meaningful movement.
///
/// An outstanding alert expires a fixed cool-down after it was raised,
/// whether or not the position has left the fence since.
#[derive(Debug, Clone)]
pub struct ViolationMonitor {
    cooldown: Duration,
    min_movement_m: f64,
    last_evaluated: Option<Position>,
    /// Set when a watch starts; the next valid position evaluates regardless
    /// of how close it is to `last_evaluated`.
    force_next: bool,
    outstanding: HashMap<String, Instant>,
}

impl Default for ViolationMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN, DEFAULT_MIN_MOVEMENT_M)
    }
}

impl ViolationMonitor {
    pub fn new(cooldown: Duration, min_movement_m: f64) -> Self {
        Self {
            cooldown,
            min_movement_m,
            last_evaluated: None,
            force_next: false,
            outstanding: HashMap::new(),
        }
    }

    pub fn last_position(&self) -> Option<Position> {
        self.last_evaluated
    }

    /// Make the next gated update evaluate unconditionally. Cleared by the
    /// next evaluation, forced or not.
    pub fn arm_first_sample(&mut self) {
        self.force_next = true;
    }

    pub fn first_sample_armed(&self) -> bool {
        self.force_next
    }

    pub fn evaluate(&mut self, position: &Position, fences: &GeofenceSnapshot) -> Vec<ViolationAlert> {
        self.evaluate_at(position, fences, Instant::now())
    }

    /// Alerts for every active fence containing `position` that has no
    /// outstanding alert as of `now`. Each returned fence becomes outstanding.
    pub fn evaluate_at(
        &mut self,
        position: &Position,
        fences: &GeofenceSnapshot,
        now: Instant,
    ) -> Vec<ViolationAlert> {
        self.expire(now);

        if !position.is_valid() {
            log_warn!("not evaluating invalid position {position:?}");
            return Vec::new();
        }

        let mut violated: Vec<_> = fences.active().filter(|fence| fence.contains(position)).collect();
        violated.sort_by(|a, b| a.id.cmp(&b.id));

        let created_at = Utc::now();
        let mut alerts = Vec::new();
        for fence in violated {
            if self.outstanding.contains_key(&fence.id) {
                continue;
            }
            log_info!(
                "position {:.6}, {:.6} inside geofence {} ({})",
                position.latitude,
                position.longitude,
                fence.id,
                fence.name
            );
            self.outstanding.insert(fence.id.clone(), now);
            alerts.push(ViolationAlert::for_fence(fence, created_at));
        }

        alerts
    }

    /// Evaluate `position` only if it moved more than the threshold since the
    /// last evaluated position. The first position ever, and the first one
    /// after [`arm_first_sample`](Self::arm_first_sample), always evaluates.
    pub fn update_position_at(
        &mut self,
        position: Position,
        fences: &GeofenceSnapshot,
        now: Instant,
    ) -> PositionUpdate {
        if !position.is_valid() {
            return PositionUpdate::Rejected;
        }

        if self.force_next {
            return self.force_update_at(position, fences, now);
        }

        if let Some(last) = self.last_evaluated {
            let moved_m = last.distance_to(&position);
            if moved_m <= self.min_movement_m {
                return PositionUpdate::BelowThreshold { moved_m };
            }
        }

        self.force_update_at(position, fences, now)
    }

    pub fn update_position(&mut self, position: Position, fences: &GeofenceSnapshot) -> PositionUpdate {
        self.update_position_at(position, fences, Instant::now())
    }

    /// Evaluate regardless of how far the position moved. Used for explicit
    /// requests (one-shot fixes, manual entry).
    pub fn force_update_at(
        &mut self,
        position: Position,
        fences: &GeofenceSnapshot,
        now: Instant,
    ) -> PositionUpdate {
        if !position.is_valid() {
            return PositionUpdate::Rejected;
        }

        self.last_evaluated = Some(position);
        self.force_next = false;
        PositionUpdate::Evaluated(self.evaluate_at(&position, fences, now))
    }

    /// Ids of alerts still inside their cool-down at `now`, sorted.
    pub fn outstanding_at(&self, now: Instant) -> Vec<String> {
        let mut ids: Vec<String> = self
            .outstanding
            .iter()
            .filter(|(_, raised)| now.saturating_duration_since(**raised) < self.cooldown)
            .map(|(id, _)| ViolationAlert::alert_id(id))
            .collect();
        ids.sort();
        ids
    }

    fn expire(&mut self, now: Instant) {
        let cooldown = self.cooldown;
        self.outstanding
            .retain(|_, raised| now.saturating_duration_since(*raised) < cooldown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Geofence;

    fn fence(id: &str, lat: f64, lng: f64, radius_m: f64) -> Geofence {
        Geofence {
            id: id.into(),
            name: format!("Fence {id}"),
            center: Position::new(lat, lng),
            radius_m,
            description: None,
            active: true,
            state: None,
            city: None,
        }
    }

    fn shillong_fence() -> GeofenceSnapshot {
        GeofenceSnapshot::from_fences([fence("gf-1", 25.5788, 91.8933, 500.0)])
    }

    #[test]
    fn position_inside_fence_raises_one_alert() {
        let mut monitor = ViolationMonitor::default();
        let now = Instant::now();

        let alerts = monitor.evaluate_at(&Position::new(25.578, 91.893), &shillong_fence(), now);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].fence.id, "gf-1");
        assert_eq!(alerts[0].id, "violation-gf-1");
    }

    #[test]
    fn cooldown_suppresses_then_expires() {
        let mut monitor = ViolationMonitor::default();
        let fences = shillong_fence();
        let inside = Position::new(25.578, 91.893);
        let t0 = Instant::now();

        assert_eq!(monitor.evaluate_at(&inside, &fences, t0).len(), 1);
        assert!(monitor
            .evaluate_at(&inside, &fences, t0 + Duration::from_secs(5))
            .is_empty());
        assert_eq!(monitor.outstanding_at(t0 + Duration::from_secs(29)), vec!["violation-gf-1"]);
        assert!(monitor.outstanding_at(t0 + Duration::from_secs(30)).is_empty());
        assert_eq!(
            monitor
                .evaluate_at(&inside, &fences, t0 + Duration::from_secs(31))
                .len(),
            1
        );
    }

    #[test]
    fn boundary_is_inclusive() {
        let center = Position::new(25.5788, 91.8933);
        let edge_point = Position::new(25.5830, 91.8960);
        let d = center.distance_to(&edge_point);
        let now = Instant::now();

        let at_edge = GeofenceSnapshot::from_fences([fence("edge", 25.5788, 91.8933, d)]);
        assert_eq!(ViolationMonitor::default().evaluate_at(&edge_point, &at_edge, now).len(), 1);

        let just_short = GeofenceSnapshot::from_fences([fence("edge", 25.5788, 91.8933, d - 0.0001)]);
        assert!(ViolationMonitor::default()
            .evaluate_at(&edge_point, &just_short, now)
            .is_empty());
    }

    #[test]
    fn zero_radius_only_matches_center() {
        let fences = GeofenceSnapshot::from_fences([fence("pin", 25.5788, 91.8933, 0.0)]);
        let now = Instant::now();
        assert_eq!(
            ViolationMonitor::default()
                .evaluate_at(&Position::new(25.5788, 91.8933), &fences, now)
                .len(),
            1
        );
        assert!(ViolationMonitor::default()
            .evaluate_at(&Position::new(25.5789, 91.8933), &fences, now)
            .is_empty());
    }

    #[test]
    fn each_violated_fence_alerts_independently() {
        let fences = GeofenceSnapshot::from_fences([
            fence("a", 25.5788, 91.8933, 500.0),
            fence("b", 25.5790, 91.8930, 200.0),
            fence("far", 19.0760, 72.8777, 1000.0),
        ]);
        let alerts = ViolationMonitor::default().evaluate_at(
            &Position::new(25.5789, 91.8932),
            &fences,
            Instant::now(),
        );
        let ids: Vec<_> = alerts.iter().map(|a| a.fence.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn invalid_position_never_evaluates() {
        let mut monitor = ViolationMonitor::default();
        let fences = shillong_fence();
        let bad = Position::new(f64::NAN, 91.893);
        assert!(monitor.evaluate_at(&bad, &fences, Instant::now()).is_empty());
        assert_eq!(monitor.update_position_at(bad, &fences, Instant::now()), PositionUpdate::Rejected);
        assert!(monitor.last_position().is_none());
    }

    #[test]
    fn movement_threshold_gates_evaluation() {
        let mut monitor = ViolationMonitor::default();
        let fences = GeofenceSnapshot::new();
        let now = Instant::now();
        let start = Position::new(25.5788, 91.8933);

        assert!(matches!(
            monitor.update_position_at(start, &fences, now),
            PositionUpdate::Evaluated(_)
        ));

        // ~5.5 m north
        let nudge = Position::new(25.57885, 91.8933);
        match monitor.update_position_at(nudge, &fences, now) {
            PositionUpdate::BelowThreshold { moved_m } => assert!(moved_m < 10.0),
            other => panic!("expected BelowThreshold, got {other:?}"),
        }
        assert_eq!(monitor.last_position(), Some(start));

        // ~22 m north
        let step = Position::new(25.5790, 91.8933);
        assert!(matches!(
            monitor.update_position_at(step, &fences, now),
            PositionUpdate::Evaluated(_)
        ));
        assert_eq!(monitor.last_position(), Some(step));
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        let fences = GeofenceSnapshot::new();
        let now = Instant::now();
        let start = Position::new(25.5788, 91.8933);
        let next = Position::new(25.5789, 91.8933);
        let moved = start.distance_to(&next);

        let mut at_threshold = ViolationMonitor::new(DEFAULT_COOLDOWN, moved);
        at_threshold.update_position_at(start, &fences, now);
        match at_threshold.update_position_at(next, &fences, now) {
            PositionUpdate::BelowThreshold { moved_m } => assert_eq!(moved_m, moved),
            other => panic!("expected BelowThreshold, got {other:?}"),
        }

        let mut just_below = ViolationMonitor::new(DEFAULT_COOLDOWN, moved - 1e-6);
        just_below.update_position_at(start, &fences, now);
        assert!(matches!(
            just_below.update_position_at(next, &fences, now),
            PositionUpdate::Evaluated(_)
        ));
    }

    #[test]
    fn default_threshold_straddles_ten_metres() {
        let fences = GeofenceSnapshot::new();
        let now = Instant::now();
        let start = Position::new(25.5788, 91.8933);
        // Degrees of latitude per metre along a meridian.
        let per_m = (1.0 / crate::geo::EARTH_RADIUS_M).to_degrees();
        let just_under = Position::new(start.latitude + per_m * 9.999, start.longitude);
        let just_over = Position::new(start.latitude + per_m * 10.01, start.longitude);
        assert!((start.distance_to(&just_under) - 9.999).abs() < 1e-6);

        let mut monitor = ViolationMonitor::default();
        monitor.update_position_at(start, &fences, now);
        assert!(matches!(
            monitor.update_position_at(just_under, &fences, now),
            PositionUpdate::BelowThreshold { .. }
        ));
        assert!(matches!(
            monitor.update_position_at(just_over, &fences, now),
            PositionUpdate::Evaluated(_)
        ));
    }

    #[test]
    fn armed_monitor_evaluates_next_sample_once() {
        let mut monitor = ViolationMonitor::default();
        let fences = shillong_fence();
        let now = Instant::now();
        let outside = Position::new(25.57, 91.88);
        // ~3.3 m north
        let nearby = Position::new(25.57003, 91.88);

        monitor.force_update_at(outside, &fences, now);
        monitor.arm_first_sample();
        assert!(monitor.first_sample_armed());

        assert!(matches!(
            monitor.update_position_at(nearby, &fences, now),
            PositionUpdate::Evaluated(_)
        ));
        assert!(!monitor.first_sample_armed());
        assert_eq!(monitor.last_position(), Some(nearby));

        assert!(matches!(
            monitor.update_position_at(outside, &fences, now),
            PositionUpdate::BelowThreshold { .. }
        ));
    }

    #[test]
    fn rejected_sample_keeps_monitor_armed() {
        let mut monitor = ViolationMonitor::default();
        let fences = GeofenceSnapshot::new();
        monitor.arm_first_sample();
        assert_eq!(
            monitor.update_position_at(Position::new(f64::NAN, 0.0), &fences, Instant::now()),
            PositionUpdate::Rejected
        );
        assert!(monitor.first_sample_armed());
    }

    #[test]
    fn forced_update_ignores_threshold() {
        let mut monitor = ViolationMonitor::default();
        let fences = shillong_fence();
        let now = Instant::now();
        let inside = Position::new(25.578, 91.893);

        monitor.force_update_at(inside, &fences, now);
        match monitor.force_update_at(inside, &fences, now + Duration::from_secs(31)) {
            PositionUpdate::Evaluated(alerts) => assert_eq!(alerts.len(), 1),
            other => panic!("expected Evaluated, got {other:?}"),
        }
    }
}
