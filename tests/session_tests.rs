use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{self, Duration};

use tourguard::db::NewGeofence;
use tourguard::geo::BoundingBoxRegions;
use tourguard::location::{PositionSample, WatchSubscription};
use tourguard::models::{NoticeKind, Severity};
use tourguard::scoring::{HealthEscalation, RiskLevel};
use tourguard::session::{ScoreReason, ScoreUpdate};
use tourguard::{
    ChannelSink, Database, GeofenceFeed, GeofenceRecord, MonitorConfig, MonitoringSession, Notice,
    Position, PositionError, PositionSource, PositionUpdate, ReplaySource, SessionEvent,
    StaticFeed,
};

const FENCE_CENTER: (f64, f64) = (25.5788, 91.8933);
const INSIDE: (f64, f64) = (25.578, 91.893);
const OUTSIDE: (f64, f64) = (25.57, 91.88);

fn fence(id: &str, latitude: f64, longitude: f64, radius: f64) -> GeofenceRecord {
    GeofenceRecord {
        id: json!(id),
        name: format!("Fence {id}"),
        latitude: json!(latitude),
        longitude: json!(longitude),
        radius: json!(radius),
        ..GeofenceRecord::default()
    }
}

fn restricted_fence() -> GeofenceRecord {
    fence("F1", FENCE_CENTER.0, FENCE_CENTER.1, 500.0)
}

fn fix((latitude, longitude): (f64, f64)) -> PositionSample {
    Ok(Position::new(latitude, longitude))
}

fn build_session(
    config: MonitorConfig,
    source: Arc<dyn PositionSource>,
    feed: Arc<dyn GeofenceFeed>,
) -> (MonitoringSession, UnboundedReceiver<SessionEvent>) {
    let (sink, events) = ChannelSink::new();
    let sink = Arc::new(sink);
    let session = MonitoringSession::with_parts(
        config,
        source,
        feed,
        sink.clone(),
        sink,
        Arc::new(BoundingBoxRegions::default()),
        StdRng::seed_from_u64(7),
    );
    (session, events)
}

fn replay(samples: Vec<PositionSample>, interval_secs: u64) -> Arc<dyn PositionSource> {
    Arc::new(ReplaySource::new(samples, Duration::from_secs(interval_secs)))
}

fn drain(events: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

fn notices(events: &[SessionEvent], kind: NoticeKind) -> Vec<&Notice> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::Alert(notice) if notice.kind == kind => Some(notice),
            _ => None,
        })
        .collect()
}

fn scores(events: &[SessionEvent]) -> Vec<&ScoreUpdate> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::Score(update) => Some(update),
            _ => None,
        })
        .collect()
}

fn alert_count(update: &PositionUpdate) -> usize {
    match update {
        PositionUpdate::Evaluated(alerts) => alerts.len(),
        other => panic!("expected an evaluation, got {other:?}"),
    }
}

/// Serves whatever records are loaded, or fails when emptied.
#[derive(Default)]
struct SwitchableFeed {
    records: Mutex<Option<Vec<GeofenceRecord>>>,
}

impl SwitchableFeed {
    fn set(&self, records: Option<Vec<GeofenceRecord>>) {
        *self.records.lock().unwrap() = records;
    }
}

#[async_trait]
impl GeofenceFeed for SwitchableFeed {
    async fn fetch(&self) -> Result<Vec<GeofenceRecord>> {
        self.records
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow!("registry unreachable"))
    }
}

/// Fails every one-shot request but streams the wrapped replay.
struct NoFixSource(ReplaySource);

#[async_trait]
impl PositionSource for NoFixSource {
    async fn current_position(&self) -> PositionSample {
        Err(PositionError::Timeout)
    }

    fn watch_position(&self) -> WatchSubscription {
        self.0.watch_position()
    }
}

#[tokio::test(start_paused = true)]
async fn cooldown_suppresses_repeat_alerts_until_expiry() {
    let (session, mut events) = build_session(
        MonitorConfig::default(),
        replay(Vec::new(), 1),
        Arc::new(StaticFeed::new(vec![restricted_fence()])),
    );
    assert_eq!(session.refresh_geofences().await.unwrap(), 1);

    let first = session.set_manual_position(INSIDE.0, INSIDE.1).await.unwrap();
    match &first {
        PositionUpdate::Evaluated(alerts) => {
            assert_eq!(alerts.len(), 1);
            assert_eq!(alerts[0].id, "violation-F1");
        }
        other => panic!("expected an evaluation, got {other:?}"),
    }

    time::advance(Duration::from_secs(5)).await;
    let repeat = session.set_manual_position(INSIDE.0, INSIDE.1).await.unwrap();
    assert_eq!(alert_count(&repeat), 0);
    assert_eq!(
        session.snapshot().await.outstanding_alerts,
        vec!["violation-F1".to_string()]
    );

    time::advance(Duration::from_secs(26)).await;
    let after_cooldown = session.set_manual_position(INSIDE.0, INSIDE.1).await.unwrap();
    assert_eq!(alert_count(&after_cooldown), 1);

    let events = drain(&mut events);
    let alerts = notices(&events, NoticeKind::RestrictedArea);
    assert_eq!(alerts.len(), 2);
    assert!(alerts.iter().all(|notice| notice.severity == Severity::Danger));
    assert!(alerts[0].message.contains("Fence F1"));
    // Every forced evaluation recomputes the score.
    assert_eq!(scores(&events).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn watch_skips_small_moves_and_reports_errors() {
    let nudged = (OUTSIDE.0 + 0.00003, OUTSIDE.1);
    let source = replay(
        vec![
            fix(OUTSIDE),
            fix(nudged),
            fix(INSIDE),
            Err(PositionError::Timeout),
        ],
        1,
    );
    let (session, mut events) = build_session(
        MonitorConfig::default(),
        source,
        Arc::new(StaticFeed::new(vec![restricted_fence()])),
    );
    session.refresh_geofences().await.unwrap();

    session.start_monitoring().await.unwrap();
    session.join_monitoring().await;

    let events = drain(&mut events);
    assert_eq!(notices(&events, NoticeKind::RestrictedArea).len(), 1);

    let location = notices(&events, NoticeKind::Location);
    assert_eq!(location.len(), 1);
    assert_eq!(location[0].severity, Severity::Warning);
    assert_eq!(location[0].message, PositionError::Timeout.user_message());

    // One-shot fix plus the move into the fence; the repeated and nudged
    // samples fall under the movement threshold.
    let scores = scores(&events);
    assert_eq!(scores.len(), 2);
    assert!(scores.iter().all(|update| update.reason == ScoreReason::Position));
    let inside_score = scores[1];
    assert_eq!(inside_score.breakdown.unwrap().restricted_penalty, -30);
    assert_eq!(inside_score.place_name.as_deref(), Some("Shillong, Meghalaya"));
    assert!((20..=100).contains(&inside_score.score.value()));

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.position, Some(Position::new(INSIDE.0, INSIDE.1)));
    assert_eq!(snapshot.last_error, Some(PositionError::Timeout));
    assert!(!snapshot.monitoring);
    session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn first_watch_sample_evaluates_when_initial_fix_fails() {
    // ~3.3 m from OUTSIDE, well inside the movement threshold.
    let nudged = (OUTSIDE.0 + 0.00003, OUTSIDE.1);
    let source = Arc::new(NoFixSource(ReplaySource::new(
        vec![fix(nudged), fix(OUTSIDE)],
        Duration::from_secs(1),
    )));
    let (session, mut events) = build_session(
        MonitorConfig::default(),
        source,
        Arc::new(StaticFeed::new(vec![restricted_fence()])),
    );
    session.refresh_geofences().await.unwrap();
    session.set_manual_position(OUTSIDE.0, OUTSIDE.1).await.unwrap();
    drain(&mut events);

    session.start_monitoring().await.unwrap();
    session.join_monitoring().await;

    let events = drain(&mut events);
    assert_eq!(notices(&events, NoticeKind::Location).len(), 1);
    // The first watch sample is evaluated despite the earlier manual fix;
    // the one after it is gated as usual.
    assert_eq!(scores(&events).len(), 1);

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.position, Some(Position::new(nudged.0, nudged.1)));
    assert_eq!(snapshot.last_error, None);
    session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn second_start_is_rejected_while_watching() {
    let (session, _events) = build_session(
        MonitorConfig::default(),
        replay(vec![fix(OUTSIDE), fix(INSIDE), fix(OUTSIDE)], 10),
        Arc::new(StaticFeed::default()),
    );

    session.start_monitoring().await.unwrap();
    assert!(session.is_monitoring().await);

    let err = session.start_monitoring().await.unwrap_err();
    assert!(err.to_string().contains("already active"));

    session.stop_monitoring().await.unwrap();
    assert!(!session.is_monitoring().await);

    session.start_monitoring().await.unwrap();
    assert!(session.is_monitoring().await);
    session.shutdown().await.unwrap();
    assert!(!session.is_monitoring().await);
}

#[tokio::test(start_paused = true)]
async fn stopped_watch_delivers_nothing_further() {
    let (session, mut events) = build_session(
        MonitorConfig::default(),
        replay(vec![fix(OUTSIDE), fix(INSIDE)], 60),
        Arc::new(StaticFeed::new(vec![restricted_fence()])),
    );
    session.refresh_geofences().await.unwrap();

    session.start_monitoring().await.unwrap();
    session.stop_monitoring().await.unwrap();
    time::sleep(Duration::from_secs(180)).await;

    let events = drain(&mut events);
    assert!(notices(&events, NoticeKind::RestrictedArea).is_empty());
    assert_eq!(
        session.snapshot().await.position,
        Some(Position::new(OUTSIDE.0, OUTSIDE.1))
    );
}

#[tokio::test]
async fn position_error_before_first_fix_keeps_base_score() {
    let (session, mut events) = build_session(
        MonitorConfig::default(),
        replay(vec![Err(PositionError::PermissionDenied)], 1),
        Arc::new(StaticFeed::new(vec![restricted_fence()])),
    );
    session.refresh_geofences().await.unwrap();

    let err = session.request_current_position().await.unwrap_err();
    assert_eq!(err, PositionError::PermissionDenied);

    let events = drain(&mut events);
    let location = notices(&events, NoticeKind::Location);
    assert_eq!(location.len(), 1);
    assert_eq!(location[0].severity, Severity::Danger);
    assert_eq!(
        location[0].message,
        "Location access denied. Please allow location permissions."
    );
    assert!(scores(&events).is_empty());

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.position, None);
    assert_eq!(snapshot.score.value(), 80);
    assert_eq!(snapshot.risk_level, RiskLevel::Low);
    assert_eq!(snapshot.last_error, Some(PositionError::PermissionDenied));
}

#[tokio::test]
async fn error_after_fix_keeps_last_position() {
    let (session, _events) = build_session(
        MonitorConfig::default(),
        replay(vec![Err(PositionError::PositionUnavailable)], 1),
        Arc::new(StaticFeed::default()),
    );

    session.set_manual_position(OUTSIDE.0, OUTSIDE.1).await.unwrap();
    let score = session.current_score().await;
    assert!(session.request_current_position().await.is_err());

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.position, Some(Position::new(OUTSIDE.0, OUTSIDE.1)));
    assert_eq!(snapshot.score, score);
}

#[tokio::test]
async fn manual_position_is_range_checked() {
    let (session, mut events) = build_session(
        MonitorConfig::default(),
        replay(Vec::new(), 1),
        Arc::new(StaticFeed::default()),
    );

    assert!(session.set_manual_position(91.0, 0.0).await.is_err());
    assert!(session.set_manual_position(0.0, -181.0).await.is_err());
    assert!(session.set_manual_position(f64::NAN, 10.0).await.is_err());
    assert!(drain(&mut events).is_empty());
    assert_eq!(session.snapshot().await.position, None);
}

#[tokio::test]
async fn refresh_failure_keeps_previous_snapshot() {
    let feed = Arc::new(SwitchableFeed::default());
    let mut malformed = fence("F2", 0.0, 0.0, 100.0);
    malformed.latitude = json!("abc");
    feed.set(Some(vec![restricted_fence(), malformed]));

    let (session, _events) =
        build_session(MonitorConfig::default(), replay(Vec::new(), 1), feed.clone());

    assert_eq!(session.refresh_geofences().await.unwrap(), 1);
    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.geofence_count, 1);
    assert_eq!(snapshot.rejected_geofences, 1);

    feed.set(None);
    assert!(session.refresh_geofences().await.is_err());
    assert_eq!(session.snapshot().await.geofence_count, 1);

    let update = session.set_manual_position(INSIDE.0, INSIDE.1).await.unwrap();
    assert_eq!(alert_count(&update), 1);
}

#[tokio::test]
async fn inactive_registry_fences_never_alert() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(dir.path().join("registry.sqlite3")).unwrap();
    let new_fence = |name: &str| NewGeofence {
        name: name.into(),
        description: Some("Restricted wildlife zone".into()),
        latitude: FENCE_CENTER.0,
        longitude: FENCE_CENTER.1,
        radius: 500.0,
        state: Some("Meghalaya".into()),
        city: Some("Shillong".into()),
        created_by: None,
    };
    let active = db.insert_geofence(new_fence("Active")).await.unwrap();
    let inactive = db.insert_geofence(new_fence("Inactive")).await.unwrap();
    db.set_geofence_active(inactive.id, false).await.unwrap();

    let (session, mut events) =
        build_session(MonitorConfig::default(), replay(Vec::new(), 1), Arc::new(db));
    assert_eq!(session.refresh_geofences().await.unwrap(), 1);

    session.set_manual_position(INSIDE.0, INSIDE.1).await.unwrap();
    let events = drain(&mut events);
    let alerts = notices(&events, NoticeKind::RestrictedArea);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].fence_id.as_deref(), Some(active.id.to_string().as_str()));
    assert!(alerts[0].message.ends_with("Restricted wildlife zone"));
}

#[tokio::test]
async fn health_checks_stay_in_bounds_and_escalate() {
    let mut config = MonitorConfig::default();
    config.scoring.health_step = 10;
    let (session, mut events) =
        build_session(config, replay(Vec::new(), 1), Arc::new(StaticFeed::default()));

    let mut adopted = 0;
    let mut high_risk = 0;
    for _ in 0..50 {
        let outcome = session.run_health_check().await;
        assert_eq!(session.current_score().await, outcome.resulting_score());
        assert!((20..=100).contains(&outcome.resulting_score().value()));
        if outcome.adopted {
            adopted += 1;
        }
        if outcome.escalation == Some(HealthEscalation::HighRisk) {
            high_risk += 1;
        }
    }

    let events = drain(&mut events);
    let health_scores = scores(&events)
        .into_iter()
        .filter(|update| update.reason == ScoreReason::HealthCheck)
        .count();
    assert_eq!(health_scores, adopted);
    assert_eq!(notices(&events, NoticeKind::SafetyScore).len(), high_risk);
}

#[tokio::test(start_paused = true)]
async fn health_ticker_fires_once_per_interval() {
    let mut config = MonitorConfig::default();
    config.scoring.adopt_threshold = 0;
    let (session, mut events) =
        build_session(config, replay(Vec::new(), 1), Arc::new(StaticFeed::default()));

    session.start_health_checks().await.unwrap();

    time::sleep(Duration::from_secs(44)).await;
    assert!(scores(&drain(&mut events)).is_empty());

    time::sleep(Duration::from_secs(2)).await;
    assert_eq!(scores(&drain(&mut events)).len(), 1);

    time::sleep(Duration::from_secs(45)).await;
    assert_eq!(scores(&drain(&mut events)).len(), 1);

    session.shutdown().await.unwrap();
    time::sleep(Duration::from_secs(90)).await;
    assert!(drain(&mut events).is_empty());
}
