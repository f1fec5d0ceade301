use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Local, Timelike, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::MonitorConfig;
use crate::feed::GeofenceFeed;
use crate::geo::{BoundingBoxRegions, Position, RegionResolver};
use crate::location::{PositionError, PositionSample, PositionSource};
use crate::models::{GeofenceSnapshot, Notice, NoticeKind, Severity};
use crate::monitor::{PositionUpdate, ViolationMonitor};
use crate::scoring::{
    run_health_check, HealthCheckOutcome, HealthEscalation, SafetyScore, SafetyScoreEngine,
    ScoreBreakdown,
};

use super::events::{AlertSink, ScoreReason, ScoreSink, ScoreUpdate};
use super::loops::{geofence_refresh_loop, health_check_loop, watch_loop};
use super::state::{SessionSnapshot, SessionState};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

const VERY_SAFE_SUMMARY: &str = "Monitoring active • Very safe environment";

/// Everything the background loops need, shared behind one `Arc`.
pub(crate) struct SessionCore {
    state: Mutex<SessionState>,
    engine: SafetyScoreEngine,
    feed: Arc<dyn GeofenceFeed>,
    alerts: Arc<dyn AlertSink>,
    scores: Arc<dyn ScoreSink>,
    default_position: Option<Position>,
}

impl SessionCore {
    pub(crate) async fn handle_sample(&self, sample: PositionSample, forced: bool) {
        match sample {
            Ok(position) => {
                self.handle_position(position, forced).await;
            }
            Err(err) => self.handle_position_error(err).await,
        }
    }

    /// Run `position` through the violation monitor. Evaluated positions
    /// publish their alerts and a recomputed score.
    pub(crate) async fn handle_position(&self, position: Position, forced: bool) -> PositionUpdate {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let now = Instant::now();

        let update = if forced {
            state.monitor.force_update_at(position, &state.geofences, now)
        } else {
            state.monitor.update_position_at(position, &state.geofences, now)
        };

        match &update {
            PositionUpdate::Evaluated(alerts) => {
                state.last_error = None;
                for alert in alerts {
                    self.alerts.publish_alert(Notice::from(alert));
                }
                self.rescore(state);
            }
            PositionUpdate::BelowThreshold { .. } => {}
            PositionUpdate::Rejected => {
                log_warn!("ignoring out-of-range position {position:?}");
            }
        }

        update
    }

    /// The next watch sample evaluates even when it sits within the movement
    /// threshold of a position recorded before this watch began.
    pub(crate) async fn arm_first_sample(&self) {
        self.state.lock().await.monitor.arm_first_sample();
    }

    /// Surface a source failure. The last evaluated position stays in place.
    pub(crate) async fn handle_position_error(&self, err: PositionError) {
        log_warn!("position source error: {err}");
        self.state.lock().await.last_error = Some(err);
        self.alerts.publish_alert(Notice::new(
            NoticeKind::Location,
            err.severity(),
            "Location Error",
            err.user_message().to_string(),
        ));
    }

    pub(crate) async fn health_check(&self) -> HealthCheckOutcome {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let outcome = run_health_check(state.score, self.engine.config(), &mut state.rng);
        if !outcome.adopted {
            return outcome;
        }

        state.score = outcome.candidate;
        let position = state.monitor.last_position();
        let summary = match outcome.escalation {
            Some(HealthEscalation::HighRisk) => {
                log_warn!("health check dropped score to {}", outcome.candidate);
                self.alerts.publish_alert(Notice::new(
                    NoticeKind::SafetyScore,
                    Severity::Danger,
                    "Safety Alert",
                    format!(
                        "Safety score dropped to {}. Enhanced monitoring activated.",
                        outcome.candidate
                    ),
                ));
                None
            }
            Some(HealthEscalation::VerySafe) => Some(VERY_SAFE_SUMMARY),
            None => None,
        };
        self.publish_score(outcome.candidate, ScoreReason::HealthCheck, position, None, summary);

        outcome
    }

    /// Replace the geofence snapshot with a fresh fetch. On failure the
    /// previous snapshot stays.
    pub(crate) async fn refresh_geofences(&self) -> Result<usize> {
        let records = self.feed.fetch().await.context("failed to fetch geofences")?;
        let snapshot = GeofenceSnapshot::from_records(records);
        let count = snapshot.len();
        log_info!(
            "loaded {} geofences ({} active, {} rejected)",
            count,
            snapshot.active_count(),
            snapshot.rejected()
        );
        self.state.lock().await.geofences = snapshot;
        Ok(count)
    }

    fn rescore(&self, state: &mut SessionState) {
        let position = state.monitor.last_position();
        let breakdown = self.engine.breakdown(
            position.as_ref(),
            &state.geofences,
            Local::now().hour(),
            &mut state.rng,
        );
        state.score = breakdown.score(self.engine.config());
        self.publish_score(state.score, ScoreReason::Position, position, Some(breakdown), None);
    }

    fn publish_score(
        &self,
        score: SafetyScore,
        reason: ScoreReason,
        position: Option<Position>,
        breakdown: Option<ScoreBreakdown>,
        summary: Option<&str>,
    ) {
        let risk_level = self.engine.risk_level(score);
        self.scores.publish_score(ScoreUpdate {
            score,
            risk_level,
            summary: summary.unwrap_or(risk_level.summary()).to_string(),
            reason,
            position,
            place_name: self.place_name(position),
            breakdown,
            timestamp: Utc::now(),
        });
    }

    fn place_name(&self, position: Option<Position>) -> Option<String> {
        position
            .or(self.default_position)
            .map(|position| self.engine.regions().place_name(&position))
    }
}

struct BackgroundTask {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
    finished: CancellationToken,
}

impl BackgroundTask {
    fn spawn<F>(task: impl FnOnce(CancellationToken) -> F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let cancel_token = CancellationToken::new();
        let finished = CancellationToken::new();
        let fut = task(cancel_token.clone());
        let guard = finished.clone().drop_guard();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            fut.await;
        });
        Self {
            handle,
            cancel_token,
            finished,
        }
    }

    fn is_running(&self) -> bool {
        !self.finished.is_cancelled()
    }

    async fn stop(self, name: &str) -> Result<()> {
        self.cancel_token.cancel();
        self.handle
            .await
            .with_context(|| format!("{name} task failed to join"))
    }
}

/// One tourist's monitoring session: geofence snapshot, violation state,
/// safety score and the background tasks that keep them current.
#[derive(Clone)]
pub struct MonitoringSession {
    id: String,
    config: MonitorConfig,
    core: Arc<SessionCore>,
    source: Arc<dyn PositionSource>,
    watch: Arc<Mutex<Option<BackgroundTask>>>,
    health: Arc<Mutex<Option<BackgroundTask>>>,
    refresh: Arc<Mutex<Option<BackgroundTask>>>,
}

impl MonitoringSession {
    pub fn new(
        config: MonitorConfig,
        source: Arc<dyn PositionSource>,
        feed: Arc<dyn GeofenceFeed>,
        alerts: Arc<dyn AlertSink>,
        scores: Arc<dyn ScoreSink>,
    ) -> Self {
        Self::with_parts(
            config,
            source,
            feed,
            alerts,
            scores,
            Arc::new(BoundingBoxRegions::default()),
            StdRng::from_entropy(),
        )
    }

    /// Like [`new`](Self::new) with an explicit region table and random
    /// source.
    pub fn with_parts(
        config: MonitorConfig,
        source: Arc<dyn PositionSource>,
        feed: Arc<dyn GeofenceFeed>,
        alerts: Arc<dyn AlertSink>,
        scores: Arc<dyn ScoreSink>,
        regions: Arc<dyn RegionResolver>,
        rng: StdRng,
    ) -> Self {
        let engine = SafetyScoreEngine::new(config.scoring.clone(), regions);
        let monitor = ViolationMonitor::new(
            Duration::from_secs(config.cooldown_secs),
            config.min_movement_m,
        );
        let state = SessionState::new(monitor, engine.default_score(), rng);

        Self {
            id: Uuid::new_v4().to_string(),
            core: Arc::new(SessionCore {
                state: Mutex::new(state),
                engine,
                feed,
                alerts,
                scores,
                default_position: config.default_position,
            }),
            config,
            source,
            watch: Arc::new(Mutex::new(None)),
            health: Arc::new(Mutex::new(None)),
            refresh: Arc::new(Mutex::new(None)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Load geofences, start the periodic tasks and begin watching position.
    /// A failed initial load is logged; monitoring starts with whatever
    /// snapshot is held.
    pub async fn start(&self) -> Result<()> {
        log_info!("starting monitoring session {}", self.id);
        if let Err(err) = self.refresh_geofences().await {
            log_error!("initial geofence load failed: {err:?}");
        }
        self.start_health_checks().await?;
        self.start_geofence_refresh().await?;
        self.start_monitoring().await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.stop_monitoring().await?;
        if let Some(task) = self.health.lock().await.take() {
            task.stop("health check").await?;
        }
        if let Some(task) = self.refresh.lock().await.take() {
            task.stop("geofence refresh").await?;
        }
        log_info!("monitoring session {} stopped", self.id);
        Ok(())
    }

    pub async fn refresh_geofences(&self) -> Result<usize> {
        self.core.refresh_geofences().await
    }

    /// Ask the source for one fix and evaluate it regardless of movement.
    /// Failures are published as location notices and returned.
    pub async fn request_current_position(&self) -> Result<PositionUpdate, PositionError> {
        match self.source.current_position().await {
            Ok(position) => Ok(self.core.handle_position(position, true).await),
            Err(err) => {
                self.core.handle_position_error(err).await;
                Err(err)
            }
        }
    }

    /// Evaluate a hand-entered position as if it came from the source.
    pub async fn set_manual_position(&self, latitude: f64, longitude: f64) -> Result<PositionUpdate> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            bail!("latitude must be between -90 and 90");
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            bail!("longitude must be between -180 and 180");
        }
        Ok(self
            .core
            .handle_position(Position::new(latitude, longitude), true)
            .await)
    }

    /// Take a one-shot fix, then follow the source's watch until stopped.
    pub async fn start_monitoring(&self) -> Result<()> {
        let mut watch = self.watch.lock().await;
        if watch.as_ref().is_some_and(BackgroundTask::is_running) {
            bail!("location monitoring already active");
        }
        if let Some(stale) = watch.take() {
            stale.stop("position watch").await?;
        }

        self.core.arm_first_sample().await;
        // Errors were already published as notices.
        let _ = self.request_current_position().await;

        let subscription = self.source.watch_position();
        let core = self.core.clone();
        *watch = Some(BackgroundTask::spawn(move |token| {
            watch_loop(core, subscription, token)
        }));
        log_info!("location monitoring started");
        Ok(())
    }

    /// Cancel the watch and wait for its task to finish. A no-op when not
    /// monitoring.
    pub async fn stop_monitoring(&self) -> Result<()> {
        if let Some(task) = self.watch.lock().await.take() {
            task.stop("position watch").await?;
            log_info!("location monitoring stopped");
        }
        Ok(())
    }

    /// Wait until the source closes the watch on its own. The task stays
    /// registered, so `stop_monitoring` still reaps it.
    pub async fn join_monitoring(&self) {
        let finished = self
            .watch
            .lock()
            .await
            .as_ref()
            .map(|task| task.finished.clone());
        if let Some(finished) = finished {
            finished.cancelled().await;
        }
    }

    pub async fn is_monitoring(&self) -> bool {
        self.watch
            .lock()
            .await
            .as_ref()
            .is_some_and(BackgroundTask::is_running)
    }

    pub async fn start_health_checks(&self) -> Result<()> {
        let period = Duration::from_secs(self.config.health_check_interval_secs);
        let core = self.core.clone();
        let mut health = self.health.lock().await;
        if let Some(previous) = health.take() {
            previous.stop("health check").await?;
        }
        *health = Some(BackgroundTask::spawn(move |token| {
            health_check_loop(core, period, token)
        }));
        Ok(())
    }

    pub async fn start_geofence_refresh(&self) -> Result<()> {
        let period = Duration::from_secs(self.config.geofence_refresh_secs);
        let core = self.core.clone();
        let mut refresh = self.refresh.lock().await;
        if let Some(previous) = refresh.take() {
            previous.stop("geofence refresh").await?;
        }
        *refresh = Some(BackgroundTask::spawn(move |token| {
            geofence_refresh_loop(core, period, token)
        }));
        Ok(())
    }

    /// One health-check tick, outside the periodic task.
    pub async fn run_health_check(&self) -> HealthCheckOutcome {
        self.core.health_check().await
    }

    pub async fn current_score(&self) -> SafetyScore {
        self.core.state.lock().await.score
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let monitoring = self.is_monitoring().await;
        let state = self.core.state.lock().await;
        let position = state.position();

        SessionSnapshot {
            session_id: self.id.clone(),
            position,
            place_name: self.core.place_name(position),
            score: state.score,
            risk_level: self.core.engine.risk_level(state.score),
            geofence_count: state.geofences.len(),
            active_geofence_count: state.geofences.active_count(),
            rejected_geofences: state.geofences.rejected(),
            outstanding_alerts: state.monitor.outstanding_at(Instant::now()),
            monitoring,
            last_error: state.last_error,
        }
    }
}
