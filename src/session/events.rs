use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::geo::Position;
use crate::models::Notice;
use crate::scoring::{RiskLevel, SafetyScore, ScoreBreakdown};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScoreReason {
    Position,
    HealthCheck,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreUpdate {
    pub score: SafetyScore,
    pub risk_level: RiskLevel,
    pub summary: String,
    pub reason: ScoreReason,
    pub position: Option<Position>,
    pub place_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<ScoreBreakdown>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum SessionEvent {
    Alert(Notice),
    Score(ScoreUpdate),
}

/// Receives violation alerts and other notices.
pub trait AlertSink: Send + Sync {
    fn publish_alert(&self, notice: Notice);
}

/// Receives every score the session adopts.
pub trait ScoreSink: Send + Sync {
    fn publish_score(&self, update: ScoreUpdate);
}

/// Forwards everything to one unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: SessionEvent) {
        // A closed receiver means nobody is displaying events any more.
        let _ = self.tx.send(event);
    }
}

impl AlertSink for ChannelSink {
    fn publish_alert(&self, notice: Notice) {
        self.send(SessionEvent::Alert(notice));
    }
}

impl ScoreSink for ChannelSink {
    fn publish_score(&self, update: ScoreUpdate) {
        self.send(SessionEvent::Score(update));
    }
}
