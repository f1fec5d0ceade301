//! Position feed abstraction.
//!
//! A source answers one-shot requests and hands out at most one continuous
//! subscription per caller. Cancelling (or dropping) the subscription stops
//! delivery.

pub mod replay;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::geo::Position;
use crate::models::Severity;

pub use replay::{ReplaySource, TrackPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable")]
    PositionUnavailable,
    #[error("position request timed out")]
    Timeout,
    #[error("unknown location error")]
    Unknown,
}

impl PositionError {
    pub fn user_message(&self) -> &'static str {
        match self {
            PositionError::PermissionDenied => {
                "Location access denied. Please allow location permissions."
            }
            PositionError::PositionUnavailable => {
                "Location unavailable. Using last known location."
            }
            PositionError::Timeout => "Location request timed out. Please try again.",
            PositionError::Unknown => "Location error occurred.",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            PositionError::PositionUnavailable | PositionError::Timeout => Severity::Warning,
            PositionError::PermissionDenied | PositionError::Unknown => Severity::Danger,
        }
    }
}

pub type PositionSample = Result<Position, PositionError>;

/// Handle to a continuous position subscription.
pub struct WatchSubscription {
    samples: mpsc::Receiver<PositionSample>,
    cancel: CancellationToken,
}

impl WatchSubscription {
    pub fn new(samples: mpsc::Receiver<PositionSample>, cancel: CancellationToken) -> Self {
        Self { samples, cancel }
    }

    /// Next sample, or `None` once cancelled or the source hangs up.
    pub async fn next(&mut self) -> Option<PositionSample> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            sample = self.samples.recv() => sample,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for WatchSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn current_position(&self) -> PositionSample;

    fn watch_position(&self) -> WatchSubscription;
}
