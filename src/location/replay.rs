use std::{fs, path::Path};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{PositionError, PositionSample, PositionSource, WatchSubscription};
use crate::geo::Position;

const WATCH_BUFFER: usize = 16;

/// One entry of a recorded track: either a fix or a failed reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrackPoint {
    Fix { latitude: f64, longitude: f64 },
    Failure { error: PositionError },
}

impl From<TrackPoint> for PositionSample {
    fn from(point: TrackPoint) -> Self {
        match point {
            TrackPoint::Fix {
                latitude,
                longitude,
            } => Ok(Position::new(latitude, longitude)),
            TrackPoint::Failure { error } => Err(error),
        }
    }
}

/// Replays a fixed track. One-shot requests return the first sample; a watch
/// delivers every sample, one per `interval`, then hangs up.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    samples: Vec<PositionSample>,
    interval: Duration,
}

impl ReplaySource {
    pub fn new(samples: Vec<PositionSample>, interval: Duration) -> Self {
        Self { samples, interval }
    }

    pub fn from_track(points: Vec<TrackPoint>, interval: Duration) -> Self {
        Self::new(points.into_iter().map(PositionSample::from).collect(), interval)
    }

    pub fn from_json_file(path: &Path, interval: Duration) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read track from {}", path.display()))?;
        let points: Vec<TrackPoint> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse track {}", path.display()))?;
        Ok(Self::from_track(points, interval))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[async_trait]
impl PositionSource for ReplaySource {
    async fn current_position(&self) -> PositionSample {
        self.samples
            .first()
            .cloned()
            .unwrap_or(Err(PositionError::PositionUnavailable))
    }

    fn watch_position(&self) -> WatchSubscription {
        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let samples = self.samples.clone();
        let interval = self.interval;

        tokio::spawn(async move {
            for sample in samples {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }
                if tx.send(sample).await.is_err() {
                    return;
                }
            }
        });

        WatchSubscription::new(rx, cancel)
    }
}
