use std::{env, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use log::{error, info};
use tokio::time::Duration;

use tourguard::{
    init_logging, ChannelSink, Database, FeedSource, GeofenceFeed, JsonFileFeed, MonitorConfig,
    MonitoringSession, ReplaySource,
};

const DEFAULT_CONFIG_PATH: &str = "tourguard.json";

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let track_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: tourguard <track.json>")?;
    let config_path = env::var("TOURGUARD_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = MonitorConfig::load(&config_path)?;

    let feed: Arc<dyn GeofenceFeed> = match &config.feed {
        FeedSource::JsonFile { path } => Arc::new(JsonFileFeed::new(path.clone())),
        FeedSource::Sqlite { path } => Arc::new(Database::new(path.clone())?),
    };
    let source = Arc::new(ReplaySource::from_json_file(
        &track_path,
        Duration::from_millis(config.replay_interval_ms),
    )?);
    info!("replaying {} samples from {}", source.len(), track_path.display());

    let (sink, mut events) = ChannelSink::new();
    let sink = Arc::new(sink);
    let session = MonitoringSession::new(config, source, feed, sink.clone(), sink);

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(err) => error!("failed to serialize event: {err}"),
            }
        }
    });

    session.start().await?;
    tokio::select! {
        _ = session.join_monitoring() => info!("track finished"),
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    let snapshot = session.snapshot().await;
    session.shutdown().await?;
    // The session holds the last sender; dropping it lets the printer drain and exit.
    drop(session);
    printer.await.context("event printer failed to join")?;

    println!("{}", serde_json::to_string(&snapshot)?);
    Ok(())
}
