//! Geofence registry feeds.
//!
//! A feed returns raw records; validation happens when the session builds
//! its snapshot, so every feed gets the same exclusion rules.

use std::{fs, path::PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::log_warn;
use crate::models::GeofenceRecord;

const ENABLE_LOGS: bool = true;

#[async_trait]
pub trait GeofenceFeed: Send + Sync {
    async fn fetch(&self) -> Result<Vec<GeofenceRecord>>;
}

/// `{"success": true, "data": [...]}` payload served by the registry API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedEnvelope {
    #[serde(default)]
    pub success: bool,
    /// Entries that are not records at all are dropped with a warning.
    #[serde(default, deserialize_with = "records_skipping_malformed")]
    pub data: Vec<GeofenceRecord>,
    #[serde(default)]
    pub error: Option<String>,
}

fn records_skipping_malformed<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<GeofenceRecord>, D::Error> {
    let entries = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    let mut records = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<GeofenceRecord>(entry) {
            Ok(record) => records.push(record),
            Err(err) => log_warn!("skipping malformed geofence entry {index}: {err}"),
        }
    }
    Ok(records)
}

impl FeedEnvelope {
    pub fn into_records(self) -> Result<Vec<GeofenceRecord>> {
        if self.success {
            Ok(self.data)
        } else {
            Err(anyhow!(
                "geofence feed returned error: {}",
                self.error.as_deref().unwrap_or("unspecified")
            ))
        }
    }
}

/// Fixed set of records held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticFeed {
    records: Vec<GeofenceRecord>,
}

impl StaticFeed {
    pub fn new(records: Vec<GeofenceRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl GeofenceFeed for StaticFeed {
    async fn fetch(&self) -> Result<Vec<GeofenceRecord>> {
        Ok(self.records.clone())
    }
}

/// Reads a [`FeedEnvelope`] from disk on every fetch.
#[derive(Debug, Clone)]
pub struct JsonFileFeed {
    path: PathBuf,
}

impl JsonFileFeed {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl GeofenceFeed for JsonFileFeed {
    async fn fetch(&self) -> Result<Vec<GeofenceRecord>> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read geofences from {}", self.path.display()))?;
        let envelope: FeedEnvelope = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse geofences in {}", self.path.display()))?;
        envelope.into_records()
    }
}

/// Write records as an envelope, for seeding a [`JsonFileFeed`].
pub fn write_feed_file(path: &std::path::Path, records: &[GeofenceRecord]) -> Result<()> {
    let envelope = FeedEnvelope {
        success: true,
        data: records.to_vec(),
        error: None,
    };
    let serialized = serde_json::to_string_pretty(&envelope)?;
    fs::write(path, serialized)
        .with_context(|| format!("Failed to write geofences to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failed_envelope_is_an_error() {
        let envelope: FeedEnvelope =
            serde_json::from_value(json!({"success": false, "error": "db down"})).unwrap();
        let err = envelope.into_records().unwrap_err();
        assert!(err.to_string().contains("db down"));
    }

    #[tokio::test]
    async fn json_file_feed_reads_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geofences.json");
        fs::write(
            &path,
            json!({
                "success": true,
                "data": [
                    {"id": 1, "name": "Ward's Lake", "latitude": "25.5760", "longitude": "91.8860", "radius": 200},
                    {"id": 2, "name": "Broken", "latitude": "abc", "longitude": 91.0, "radius": 10}
                ]
            })
            .to_string(),
        )
        .unwrap();

        let records = JsonFileFeed::new(path).fetch().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "Ward's Lake");
    }

    #[tokio::test]
    async fn loosely_typed_entries_do_not_fail_the_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geofences.json");
        fs::write(
            &path,
            json!({
                "success": true,
                "data": [
                    {"id": 1, "name": "Ward's Lake", "latitude": 25.576, "longitude": 91.886, "radius": 200},
                    {"id": 2, "name": null, "latitude": 25.57, "longitude": 91.88, "radius": 100, "is_active": 1},
                    "not a record",
                    null
                ]
            })
            .to_string(),
        )
        .unwrap();

        let records = JsonFileFeed::new(path).fetch().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].name, "");
        assert_eq!(records[1].is_active, json!(1));

        let snapshot = crate::models::GeofenceSnapshot::from_records(records);
        assert_eq!(snapshot.active_count(), 2);
        assert_eq!(snapshot.get("2").unwrap().name, crate::models::UNNAMED_FENCE);
    }

    #[test]
    fn null_data_reads_as_empty() {
        let envelope: FeedEnvelope =
            serde_json::from_value(json!({"success": true, "data": null})).unwrap();
        assert!(envelope.into_records().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_file_reports_path() {
        let err = JsonFileFeed::new(PathBuf::from("/nonexistent/geofences.json"))
            .fetch()
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/geofences.json"));
    }
}
