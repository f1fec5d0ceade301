//! Geofence registry rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::GeofenceRecord;

/// A stored geofence. Coordinates stay untyped until validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub latitude: Value,
    pub longitude: Value,
    pub radius: Value,
    pub is_active: bool,
    pub state: Option<String>,
    pub city: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<GeofenceRow> for GeofenceRecord {
    fn from(row: GeofenceRow) -> Self {
        Self {
            id: Value::from(row.id),
            name: row.name,
            description: row.description,
            latitude: row.latitude,
            longitude: row.longitude,
            radius: row.radius,
            is_active: Value::Bool(row.is_active),
            state: row.state,
            city: row.city,
        }
    }
}

/// Input for registering a geofence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGeofence {
    pub name: String,
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub radius: f64,
    pub state: Option<String>,
    pub city: Option<String>,
    pub created_by: Option<String>,
}
