//! Geofence data models.
//!
//! `GeofenceRecord` is what a feed hands us, loosely typed the way the
//! registry backends serve it. `Geofence` is a record that passed
//! validation; only those ever reach distance checks.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::geo::{within_radius, Position};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// Display name for fences the registry left unnamed.
pub const UNNAMED_FENCE: &str = "Unnamed Geo-fence";

/// Geofence as delivered by a registry feed, before validation.
///
/// Coordinates and radius may be JSON numbers or numeric strings, and the id
/// may be either a serial number or a string key. Any JSON object decodes;
/// type problems surface later as a [`GeofenceRejection`] for that record
/// alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeofenceRecord {
    #[serde(default)]
    pub id: Value,
    /// Null or non-text names decode as empty.
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_optional_text")]
    pub description: Option<String>,
    #[serde(default)]
    pub latitude: Value,
    #[serde(default)]
    pub longitude: Value,
    #[serde(default)]
    pub radius: Value,
    /// Bool, 0/1, or "true"/"false". Missing or null means active.
    #[serde(default)]
    pub is_active: Value,
    #[serde(default, deserialize_with = "lenient_optional_text")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient_optional_text")]
    pub city: Option<String>,
}

fn text_of(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(text_of(Value::deserialize(deserializer)?).unwrap_or_default())
}

fn lenient_optional_text<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(text_of(Value::deserialize(deserializer)?))
}

/// Why a record was left out of the snapshot.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeofenceRejection {
    #[error("missing identifier")]
    MissingId,
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("{field} is not a finite number: {raw}")]
    NotNumeric { field: &'static str, raw: String },
    #[error("{0} is zero")]
    ZeroCoordinate(&'static str),
    #[error("{field} {value} is out of range")]
    OutOfRange { field: &'static str, value: f64 },
    #[error("radius {0} is negative")]
    NegativeRadius(f64),
    #[error("is_active is not a flag: {0}")]
    InvalidFlag(String),
}

/// A validated circular region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geofence {
    pub id: String,
    pub name: String,
    pub center: Position,
    pub radius_m: f64,
    pub description: Option<String>,
    pub active: bool,
    pub state: Option<String>,
    pub city: Option<String>,
}

impl Geofence {
    pub fn distance_from(&self, position: &Position) -> f64 {
        self.center.distance_to(position)
    }

    /// Radius-inclusive containment. Invalid positions are never inside.
    pub fn contains(&self, position: &Position) -> bool {
        position.is_valid() && within_radius(self.distance_from(position), self.radius_m)
    }
}

impl TryFrom<GeofenceRecord> for Geofence {
    type Error = GeofenceRejection;

    fn try_from(record: GeofenceRecord) -> Result<Self, Self::Error> {
        let id = record_id(&record.id)?;

        let latitude = numeric_field(&record.latitude, "latitude")?;
        let longitude = numeric_field(&record.longitude, "longitude")?;
        let radius_m = numeric_field(&record.radius, "radius")?;

        if latitude == 0.0 {
            return Err(GeofenceRejection::ZeroCoordinate("latitude"));
        }
        if longitude == 0.0 {
            return Err(GeofenceRejection::ZeroCoordinate("longitude"));
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(GeofenceRejection::OutOfRange {
                field: "latitude",
                value: latitude,
            });
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(GeofenceRejection::OutOfRange {
                field: "longitude",
                value: longitude,
            });
        }
        if radius_m < 0.0 {
            return Err(GeofenceRejection::NegativeRadius(radius_m));
        }
        let active = activity_flag(&record.is_active)?;

        let name = match record.name.trim() {
            "" => UNNAMED_FENCE.to_string(),
            trimmed => trimmed.to_string(),
        };

        Ok(Self {
            id,
            name,
            center: Position::new(latitude, longitude),
            radius_m,
            description: record.description.filter(|d| !d.trim().is_empty()),
            active,
            state: record.state,
            city: record.city,
        })
    }
}

fn record_id(value: &Value) -> Result<String, GeofenceRejection> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(GeofenceRejection::MissingId),
    }
}

fn activity_flag(value: &Value) -> Result<bool, GeofenceRejection> {
    match value {
        Value::Null => Ok(true),
        Value::Bool(flag) => Ok(*flag),
        Value::Number(n) => match n.as_f64() {
            Some(v) if v == 0.0 => Ok(false),
            Some(v) if v == 1.0 => Ok(true),
            _ => Err(GeofenceRejection::InvalidFlag(n.to_string())),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(GeofenceRejection::InvalidFlag(value.to_string())),
        },
        other => Err(GeofenceRejection::InvalidFlag(other.to_string())),
    }
}

fn numeric_field(value: &Value, field: &'static str) -> Result<f64, GeofenceRejection> {
    let parsed = match value {
        Value::Null => return Err(GeofenceRejection::Missing(field)),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(GeofenceRejection::NotNumeric {
            field,
            raw: value.to_string(),
        }),
    }
}

/// Read-only view of the registry at the last refresh, keyed by fence id.
#[derive(Debug, Clone, Default)]
pub struct GeofenceSnapshot {
    fences: HashMap<String, Geofence>,
    rejected: usize,
}

impl GeofenceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate every record, dropping (and logging) the ones that fail.
    /// A repeated id replaces the earlier fence.
    pub fn from_records(records: Vec<GeofenceRecord>) -> Self {
        let mut fences = HashMap::with_capacity(records.len());
        let mut rejected = 0;

        for record in records {
            let label = if record.name.is_empty() {
                record.id.to_string()
            } else {
                record.name.clone()
            };

            match Geofence::try_from(record) {
                Ok(fence) => {
                    if let Some(previous) = fences.insert(fence.id.clone(), fence) {
                        log_warn!("duplicate geofence id {}; keeping the later record", previous.id);
                    }
                }
                Err(reason) => {
                    rejected += 1;
                    log_warn!("skipping invalid geofence {label}: {reason}");
                }
            }
        }

        Self { fences, rejected }
    }

    pub fn from_fences(fences: impl IntoIterator<Item = Geofence>) -> Self {
        Self {
            fences: fences
                .into_iter()
                .map(|fence| (fence.id.clone(), fence))
                .collect(),
            rejected: 0,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Geofence> {
        self.fences.get(id)
    }

    pub fn len(&self) -> usize {
        self.fences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fences.is_empty()
    }

    /// Records dropped during validation of the refresh that built this snapshot.
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn active(&self) -> impl Iterator<Item = &Geofence> {
        self.fences.values().filter(|fence| fence.active)
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    /// Any active fence containing `position`.
    pub fn containing(&self, position: &Position) -> Option<&Geofence> {
        self.active().find(|fence| fence.contains(position))
    }
}
