//! Alert and notice models handed to the alert sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::geofence::Geofence;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Danger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NoticeKind {
    RestrictedArea,
    Location,
    SafetyScore,
    System,
}

/// Raised the first time a position falls inside a fence within a cool-down
/// episode. The id is derived from the fence, so at most one is live per fence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationAlert {
    pub id: String,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub fence: Geofence,
}

impl ViolationAlert {
    pub fn alert_id(fence_id: &str) -> String {
        format!("violation-{fence_id}")
    }

    pub fn for_fence(fence: &Geofence, created_at: DateTime<Utc>) -> Self {
        let advice = fence
            .description
            .as_deref()
            .unwrap_or("Please leave this area immediately.");

        Self {
            id: Self::alert_id(&fence.id),
            title: "Restricted Area Alert".into(),
            message: format!(
                "You have entered a restricted area: {}. {}",
                fence.name, advice
            ),
            created_at,
            fence: fence.clone(),
        }
    }
}

/// Structured notification for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub id: String,
    pub kind: NoticeKind,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fence_id: Option<String>,
}

impl Notice {
    pub fn new(kind: NoticeKind, severity: Severity, title: &str, message: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            severity,
            title: title.to_string(),
            message,
            timestamp: Utc::now(),
            fence_id: None,
        }
    }
}

impl From<&ViolationAlert> for Notice {
    fn from(alert: &ViolationAlert) -> Self {
        Self {
            id: alert.id.clone(),
            kind: NoticeKind::RestrictedArea,
            severity: Severity::Danger,
            title: alert.title.clone(),
            message: alert.message.clone(),
            timestamp: alert.created_at,
            fence_id: Some(alert.fence.id.clone()),
        }
    }
}
