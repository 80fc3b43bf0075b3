use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::{Class, Course};

/// A lecturer-issued attendance window. Rows are never mutated and stay in
/// place after `expires_at`; they just stop validating.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ClassSession {
    pub id: String,
    pub class_id: String,
    pub issued_by: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub room: Option<String>,
    pub module_name: Option<String>,
    pub time_window: Option<String>,
    pub late_threshold_minutes: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ClassSession {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Optional metadata shown next to the QR code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub room: Option<String>,
    pub module_name: Option<String>,
    pub time_window: Option<String>,
    pub late_threshold_minutes: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueSessionRequest {
    pub window_minutes: Option<i64>,
    #[serde(flatten)]
    pub metadata: SessionMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedSession {
    pub session_id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// What a successful token validation resolves to.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session: ClassSession,
    pub class: Class,
    pub course: Course,
}
