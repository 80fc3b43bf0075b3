use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use url::Url;

use crate::db::repository;
use crate::error::AppError;
use crate::models::SessionInfo;
use crate::services::access;

/// Pulls the session token out of whatever the scanner read: either the bare
/// token or a link carrying it as `?token=`.
pub fn extract_token(scanned: &str) -> Option<String> {
    let scanned = scanned.trim();
    if scanned.is_empty() {
        return None;
    }

    let parsed = Url::parse(scanned).ok().or_else(|| {
        scanned
            .contains('?')
            .then(|| Url::parse("http://localhost/").and_then(|base| base.join(scanned)).ok())
            .flatten()
    });
    if let Some(url) = parsed {
        return url
            .query_pairs()
            .find(|(key, _)| key == "token")
            .map(|(_, value)| value.trim().to_string())
            .filter(|token| !token.is_empty());
    }

    if scanned.chars().any(char::is_whitespace) {
        return None;
    }
    Some(scanned.to_string())
}

pub struct TokenValidator {
    db: SqlitePool,
}

impl TokenValidator {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Resolves a still-valid session to its class and course.
    ///
    /// Unknown, expired and blank tokens all yield the same `InvalidToken`.
    /// Validation has no side effects and does not consume the session.
    pub async fn validate_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionInfo, AppError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::InvalidToken);
        }

        let session = repository::find_session_by_token(&self.db, token)
            .await?
            .filter(|s| s.is_valid_at(now))
            .ok_or(AppError::InvalidToken)?;

        let (class, course) = access::load_class_with_course(&self.db, &session.class_id).await?;

        Ok(SessionInfo {
            session,
            class,
            course,
        })
    }
}
