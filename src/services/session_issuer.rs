use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::config::AttendancePolicy;
use crate::db::repository;
use crate::error::AppError;
use crate::models::{ClassSession, IssueSessionRequest, IssuedSession};
use crate::services::access;

const TOKEN_BYTES: usize = 32;

/// 32 bytes from the OS CSPRNG, hex encoded.
pub fn generate_token() -> String {
    let mut buf = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

pub struct SessionIssuer {
    db: SqlitePool,
    policy: AttendancePolicy,
}

impl SessionIssuer {
    pub fn new(db: SqlitePool, policy: AttendancePolicy) -> Self {
        Self { db, policy }
    }

    /// Persists a new session for `class_id` that expires `window` after `now`.
    ///
    /// The caller renders the returned token into a QR image.
    pub async fn issue_session(
        &self,
        class_id: &str,
        issuer: &AuthUser,
        req: IssueSessionRequest,
        now: DateTime<Utc>,
    ) -> Result<IssuedSession, AppError> {
        let (class, course) = access::load_class_with_course(&self.db, class_id).await?;
        access::ensure_course_manager(issuer, &course)?;

        let window = self.policy.session_window(req.window_minutes);
        let meta = req.metadata;
        if let Some(minutes) = meta.late_threshold_minutes {
            if !self.policy.accepts_late_threshold(minutes) {
                return Err(AppError::BadRequest(format!(
                    "late_threshold_minutes must be between 0 and {}",
                    self.policy.max_window.num_minutes()
                )));
            }
        }
        let session = ClassSession {
            id: Uuid::new_v4().to_string(),
            class_id: class.id.clone(),
            issued_by: issuer.id.clone(),
            token: generate_token(),
            room: meta.room.or(class.room),
            module_name: meta.module_name.or(Some(course.title)),
            time_window: meta.time_window,
            late_threshold_minutes: meta.late_threshold_minutes,
            created_at: now,
            expires_at: now + window,
        };

        repository::insert_class_session(&self.db, &session).await?;
        info!(
            "session {} issued for class {} by {} (expires {})",
            session.id, session.class_id, session.issued_by, session.expires_at
        );

        Ok(IssuedSession {
            session_id: session.id,
            token: session.token,
            expires_at: session.expires_at,
        })
    }
}
