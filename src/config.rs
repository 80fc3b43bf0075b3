use std::env;
use std::str::FromStr;

use chrono::TimeDelta;

use crate::error::AppError;

const DEFAULT_LATE_THRESHOLD_MINUTES: i64 = 10;
const DEFAULT_SESSION_WINDOW_MINUTES: i64 = 30;
const DEFAULT_MAX_SESSION_WINDOW_MINUTES: i64 = 240;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub jwt_ttl_minutes: i64,
    pub policy: AttendancePolicy,
}

/// Time rules handed to the issuer and to whoever calls the recorder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttendancePolicy {
    pub late_threshold: TimeDelta,
    pub default_window: TimeDelta,
    pub max_window: TimeDelta,
}

impl Default for AttendancePolicy {
    fn default() -> Self {
        Self {
            late_threshold: TimeDelta::minutes(DEFAULT_LATE_THRESHOLD_MINUTES),
            default_window: TimeDelta::minutes(DEFAULT_SESSION_WINDOW_MINUTES),
            max_window: TimeDelta::minutes(DEFAULT_MAX_SESSION_WINDOW_MINUTES),
        }
    }
}

impl AttendancePolicy {
    /// Caller-supplied window, else the default, clamped to `1..=max_window`.
    pub fn session_window(&self, requested_minutes: Option<i64>) -> TimeDelta {
        let minutes = requested_minutes.unwrap_or(self.default_window.num_minutes());
        TimeDelta::minutes(minutes.clamp(1, self.max_window.num_minutes().max(1)))
    }

    /// A lecturer's per-session preference wins over the configured default.
    /// Stored values that are negative or not representable fall back to it.
    pub fn late_threshold_for(&self, preference_minutes: Option<i64>) -> TimeDelta {
        preference_minutes
            .filter(|m| *m >= 0)
            .and_then(TimeDelta::try_minutes)
            .unwrap_or(self.late_threshold)
    }

    /// Per-session late thresholds are limited to `0..=max_window`.
    pub fn accepts_late_threshold(&self, minutes: i64) -> bool {
        (0..=self.max_window.num_minutes()).contains(&minutes)
    }
}

impl AppConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| AppError::Config("JWT_SECRET is not set".to_string()))?;

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://attendance.db?mode=rwc".to_string()),
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_var("PORT", 3000)?,
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", 5)?,
            jwt_secret,
            jwt_ttl_minutes: parse_var("JWT_TTL_MINUTES", 60)?,
            policy: AttendancePolicy {
                late_threshold: minutes_var("LATE_THRESHOLD_MINUTES", DEFAULT_LATE_THRESHOLD_MINUTES)?,
                default_window: minutes_var("SESSION_WINDOW_MINUTES", DEFAULT_SESSION_WINDOW_MINUTES)?,
                max_window: minutes_var("MAX_SESSION_WINDOW_MINUTES", DEFAULT_MAX_SESSION_WINDOW_MINUTES)?,
            },
        })
    }
}

fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} is not a valid value: {:?}", key, raw))),
        Err(_) => Ok(default),
    }
}

fn minutes_var(key: &str, default: i64) -> Result<TimeDelta, AppError> {
    let minutes: i64 = parse_var(key, default)?;
    TimeDelta::try_minutes(minutes)
        .filter(|d| *d >= TimeDelta::zero())
        .ok_or_else(|| AppError::Config(format!("{} is out of range: {}", key, minutes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_window_defaults_and_clamps() {
        let policy = AttendancePolicy::default();
        assert_eq!(policy.session_window(None), TimeDelta::minutes(30));
        assert_eq!(policy.session_window(Some(45)), TimeDelta::minutes(45));
        assert_eq!(policy.session_window(Some(0)), TimeDelta::minutes(1));
        assert_eq!(policy.session_window(Some(10_000)), TimeDelta::minutes(240));
    }

    #[test]
    fn test_late_threshold_prefers_session_value() {
        let policy = AttendancePolicy::default();
        assert_eq!(policy.late_threshold_for(None), TimeDelta::minutes(10));
        assert_eq!(policy.late_threshold_for(Some(5)), TimeDelta::minutes(5));
        assert_eq!(policy.late_threshold_for(Some(-3)), TimeDelta::minutes(10));
        assert_eq!(policy.late_threshold_for(Some(i64::MAX)), TimeDelta::minutes(10));
    }

    #[test]
    fn test_late_threshold_range() {
        let policy = AttendancePolicy::default();
        assert!(policy.accepts_late_threshold(0));
        assert!(policy.accepts_late_threshold(240));
        assert!(!policy.accepts_late_threshold(241));
        assert!(!policy.accepts_late_threshold(-1));
        assert!(!policy.accepts_late_threshold(1_000_000_000_000));
    }
}
