use chrono::{DateTime, TimeDelta, Utc};
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::repository;
use crate::error::{AppError, is_unique_violation};
use crate::models::{
    AttendanceMethod, AttendanceRecord, AttendanceStatus, Class, Course, FinalizeSummary,
    GeoLocation, SessionInfo,
};
use crate::services::access;

/// Where a mark points: a validated session (scanned methods) or a class
/// addressed directly (manual entry).
#[derive(Debug, Clone)]
pub enum MarkTarget {
    Session(Box<SessionInfo>),
    Class(String),
}

#[derive(Debug, Clone)]
pub struct MarkAttendance {
    pub target: MarkTarget,
    pub student_id: String,
    pub method: AttendanceMethod,
    pub location: Option<GeoLocation>,
    pub reason: Option<String>,
    /// Chosen by the caller; see `AttendancePolicy::late_threshold_for`.
    pub late_threshold: TimeDelta,
}

/// LATE from `starts_at + threshold` onwards, inclusive. A cut-off past the
/// end of representable time is never reached.
pub fn classify(starts_at: DateTime<Utc>, now: DateTime<Utc>, threshold: TimeDelta) -> AttendanceStatus {
    match starts_at.checked_add_signed(threshold) {
        Some(cutoff) if now >= cutoff => AttendanceStatus::Late,
        _ => AttendanceStatus::Present,
    }
}

pub struct AttendanceRecorder {
    db: SqlitePool,
}

impl AttendanceRecorder {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Records one student's attendance for one class.
    ///
    /// Scanned methods must be submitted by the student themselves; MANUAL
    /// entries by the course lecturer or an administrator. The unique index on
    /// (class, student) is the final word on duplicates.
    pub async fn mark_attendance(
        &self,
        req: MarkAttendance,
        actor: &AuthUser,
        now: DateTime<Utc>,
    ) -> Result<AttendanceRecord, AppError> {
        if req.method == AttendanceMethod::Facial {
            return Err(AppError::NotImplemented("Facial recognition"));
        }

        let (class, course) = self.resolve_target(&req).await?;
        self.authorize(&req, actor, &course)?;

        if repository::find_attendance(&self.db, &class.id, &req.student_id)
            .await?
            .is_some()
        {
            warn!("duplicate mark for class {} by student {}", class.id, req.student_id);
            return Err(AppError::DuplicateAttendance);
        }

        if !repository::is_enrolled(&self.db, &req.student_id, &course.id).await? {
            warn!("student {} not enrolled in course {}", req.student_id, course.id);
            return Err(AppError::NotEnrolled);
        }

        let status = classify(class.starts_at, now, req.late_threshold);

        if req.method == AttendanceMethod::Beacon && !class.is_in_session(now) {
            return Err(AppError::ClassNotInSession);
        }

        let record = AttendanceRecord {
            id: Uuid::new_v4().to_string(),
            class_id: class.id.clone(),
            student_id: req.student_id,
            status,
            method: req.method,
            latitude: req.location.map(|l| l.latitude),
            longitude: req.location.map(|l| l.longitude),
            reason: req.reason.filter(|r| !r.trim().is_empty()),
            marked_at: now,
            updated_at: now,
        };

        match repository::insert_attendance(&self.db, &record).await {
            Ok(()) => {}
            Err(e) if is_unique_violation(&e) => return Err(AppError::DuplicateAttendance),
            Err(e) => return Err(e.into()),
        }

        info!(
            "attendance {:?} via {:?} for student {} in class {}",
            record.status, record.method, record.student_id, record.class_id
        );
        Ok(record)
    }

    /// Lecturer/admin override. Updates an existing record (typically ABSENT)
    /// to MANUAL/PRESENT with a reason, or creates it when there is none.
    pub async fn override_attendance(
        &self,
        class_id: &str,
        student_id: &str,
        reason: &str,
        actor: &AuthUser,
        now: DateTime<Utc>,
    ) -> Result<AttendanceRecord, AppError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::BadRequest("an override needs a reason".to_string()));
        }

        let (class, course) = access::load_class_with_course(&self.db, class_id).await?;
        access::ensure_course_manager(actor, &course)?;

        if !repository::is_enrolled(&self.db, student_id, &course.id).await? {
            return Err(AppError::NotEnrolled);
        }

        if let Some(record) =
            repository::apply_override(&self.db, &class.id, student_id, reason, now).await?
        {
            info!("override applied for student {} in class {}", student_id, class.id);
            return Ok(record);
        }

        let record = AttendanceRecord {
            id: Uuid::new_v4().to_string(),
            class_id: class.id.clone(),
            student_id: student_id.to_string(),
            status: AttendanceStatus::Present,
            method: AttendanceMethod::Manual,
            latitude: None,
            longitude: None,
            reason: Some(reason.to_string()),
            marked_at: now,
            updated_at: now,
        };

        match repository::insert_attendance(&self.db, &record).await {
            Ok(()) => {
                info!("override created record for student {} in class {}", student_id, class.id);
                Ok(record)
            }
            // Someone marked in between; the override still wins.
            Err(e) if is_unique_violation(&e) => {
                repository::apply_override(&self.db, &class.id, student_id, reason, now)
                    .await?
                    .ok_or(AppError::NotFound("Attendance record"))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// After a class ends, records ABSENT for every enrolled student who has
    /// no record yet.
    pub async fn finalize_absences(
        &self,
        class_id: &str,
        actor: &AuthUser,
        now: DateTime<Utc>,
    ) -> Result<FinalizeSummary, AppError> {
        let (class, course) = access::load_class_with_course(&self.db, class_id).await?;
        access::ensure_course_manager(actor, &course)?;

        if now <= class.ends_at {
            return Err(AppError::Conflict("class has not ended".to_string()));
        }

        let unmarked = repository::fetch_unmarked_students(&self.db, &class.id, &course.id).await?;
        let marked_absent = repository::insert_absentees(&self.db, &class.id, &unmarked, now).await?;
        info!("{} students marked absent for class {}", marked_absent, class.id);

        Ok(FinalizeSummary {
            class_id: class.id,
            marked_absent,
        })
    }

    async fn resolve_target(&self, req: &MarkAttendance) -> Result<(Class, Course), AppError> {
        match (&req.target, req.method.requires_session()) {
            (MarkTarget::Session(info), true) => Ok((info.class.clone(), info.course.clone())),
            (MarkTarget::Class(class_id), false) => {
                access::load_class_with_course(&self.db, class_id).await
            }
            (MarkTarget::Class(_), true) => Err(AppError::BadRequest(format!(
                "{:?} marks need a scanned session token",
                req.method
            ))),
            (MarkTarget::Session(_), false) => Err(AppError::BadRequest(
                "manual marks address the class directly".to_string(),
            )),
        }
    }

    fn authorize(&self, req: &MarkAttendance, actor: &AuthUser, course: &Course) -> Result<(), AppError> {
        if req.method == AttendanceMethod::Manual {
            return access::ensure_course_manager(actor, course);
        }
        access::ensure_student(actor)?;
        if actor.id != req.student_id {
            return Err(AppError::Forbidden(
                "students can only mark their own attendance".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AttendancePolicy;
    use crate::models::{IssueSessionRequest, Role};
    use crate::services::fixtures::{Fixture, at, at_s};
    use crate::services::{SessionIssuer, TokenValidator};

    async fn scanned_session(fx: &Fixture, now: DateTime<Utc>) -> SessionInfo {
        let issued = SessionIssuer::new(fx.db.clone(), AttendancePolicy::default())
            .issue_session(&fx.class.id, &fx.lecturer_auth(), IssueSessionRequest::default(), at(9, 55))
            .await
            .unwrap();
        TokenValidator::new(fx.db.clone())
            .validate_token(&issued.token, now)
            .await
            .unwrap()
    }

    fn scan(info: &SessionInfo, student_id: &str, method: AttendanceMethod) -> MarkAttendance {
        MarkAttendance {
            target: MarkTarget::Session(Box::new(info.clone())),
            student_id: student_id.to_string(),
            method,
            location: None,
            reason: None,
            late_threshold: TimeDelta::minutes(10),
        }
    }

    #[test]
    fn test_classify_boundary_is_late() {
        let start = at(10, 0);
        let ten = TimeDelta::minutes(10);
        assert_eq!(classify(start, at_s(10, 9, 59), ten), AttendanceStatus::Present);
        assert_eq!(classify(start, at(10, 10), ten), AttendanceStatus::Late);
        assert_eq!(classify(start, at(9, 50), ten), AttendanceStatus::Present);
    }

    #[test]
    fn test_classify_huge_threshold_does_not_overflow() {
        assert_eq!(classify(at(10, 0), at(10, 30), TimeDelta::MAX), AttendanceStatus::Present);
    }

    #[tokio::test]
    async fn test_stored_out_of_range_threshold_falls_back_to_default() {
        let fx = Fixture::new().await;
        let mut info = scanned_session(&fx, at(10, 12)).await;
        info.session.late_threshold_minutes = Some(1_000_000_000_000);

        let mut req = scan(&info, &fx.student.id, AttendanceMethod::Qr);
        req.late_threshold = AttendancePolicy::default().late_threshold_for(info.session.late_threshold_minutes);
        let record = AttendanceRecorder::new(fx.db.clone())
            .mark_attendance(req, &fx.student_auth(), at(10, 12))
            .await
            .unwrap();
        assert_eq!(record.status, AttendanceStatus::Late);
    }

    #[tokio::test]
    async fn test_scan_then_duplicate() {
        let fx = Fixture::new().await;
        let recorder = AttendanceRecorder::new(fx.db.clone());
        let info = scanned_session(&fx, at(10, 5)).await;

        let mut req = scan(&info, &fx.student.id, AttendanceMethod::Qr);
        req.location = Some(GeoLocation {
            latitude: 5.65,
            longitude: -0.18,
        });
        let record = recorder
            .mark_attendance(req, &fx.student_auth(), at(10, 5))
            .await
            .expect("first scan should succeed");
        assert_eq!(record.status, AttendanceStatus::Present);
        assert_eq!(record.method, AttendanceMethod::Qr);
        assert_eq!(record.latitude, Some(5.65));

        let err = recorder
            .mark_attendance(scan(&info, &fx.student.id, AttendanceMethod::Qr), &fx.student_auth(), at(10, 6))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateAttendance));
    }

    #[tokio::test]
    async fn test_late_scan() {
        let fx = Fixture::new().await;
        let recorder = AttendanceRecorder::new(fx.db.clone());
        let other = fx.add_enrolled_student("Kofi Boateng").await;
        let info = scanned_session(&fx, at(10, 12)).await;

        let record = recorder
            .mark_attendance(scan(&info, &other.id, AttendanceMethod::Nfc), &Fixture::auth(&other), at(10, 12))
            .await
            .unwrap();
        assert_eq!(record.status, AttendanceStatus::Late);
    }

    #[tokio::test]
    async fn test_caller_supplied_threshold_is_used() {
        let fx = Fixture::new().await;
        let recorder = AttendanceRecorder::new(fx.db.clone());
        let info = scanned_session(&fx, at(10, 6)).await;

        let mut req = scan(&info, &fx.student.id, AttendanceMethod::Qr);
        req.late_threshold = TimeDelta::minutes(5);
        let record = recorder
            .mark_attendance(req, &fx.student_auth(), at(10, 6))
            .await
            .unwrap();
        assert_eq!(record.status, AttendanceStatus::Late);
    }

    #[tokio::test]
    async fn test_not_enrolled_student_cannot_mark() {
        let fx = Fixture::new().await;
        let recorder = AttendanceRecorder::new(fx.db.clone());
        let outsider = fx.add_user("Outsider", Role::Student).await;
        let info = scanned_session(&fx, at(10, 5)).await;

        let err = recorder
            .mark_attendance(scan(&info, &outsider.id, AttendanceMethod::Qr), &Fixture::auth(&outsider), at(10, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotEnrolled));
        assert!(
            repository::find_attendance(&fx.db, &fx.class.id, &outsider.id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_student_cannot_mark_for_someone_else() {
        let fx = Fixture::new().await;
        let recorder = AttendanceRecorder::new(fx.db.clone());
        let other = fx.add_enrolled_student("Kofi Boateng").await;
        let info = scanned_session(&fx, at(10, 5)).await;

        let err = recorder
            .mark_attendance(scan(&info, &other.id, AttendanceMethod::Qr), &fx.student_auth(), at(10, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_beacon_only_inside_class_window() {
        let fx = Fixture::new().await;
        let recorder = AttendanceRecorder::new(fx.db.clone());
        let early = scanned_session(&fx, at(9, 58)).await;

        let err = recorder
            .mark_attendance(scan(&early, &fx.student.id, AttendanceMethod::Beacon), &fx.student_auth(), at(9, 58))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ClassNotInSession));

        // QR in the same minute is fine: only beacons check the class window.
        let record = recorder
            .mark_attendance(scan(&early, &fx.student.id, AttendanceMethod::Qr), &fx.student_auth(), at(9, 58))
            .await
            .unwrap();
        assert_eq!(record.status, AttendanceStatus::Present);

        let other = fx.add_enrolled_student("Kofi Boateng").await;
        let record = recorder
            .mark_attendance(scan(&early, &other.id, AttendanceMethod::Beacon), &Fixture::auth(&other), at(10, 0))
            .await
            .unwrap();
        assert_eq!(record.method, AttendanceMethod::Beacon);
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_marks_yield_one_record() {
        let fx = Fixture::new().await;
        let recorder = AttendanceRecorder::new(fx.db.clone());
        let info = scanned_session(&fx, at(10, 5)).await;
        let auth = fx.student_auth();

        let (a, b) = tokio::join!(
            recorder.mark_attendance(scan(&info, &fx.student.id, AttendanceMethod::Qr), &auth, at(10, 5)),
            recorder.mark_attendance(scan(&info, &fx.student.id, AttendanceMethod::Nfc), &auth, at(10, 5)),
        );

        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            results
                .iter()
                .any(|r| matches!(r, Err(AppError::DuplicateAttendance)))
        );
        let records = repository::fetch_attendance_for_class(&fx.db, &fx.class.id)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_facial_is_not_implemented() {
        let fx = Fixture::new().await;
        let recorder = AttendanceRecorder::new(fx.db.clone());
        let req = MarkAttendance {
            target: MarkTarget::Class(fx.class.id.clone()),
            student_id: fx.student.id.clone(),
            method: AttendanceMethod::Facial,
            location: None,
            reason: None,
            late_threshold: TimeDelta::minutes(10),
        };

        let err = recorder
            .mark_attendance(req, &fx.student_auth(), at(10, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotImplemented(_)));
    }

    #[tokio::test]
    async fn test_manual_entry_by_lecturer() {
        let fx = Fixture::new().await;
        let recorder = AttendanceRecorder::new(fx.db.clone());
        let manual = |student_id: &str| MarkAttendance {
            target: MarkTarget::Class(fx.class.id.clone()),
            student_id: student_id.to_string(),
            method: AttendanceMethod::Manual,
            location: None,
            reason: Some("phone battery died".to_string()),
            late_threshold: TimeDelta::minutes(10),
        };

        let err = recorder
            .mark_attendance(manual(&fx.student.id), &fx.student_auth(), at(10, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let record = recorder
            .mark_attendance(manual(&fx.student.id), &fx.lecturer_auth(), at(10, 20))
            .await
            .unwrap();
        assert_eq!(record.method, AttendanceMethod::Manual);
        assert_eq!(record.status, AttendanceStatus::Late);
        assert_eq!(record.reason.as_deref(), Some("phone battery died"));

        let err = recorder
            .mark_attendance(manual(&fx.student.id), &fx.lecturer_auth(), at(10, 21))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateAttendance));
    }

    #[tokio::test]
    async fn test_method_and_target_must_agree() {
        let fx = Fixture::new().await;
        let recorder = AttendanceRecorder::new(fx.db.clone());
        let req = MarkAttendance {
            target: MarkTarget::Class(fx.class.id.clone()),
            student_id: fx.student.id.clone(),
            method: AttendanceMethod::Qr,
            location: None,
            reason: None,
            late_threshold: TimeDelta::minutes(10),
        };

        let err = recorder
            .mark_attendance(req, &fx.student_auth(), at(10, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_finalize_then_override_absent_student() {
        let fx = Fixture::new().await;
        let recorder = AttendanceRecorder::new(fx.db.clone());
        let present = fx.add_enrolled_student("Kofi Boateng").await;
        let info = scanned_session(&fx, at(10, 3)).await;
        recorder
            .mark_attendance(scan(&info, &present.id, AttendanceMethod::Qr), &Fixture::auth(&present), at(10, 3))
            .await
            .unwrap();

        let err = recorder
            .finalize_absences(&fx.class.id, &fx.lecturer_auth(), at(10, 30))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let summary = recorder
            .finalize_absences(&fx.class.id, &fx.lecturer_auth(), at(11, 30))
            .await
            .unwrap();
        assert_eq!(summary.marked_absent, 1);

        let absent = repository::find_attendance(&fx.db, &fx.class.id, &fx.student.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(absent.status, AttendanceStatus::Absent);

        let err = recorder
            .override_attendance(&fx.class.id, &fx.student.id, "sick note", &fx.student_auth(), at(12, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let updated = recorder
            .override_attendance(&fx.class.id, &fx.student.id, "sick note", &fx.lecturer_auth(), at(12, 0))
            .await
            .unwrap();
        assert_eq!(updated.id, absent.id);
        assert_eq!(updated.status, AttendanceStatus::Present);
        assert_eq!(updated.method, AttendanceMethod::Manual);
        assert_eq!(updated.reason.as_deref(), Some("sick note"));

        // Running it again finds nobody left to mark.
        let again = recorder
            .finalize_absences(&fx.class.id, &fx.admin_auth(), at(11, 45))
            .await
            .unwrap();
        assert_eq!(again.marked_absent, 0);
    }

    #[tokio::test]
    async fn test_override_without_record_creates_one() {
        let fx = Fixture::new().await;
        let recorder = AttendanceRecorder::new(fx.db.clone());

        let err = recorder
            .override_attendance(&fx.class.id, &fx.student.id, "   ", &fx.admin_auth(), at(12, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let record = recorder
            .override_attendance(&fx.class.id, &fx.student.id, "field trip", &fx.admin_auth(), at(12, 0))
            .await
            .unwrap();
        assert_eq!(record.status, AttendanceStatus::Present);
        assert_eq!(record.method, AttendanceMethod::Manual);

        let outsider = fx.add_user("Outsider", Role::Student).await;
        let err = recorder
            .override_attendance(&fx.class.id, &outsider.id, "field trip", &fx.admin_auth(), at(12, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotEnrolled));
    }
}
