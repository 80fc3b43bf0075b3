use sqlx::SqlitePool;

use crate::auth::AuthUser;
use crate::db::repository;
use crate::error::AppError;
use crate::models::{AttendanceRecord, AttendanceStatus, ClassReport};
use crate::services::access;

/// Read-only views over recorded attendance.
pub struct ReportService {
    db: SqlitePool,
}

impl ReportService {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Per-status counts for one class. Late arrivals count as attended.
    pub async fn class_report(&self, class_id: &str, actor: &AuthUser) -> Result<ClassReport, AppError> {
        let (class, course) = access::load_class_with_course(&self.db, class_id).await?;
        access::ensure_course_viewer(actor, &course)?;

        let enrolled = repository::count_enrollments(&self.db, &course.id).await?;
        let mut report = ClassReport {
            class_id: class.id,
            enrolled,
            present: 0,
            late: 0,
            absent: 0,
            unmarked: 0,
            attendance_rate: 0.0,
        };

        for (status, count) in repository::count_by_status(&self.db, &report.class_id).await? {
            match status {
                AttendanceStatus::Present => report.present = count,
                AttendanceStatus::Late => report.late = count,
                AttendanceStatus::Absent => report.absent = count,
            }
        }

        report.unmarked = (enrolled - report.present - report.late - report.absent).max(0);
        if enrolled > 0 {
            report.attendance_rate = (report.present + report.late) as f64 / enrolled as f64;
        }

        Ok(report)
    }

    pub async fn class_records(
        &self,
        class_id: &str,
        actor: &AuthUser,
    ) -> Result<Vec<AttendanceRecord>, AppError> {
        let (class, course) = access::load_class_with_course(&self.db, class_id).await?;
        access::ensure_course_viewer(actor, &course)?;
        Ok(repository::fetch_attendance_for_class(&self.db, &class.id).await?)
    }

    /// The caller's own records, newest first.
    pub async fn student_history(&self, actor: &AuthUser) -> Result<Vec<AttendanceRecord>, AppError> {
        access::ensure_student(actor)?;
        Ok(repository::fetch_attendance_for_student(&self.db, &actor.id).await?)
    }
}
