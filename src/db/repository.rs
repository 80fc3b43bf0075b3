use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{
    AttendanceMethod, AttendanceRecord, AttendanceStatus, Class, ClassSession, Course,
    Enrollment, NewClassRequest, NewCourseRequest, NewUserRequest, User,
};

const USER_COLUMNS: &str = "id, name, email, role, created_at";
const COURSE_COLUMNS: &str = "id, code, title, lecturer_id, created_at";
const CLASS_COLUMNS: &str = "id, course_id, title, room, starts_at, ends_at, created_at";
const SESSION_COLUMNS: &str = "id, class_id, issued_by, token, room, module_name, time_window, \
     late_threshold_minutes, created_at, expires_at";
const RECORD_COLUMNS: &str = "id, class_id, student_id, status, method, latitude, longitude, \
     reason, marked_at, updated_at";

pub async fn insert_user(db: &SqlitePool, req: NewUserRequest) -> Result<User, sqlx::Error> {
    let user = User {
        id: Uuid::new_v4().to_string(),
        name: req.name,
        email: req.email,
        role: req.role,
        created_at: Utc::now(),
    };

    sqlx::query("INSERT INTO users (id, name, email, role, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role)
        .bind(user.created_at)
        .execute(db)
        .await?;

    Ok(user)
}

pub async fn find_user_by_id(db: &SqlitePool, id: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn insert_course(db: &SqlitePool, req: NewCourseRequest) -> Result<Course, sqlx::Error> {
    let course = Course {
        id: Uuid::new_v4().to_string(),
        code: req.code,
        title: req.title,
        lecturer_id: req.lecturer_id,
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO courses (id, code, title, lecturer_id, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&course.id)
    .bind(&course.code)
    .bind(&course.title)
    .bind(&course.lecturer_id)
    .bind(course.created_at)
    .execute(db)
    .await?;

    Ok(course)
}

pub async fn find_course_by_id(db: &SqlitePool, id: &str) -> Result<Option<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>(&format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn fetch_courses(db: &SqlitePool) -> Result<Vec<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>(&format!("SELECT {COURSE_COLUMNS} FROM courses ORDER BY code"))
        .fetch_all(db)
        .await
}

pub async fn fetch_courses_for_lecturer(
    db: &SqlitePool,
    lecturer_id: &str,
) -> Result<Vec<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>(&format!(
        "SELECT {COURSE_COLUMNS} FROM courses WHERE lecturer_id = ? ORDER BY code"
    ))
    .bind(lecturer_id)
    .fetch_all(db)
    .await
}

pub async fn fetch_courses_for_student(
    db: &SqlitePool,
    student_id: &str,
) -> Result<Vec<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>(
        r#"
        SELECT c.id, c.code, c.title, c.lecturer_id, c.created_at
        FROM courses c
        JOIN enrollments e ON e.course_id = c.id
        WHERE e.student_id = ?
        ORDER BY c.code
        "#,
    )
    .bind(student_id)
    .fetch_all(db)
    .await
}

pub async fn insert_class(
    db: &SqlitePool,
    course_id: &str,
    req: NewClassRequest,
) -> Result<Class, sqlx::Error> {
    let class = Class {
        id: Uuid::new_v4().to_string(),
        course_id: course_id.to_string(),
        title: req.title,
        room: req.room,
        starts_at: req.starts_at,
        ends_at: req.ends_at,
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO classes (id, course_id, title, room, starts_at, ends_at, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&class.id)
    .bind(&class.course_id)
    .bind(&class.title)
    .bind(&class.room)
    .bind(class.starts_at)
    .bind(class.ends_at)
    .bind(class.created_at)
    .execute(db)
    .await?;

    Ok(class)
}

pub async fn find_class_by_id(db: &SqlitePool, id: &str) -> Result<Option<Class>, sqlx::Error> {
    sqlx::query_as::<_, Class>(&format!("SELECT {CLASS_COLUMNS} FROM classes WHERE id = ?"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn fetch_classes_for_course(
    db: &SqlitePool,
    course_id: &str,
) -> Result<Vec<Class>, sqlx::Error> {
    sqlx::query_as::<_, Class>(&format!(
        "SELECT {CLASS_COLUMNS} FROM classes WHERE course_id = ? ORDER BY starts_at"
    ))
    .bind(course_id)
    .fetch_all(db)
    .await
}

pub async fn insert_enrollment(
    db: &SqlitePool,
    course_id: &str,
    student_id: &str,
) -> Result<Enrollment, sqlx::Error> {
    let enrollment = Enrollment {
        student_id: student_id.to_string(),
        course_id: course_id.to_string(),
        created_at: Utc::now(),
    };

    sqlx::query("INSERT INTO enrollments (student_id, course_id, created_at) VALUES (?, ?, ?)")
        .bind(&enrollment.student_id)
        .bind(&enrollment.course_id)
        .bind(enrollment.created_at)
        .execute(db)
        .await?;

    Ok(enrollment)
}

pub async fn is_enrolled(
    db: &SqlitePool,
    student_id: &str,
    course_id: &str,
) -> Result<bool, sqlx::Error> {
    let found: Option<(i64,)> =
        sqlx::query_as("SELECT 1 FROM enrollments WHERE student_id = ? AND course_id = ?")
            .bind(student_id)
            .bind(course_id)
            .fetch_optional(db)
            .await?;
    Ok(found.is_some())
}

pub async fn fetch_enrollments(
    db: &SqlitePool,
    course_id: &str,
) -> Result<Vec<Enrollment>, sqlx::Error> {
    sqlx::query_as::<_, Enrollment>(
        "SELECT student_id, course_id, created_at FROM enrollments WHERE course_id = ? ORDER BY created_at",
    )
    .bind(course_id)
    .fetch_all(db)
    .await
}

pub async fn count_enrollments(db: &SqlitePool, course_id: &str) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM enrollments WHERE course_id = ?")
        .bind(course_id)
        .fetch_one(db)
        .await?;
    Ok(count)
}

pub async fn insert_class_session(
    db: &SqlitePool,
    session: &ClassSession,
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO class_sessions ({SESSION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&session.id)
    .bind(&session.class_id)
    .bind(&session.issued_by)
    .bind(&session.token)
    .bind(&session.room)
    .bind(&session.module_name)
    .bind(&session.time_window)
    .bind(session.late_threshold_minutes)
    .bind(session.created_at)
    .bind(session.expires_at)
    .execute(db)
    .await?;
    Ok(())
}

/// Exact token match only. Expiry is judged by the caller against its own clock.
pub async fn find_session_by_token(
    db: &SqlitePool,
    token: &str,
) -> Result<Option<ClassSession>, sqlx::Error> {
    sqlx::query_as::<_, ClassSession>(&format!(
        "SELECT {SESSION_COLUMNS} FROM class_sessions WHERE token = ?"
    ))
    .bind(token)
    .fetch_optional(db)
    .await
}

pub async fn insert_attendance(
    db: &SqlitePool,
    record: &AttendanceRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO attendance_records ({RECORD_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&record.id)
    .bind(&record.class_id)
    .bind(&record.student_id)
    .bind(record.status)
    .bind(record.method)
    .bind(record.latitude)
    .bind(record.longitude)
    .bind(&record.reason)
    .bind(record.marked_at)
    .bind(record.updated_at)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn find_attendance(
    db: &SqlitePool,
    class_id: &str,
    student_id: &str,
) -> Result<Option<AttendanceRecord>, sqlx::Error> {
    sqlx::query_as::<_, AttendanceRecord>(&format!(
        "SELECT {RECORD_COLUMNS} FROM attendance_records WHERE class_id = ? AND student_id = ?"
    ))
    .bind(class_id)
    .bind(student_id)
    .fetch_optional(db)
    .await
}

pub async fn fetch_attendance_for_class(
    db: &SqlitePool,
    class_id: &str,
) -> Result<Vec<AttendanceRecord>, sqlx::Error> {
    sqlx::query_as::<_, AttendanceRecord>(&format!(
        "SELECT {RECORD_COLUMNS} FROM attendance_records WHERE class_id = ? ORDER BY marked_at"
    ))
    .bind(class_id)
    .fetch_all(db)
    .await
}

pub async fn fetch_attendance_for_student(
    db: &SqlitePool,
    student_id: &str,
) -> Result<Vec<AttendanceRecord>, sqlx::Error> {
    sqlx::query_as::<_, AttendanceRecord>(&format!(
        "SELECT {RECORD_COLUMNS} FROM attendance_records WHERE student_id = ? ORDER BY marked_at DESC"
    ))
    .bind(student_id)
    .fetch_all(db)
    .await
}

/// Lecturer/admin override: forces MANUAL + PRESENT and records the reason.
/// Returns `None` when there is no record to update.
pub async fn apply_override(
    db: &SqlitePool,
    class_id: &str,
    student_id: &str,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<Option<AttendanceRecord>, sqlx::Error> {
    let affected = sqlx::query(
        r#"
        UPDATE attendance_records
        SET status = ?,
            method = ?,
            reason = ?,
            updated_at = ?
        WHERE class_id = ? AND student_id = ?
        "#,
    )
    .bind(AttendanceStatus::Present)
    .bind(AttendanceMethod::Manual)
    .bind(reason)
    .bind(now)
    .bind(class_id)
    .bind(student_id)
    .execute(db)
    .await?
    .rows_affected();

    if affected == 0 {
        return Ok(None);
    }
    find_attendance(db, class_id, student_id).await
}

/// Enrolled students of the class's course that have no record yet.
pub async fn fetch_unmarked_students(
    db: &SqlitePool,
    class_id: &str,
    course_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT e.student_id
        FROM enrollments e
        WHERE e.course_id = ?
          AND NOT EXISTS (
              SELECT 1 FROM attendance_records a
              WHERE a.class_id = ? AND a.student_id = e.student_id
          )
        ORDER BY e.student_id
        "#,
    )
    .bind(course_id)
    .bind(class_id)
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Inserts ABSENT rows in one transaction. Students who got a record in the
/// meantime are skipped by the unique index rather than failing the batch.
pub async fn insert_absentees(
    db: &SqlitePool,
    class_id: &str,
    student_ids: &[String],
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let mut tx = db.begin().await?;
    let mut inserted = 0;

    for student_id in student_ids {
        inserted += sqlx::query(&format!(
            r#"
            INSERT INTO attendance_records ({RECORD_COLUMNS})
            VALUES (?, ?, ?, ?, ?, NULL, NULL, NULL, ?, ?)
            ON CONFLICT (class_id, student_id) DO NOTHING
            "#
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(class_id)
        .bind(student_id)
        .bind(AttendanceStatus::Absent)
        .bind(AttendanceMethod::Manual)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}

pub async fn count_by_status(
    db: &SqlitePool,
    class_id: &str,
) -> Result<Vec<(AttendanceStatus, i64)>, sqlx::Error> {
    sqlx::query_as(
        "SELECT status, COUNT(*) FROM attendance_records WHERE class_id = ? GROUP BY status",
    )
    .bind(class_id)
    .fetch_all(db)
    .await
}
