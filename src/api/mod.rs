use axum::Json;
use axum::extract::{Path, Query};
use axum::routing::{post, put};
use axum::{Router, extract::State, http::StatusCode, routing::get};
use chrono::Utc;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::db::repository;
use crate::error::{AppError, is_unique_violation};
use crate::models::*;
use crate::services::token_validator::extract_token;
use crate::services::{
    AttendanceEvent, AttendanceEventKind, AttendanceRecorder, MarkAttendance, MarkTarget,
    ReportService, SessionIssuer, TokenValidator, access,
};
use crate::state::AppState;

#[derive(Deserialize)]
struct ValidateParams {
    #[serde(default)]
    token: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/users", post(create_user))
        .route("/courses", get(list_courses).post(create_course))
        .route(
            "/courses/{course_id}/classes",
            get(list_classes).post(create_class),
        )
        .route(
            "/courses/{course_id}/enrollments",
            get(list_enrollments).post(enroll_student),
        )
        .route("/classes/{class_id}/sessions", post(issue_session))
        .route("/sessions/validate", get(validate_session))
        .route("/attendance/scan", post(scan_attendance))
        .route("/classes/{class_id}/attendance", get(class_attendance))
        .route("/classes/{class_id}/attendance/manual", post(manual_attendance))
        .route("/classes/{class_id}/attendance/facial", post(facial_attendance))
        .route("/classes/{class_id}/attendance/absentees", post(finalize_absentees))
        .route(
            "/classes/{class_id}/attendance/{student_id}",
            put(override_attendance),
        )
        .route("/classes/{class_id}/report", get(class_report))
        .route("/me/attendance", get(my_attendance))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

async fn create_user(
    State(state): State<AppState>,
    actor: AuthUser,
    Json(req): Json<NewUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    access::ensure_admin(&actor)?;
    if req.name.trim().is_empty() || req.email.trim().is_empty() {
        return Err(AppError::BadRequest("name and email are required".to_string()));
    }

    let user = repository::insert_user(&state.db, req)
        .await
        .map_err(|e| conflict_on_unique(e, "a user with this email already exists"))?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn list_courses(
    State(state): State<AppState>,
    actor: AuthUser,
) -> Result<Json<Vec<Course>>, AppError> {
    let courses = match actor.role {
        Role::Admin | Role::DeptHead => repository::fetch_courses(&state.db).await?,
        Role::Lecturer => repository::fetch_courses_for_lecturer(&state.db, &actor.id).await?,
        Role::Student => repository::fetch_courses_for_student(&state.db, &actor.id).await?,
    };
    Ok(Json(courses))
}

async fn create_course(
    State(state): State<AppState>,
    actor: AuthUser,
    Json(req): Json<NewCourseRequest>,
) -> Result<(StatusCode, Json<Course>), AppError> {
    access::ensure_admin(&actor)?;

    let lecturer = repository::find_user_by_id(&state.db, &req.lecturer_id)
        .await?
        .ok_or(AppError::NotFound("Lecturer"))?;
    if lecturer.role != Role::Lecturer {
        return Err(AppError::BadRequest(
            "the lecturer of record must have the LECTURER role".to_string(),
        ));
    }

    let course = repository::insert_course(&state.db, req)
        .await
        .map_err(|e| conflict_on_unique(e, "a course with this code already exists"))?;
    Ok((StatusCode::CREATED, Json(course)))
}

async fn list_classes(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(course_id): Path<String>,
) -> Result<Json<Vec<Class>>, AppError> {
    let course = access::load_course(&state.db, &course_id).await?;
    let enrolled = actor.role == Role::Student
        && repository::is_enrolled(&state.db, &actor.id, &course.id).await?;
    if !enrolled {
        access::ensure_course_viewer(&actor, &course)?;
    }

    let classes = repository::fetch_classes_for_course(&state.db, &course.id).await?;
    Ok(Json(classes))
}

async fn create_class(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(course_id): Path<String>,
    Json(req): Json<NewClassRequest>,
) -> Result<(StatusCode, Json<Class>), AppError> {
    let course = access::load_course(&state.db, &course_id).await?;
    access::ensure_course_manager(&actor, &course)?;
    if req.ends_at <= req.starts_at {
        return Err(AppError::BadRequest("a class must end after it starts".to_string()));
    }

    let class = repository::insert_class(&state.db, &course.id, req).await?;
    Ok((StatusCode::CREATED, Json(class)))
}

async fn list_enrollments(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(course_id): Path<String>,
) -> Result<Json<Vec<Enrollment>>, AppError> {
    let course = access::load_course(&state.db, &course_id).await?;
    access::ensure_course_viewer(&actor, &course)?;

    let enrollments = repository::fetch_enrollments(&state.db, &course.id).await?;
    Ok(Json(enrollments))
}

async fn enroll_student(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(course_id): Path<String>,
    Json(req): Json<NewEnrollmentRequest>,
) -> Result<(StatusCode, Json<Enrollment>), AppError> {
    let course = access::load_course(&state.db, &course_id).await?;
    access::ensure_course_manager(&actor, &course)?;

    let student = repository::find_user_by_id(&state.db, &req.student_id)
        .await?
        .ok_or(AppError::NotFound("Student"))?;
    if student.role != Role::Student {
        return Err(AppError::BadRequest("only students can be enrolled".to_string()));
    }

    let enrollment = repository::insert_enrollment(&state.db, &course.id, &student.id)
        .await
        .map_err(|e| conflict_on_unique(e, "student is already enrolled"))?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

async fn issue_session(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(class_id): Path<String>,
    Json(req): Json<IssueSessionRequest>,
) -> Result<(StatusCode, Json<IssuedSession>), AppError> {
    let issuer = SessionIssuer::new(state.db.clone(), state.config.policy);
    let issued = issuer.issue_session(&class_id, &actor, req, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(issued)))
}

async fn validate_session(
    State(state): State<AppState>,
    _actor: AuthUser,
    Query(params): Query<ValidateParams>,
) -> Result<Json<SessionInfo>, AppError> {
    let info = TokenValidator::new(state.db.clone())
        .validate_token(&params.token, Utc::now())
        .await?;
    Ok(Json(info))
}

async fn scan_attendance(
    State(state): State<AppState>,
    actor: AuthUser,
    Json(req): Json<ScanRequest>,
) -> Result<(StatusCode, Json<AttendanceRecord>), AppError> {
    access::ensure_student(&actor)?;
    if !req.method.requires_session() {
        return Err(AppError::BadRequest(
            "scans must use QR, NFC or BEACON".to_string(),
        ));
    }

    let now = Utc::now();
    let token = extract_token(&req.scanned).ok_or(AppError::InvalidToken)?;
    let info = TokenValidator::new(state.db.clone())
        .validate_token(&token, now)
        .await?;
    let late_threshold = state
        .config
        .policy
        .late_threshold_for(info.session.late_threshold_minutes);

    let mark = MarkAttendance {
        target: MarkTarget::Session(Box::new(info)),
        student_id: actor.id.clone(),
        method: req.method,
        location: req.location,
        reason: None,
        late_threshold,
    };
    let record = AttendanceRecorder::new(state.db.clone())
        .mark_attendance(mark, &actor, now)
        .await?;

    publish_record(&state, AttendanceEventKind::Marked, &record).await;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn manual_attendance(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(class_id): Path<String>,
    Json(req): Json<ManualMarkRequest>,
) -> Result<(StatusCode, Json<AttendanceRecord>), AppError> {
    let mark = MarkAttendance {
        target: MarkTarget::Class(class_id),
        student_id: req.student_id,
        method: AttendanceMethod::Manual,
        location: None,
        reason: req.reason,
        late_threshold: state.config.policy.late_threshold,
    };
    let record = AttendanceRecorder::new(state.db.clone())
        .mark_attendance(mark, &actor, Utc::now())
        .await?;

    publish_record(&state, AttendanceEventKind::Marked, &record).await;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn facial_attendance(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(class_id): Path<String>,
) -> Result<(StatusCode, Json<AttendanceRecord>), AppError> {
    let mark = MarkAttendance {
        target: MarkTarget::Class(class_id),
        student_id: actor.id.clone(),
        method: AttendanceMethod::Facial,
        location: None,
        reason: None,
        late_threshold: state.config.policy.late_threshold,
    };
    let record = AttendanceRecorder::new(state.db.clone())
        .mark_attendance(mark, &actor, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn override_attendance(
    State(state): State<AppState>,
    actor: AuthUser,
    Path((class_id, student_id)): Path<(String, String)>,
    Json(req): Json<OverrideRequest>,
) -> Result<Json<AttendanceRecord>, AppError> {
    let record = AttendanceRecorder::new(state.db.clone())
        .override_attendance(&class_id, &student_id, &req.reason, &actor, Utc::now())
        .await?;

    publish_record(&state, AttendanceEventKind::Overridden, &record).await;
    Ok(Json(record))
}

async fn finalize_absentees(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(class_id): Path<String>,
) -> Result<Json<FinalizeSummary>, AppError> {
    let now = Utc::now();
    let summary = AttendanceRecorder::new(state.db.clone())
        .finalize_absences(&class_id, &actor, now)
        .await?;

    if summary.marked_absent > 0 {
        state
            .notifier
            .publish(AttendanceEvent::absentees(&summary.class_id, summary.marked_absent, now))
            .await;
    }
    Ok(Json(summary))
}

async fn class_attendance(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(class_id): Path<String>,
) -> Result<Json<Vec<AttendanceRecord>>, AppError> {
    let records = ReportService::new(state.db.clone())
        .class_records(&class_id, &actor)
        .await?;
    Ok(Json(records))
}

async fn class_report(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(class_id): Path<String>,
) -> Result<Json<ClassReport>, AppError> {
    let report = ReportService::new(state.db.clone())
        .class_report(&class_id, &actor)
        .await?;
    Ok(Json(report))
}

async fn my_attendance(
    State(state): State<AppState>,
    actor: AuthUser,
) -> Result<Json<Vec<AttendanceRecord>>, AppError> {
    let records = ReportService::new(state.db.clone())
        .student_history(&actor)
        .await?;
    Ok(Json(records))
}

async fn publish_record(state: &AppState, kind: AttendanceEventKind, record: &AttendanceRecord) {
    state
        .notifier
        .publish(AttendanceEvent::for_record(kind, record))
        .await;
}

fn conflict_on_unique(err: sqlx::Error, message: &str) -> AppError {
    if is_unique_violation(&err) {
        AppError::Conflict(message.to_string())
    } else {
        err.into()
    }
}
