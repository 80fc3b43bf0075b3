use sqlx::SqlitePool;

use crate::auth::AuthUser;
use crate::db::repository;
use crate::error::AppError;
use crate::models::{Class, Course, Role};

/// Lecturer of record for the course, or an administrator.
pub fn ensure_course_manager(actor: &AuthUser, course: &Course) -> Result<(), AppError> {
    match actor.role {
        Role::Admin => Ok(()),
        Role::Lecturer if actor.id == course.lecturer_id => Ok(()),
        _ => Err(AppError::Forbidden(
            "only the course lecturer or an administrator may do this".to_string(),
        )),
    }
}

/// Managers plus department heads, who may read but not change attendance.
pub fn ensure_course_viewer(actor: &AuthUser, course: &Course) -> Result<(), AppError> {
    if actor.role == Role::DeptHead {
        return Ok(());
    }
    ensure_course_manager(actor, course)
}

pub fn ensure_admin(actor: &AuthUser) -> Result<(), AppError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("administrator role required".to_string()))
    }
}

pub fn ensure_student(actor: &AuthUser) -> Result<(), AppError> {
    if actor.role == Role::Student {
        Ok(())
    } else {
        Err(AppError::Forbidden("only students can mark their own attendance".to_string()))
    }
}

pub async fn load_course(db: &SqlitePool, course_id: &str) -> Result<Course, AppError> {
    repository::find_course_by_id(db, course_id)
        .await?
        .ok_or(AppError::NotFound("Course"))
}

pub async fn load_class_with_course(
    db: &SqlitePool,
    class_id: &str,
) -> Result<(Class, Course), AppError> {
    let class = repository::find_class_by_id(db, class_id)
        .await?
        .ok_or(AppError::NotFound("Class"))?;
    let course = load_course(db, &class.course_id).await?;
    Ok((class, course))
}
