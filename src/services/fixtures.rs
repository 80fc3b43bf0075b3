use chrono::{DateTime, TimeZone, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::repository;
use crate::db::test_utils::setup_test_db;
use crate::models::{Class, Course, NewClassRequest, NewCourseRequest, NewUserRequest, Role, User};

/// 2026-03-02 at `hour:minute` UTC.
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    at_s(hour, minute, 0)
}

pub fn at_s(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, hour, minute, second).unwrap()
}

/// A course with one class from 10:00 to 11:00 and one enrolled student.
pub struct Fixture {
    pub db: SqlitePool,
    pub admin: User,
    pub lecturer: User,
    pub student: User,
    pub course: Course,
    pub class: Class,
}

impl Fixture {
    pub async fn new() -> Self {
        let db = setup_test_db().await;
        let admin = add_user(&db, "Registrar", Role::Admin).await;
        let lecturer = add_user(&db, "Dr. Okafor", Role::Lecturer).await;
        let student = add_user(&db, "Ama Mensah", Role::Student).await;

        let course = repository::insert_course(
            &db,
            NewCourseRequest {
                code: "CS101".to_string(),
                title: "Intro to Computing".to_string(),
                lecturer_id: lecturer.id.clone(),
            },
        )
        .await
        .unwrap();
        let class = repository::insert_class(
            &db,
            &course.id,
            NewClassRequest {
                title: "Week 1 lecture".to_string(),
                room: Some("LT2".to_string()),
                starts_at: at(10, 0),
                ends_at: at(11, 0),
            },
        )
        .await
        .unwrap();
        repository::insert_enrollment(&db, &course.id, &student.id)
            .await
            .unwrap();

        Self {
            db,
            admin,
            lecturer,
            student,
            course,
            class,
        }
    }

    pub fn auth(user: &User) -> AuthUser {
        AuthUser {
            id: user.id.clone(),
            role: user.role,
        }
    }

    pub fn admin_auth(&self) -> AuthUser {
        Self::auth(&self.admin)
    }

    pub fn lecturer_auth(&self) -> AuthUser {
        Self::auth(&self.lecturer)
    }

    pub fn student_auth(&self) -> AuthUser {
        Self::auth(&self.student)
    }

    pub async fn add_user(&self, name: &str, role: Role) -> User {
        add_user(&self.db, name, role).await
    }

    pub async fn add_enrolled_student(&self, name: &str) -> User {
        let user = self.add_user(name, Role::Student).await;
        repository::insert_enrollment(&self.db, &self.course.id, &user.id)
            .await
            .unwrap();
        user
    }
}

async fn add_user(db: &SqlitePool, name: &str, role: Role) -> User {
    repository::insert_user(
        db,
        NewUserRequest {
            name: name.to_string(),
            email: format!("{}@uni.test", Uuid::new_v4()),
            role,
        },
    )
    .await
    .unwrap()
}
