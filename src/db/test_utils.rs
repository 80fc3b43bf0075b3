use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

/// Test-only helper: a fresh in-memory database with all migrations applied.
/// Panics on failure, so never call it from service code.
///
/// A single connection is used so every query sees the same in-memory database.
pub async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test db");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}
