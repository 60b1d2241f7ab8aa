mod models;

pub use models::*;

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

pub type DbPool = SqlitePool;

/// Execute a SQL migration file, properly handling comments
async fn execute_sql(pool: &SqlitePool, sql: &str) -> Result<()> {
    for statement in sql.split(';') {
        // Strip SQL comment lines (lines starting with --)
        let cleaned: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let trimmed = cleaned.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }
    Ok(())
}

pub async fn init(data_dir: &Path) -> Result<DbPool> {
    let db_path = data_dir.join("tutordesk.db");
    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    info!("Initializing database at {}", db_path.display());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    // Enable WAL mode for better concurrency
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    // Migration 001: Initial schema
    execute_sql(pool, include_str!("../../migrations/001_initial.sql")).await?;

    // Migration 002: Enrollments table
    let has_enrollments_table: Option<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type='table' AND name='enrollments'",
    )
    .fetch_optional(pool)
    .await?;
    if has_enrollments_table.is_none() {
        execute_sql(pool, include_str!("../../migrations/002_enrollments.sql")).await?;
    }

    // Migration 003: Expiry sweep index
    let has_expiry_index: Option<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type='index' AND name='idx_slots_auto_cancel'",
    )
    .fetch_optional(pool)
    .await?;
    if has_expiry_index.is_none() {
        execute_sql(pool, include_str!("../../migrations/003_expiry_index.sql")).await?;
    }

    info!("Migrations completed");
    Ok(())
}

/// Pool with the full schema, for tests.
///
/// Backed by a throwaway temp file rather than `sqlite::memory:` so every
/// connection sees the same database. Tests that pause the tokio clock
/// cannot afford an acquire that waits on the connection thread (paused
/// time auto-advances past sqlx's acquire timeout while waiting, and the
/// SQLite worker runs on a plain OS thread the clock cannot see), so all
/// connections are opened up front and the pool's timers are disabled.
#[cfg(test)]
pub async fn test_pool() -> DbPool {
    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};

    const TEST_POOL_SIZE: u32 = 8;

    let path = std::env::temp_dir().join(format!("tutordesk-test-{}.db", uuid::Uuid::new_v4()));
    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(TEST_POOL_SIZE)
        // Far beyond any fake-time budget: a paused clock must never find
        // the acquire deadline as its next pending timer.
        .acquire_timeout(std::time::Duration::from_secs(86_400))
        .test_before_acquire(false)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("test database");

    // Open every connection now, while the clock is running normally.
    let mut warm = Vec::new();
    for _ in 0..TEST_POOL_SIZE {
        warm.push(pool.acquire().await.expect("warm connection"));
    }
    drop(warm);
    while pool.num_idle() < TEST_POOL_SIZE as usize {
        tokio::task::yield_now().await;
    }

    run_migrations(&pool).await.expect("migrations");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = test_pool().await;
        run_migrations(&pool).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        for expected in [
            "auth_sessions",
            "availability_slots",
            "courses",
            "enrollments",
            "payment_records",
            "session_requests",
            "users",
        ] {
            assert!(names.contains(&expected), "missing table {expected}");
        }
    }

    #[tokio::test]
    async fn request_must_reference_exactly_one_source() {
        let pool = test_pool().await;
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, name, role) VALUES ('s1', 's@x.com', 'h', 'S', 'student'), ('t1', 't@x.com', 'h', 'T', 'teacher')",
        )
        .execute(&pool)
        .await
        .unwrap();

        // Neither reference set: rejected by the CHECK constraint
        let err = sqlx::query(
            "INSERT INTO session_requests (id, student_id, teacher_id, title, scheduled_date, duration_minutes, payment_amount) VALUES ('r1', 's1', 't1', 'Algebra', '2026-09-01', 60, 550)",
        )
        .execute(&pool)
        .await;
        assert!(err.is_err());
    }
}
