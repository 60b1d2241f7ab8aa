//! Availability expiry sweeper.
//!
//! Teachers can give a slot an auto-cancel deadline; this background task
//! flips any still-available slot past its deadline to cancelled. Running it
//! server-side means slots expire even when nobody has a scheduling page
//! open. Booked and already-cancelled slots are never touched, so the sweep
//! is idempotent.

use anyhow::Result;
use tokio::time::{interval, Duration};

use crate::config::SweeperConfig;
use crate::util::now_rfc3339;
use crate::DbPool;

pub struct ExpirySweeper {
    db: DbPool,
    config: SweeperConfig,
}

impl ExpirySweeper {
    pub fn new(db: DbPool, config: SweeperConfig) -> Self {
        Self { db, config }
    }

    /// Run a single sweep cycle; returns how many slots were cancelled
    pub async fn run_sweep(&self) -> Result<u64> {
        let now = now_rfc3339();
        let result = sqlx::query(
            r#"
            UPDATE availability_slots
            SET status = 'cancelled', updated_at = ?
            WHERE status = 'available'
              AND auto_cancel_at IS NOT NULL
              AND auto_cancel_at <= ?
            "#,
        )
        .bind(&now)
        .bind(&now)
        .execute(&self.db)
        .await?;

        let expired = result.rows_affected();
        if expired > 0 {
            tracing::info!(slots = expired, "Expired availability slots cancelled");
            metrics::counter!(crate::api::metrics::SLOTS_EXPIRED_TOTAL).increment(expired);
        }
        Ok(expired)
    }
}

/// Spawn the background expiry task
pub fn spawn_expiry_task(db: DbPool, config: SweeperConfig) {
    if !config.enabled {
        tracing::info!("Availability expiry sweeper is disabled");
        return;
    }

    let interval_secs = config.sweep_interval_seconds;
    tracing::info!(
        interval_secs = interval_secs,
        "Starting availability expiry sweeper"
    );

    let sweeper = ExpirySweeper::new(db, config);

    tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(interval_secs));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick.tick().await;
            if let Err(e) = sweeper.run_sweep().await {
                tracing::error!(error = %e, "Expiry sweep failed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    async fn seed_slot(db: &DbPool, id: &str, status: &str, auto_cancel_at: Option<&str>) {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, name, role) VALUES ('t1', ?, 'h', 'T', 'teacher')
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(format!("{id}@example.com"))
        .execute(db)
        .await
        .unwrap();
        sqlx::query(
            r#"
            INSERT INTO availability_slots (id, teacher_id, subject, slot_date, start_time, end_time, status, auto_cancel_at)
            VALUES (?, 't1', 'Maths', '2026-09-01', '10:00', '11:00', ?, ?)
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(auto_cancel_at)
        .execute(db)
        .await
        .unwrap();
    }

    async fn slot_status(db: &DbPool, id: &str) -> String {
        let (status,): (String,) =
            sqlx::query_as("SELECT status FROM availability_slots WHERE id = ?")
                .bind(id)
                .fetch_one(db)
                .await
                .unwrap();
        status
    }

    #[tokio::test]
    async fn past_deadline_slot_is_cancelled() {
        let db = test_pool().await;
        seed_slot(&db, "past", "available", Some("2020-01-01T00:00:00+00:00")).await;
        seed_slot(&db, "future", "available", Some("2099-01-01T00:00:00+00:00")).await;
        seed_slot(&db, "no-deadline", "available", None).await;

        let sweeper = ExpirySweeper::new(db.clone(), SweeperConfig::default());
        assert_eq!(sweeper.run_sweep().await.unwrap(), 1);

        assert_eq!(slot_status(&db, "past").await, "cancelled");
        assert_eq!(slot_status(&db, "future").await, "available");
        assert_eq!(slot_status(&db, "no-deadline").await, "available");
    }

    #[tokio::test]
    async fn sweep_is_idempotent_and_spares_booked_slots() {
        let db = test_pool().await;
        seed_slot(&db, "past", "available", Some("2020-01-01T00:00:00+00:00")).await;
        seed_slot(&db, "booked", "booked", Some("2020-01-01T00:00:00+00:00")).await;

        let sweeper = ExpirySweeper::new(db.clone(), SweeperConfig::default());
        assert_eq!(sweeper.run_sweep().await.unwrap(), 1);
        // Second tick finds nothing left to flip
        assert_eq!(sweeper.run_sweep().await.unwrap(), 0);

        assert_eq!(slot_status(&db, "past").await, "cancelled");
        assert_eq!(slot_status(&db, "booked").await, "booked");
    }
}
