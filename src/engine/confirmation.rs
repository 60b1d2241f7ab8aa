//! Payment confirmation worker.
//!
//! After checkout the student lands on a confirmation page carrying the
//! gateway order id. A worker per order id verifies the payment against the
//! gateway and reconciles local state:
//!
//! - `COURSE_<courseId>_<studentId>` orders are course purchases: a paid
//!   order creates the enrollment directly, with no payment-record lookup.
//! - any other order id is matched against `payment_records`. The record may
//!   not be committed yet when verification starts (the settlement request
//!   and the gateway redirect race), so the lookup itself is retried before
//!   the order is polled to a terminal state.
//!
//! All waiting goes through `util::retry`, so shutdown cancels workers
//! between attempts.

use anyhow::{Context, Result};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::{DbPool, PaymentRecord};
use crate::gateway::OrderStatus;
use crate::util::retry::{self, Attempt, Outcome, RetryPolicy};
use crate::util::now_rfc3339;
use crate::AppState;

pub const SESSIONS_REDIRECT: &str = "/student-dashboard?tab=sessions&status=payment_success";
pub const COURSES_REDIRECT: &str = "/student-dashboard?tab=courses&status=enrollment_success";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The gateway reported the payment failed or expired
    PaymentFailed,
    /// No terminal state after the full pending budget
    TimedOut,
    /// No payment record ever appeared for the order id
    RecordNotFound,
    /// Verification kept erroring; manual retry offered
    VerificationError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConfirmationState {
    Verifying,
    Success {
        redirect: String,
    },
    Failed {
        reason: FailureReason,
        message: String,
        support_url: String,
    },
}

/// Snapshot returned to the confirmation page
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationSnapshot {
    pub order_id: String,
    #[serde(flatten)]
    pub state: ConfirmationState,
    pub manual_retries_remaining: u32,
}

struct ConfirmationEntry {
    state: ConfirmationState,
    manual_retries_used: u32,
    running: bool,
}

/// Tracks every confirmation worker this process has run
#[derive(Clone, Default)]
pub struct ConfirmationTracker {
    inner: Arc<DashMap<String, ConfirmationEntry>>,
}

impl ConfirmationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, order_id: &str, max_manual_retries: u32) -> Option<ConfirmationSnapshot> {
        self.inner.get(order_id).map(|entry| ConfirmationSnapshot {
            order_id: order_id.to_string(),
            state: entry.state.clone(),
            manual_retries_remaining: max_manual_retries.saturating_sub(entry.manual_retries_used),
        })
    }

    fn set_state(&self, order_id: &str, state: ConfirmationState, running: bool) {
        let mut entry = self
            .inner
            .entry(order_id.to_string())
            .or_insert_with(|| ConfirmationEntry {
                state: ConfirmationState::Verifying,
                manual_retries_used: 0,
                running: false,
            });
        entry.state = state;
        entry.running = running;
    }

    /// Begin verifying; returns false if a worker is already running or the
    /// order already reached a terminal state.
    fn begin(&self, order_id: &str) -> bool {
        let mut entry = self
            .inner
            .entry(order_id.to_string())
            .or_insert_with(|| ConfirmationEntry {
                state: ConfirmationState::Verifying,
                manual_retries_used: 0,
                running: false,
            });
        if entry.running || matches!(entry.state, ConfirmationState::Success { .. }) {
            return false;
        }
        entry.state = ConfirmationState::Verifying;
        entry.running = true;
        true
    }

    /// Consume one manual retry; returns false when the budget is spent or
    /// the order is not in a retryable failure state.
    fn begin_manual_retry(&self, order_id: &str, max_manual_retries: u32) -> bool {
        let Some(mut entry) = self.inner.get_mut(order_id) else {
            return false;
        };
        let retryable = matches!(
            entry.state,
            ConfirmationState::Failed {
                reason: FailureReason::VerificationError,
                ..
            }
        );
        if entry.running || !retryable || entry.manual_retries_used >= max_manual_retries {
            return false;
        }
        entry.manual_retries_used += 1;
        entry.state = ConfirmationState::Verifying;
        entry.running = true;
        true
    }
}

/// Start a confirmation worker for the order unless one already ran to
/// success or is in flight. Returns the current snapshot either way.
pub fn start(state: Arc<AppState>, order_id: &str) -> ConfirmationSnapshot {
    if state.confirmations.begin(order_id) {
        spawn_worker(state.clone(), order_id.to_string());
    }
    state
        .confirmations
        .snapshot(order_id, state.config.payments.max_manual_retries)
        .expect("entry created by begin")
}

/// Manual retry after a permanent verification error.
pub fn manual_retry(state: Arc<AppState>, order_id: &str) -> Option<ConfirmationSnapshot> {
    let max = state.config.payments.max_manual_retries;
    if !state.confirmations.begin_manual_retry(order_id, max) {
        return None;
    }
    spawn_worker(state.clone(), order_id.to_string());
    state.confirmations.snapshot(order_id, max)
}

fn spawn_worker(state: Arc<AppState>, order_id: String) {
    tokio::spawn(async move {
        run_worker(state, order_id).await;
    });
}

async fn run_worker(state: Arc<AppState>, order_id: String) {
    let token = state.shutdown.child_token();
    let config = &state.config.payments;
    let error_policy = RetryPolicy::new(
        config.error_attempts,
        Duration::from_secs(config.error_delay_secs),
    );

    // Unexpected errors restart verification from the top, bounded
    let outcome = retry::run(error_policy, &token, |attempt| {
        let state = state.clone();
        let order_id = order_id.clone();
        let token = token.clone();
        async move {
            match drive(&state, &order_id, &token).await {
                Ok(VerifyResult::Terminal(terminal)) => Ok(Attempt::Done(Some(terminal))),
                Ok(VerifyResult::Cancelled) => Ok(Attempt::Done(None)),
                Err(e) => {
                    tracing::warn!(
                        order = %order_id,
                        attempt,
                        error = %e,
                        "Payment verification attempt failed"
                    );
                    Ok(Attempt::Again)
                }
            }
        }
    })
    .await;

    let final_state = match outcome {
        Outcome::Done {
            value: Some(terminal),
            ..
        } => terminal,
        Outcome::Done { value: None, .. } | Outcome::Cancelled { .. } => {
            // Shutdown mid-verification; leave the entry resumable
            state
                .confirmations
                .set_state(&order_id, ConfirmationState::Verifying, false);
            return;
        }
        Outcome::Exhausted { attempts } => {
            tracing::error!(order = %order_id, attempts, "Payment verification gave up");
            ConfirmationState::Failed {
                reason: FailureReason::VerificationError,
                message: "Payment verification failed. You can retry, or contact support."
                    .to_string(),
                support_url: state.config.payments.support_url.clone(),
            }
        }
        // The op never returns Err
        Outcome::Failed { error, .. } => {
            tracing::error!(order = %order_id, error = %error, "Payment verification aborted");
            ConfirmationState::Failed {
                reason: FailureReason::VerificationError,
                message: "Payment verification failed. You can retry, or contact support."
                    .to_string(),
                support_url: state.config.payments.support_url.clone(),
            }
        }
    };

    match &final_state {
        ConfirmationState::Success { .. } => {
            metrics::counter!(crate::api::metrics::CONFIRMATIONS_TOTAL, "outcome" => "success")
                .increment(1)
        }
        ConfirmationState::Failed { .. } => {
            metrics::counter!(crate::api::metrics::CONFIRMATIONS_TOTAL, "outcome" => "failed")
                .increment(1)
        }
        ConfirmationState::Verifying => {}
    }
    state.confirmations.set_state(&order_id, final_state, false);
}

#[derive(Debug)]
enum VerifyResult {
    Terminal(ConfirmationState),
    Cancelled,
}

/// One full verification pass. Errors bubble to the bounded error-retry
/// loop in `run_worker`.
async fn drive(
    state: &AppState,
    order_id: &str,
    token: &CancellationToken,
) -> Result<VerifyResult> {
    if let Some((course_id, student_id)) = parse_course_order(order_id) {
        confirm_course_purchase(state, order_id, &course_id, &student_id, token).await
    } else {
        confirm_session_payment(state, order_id, token).await
    }
}

/// Course purchases skip the payment-record table entirely: the order id
/// carries everything needed to enroll.
async fn confirm_course_purchase(
    state: &AppState,
    order_id: &str,
    course_id: &str,
    student_id: &str,
    token: &CancellationToken,
) -> Result<VerifyResult> {
    let status = match poll_gateway(state, order_id, token).await? {
        Some(status) => status,
        None => return Ok(VerifyResult::Cancelled),
    };

    match status {
        OrderStatus::Paid => {
            create_enrollment(&state.db, course_id, student_id, order_id).await?;
            Ok(VerifyResult::Terminal(ConfirmationState::Success {
                redirect: COURSES_REDIRECT.to_string(),
            }))
        }
        OrderStatus::Failed | OrderStatus::Expired => Ok(VerifyResult::Terminal(payment_failed(
            state,
            "The payment was not completed. You have not been charged.",
        ))),
        OrderStatus::Pending => Ok(VerifyResult::Terminal(timed_out(state))),
    }
}

async fn confirm_session_payment(
    state: &AppState,
    order_id: &str,
    token: &CancellationToken,
) -> Result<VerifyResult> {
    let config = &state.config.payments;

    // The settlement transaction may not have committed when the student
    // arrives here; wait for the record before polling the gateway.
    let lookup_policy = RetryPolicy::new(
        config.lookup_attempts,
        Duration::from_secs(config.lookup_delay_secs),
    );
    let record = {
        let db = state.db.clone();
        let order_id = order_id.to_string();
        retry::run(lookup_policy, token, move |_| {
            let db = db.clone();
            let order_id = order_id.clone();
            async move {
                let record: Option<PaymentRecord> =
                    sqlx::query_as("SELECT * FROM payment_records WHERE order_id = ?")
                        .bind(&order_id)
                        .fetch_optional(&db)
                        .await
                        .context("payment record lookup")?;
                Ok(match record {
                    Some(record) => Attempt::Done(record),
                    None => Attempt::Again,
                })
            }
        })
        .await
    };

    let record = match record {
        Outcome::Done { value, .. } => value,
        Outcome::Exhausted { attempts } => {
            tracing::warn!(order = %order_id, attempts, "No payment record found for order");
            return Ok(VerifyResult::Terminal(ConfirmationState::Failed {
                reason: FailureReason::RecordNotFound,
                message: "We could not find a payment for this order. If you were charged, \
                          please contact support."
                    .to_string(),
                support_url: state.config.payments.support_url.clone(),
            }));
        }
        Outcome::Cancelled { .. } => return Ok(VerifyResult::Cancelled),
        Outcome::Failed { error, .. } => return Err(error),
    };

    let status = match poll_gateway(state, order_id, token).await? {
        Some(status) => status,
        None => return Ok(VerifyResult::Cancelled),
    };

    match status {
        OrderStatus::Paid => {
            finalize_session_payment(&state.db, &record).await?;
            Ok(VerifyResult::Terminal(ConfirmationState::Success {
                redirect: SESSIONS_REDIRECT.to_string(),
            }))
        }
        OrderStatus::Failed | OrderStatus::Expired => {
            mark_payment_failed(&state.db, &record).await?;
            Ok(VerifyResult::Terminal(payment_failed(
                state,
                "The payment was not completed. You have not been charged.",
            )))
        }
        OrderStatus::Pending => Ok(VerifyResult::Terminal(timed_out(state))),
    }
}

/// Poll the gateway until the order is terminal or the pending budget runs
/// out. `Ok(None)` means cancelled; `Ok(Some(Pending))` means exhausted.
async fn poll_gateway(
    state: &AppState,
    order_id: &str,
    token: &CancellationToken,
) -> Result<Option<OrderStatus>> {
    let config = &state.config.payments;
    let pending_policy = RetryPolicy::new(
        config.pending_attempts,
        Duration::from_secs(config.pending_delay_secs),
    );

    let gateway = state.gateway.clone();
    let order_id = order_id.to_string();
    let outcome = retry::run(pending_policy, token, move |_| {
        let gateway = gateway.clone();
        let order_id = order_id.clone();
        async move {
            let status = gateway
                .verify_order(&order_id)
                .await
                .context("gateway verification")?;
            Ok(if status.is_terminal() {
                Attempt::Done(status)
            } else {
                Attempt::Again
            })
        }
    })
    .await;

    match outcome {
        Outcome::Done { value, .. } => Ok(Some(value)),
        Outcome::Exhausted { .. } => Ok(Some(OrderStatus::Pending)),
        Outcome::Cancelled { .. } => Ok(None),
        Outcome::Failed { error, .. } => Err(error),
    }
}

/// Paid order observed: complete the record and surface the request to the
/// teacher. Both updates are guarded so replays are no-ops.
async fn finalize_session_payment(db: &DbPool, record: &PaymentRecord) -> Result<()> {
    let now = now_rfc3339();
    let mut tx = db.begin().await?;

    sqlx::query(
        "UPDATE payment_records SET status = 'completed', settled_at = ? WHERE id = ? AND status = 'pending'",
    )
    .bind(&now)
    .bind(&record.id)
    .execute(&mut *tx)
    .await?;

    if let Some(request_id) = &record.session_request_id {
        sqlx::query(
            r#"
            UPDATE session_requests
            SET status = 'pending', payment_status = 'completed', updated_at = ?
            WHERE id = ? AND status = 'payment_completed'
            "#,
        )
        .bind(&now)
        .bind(request_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    tracing::info!(payment = %record.id, order = %record.order_id, "Payment settled");
    Ok(())
}

async fn mark_payment_failed(db: &DbPool, record: &PaymentRecord) -> Result<()> {
    sqlx::query("UPDATE payment_records SET status = 'failed' WHERE id = ? AND status = 'pending'")
        .bind(&record.id)
        .execute(db)
        .await?;
    Ok(())
}

/// Idempotent enrollment insert; the unique (course, student) index makes
/// replays no-ops.
async fn create_enrollment(
    db: &DbPool,
    course_id: &str,
    student_id: &str,
    order_id: &str,
) -> Result<()> {
    let payment_record_id: Option<(String,)> =
        sqlx::query_as("SELECT id FROM payment_records WHERE order_id = ?")
            .bind(order_id)
            .fetch_optional(db)
            .await?;

    let inserted = sqlx::query(
        r#"
        INSERT OR IGNORE INTO enrollments (id, course_id, student_id, payment_record_id, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(course_id)
    .bind(student_id)
    .bind(payment_record_id.map(|(id,)| id))
    .bind(now_rfc3339())
    .execute(db)
    .await?;

    if inserted.rows_affected() > 0 {
        tracing::info!(course = %course_id, student = %student_id, "Enrollment created");
        metrics::counter!(crate::api::metrics::ENROLLMENTS_TOTAL).increment(1);
    }
    Ok(())
}

fn payment_failed(state: &AppState, message: &str) -> ConfirmationState {
    ConfirmationState::Failed {
        reason: FailureReason::PaymentFailed,
        message: message.to_string(),
        support_url: state.config.payments.support_url.clone(),
    }
}

fn timed_out(state: &AppState) -> ConfirmationState {
    ConfirmationState::Failed {
        reason: FailureReason::TimedOut,
        message: "This payment is taking longer than expected. If the amount was deducted, \
                  it will be settled automatically; otherwise contact support."
            .to_string(),
        support_url: state.config.payments.support_url.clone(),
    }
}

/// Course purchase order ids are `COURSE_<courseId>_<studentId>`. Both ids
/// are UUIDs, so splitting on the underscore is unambiguous.
fn parse_course_order(order_id: &str) -> Option<(String, String)> {
    let rest = order_id.strip_prefix("COURSE_")?;
    let (course_id, student_id) = rest.split_once('_')?;
    if course_id.is_empty() || student_id.is_empty() {
        return None;
    }
    Some((course_id.to_string(), student_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::test_pool;
    use crate::gateway::mock::ScriptedGateway;

    async fn test_state(gateway: ScriptedGateway) -> Arc<AppState> {
        // Pool setup waits on a real connection thread; under the paused
        // clock the runtime auto-advances past sqlx's acquire timeout before
        // that thread can answer, so run the fixture setup on real time.
        tokio::time::resume();
        let db = test_pool().await;
        seed_base(&db).await;
        tokio::time::pause();
        Arc::new(AppState::new(Config::default(), db, Arc::new(gateway)))
    }

    async fn seed_base(db: &DbPool) {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, name, role, hourly_rate) VALUES
                ('student-1', 's@example.com', 'h', 'Asha', 'student', NULL),
                ('teacher-1', 't@example.com', 'h', 'Ravi', 'teacher', 500)
            "#,
        )
        .execute(db)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO courses (id, teacher_id, title, price, lesson_count, published) VALUES ('course-1', 'teacher-1', 'Algebra', 1200, 8, 1)",
        )
        .execute(db)
        .await
        .unwrap();
    }

    async fn seed_session_payment(db: &DbPool, order_id: &str) {
        sqlx::query(
            r#"
            INSERT INTO session_requests (id, student_id, teacher_id, title, scheduled_date, duration_minutes, status, payment_status, payment_amount, course_id)
            VALUES ('req-1', 'student-1', 'teacher-1', 'Algebra', '2026-09-01', 60, 'payment_completed', 'pending', 550, 'course-1')
            "#,
        )
        .execute(db)
        .await
        .unwrap();
        sqlx::query(
            r#"
            INSERT INTO payment_records (id, session_request_id, amount, platform_fee, teacher_amount, status, order_id)
            VALUES ('pay-1', 'req-1', 550, 50, 500, 'pending', ?)
            "#,
        )
        .bind(order_id)
        .execute(db)
        .await
        .unwrap();
    }

    fn order_parse_cases() -> Vec<(&'static str, Option<(&'static str, &'static str)>)> {
        vec![
            ("COURSE_c-1_s-1", Some(("c-1", "s-1"))),
            ("COURSE_c-1_", None),
            ("COURSE__s", None),
            ("order_12345", None),
            ("COURSE_", None),
        ]
    }

    #[test]
    fn snapshot_serializes_with_a_flat_state_tag() {
        let snapshot = ConfirmationSnapshot {
            order_id: "order_1".to_string(),
            state: ConfirmationState::Failed {
                reason: FailureReason::PaymentFailed,
                message: "The payment was not completed.".to_string(),
                support_url: "/support?topic=payments".to_string(),
            },
            manual_retries_remaining: 2,
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["state"], "failed");
        assert_eq!(value["reason"], "payment_failed");
        assert_eq!(value["manual_retries_remaining"], 2);

        let verifying = ConfirmationSnapshot {
            order_id: "order_2".to_string(),
            state: ConfirmationState::Verifying,
            manual_retries_remaining: 3,
        };
        let value = serde_json::to_value(&verifying).unwrap();
        assert_eq!(value["state"], "verifying");
    }

    #[test]
    fn course_order_parsing() {
        for (raw, expected) in order_parse_cases() {
            let parsed = parse_course_order(raw);
            assert_eq!(
                parsed,
                expected.map(|(c, s)| (c.to_string(), s.to_string())),
                "case {raw}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn paid_course_order_creates_exactly_one_enrollment() {
        let state = test_state(ScriptedGateway::always(OrderStatus::Paid)).await;
        let token = CancellationToken::new();
        let order = "COURSE_course-1_student-1";

        let result = drive(&state, order, &token).await.unwrap();
        match result {
            VerifyResult::Terminal(ConfirmationState::Success { redirect }) => {
                assert_eq!(redirect, COURSES_REDIRECT)
            }
            _ => panic!("expected success"),
        }

        // Replay must not double-create
        drive(&state, order, &token).await.unwrap();

        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM enrollments WHERE course_id = 'course-1' AND student_id = 'student-1'",
        )
        .fetch_one(&state.db)
        .await
        .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn record_appearing_on_the_eighth_attempt_still_succeeds() {
        let state = test_state(ScriptedGateway::always(OrderStatus::Paid)).await;
        let token = CancellationToken::new();

        // Settlement commits 20s after verification starts; with a 3s lookup
        // cadence the record becomes visible on the 8th attempt (t=21s).
        let db = state.db.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(20)).await;
            seed_session_payment(&db, "order_late").await;
        });

        let result = drive(&state, "order_late", &token).await.unwrap();
        match result {
            VerifyResult::Terminal(ConfirmationState::Success { redirect }) => {
                assert_eq!(redirect, SESSIONS_REDIRECT)
            }
            _ => panic!("expected success"),
        }

        let (status,): (String,) =
            sqlx::query_as("SELECT status FROM session_requests WHERE id = 'req-1'")
                .fetch_one(&state.db)
                .await
                .unwrap();
        assert_eq!(status, "pending", "request must become teacher-visible");
    }

    #[tokio::test(start_paused = true)]
    async fn missing_record_fails_after_the_lookup_budget() {
        let state = test_state(ScriptedGateway::always(OrderStatus::Paid)).await;
        let token = CancellationToken::new();

        let result = drive(&state, "order_ghost", &token).await.unwrap();
        match result {
            VerifyResult::Terminal(ConfirmationState::Failed { reason, .. }) => {
                assert_eq!(reason, FailureReason::RecordNotFound)
            }
            _ => panic!("expected record-not-found failure"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn forever_pending_order_times_out_without_side_effects() {
        let state = test_state(ScriptedGateway::always(OrderStatus::Pending)).await;
        seed_session_payment(&state.db, "order_slow").await;
        let token = CancellationToken::new();

        let result = drive(&state, "order_slow", &token).await.unwrap();
        match result {
            VerifyResult::Terminal(ConfirmationState::Failed { reason, .. }) => {
                assert_eq!(reason, FailureReason::TimedOut)
            }
            _ => panic!("expected timeout failure"),
        }

        let (status,): (String,) =
            sqlx::query_as("SELECT status FROM payment_records WHERE order_id = 'order_slow'")
                .fetch_one(&state.db)
                .await
                .unwrap();
        assert_eq!(status, "pending", "record must stay pending on timeout");
        let (req_status,): (String,) =
            sqlx::query_as("SELECT status FROM session_requests WHERE id = 'req-1'")
                .fetch_one(&state.db)
                .await
                .unwrap();
        assert_eq!(req_status, "payment_completed");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_order_marks_the_record_failed() {
        let state = test_state(ScriptedGateway::always(OrderStatus::Failed)).await;
        seed_session_payment(&state.db, "order_bad").await;
        let token = CancellationToken::new();

        let result = drive(&state, "order_bad", &token).await.unwrap();
        assert!(matches!(
            result,
            VerifyResult::Terminal(ConfirmationState::Failed {
                reason: FailureReason::PaymentFailed,
                ..
            })
        ));

        let (status,): (String,) =
            sqlx::query_as("SELECT status FROM payment_records WHERE order_id = 'order_bad'")
                .fetch_one(&state.db)
                .await
                .unwrap();
        assert_eq!(status, "failed");
    }

    #[tokio::test(start_paused = true)]
    async fn settlement_replay_is_idempotent() {
        let state = test_state(ScriptedGateway::always(OrderStatus::Paid)).await;
        seed_session_payment(&state.db, "order_ok").await;
        let token = CancellationToken::new();

        drive(&state, "order_ok", &token).await.unwrap();
        drive(&state, "order_ok", &token).await.unwrap();

        let (settled_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM payment_records WHERE order_id = 'order_ok' AND status = 'completed'",
        )
        .fetch_one(&state.db)
        .await
        .unwrap();
        assert_eq!(settled_count, 1);
        let (req_status,): (String,) =
            sqlx::query_as("SELECT status FROM session_requests WHERE id = 'req-1'")
                .fetch_one(&state.db)
                .await
                .unwrap();
        assert_eq!(req_status, "pending");
    }

    #[tokio::test(start_paused = true)]
    async fn gateway_errors_bubble_to_the_error_budget() {
        let state = test_state(ScriptedGateway::new(vec![Err("boom".to_string())])).await;
        seed_session_payment(&state.db, "order_err").await;
        let token = CancellationToken::new();

        let err = drive(&state, "order_err", &token).await.unwrap_err();
        assert!(err.to_string().contains("gateway verification"));
    }

    #[tokio::test(start_paused = true)]
    async fn worker_reports_verification_error_after_budget() {
        let state = test_state(ScriptedGateway::new(vec![Err("boom".to_string())])).await;
        seed_session_payment(&state.db, "order_err2").await;

        state.confirmations.begin("order_err2");
        run_worker(state.clone(), "order_err2".to_string()).await;

        let snapshot = state
            .confirmations
            .snapshot("order_err2", state.config.payments.max_manual_retries)
            .unwrap();
        assert!(matches!(
            snapshot.state,
            ConfirmationState::Failed {
                reason: FailureReason::VerificationError,
                ..
            }
        ));
        assert_eq!(snapshot.manual_retries_remaining, 3);

        // Three manual retries are allowed, then the budget is spent
        for _ in 0..3 {
            assert!(state.confirmations.begin_manual_retry("order_err2", 3));
            state
                .confirmations
                .set_state("order_err2", snapshot.state.clone(), false);
        }
        assert!(!state.confirmations.begin_manual_retry("order_err2", 3));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_leaves_the_entry_resumable() {
        let state = test_state(ScriptedGateway::always(OrderStatus::Pending)).await;
        seed_session_payment(&state.db, "order_cancel").await;

        state.confirmations.begin("order_cancel");
        state.shutdown.cancel();
        run_worker(state.clone(), "order_cancel".to_string()).await;

        let snapshot = state
            .confirmations
            .snapshot("order_cancel", 3)
            .unwrap();
        assert_eq!(snapshot.state, ConfirmationState::Verifying);
    }
}
