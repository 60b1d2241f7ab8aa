//! Payment confirmation endpoints and payment history.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::db::{PaymentRecord, User};
use crate::engine::confirmation::{self, ConfirmationSnapshot};
use crate::AppState;

/// POST /api/payments/:order_id/confirm
///
/// Kicks off (or resumes) the background verification worker and returns
/// the current state. Idempotent; a second call while a worker runs does
/// not start another.
pub async fn start_confirmation(
    State(state): State<Arc<AppState>>,
    _user: User,
    Path(order_id): Path<String>,
) -> Result<Json<ConfirmationSnapshot>, ApiError> {
    if order_id.trim().is_empty() {
        return Err(ApiError::bad_request("Order id is required"));
    }
    Ok(Json(confirmation::start(state, &order_id)))
}

/// GET /api/payments/:order_id/confirmation
pub async fn confirmation_status(
    State(state): State<Arc<AppState>>,
    _user: User,
    Path(order_id): Path<String>,
) -> Result<Json<ConfirmationSnapshot>, ApiError> {
    state
        .confirmations
        .snapshot(&order_id, state.config.payments.max_manual_retries)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("No confirmation in progress for this order"))
}

/// POST /api/payments/:order_id/retry
///
/// Available only after verification errors, and at most
/// `max_manual_retries` times per order.
pub async fn manual_retry(
    State(state): State<Arc<AppState>>,
    _user: User,
    Path(order_id): Path<String>,
) -> Result<Json<ConfirmationSnapshot>, ApiError> {
    confirmation::manual_retry(state, &order_id)
        .map(Json)
        .ok_or_else(|| {
            ApiError::rate_limited("No retries remaining for this order, or it is not retryable")
        })
}

/// GET /api/payments/history
///
/// The student's payment records, newest first. Course purchase records
/// have no session request; they are matched through the order id.
pub async fn payment_history(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<PaymentRecord>>, ApiError> {
    let records: Vec<PaymentRecord> = sqlx::query_as(
        r#"
        SELECT p.* FROM payment_records p
        LEFT JOIN session_requests r ON r.id = p.session_request_id
        WHERE r.student_id = ?1
           OR (p.session_request_id IS NULL AND p.order_id LIKE 'COURSE%' || ?1)
        ORDER BY p.created_at DESC
        "#,
    )
    .bind(&user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(records))
}
