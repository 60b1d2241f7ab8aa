//! Session request dashboards and the teacher accept/decline actions.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use tracing::info;

use crate::api::error::ApiError;
use crate::db::{SessionRequest, User};
use crate::util::now_rfc3339;
use crate::AppState;

/// GET /api/requests/mine
///
/// The student's view includes requests still awaiting reconciliation.
pub async fn my_requests(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<SessionRequest>>, ApiError> {
    let requests: Vec<SessionRequest> = sqlx::query_as(
        "SELECT * FROM session_requests WHERE student_id = ? ORDER BY created_at DESC",
    )
    .bind(&user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(requests))
}

/// GET /api/requests/incoming
///
/// Requests in `payment_completed` are invisible here until the
/// confirmation worker reconciles them to `pending`.
pub async fn incoming_requests(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<SessionRequest>>, ApiError> {
    if !user.is_teacher() {
        return Err(ApiError::forbidden("Only teachers have incoming requests"));
    }

    let requests: Vec<SessionRequest> = sqlx::query_as(
        r#"
        SELECT * FROM session_requests
        WHERE teacher_id = ? AND status != 'payment_completed'
        ORDER BY created_at DESC
        "#,
    )
    .bind(&user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(requests))
}

/// POST /api/requests/:id/accept
pub async fn accept_request(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(request_id): Path<String>,
) -> Result<Json<SessionRequest>, ApiError> {
    transition_request(&state, &user, &request_id, "accepted").await
}

/// POST /api/requests/:id/decline
pub async fn decline_request(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(request_id): Path<String>,
) -> Result<Json<SessionRequest>, ApiError> {
    transition_request(&state, &user, &request_id, "declined").await
}

/// Only pending requests can be accepted or declined, and only by the
/// teacher they were sent to.
async fn transition_request(
    state: &AppState,
    user: &User,
    request_id: &str,
    new_status: &str,
) -> Result<Json<SessionRequest>, ApiError> {
    if !user.is_teacher() {
        return Err(ApiError::forbidden("Only teachers can act on requests"));
    }

    let result = sqlx::query(
        r#"
        UPDATE session_requests
        SET status = ?, updated_at = ?
        WHERE id = ? AND teacher_id = ? AND status = 'pending'
        "#,
    )
    .bind(new_status)
    .bind(now_rfc3339())
    .bind(request_id)
    .bind(&user.id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        let existing: Option<SessionRequest> =
            sqlx::query_as("SELECT * FROM session_requests WHERE id = ? AND teacher_id = ?")
                .bind(request_id)
                .bind(&user.id)
                .fetch_optional(&state.db)
                .await?;
        return match existing {
            Some(request) => Err(ApiError::conflict(format!(
                "Request is {} and cannot change",
                request.status
            ))),
            None => Err(ApiError::not_found("Session request not found")),
        };
    }

    let request: SessionRequest = sqlx::query_as("SELECT * FROM session_requests WHERE id = ?")
        .bind(request_id)
        .fetch_one(&state.db)
        .await?;

    info!(request = %request_id, teacher = %user.id, status = %new_status, "Session request updated");

    Ok(Json(request))
}
