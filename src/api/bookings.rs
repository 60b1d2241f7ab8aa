//! Booking draft endpoints.
//!
//! These drive the in-memory flow machine; nothing here touches the
//! database until the final submit, which runs the settlement transaction.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::error::{ApiError, ValidationErrorBuilder};
use crate::api::validation;
use crate::booking::flow::{BookingDraft, FlowError};
use crate::booking::settlement::{self, SettlementOutcome};
use crate::db::{PaymentRecord, SessionRequest, SessionType, SubmitRequestForm, User};
use crate::pricing::{self, PricingBreakdown};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SelectTeacherRequest {
    pub teacher_id: String,
}

/// Exactly one of `slot_id` or `course_id` must be set.
#[derive(Debug, Deserialize)]
pub struct SelectOfferRequest {
    #[serde(default)]
    pub slot_id: Option<String>,
    #[serde(default)]
    pub course_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub order_id: String,
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub rate: i64,
    #[serde(flatten)]
    pub breakdown: PricingBreakdown,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub request: SessionRequest,
    pub payment: PaymentRecord,
}

fn owned_draft(state: &AppState, user: &User, draft_id: &str) -> Result<BookingDraft, ApiError> {
    let draft = state
        .drafts
        .get(draft_id)
        .ok_or_else(|| ApiError::not_found("Booking draft not found"))?;
    if draft.student_id != user.id {
        // Hide other students' drafts entirely
        return Err(ApiError::not_found("Booking draft not found"));
    }
    Ok(draft)
}

fn apply(
    state: &AppState,
    user: &User,
    draft_id: &str,
    f: impl FnOnce(&mut BookingDraft) -> Result<(), FlowError>,
) -> Result<BookingDraft, ApiError> {
    owned_draft(state, user, draft_id)?;
    state
        .drafts
        .update(draft_id, f)
        .ok_or_else(|| ApiError::not_found("Booking draft not found"))?
        .map_err(ApiError::from)?;
    owned_draft(state, user, draft_id)
}

/// POST /api/bookings
pub async fn create_draft(
    State(state): State<Arc<AppState>>,
    user: User,
) -> (StatusCode, Json<BookingDraft>) {
    let draft = BookingDraft::new(&user.id);
    state.drafts.insert(draft.clone());
    info!(draft = %draft.id, student = %user.id, "Booking draft started");
    (StatusCode::CREATED, Json(draft))
}

/// GET /api/bookings/:id
pub async fn get_draft(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(draft_id): Path<String>,
) -> Result<Json<BookingDraft>, ApiError> {
    Ok(Json(owned_draft(&state, &user, &draft_id)?))
}

/// POST /api/bookings/:id/teacher
pub async fn select_teacher(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(draft_id): Path<String>,
    Json(request): Json<SelectTeacherRequest>,
) -> Result<Json<BookingDraft>, ApiError> {
    let teacher: Option<(String,)> =
        sqlx::query_as("SELECT id FROM users WHERE id = ? AND role = 'teacher'")
            .bind(&request.teacher_id)
            .fetch_optional(&state.db)
            .await?;
    if teacher.is_none() {
        return Err(ApiError::not_found("Teacher not found"));
    }

    let draft = apply(&state, &user, &draft_id, |d| {
        d.select_teacher(&request.teacher_id)
    })?;
    Ok(Json(draft))
}

/// POST /api/bookings/:id/offer
pub async fn select_offer(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(draft_id): Path<String>,
    Json(request): Json<SelectOfferRequest>,
) -> Result<Json<BookingDraft>, ApiError> {
    let draft = match (&request.slot_id, &request.course_id) {
        (Some(slot_id), None) => {
            let session_type: Option<(String,)> = sqlx::query_as(
                "SELECT session_type FROM availability_slots WHERE id = ? AND status = 'available'",
            )
            .bind(slot_id)
            .fetch_optional(&state.db)
            .await?;
            let session_type = session_type
                .map(|(s,)| SessionType::from(s))
                .ok_or_else(|| ApiError::not_found("Availability slot not found"))?;

            apply(&state, &user, &draft_id, |d| {
                d.select_slot(slot_id, Some(session_type))
            })?
        }
        (None, Some(course_id)) => {
            let course: Option<(String,)> =
                sqlx::query_as("SELECT id FROM courses WHERE id = ? AND published = 1")
                    .bind(course_id)
                    .fetch_optional(&state.db)
                    .await?;
            if course.is_none() {
                return Err(ApiError::not_found("Course not found"));
            }

            apply(&state, &user, &draft_id, |d| d.select_course(course_id))?
        }
        _ => {
            return Err(ApiError::bad_request(
                "Exactly one of slot_id or course_id is required",
            ))
        }
    };
    Ok(Json(draft))
}

/// GET /api/bookings/:id/quote
pub async fn quote(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(draft_id): Path<String>,
) -> Result<Json<QuoteResponse>, ApiError> {
    let draft = owned_draft(&state, &user, &draft_id)?;
    let rate = settlement::quote_rate(&state.db, &draft).await?;
    Ok(Json(QuoteResponse {
        rate,
        breakdown: pricing::breakdown(rate),
    }))
}

/// POST /api/bookings/:id/payment
pub async fn confirm_payment(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(draft_id): Path<String>,
    Json(request): Json<ConfirmPaymentRequest>,
) -> Result<Json<BookingDraft>, ApiError> {
    let draft = apply(&state, &user, &draft_id, |d| {
        d.confirm_payment(&request.order_id)
    })?;
    Ok(Json(draft))
}

/// POST /api/bookings/:id/back
pub async fn back(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(draft_id): Path<String>,
) -> Result<Json<BookingDraft>, ApiError> {
    let draft = apply(&state, &user, &draft_id, |d| d.back())?;
    Ok(Json(draft))
}

/// POST /api/bookings/:id/submit
///
/// Runs the settlement transaction, retires the draft, and sends the
/// acknowledgment email off the request path.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(draft_id): Path<String>,
    Json(form): Json<SubmitRequestForm>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validation::validate_title(&form.title) {
        errors.add("title", e);
    }
    if let Err(e) = validation::validate_date(&form.scheduled_date) {
        errors.add("scheduled_date", e);
    }
    if let Err(e) = validation::validate_duration_minutes(form.duration_minutes) {
        errors.add("duration_minutes", e);
    }
    errors.finish()?;

    let draft = owned_draft(&state, &user, &draft_id)?;

    let SettlementOutcome { request, payment } = settlement::settle(&state.db, &draft, &form).await?;

    state
        .drafts
        .update(&draft_id, |d| d.mark_submitted())
        .ok_or_else(|| ApiError::not_found("Booking draft not found"))?
        .map_err(ApiError::from)?;
    state.drafts.remove(&draft_id);

    send_acknowledgment(&state, &user, &request).await;

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse { request, payment }),
    ))
}

async fn send_acknowledgment(state: &Arc<AppState>, student: &User, request: &SessionRequest) {
    if !state.mailer.is_enabled() {
        return;
    }

    let teacher_name: Option<(String,)> = sqlx::query_as("SELECT name FROM users WHERE id = ?")
        .bind(&request.teacher_id)
        .fetch_optional(&state.db)
        .await
        .ok()
        .flatten();
    let teacher_name = teacher_name.map(|(n,)| n).unwrap_or_default();

    let mailer = state.mailer.clone();
    let to = student.email.clone();
    let student_name = student.name.clone();
    let request = request.clone();
    tokio::spawn(async move {
        if let Err(e) = mailer
            .send_request_acknowledgment(&to, &student_name, &teacher_name, &request)
            .await
        {
            warn!(request = %request.id, error = %e, "Failed to send acknowledgment email");
        }
    });
}
