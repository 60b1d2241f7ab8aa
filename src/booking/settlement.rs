//! Booking settlement.
//!
//! One transaction per successful booking: the session request, its payment
//! record, and the slot update commit together or not at all. The slot
//! update is guarded on `status = 'available'`, so a slot that was booked or
//! expired after the student picked it aborts the whole settlement instead
//! of charging against a dead slot.

use sqlx::Row;
use thiserror::Error;
use uuid::Uuid;

use crate::booking::flow::{BookingDraft, BookingKind, FlowState, OfferRef};
use crate::db::{
    Course, DbPool, PaymentRecord, PaymentStatus, RequestStatus, SessionRequest, SubmitRequestForm,
};
use crate::pricing;
use crate::util::now_rfc3339;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("draft is not ready to submit (state {0})")]
    DraftNotReady(FlowState),
    #[error("availability slot not found")]
    SlotNotFound,
    #[error("availability slot is no longer available")]
    SlotUnavailable,
    #[error("course not found or not published")]
    CourseNotFound,
    #[error("selected offer does not belong to the selected teacher")]
    OfferMismatch,
    #[error("teacher has no rate configured")]
    RateMissing,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

#[derive(Debug)]
pub struct SettlementOutcome {
    pub request: SessionRequest,
    pub payment: PaymentRecord,
}

/// Commit a submitted draft. The draft must have reached the request-form
/// state, which guarantees teacher, offer, and gateway order are present.
pub async fn settle(
    db: &DbPool,
    draft: &BookingDraft,
    form: &SubmitRequestForm,
) -> Result<SettlementOutcome, SettlementError> {
    if draft.state != FlowState::RequestForm {
        return Err(SettlementError::DraftNotReady(draft.state));
    }
    let teacher_id = draft
        .teacher_id
        .as_deref()
        .ok_or(SettlementError::DraftNotReady(draft.state))?;
    let offer = draft
        .offer
        .as_ref()
        .ok_or(SettlementError::DraftNotReady(draft.state))?;
    let order_id = draft
        .order_id
        .as_deref()
        .ok_or(SettlementError::DraftNotReady(draft.state))?;

    let mut tx = db.begin().await?;

    // Resolve the teacher rate from the offer
    let (teacher_rate, availability_id, course_id) = match offer {
        OfferRef::Slot(slot_id) => {
            let row = sqlx::query(
                "SELECT teacher_id FROM availability_slots WHERE id = ?",
            )
            .bind(slot_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(SettlementError::SlotNotFound)?;
            let slot_teacher: String = row.get("teacher_id");
            if slot_teacher != teacher_id {
                return Err(SettlementError::OfferMismatch);
            }

            let rate: Option<(Option<i64>,)> =
                sqlx::query_as("SELECT hourly_rate FROM users WHERE id = ?")
                    .bind(teacher_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            let rate = rate
                .and_then(|(r,)| r)
                .ok_or(SettlementError::RateMissing)?;
            (rate, Some(slot_id.clone()), None)
        }
        OfferRef::Course(course_id) => {
            let course: Option<Course> = sqlx::query_as(
                "SELECT * FROM courses WHERE id = ? AND published = 1",
            )
            .bind(course_id)
            .fetch_optional(&mut *tx)
            .await?;
            let course = course.ok_or(SettlementError::CourseNotFound)?;
            if course.teacher_id != teacher_id {
                return Err(SettlementError::OfferMismatch);
            }
            (course.price, None, Some(course_id.clone()))
        }
    };

    let price = pricing::breakdown(teacher_rate);
    let now = now_rfc3339();
    let request_id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO session_requests (id, student_id, teacher_id, title, scheduled_date, duration_minutes, status, payment_status, payment_amount, availability_id, course_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&request_id)
    .bind(&draft.student_id)
    .bind(teacher_id)
    .bind(&form.title)
    .bind(&form.scheduled_date)
    .bind(form.duration_minutes)
    .bind(RequestStatus::PaymentCompleted.to_string())
    .bind(PaymentStatus::Pending.to_string())
    .bind(price.student_amount)
    .bind(&availability_id)
    .bind(&course_id)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    let payment_id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO payment_records (id, session_request_id, amount, platform_fee, teacher_amount, status, order_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&payment_id)
    .bind(&request_id)
    .bind(price.student_amount)
    .bind(price.platform_fee)
    .bind(price.teacher_amount)
    .bind(PaymentStatus::Pending.to_string())
    .bind(order_id)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    if let Some(slot_id) = &availability_id {
        let updated = match draft.kind {
            Some(BookingKind::Individual) => {
                sqlx::query(
                    r#"
                    UPDATE availability_slots
                    SET status = ?, booked_students = booked_students + 1, updated_at = ?
                    WHERE id = ? AND status = 'available'
                    "#,
                )
                .bind(crate::db::SlotStatus::Booked.to_string())
                .bind(&now)
                .bind(slot_id)
                .execute(&mut *tx)
                .await?
            }
            _ => {
                // Group slots stay open until capacity is reached
                sqlx::query(
                    r#"
                    UPDATE availability_slots
                    SET booked_students = booked_students + 1,
                        status = CASE WHEN booked_students + 1 >= capacity THEN 'booked' ELSE status END,
                        updated_at = ?
                    WHERE id = ? AND status = 'available' AND booked_students < capacity
                    "#,
                )
                .bind(&now)
                .bind(slot_id)
                .execute(&mut *tx)
                .await?
            }
        };
        if updated.rows_affected() == 0 {
            return Err(SettlementError::SlotUnavailable);
        }
    }

    let request: SessionRequest = sqlx::query_as("SELECT * FROM session_requests WHERE id = ?")
        .bind(&request_id)
        .fetch_one(&mut *tx)
        .await?;
    let payment: PaymentRecord = sqlx::query_as("SELECT * FROM payment_records WHERE id = ?")
        .bind(&payment_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(
        request = %request.id,
        student = %request.student_id,
        teacher = %request.teacher_id,
        amount = request.payment_amount,
        "Booking settled"
    );
    metrics::counter!(crate::api::metrics::BOOKINGS_SETTLED_TOTAL).increment(1);

    Ok(SettlementOutcome { request, payment })
}

/// Pricing inputs for the quote endpoint; resolves the same rate the
/// settlement path uses.
pub async fn quote_rate(
    db: &DbPool,
    draft: &BookingDraft,
) -> Result<i64, SettlementError> {
    let offer = draft
        .offer
        .as_ref()
        .ok_or(SettlementError::DraftNotReady(draft.state))?;
    match offer {
        OfferRef::Slot(_) => {
            let teacher_id = draft
                .teacher_id
                .as_deref()
                .ok_or(SettlementError::DraftNotReady(draft.state))?;
            let rate: Option<(Option<i64>,)> =
                sqlx::query_as("SELECT hourly_rate FROM users WHERE id = ?")
                    .bind(teacher_id)
                    .fetch_optional(db)
                    .await?;
            rate.and_then(|(r,)| r).ok_or(SettlementError::RateMissing)
        }
        OfferRef::Course(course_id) => {
            let price: Option<(i64,)> =
                sqlx::query_as("SELECT price FROM courses WHERE id = ? AND published = 1")
                    .bind(course_id)
                    .fetch_optional(db)
                    .await?;
            price.map(|(p,)| p).ok_or(SettlementError::CourseNotFound)
        }
    }
}
