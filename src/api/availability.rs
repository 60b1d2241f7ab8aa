//! Teacher availability slots and the public offers read path.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::api::error::{ApiError, ValidationErrorBuilder};
use crate::api::validation;
use crate::db::{AvailabilitySlot, Course, CreateSlotRequest, SessionType, User, UserResponse};
use crate::util::now_rfc3339;
use crate::AppState;

/// Everything bookable from one teacher, shaped for the availability picker.
#[derive(Debug, Serialize)]
pub struct TeacherOffers {
    pub teacher: UserResponse,
    pub slots: Vec<AvailabilitySlot>,
    pub courses: Vec<Course>,
}

/// GET /api/teachers
pub async fn list_teachers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let teachers: Vec<User> =
        sqlx::query_as("SELECT * FROM users WHERE role = 'teacher' ORDER BY name")
            .fetch_all(&state.db)
            .await?;

    Ok(Json(teachers.into_iter().map(UserResponse::from).collect()))
}

/// GET /api/teachers/:id/offers
///
/// Open slots and published courses in two queries; cancelled and fully
/// booked slots never reach the client.
pub async fn teacher_offers(
    State(state): State<Arc<AppState>>,
    Path(teacher_id): Path<String>,
) -> Result<Json<TeacherOffers>, ApiError> {
    let teacher: Option<User> =
        sqlx::query_as("SELECT * FROM users WHERE id = ? AND role = 'teacher'")
            .bind(&teacher_id)
            .fetch_optional(&state.db)
            .await?;
    let teacher = teacher.ok_or_else(|| ApiError::not_found("Teacher not found"))?;

    let slots: Vec<AvailabilitySlot> = sqlx::query_as(
        r#"
        SELECT * FROM availability_slots
        WHERE teacher_id = ? AND status = 'available'
          AND booked_students < capacity AND slot_date >= date('now')
        ORDER BY slot_date, start_time
        "#,
    )
    .bind(&teacher_id)
    .fetch_all(&state.db)
    .await?;

    let courses: Vec<Course> = sqlx::query_as(
        "SELECT * FROM courses WHERE teacher_id = ? AND published = 1 ORDER BY created_at DESC",
    )
    .bind(&teacher_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(TeacherOffers {
        teacher: UserResponse::from(teacher),
        slots,
        courses,
    }))
}

/// POST /api/availability
pub async fn create_slot(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(request): Json<CreateSlotRequest>,
) -> Result<(StatusCode, Json<AvailabilitySlot>), ApiError> {
    if !user.is_teacher() {
        return Err(ApiError::forbidden("Only teachers can publish availability"));
    }

    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validation::validate_title(&request.subject) {
        errors.add("subject", e);
    }
    if let Err(e) = validation::validate_date(&request.slot_date) {
        errors.add("slot_date", e);
    }
    if let Err(e) = validation::validate_time(&request.start_time) {
        errors.add("start_time", e);
    }
    if let Err(e) = validation::validate_time(&request.end_time) {
        errors.add("end_time", e);
    }
    if let Some(capacity) = request.capacity {
        if let Err(e) = validation::validate_capacity(capacity) {
            errors.add("capacity", e);
        }
    }
    errors.finish()?;

    if request.end_time <= request.start_time {
        return Err(ApiError::validation_field(
            "end_time",
            "End time must be after start time",
        ));
    }

    let session_type = request.session_type.unwrap_or(SessionType::Individual);
    let capacity = match session_type {
        SessionType::Individual => 1,
        SessionType::Group => request.capacity.unwrap_or(1),
    };

    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO availability_slots
            (id, teacher_id, subject, slot_date, start_time, end_time, session_type, capacity, auto_cancel_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&user.id)
    .bind(request.subject.trim())
    .bind(&request.slot_date)
    .bind(&request.start_time)
    .bind(&request.end_time)
    .bind(session_type.to_string())
    .bind(capacity)
    .bind(&request.auto_cancel_at)
    .execute(&state.db)
    .await?;

    let slot: AvailabilitySlot = sqlx::query_as("SELECT * FROM availability_slots WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    info!(slot = %id, teacher = %user.id, "Availability slot published");

    Ok((StatusCode::CREATED, Json(slot)))
}

/// GET /api/availability/mine
pub async fn my_slots(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<AvailabilitySlot>>, ApiError> {
    let slots: Vec<AvailabilitySlot> = sqlx::query_as(
        "SELECT * FROM availability_slots WHERE teacher_id = ? ORDER BY slot_date, start_time",
    )
    .bind(&user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(slots))
}

/// DELETE /api/availability/:id
///
/// Cancels an open slot. Booked slots cannot be removed from here; the
/// session request workflow owns their lifecycle.
pub async fn cancel_slot(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(slot_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let result = sqlx::query(
        r#"
        UPDATE availability_slots
        SET status = 'cancelled', updated_at = ?
        WHERE id = ? AND teacher_id = ? AND status = 'available'
        "#,
    )
    .bind(now_rfc3339())
    .bind(&slot_id)
    .bind(&user.id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        let exists: Option<(String,)> =
            sqlx::query_as("SELECT status FROM availability_slots WHERE id = ? AND teacher_id = ?")
                .bind(&slot_id)
                .bind(&user.id)
                .fetch_optional(&state.db)
                .await?;
        return match exists {
            Some((status,)) => Err(ApiError::conflict(format!(
                "Slot is {status} and cannot be cancelled"
            ))),
            None => Err(ApiError::not_found("Slot not found")),
        };
    }

    info!(slot = %slot_id, teacher = %user.id, "Availability slot cancelled");
    Ok(StatusCode::NO_CONTENT)
}
