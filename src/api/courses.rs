//! Course catalog management.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::info;

use crate::api::error::{ApiError, ValidationErrorBuilder};
use crate::api::validation;
use crate::db::{Course, CreateCourseRequest, UpdateCourseRequest, User};
use crate::util::now_rfc3339;
use crate::AppState;

/// GET /api/courses
pub async fn list_published(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Course>>, ApiError> {
    let courses: Vec<Course> =
        sqlx::query_as("SELECT * FROM courses WHERE published = 1 ORDER BY created_at DESC")
            .fetch_all(&state.db)
            .await?;
    Ok(Json(courses))
}

/// GET /api/courses/mine
pub async fn my_courses(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<Course>>, ApiError> {
    let courses: Vec<Course> =
        sqlx::query_as("SELECT * FROM courses WHERE teacher_id = ? ORDER BY created_at DESC")
            .bind(&user.id)
            .fetch_all(&state.db)
            .await?;
    Ok(Json(courses))
}

/// POST /api/courses
///
/// New courses start unpublished; they become bookable via update.
pub async fn create_course(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(request): Json<CreateCourseRequest>,
) -> Result<(StatusCode, Json<Course>), ApiError> {
    if !user.is_teacher() {
        return Err(ApiError::forbidden("Only teachers can create courses"));
    }

    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validation::validate_title(&request.title) {
        errors.add("title", e);
    }
    if let Err(e) = validation::validate_amount(request.price, "price") {
        errors.add("price", e);
    }
    if let Some(count) = request.lesson_count {
        if count < 1 {
            errors.add("lesson_count", "Lesson count must be at least 1");
        }
    }
    errors.finish()?;

    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO courses (id, teacher_id, title, price, lesson_count) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&user.id)
    .bind(request.title.trim())
    .bind(request.price)
    .bind(request.lesson_count.unwrap_or(1))
    .execute(&state.db)
    .await?;

    let course: Course = sqlx::query_as("SELECT * FROM courses WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    info!(course = %id, teacher = %user.id, "Course created");

    Ok((StatusCode::CREATED, Json(course)))
}

/// PUT /api/courses/:id
pub async fn update_course(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(course_id): Path<String>,
    Json(request): Json<UpdateCourseRequest>,
) -> Result<Json<Course>, ApiError> {
    let course: Option<Course> =
        sqlx::query_as("SELECT * FROM courses WHERE id = ? AND teacher_id = ?")
            .bind(&course_id)
            .bind(&user.id)
            .fetch_optional(&state.db)
            .await?;
    let course = course.ok_or_else(|| ApiError::not_found("Course not found"))?;

    let mut errors = ValidationErrorBuilder::new();
    if let Some(title) = &request.title {
        if let Err(e) = validation::validate_title(title) {
            errors.add("title", e);
        }
    }
    if let Some(price) = request.price {
        if let Err(e) = validation::validate_amount(price, "price") {
            errors.add("price", e);
        }
    }
    if let Some(count) = request.lesson_count {
        if count < 1 {
            errors.add("lesson_count", "Lesson count must be at least 1");
        }
    }
    errors.finish()?;

    let title = request
        .title
        .as_deref()
        .map(str::trim)
        .unwrap_or(&course.title);
    let price = request.price.unwrap_or(course.price);
    let lesson_count = request.lesson_count.unwrap_or(course.lesson_count);
    let published = request
        .published
        .map(i64::from)
        .unwrap_or(course.published);

    sqlx::query(
        "UPDATE courses SET title = ?, price = ?, lesson_count = ?, published = ?, updated_at = ? WHERE id = ?",
    )
    .bind(title)
    .bind(price)
    .bind(lesson_count)
    .bind(published)
    .bind(now_rfc3339())
    .bind(&course_id)
    .execute(&state.db)
    .await?;

    let course: Course = sqlx::query_as("SELECT * FROM courses WHERE id = ?")
        .bind(&course_id)
        .fetch_one(&state.db)
        .await?;

    Ok(Json(course))
}

/// GET /api/courses/:id/enrollments
pub async fn course_enrollments(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(course_id): Path<String>,
) -> Result<Json<Vec<crate::db::Enrollment>>, ApiError> {
    let owned: Option<(String,)> =
        sqlx::query_as("SELECT id FROM courses WHERE id = ? AND teacher_id = ?")
            .bind(&course_id)
            .bind(&user.id)
            .fetch_optional(&state.db)
            .await?;
    if owned.is_none() {
        return Err(ApiError::not_found("Course not found"));
    }

    let enrollments: Vec<crate::db::Enrollment> =
        sqlx::query_as("SELECT * FROM enrollments WHERE course_id = ? ORDER BY created_at DESC")
            .bind(&course_id)
            .fetch_all(&state.db)
            .await?;

    Ok(Json(enrollments))
}
