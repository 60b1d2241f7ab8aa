use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Course {
    pub id: String,
    pub teacher_id: String,
    pub title: String,
    /// Whole-rupee price for the full course
    pub price: i64,
    pub lesson_count: i64,
    pub published: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Course {
    pub fn is_published(&self) -> bool {
        self.published != 0
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateCourseRequest {
    pub title: String,
    pub price: i64,
    #[serde(default)]
    pub lesson_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCourseRequest {
    pub title: Option<String>,
    pub price: Option<i64>,
    pub lesson_count: Option<i64>,
    pub published: Option<bool>,
}
