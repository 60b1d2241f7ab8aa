//! Session request models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Paid but not yet reconciled; hidden from the teacher
    PaymentCompleted,
    /// Reconciled and visible to the teacher
    Pending,
    Accepted,
    Declined,
    Cancelled,
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PaymentCompleted => write!(f, "payment_completed"),
            Self::Pending => write!(f, "pending"),
            Self::Accepted => write!(f, "accepted"),
            Self::Declined => write!(f, "declined"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl From<String> for RequestStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => Self::Pending,
            "accepted" => Self::Accepted,
            "declined" => Self::Declined,
            "cancelled" => Self::Cancelled,
            _ => Self::PaymentCompleted,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionRequest {
    pub id: String,
    pub student_id: String,
    pub teacher_id: String,
    pub title: String,
    pub scheduled_date: String,
    pub duration_minutes: i64,
    pub status: String,
    pub payment_status: String,
    pub payment_amount: i64,
    pub availability_id: Option<String>,
    pub course_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl SessionRequest {
    pub fn status_enum(&self) -> RequestStatus {
        RequestStatus::from(self.status.clone())
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequestForm {
    pub title: String,
    pub scheduled_date: String,
    pub duration_minutes: i64,
}
