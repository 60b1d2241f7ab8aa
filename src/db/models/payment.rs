//! Payment record models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Reverted,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Reverted => write!(f, "reverted"),
        }
    }
}

impl From<String> for PaymentStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "reverted" => Self::Reverted,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentRecord {
    pub id: String,
    pub session_request_id: Option<String>,
    /// Amount charged to the student (teacher_amount + platform_fee)
    pub amount: i64,
    pub platform_fee: i64,
    pub teacher_amount: i64,
    pub status: String,
    /// Gateway order id; unique per settlement
    pub order_id: String,
    pub created_at: String,
    pub settled_at: Option<String>,
}

impl PaymentRecord {
    pub fn status_enum(&self) -> PaymentStatus {
        PaymentStatus::from(self.status.clone())
    }
}
