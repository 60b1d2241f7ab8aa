//! Teacher availability slot models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Available,
    Booked,
    Cancelled,
}

impl std::fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::Booked => write!(f, "booked"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl From<String> for SlotStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "booked" => Self::Booked,
            "cancelled" => Self::Cancelled,
            _ => Self::Available,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Individual,
    Group,
}

impl std::fmt::Display for SessionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Individual => write!(f, "individual"),
            Self::Group => write!(f, "group"),
        }
    }
}

impl From<String> for SessionType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "group" => Self::Group,
            _ => Self::Individual,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AvailabilitySlot {
    pub id: String,
    pub teacher_id: String,
    pub subject: String,
    pub slot_date: String,
    pub start_time: String,
    pub end_time: String,
    pub status: String,
    pub session_type: String,
    pub capacity: i64,
    pub booked_students: i64,
    /// When set, the expiry sweeper cancels the slot once this passes
    pub auto_cancel_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl AvailabilitySlot {
    pub fn status_enum(&self) -> SlotStatus {
        SlotStatus::from(self.status.clone())
    }

    pub fn session_type_enum(&self) -> SessionType {
        SessionType::from(self.session_type.clone())
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSlotRequest {
    pub subject: String,
    pub slot_date: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub session_type: Option<SessionType>,
    #[serde(default)]
    pub capacity: Option<i64>,
    #[serde(default)]
    pub auto_cancel_at: Option<String>,
}
