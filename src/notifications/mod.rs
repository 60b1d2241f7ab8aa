//! Outbound email notifications.

mod email;

pub use email::AckMailer;
