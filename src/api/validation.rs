//! Input validation for API requests.
//!
//! Validators return `Result<(), String>` so endpoints can collect several
//! of them into one `ValidationErrorBuilder` response.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Calendar dates in YYYY-MM-DD form
    static ref DATE_REGEX: Regex = Regex::new(r"^\d{4}-(0[1-9]|1[0-2])-(0[1-9]|[12]\d|3[01])$").unwrap();

    /// Wall-clock times in 24h HH:MM form
    static ref TIME_REGEX: Regex = Regex::new(r"^([01]\d|2[0-3]):[0-5]\d$").unwrap();

    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();

    /// UUIDs as produced by `Uuid::new_v4().to_string()`
    static ref UUID_REGEX: Regex = Regex::new(
        r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$"
    )
    .unwrap();
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email format".to_string());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }
    if password.len() > 128 {
        return Err("Password is too long (max 128 characters)".to_string());
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Name is required".to_string());
    }
    if trimmed.len() > 100 {
        return Err("Name is too long (max 100 characters)".to_string());
    }
    Ok(())
}

pub fn validate_uuid(id: &str, field: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err(format!("{field} is required"));
    }
    if !UUID_REGEX.is_match(id) {
        return Err(format!("{field} must be a valid UUID"));
    }
    Ok(())
}

pub fn validate_date(date: &str) -> Result<(), String> {
    if date.is_empty() {
        return Err("Date is required".to_string());
    }
    if !DATE_REGEX.is_match(date) {
        return Err("Date must be in YYYY-MM-DD format".to_string());
    }
    Ok(())
}

pub fn validate_time(time: &str) -> Result<(), String> {
    if !TIME_REGEX.is_match(time) {
        return Err("Time must be in HH:MM format".to_string());
    }
    Ok(())
}

pub fn validate_title(title: &str) -> Result<(), String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err("Title is required".to_string());
    }
    if trimmed.len() > 200 {
        return Err("Title is too long (max 200 characters)".to_string());
    }
    Ok(())
}

pub fn validate_duration_minutes(minutes: i64) -> Result<(), String> {
    if minutes < 15 {
        return Err("Duration must be at least 15 minutes".to_string());
    }
    if minutes > 480 {
        return Err("Duration must be at most 480 minutes".to_string());
    }
    Ok(())
}

/// Prices and rates are whole currency units, never negative.
pub fn validate_amount(amount: i64, field: &str) -> Result<(), String> {
    if amount <= 0 {
        return Err(format!("{field} must be positive"));
    }
    if amount > 1_000_000 {
        return Err(format!("{field} is unreasonably large"));
    }
    Ok(())
}

pub fn validate_capacity(capacity: i64) -> Result<(), String> {
    if capacity < 1 {
        return Err("Capacity must be at least 1".to_string());
    }
    if capacity > 500 {
        return Err("Capacity must be at most 500".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates() {
        assert!(validate_date("2026-09-01").is_ok());
        assert!(validate_date("2026-12-31").is_ok());
        assert!(validate_date("2026-13-01").is_err());
        assert!(validate_date("2026-00-10").is_err());
        assert!(validate_date("2026-09-32").is_err());
        assert!(validate_date("09/01/2026").is_err());
        assert!(validate_date("").is_err());
    }

    #[test]
    fn times() {
        assert!(validate_time("00:00").is_ok());
        assert!(validate_time("23:59").is_ok());
        assert!(validate_time("24:00").is_err());
        assert!(validate_time("9:30").is_err());
        assert!(validate_time("09:60").is_err());
    }

    #[test]
    fn emails() {
        assert!(validate_email("student@example.com").is_ok());
        assert!(validate_email("a.b+c@sub.example.co").is_ok());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("").is_err());
    }

    #[test]
    fn uuids() {
        let id = uuid::Uuid::new_v4().to_string();
        assert!(validate_uuid(&id, "teacher_id").is_ok());
        assert!(validate_uuid("abc", "teacher_id").is_err());
        assert!(validate_uuid("", "teacher_id").is_err());
    }

    #[test]
    fn durations_and_amounts() {
        assert!(validate_duration_minutes(60).is_ok());
        assert!(validate_duration_minutes(10).is_err());
        assert!(validate_duration_minutes(600).is_err());
        assert!(validate_amount(500, "hourly_rate").is_ok());
        assert!(validate_amount(0, "hourly_rate").is_err());
        assert!(validate_amount(-5, "price").is_err());
    }

    #[test]
    fn capacities() {
        assert!(validate_capacity(1).is_ok());
        assert!(validate_capacity(30).is_ok());
        assert!(validate_capacity(0).is_err());
        assert!(validate_capacity(1000).is_err());
    }
}
