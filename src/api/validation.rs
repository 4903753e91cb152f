//! Input validation for API requests.
//!
//! Each validator returns `Err(message)` describing the first problem found.
//! Handlers collect these into a `ValidationErrorBuilder` from the `error` module.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Pragmatic email check: something@domain.tld without whitespace
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[^\s@]+@[^\s@]+\.[^\s@]+$"
    ).unwrap();

    /// Canonical hyphenated UUID, as produced for every stored id
    static ref ID_REGEX: Regex = Regex::new(
        r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$"
    ).unwrap();

    static ref OTP_REGEX: Regex = Regex::new(r"^\d{6}$").unwrap();
}

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_QUANTITY: i64 = 1000;

/// Whether a string looks like one of our record ids
pub fn is_valid_id(id: &str) -> bool {
    ID_REGEX.is_match(id)
}

pub fn validate_id(id: &str, label: &str) -> Result<(), String> {
    if id.trim().is_empty() {
        return Err(format!("{} is required", label));
    }
    if !is_valid_id(id.trim()) {
        return Err(format!("Invalid {}", label));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.trim().is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }
    if !EMAIL_REGEX.is_match(email.trim()) {
        return Err("Invalid email format".to_string());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        ));
    }
    if password.len() > 128 {
        return Err("Password is too long (max 128 characters)".to_string());
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Name is required".to_string());
    }
    if name.chars().count() > 100 {
        return Err("Name is too long (max 100 characters)".to_string());
    }
    Ok(())
}

pub fn validate_otp(otp: &str) -> Result<(), String> {
    if !OTP_REGEX.is_match(otp.trim()) {
        return Err("OTP must be 6 digits".to_string());
    }
    Ok(())
}

pub fn validate_quantity(quantity: i64) -> Result<(), String> {
    if quantity < 1 {
        return Err("Quantity must be at least 1".to_string());
    }
    if quantity > MAX_QUANTITY {
        return Err(format!("Quantity cannot exceed {}", MAX_QUANTITY));
    }
    Ok(())
}

/// Rental window dates are `YYYY-MM-DD`; the end may not precede the start.
pub fn validate_rental_window(start: Option<&str>, end: Option<&str>) -> Result<(), String> {
    let parse = |label: &str, value: &str| {
        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
            .map_err(|_| format!("{} must be a date in YYYY-MM-DD format", label))
    };

    let start = start.map(|s| parse("Start date", s)).transpose()?;
    let end = end.map(|e| parse("End date", e)).transpose()?;

    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err("End date cannot be before start date".to_string());
        }
    }
    Ok(())
}

pub fn validate_price(label: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() || value < 0.0 {
        return Err(format!("{} must be a non-negative number", label));
    }
    Ok(())
}

pub fn validate_rating(rating: f64) -> Result<(), String> {
    if !rating.is_finite() || !(0.0..=5.0).contains(&rating) {
        return Err("Rating must be between 0 and 5".to_string());
    }
    Ok(())
}

pub fn validate_required_text(label: &str, value: &str, max_len: usize) -> Result<(), String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(format!("{} is required", label));
    }
    if value.chars().count() > max_len {
        return Err(format!("{} is too long (max {} characters)", label, max_len));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        assert!(is_valid_id("0f8b6c3e-1d2a-4b5c-9d8e-7f6a5b4c3d2e"));
        assert!(validate_id("0f8b6c3e-1d2a-4b5c-9d8e-7f6a5b4c3d2e", "product ID").is_ok());
    }

    #[test]
    fn test_invalid_ids() {
        assert!(!is_valid_id("64b7f0c2e1a4"));
        assert!(!is_valid_id("not-a-uuid"));
        assert_eq!(validate_id("", "product ID").unwrap_err(), "product ID is required");
        assert_eq!(validate_id("abc", "product ID").unwrap_err(), "Invalid product ID");
    }

    #[test]
    fn test_email_validation() {
        assert!(validate_email("asha@example.com").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign.com").is_err());
        assert!(validate_email("spaces in@example.com").is_err());
    }

    #[test]
    fn test_password_and_name() {
        assert!(validate_password("12345678").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_name("  Asha ").is_ok());
        assert!(validate_name("   ").is_err());
    }

    #[test]
    fn test_otp_format() {
        assert!(validate_otp("012345").is_ok());
        assert!(validate_otp("12345").is_err());
        assert!(validate_otp("12a456").is_err());
    }

    #[test]
    fn test_quantity_bounds() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-3).is_err());
        assert!(validate_quantity(MAX_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_rental_window() {
        assert!(validate_rental_window(None, None).is_ok());
        assert!(validate_rental_window(Some("2026-03-01"), Some("2026-03-01")).is_ok());
        assert!(validate_rental_window(Some("2026-03-02"), Some("2026-03-01")).is_err());
        assert!(validate_rental_window(Some("03/01/2026"), None).is_err());
    }

    #[test]
    fn test_prices_and_rating() {
        assert!(validate_price("Price", 0.0).is_ok());
        assert!(validate_price("Price", -1.0).is_err());
        assert!(validate_price("Price", f64::NAN).is_err());
        assert!(validate_rating(5.0).is_ok());
        assert!(validate_rating(5.5).is_err());
    }
}
