//! Field validators shared by query strings, multipart forms and JSON bodies
//!
//! Each parser returns the normalized value or a user-facing message; callers
//! collect the messages into `FieldError`s.

use regex::Regex;
use std::sync::LazyLock;
use uuid::Uuid;

use crate::error::{AppError, FieldError};

static SESSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{4}/[0-9]{4}$").expect("session pattern"));
static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+(\.[0-9]{1,2})?$").expect("price pattern"));
static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("username pattern"));
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern"));
static SCRIPT_SCHEME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)javascript:").expect("script scheme pattern"));
static EVENT_HANDLER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)on\w+=").expect("event handler pattern"));

/// Accumulates field errors so one response can report all of them.
#[derive(Debug, Default)]
pub struct Errors(Vec<FieldError>);

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldError::new(field, message));
    }

    /// Record the error side of `result` under `field` and return the value side.
    pub fn check<T>(&mut self, field: &str, result: Result<T, String>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(message) => {
                self.push(field, message);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_result(self) -> Result<(), AppError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.0))
        }
    }
}

/// Trim and drop empty strings.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub fn parse_session(value: &str) -> Result<String, String> {
    let value = value.trim();
    if SESSION_RE.is_match(value) {
        Ok(value.to_string())
    } else {
        Err("Session must be in format: 2025/2026".to_string())
    }
}

pub fn parse_uuid(value: &str, label: &str) -> Result<Uuid, String> {
    Uuid::parse_str(value.trim()).map_err(|_| format!("Invalid {} (UUID expected)", label))
}

/// Form flags are true only for the literal "true".
pub fn parse_flag(value: &str) -> bool {
    value.trim() == "true"
}

/// Positive decimal with at most two fractional digits.
pub fn parse_price(value: &str) -> Result<f64, String> {
    let value = value.trim();
    if !PRICE_RE.is_match(value) {
        return Err("Price must be a valid number".to_string());
    }
    let price: f64 = value
        .parse()
        .map_err(|_| "Price must be a valid number".to_string())?;
    if price > 0.0 {
        Ok(price)
    } else {
        Err("Price must be greater than 0".to_string())
    }
}

pub fn parse_quantity(value: &str) -> Result<i32, String> {
    let value = value.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err("Quantity must be a valid integer".to_string());
    }
    value
        .parse()
        .map_err(|_| "Quantity is too large".to_string())
}

pub fn parse_bounded_int(value: &str, min: u64, max: u64, label: &str) -> Result<u64, String> {
    let value = value.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("{} must be a whole number", label));
    }
    let parsed: u64 = value
        .parse()
        .map_err(|_| format!("{} must not exceed {}", label, max))?;
    if parsed < min {
        Err(format!("{} must be at least {}", label, min))
    } else if parsed > max {
        Err(format!("{} must not exceed {}", label, max))
    } else {
        Ok(parsed)
    }
}

/// Strip markup from free text: tags, stray angle brackets, `javascript:`
/// schemes and inline `on*=` handlers.
pub fn sanitize_text(value: &str) -> String {
    let stripped = TAG_RE.replace_all(value, "");
    let stripped = stripped.replace(['<', '>'], "");
    let stripped = SCRIPT_SCHEME_RE.replace_all(&stripped, "");
    EVENT_HANDLER_RE.replace_all(&stripped, "").trim().to_string()
}

/// `bounded_text` over the sanitized value.
pub fn clean_text(value: &str, min: usize, max: usize, label: &str) -> Result<String, String> {
    bounded_text(&sanitize_text(value), min, max, label)
}

/// Trimmed text with a character-count window.
pub fn bounded_text(value: &str, min: usize, max: usize, label: &str) -> Result<String, String> {
    let value = value.trim();
    let len = value.chars().count();
    if len < min {
        if min == 1 {
            Err(format!("{} is required", label))
        } else {
            Err(format!("{} must be at least {} characters", label, min))
        }
    } else if len > max {
        Err(format!("{} must not exceed {} characters", label, max))
    } else {
        Ok(value.to_string())
    }
}

pub fn parse_username(value: &str) -> Result<String, String> {
    let value = bounded_text(value, 3, 30, "Username")?;
    if USERNAME_RE.is_match(&value) {
        Ok(value)
    } else {
        Err("Username can only contain letters, numbers, and underscores".to_string())
    }
}

pub fn parse_email(value: &str) -> Result<String, String> {
    let value = value.trim().to_lowercase();
    if EMAIL_RE.is_match(&value) {
        Ok(value)
    } else {
        Err("Invalid email address".to_string())
    }
}

/// At least 8 characters mixing upper, lower, digit and a special character.
pub fn check_password_policy(value: &str) -> Result<(), String> {
    if value.chars().count() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }
    if !value.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("Password must contain at least one uppercase letter".to_string());
    }
    if !value.chars().any(|c| c.is_ascii_lowercase()) {
        return Err("Password must contain at least one lowercase letter".to_string());
    }
    if !value.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one number".to_string());
    }
    if value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err("Password must contain at least one special character".to_string());
    }
    Ok(())
}
