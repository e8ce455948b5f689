//! Request handlers module

pub mod admin;
pub mod auth;
pub mod book;
pub mod faculty;
pub mod settings;

use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::validation;

/// Parse a path id, reporting malformed values as a validation error.
pub fn parse_id(raw: &str, label: &str) -> AppResult<Uuid> {
    validation::parse_uuid(raw, label).map_err(|msg| AppError::validation("id", msg))
}
