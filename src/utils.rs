use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;

use crate::constants::*;

/// JSON error body returned by every failing handler.
#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}

/// Error half of every handler result: an HTTP status plus a JSON body.
pub type ApiError = (StatusCode, Json<ErrorBody>);

fn error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (status, Json(ErrorBody { error: msg.into() }))
}

pub fn bad_request(msg: impl Into<String>) -> ApiError {
    error(StatusCode::BAD_REQUEST, msg)
}

pub fn unauthorized(msg: impl Into<String>) -> ApiError {
    error(StatusCode::UNAUTHORIZED, msg)
}

pub fn forbidden(msg: impl Into<String>) -> ApiError {
    error(StatusCode::FORBIDDEN, msg)
}

pub fn not_found(msg: impl Into<String>) -> ApiError {
    error(StatusCode::NOT_FOUND, msg)
}

pub fn conflict(msg: impl Into<String>) -> ApiError {
    error(StatusCode::CONFLICT, msg)
}

pub fn db_error() -> ApiError {
    error(StatusCode::INTERNAL_SERVER_ERROR, ERR_DATABASE_OPERATION)
}

pub fn internal_error(msg: impl Into<String>) -> ApiError {
    error(StatusCode::INTERNAL_SERVER_ERROR, msg)
}

/// Shape check for email addresses: local@domain.tld with a 2+ letter TLD.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || email.contains(' ') {
        return false;
    }
    if !local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "._%+-".contains(c))
    {
        return false;
    }
    let Some((name, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return false;
    }
    tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic())
}

pub fn validate_string_length(
    value: &str,
    field_name: &str,
    max_length: usize,
) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(bad_request(format!("{} cannot be empty", field_name)));
    }
    if value.len() > max_length {
        return Err(bad_request(format!(
            "{} must be less than {} characters",
            field_name, max_length
        )));
    }
    Ok(())
}
