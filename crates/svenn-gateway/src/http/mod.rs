//! HTTP handlers. Every failure is answered with `{"error": "<message>"}`.

pub mod catalog;
pub mod health;
pub mod jobs;

use axum::{extract::rejection::JsonRejection, http::StatusCode, Json};
use serde_json::{json, Value};
use svenn_core::{ErrorKind, SvennError};
use tracing::{debug, error};

pub type ApiError = (StatusCode, Json<Value>);
pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// Map any crate error onto a status code: validation → 400,
/// not found → 404, everything else → 500.
pub fn api_error(err: impl Into<SvennError>) -> ApiError {
    let err = err.into();
    let status = match err.kind() {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(code = err.code(), "request failed: {err}");
    } else {
        debug!(code = err.code(), "request rejected: {err}");
    }
    (status, Json(json!({ "error": err.to_string() })))
}

/// Unwrap a JSON body, answering a malformed one with a 400 in the usual
/// error shape instead of axum's plain-text rejection.
pub fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| api_error(SvennError::Validation(rejection.body_text())))
}
