//! HTTP rendering of relay errors
//!
//! Every error is `{"error": {"type": ..., "message": ...}}` with the
//! variant's status, except upstream HTTP failures, which keep the upstream
//! status and body verbatim.

use crate::error::RelayError;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub fn error_response(status: StatusCode, error_type: &str, message: &str) -> Response {
    let body = json!({
        "error": {
            "type": error_type,
            "message": message
        }
    });
    (status, Json(body)).into_response()
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);

        match self {
            RelayError::UpstreamUnavailable {
                status: Some(_),
                body,
            } => (status, [(header::CONTENT_TYPE, "application/json")], body).into_response(),
            other => error_response(status, other.error_type(), &other.user_message()),
        }
    }
}
