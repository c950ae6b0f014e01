//! Request/response and error types shared by the broker handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chatlink_core::ChatlinkError;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Error payload rendered as `{"error":{"type","code","message"}}`.
#[derive(Debug)]
pub(super) struct GatewayApiError {
    pub(super) status: StatusCode,
    pub(super) code: &'static str,
    pub(super) message: String,
}

impl GatewayApiError {
    pub(super) fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub(super) fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    /// Every upstream failure is a 500 so browser widgets see one failure
    /// shape regardless of which hop broke.
    pub(super) fn upstream(code: &'static str, error: ChatlinkError) -> Self {
        tracing::warn!(code, upstream_status = ?error.status_code(), error = %error, "upstream call failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, code, error.to_string())
    }
}

impl IntoResponse for GatewayApiError {
    fn into_response(self) -> Response {
        let error_type = if self.status.is_client_error() {
            "invalid_request_error"
        } else {
            "server_error"
        };
        (
            self.status,
            Json(json!({
                "error": {
                    "type": error_type,
                    "code": self.code,
                    "message": self.message,
                }
            })),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize)]
pub(super) struct TokenResponse {
    pub(super) token: String,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ActivitiesQuery {
    #[serde(default)]
    pub(super) watermark: Option<String>,
}
