//! Mapping of domain errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pactbroker_core::BrokerError;

use super::json_error;

/// A handler failure. Validation errors become 400 with an `errors` array,
/// missing entities 404, conflicts 409, anything else 500.
#[derive(Debug)]
pub(crate) struct ApiError(BrokerError);

impl From<BrokerError> for ApiError {
    fn from(e: BrokerError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        ApiError(BrokerError::Validation(vec![message.into()]))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self.0 {
            BrokerError::NotFound { .. } => {
                json_error(StatusCode::NOT_FOUND, &self.0.to_string()).into_response()
            }
            BrokerError::Validation(messages) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "errors": messages })),
            )
                .into_response(),
            BrokerError::Conflict(message) => {
                json_error(StatusCode::CONFLICT, message).into_response()
            }
            BrokerError::Storage(_) | BrokerError::Internal(_) => {
                tracing::error!(error = %self.0, "request failed");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
                    .into_response()
            }
        }
    }
}
