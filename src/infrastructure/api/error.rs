//! HTTP mapping for service errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::error;

use crate::error::Error;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Error::Validation(message) => (StatusCode::BAD_REQUEST, message.clone()),
            Error::NotFound(message) => (StatusCode::NOT_FOUND, message.clone()),
            Error::Conflict(message) => (StatusCode::BAD_REQUEST, message.clone()),
            Error::Store(err) => {
                error!(%err, "store failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string())
            }
            Error::Queue(err) => {
                error!(%err, "queue failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
