use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Error taxonomy for the orchestrator. Each variant carries the HTTP status
/// it maps to at the API boundary; background jobs log these and move on
/// rather than propagating them anywhere.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("missing required parameter: id")]
    BadRequest,

    #[error("no container found for id {0}")]
    NotFound(String),

    #[error("{message}")]
    CapacityExhausted { message: String, max_slots: usize },

    #[error("container creation failed: {0}")]
    CreationFailed(String),

    #[error("runtime error: {0}")]
    RuntimeTransient(String),

    #[error("state file corrupt: {0}")]
    StateCorrupt(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

impl IntoResponse for OrchestratorError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            OrchestratorError::BadRequest => {
                (StatusCode::BAD_REQUEST, json!({ "error": self.to_string() }))
            }
            OrchestratorError::NotFound(id) => (
                StatusCode::NOT_FOUND,
                json!({ "error": format!("No container found for id {}", id) }),
            ),
            OrchestratorError::CapacityExhausted { message, max_slots } => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": message, "max_slots": max_slots }),
            ),
            OrchestratorError::CreationFailed(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg }))
            }
            OrchestratorError::RuntimeTransient(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg }))
            }
            OrchestratorError::StateCorrupt(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg }))
            }
            OrchestratorError::Io(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": e.to_string() }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_maps_to_400() {
        let resp = OrchestratorError::BadRequest.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn not_found_maps_to_404() {
        let resp = OrchestratorError::NotFound("abc".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn capacity_exhausted_maps_to_503() {
        let resp = OrchestratorError::CapacityExhausted {
            message: "no ports".to_string(),
            max_slots: 4,
        }
        .into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn creation_failed_maps_to_500() {
        let resp = OrchestratorError::CreationFailed("boom".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
