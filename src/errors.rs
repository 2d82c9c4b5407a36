use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Failures surfaced by an appointment or history backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no active appointment matches {0:?}")]
    NotFound(String),

    #[error("store backend error: {0:#}")]
    Backend(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("completion service error: {0:#}")]
    Completion(anyhow::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": msg }),
            ),
            AppError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                serde_json::json!({ "error": self.to_string() }),
            ),
            AppError::Store(_) | AppError::Completion(_) | AppError::Config(_) => {
                tracing::error!(error = %self, "request failed");
                let details = match &self {
                    AppError::Store(_) => "store unavailable",
                    AppError::Completion(_) => "completion service unavailable",
                    _ => "misconfigured service",
                };
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": "internal server error", "details": details }),
                )
            }
        };

        (status, axum::Json(body)).into_response()
    }
}
