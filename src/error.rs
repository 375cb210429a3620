use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Boundary error for every handler. The `Display` text is what the client
/// sees in the `error` field; internal sources are only logged.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PaymentRejected(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Failed to create order")]
    Gateway(#[source] anyhow::Error),

    #[error("{public}")]
    Internal {
        public: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl AppError {
    pub fn internal(source: impl Into<anyhow::Error>) -> Self {
        Self::Internal {
            public: "Internal server error",
            source: source.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Conflict(_) | AppError::PaymentRejected(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Gateway(_) | AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            AppError::Gateway(source) | AppError::Internal { source, .. } => {
                error!(error = %format!("{source:#}"), %status, "request failed");
            }
            _ => {}
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
