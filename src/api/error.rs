use crate::utils::validation::ValidationErrors;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use http_body_util::LengthLimitError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("Unprocessable Entity: {0}")]
    Unprocessable(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("{message}")]
    Operational {
        message: String,
        code: Option<&'static str>,
        #[source]
        source: anyhow::Error,
    },
}

impl AppError {
    pub fn operational(
        message: impl Into<String>,
        code: &'static str,
        source: anyhow::Error,
    ) -> Self {
        AppError::Operational {
            message: message.into(),
            code: Some(code),
            source,
        }
    }

    /// Staging failure, reported as 413 when the request body hit the size limit.
    pub fn staging_failed(source: anyhow::Error) -> Self {
        if exceeds_body_limit(&source) {
            return AppError::PayloadTooLarge(format!("{:#}", source));
        }
        AppError::operational("Failed to stage upload", "STAGING_FAILED", source)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Operational { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code of an operational failure, if any.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            AppError::Operational { code, .. } => *code,
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AppError::Validation(errors) => json!({
                "error": "Validation failed",
                "details": errors.errors(),
            }),
            AppError::Unprocessable(msg) | AppError::Unauthorized(msg) | AppError::BadRequest(msg) => {
                json!({ "error": msg })
            }
            AppError::PayloadTooLarge(msg) => {
                tracing::warn!("Upload rejected: {}", msg);
                json!({ "error": "Payload Too Large" })
            }
            AppError::Operational {
                message,
                code,
                source,
            } => {
                tracing::error!("Operational error [{}]: {}: {:?}", code.unwrap_or("-"), message, source);
                json!({
                    "error": "Internal Server Error",
                    "code": code,
                })
            }
        };

        (status, Json(body)).into_response()
    }
}

/// True when any cause in the chain is the body-limit error raised by `RequestBodyLimitLayer`.
///
/// `std::io::Error` reports its wrapped error's source rather than the wrapped
/// error itself, so io errors are unwrapped explicitly.
fn exceeds_body_limit(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause.is::<LengthLimitError>()
            || cause
                .downcast_ref::<std::io::Error>()
                .and_then(|io| io.get_ref())
                .is_some_and(|inner| {
                    inner.is::<LengthLimitError>()
                        || inner.source().is_some_and(|s| s.is::<LengthLimitError>())
                })
    })
}
