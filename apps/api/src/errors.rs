use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level error type.
/// Every variant maps to one caller-facing code, so handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid PDF URL: {0}")]
    InvalidPdfUrl(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Provider rate limit exceeded: {0}")]
    ProviderRateLimitExceeded(String),

    #[error("Assistant error: {0}")]
    Assistant(String),

    #[error("Run failed: {0}")]
    RunFailed(String),

    #[error("Run did not finish within {0:?}")]
    RunTimeout(Duration),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Caller-facing taxonomy key.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::RateLimitExceeded => "rate_limit_exceeded",
            AppError::InvalidPdfUrl(_) => "invalid_pdf_url",
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::UnsupportedFileType(_) => "unsupported_file_type",
            AppError::ProviderRateLimitExceeded(_) => "openai_rate_limit_exceeded",
            AppError::Assistant(_) => "assistant_error",
            AppError::RunFailed(_) => "upstream_run_failed",
            AppError::RunTimeout(_) => "run_timeout",
            AppError::Download(_) => "download_failed",
            AppError::Provider(_) => "provider_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::RateLimitExceeded | AppError::ProviderRateLimitExceeded(_) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AppError::InvalidPdfUrl(_)
            | AppError::InvalidRequest(_)
            | AppError::UnsupportedFileType(_) => StatusCode::BAD_REQUEST,
            AppError::Assistant(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::RunFailed(_) | AppError::Download(_) | AppError::Provider(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::RunTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Human-readable message shown by the form. Upstream details stay in the logs.
    fn user_message(&self) -> String {
        match self {
            AppError::RateLimitExceeded => {
                "Too many requests. Please wait a minute and try again.".to_string()
            }
            AppError::InvalidPdfUrl(_) => {
                "The PDF link is not a valid URL. Please check it and try again.".to_string()
            }
            AppError::InvalidRequest(msg) => msg.clone(),
            AppError::UnsupportedFileType(_) => {
                "The linked file could not be read as a document. Please link to a PDF."
                    .to_string()
            }
            AppError::ProviderRateLimitExceeded(_) => {
                "The AI service is busy right now. Please try again later.".to_string()
            }
            AppError::Assistant(_) => {
                "The assistant could not extract eligibility criteria. Please try again."
                    .to_string()
            }
            AppError::RunFailed(_) => {
                "The assistant run failed upstream. Please try again.".to_string()
            }
            AppError::RunTimeout(_) => {
                "The assistant took too long to respond. Please try again.".to_string()
            }
            AppError::Download(_) => {
                "The PDF could not be downloaded from the given link.".to_string()
            }
            AppError::Provider(_) => "The AI service returned an error.".to_string(),
            AppError::Internal(_) => "An internal server error occurred".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = ?self, "Request failed");
        } else {
            tracing::warn!(code = self.code(), error = %self, "Request rejected");
        }

        let body = Json(json!({
            "code": self.code(),
            "errorMsg": self.user_message(),
        }));

        (status, body).into_response()
    }
}
