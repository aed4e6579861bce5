//! Error taxonomy for export operations.

use std::time::Duration;

use thiserror::Error;

use crate::auth::AuthError;
use crate::retry::IsRetryable;

use super::types::{ApiErrorBody, ErrorDetail, ExportStatus};

/// Errors that can occur while exporting a report.
#[derive(Debug, Clone, Error)]
pub enum ExportError {
    /// The identity provider rejected the credential exchange.
    #[error("Failed to authenticate: {0}")]
    Authentication(String),

    /// Failure outside the identity provider and the remote API.
    #[error("Unexpected error: {0}")]
    Unexpected(String),

    /// The API answered with a non-2xx status.
    ///
    /// `code` is set when the body was a structured error; otherwise
    /// `message` is the raw response body.
    #[error("Power BI API error: {message}")]
    RequestFailed {
        status: u16,
        code: Option<String>,
        message: String,
        details: Vec<ErrorDetail>,
    },

    /// A 2xx response did not match the expected schema.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The remote host could not be reached or the connection broke.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Polling went on longer than the configured maximum wait.
    #[error(
        "Export {job_id} did not complete within {}s (waited {}s)",
        .max_wait.as_secs(),
        .elapsed.as_secs()
    )]
    Timeout {
        job_id: String,
        elapsed: Duration,
        max_wait: Duration,
    },

    /// The job reached a terminal status other than `Succeeded`.
    #[error("Export {job_id} failed with status: {status}")]
    JobFailed {
        job_id: String,
        status: ExportStatus,
    },

    /// The caller cancelled the run.
    #[error("Export cancelled{}", cancelled_suffix(.job_id))]
    Cancelled { job_id: Option<String> },
}

fn cancelled_suffix(job_id: &Option<String>) -> String {
    match job_id {
        Some(id) => format!(" while waiting for {}", id),
        None => String::new(),
    }
}

impl ExportError {
    /// Label used for the run outcome metric.
    pub fn outcome_label(&self) -> &'static str {
        match self {
            ExportError::JobFailed { .. } => "job_failed",
            ExportError::Timeout { .. } => "timeout",
            ExportError::Cancelled { .. } => "cancelled",
            _ => "error",
        }
    }
}

impl From<AuthError> for ExportError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Authentication(message) => ExportError::Authentication(message),
            AuthError::Unexpected(message) => ExportError::Unexpected(message),
        }
    }
}

impl IsRetryable for ExportError {
    fn is_retryable(&self) -> bool {
        matches!(self, ExportError::Transport(_))
    }
}

/// Classify a non-2xx response.
///
/// A body of the form `{"error": {"code", "message", "details"}}` yields its
/// code and message; anything else is carried verbatim as the message.
pub fn decode_error_response(status: u16, body: &str) -> ExportError {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) if !parsed.error.message.is_empty() || !parsed.error.code.is_empty() => {
            let message = if parsed.error.message.is_empty() {
                body.to_string()
            } else {
                parsed.error.message
            };
            ExportError::RequestFailed {
                status,
                code: Some(parsed.error.code).filter(|c| !c.is_empty()),
                message,
                details: parsed.error.details.unwrap_or_default(),
            }
        }
        _ => ExportError::RequestFailed {
            status,
            code: None,
            message: body.to_string(),
            details: Vec::new(),
        },
    }
}
