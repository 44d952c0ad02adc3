//! Common error types for reportsync.

use std::time::Duration;
use thiserror::Error;

/// Top-level error type for reportsync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Required credentials are missing or malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Provider client bootstrap failed or timed out.
    #[error("Initialization failed after {}ms: {message}", .elapsed.as_millis())]
    Initialization {
        /// What went wrong.
        message: String,
        /// Time spent before giving up.
        elapsed: Duration,
    },

    /// Consent declined, popup/browser unavailable, or token rejected.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// A file mutation was rejected by the provider.
    #[error("Upload error: {operation} of '{target}' failed ({status}): {body}")]
    Upload {
        /// Operation name (e.g. "create", "replace", "download").
        operation: String,
        /// Logical name or id of the target.
        target: String,
        /// HTTP status returned by the provider.
        status: u16,
        /// Response body, kept for diagnosis.
        body: String,
    },

    /// A spreadsheet mutation was rejected by the provider.
    #[error("Sync error: {operation} of '{target}'{} failed ({status}): {body}", sheet_suffix(.sheet))]
    Sync {
        /// Operation name (e.g. "clear", "write", "add_sheet").
        operation: String,
        /// Spreadsheet name or id.
        target: String,
        /// Sheet that failed, when the failure is sheet-scoped.
        sheet: Option<String>,
        /// HTTP status returned by the provider.
        status: u16,
        /// Response body, kept for diagnosis.
        body: String,
    },

    /// Transport failed before a response was received.
    #[error("Network error: {0}")]
    Network(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The caller cancelled the operation.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// The operation exceeded its deadline.
    #[error("Timed out: {0}")]
    Timeout(String),
}

fn sheet_suffix(sheet: &Option<String>) -> String {
    match sheet {
        Some(name) => format!(" (sheet '{}')", name),
        None => String::new(),
    }
}

impl Error {
    /// HTTP status carried by provider rejections.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Upload { status, .. } | Error::Sync { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) | Error::Io(_) => true,
            Error::Upload { status, .. } | Error::Sync { status, .. } => {
                *status == 429 || *status >= 500
            }
            _ => false,
        }
    }

    /// The sheet a sync failure is scoped to, if any.
    pub fn failed_sheet(&self) -> Option<&str> {
        match self {
            Error::Sync { sheet, .. } => sheet.as_deref(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
