//! Error types for codec adapters.

use thiserror::Error;

use crate::conversion::ErrorKind;

/// Errors a codec adapter can raise. Adapters pick the narrowest variant.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Options are well-formed but cannot be applied to this pair.
    #[error("Unsupported option: {reason}")]
    UnsupportedOption { reason: String },

    /// The payload does not decode as the claimed source format.
    #[error("Corrupt input: {reason}")]
    CorruptInput { reason: String },

    /// The backend could not be reached or crashed.
    #[error("Backend unavailable: {reason}")]
    BackendUnavailable {
        reason: String,
        /// Raw backend diagnostics. Logged, never shown to callers.
        stderr: Option<String>,
    },

    /// The backend exceeded its own time budget.
    #[error("Backend timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },
}

impl AdapterError {
    pub fn unsupported_option(reason: impl Into<String>) -> Self {
        Self::UnsupportedOption {
            reason: reason.into(),
        }
    }

    pub fn corrupt_input(reason: impl Into<String>) -> Self {
        Self::CorruptInput {
            reason: reason.into(),
        }
    }

    pub fn backend_unavailable(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::BackendUnavailable {
            reason: reason.into(),
            stderr,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedOption { .. } => ErrorKind::UnsupportedOption,
            Self::CorruptInput { .. } => ErrorKind::CorruptInput,
            Self::BackendUnavailable { .. } => ErrorKind::BackendUnavailable,
            Self::Timeout { .. } => ErrorKind::Timeout,
        }
    }
}

impl From<std::io::Error> for AdapterError {
    fn from(err: std::io::Error) -> Self {
        Self::backend_unavailable(format!("I/O error: {}", err), None)
    }
}
