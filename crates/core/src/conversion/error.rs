//! Error taxonomy for the conversion pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::adapter::AdapterError;
use crate::format::{AdapterId, FormatTag};

/// Failure kinds callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    UnsupportedConversion,
    CorruptInput,
    UnsupportedOption,
    BackendUnavailable,
    Timeout,
    QuotaExceeded,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::UnsupportedConversion => "unsupported_conversion",
            Self::CorruptInput => "corrupt_input",
            Self::UnsupportedOption => "unsupported_option",
            Self::BackendUnavailable => "backend_unavailable",
            Self::Timeout => "timeout",
            Self::QuotaExceeded => "quota_exceeded",
            Self::Cancelled => "cancelled",
        }
    }

    /// Transport-class kinds are the only ones eligible for fallback.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::BackendUnavailable | Self::Timeout)
    }

    /// User-facing message. Never includes backend details.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "The request is missing a file or a target format.",
            Self::UnsupportedConversion => "This format pair is not supported.",
            Self::CorruptInput => {
                "The file could not be read as the stated format. Please re-upload it."
            }
            Self::UnsupportedOption => {
                "The requested options cannot be applied to this conversion. Adjust them and try again."
            }
            Self::BackendUnavailable => {
                "The conversion service is temporarily unavailable. Please try again shortly."
            }
            Self::Timeout => "The conversion took too long and was stopped.",
            Self::QuotaExceeded => {
                "You have reached your conversion limit. Upgrade or wait for the limit to reset."
            }
            Self::Cancelled => "The conversion was cancelled.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by a [`Converter`](super::Converter).
#[derive(Debug, Error)]
pub enum ConversionError {
    /// Malformed request, rejected before any format logic ran.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No adapter handles the format pair.
    #[error("Conversion from {from} to {to} is not supported")]
    UnsupportedConversion { from: FormatTag, to: FormatTag },

    /// The adapter failed; the original cause is kept.
    #[error("Adapter {adapter} failed: {error}")]
    Adapter {
        adapter: AdapterId,
        #[source]
        error: AdapterError,
    },

    /// The execution budget elapsed.
    #[error("Conversion timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The usage gate denied the caller.
    #[error("Quota exceeded for caller {caller}")]
    QuotaExceeded { caller: String },

    /// The caller abandoned the request.
    #[error("Conversion cancelled")]
    Cancelled,

    /// A remote backend reported or caused a failure.
    #[error("Remote conversion failed ({kind}): {message}")]
    Remote { kind: ErrorKind, message: String },
}

impl ConversionError {
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest(reason.into())
    }

    pub fn remote(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Remote {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::UnsupportedConversion { .. } => ErrorKind::UnsupportedConversion,
            Self::Adapter { error, .. } => error.kind(),
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Remote { kind, .. } => *kind,
        }
    }

    /// Whether the fallback wrapper may retry on the secondary path.
    pub fn is_transport(&self) -> bool {
        self.kind().is_transport()
    }

    /// Message safe to show to an end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidRequest(reason) => format!("Invalid request: {}", reason),
            Self::UnsupportedConversion { from, to } => {
                format!("Converting {} to {} is not supported.", from, to)
            }
            other => other.kind().user_message().to_string(),
        }
    }
}
