//! JSON bodies exchanged between the HTTP surface and remote clients.

use serde::{Deserialize, Serialize};

use super::error::{ConversionError, ErrorKind};
use super::types::{AuxResults, ConversionResult};

/// Header carrying the caller identity used by usage gates.
pub const CALLER_HEADER: &str = "x-caller-id";

/// Header echoing the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Path of the JSON conversion endpoint, relative to a server's base URL.
pub const CONVERT_JSON_PATH: &str = "/api/v1/convert/json";

/// Success body of `POST /api/v1/convert/json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertResponseBody {
    pub filename: String,
    pub format: String,
    /// Output bytes, standard base64.
    pub data_base64: String,
    #[serde(default)]
    pub aux: AuxResults,
    #[serde(default)]
    pub produced_by: String,
    #[serde(default)]
    pub duration_ms: u64,
}

impl From<&ConversionResult> for ConvertResponseBody {
    fn from(result: &ConversionResult) -> Self {
        use base64::Engine as _;
        Self {
            filename: result.filename.clone(),
            format: result.format.to_string(),
            data_base64: base64::engine::general_purpose::STANDARD.encode(&result.data),
            aux: result.aux.clone(),
            produced_by: result.produced_by.clone(),
            duration_ms: result.duration_ms,
        }
    }
}

/// Error body returned with every non-2xx conversion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorKind,
    pub message: String,
}

impl From<&ConversionError> for ErrorBody {
    fn from(err: &ConversionError) -> Self {
        Self {
            error: err.kind(),
            message: err.user_message(),
        }
    }
}
