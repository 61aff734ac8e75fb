use async_trait::async_trait;
use thiserror::Error;

use crate::conversion::{ConversionOptions, ConversionRequest, ConversionResult};
use crate::scratch::ScratchDir;

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("tool failed: {0}")]
    ToolFailed(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Best-effort post-processor attaching one AuxResult to a finished
/// conversion.
#[async_trait]
pub trait Enricher: Send + Sync {
    /// AuxResults key this enricher fills.
    fn key(&self) -> &'static str;

    /// Short name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Whether the request's flags ask for this enricher.
    fn wants(&self, options: &ConversionOptions) -> bool;

    /// Produces the AuxResult value, or `None` when the output has nothing
    /// to contribute (e.g. no text to summarize).
    async fn enrich(
        &self,
        request: &ConversionRequest,
        result: &ConversionResult,
        scratch: &ScratchDir,
    ) -> Result<Option<String>, EnrichError>;
}
