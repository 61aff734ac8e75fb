//! Codec adapter trait definition.

use async_trait::async_trait;

use super::error::AdapterError;
use crate::conversion::{ConversionRequest, ConversionResult};
use crate::format::AdapterId;
use crate::scratch::ScratchDir;

/// Wraps exactly one external codec capability behind a uniform interface.
///
/// The orchestrator hands every adapter a request whose `source` and
/// `target` are already normalized and routed, plus a scratch directory
/// owned by the request. Adapters may write anything under the scratch
/// directory; the orchestrator removes it afterwards.
#[async_trait]
pub trait CodecAdapter: Send + Sync {
    /// Which registry entry this adapter serves.
    fn id(&self) -> AdapterId;

    /// Human-readable name, used in logs and results.
    fn name(&self) -> &str;

    /// Performs the conversion.
    async fn convert(
        &self,
        request: &ConversionRequest,
        scratch: &ScratchDir,
    ) -> Result<ConversionResult, AdapterError>;

    /// Checks that the backing capability is available.
    async fn validate(&self) -> Result<(), AdapterError> {
        Ok(())
    }
}
