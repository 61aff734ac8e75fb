//! The orchestrator-shaped converter interface.

use async_trait::async_trait;
use std::sync::Arc;

use super::error::ConversionError;
use super::types::{ConversionRequest, ConversionResult};

/// Anything that can turn a [`ConversionRequest`] into a [`ConversionResult`].
///
/// Implemented by the local orchestrator, the remote HTTP client and the
/// fallback wrapper, so they compose freely.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Returns the name of this converter implementation.
    fn name(&self) -> &str;

    /// Converts on behalf of `caller`.
    async fn convert(
        &self,
        caller: &str,
        request: &ConversionRequest,
    ) -> Result<ConversionResult, ConversionError>;
}

#[async_trait]
impl<T: Converter + ?Sized> Converter for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn convert(
        &self,
        caller: &str,
        request: &ConversionRequest,
    ) -> Result<ConversionResult, ConversionError> {
        (**self).convert(caller, request).await
    }
}
