use async_trait::async_trait;

/// Decides whether a caller may run another conversion.
///
/// Gates run before any work happens, so a denied request never touches
/// scratch space or an adapter.
#[async_trait]
pub trait UsageGate: Send + Sync {
    /// Returns true if `caller` may convert now. A `true` answer counts
    /// against the caller's allowance.
    async fn may_convert(&self, caller: &str) -> bool;

    /// Name of this gating method
    fn method_name(&self) -> &'static str;
}
