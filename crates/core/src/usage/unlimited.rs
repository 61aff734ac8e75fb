use async_trait::async_trait;

use super::UsageGate;

/// Gate that lets every caller through
pub struct UnlimitedGate;

impl UnlimitedGate {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UnlimitedGate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UsageGate for UnlimitedGate {
    async fn may_convert(&self, _caller: &str) -> bool {
        true
    }

    fn method_name(&self) -> &'static str {
        "unlimited"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unlimited_always_allows() {
        let gate = UnlimitedGate::new();
        for _ in 0..1000 {
            assert!(gate.may_convert("someone").await);
        }
    }

    #[test]
    fn test_unlimited_allows_outside_runtime() {
        assert!(tokio_test::block_on(UnlimitedGate::new().may_convert("anyone")));
    }

    #[test]
    fn test_unlimited_method_name() {
        assert_eq!(UnlimitedGate::default().method_name(), "unlimited");
    }
}
