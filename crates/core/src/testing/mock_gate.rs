//! Mock usage gate for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::usage::UsageGate;

/// Usage gate with a switchable answer that records who asked.
pub struct MockUsageGate {
    allow: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl MockUsageGate {
    pub fn allowing() -> Self {
        Self {
            allow: AtomicBool::new(true),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn denying() -> Self {
        let gate = Self::allowing();
        gate.set_allow(false);
        gate
    }

    pub fn set_allow(&self, allow: bool) {
        self.allow.store(allow, Ordering::SeqCst);
    }

    /// Callers the gate was asked about, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl UsageGate for MockUsageGate {
    async fn may_convert(&self, caller: &str) -> bool {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(caller.to_string());
        self.allow.load(Ordering::SeqCst)
    }

    fn method_name(&self) -> &'static str {
        "mock"
    }
}
