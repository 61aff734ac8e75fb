mod quota;
mod traits;
mod unlimited;

pub use quota::*;
pub use traits::*;
pub use unlimited::*;

use std::sync::Arc;

use crate::config::{UsageConfig, UsageMethod};

/// Factory function to create the usage gate from config
pub fn create_usage_gate(config: &UsageConfig) -> Arc<dyn UsageGate> {
    match config.method {
        UsageMethod::Unlimited => Arc::new(UnlimitedGate::new()),
        UsageMethod::DailyQuota => Arc::new(DailyQuotaGate::new(config.daily_limit)),
    }
}
