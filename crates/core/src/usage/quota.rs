use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use super::UsageGate;

/// Per-caller daily allowance. Days roll over at UTC midnight.
pub struct DailyQuotaGate {
    limit: u32,
    counts: Mutex<DayCounts>,
}

/// Counters for a single day. Every key belongs to `day`.
#[derive(Default)]
struct DayCounts {
    day: Option<NaiveDate>,
    per_caller: HashMap<String, u32>,
}

impl DayCounts {
    /// Forgets every caller when `today` differs from the tracked day.
    fn roll_to(&mut self, today: NaiveDate) {
        if self.day != Some(today) {
            self.day = Some(today);
            self.per_caller.clear();
        }
    }
}

impl DailyQuotaGate {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            counts: Mutex::new(DayCounts::default()),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Gate decision for `caller` on `today`. Allowed calls are counted
    /// immediately, whatever the conversion's outcome.
    pub fn check_at(&self, caller: &str, today: NaiveDate) -> bool {
        let mut counts = self
            .counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        counts.roll_to(today);

        let used = counts.per_caller.entry(caller.to_string()).or_insert(0);
        if *used >= self.limit {
            return false;
        }
        *used += 1;
        true
    }

    /// Conversions already counted for `caller` on `today`.
    pub fn used_on(&self, caller: &str, today: NaiveDate) -> u32 {
        let counts = self
            .counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if counts.day != Some(today) {
            return 0;
        }
        counts.per_caller.get(caller).copied().unwrap_or(0)
    }

    /// Number of callers currently tracked.
    pub fn tracked_callers(&self) -> usize {
        self.counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .per_caller
            .len()
    }
}

#[async_trait]
impl UsageGate for DailyQuotaGate {
    async fn may_convert(&self, caller: &str) -> bool {
        self.check_at(caller, Utc::now().date_naive())
    }

    fn method_name(&self) -> &'static str {
        "daily_quota"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_quota_exhausts_after_limit() {
        let gate = DailyQuotaGate::new(2);
        assert!(gate.check_at("alice", day(1)));
        assert!(gate.check_at("alice", day(1)));
        assert!(!gate.check_at("alice", day(1)));
        assert_eq!(gate.used_on("alice", day(1)), 2);
    }

    #[test]
    fn test_quota_is_per_caller() {
        let gate = DailyQuotaGate::new(1);
        assert!(gate.check_at("alice", day(1)));
        assert!(gate.check_at("bob", day(1)));
        assert!(!gate.check_at("alice", day(1)));
    }

    #[test]
    fn test_quota_resets_next_day() {
        let gate = DailyQuotaGate::new(1);
        assert!(gate.check_at("alice", day(1)));
        assert!(!gate.check_at("alice", day(1)));
        assert!(gate.check_at("alice", day(2)));
        assert_eq!(gate.used_on("alice", day(1)), 0);
        assert_eq!(gate.used_on("alice", day(2)), 1);
    }

    #[test]
    fn test_rollover_forgets_previous_day_callers() {
        let gate = DailyQuotaGate::new(3);
        for i in 0..10_000 {
            assert!(gate.check_at(&format!("caller-{}", i), day(1)));
        }
        assert_eq!(gate.tracked_callers(), 10_000);

        assert!(gate.check_at("late", day(2)));
        assert_eq!(gate.tracked_callers(), 1);
        assert_eq!(gate.used_on("caller-7", day(1)), 0);
    }

    #[tokio::test]
    async fn test_may_convert_uses_today() {
        let gate = DailyQuotaGate::new(1);
        assert!(gate.may_convert("carol").await);
        assert!(!gate.may_convert("carol").await);
        assert_eq!(gate.method_name(), "daily_quota");
    }
}
