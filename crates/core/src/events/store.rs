use chrono::{DateTime, Utc};
use thiserror::Error;

use super::EventRecord;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Filter for querying stored events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub request_id: Option<String>,
    pub event_type: Option<String>,
    pub caller: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl EventFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            offset: 0,
            ..Default::default()
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    pub fn with_time_range(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Storage for conversion events.
pub trait EventStore: Send + Sync {
    /// Inserts a record, returning the assigned id.
    fn insert(&self, record: &EventRecord) -> Result<i64, EventError>;

    /// Newest-first records matching `filter`.
    fn query(&self, filter: &EventFilter) -> Result<Vec<EventRecord>, EventError>;

    fn count(&self, filter: &EventFilter) -> Result<i64, EventError>;
}
