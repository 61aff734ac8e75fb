use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conversion::ErrorKind;

/// Events recorded by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversionEvent {
    ServiceStarted {
        version: String,
        config_hash: String,
    },

    ServiceStopped {
        reason: String,
    },

    ConversionSucceeded {
        request_id: String,
        caller: String,
        source: String,
        target: String,
        adapter: String,
        input_bytes: u64,
        output_bytes: u64,
        duration_ms: u64,
        #[serde(default)]
        aux_keys: Vec<String>,
    },

    ConversionFailed {
        request_id: String,
        caller: String,
        source: String,
        target: String,
        adapter: Option<String>,
        input_bytes: u64,
        duration_ms: u64,
        error_kind: ErrorKind,
    },

    /// The primary path failed with a transport error and the secondary ran.
    FallbackUsed {
        request_id: String,
        caller: String,
        primary: String,
        secondary: String,
        error_kind: ErrorKind,
    },
}

impl ConversionEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::ConversionSucceeded { .. } => "conversion_succeeded",
            Self::ConversionFailed { .. } => "conversion_failed",
            Self::FallbackUsed { .. } => "fallback_used",
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::ConversionSucceeded { request_id, .. }
            | Self::ConversionFailed { request_id, .. }
            | Self::FallbackUsed { request_id, .. } => Some(request_id),
            Self::ServiceStarted { .. } | Self::ServiceStopped { .. } => None,
        }
    }

    pub fn caller(&self) -> Option<&str> {
        match self {
            Self::ConversionSucceeded { caller, .. }
            | Self::ConversionFailed { caller, .. }
            | Self::FallbackUsed { caller, .. } => Some(caller),
            Self::ServiceStarted { .. } | Self::ServiceStopped { .. } => None,
        }
    }
}

/// A stored event row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub request_id: Option<String>,
    pub caller: Option<String>,
    pub data: ConversionEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = ConversionEvent::ConversionFailed {
            request_id: "req-1".to_string(),
            caller: "alice".to_string(),
            source: "docx".to_string(),
            target: "mp4".to_string(),
            adapter: None,
            input_bytes: 10,
            duration_ms: 1,
            error_kind: ErrorKind::UnsupportedConversion,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "conversion_failed");
        assert_eq!(json["error_kind"], "unsupported_conversion");

        let parsed: ConversionEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_accessors() {
        let event = ConversionEvent::ServiceStarted {
            version: "0.1.0".to_string(),
            config_hash: "abc".to_string(),
        };
        assert_eq!(event.event_type(), "service_started");
        assert!(event.request_id().is_none());
        assert!(event.caller().is_none());

        let event = ConversionEvent::FallbackUsed {
            request_id: "req-2".to_string(),
            caller: "bob".to_string(),
            primary: "remote".to_string(),
            secondary: "local".to_string(),
            error_kind: ErrorKind::Timeout,
        };
        assert_eq!(event.request_id(), Some("req-2"));
        assert_eq!(event.caller(), Some("bob"));
    }
}
