//! Per-request conversion state machine.

use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Lifecycle of one conversion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionState {
    Received,
    Validated,
    Routed,
    Executing,
    Succeeded,
    Failed,
    Released,
}

impl ConversionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::Routed => "routed",
            Self::Executing => "executing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Released => "released",
        }
    }

    /// Succeeded or Failed. Only Released may follow.
    pub fn is_outcome(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Returns true if `next` may follow this state.
    pub fn can_transition_to(&self, next: ConversionState) -> bool {
        use ConversionState::*;
        match (self, next) {
            (Received, Validated)
            | (Validated, Routed)
            | (Routed, Executing)
            | (Executing, Succeeded)
            | (Succeeded, Released)
            | (Failed, Released) => true,
            // Every pre-terminal state can fail.
            (Received | Validated | Routed | Executing, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ConversionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks and logs the state of one request.
#[derive(Debug)]
pub(crate) struct StateTracker<'a> {
    request_id: &'a str,
    state: ConversionState,
}

impl<'a> StateTracker<'a> {
    pub(crate) fn new(request_id: &'a str) -> Self {
        debug!(request_id, state = %ConversionState::Received, "Conversion received");
        Self {
            request_id,
            state: ConversionState::Received,
        }
    }

    pub(crate) fn state(&self) -> ConversionState {
        self.state
    }

    pub(crate) fn advance(&mut self, next: ConversionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(
            request_id = self.request_id,
            from = %self.state,
            to = %next,
            "Conversion state change"
        );
        self.state = next;
    }
}
