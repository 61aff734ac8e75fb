use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::ConversionEvent;

/// Envelope wrapping an event with the time it was emitted.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub timestamp: DateTime<Utc>,
    pub event: ConversionEvent,
}

/// Handle for emitting events.
///
/// Cheaply cloneable. Events travel through a bounded channel to the
/// [`EventWriter`](super::EventWriter).
#[derive(Clone)]
pub struct EventHandle {
    tx: mpsc::Sender<EventEnvelope>,
}

impl EventHandle {
    pub fn new(tx: mpsc::Sender<EventEnvelope>) -> Self {
        Self { tx }
    }

    /// Emits an event, waiting for channel capacity.
    ///
    /// A closed channel is logged, never surfaced.
    pub async fn emit(&self, event: ConversionEvent) {
        let envelope = EventEnvelope {
            timestamp: Utc::now(),
            event,
        };
        if let Err(e) = self.tx.send(envelope).await {
            tracing::error!("Failed to emit event: {}", e);
        }
    }

    /// Emits an event without waiting. Returns whether it was queued.
    pub fn try_emit(&self, event: ConversionEvent) -> bool {
        let envelope = EventEnvelope {
            timestamp: Utc::now(),
            event,
        };
        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Dropped event: {}", e);
                false
            }
        }
    }
}
