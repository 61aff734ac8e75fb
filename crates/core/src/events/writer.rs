use std::sync::Arc;

use tokio::sync::mpsc;

use super::{EventEnvelope, EventHandle, EventRecord, EventStore};

/// Background task that drains the event channel into storage.
pub struct EventWriter {
    rx: mpsc::Receiver<EventEnvelope>,
    store: Arc<dyn EventStore>,
}

impl EventWriter {
    pub fn new(rx: mpsc::Receiver<EventEnvelope>, store: Arc<dyn EventStore>) -> Self {
        Self { rx, store }
    }

    /// Runs until every [`EventHandle`] is dropped.
    pub async fn run(mut self) {
        tracing::info!("Event writer started");

        while let Some(envelope) = self.rx.recv().await {
            let record = EventRecord {
                id: 0,
                timestamp: envelope.timestamp,
                event_type: envelope.event.event_type().to_string(),
                request_id: envelope.event.request_id().map(String::from),
                caller: envelope.event.caller().map(String::from),
                data: envelope.event,
            };

            if let Err(e) = self.store.insert(&record) {
                tracing::error!("Failed to write event: {}", e);
            }
        }

        tracing::info!("Event writer shutting down");
    }
}

/// Creates the event channel.
///
/// Spawn the returned writer with `tokio::spawn(writer.run())` and clone the
/// handle wherever events are produced.
pub fn create_event_system(
    store: Arc<dyn EventStore>,
    buffer_size: usize,
) -> (EventHandle, EventWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (EventHandle::new(tx), EventWriter::new(rx, store))
}
