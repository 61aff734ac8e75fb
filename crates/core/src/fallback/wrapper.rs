use async_trait::async_trait;
use tracing::{info, warn};

use crate::conversion::{ConversionError, ConversionRequest, ConversionResult, Converter};
use crate::events::{ConversionEvent, EventHandle};
use crate::metrics;

/// Tries `primary`, then `secondary` once if the primary failed with a
/// transport-class error (backend unavailable or timeout).
///
/// Any other failure is the caller's answer and is returned as is; running
/// it again elsewhere would only repeat it.
pub struct FallbackConverter<P, S> {
    primary: P,
    secondary: S,
    events: Option<EventHandle>,
}

impl<P, S> FallbackConverter<P, S>
where
    P: Converter,
    S: Converter,
{
    pub fn new(primary: P, secondary: S) -> Self {
        Self {
            primary,
            secondary,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventHandle) -> Self {
        self.events = Some(events);
        self
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    pub fn secondary(&self) -> &S {
        &self.secondary
    }
}

#[async_trait]
impl<P, S> Converter for FallbackConverter<P, S>
where
    P: Converter,
    S: Converter,
{
    fn name(&self) -> &str {
        "fallback"
    }

    async fn convert(
        &self,
        caller: &str,
        request: &ConversionRequest,
    ) -> Result<ConversionResult, ConversionError> {
        let error = match self.primary.convert(caller, request).await {
            Ok(result) => return Ok(result),
            Err(error) if error.is_transport() => error,
            Err(error) => return Err(error),
        };

        let kind = error.kind();
        warn!(
            request_id = %request.id,
            primary = self.primary.name(),
            secondary = self.secondary.name(),
            "Primary converter failed ({}), falling back: {}",
            kind,
            error
        );
        metrics::FALLBACKS_TOTAL
            .with_label_values(&[kind.as_str()])
            .inc();

        if let Some(events) = &self.events {
            events.try_emit(ConversionEvent::FallbackUsed {
                request_id: request.id.clone(),
                caller: caller.to_string(),
                primary: self.primary.name().to_string(),
                secondary: self.secondary.name().to_string(),
                error_kind: kind,
            });
        }

        let outcome = self.secondary.convert(caller, request).await;
        if outcome.is_ok() {
            info!(request_id = %request.id, "Fallback conversion succeeded");
        }
        outcome
    }
}
