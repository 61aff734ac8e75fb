//! Orchestrator implementation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::adapter::{
    AdapterError, CodecAdapter, CompressAdapter, DocumentAdapter, FfmpegConfig, ImageAdapter,
    MediaAdapter,
};
use crate::config::ConversionConfig;
use crate::conversion::{
    suggested_filename, ConversionError, ConversionRequest, ConversionResult, Converter,
};
use crate::enrich::Enricher;
use crate::events::{ConversionEvent, EventHandle};
use crate::format::{capable_adapter, AdapterId, FormatTag, Route};
use crate::metrics;
use crate::scratch::{ScratchDir, ScratchSpace};
use crate::usage::UsageGate;

use super::state::{ConversionState, StateTracker};

/// What is known about a request when it reaches a terminal state.
#[derive(Debug)]
struct Attempt {
    source: FormatTag,
    target: FormatTag,
    adapter: Option<AdapterId>,
}

impl Attempt {
    fn from_request(request: &ConversionRequest) -> Self {
        Self {
            source: request.source.clone(),
            target: request.target.clone(),
            adapter: None,
        }
    }
}

/// Decrements the in-flight gauge however the execution ends.
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        metrics::CONVERSIONS_IN_FLIGHT.inc();
        Self
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        metrics::CONVERSIONS_IN_FLIGHT.dec();
    }
}

/// The local conversion pipeline.
///
/// Adapters are shared immutably; the orchestrator keeps no per-request
/// state between calls, so one instance serves any number of concurrent
/// conversions.
pub struct Orchestrator {
    config: ConversionConfig,
    adapters: HashMap<AdapterId, Arc<dyn CodecAdapter>>,
    enrichers: Vec<Arc<dyn Enricher>>,
    gate: Arc<dyn UsageGate>,
    scratch: ScratchSpace,
    events: Option<EventHandle>,
    permits: Option<Arc<Semaphore>>,
}

impl Orchestrator {
    /// Create an orchestrator with no adapters registered.
    pub fn new(config: ConversionConfig, gate: Arc<dyn UsageGate>) -> Self {
        let scratch = ScratchSpace::new(&config.scratch_dir);
        let permits = (config.max_parallel_conversions > 0)
            .then(|| Arc::new(Semaphore::new(config.max_parallel_conversions)));

        Self {
            config,
            adapters: HashMap::new(),
            enrichers: Vec::new(),
            gate,
            scratch,
            events: None,
            permits,
        }
    }

    /// Register an adapter under its own id, replacing any previous one.
    pub fn with_adapter(mut self, adapter: Arc<dyn CodecAdapter>) -> Self {
        self.adapters.insert(adapter.id(), adapter);
        self
    }

    /// Register the built-in image, document, ffmpeg and compress adapters.
    pub fn with_default_adapters(self, ffmpeg: FfmpegConfig) -> Self {
        let quality = self.config.default_image_quality;
        self.with_adapter(Arc::new(ImageAdapter::new(quality)))
            .with_adapter(Arc::new(DocumentAdapter::new()))
            .with_adapter(Arc::new(MediaAdapter::new(ffmpeg)))
            .with_adapter(Arc::new(CompressAdapter::new()))
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enrichers.push(enricher);
        self
    }

    pub fn with_enrichers(mut self, enrichers: Vec<Arc<dyn Enricher>>) -> Self {
        self.enrichers.extend(enrichers);
        self
    }

    pub fn with_events(mut self, events: EventHandle) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    pub fn scratch(&self) -> &ScratchSpace {
        &self.scratch
    }

    /// Ids of the registered adapters, sorted.
    pub fn adapter_ids(&self) -> Vec<AdapterId> {
        let mut ids: Vec<AdapterId> = self.adapters.keys().copied().collect();
        ids.sort_by_key(|id| id.as_str());
        ids
    }

    /// Check every adapter's backend. Failures are logged, not fatal.
    pub async fn validate_adapters(&self) -> Vec<(AdapterId, Result<(), AdapterError>)> {
        let mut report = Vec::with_capacity(self.adapters.len());
        for id in self.adapter_ids() {
            let Some(adapter) = self.adapters.get(&id) else {
                continue;
            };
            let outcome = adapter.validate().await;
            match &outcome {
                Ok(()) => info!("Adapter {} ready", adapter.name()),
                Err(e) => warn!("Adapter {} unavailable: {}", adapter.name(), e),
            }
            report.push((id, outcome));
        }
        report
    }

    /// Run a conversion, abandoning it when `cancel` completes first.
    ///
    /// The in-flight work is dropped on cancellation: the scratch directory
    /// is removed and any child process killed before `Cancelled` returns.
    pub async fn convert_with_cancel<F>(
        &self,
        caller: &str,
        request: &ConversionRequest,
        cancel: F,
    ) -> Result<ConversionResult, ConversionError>
    where
        F: Future<Output = ()> + Send,
    {
        let started = Instant::now();
        tokio::select! {
            outcome = self.run(caller, request) => outcome,
            _ = cancel => {
                info!(request_id = %request.id, "Conversion cancelled by caller");
                let error = ConversionError::Cancelled;
                self.record_failure(caller, request, &self.describe(request), &error, started);
                Err(error)
            }
        }
    }

    /// Resolved tags and route for `request`, as far as they can be known
    /// without running it.
    fn describe(&self, request: &ConversionRequest) -> Attempt {
        let mut attempt = Attempt::from_request(request);
        if let Ok((source, target)) = self.validate(request) {
            if let Route::Adapter(id) = capable_adapter(&source, &target) {
                attempt.adapter = self.adapters.contains_key(&id).then_some(id);
            }
            attempt.source = source;
            attempt.target = target;
        }
        attempt
    }

    async fn run(
        &self,
        caller: &str,
        request: &ConversionRequest,
    ) -> Result<ConversionResult, ConversionError> {
        let started = Instant::now();
        let mut attempt = Attempt::from_request(request);
        let mut tracker = StateTracker::new(&request.id);

        let outcome = self.execute(caller, request, &mut attempt, &mut tracker).await;

        if !tracker.state().is_outcome() {
            tracker.advance(if outcome.is_ok() {
                ConversionState::Succeeded
            } else {
                ConversionState::Failed
            });
        }
        tracker.advance(ConversionState::Released);

        match outcome {
            Ok(mut result) => {
                result.duration_ms = started.elapsed().as_millis() as u64;
                self.record_success(caller, request, &attempt, &result, started);
                Ok(result)
            }
            Err(error) => {
                self.record_failure(caller, request, &attempt, &error, started);
                Err(error)
            }
        }
    }

    async fn execute(
        &self,
        caller: &str,
        request: &ConversionRequest,
        attempt: &mut Attempt,
        tracker: &mut StateTracker<'_>,
    ) -> Result<ConversionResult, ConversionError> {
        if !self.gate.may_convert(caller).await {
            metrics::QUOTA_DENIALS.inc();
            return Err(ConversionError::QuotaExceeded {
                caller: caller.to_string(),
            });
        }

        let (source, target) = self.validate(request)?;
        attempt.source = source.clone();
        attempt.target = target.clone();
        tracker.advance(ConversionState::Validated);

        let id = match capable_adapter(&source, &target) {
            Route::Adapter(id) => id,
            Route::NotSupported => {
                return Err(ConversionError::UnsupportedConversion {
                    from: source,
                    to: target,
                })
            }
        };
        let adapter = self
            .adapters
            .get(&id)
            .cloned()
            .ok_or_else(|| ConversionError::UnsupportedConversion {
                from: source.clone(),
                to: target.clone(),
            })?;
        attempt.adapter = Some(id);
        tracker.advance(ConversionState::Routed);

        let scratch = self
            .scratch
            .acquire(&request.id)
            .map_err(|e| ConversionError::Adapter {
                adapter: id,
                error: AdapterError::from(e),
            })?;

        let normalized = ConversionRequest {
            source: source.clone(),
            target,
            ..request.clone()
        };

        let budget = request
            .options
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.config.timeout_for(source.family()));

        tracker.advance(ConversionState::Executing);
        let executed = {
            let _in_flight = InFlight::enter();
            self.invoke(adapter.as_ref(), &normalized, &scratch, budget)
                .await
        };

        let outcome = match executed {
            Ok(mut result) => {
                tracker.advance(ConversionState::Succeeded);
                self.enrich(&normalized, &mut result, &scratch).await;
                result.filename = suggested_filename(request.filename.as_deref(), &result.format);
                Ok(result)
            }
            Err(error) => Err(error),
        };

        if let Err(e) = scratch.release() {
            warn!(request_id = %request.id, "Failed to remove scratch directory: {}", e);
        }
        outcome
    }

    /// Normalizes and checks the request, resolving the source tag.
    fn validate(
        &self,
        request: &ConversionRequest,
    ) -> Result<(FormatTag, FormatTag), ConversionError> {
        if request.payload.is_empty() {
            return Err(ConversionError::invalid_request("payload is empty"));
        }
        if request.input_bytes() > self.config.max_input_bytes {
            return Err(ConversionError::invalid_request(format!(
                "payload exceeds {} bytes",
                self.config.max_input_bytes
            )));
        }

        let options = &request.options;
        if let Some(quality) = options.quality {
            if !(1..=100).contains(&quality) {
                return Err(ConversionError::invalid_request(
                    "quality must be between 1 and 100",
                ));
            }
        }
        if options.width == Some(0) || options.height == Some(0) {
            return Err(ConversionError::invalid_request(
                "width and height must be positive",
            ));
        }
        if options.timeout_secs == Some(0) {
            return Err(ConversionError::invalid_request("timeout must be positive"));
        }

        let target = if options.wants_compress() {
            FormatTag::compress()
        } else {
            FormatTag::new(request.target.as_str())
        };
        if target.is_empty() {
            return Err(ConversionError::invalid_request("target format is missing"));
        }

        let source = if !request.source.is_empty() {
            FormatTag::new(request.source.as_str())
        } else {
            request
                .filename
                .as_deref()
                .and_then(FormatTag::from_filename)
                .or_else(|| FormatTag::sniff(&request.payload))
                .ok_or_else(|| {
                    ConversionError::invalid_request("source format could not be determined")
                })?
        };

        Ok((source, target))
    }

    async fn invoke(
        &self,
        adapter: &dyn CodecAdapter,
        request: &ConversionRequest,
        scratch: &ScratchDir,
        budget: Duration,
    ) -> Result<ConversionResult, ConversionError> {
        let id = adapter.id();
        debug!(
            request_id = %request.id,
            adapter = adapter.name(),
            source = %request.source,
            target = %request.target,
            budget_secs = budget.as_secs(),
            "Invoking adapter"
        );

        // Waiting for a permit counts against the budget.
        let invocation = async {
            let _permit = match &self.permits {
                Some(permits) => Some(permits.acquire().await.map_err(|_| {
                    AdapterError::backend_unavailable("conversion slots closed", None)
                })?),
                None => None,
            };
            adapter.convert(request, scratch).await
        };

        match tokio::time::timeout(budget, invocation).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(error)) => {
                if let AdapterError::BackendUnavailable {
                    stderr: Some(stderr),
                    ..
                } = &error
                {
                    debug!(request_id = %request.id, "Backend stderr: {}", stderr);
                }
                Err(ConversionError::Adapter { adapter: id, error })
            }
            Err(_) => Err(ConversionError::Timeout {
                timeout_secs: budget.as_secs(),
            }),
        }
    }

    /// Runs every requested enricher. Failures leave the AuxResult absent.
    async fn enrich(
        &self,
        request: &ConversionRequest,
        result: &mut ConversionResult,
        scratch: &ScratchDir,
    ) {
        let budget = Duration::from_secs(self.config.enrich_timeout_secs);

        for enricher in self.enrichers.iter().filter(|e| e.wants(&request.options)) {
            let name = enricher.name();
            let outcome =
                tokio::time::timeout(budget, enricher.enrich(request, result, scratch)).await;

            let label = match outcome {
                Ok(Ok(Some(value))) => {
                    result.aux.insert(enricher.key().to_string(), value);
                    "attached"
                }
                Ok(Ok(None)) => "skipped",
                Ok(Err(e)) => {
                    warn!(request_id = %request.id, enricher = name, "Enricher failed: {}", e);
                    "failed"
                }
                Err(_) => {
                    warn!(
                        request_id = %request.id,
                        enricher = name,
                        "Enricher timed out after {}s",
                        budget.as_secs()
                    );
                    "failed"
                }
            };
            metrics::ENRICHER_RUNS.with_label_values(&[name, label]).inc();
        }
    }

    fn record_success(
        &self,
        caller: &str,
        request: &ConversionRequest,
        attempt: &Attempt,
        result: &ConversionResult,
        started: Instant,
    ) {
        let adapter = attempt.adapter.map(|id| id.as_str()).unwrap_or("none");
        let elapsed = started.elapsed();

        metrics::CONVERSIONS_TOTAL
            .with_label_values(&[adapter, "succeeded"])
            .inc();
        metrics::CONVERSION_DURATION
            .with_label_values(&[adapter])
            .observe(elapsed.as_secs_f64());
        metrics::PAYLOAD_BYTES
            .with_label_values(&["input"])
            .observe(request.input_bytes() as f64);
        metrics::PAYLOAD_BYTES
            .with_label_values(&["output"])
            .observe(result.output_bytes() as f64);

        info!(
            request_id = %request.id,
            caller,
            source = %attempt.source,
            target = %attempt.target,
            adapter,
            output_bytes = result.output_bytes(),
            duration_ms = result.duration_ms,
            "Conversion succeeded"
        );

        if let Some(events) = &self.events {
            events.try_emit(ConversionEvent::ConversionSucceeded {
                request_id: request.id.clone(),
                caller: caller.to_string(),
                source: attempt.source.to_string(),
                target: result.format.to_string(),
                adapter: adapter.to_string(),
                input_bytes: request.input_bytes(),
                output_bytes: result.output_bytes(),
                duration_ms: result.duration_ms,
                aux_keys: result.aux.keys().cloned().collect(),
            });
        }
    }

    fn record_failure(
        &self,
        caller: &str,
        request: &ConversionRequest,
        attempt: &Attempt,
        error: &ConversionError,
        started: Instant,
    ) {
        let adapter = attempt.adapter.map(|id| id.as_str());
        let kind = error.kind();
        let duration_ms = started.elapsed().as_millis() as u64;

        metrics::CONVERSIONS_TOTAL
            .with_label_values(&[adapter.unwrap_or("none"), "failed"])
            .inc();
        metrics::CONVERSION_FAILURES
            .with_label_values(&[kind.as_str()])
            .inc();

        warn!(
            request_id = %request.id,
            caller,
            source = %attempt.source,
            target = %attempt.target,
            error_kind = %kind,
            duration_ms,
            "Conversion failed: {}",
            error
        );

        if let Some(events) = &self.events {
            events.try_emit(ConversionEvent::ConversionFailed {
                request_id: request.id.clone(),
                caller: caller.to_string(),
                source: attempt.source.to_string(),
                target: attempt.target.to_string(),
                adapter: adapter.map(str::to_string),
                input_bytes: request.input_bytes(),
                duration_ms,
                error_kind: kind,
            });
        }
    }
}

#[async_trait]
impl Converter for Orchestrator {
    fn name(&self) -> &str {
        "local"
    }

    async fn convert(
        &self,
        caller: &str,
        request: &ConversionRequest,
    ) -> Result<ConversionResult, ConversionError> {
        self.run(caller, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::{ConversionOptions, ErrorKind};
    use crate::testing::{MockAdapter, MockUsageGate};
    use crate::usage::UnlimitedGate;
    use tempfile::TempDir;

    fn orchestrator(temp: &TempDir) -> Orchestrator {
        Orchestrator::new(
            ConversionConfig::default().with_scratch_dir(temp.path()),
            Arc::new(UnlimitedGate::new()),
        )
    }

    #[tokio::test]
    async fn test_empty_payload_is_invalid() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator(&temp);
        let request = ConversionRequest::new(Vec::new(), "png").with_source("jpg");

        let err = orch.convert("tester", &request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_missing_target_is_invalid() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator(&temp);
        let request = ConversionRequest::new(vec![1, 2, 3], "  ").with_source("jpg");

        let err = orch.convert("tester", &request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_quality_out_of_range_is_invalid() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator(&temp);
        let request = ConversionRequest::new(vec![1, 2, 3], "png")
            .with_source("jpg")
            .with_options(ConversionOptions {
                quality: Some(0),
                ..Default::default()
            });

        let err = orch.convert("tester", &request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_oversized_payload_is_invalid() {
        let temp = TempDir::new().unwrap();
        let mut config = ConversionConfig::default().with_scratch_dir(temp.path());
        config.max_input_bytes = 4;
        let orch = Orchestrator::new(config, Arc::new(UnlimitedGate::new()));
        let request = ConversionRequest::new(vec![0u8; 5], "png").with_source("jpg");

        let err = orch.convert("tester", &request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_unregistered_adapter_is_unsupported() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator(&temp);
        let request = ConversionRequest::new(vec![1, 2, 3], "png").with_source("jpg");

        let err = orch.convert("tester", &request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedConversion);
    }

    #[tokio::test]
    async fn test_compress_flag_routes_to_compress_adapter() {
        let temp = TempDir::new().unwrap();
        let compress = Arc::new(MockAdapter::new(AdapterId::Compress));
        let orch = orchestrator(&temp).with_adapter(compress.clone());
        let request = ConversionRequest::new(vec![1, 2, 3], "jpg")
            .with_source("jpg")
            .with_options(ConversionOptions {
                compress: true,
                ..Default::default()
            });

        orch.convert("tester", &request).await.unwrap();
        assert_eq!(compress.call_count(), 1);
        assert_eq!(compress.last_target().as_deref(), Some("compress"));
    }

    #[tokio::test]
    async fn test_source_sniffed_from_filename() {
        let temp = TempDir::new().unwrap();
        let image = Arc::new(MockAdapter::new(AdapterId::Image));
        let orch = orchestrator(&temp).with_adapter(image.clone());
        let request = ConversionRequest::new(vec![1, 2, 3], "png").with_filename("holiday.JPEG");

        let result = orch.convert("tester", &request).await.unwrap();
        assert_eq!(image.last_source().as_deref(), Some("jpg"));
        assert_eq!(result.filename, "holiday.png");
    }

    #[tokio::test]
    async fn test_gate_denial_skips_adapter() {
        let temp = TempDir::new().unwrap();
        let image = Arc::new(MockAdapter::new(AdapterId::Image));
        let gate = Arc::new(MockUsageGate::denying());
        let orch = Orchestrator::new(
            ConversionConfig::default().with_scratch_dir(temp.path()),
            gate.clone(),
        )
        .with_adapter(image.clone());
        let request = ConversionRequest::new(vec![1, 2, 3], "png").with_source("jpg");

        let err = orch.convert("tester", &request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QuotaExceeded);
        assert_eq!(image.call_count(), 0);
        assert_eq!(gate.calls(), vec!["tester".to_string()]);
    }

    #[tokio::test]
    async fn test_adapter_error_kind_is_preserved() {
        let temp = TempDir::new().unwrap();
        let image = Arc::new(MockAdapter::new(AdapterId::Image));
        image.fail_with(|| AdapterError::corrupt_input("truncated"));
        let orch = orchestrator(&temp).with_adapter(image);
        let request = ConversionRequest::new(vec![1, 2, 3], "png").with_source("jpg");

        let err = orch.convert("tester", &request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptInput);
        assert!(matches!(
            err,
            ConversionError::Adapter {
                adapter: AdapterId::Image,
                error: AdapterError::CorruptInput { .. }
            }
        ));
    }

    #[tokio::test]
    async fn test_validate_adapters_reports_each() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator(&temp)
            .with_adapter(Arc::new(MockAdapter::new(AdapterId::Image)))
            .with_adapter(Arc::new(MockAdapter::new(AdapterId::Document)));

        let report = orch.validate_adapters().await;
        assert_eq!(report.len(), 2);
        assert!(report.iter().all(|(_, outcome)| outcome.is_ok()));
    }
}
