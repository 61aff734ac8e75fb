//! Mock codec adapter for testing.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use crate::adapter::{AdapterError, CodecAdapter};
use crate::conversion::{ConversionRequest, ConversionResult};
use crate::format::{AdapterId, FormatTag, COMPRESS_TAG};
use crate::scratch::ScratchDir;

type FailureFn = Box<dyn Fn() -> AdapterError + Send + Sync>;

/// One recorded adapter invocation.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub request_id: String,
    pub source: String,
    pub target: String,
    /// Scratch directory handed to the adapter. Should be gone once the
    /// conversion returns.
    pub scratch_path: PathBuf,
}

/// Mock implementation of the CodecAdapter trait.
///
/// Echoes the payload back as the target format unless configured
/// otherwise, and writes a file into the scratch directory so tests can
/// check cleanup.
///
/// # Example
///
/// ```rust,ignore
/// use transmute_core::testing::MockAdapter;
/// use transmute_core::format::AdapterId;
///
/// let adapter = MockAdapter::new(AdapterId::Image).with_delay(Duration::from_secs(10));
/// adapter.fail_with(|| AdapterError::corrupt_input("truncated"));
/// ```
pub struct MockAdapter {
    id: AdapterId,
    delay: Mutex<Option<Duration>>,
    failure: Mutex<Option<FailureFn>>,
    output: Mutex<Option<Vec<u8>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockAdapter {
    pub fn new(id: AdapterId) -> Self {
        Self {
            id,
            delay: Mutex::new(None),
            failure: Mutex::new(None),
            output: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sleep this long inside every conversion.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.set_delay(delay);
        self
    }

    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    /// Fail every conversion with the error built by `make`.
    pub fn fail_with<F>(&self, make: F)
    where
        F: Fn() -> AdapterError + Send + Sync + 'static,
    {
        *lock(&self.failure) = Some(Box::new(make));
    }

    pub fn clear_failure(&self) {
        *lock(&self.failure) = None;
    }

    /// Return these bytes instead of echoing the payload.
    pub fn set_output(&self, output: Vec<u8>) {
        *lock(&self.output) = Some(output);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn last_source(&self) -> Option<String> {
        lock(&self.calls).last().map(|c| c.source.clone())
    }

    pub fn last_target(&self) -> Option<String> {
        lock(&self.calls).last().map(|c| c.target.clone())
    }

    pub fn last_scratch_path(&self) -> Option<PathBuf> {
        lock(&self.calls).last().map(|c| c.scratch_path.clone())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl CodecAdapter for MockAdapter {
    fn id(&self) -> AdapterId {
        self.id
    }

    fn name(&self) -> &str {
        "mock"
    }

    async fn convert(
        &self,
        request: &ConversionRequest,
        scratch: &ScratchDir,
    ) -> Result<ConversionResult, AdapterError> {
        lock(&self.calls).push(RecordedCall {
            request_id: request.id.clone(),
            source: request.source.to_string(),
            target: request.target.to_string(),
            scratch_path: scratch.path().to_path_buf(),
        });

        scratch.write("mock-work.bin", &request.payload).await?;

        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(make) = lock(&self.failure).as_ref() {
            return Err(make());
        }

        let data = lock(&self.output)
            .clone()
            .unwrap_or_else(|| request.payload.to_vec());
        let format = if request.target == COMPRESS_TAG {
            request.source.clone()
        } else {
            FormatTag::new(request.target.as_str())
        };

        Ok(ConversionResult::new(data, format, "mock"))
    }
}
