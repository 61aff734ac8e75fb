//! Mock converter for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::conversion::{ConversionError, ConversionRequest, ConversionResult, Converter};
use crate::format::FormatTag;

/// Mock implementation of the Converter trait.
///
/// Returns scripted outcomes in order; once the script runs out every call
/// echoes the payload back as the requested target.
pub struct MockConverter {
    name: String,
    script: Mutex<VecDeque<Result<ConversionResult, ConversionError>>>,
    callers: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
}

impl MockConverter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            callers: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
        }
    }

    /// Queue the outcome of a future call.
    pub fn push(&self, outcome: Result<ConversionResult, ConversionError>) {
        lock(&self.script).push_back(outcome);
    }

    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    pub fn call_count(&self) -> usize {
        lock(&self.callers).len()
    }

    /// Caller ids seen, in call order.
    pub fn callers(&self) -> Vec<String> {
        lock(&self.callers).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Converter for MockConverter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn convert(
        &self,
        caller: &str,
        request: &ConversionRequest,
    ) -> Result<ConversionResult, ConversionError> {
        lock(&self.callers).push(caller.to_string());

        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = lock(&self.script).pop_front();
        scripted.unwrap_or_else(|| {
            Ok(ConversionResult::new(
                request.payload.to_vec(),
                FormatTag::new(request.target.as_str()),
                self.name.clone(),
            ))
        })
    }
}
