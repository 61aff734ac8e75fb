//! Best-effort enrichers producing AuxResults.

mod ocr;
mod summary;
mod traits;

pub use ocr::OcrEnricher;
pub use summary::{extractive_summary, SummaryEnricher};
pub use traits::*;

use std::sync::Arc;

use crate::config::Config;

/// Enrichers available to the orchestrator, in execution order. OCR runs
/// first so the summary can use recognized text.
pub fn default_enrichers(config: &Config) -> Vec<Arc<dyn Enricher>> {
    vec![
        Arc::new(OcrEnricher::new(&config.ocr)),
        Arc::new(SummaryEnricher::new(&config.summary)),
    ]
}
