//! Testing utilities and mock implementations.
//!
//! Mocks for every seam of the pipeline (codec adapters, converters and
//! usage gates) so the orchestrator and server can be exercised without
//! ffmpeg, tesseract or a remote instance.
//!
//! # Example
//!
//! ```rust,ignore
//! use transmute_core::testing::{MockAdapter, MockUsageGate};
//!
//! let adapter = Arc::new(MockAdapter::new(AdapterId::Image));
//! let orchestrator = Orchestrator::new(config, Arc::new(MockUsageGate::allowing()))
//!     .with_adapter(adapter.clone());
//! ```

mod mock_adapter;
mod mock_converter;
mod mock_gate;

pub mod fixtures;

pub use mock_adapter::{MockAdapter, RecordedCall};
pub use mock_converter::MockConverter;
pub use mock_gate::MockUsageGate;
