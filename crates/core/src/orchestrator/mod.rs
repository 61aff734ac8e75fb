//! Conversion orchestrator.
//!
//! Drives one request through `Received → Validated → Routed → Executing →
//! (Succeeded | Failed) → Released`, consulting the usage gate first and
//! removing the request's scratch directory on every exit path.

mod runner;
mod state;

pub use runner::Orchestrator;
pub use state::ConversionState;
