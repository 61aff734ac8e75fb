//! HTTP surface of the transmute conversion service.

pub mod api;
pub mod metrics;
pub mod state;
