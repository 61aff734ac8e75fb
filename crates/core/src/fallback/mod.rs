//! Remote-first conversion with a local fallback.

mod remote;
mod wrapper;

pub use remote::RemoteConverter;
pub use wrapper::FallbackConverter;
