//! Currency conversion with a process-wide FX rate cache.

pub mod cache;
pub mod error;

pub use cache::FxCache;
pub use error::{FxError, FxResult};
