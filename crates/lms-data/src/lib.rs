//! Transport contract for cached LMS resources.
//!
//! This crate provides:
//! - `FetchError` - Transport failures and their `ErrorClass`
//! - `Fetcher` - Per-resource fetch interface
//! - `with_timeout` - Time-bounded fetches

mod error;
mod fetcher;
mod timeout;

pub use error::*;
pub use fetcher::*;
pub use timeout::*;
