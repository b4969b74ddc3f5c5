//! Core configuration for the LMS data synchronization layer.
//!
//! This crate provides:
//! - `ResourceKind` - Cached resource types with default TTLs and timeouts
//! - `SyncConfig` - File-backed configuration with per-resource overrides
//! - `LateResultPolicy` - Handling of fetches that finish after invalidation
//! - `init_logging` - `tracing` subscriber bootstrap

mod config;
mod logging;
mod resource;

pub use config::*;
pub use logging::*;
pub use resource::*;
