//! Per-resource read-through caches for the LMS client.
//!
//! This crate provides:
//! - `CacheEntry` - Cached state of one fingerprint (value, timestamp, in-flight fetch)
//! - `ResourceCache` - Keyed entries of one resource type with read/write/invalidate primitives
//! - `resolve` - Read-through resolution with TTL, request coalescing and stale-on-error
//! - `CachePolicy` - TTL, timeout and failure policy per resource
//! - `Fingerprint` - Cache key for listings and records
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use lms_cache::{CachePolicy, Fingerprint, ResourceCache};
//!
//! let courses: ResourceCache<Fingerprint, Vec<Course>> =
//!     ResourceCache::new("course_listing", CachePolicy::new(Duration::from_secs(300)));
//!
//! // Concurrent calls for the same key share one fetch.
//! let listing = courses
//!     .resolve(Fingerprint::name("design"), |key| api.list_courses(key))
//!     .await?;
//! ```

mod cache;
mod entry;
mod key;
mod policy;
mod resolve;
mod stats;

pub use cache::*;
pub use entry::CacheEntry;
pub use key::*;
pub use policy::*;
pub use resolve::*;
pub use stats::*;
