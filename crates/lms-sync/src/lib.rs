//! Optimistic mutations and cross-resource invalidation for the LMS client.
//!
//! This crate provides:
//! - `AuthoritativeList` - Caller-owned collections the UI renders from
//! - `OptimisticMutator` - Apply a change locally, confirm or roll back after the remote call
//! - `Mutation` - Create/insert/patch/toggle/remove changes with their confirmation and rollback
//! - `MutationError` - Classified, human-readable mutation failures
//! - `InvalidationBus` - Static rules clearing dependent caches after confirmed mutations
//! - `Resource` - A resource cache bound to its fetcher
//! - `LmsStore` - Composition root wiring the LMS resources, rules and mutator
//!
//! # Example
//!
//! ```ignore
//! use lms_core::SyncConfig;
//! use lms_sync::{AuthoritativeList, LmsStore};
//!
//! let store = LmsStore::new(&SyncConfig::default(), fetchers);
//! let mine = AuthoritativeList::new(store.enrollments(Fingerprint::all()).await?);
//!
//! // The placeholder enrollment shows up before the server answers.
//! store
//!     .enroll(&mine, user, course, || api.enroll(user, course))
//!     .await?;
//! ```

mod bus;
mod error;
mod list;
mod mutation;
mod mutator;
mod resource;
mod store;

pub use bus::*;
pub use error::*;
pub use list::*;
pub use mutation::*;
pub use mutator::*;
pub use resource::*;
pub use store::*;
