//! Cached state for a single fingerprint.

use std::fmt;
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use lms_data::FetchError;
use tokio::time::Instant;

use crate::resolve::Resolved;

/// Shared handle to a fetch in progress. Every coalesced caller awaits a clone.
pub(crate) type SharedFetch<T> = Shared<BoxFuture<'static, Result<Resolved<T>, FetchError>>>;

/// A fetch in progress, tagged with the token that identifies it.
#[derive(Clone)]
pub(crate) struct InFlight<T> {
    pub(crate) token: u64,
    pub(crate) future: SharedFetch<T>,
}

/// The cached state of one fingerprint.
///
/// `value` only changes through a successful fetch, an explicit write or an
/// invalidation; failed fetches never touch it. At most one fetch is in
/// flight per entry.
#[derive(Clone)]
pub struct CacheEntry<T> {
    value: Option<T>,
    fetched_at: Option<Instant>,
    marked_stale: bool,
    revision: u64,
    pub(crate) in_flight: Option<InFlight<T>>,
}

impl<T> Default for CacheEntry<T> {
    fn default() -> Self {
        Self {
            value: None,
            fetched_at: None,
            marked_stale: false,
            revision: 0,
            in_flight: None,
        }
    }
}

impl<T> CacheEntry<T> {
    /// Create an empty entry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The last good value, fresh or not.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Check if a value is present.
    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// When the value was last refreshed.
    pub fn fetched_at(&self) -> Option<Instant> {
        self.fetched_at
    }

    /// Counter bumped by every change to the value.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Age of the value at `now`.
    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.fetched_at.map(|at| now.saturating_duration_since(at))
    }

    /// Check if a fetch is in progress for this entry.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Check if the entry was marked stale by invalidation.
    pub fn is_marked_stale(&self) -> bool {
        self.marked_stale
    }

    /// A value is fresh if present, younger than `ttl`, and not invalidated.
    pub fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        if self.value.is_none() || self.marked_stale {
            return false;
        }
        self.age(now).is_some_and(|age| age < ttl)
    }

    pub(crate) fn in_flight_token(&self) -> Option<u64> {
        self.in_flight.as_ref().map(|f| f.token)
    }

    /// Replace the value, stamp it, and drop any in-flight marker.
    pub(crate) fn store(&mut self, value: T, now: Instant) {
        self.value = Some(value);
        self.revision += 1;
        self.fetched_at = Some(now);
        self.marked_stale = false;
        self.in_flight = None;
    }

    /// Mutate the value in place, keeping its timestamp.
    pub(crate) fn modify<F: FnOnce(&mut T)>(&mut self, f: F) -> bool {
        match self.value.as_mut() {
            Some(value) => {
                f(value);
                self.revision += 1;
                true
            }
            None => false,
        }
    }

    /// Forget the value. Returns `true` if there was one.
    pub(crate) fn clear(&mut self) -> bool {
        self.revision += 1;
        self.fetched_at = None;
        self.marked_stale = false;
        self.value.take().is_some()
    }

    /// Keep the value for fallback but drop its freshness.
    pub(crate) fn mark_stale(&mut self) -> bool {
        if self.value.is_none() || self.marked_stale {
            return false;
        }
        self.marked_stale = true;
        true
    }

    pub(crate) fn detach_in_flight(&mut self) -> bool {
        self.in_flight.take().is_some()
    }
}

impl<T: Clone> CacheEntry<T> {
    /// The value to serve when a refresh failed, if it is within `window`.
    pub(crate) fn stale_fallback(&self, now: Instant, window: Option<Duration>) -> Option<T> {
        let value = self.value.as_ref()?;
        match (window, self.age(now)) {
            (Some(window), Some(age)) if age > window => None,
            _ => Some(value.clone()),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for CacheEntry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("value", &self.value)
            .field("fetched_at", &self.fetched_at)
            .field("marked_stale", &self.marked_stale)
            .field("revision", &self.revision)
            .field("in_flight", &self.in_flight_token())
            .finish()
    }
}
