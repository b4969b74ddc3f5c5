//! Per-resource cache policies.

use std::time::Duration;

use lms_core::{LateResultPolicy, ResourceKind, ResourceSettings};
use serde::{Deserialize, Serialize};

/// How a resolved value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Fresh cache hit, no fetch.
    Hit,
    /// This call started the fetch.
    Miss,
    /// Joined a fetch already in flight for the key.
    Coalesced,
    /// The refresh failed and a previous value was served.
    Stale,
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hit => write!(f, "HIT"),
            Self::Miss => write!(f, "MISS"),
            Self::Coalesced => write!(f, "COALESCED"),
            Self::Stale => write!(f, "STALE"),
        }
    }
}

/// Freshness and failure policy of one resource cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Time-to-live of a fetched value.
    pub ttl: Duration,
    /// Upper bound on a single fetch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    /// Serve the previous value when a refresh fails transiently.
    pub stale_on_error: bool,
    /// Maximum age of a value served as a stale fallback (unbounded if unset).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_if_error: Option<Duration>,
    /// What to do with results that arrive after mid-flight invalidation.
    pub late_results: LateResultPolicy,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(5 * 60))
    }
}

impl CachePolicy {
    /// Create a policy with the given TTL, stale-on-error on, no timeout.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            timeout: None,
            stale_on_error: true,
            stale_if_error: None,
            late_results: LateResultPolicy::Store,
        }
    }

    /// Create a policy from a resource kind's defaults.
    pub fn for_kind(kind: ResourceKind) -> Self {
        Self::new(kind.default_ttl()).with_timeout(kind.default_timeout())
    }

    /// Create a policy from resolved configuration settings.
    pub fn from_settings(settings: &ResourceSettings) -> Self {
        Self {
            ttl: settings.ttl,
            timeout: settings.timeout,
            stale_on_error: settings.stale_on_error,
            stale_if_error: None,
            late_results: settings.late_results,
        }
    }

    /// Set the fetch timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Bound the age of stale fallbacks.
    pub fn with_stale_if_error(mut self, window: Duration) -> Self {
        self.stale_if_error = Some(window);
        self
    }

    /// Propagate refresh failures even when a previous value exists.
    pub fn without_stale_on_error(mut self) -> Self {
        self.stale_on_error = false;
        self
    }

    /// Set the late result policy.
    pub fn with_late_results(mut self, policy: LateResultPolicy) -> Self {
        self.late_results = policy;
        self
    }
}
