//! Synchronization layer configuration.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::logging::LogConfig;
use crate::resource::ResourceKind;

/// What to do with a fetch result that arrives after its key was invalidated
/// mid-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LateResultPolicy {
    /// Store the result anyway (last writer wins for the key).
    #[default]
    Store,
    /// Invalidation detaches the in-flight fetch; its result reaches its
    /// waiters but is not stored.
    Discard,
}

/// Per-resource overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceOverride {
    /// Freshness window in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
    /// Fetch timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Serve stale values when a refresh fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_on_error: Option<bool>,
}

/// Effective settings for one resource type.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSettings {
    /// Resource name.
    pub name: String,
    /// Freshness window.
    pub ttl: Duration,
    /// Fetch timeout (`None` = unbounded).
    pub timeout: Option<Duration>,
    /// Serve stale values when a refresh fails.
    pub stale_on_error: bool,
    /// Handling of results that arrive after mid-flight invalidation.
    pub late_results: LateResultPolicy,
}

/// Configuration file for the synchronization layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Default fetch timeout in milliseconds, applied when a resource has no
    /// override. Falls back to the resource kind's default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_timeout_ms: Option<u64>,

    /// Serve stale values when a refresh fails.
    #[serde(default = "default_true")]
    pub stale_on_error: bool,

    /// Handling of late fetch results.
    #[serde(default)]
    pub late_results: LateResultPolicy,

    /// Per-resource overrides, keyed by resource name.
    #[serde(default)]
    pub resources: HashMap<String, ResourceOverride>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LogConfig,
}

fn default_true() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: None,
            stale_on_error: true,
            late_results: LateResultPolicy::default(),
            resources: HashMap::new(),
            logging: LogConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Load config from a file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        if path.ends_with(".json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path))
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path))
        }
    }

    /// Save config to a file.
    pub fn save(&self, path: &str) -> Result<()> {
        let content = if path.ends_with(".json") {
            serde_json::to_string_pretty(self)?
        } else {
            toml::to_string_pretty(self)?
        };

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path))
    }

    /// Override the TTL of one resource type.
    pub fn with_ttl(mut self, kind: ResourceKind, ttl: Duration) -> Self {
        self.resources
            .entry(kind.name().to_string())
            .or_default()
            .ttl_secs = Some(ttl.as_secs());
        self
    }

    /// Set the late result policy.
    pub fn with_late_results(mut self, policy: LateResultPolicy) -> Self {
        self.late_results = policy;
        self
    }

    /// Resolve the effective settings for a resource type.
    pub fn settings_for(&self, kind: ResourceKind) -> ResourceSettings {
        let overrides = self.resources.get(kind.name());

        let ttl = overrides
            .and_then(|o| o.ttl_secs)
            .map(Duration::from_secs)
            .unwrap_or_else(|| kind.default_ttl());

        let timeout = overrides
            .and_then(|o| o.timeout_ms)
            .or(self.fetch_timeout_ms)
            .map(Duration::from_millis)
            .unwrap_or_else(|| kind.default_timeout());

        let stale_on_error = overrides
            .and_then(|o| o.stale_on_error)
            .unwrap_or(self.stale_on_error);

        ResourceSettings {
            name: kind.name().to_string(),
            ttl,
            // A zero timeout means "no timeout".
            timeout: (!timeout.is_zero()).then_some(timeout),
            stale_on_error,
            late_results: self.late_results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_resource_kind() {
        let config = SyncConfig::default();
        let settings = config.settings_for(ResourceKind::CourseDetail);

        assert_eq!(settings.name, "course_detail");
        assert_eq!(settings.ttl, Duration::from_secs(600));
        assert_eq!(settings.timeout, Some(Duration::from_secs(10)));
        assert!(settings.stale_on_error);
        assert_eq!(settings.late_results, LateResultPolicy::Store);
    }

    #[test]
    fn test_overrides_win() {
        let mut config = SyncConfig::default().with_ttl(ResourceKind::Enrollments, Duration::from_secs(30));
        config.fetch_timeout_ms = Some(2500);
        config.resources.insert(
            "users".to_string(),
            ResourceOverride {
                ttl_secs: None,
                timeout_ms: Some(0),
                stale_on_error: Some(false),
            },
        );

        let enrollments = config.settings_for(ResourceKind::Enrollments);
        assert_eq!(enrollments.ttl, Duration::from_secs(30));
        assert_eq!(enrollments.timeout, Some(Duration::from_millis(2500)));

        let users = config.settings_for(ResourceKind::Users);
        assert_eq!(users.ttl, Duration::from_secs(300));
        assert_eq!(users.timeout, None);
        assert!(!users.stale_on_error);
    }

    #[test]
    fn test_parse_toml() {
        let config: SyncConfig = toml::from_str(
            r#"
            late_results = "discard"

            [resources.course_listing]
            ttl_secs = 60

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        assert!(config.stale_on_error);
        assert_eq!(config.late_results, LateResultPolicy::Discard);
        assert_eq!(
            config.settings_for(ResourceKind::CourseListing).ttl,
            Duration::from_secs(60)
        );
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let config = SyncConfig::default().with_ttl(ResourceKind::OverallStats, Duration::from_secs(90));

        for file in ["sync.toml", "sync.json"] {
            let path = dir.path().join(file);
            let path = path.to_str().unwrap();
            config.save(path).unwrap();
            assert_eq!(SyncConfig::load(path).unwrap(), config);
        }
    }

    #[test]
    fn test_load_missing_file_has_context() {
        let err = SyncConfig::load("/nonexistent/sync.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
