//! Cache key fingerprints.

use serde::{Deserialize, Serialize};

/// Fingerprint addressing one cached query of a resource.
///
/// Listings are keyed by `All` or by a scoping name (e.g. a category slug);
/// single records by their numeric id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Fingerprint {
    /// The unscoped query.
    #[default]
    All,
    /// A numeric resource id.
    Id(i64),
    /// A named scope (category, filter, user handle).
    Name(String),
    /// Several components, e.g. category + page.
    Composite(Vec<String>),
}

impl Fingerprint {
    /// The unscoped fingerprint.
    pub fn all() -> Self {
        Self::All
    }

    /// Fingerprint for a numeric id.
    pub fn id(id: i64) -> Self {
        Self::Id(id)
    }

    /// Fingerprint for a named scope.
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Fingerprint from ordered components.
    pub fn composite<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Composite(parts.into_iter().map(Into::into).collect())
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Id(id) => write!(f, "{}", id),
            Self::Name(name) => write!(f, "{}", name),
            Self::Composite(parts) => write!(f, "{}", parts.join(":")),
        }
    }
}

impl From<i64> for Fingerprint {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for Fingerprint {
    fn from(name: &str) -> Self {
        if name == "all" {
            Self::All
        } else {
            Self::Name(name.to_string())
        }
    }
}

impl From<String> for Fingerprint {
    fn from(name: String) -> Self {
        Self::from(name.as_str())
    }
}
