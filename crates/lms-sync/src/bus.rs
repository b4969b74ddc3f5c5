//! Cross-resource invalidation after successful mutations.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use lms_cache::ResourceCache;
use serde::Serialize;
use tracing::debug;

use crate::mutation::{MutationContext, MutationKind};

/// What to do to an affected cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationAction {
    /// Drop values; the next read fetches.
    Clear,
    /// Drop freshness but keep values as stale fallbacks.
    MarkStale,
}

/// A cache (or part of one) that invalidation rules can target.
pub trait InvalidationTarget: Send + Sync {
    /// Name used in logs and reports.
    fn target_name(&self) -> &str;

    /// Apply `action`; returns the number of entries that changed.
    fn apply(&self, action: InvalidationAction, context: &MutationContext) -> usize;
}

impl<K, T> InvalidationTarget for ResourceCache<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn target_name(&self) -> &str {
        self.name()
    }

    fn apply(&self, action: InvalidationAction, _context: &MutationContext) -> usize {
        match action {
            InvalidationAction::Clear => self.invalidate_all(),
            InvalidationAction::MarkStale => self.mark_all_stale(),
        }
    }
}

/// Targets the single key derivable from the mutation context, or the whole
/// cache when no key can be derived.
pub struct KeyedTarget<K, T, F> {
    cache: ResourceCache<K, T>,
    derive_key: F,
}

impl<K, T, F> KeyedTarget<K, T, F> {
    /// Create a keyed target.
    pub fn new(cache: ResourceCache<K, T>, derive_key: F) -> Self {
        Self { cache, derive_key }
    }
}

impl<K, T, F> InvalidationTarget for KeyedTarget<K, T, F>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    F: Fn(&MutationContext) -> Option<K> + Send + Sync,
{
    fn target_name(&self) -> &str {
        self.cache.name()
    }

    fn apply(&self, action: InvalidationAction, context: &MutationContext) -> usize {
        let Some(key) = (self.derive_key)(context) else {
            return self.cache.apply(action, context);
        };
        let changed = match action {
            InvalidationAction::Clear => self.cache.invalidate(&key),
            InvalidationAction::MarkStale => self.cache.mark_stale(&key),
        };
        usize::from(changed)
    }
}

struct RuleTarget {
    target: Arc<dyn InvalidationTarget>,
    action: InvalidationAction,
}

/// The caches affected by one mutation kind.
pub struct InvalidationRule {
    kind: MutationKind,
    targets: Vec<RuleTarget>,
}

impl InvalidationRule {
    fn new(kind: MutationKind) -> Self {
        Self {
            kind,
            targets: Vec::new(),
        }
    }

    /// Clear every entry of `cache`.
    pub fn clear<C: InvalidationTarget + Clone + 'static>(self, cache: &C) -> Self {
        self.target(Arc::new(cache.clone()), InvalidationAction::Clear)
    }

    /// Mark every entry of `cache` stale.
    pub fn mark_stale<C: InvalidationTarget + Clone + 'static>(self, cache: &C) -> Self {
        self.target(Arc::new(cache.clone()), InvalidationAction::MarkStale)
    }

    /// Clear the entry of `cache` whose key `derive_key` extracts from the context.
    pub fn clear_key<K, T, F>(self, cache: &ResourceCache<K, T>, derive_key: F) -> Self
    where
        K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
        F: Fn(&MutationContext) -> Option<K> + Send + Sync + 'static,
    {
        self.target(
            Arc::new(KeyedTarget::new(cache.clone(), derive_key)),
            InvalidationAction::Clear,
        )
    }

    /// Add an arbitrary target.
    pub fn target(mut self, target: Arc<dyn InvalidationTarget>, action: InvalidationAction) -> Self {
        self.targets.push(RuleTarget { target, action });
        self
    }

    /// The mutation kind this rule belongs to.
    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    /// Names of the affected caches, in declaration order.
    pub fn affected(&self) -> Vec<&str> {
        self.targets.iter().map(|t| t.target.target_name()).collect()
    }
}

impl fmt::Debug for InvalidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvalidationRule")
            .field("kind", &self.kind)
            .field("affected", &self.affected())
            .finish()
    }
}

/// Outcome of one invalidation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationReport {
    /// `(cache, action, entries changed)` per affected target.
    pub touched: Vec<(String, InvalidationAction, usize)>,
}

impl InvalidationReport {
    /// Total entries changed.
    pub fn entries(&self) -> usize {
        self.touched.iter().map(|(_, _, n)| n).sum()
    }

    /// Check if `cache` was among the targets.
    pub fn touched(&self, cache: &str) -> bool {
        self.touched.iter().any(|(name, _, _)| name == cache)
    }
}

/// Registry of invalidation rules, fixed at construction.
#[derive(Debug, Default)]
pub struct InvalidationBus {
    rules: HashMap<MutationKind, InvalidationRule>,
}

/// Builder for [`InvalidationBus`].
#[derive(Default)]
pub struct InvalidationBusBuilder {
    rules: HashMap<MutationKind, InvalidationRule>,
}

impl InvalidationBusBuilder {
    /// Declare the rule for `kind`. Declaring a kind twice extends its rule.
    pub fn on<F>(mut self, kind: MutationKind, build: F) -> Self
    where
        F: FnOnce(InvalidationRule) -> InvalidationRule,
    {
        let rule = self
            .rules
            .remove(&kind)
            .unwrap_or_else(|| InvalidationRule::new(kind));
        self.rules.insert(kind, build(rule));
        self
    }

    /// Freeze the rules.
    pub fn build(self) -> InvalidationBus {
        InvalidationBus { rules: self.rules }
    }
}

impl InvalidationBus {
    /// Start declaring rules.
    pub fn builder() -> InvalidationBusBuilder {
        InvalidationBusBuilder::default()
    }

    /// The rule for `kind`, if any.
    pub fn rule(&self, kind: MutationKind) -> Option<&InvalidationRule> {
        self.rules.get(&kind)
    }

    /// Apply the rule for a mutation that succeeded server-side.
    ///
    /// Idempotent: invalidating already-empty caches changes nothing.
    pub fn on_mutation_succeeded(
        &self,
        kind: MutationKind,
        context: &MutationContext,
    ) -> InvalidationReport {
        let Some(rule) = self.rules.get(&kind) else {
            debug!(mutation = %kind, "no invalidation rule");
            return InvalidationReport::default();
        };

        let touched = rule
            .targets
            .iter()
            .map(|t| {
                let changed = t.target.apply(t.action, context);
                debug!(
                    mutation = %kind,
                    cache = t.target.target_name(),
                    action = ?t.action,
                    changed,
                    "invalidated"
                );
                (t.target.target_name().to_string(), t.action, changed)
            })
            .collect();

        InvalidationReport { touched }
    }
}
