//! Optimistic mutations with exact rollback.
//!
//! A mutation applies its local change to an [`AuthoritativeList`] before the
//! remote call is awaited, then either confirms it with the server's answer and
//! runs the invalidation rules, or restores the list to its snapshot.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use lms_cache::ResourceCache;
use lms_data::FetchError;
use lms_domain::{entity_key, Entity};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::bus::InvalidationBus;
use crate::error::MutationError;
use crate::list::AuthoritativeList;
use crate::mutation::{MutationContext, MutationKind};

type Transform<T> = Box<dyn FnOnce(&mut Vec<T>) + Send>;
type Confirm<T, R> = Box<dyn FnOnce(&mut Vec<T>, &R) + Send>;

/// A local change to an authoritative list and how to settle it.
pub struct Mutation<T, R> {
    kind: MutationKind,
    context: MutationContext,
    entity: Option<String>,
    apply: Transform<T>,
    confirm: Confirm<T, R>,
    rollback: Option<Transform<T>>,
}

impl<T, R> fmt::Debug for Mutation<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutation")
            .field("kind", &self.kind)
            .field("context", &self.context)
            .field("entity", &self.entity)
            .field("custom_rollback", &self.rollback.is_some())
            .finish()
    }
}

impl<T: Send + 'static, R: 'static> Mutation<T, R> {
    /// A mutation applying `apply` locally and doing nothing on confirmation.
    pub fn new<F>(kind: MutationKind, apply: F) -> Self
    where
        F: FnOnce(&mut Vec<T>) + Send + 'static,
    {
        Self {
            kind,
            context: MutationContext::default(),
            entity: None,
            apply: Box::new(apply),
            confirm: Box::new(|_, _| {}),
            rollback: None,
        }
    }

    /// Ids passed to the invalidation rules.
    pub fn with_context(mut self, context: MutationContext) -> Self {
        self.context = context;
        self
    }

    /// Name the entity this mutation writes. Only one mutation per entity may
    /// be in flight.
    pub fn for_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Reconcile the list with the server's answer.
    pub fn on_success<F>(mut self, confirm: F) -> Self
    where
        F: FnOnce(&mut Vec<T>, &R) + Send + 'static,
    {
        self.confirm = Box::new(confirm);
        self
    }

    /// Undo the local change on failure.
    ///
    /// If nothing else changed the list meanwhile, the result is checked
    /// against the snapshot taken before the change and the snapshot wins if
    /// they differ. Otherwise `rollback` runs alone, so it must only touch
    /// this mutation's records.
    pub fn on_rollback<F>(mut self, rollback: F) -> Self
    where
        F: FnOnce(&mut Vec<T>) + Send + 'static,
    {
        self.rollback = Some(Box::new(rollback));
        self
    }

    /// The mutation kind.
    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    /// The invalidation context.
    pub fn context(&self) -> &MutationContext {
        &self.context
    }
}

impl<T: Entity + Clone + Send + 'static> Mutation<T, T> {
    /// Append `placeholder` (carrying a temporary id) and swap it for the
    /// server's record once confirmed.
    pub fn create(kind: MutationKind, placeholder: T) -> Self {
        let index = usize::MAX;
        Self::insert_at(kind, index, placeholder)
    }

    /// Insert `placeholder` at `index` (clamped to the list length) and swap it
    /// for the server's record once confirmed.
    pub fn insert_at(kind: MutationKind, index: usize, placeholder: T) -> Self {
        let temporary = placeholder.id();
        Self::new(kind, move |items: &mut Vec<T>| {
            let index = index.min(items.len());
            items.insert(index, placeholder);
        })
        .for_entity(entity_key::<T>(temporary))
        .on_success(move |items, confirmed: &T| swap_confirmed(items, temporary, confirmed))
        .on_rollback(move |items| items.retain(|item| item.id() != temporary))
    }

    /// Change the record `id` with `patch`, then swap in the server's version
    /// once confirmed. Rollback puts the record's previous state back.
    pub fn patch<F>(kind: MutationKind, id: T::Id, patch: F) -> Self
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        let original: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
        let slot = original.clone();
        Self::new(kind, move |items: &mut Vec<T>| {
            if let Some(item) = items.iter_mut().find(|item| item.id() == id) {
                *slot.lock() = Some(item.clone());
                patch(item);
            }
        })
        .for_entity(entity_key::<T>(id))
        .on_success(move |items, confirmed: &T| swap_confirmed(items, id, confirmed))
        .on_rollback(move |items| {
            let Some(original) = original.lock().take() else {
                return;
            };
            if let Some(item) = items.iter_mut().find(|item| item.id() == id) {
                *item = original;
            }
        })
    }

    /// Replace the record with `record`'s id by `record`, then by the server's
    /// version once confirmed.
    pub fn replace(kind: MutationKind, record: T) -> Self {
        let id = record.id();
        Self::patch(kind, id, move |item| *item = record)
    }

    /// Flip a field of the record `id` with `flip`; rollback flips it back.
    pub fn toggle<F>(kind: MutationKind, id: T::Id, flip: F) -> Self
    where
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        let flip = Arc::new(flip);
        let unflip = flip.clone();
        Self::new(kind, move |items: &mut Vec<T>| {
            if let Some(item) = items.iter_mut().find(|item| item.id() == id) {
                (*flip)(item);
            }
        })
        .for_entity(entity_key::<T>(id))
        .on_success(move |items, confirmed: &T| swap_confirmed(items, id, confirmed))
        .on_rollback(move |items| {
            if let Some(item) = items.iter_mut().find(|item| item.id() == id) {
                (*unflip)(item);
            }
        })
    }
}

impl<T: Entity + Send + 'static, R: 'static> Mutation<T, R> {
    /// Remove the record `id`; rollback re-inserts it at its original index.
    pub fn remove(kind: MutationKind, id: T::Id) -> Self {
        let removed: Arc<Mutex<Option<(usize, T)>>> = Arc::new(Mutex::new(None));
        let slot = removed.clone();
        Self::new(kind, move |items: &mut Vec<T>| {
            if let Some(index) = items.iter().position(|item| item.id() == id) {
                *slot.lock() = Some((index, items.remove(index)));
            }
        })
        .for_entity(entity_key::<T>(id))
        .on_rollback(move |items| {
            if let Some((index, item)) = removed.lock().take() {
                items.insert(index.min(items.len()), item);
            }
        })
    }
}

fn swap_confirmed<T: Entity + Clone>(items: &mut Vec<T>, local: T::Id, confirmed: &T) {
    match items.iter_mut().find(|item| item.id() == local) {
        Some(item) => *item = confirmed.clone(),
        None => items.push(confirmed.clone()),
    }
}

/// An optimistic change applied to a list, with what it takes to undo it.
///
/// If the list is still at the version the change left it in, undoing
/// restores the snapshot taken just before the change. If other mutations
/// wrote to the list since, only this mutation's own rollback runs so their
/// changes survive; a mutation without one falls back to the snapshot.
///
/// Dropping the record before it is committed undoes the change, so a
/// mutation future dropped while awaiting its remote call is undone too.
struct OptimisticMutationRecord<'a, T: Clone + PartialEq> {
    kind: MutationKind,
    list: &'a AuthoritativeList<T>,
    before: Option<Vec<T>>,
    applied: u64,
    rollback: Option<Transform<T>>,
}

impl<'a, T: Clone + PartialEq> OptimisticMutationRecord<'a, T> {
    fn apply(
        kind: MutationKind,
        list: &'a AuthoritativeList<T>,
        apply: Transform<T>,
        rollback: Option<Transform<T>>,
    ) -> Self {
        let (before, applied) = list.update_versioned(|items, _| {
            let before = items.clone();
            apply(items);
            before
        });
        Self {
            kind,
            list,
            before: Some(before),
            applied,
            rollback,
        }
    }

    fn commit(mut self) {
        self.before = None;
    }

    fn roll_back(mut self) {
        self.undo();
    }

    fn undo(&mut self) {
        let Some(before) = self.before.take() else {
            return;
        };
        let (kind, applied) = (self.kind, self.applied);
        let rollback = self.rollback.take();

        self.list.update_versioned(|items, version| match rollback {
            Some(rollback) if version != applied => {
                debug!(mutation = %kind, "list changed since the optimistic change, undoing it alone");
                rollback(items);
            }
            Some(rollback) => {
                rollback(items);
                if *items != before {
                    warn!(mutation = %kind, "rollback did not restore the snapshot, restoring it");
                    *items = before;
                }
            }
            None => {
                if version != applied {
                    warn!(mutation = %kind, "list changed since the optimistic change, restoring the snapshot");
                }
                *items = before;
            }
        });
    }
}

impl<T: Clone + PartialEq> Drop for OptimisticMutationRecord<'_, T> {
    fn drop(&mut self) {
        if self.before.is_some() {
            warn!(mutation = %self.kind, "mutation abandoned before completion, rolling back");
            self.undo();
        }
    }
}

/// Marks an entity as having a mutation in flight.
struct PendingClaim {
    pending: Arc<Mutex<HashSet<String>>>,
    entity: Option<String>,
}

impl Drop for PendingClaim {
    fn drop(&mut self) {
        if let Some(entity) = self.entity.take() {
            self.pending.lock().remove(&entity);
        }
    }
}

/// Applies optimistic mutations and triggers invalidation on success.
#[derive(Debug, Clone)]
pub struct OptimisticMutator {
    bus: Arc<InvalidationBus>,
    pending: Arc<Mutex<HashSet<String>>>,
}

impl OptimisticMutator {
    /// Create a mutator notifying `bus`.
    pub fn new(bus: Arc<InvalidationBus>) -> Self {
        Self {
            bus,
            pending: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// The invalidation bus.
    pub fn bus(&self) -> &InvalidationBus {
        &self.bus
    }

    /// Check if a mutation of `entity` is in flight.
    pub fn is_pending(&self, entity: &str) -> bool {
        self.pending.lock().contains(entity)
    }

    /// Apply `mutation` to `list`, await `remote`, then confirm or roll back.
    ///
    /// On success the list holds the confirmed records and the invalidation
    /// rules for the mutation kind have run. On failure the list is exactly
    /// what it was before the call, no invalidation happens, and the error is
    /// classified for display.
    pub async fn mutate<T, R, F, Fut>(
        &self,
        list: &AuthoritativeList<T>,
        mutation: Mutation<T, R>,
        remote: F,
    ) -> Result<R, MutationError>
    where
        T: Clone + PartialEq,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, FetchError>>,
    {
        let Mutation {
            kind,
            context,
            entity,
            apply,
            confirm,
            rollback,
        } = mutation;

        let _claim = self.claim(kind, entity)?;
        let record = OptimisticMutationRecord::apply(kind, list, apply, rollback);
        debug!(mutation = %kind, "applied optimistic change");

        match remote().await {
            Ok(confirmed) => {
                list.update(|items| confirm(items, &confirmed));
                record.commit();
                let report = self.bus.on_mutation_succeeded(kind, &context);
                info!(
                    mutation = %kind,
                    invalidated = report.entries(),
                    "mutation confirmed"
                );
                Ok(confirmed)
            }
            Err(err) => {
                record.roll_back();
                let err = MutationError::remote(kind, err);
                warn!(mutation = %kind, error = %err, "mutation failed, rolled back");
                Err(err)
            }
        }
    }

    /// Optimistically change the cached value for `key`, await `remote`, then
    /// run the invalidation rules or restore the previous value.
    ///
    /// Nothing is applied locally if the key holds no value.
    pub async fn mutate_cached<K, T, R, F, Fut>(
        &self,
        cache: &ResourceCache<K, T>,
        key: K,
        kind: MutationKind,
        context: MutationContext,
        transform: impl FnOnce(&mut T),
        remote: F,
    ) -> Result<R, MutationError>
    where
        K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, FetchError>>,
    {
        let entity = format!("{}:{:?}", cache.name(), key);
        let _claim = self.claim(kind, Some(entity))?;

        let before = cache.peek(&key);
        let revision = match before {
            Some(_) => cache.update_tracked(&key, transform),
            None => None,
        };
        let mut restore = CachedValueRestore {
            cache,
            key: &key,
            before: before.zip(revision),
        };

        match remote().await {
            Ok(confirmed) => {
                restore.before = None;
                let report = self.bus.on_mutation_succeeded(kind, &context);
                info!(
                    mutation = %kind,
                    cache = cache.name(),
                    invalidated = report.entries(),
                    "mutation confirmed"
                );
                Ok(confirmed)
            }
            Err(err) => {
                drop(restore);
                let err = MutationError::remote(kind, err);
                warn!(mutation = %kind, cache = cache.name(), error = %err, "mutation failed, rolled back");
                Err(err)
            }
        }
    }

    fn claim(&self, kind: MutationKind, entity: Option<String>) -> Result<PendingClaim, MutationError> {
        if let Some(entity) = &entity {
            let mut pending = self.pending.lock();
            if !pending.insert(entity.clone()) {
                debug!(mutation = %kind, entity = %entity, "refusing concurrent mutation");
                return Err(MutationError::Pending {
                    kind,
                    entity: entity.clone(),
                });
            }
        }
        Ok(PendingClaim {
            pending: self.pending.clone(),
            entity,
        })
    }
}

/// Puts a cached value back unless disarmed by clearing `before`.
///
/// The value is only put back over the optimistic one: if the entry was
/// refetched, written or cleared since, it is left alone.
struct CachedValueRestore<'a, K, T>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    cache: &'a ResourceCache<K, T>,
    key: &'a K,
    before: Option<(T, u64)>,
}

impl<K, T> Drop for CachedValueRestore<'_, K, T>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Some((before, revision)) = self.before.take() {
            if !self.cache.restore_if_unchanged(self.key, revision, before) {
                debug!(cache = self.cache.name(), key = ?self.key, "cached value changed since the optimistic write, keeping it");
            }
        }
    }
}
