//! Caller-owned authoritative collections the UI renders from.

use std::fmt;
use std::sync::Arc;

use lms_domain::Entity;
use parking_lot::Mutex;

/// Shared handle to an ordered list of records.
///
/// Every change is applied synchronously under the list's lock, so no task
/// can observe a half-applied update. Each change bumps the list's version.
pub struct AuthoritativeList<T> {
    inner: Arc<Mutex<Versioned<T>>>,
}

struct Versioned<T> {
    items: Vec<T>,
    version: u64,
}

impl<T> Clone for AuthoritativeList<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for AuthoritativeList<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T: fmt::Debug> fmt::Debug for AuthoritativeList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.inner.lock().items.iter()).finish()
    }
}

impl<T> AuthoritativeList<T> {
    /// Create a list holding `items`.
    pub fn new(items: Vec<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Versioned { items, version: 0 })),
        }
    }

    /// Read the items.
    pub fn read<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.inner.lock().items)
    }

    /// Apply a change to the items.
    pub fn update<R>(&self, f: impl FnOnce(&mut Vec<T>) -> R) -> R {
        self.update_versioned(|items, _| f(items)).0
    }

    /// Apply a change to the items. `f` also gets the version the list had
    /// before this change; the version after it is returned alongside.
    pub fn update_versioned<R>(&self, f: impl FnOnce(&mut Vec<T>, u64) -> R) -> (R, u64) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let out = f(&mut inner.items, inner.version);
        inner.version += 1;
        (out, inner.version)
    }

    /// Replace all items, e.g. with a freshly resolved listing.
    pub fn replace_all(&self, items: Vec<T>) {
        self.update(|current| *current = items);
    }

    /// Number of changes applied so far.
    pub fn version(&self) -> u64 {
        self.inner.lock().version
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Check if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> AuthoritativeList<T> {
    /// Copy the current items.
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.lock().items.clone()
    }
}

impl<T: Entity + Clone> AuthoritativeList<T> {
    /// Find a record by id.
    pub fn find(&self, id: T::Id) -> Option<T> {
        self.inner.lock().items.iter().find(|item| item.id() == id).cloned()
    }

    /// Position of a record by id.
    pub fn position(&self, id: T::Id) -> Option<usize> {
        self.inner.lock().items.iter().position(|item| item.id() == id)
    }

    /// Ids in list order.
    pub fn ids(&self) -> Vec<T::Id> {
        self.inner.lock().items.iter().map(Entity::id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lms_domain::{User, UserId};

    fn users() -> AuthoritativeList<User> {
        AuthoritativeList::new(vec![
            User::new(UserId::new(1), "Ada", "ada@example.com"),
            User::new(UserId::new(2), "Grace", "grace@example.com"),
        ])
    }

    #[test]
    fn test_lookup() {
        let list = users();
        assert_eq!(list.position(UserId::new(2)), Some(1));
        assert_eq!(list.find(UserId::new(1)).map(|u| u.name), Some("Ada".to_string()));
        assert_eq!(list.find(UserId::new(3)), None);
        assert_eq!(list.ids(), vec![UserId::new(1), UserId::new(2)]);
    }

    #[test]
    fn test_handles_share_items() {
        let list = users();
        let view = list.clone();
        list.update(|items| items.remove(0));
        assert_eq!(view.len(), 1);

        view.replace_all(Vec::new());
        assert!(list.is_empty());
    }

    #[test]
    fn test_every_change_bumps_version() {
        let list = users();
        assert_eq!(list.version(), 0);
        list.read(|items| items.len());
        assert_eq!(list.version(), 0);

        list.update(|items| items.truncate(1));
        let (before, after) = list.update_versioned(|_, before| before);
        assert_eq!((before, after), (1, 2));
        list.replace_all(Vec::new());
        assert_eq!(list.version(), 3);
    }
}
