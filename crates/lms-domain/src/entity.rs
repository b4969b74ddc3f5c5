//! Identity of records held in authoritative lists.

use std::fmt;
use std::hash::Hash;

/// A record addressable by id.
pub trait Entity {
    /// Identifier type.
    type Id: Copy + Eq + Hash + fmt::Display + fmt::Debug + Send + Sync + 'static;

    /// Entity name used in logs and pending-mutation keys.
    const KIND: &'static str;

    /// The record's id.
    fn id(&self) -> Self::Id;

    /// Key naming this record across entity types, e.g. `enrollment:12`.
    fn entity_key(&self) -> String {
        entity_key::<Self>(self.id())
    }
}

/// Build the entity key for an id of `E`.
pub fn entity_key<E: Entity + ?Sized>(id: E::Id) -> String {
    format!("{}:{}", E::KIND, id)
}
