//! Interned identifiers and the token arena.
//!
//! Events, labels and roles are opaque strings at the API boundary but are
//! interned into dense `u32` ids on graph construction. All relation tables,
//! markings and matrices are keyed by these ids, so the hot paths never touch
//! a string.
//!
//! # Determinism
//! - Ids are assigned in insertion order and never reused.
//! - Iteration over an `Interner` is by ascending id, which is therefore the
//!   crate-wide deterministic iteration order over events.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Dense identifier for an event within one graph.
///
/// `EventId(u32)` is `Copy`, `Eq`, `Ord`, `Hash`. The inner value is an index
/// into the owning graph's event arena; ids from different graphs must not be
/// mixed.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(u32);

/// Dense identifier for an observable activity label.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelId(u32);

/// Dense identifier for an actor role.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(u32);

macro_rules! id_impls {
    ($ty:ident) => {
        impl $ty {
            /// Creates an id from a raw `u32` index.
            ///
            /// The caller must ensure the index is valid for the arena that
            /// will resolve it; prefer the graph builder's interning methods.
            #[inline]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Returns the raw `u32` index.
            #[inline]
            pub const fn as_u32(&self) -> u32 {
                self.0
            }

            /// Returns the raw index widened to `usize` for table lookups.
            #[inline]
            pub const fn index(&self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($ty), "({})"), self.0)
            }
        }
    };
}

id_impls!(EventId);
id_impls!(LabelId);
id_impls!(RoleId);

/// Insertion-ordered string interner.
///
/// Backing storage is a flat `Vec<String>`; the reverse index maps a name to
/// its id. Interning an already-known name returns the existing id.
///
/// # Invariants
/// - `names[index[n] as usize] == n` for every interned name `n`.
/// - Ids are contiguous in `0..len`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interner {
    names: Vec<String>,
    index: HashMap<String, u32>,
}

impl Interner {
    /// Creates an empty interner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `name`, returning its id. Idempotent.
    pub fn intern(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = self.names.len() as u32;
        self.names.push(name.to_owned());
        self.index.insert(name.to_owned(), id);
        id
    }

    /// Looks up the id of `name` without interning.
    pub fn get(&self, name: &str) -> Option<u32> {
        self.index.get(name).copied()
    }

    /// Resolves an id back to its name.
    ///
    /// # Panics
    /// Panics if `id` was not produced by this interner.
    pub fn name(&self, id: u32) -> &str {
        &self.names[id as usize]
    }

    /// Number of interned names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True if nothing has been interned.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterates `(raw_id, name)` pairs in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, n)| (i as u32, n.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let mut arena = Interner::new();
        let a = arena.intern("Approve");
        let b = arena.intern("Reject");
        assert_ne!(a, b);
        assert_eq!(arena.intern("Approve"), a);
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.name(a), "Approve");
        assert_eq!(arena.get("Reject"), Some(b));
        assert_eq!(arena.get("Review"), None);
    }

    #[test]
    fn iteration_follows_insertion_order() {
        let mut arena = Interner::new();
        for name in ["c", "a", "b"] {
            arena.intern(name);
        }
        let order: Vec<_> = arena.iter().map(|(_, n)| n).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn id_display() {
        assert_eq!(EventId::new(7).to_string(), "EventId(7)");
        assert_eq!(EventId::new(7).index(), 7);
    }
}
