//! KeyRegistry: bidirectional key <-> KeyId mapping with a monotonic id counter.

use core::borrow::Borrow;
use hashbrown::HashMap;
use std::collections::btree_map::{self, BTreeMap};

/// Stable integer surrogate for a key value. Never reused.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct KeyId(u64);

impl KeyId {
    pub(crate) const FIRST: KeyId = KeyId(1);

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }

    fn next(self) -> KeyId {
        KeyId(self.0 + 1)
    }
}

#[derive(Clone, Debug)]
pub struct KeyRegistry<K> {
    forward: BTreeMap<K, KeyId>,
    reverse: HashMap<KeyId, K>,
    next_id: KeyId,
}

impl<K> KeyRegistry<K> {
    pub fn new() -> Self {
        Self {
            forward: BTreeMap::new(),
            reverse: HashMap::new(),
            next_id: KeyId::FIRST,
        }
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Id the next newly registered key will receive.
    pub fn next_id(&self) -> KeyId {
        self.next_id
    }

    /// Canonical key for an id, if that id is live.
    pub fn key(&self, id: KeyId) -> Option<&K> {
        self.reverse.get(&id)
    }

    /// Keys in their natural order.
    pub fn keys(&self) -> btree_map::Keys<'_, K, KeyId> {
        self.forward.keys()
    }

    pub(crate) fn forward_iter(&self) -> btree_map::Iter<'_, K, KeyId> {
        self.forward.iter()
    }

    pub(crate) fn reverse_len(&self) -> usize {
        self.reverse.len()
    }
}

impl<K> Default for KeyRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Clone> KeyRegistry<K> {
    pub fn lookup<Q>(&self, q: &Q) -> Option<KeyId>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.forward.get(q).copied()
    }

    /// Returns the id for `key`, assigning the next counter value if the key
    /// is not registered yet.
    ///
    /// `K: Ord` runs only while locating the slot and `K: Clone` runs before
    /// either map is written, so a panic from either leaves the registry
    /// untouched.
    pub fn register(&mut self, key: K) -> KeyId {
        match self.forward.entry(key) {
            btree_map::Entry::Occupied(o) => *o.get(),
            btree_map::Entry::Vacant(v) => {
                let id = self.next_id;
                let reverse_key = v.key().clone();
                v.insert(id);
                let prev = self.reverse.insert(id, reverse_key);
                debug_assert!(prev.is_none(), "KeyId {id:?} assigned twice");
                self.next_id = id.next();
                id
            }
        }
    }

    /// Removes both directions for `id` and returns the owned key.
    ///
    /// The forward removal is the only step that calls `K: Ord`, and it runs
    /// first; a panic there leaves both maps untouched.
    ///
    /// Panics if `id` is not registered: callers only unregister ids whose
    /// last entry they are about to remove.
    pub fn unregister(&mut self, id: KeyId) -> K {
        let reverse_key = self
            .reverse
            .get(&id)
            .unwrap_or_else(|| panic!("unregister of unknown KeyId {id:?}"));
        let removed = self.forward.remove(reverse_key);
        debug_assert_eq!(removed, Some(id), "forward/reverse registry maps diverged");
        let key = self
            .reverse
            .remove(&id)
            .expect("reverse entry was present above");
        tracing::trace!(key_id = id.get(), "retired key id");
        key
    }
}
