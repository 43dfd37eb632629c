//! SharedState: registry + order sequence + per-key index, the unit that
//! `KeyedStack` handles share and fork.
//!
//! Structural invariants, checked by `check_invariants`:
//! - the order sequence and the index hold the same number of entries;
//! - a key id is registered iff it has at least one indexed entry;
//! - every indexed handle is live and carries its list's key id, in push order;
//! - forward and reverse registry maps are inverses, and every id is below
//!   the counter.
//!
//! Every mutating method keeps them and runs all user code (`K: Ord`,
//! `K: Clone`) before the first structural write, including the key
//! retirement done when a key's last entry is removed.

use crate::key_index::KeyIndex;
use crate::key_registry::{KeyId, KeyRegistry};
use crate::order_sequence::{EntryHandle, OrderSequence};
use core::borrow::Borrow;
use thiserror::Error;

/// Describes the first broken structural invariant found by
/// `SharedState::check_invariants`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("order sequence holds {entries} entries but the index holds {indexed}")]
    LengthMismatch { entries: usize, indexed: usize },
    #[error("{registered} keys registered but {indexed} keys indexed")]
    KeyCountMismatch { registered: usize, indexed: usize },
    #[error("key id {0} indexed but not registered")]
    UnregisteredKey(u64),
    #[error("key id {0} has a dangling or mismatched entry handle")]
    BadHandle(u64),
    #[error("forward and reverse registry maps disagree on key id {0}")]
    RegistryMismatch(u64),
    #[error("key id {0} is not below the next id counter")]
    IdFromFuture(u64),
}

#[derive(Debug)]
pub struct SharedState<K, V> {
    registry: KeyRegistry<K>,
    order: OrderSequence<V>,
    index: KeyIndex,
}

impl<K, V> SharedState<K, V> {
    pub fn new() -> Self {
        Self {
            registry: KeyRegistry::new(),
            order: OrderSequence::new(),
            index: KeyIndex::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub(crate) fn registry(&self) -> &KeyRegistry<K> {
        &self.registry
    }

    pub(crate) fn order(&self) -> &OrderSequence<V> {
        &self.order
    }

    fn canonical_key(&self, id: KeyId) -> &K {
        self.registry
            .key(id)
            .expect("every live entry's key id is registered")
    }

    pub fn top(&self) -> Option<(&K, &V)> {
        let e = self.order.tail()?;
        Some((self.canonical_key(e.key_id), &e.value))
    }

    pub fn top_mut(&mut self) -> Option<(&K, &mut V)> {
        let e = self.order.tail_mut()?;
        let key = self
            .registry
            .key(e.key_id)
            .expect("every live entry's key id is registered");
        Some((key, &mut e.value))
    }

    fn top_handle_of(&self, id: KeyId) -> EntryHandle {
        self.index
            .top(id)
            .expect("a registered key has at least one indexed entry")
    }
}

impl<K, V> Default for SharedState<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Clone, V> SharedState<K, V> {
    pub fn lookup<Q>(&self, q: &Q) -> Option<KeyId>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.registry.lookup(q)
    }

    pub fn count<Q>(&self, q: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.lookup(q).map_or(0, |id| self.index.len(id))
    }

    pub fn push(&mut self, key: K, value: V) {
        // Registration is the only step that calls into K; once it returns,
        // the rest cannot fail short of an allocation abort.
        let id = self.registry.register(key);
        let h = self.order.append(id, value);
        self.index.push(id, h);
    }

    /// Removes the most recent entry and returns it.
    pub fn pop(&mut self) -> Option<(K, V)> {
        let h = self.order.tail_handle()?;
        let id = self.order.get(h)?.key_id;
        // Clone the key before any write if it outlives this pop.
        let kept = if self.index.len(id) > 1 {
            Some(self.canonical_key(id).clone())
        } else {
            None
        };
        let (retired, value) = self.remove_indexed(id, h);
        let key = retired
            .or(kept)
            .expect("popped key is either retired or still registered");
        Some((key, value))
    }

    /// Removes the most recent entry for `q` and returns its value.
    pub fn pop_key<Q>(&mut self, q: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let id = self.registry.lookup(q)?;
        let h = self.top_handle_of(id);
        let (_retired, value) = self.remove_indexed(id, h);
        Some(value)
    }

    pub fn top_of<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let id = self.registry.lookup(q)?;
        let h = self.top_handle_of(id);
        self.order.get(h).map(|e| &e.value)
    }

    pub fn top_of_mut<Q>(&mut self, q: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let id = self.registry.lookup(q)?;
        let h = self.top_handle_of(id);
        self.order.get_mut(h).map(|e| &mut e.value)
    }

    /// Removes the entry at `h` (which must be the top handle for its key)
    /// and retires the key id if that was its last entry.
    ///
    /// Retirement calls `K: Ord`, so it happens before the index and the
    /// order sequence are touched.
    fn remove_indexed(&mut self, id: KeyId, h: EntryHandle) -> (Option<K>, V) {
        let retired = if self.index.len(id) == 1 {
            Some(self.registry.unregister(id))
        } else {
            None
        };
        let popped = self
            .index
            .pop_top(id)
            .expect("a registered key has at least one indexed entry");
        debug_assert_eq!(popped, h, "index top does not match the removed entry");
        let entry = self
            .order
            .remove(h)
            .expect("indexed handles refer to live entries");
        (retired, entry.value)
    }

    /// Checks the structural invariants and reports the first violation found.
    #[cfg_attr(not(any(test, feature = "bench_internal")), allow(dead_code))]
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let indexed = self.index.total();
        if indexed != self.order.len() {
            return Err(InvariantViolation::LengthMismatch {
                entries: self.order.len(),
                indexed,
            });
        }
        if self.registry.len() != self.index.key_count()
            || self.registry.reverse_len() != self.registry.len()
        {
            return Err(InvariantViolation::KeyCountMismatch {
                registered: self.registry.len(),
                indexed: self.index.key_count(),
            });
        }
        for (id, handles) in self.index.lists() {
            if self.registry.key(id).is_none() {
                return Err(InvariantViolation::UnregisteredKey(id.get()));
            }
            for &h in handles {
                match self.order.get(h) {
                    Some(e) if e.key_id == id => {}
                    _ => return Err(InvariantViolation::BadHandle(id.get())),
                }
            }
            // Lists are oldest-first, so handles must follow push order.
            let in_order = self
                .order
                .iter()
                .filter(|(_h, e)| e.key_id == id)
                .map(|(h, _e)| h)
                .eq(handles.iter().copied());
            if !in_order {
                return Err(InvariantViolation::BadHandle(id.get()));
            }
        }
        for (key, &id) in self.registry.forward_iter() {
            if self.registry.key(id) != Some(key) {
                return Err(InvariantViolation::RegistryMismatch(id.get()));
            }
            if id >= self.registry.next_id() {
                return Err(InvariantViolation::IdFromFuture(id.get()));
            }
        }
        Ok(())
    }
}

impl<K: Clone, V: Clone> SharedState<K, V> {
    /// Deep copy with fresh entry handles and the same id counter.
    ///
    /// The copy is built aside; a panic from `K: Clone` or `V: Clone` leaves
    /// `self` untouched.
    pub fn fork(&self) -> Self {
        let mut order = OrderSequence::with_capacity(self.order.len());
        let mut index = KeyIndex::with_capacity(self.index.key_count());
        for (_h, e) in self.order.iter() {
            let h = order.append(e.key_id, e.value.clone());
            index.push(e.key_id, h);
        }
        Self {
            registry: self.registry.clone(),
            order,
            index,
        }
    }
}
