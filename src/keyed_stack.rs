//! KeyedStack: the public value type. Handles share one `SharedState`
//! through an `Rc` and fork it on first write.
//!
//! Forking protocol
//! - Before mutating, or before lending `&mut V` into the state, a handle
//!   needs true exclusivity: it must be the only handle on its state
//!   (`Rc::strong_count == 1`) and must not have lent a mutable reference
//!   into that state since it last forked (`exclusive_alias`). If either
//!   condition fails, the state is deep-copied and the handle repoints to
//!   the copy.
//! - Lending `&mut V` clears `exclusive_alias`; it stays clear until the
//!   next fork. A handle with the flag clear is copied by forking rather
//!   than sharing.
//! - `clear` drops the old state outright and never forks.

use crate::error::StackError;
use crate::key_registry::{KeyId, KeyRegistry};
use crate::order_sequence;
use crate::shared_state::SharedState;
use core::borrow::Borrow;
use core::fmt;
use std::collections::btree_map;
use std::rc::Rc;

pub struct KeyedStack<K, V> {
    state: Rc<SharedState<K, V>>,
    exclusive_alias: bool,
}

impl<K, V> KeyedStack<K, V> {
    pub fn new() -> Self {
        Self {
            state: Rc::new(SharedState::new()),
            exclusive_alias: true,
        }
    }

    /// Total number of elements across all keys.
    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Resets to an empty stack. Never copies the old contents.
    pub fn clear(&mut self) {
        tracing::trace!(entries = self.state.len(), "clearing keyed stack");
        self.state = Rc::new(SharedState::new());
        self.exclusive_alias = true;
    }

    /// Whether `self` and `other` currently read from the same shared state.
    pub fn shares_state_with(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    /// Distinct keys currently present, in ascending order.
    pub fn keys(&self) -> Keys<'_, K> {
        Keys {
            inner: self.state.registry().keys(),
        }
    }

    #[cfg(test)]
    pub(crate) fn shared_state(&self) -> &SharedState<K, V> {
        &self.state
    }

    /// All elements from the top of the stack to the bottom.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            registry: self.state.registry(),
            entries: self.state.order().iter().rev(),
        }
    }
}

impl<K, V> Default for KeyedStack<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Clone, V> KeyedStack<K, V> {
    /// Number of elements stored under `key`; 0 if absent.
    pub fn count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.state.count(key)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.state.lookup(key).is_some()
    }

    /// The most recently pushed element.
    pub fn top(&self) -> Result<(&K, &V), StackError> {
        self.state.top().ok_or(StackError::EmptyStack)
    }

    /// The most recently pushed value under `key`.
    pub fn top_of<Q>(&self, key: &Q) -> Result<&V, StackError>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.state.top_of(key).ok_or(StackError::KeyNotFound)
    }
}

impl<K: Ord + Clone, V: Clone> KeyedStack<K, V> {
    /// Forks the shared state unless this handle already has true exclusivity.
    fn make_exclusive(&mut self) {
        let shared = Rc::strong_count(&self.state) > 1;
        let aliased = !self.exclusive_alias;
        if shared || aliased {
            tracing::trace!(
                entries = self.state.len(),
                shared,
                aliased,
                "forking keyed stack state"
            );
            self.state = Rc::new(self.state.fork());
            self.exclusive_alias = true;
        }
    }

    fn exclusive_state(&mut self) -> &mut SharedState<K, V> {
        self.make_exclusive();
        Rc::get_mut(&mut self.state).expect("state is unshared after make_exclusive")
    }

    /// Like `exclusive_state`, for callers about to hand `&mut V` out.
    fn lend_state(&mut self) -> &mut SharedState<K, V> {
        self.make_exclusive();
        self.exclusive_alias = false;
        Rc::get_mut(&mut self.state).expect("state is unshared after make_exclusive")
    }

    /// Pushes `value` under `key` on top of the stack.
    ///
    /// If `K: Ord` or `K: Clone` panics, the stack is left as it was.
    pub fn push(&mut self, key: K, value: V) {
        self.exclusive_state().push(key, value);
    }

    /// Removes the top element and returns it.
    pub fn pop(&mut self) -> Result<(K, V), StackError> {
        if self.is_empty() {
            return Err(StackError::EmptyStack);
        }
        self.exclusive_state().pop().ok_or(StackError::EmptyStack)
    }

    /// Removes the most recent element under `key` and returns its value.
    pub fn pop_key<Q>(&mut self, key: &Q) -> Result<V, StackError>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        if !self.contains_key(key) {
            return Err(StackError::KeyNotFound);
        }
        self.exclusive_state()
            .pop_key(key)
            .ok_or(StackError::KeyNotFound)
    }

    /// Mutable access to the top element's value.
    ///
    /// After this call the next copy of `self` forks instead of sharing.
    pub fn top_mut(&mut self) -> Result<(&K, &mut V), StackError> {
        if self.is_empty() {
            return Err(StackError::EmptyStack);
        }
        self.lend_state().top_mut().ok_or(StackError::EmptyStack)
    }

    /// Mutable access to the most recent value under `key`.
    pub fn top_of_mut<Q>(&mut self, key: &Q) -> Result<&mut V, StackError>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        if !self.contains_key(key) {
            return Err(StackError::KeyNotFound);
        }
        self.lend_state()
            .top_of_mut(key)
            .ok_or(StackError::KeyNotFound)
    }
}

impl<K: Clone, V: Clone> Clone for KeyedStack<K, V> {
    /// Shares the state when no mutable reference has escaped from it;
    /// otherwise hands the copy a fork of its own.
    fn clone(&self) -> Self {
        let state = if self.exclusive_alias {
            Rc::clone(&self.state)
        } else {
            tracing::trace!(
                entries = self.state.len(),
                "forking keyed stack state for aliased copy"
            );
            Rc::new(self.state.fork())
        };
        Self {
            state,
            exclusive_alias: true,
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for KeyedStack<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<K: PartialEq, V: PartialEq> PartialEq for KeyedStack<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.shares_state_with(other)
            || (self.len() == other.len() && self.iter().eq(other.iter()))
    }
}

impl<K: Eq, V: Eq> Eq for KeyedStack<K, V> {}

impl<K: Ord + Clone, V: Clone> Extend<(K, V)> for KeyedStack<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        let state = self.exclusive_state();
        for (k, v) in iter {
            state.push(k, v);
        }
    }
}

impl<K: Ord + Clone, V: Clone> FromIterator<(K, V)> for KeyedStack<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut s = Self::new();
        s.extend(iter);
        s
    }
}

impl<'a, K, V> IntoIterator for &'a KeyedStack<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the distinct keys of a `KeyedStack`, ascending.
///
/// Cloning restarts from the clone point.
pub struct Keys<'a, K> {
    inner: btree_map::Keys<'a, K, KeyId>,
}

impl<K> Clone for Keys<'_, K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<'a, K> Iterator for Keys<'a, K> {
    type Item = &'a K;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K> DoubleEndedIterator for Keys<'_, K> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl<K> ExactSizeIterator for Keys<'_, K> {}

impl<K> core::iter::FusedIterator for Keys<'_, K> {}

/// Iterator over `(key, value)` from the top of the stack to the bottom.
pub struct Iter<'a, K, V> {
    registry: &'a KeyRegistry<K>,
    entries: core::iter::Rev<order_sequence::Iter<'a, V>>,
}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry,
            entries: self.entries.clone(),
        }
    }
}

impl<'a, K, V> Iter<'a, K, V> {
    fn resolve(registry: &'a KeyRegistry<K>, e: &'a order_sequence::Entry<V>) -> (&'a K, &'a V) {
        let key = registry
            .key(e.key_id)
            .expect("every live entry's key id is registered");
        (key, &e.value)
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let registry = self.registry;
        self.entries.next().map(|(_h, e)| Self::resolve(registry, e))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let registry = self.registry;
        self.entries
            .next_back()
            .map(|(_h, e)| Self::resolve(registry, e))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> core::iter::FusedIterator for Iter<'_, K, V> {}
