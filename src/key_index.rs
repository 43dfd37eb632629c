//! KeyIndex: per-key LIFO lists of `EntryHandle`s into the order sequence.

use crate::key_registry::KeyId;
use crate::order_sequence::EntryHandle;
use hashbrown::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("no entries indexed for key id {}", .0.get())]
    KeyNotPresent(KeyId),
}

/// Lists are stored oldest-first; the last handle is the key's top. A key
/// whose list becomes empty is dropped from the map.
#[derive(Clone, Debug, Default)]
pub struct KeyIndex {
    lists: HashMap<KeyId, Vec<EntryHandle>>,
}

impl KeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(keys: usize) -> Self {
        Self {
            lists: HashMap::with_capacity(keys),
        }
    }

    pub fn push(&mut self, id: KeyId, h: EntryHandle) {
        self.lists.entry(id).or_default().push(h);
    }

    /// Removes and returns the most recent handle for `id`.
    pub fn pop_top(&mut self, id: KeyId) -> Result<EntryHandle, IndexError> {
        let list = self
            .lists
            .get_mut(&id)
            .ok_or(IndexError::KeyNotPresent(id))?;
        let h = list.pop().ok_or(IndexError::KeyNotPresent(id))?;
        if list.is_empty() {
            self.lists.remove(&id);
        }
        Ok(h)
    }

    pub fn top(&self, id: KeyId) -> Option<EntryHandle> {
        self.lists.get(&id).and_then(|l| l.last().copied())
    }

    pub fn len(&self, id: KeyId) -> usize {
        self.lists.get(&id).map_or(0, Vec::len)
    }

    /// Number of keys with at least one entry.
    pub fn key_count(&self) -> usize {
        self.lists.len()
    }

    /// Sum of all list lengths.
    pub fn total(&self) -> usize {
        self.lists.values().map(Vec::len).sum()
    }

    pub(crate) fn lists(&self) -> impl Iterator<Item = (KeyId, &[EntryHandle])> + '_ {
        self.lists.iter().map(|(id, l)| (*id, l.as_slice()))
    }
}
