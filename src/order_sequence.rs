//! OrderSequence: push-ordered entries as a doubly linked list in a slot arena.
//!
//! Handles are generational slotmap keys, so a handle stays valid across
//! unrelated appends and removals and never resolves to a later entry that
//! happens to reuse its slot.

use crate::key_registry::KeyId;
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Stable position of one entry in an `OrderSequence`.
    pub struct EntryHandle;
}

#[derive(Clone, Debug)]
pub struct Entry<V> {
    pub key_id: KeyId,
    pub value: V,
}

#[derive(Clone, Debug)]
struct Node<V> {
    entry: Entry<V>,
    prev: Option<EntryHandle>,
    next: Option<EntryHandle>,
}

#[derive(Clone, Debug)]
pub struct OrderSequence<V> {
    slots: SlotMap<EntryHandle, Node<V>>,
    head: Option<EntryHandle>,
    tail: Option<EntryHandle>,
}

impl<V> OrderSequence<V> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: SlotMap::with_capacity_and_key(capacity),
            head: None,
            tail: None,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Appends at the tail and returns the new entry's handle.
    pub fn append(&mut self, key_id: KeyId, value: V) -> EntryHandle {
        let prev = self.tail;
        let h = self.slots.insert(Node {
            entry: Entry { key_id, value },
            prev,
            next: None,
        });
        match prev {
            Some(p) => self.slots[p].next = Some(h),
            None => self.head = Some(h),
        }
        self.tail = Some(h);
        h
    }

    /// Unlinks and returns the entry at `h`; `None` for a stale handle.
    pub fn remove(&mut self, h: EntryHandle) -> Option<Entry<V>> {
        let node = self.slots.remove(h)?;
        match node.prev {
            Some(p) => self.slots[p].next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(n) => self.slots[n].prev = node.prev,
            None => self.tail = node.prev,
        }
        Some(node.entry)
    }

    pub fn tail_handle(&self) -> Option<EntryHandle> {
        self.tail
    }

    pub fn tail(&self) -> Option<&Entry<V>> {
        self.tail.map(|h| &self.slots[h].entry)
    }

    pub fn tail_mut(&mut self) -> Option<&mut Entry<V>> {
        let h = self.tail?;
        Some(&mut self.slots[h].entry)
    }

    pub fn get(&self, h: EntryHandle) -> Option<&Entry<V>> {
        self.slots.get(h).map(|n| &n.entry)
    }

    pub fn get_mut(&mut self, h: EntryHandle) -> Option<&mut Entry<V>> {
        self.slots.get_mut(h).map(|n| &mut n.entry)
    }

    /// Entries from the oldest (bottom) to the most recent (top).
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            slots: &self.slots,
            front: self.head,
            back: self.tail,
            remaining: self.slots.len(),
        }
    }
}

impl<V> Default for OrderSequence<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over `(handle, entry)` in push order; reversible.
pub struct Iter<'a, V> {
    slots: &'a SlotMap<EntryHandle, Node<V>>,
    front: Option<EntryHandle>,
    back: Option<EntryHandle>,
    remaining: usize,
}

impl<V> Clone for Iter<'_, V> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots,
            front: self.front,
            back: self.back,
            remaining: self.remaining,
        }
    }
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (EntryHandle, &'a Entry<V>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let h = self.front?;
        let node = &self.slots[h];
        self.front = node.next;
        self.remaining -= 1;
        Some((h, &node.entry))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> DoubleEndedIterator for Iter<'_, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let h = self.back?;
        let node = &self.slots[h];
        self.back = node.prev;
        self.remaining -= 1;
        Some((h, &node.entry))
    }
}

impl<V> ExactSizeIterator for Iter<'_, V> {}

impl<V> core::iter::FusedIterator for Iter<'_, V> {}
