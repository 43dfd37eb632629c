//! keyed-stack: a single-threaded LIFO stack of key/value pairs with
//! per-key push, pop and top, and copy-on-write value semantics.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: copies of a `KeyedStack` behave as independent values while a
//!   copy that is only read never pays for a deep copy.
//! - Layers:
//!   - KeyRegistry<K>: `BTreeMap<K, KeyId>` plus its reverse map and a
//!     monotonic id counter. Keys are compared here and nowhere else.
//!   - OrderSequence<V>: every entry in push order, as a doubly linked
//!     list inside a slotmap arena with stable, generational handles.
//!   - KeyIndex: per-KeyId LIFO list of entry handles.
//!   - SharedState<K, V>: the three above, kept mutually consistent; the
//!     unit that is shared between handles or forked wholesale.
//!   - KeyedStack<K, V>: public handle holding `Rc<SharedState>` and the
//!     `exclusive_alias` flag that drives the forking protocol.
//!
//! Constraints
//! - Single-threaded: `!Send`/`!Sync` via `Rc`.
//! - O(1) copy, push, pop, `len`; O(log k) for operations that look a key
//!   up, where k is the number of distinct keys.
//! - A fork costs O(n) and happens only when a sibling handle exists or a
//!   mutable reference has been lent out since the last fork.
//!
//! Unwind safety
//! - `K: Ord` and `K: Clone` may panic. Mutating operations call into them
//!   only before the first structural write (a removal retires its key id
//!   before unlinking the entry), and forks are built aside before being
//!   swapped in, so a panic leaves the stack unchanged.
//!
//! Key ids
//! - Every distinct key value gets a `KeyId` from a counter starting at 1.
//!   Ids are never reused, even after the key's last element is removed;
//!   the per-key index is keyed by this cheap integer instead of `K`.
//!
//! Notes and non-goals
//! - Not a persistent data structure: sharing is all-or-nothing at the
//!   level of the whole state.
//! - No thread-safe variant.

mod error;
mod key_index;
mod key_registry;
mod keyed_stack;
#[cfg(test)]
mod keyed_stack_proptest;
mod order_sequence;
mod shared_state;

// Public surface
pub use error::StackError;
pub use keyed_stack::{Iter, KeyedStack, Keys};

// Internal benchmarking hook.
#[cfg(feature = "bench_internal")]
pub use shared_state::{InvariantViolation, SharedState};
