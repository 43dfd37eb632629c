use thiserror::Error;

/// Errors returned by `KeyedStack` accessors and removals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum StackError {
    /// `pop`/`top` on a stack with no elements.
    #[error("stack is empty")]
    EmptyStack,
    /// `pop_key`/`top_of` for a key with no elements.
    #[error("no element with the given key")]
    KeyNotFound,
}
