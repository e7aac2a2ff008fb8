use core::fmt;

/// Errors surfaced by trie operations.
///
/// CAS races never show up here: the engine retries them internally, so every
/// call either produces a definite answer or one of these variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrieError {
    /// Strict lookup of a key that is not in the map.
    NotFound,
    /// An internal invariant was violated. Indicates a logic defect.
    IllegalState(&'static str),
    /// The operation is deliberately not offered by this container.
    Unsupported(&'static str),
}

impl fmt::Display for TrieError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrieError::NotFound => write!(f, "Key not found"),
            TrieError::IllegalState(what) => write!(f, "Illegal trie state: {}", what),
            TrieError::Unsupported(op) => write!(f, "Unsupported operation: {}", op),
        }
    }
}

impl core::error::Error for TrieError {}

/// Aborts on a broken invariant.
#[cold]
#[track_caller]
pub(crate) fn fatal(err: TrieError) -> ! {
    log::error!("{}", err);
    panic!("{}", err)
}
