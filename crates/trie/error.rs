use primitive_types::H256;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrieError {
    #[error("malformed path: {0}")]
    BadPath(&'static str),
    #[error("path expects a {expected} but the trie holds a {found}")]
    BudLeafConflict {
        expected: &'static str,
        found: &'static str,
    },
    #[error("corrupt cell at index {index}: {reason}")]
    CorruptNode { index: u64, reason: String },
    #[error("leaf value {0:#x} is missing from the leaf store")]
    MissingLeaf(H256),
    #[error("cell array full: {needed} more cells needed, {available} available")]
    OutOfSpace { needed: u64, available: u64 },
    #[error("root {0:#x} is not in the root table")]
    RootNotFound(H256),
    #[error("invalid context file: {0}")]
    InvalidFile(String),
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
}
