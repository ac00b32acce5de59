use std::io;

use thiserror::Error;

use crate::page::PageId;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the tree, the node codec and the page stores.
#[derive(Debug, Error)]
pub enum Error {
    /// The empty key is reserved for the sentinel of the leftmost leaf.
    #[error("Empty keys are reserved and cannot be stored.")]
    EmptyKey,
    /// A key longer than `MAX_KEY_SIZE`.
    #[error("Key of {0} bytes exceeds the maximum key size.")]
    KeyTooLarge(usize),
    /// A value longer than `MAX_VALUE_SIZE`.
    #[error("Value of {0} bytes exceeds the maximum value size.")]
    ValueTooLarge(usize),
    /// A page id that was never allocated or has been freed.
    #[error("Page {0} not found.")]
    PageNotFound(PageId),
    /// The page store cannot hold any more pages.
    #[error("Page store capacity exceeded.")]
    CapacityExceeded,
    /// Content handed to a page store is larger than a page.
    #[error("Page content of {0} bytes exceeds the page size.")]
    PageTooLarge(usize),
    /// The node type field of a page holds an unknown discriminant.
    #[error("Invalid node type {0}.")]
    InvalidNodeType(u16),
    /// The header or offset table of a page does not describe a valid node.
    #[error("Corrupted node: {0}.")]
    CorruptedNode(&'static str),
    /// No page file exists at the given path and auto creation is disabled.
    #[error("No valid page file found at the given path.")]
    DatabaseNotFound,
    /// The meta page of a page file is not in the expected format.
    #[error("Invalid page file. The meta page magic or page size does not match.")]
    DatabaseInvalid,
    /// The page file was written with a different format version.
    #[error("Version mismatch. The page file was created with a different format version.")]
    DatabaseVersionMismatch,
    /// A write was attempted on a store opened in read-only mode.
    #[error("The page store is read-only.")]
    ReadOnly,
    /// A wrapper around the IO error
    #[error("{0}")]
    Io(#[from] io::Error),
}
