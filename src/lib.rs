/*!
A copy-on-write B+tree over fixed size pages.

Nodes are encoded into 4096 byte pages and never modified once stored. Every
insert or delete rebuilds the path from the affected leaf to the root as new
pages, splitting nodes that outgrow a page and merging nodes that shrink below
a quarter of one, and then installs the new root. Pages are resolved through a
`PageStore`; an in-memory store and a memory mapped file store are provided.

```rust
use cowtree::{BTree, MemoryPageStore};

let mut tree = BTree::new(MemoryPageStore::new());
tree.insert(b"hello", b"world").unwrap();
assert_eq!(tree.get(b"hello").unwrap(), Some(b"world".to_vec()));
assert!(tree.delete(b"hello").unwrap());
```
*/
#![deny(missing_docs,
        missing_debug_implementations,
        missing_copy_implementations,
        unused_extern_crates,
        unused_import_braces,
        unused_allocation)]
#![warn(unused_qualifications)]

#[macro_use]
extern crate log;

/// Page and node size limits, and the page file format constants.
pub mod constants;
/// Errors returned by the crate.
pub mod errors;
/// Page ids and page buffers.
pub mod page;
pub mod enc;
pub mod node;
pub mod lookup;
pub mod builder;
pub mod store;
pub mod mmap_store;
pub mod tree;

pub use crate::errors::{Error, Result};
pub use crate::mmap_store::{MmapPageStore, StoreSettings};
pub use crate::node::{Node, NodeType};
pub use crate::page::{PageId, NULL_PAGE};
pub use crate::store::{MemoryPageStore, PageStore};
pub use crate::tree::{BTree, TreeSettings};
