use crate::constants::PAGE_SIZE;

/// A page number in the page store.
pub type PageId = u64;

/// Page id that is never minted by a store. A tree whose root is `NULL_PAGE`
/// is empty.
pub const NULL_PAGE: PageId = 0;

/// Allocate a zeroed page sized buffer.
pub fn zeroed() -> Box<[u8]> {
    vec![0u8; PAGE_SIZE].into_boxed_slice()
}
