/// Size of a page in bytes. Every node must fit in one page.
pub const PAGE_SIZE: usize = 4096;

/// The node header: node type (2B) followed by the key count (2B).
pub const HEADER_SIZE: usize = 4;

/// Size of one child pointer slot.
pub const POINTER_SIZE: usize = 8;

/// Size of one entry in the cumulative offset table.
pub const OFFSET_SIZE: usize = 2;

/// Length prefix of a KV entry: klen (2B) followed by vlen (2B).
pub const KV_HEADER_SIZE: usize = 4;

/// Maximum length of a key, in bytes. Together with
/// MAX_VALUE_SIZE it guarantees that a node holding a single entry always fits
/// in a page, so an overflowing node never has to be split more than three ways.
pub const MAX_KEY_SIZE: usize = 1000;

/// Maximum length of a value, in bytes.
pub const MAX_VALUE_SIZE: usize = 3000;

/// A child whose size drops to this many bytes or less after a delete is a
/// candidate for merging with one of its siblings.
pub const MERGE_THRESHOLD: usize = PAGE_SIZE / 4;

/// A stamp that identifies a file as a page file written by this crate.
/// There's nothing special about this value other than that it is easily
/// recognizable, and it will reflect any byte order mismatches.
pub const MAGIC_KEY: u32 = 0xBADC0DE;

/// The data file format version.
pub const VERSION: u32 = 1;

/// Number of pages a new page file is created with.
pub const DEFAULT_INITIAL_PAGES: u64 = 16;
