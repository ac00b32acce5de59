//! Key lookup within a single node.
//!
//! Key 0 of the leftmost node on every level is a sentinel that sorts before
//! any stored key, so descent never has to handle "smaller than everything".
use crate::node::Node;

/// Returns the largest index `i` such that `key(i) <= key`, or 0 if there is
/// none. Index 0 is never compared; it is the fallback for keys that sort
/// before every other key in the node.
pub fn lookup_le(node: &Node, key: &[u8]) -> u16 {
    // Binary search for the first index in 1..nkeys whose key is greater.
    let mut lo = 1u16;
    let mut hi = node.key_count();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if node.key(mid) <= key {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo.saturating_sub(1)
}

/// Returns the index of the entry whose key equals `key`, if any.
pub fn lookup_eq(node: &Node, key: &[u8]) -> Option<u16> {
    if node.key_count() == 0 {
        return None;
    }
    let idx = lookup_le(node, key);
    if node.key(idx) == key { Some(idx) } else { None }
}
