//! Copy-on-write node construction.
//!
//! Every function here writes into a destination node owned by the caller and
//! only reads its sources. A node is edited by building a new one from ranges
//! of the old one plus the changed entries; the old node is left untouched for
//! anyone still reading it.
//!
//! The header of the destination is written first, then entries strictly in
//! index order: each offset is the running sum of the entries before it.
use crate::constants::*;
use crate::enc;
use crate::node::{Node, NodeType};

/// Copies `count` entries of `src` starting at `src_start` into `dst` starting
/// at `dst_start`, child pointers included. Entries before `dst_start` must
/// already be written.
pub fn append_range(dst: &mut Node, src: &Node, dst_start: u16, src_start: u16, count: u16) {
    assert!(src_start + count <= src.key_count(),
            "source range {}+{} out of range for {} keys",
            src_start,
            count,
            src.key_count());
    assert!(dst_start + count <= dst.key_count(),
            "destination range {}+{} out of range for {} keys",
            dst_start,
            count,
            dst.key_count());
    if count == 0 {
        return;
    }

    for i in 0..count {
        dst.set_ptr(dst_start + i, src.ptr(src_start + i));
    }

    // offsets, rebased onto the destination's running offset
    let dst_begin = dst.offset(dst_start);
    let src_begin = src.offset(src_start);
    for i in 1..=count {
        let offset = dst_begin + (src.offset(src_start + i) - src_begin);
        dst.set_offset(dst_start + i, offset);
    }

    // the KVs themselves are contiguous in both nodes
    let begin = src.kv_pos(src_start);
    let end = src.kv_pos(src_start + count);
    let at = dst.kv_pos(dst_start);
    dst.as_bytes_mut()[at..at + (end - begin)].copy_from_slice(&src.as_bytes()[begin..end]);
}

/// Writes one entry at `idx` and the offset of the entry after it.
pub fn append_kv(dst: &mut Node, idx: u16, ptr: u64, key: &[u8], val: &[u8]) {
    debug_assert!(key.len() <= MAX_KEY_SIZE);
    debug_assert!(val.len() <= MAX_VALUE_SIZE);

    dst.set_ptr(idx, ptr);

    let pos = dst.kv_pos(idx);
    {
        let buf = dst.as_bytes_mut();
        enc::encode_u16(buf, pos, key.len() as u16);
        enc::encode_u16(buf, pos + 2, val.len() as u16);
        let data = pos + KV_HEADER_SIZE;
        buf[data..data + key.len()].copy_from_slice(key);
        buf[data + key.len()..data + key.len() + val.len()].copy_from_slice(val);
    }

    let next = dst.offset(idx) as usize + KV_HEADER_SIZE + key.len() + val.len();
    dst.set_offset(idx + 1, next as u16);
}

/// A leaf equal to `src` with `key`/`val` inserted at `idx`.
pub fn leaf_insert(dst: &mut Node, src: &Node, idx: u16, key: &[u8], val: &[u8]) {
    let n = src.key_count();
    dst.set_header(NodeType::Leaf, n + 1);
    append_range(dst, src, 0, 0, idx);
    append_kv(dst, idx, 0, key, val);
    append_range(dst, src, idx + 1, idx, n - idx);
}

/// A leaf equal to `src` with the value of entry `idx` replaced.
pub fn leaf_update(dst: &mut Node, src: &Node, idx: u16, key: &[u8], val: &[u8]) {
    let n = src.key_count();
    dst.set_header(NodeType::Leaf, n);
    append_range(dst, src, 0, 0, idx);
    append_kv(dst, idx, 0, key, val);
    append_range(dst, src, idx + 1, idx + 1, n - idx - 1);
}

/// A node of the same type as `src` with entry `idx` removed.
pub fn node_delete(dst: &mut Node, src: &Node, idx: u16) {
    let n = src.key_count();
    dst.set_header(src.node_type(), n - 1);
    append_range(dst, src, 0, 0, idx);
    append_range(dst, src, idx, idx + 1, n - idx - 1);
}

/// An internal node equal to `src` with the child at `idx` replaced by
/// `kids`, each given as its page id and first key.
pub fn replace_kids<K: AsRef<[u8]>>(dst: &mut Node, src: &Node, idx: u16, kids: &[(u64, K)]) {
    let n = src.key_count();
    let inc = kids.len() as u16;
    dst.set_header(NodeType::Internal, n + inc - 1);
    append_range(dst, src, 0, 0, idx);
    for (i, (ptr, key)) in kids.iter().enumerate() {
        append_kv(dst, idx + i as u16, *ptr, key.as_ref(), &[]);
    }
    append_range(dst, src, idx + inc, idx + 1, n - idx - 1);
}

/// An internal node equal to `src` with the children at `idx` and `idx + 1`
/// replaced by the single child `ptr`, whose first key is `key`.
pub fn replace_two_kids(dst: &mut Node, src: &Node, idx: u16, ptr: u64, key: &[u8]) {
    let n = src.key_count();
    dst.set_header(NodeType::Internal, n - 1);
    append_range(dst, src, 0, 0, idx);
    append_kv(dst, idx, ptr, key, &[]);
    append_range(dst, src, idx + 1, idx + 2, n - idx - 2);
}

/// Concatenates two sibling nodes of the same type.
pub fn merge(dst: &mut Node, left: &Node, right: &Node) {
    debug_assert_eq!(left.node_type(), right.node_type());
    let (nl, nr) = (left.key_count(), right.key_count());
    dst.set_header(left.node_type(), nl + nr);
    append_range(dst, left, 0, 0, nl);
    append_range(dst, right, nl, 0, nr);
}

/// Size in bytes of a node made of the first `nleft` entries of `src`.
fn left_bytes(src: &Node, nleft: u16) -> usize {
    HEADER_SIZE + (POINTER_SIZE + OFFSET_SIZE) * nleft as usize + src.offset(nleft) as usize
}

/// Size in bytes of a node made of the entries of `src` from `nleft` on.
fn right_bytes(src: &Node, nleft: u16) -> usize {
    src.nbytes() - left_bytes(src, nleft) + HEADER_SIZE
}

/// Splits `src` in two. The right half always fits in a page; the left half
/// may not if a single large entry forces the split point to the right.
fn split2(src: &Node) -> (Node, Node) {
    let n = src.key_count();
    assert!(n >= 2, "cannot split a node with {} keys", n);

    let mut nleft = n / 2;
    while nleft > 1 && left_bytes(src, nleft) > PAGE_SIZE {
        nleft -= 1;
    }
    while right_bytes(src, nleft) > PAGE_SIZE {
        nleft += 1;
    }
    assert!(nleft < n);
    let nright = n - nleft;

    let mut left = Node::with_capacity(src.as_bytes().len());
    let mut right = Node::new();
    left.set_header(src.node_type(), nleft);
    right.set_header(src.node_type(), nright);
    append_range(&mut left, src, 0, 0, nleft);
    append_range(&mut right, src, 0, nleft, nright);
    trace!("split {} keys into {} + {}", n, nleft, nright);
    (left, right)
}

/// Splits a candidate node into nodes that each fit in a page, in key order.
/// A node that already fits is returned as is. With the key and value
/// ceilings the result never has more than three nodes.
pub fn split(src: Node) -> Vec<Node> {
    if src.nbytes() <= PAGE_SIZE {
        return vec![src];
    }
    let (left, right) = split2(&src);
    let mut nodes = split(left);
    nodes.push(right);
    debug_assert!(nodes.len() <= 3);
    nodes
}
