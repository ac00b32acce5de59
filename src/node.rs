//! Binary layout of a tree node inside a page.
//!
//! ```text
//! | type | nkeys |  pointers  |   offsets  | key-values | unused |
//! |  2B  |   2B  | nkeys * 8B | nkeys * 2B |     ...    |        |
//! ```
//!
//! Each key-value is stored as its two lengths followed by the data:
//!
//! ```text
//! | klen | vlen | key | val |
//! |  2B  |  2B  | ... | ... |
//! ```
//!
//! The offset table holds the end offset of every KV relative to the start of
//! the KV region, so entry `i` of the table is the start offset of KV `i + 1`.
//! The start offset of KV 0 is always zero and is not stored.
use std::fmt;

use crate::constants::*;
use crate::enc;
use crate::errors::{Error, Result};

/// The two kinds of node. The discriminant is the value stored in the first
/// two bytes of the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    /// Routes to child pages, one child per key.
    Internal = 0,
    /// Holds the key-value pairs of the tree.
    Leaf = 1,
}

impl NodeType {
    /// Decode a node type from its on-page discriminant.
    pub fn from_u16(v: u16) -> Option<NodeType> {
        match v {
            0 => Some(NodeType::Internal),
            1 => Some(NodeType::Leaf),
            _ => None,
        }
    }
}

/// A node buffer. The buffer has a fixed capacity chosen at allocation time:
/// one page for nodes read from or written to a store, and more for scratch
/// nodes which may overflow before they are split.
#[derive(Clone, PartialEq, Eq)]
pub struct Node {
    data: Box<[u8]>,
}

impl Node {
    /// A zeroed node of one page.
    pub fn new() -> Node {
        Node::with_capacity(PAGE_SIZE)
    }

    /// A zeroed node of `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Node {
        Node { data: vec![0u8; capacity].into_boxed_slice() }
    }

    /// Wrap a page fetched from a store, checking that its header describes a
    /// node that fits in the buffer.
    pub fn from_page(page: Vec<u8>) -> Result<Node> {
        if page.len() < HEADER_SIZE {
            return Err(Error::CorruptedNode("page shorter than the node header"));
        }
        let raw = enc::decode_u16(&page, 0);
        if NodeType::from_u16(raw).is_none() {
            return Err(Error::InvalidNodeType(raw));
        }

        let node = Node { data: page.into_boxed_slice() };
        let n = node.key_count() as usize;
        if HEADER_SIZE + n * (POINTER_SIZE + OFFSET_SIZE) > node.data.len() {
            return Err(Error::CorruptedNode("offset table overruns the page"));
        }
        let mut last = 0;
        for i in 1..=node.key_count() {
            let off = node.offset(i);
            if off < last {
                return Err(Error::CorruptedNode("offsets are not ascending"));
            }
            last = off;
        }
        if node.nbytes() > node.data.len() {
            return Err(Error::CorruptedNode("key-values overrun the page"));
        }
        // Each entry's length prefix must account for exactly its offset span.
        for i in 0..node.key_count() {
            let span = (node.offset(i + 1) - node.offset(i)) as usize;
            if span < KV_HEADER_SIZE {
                return Err(Error::CorruptedNode("key-value shorter than its header"));
            }
            let pos = node.kv_pos(i);
            let klen = enc::decode_u16(&node.data, pos) as usize;
            let vlen = enc::decode_u16(&node.data, pos + 2) as usize;
            if KV_HEADER_SIZE + klen + vlen != span {
                return Err(Error::CorruptedNode("key-value lengths disagree with offsets"));
            }
        }
        Ok(node)
    }

    /// The whole buffer, used bytes and slack.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// The node as exactly one page of bytes, ready to be handed to a store.
    ///
    /// # Panics
    ///
    /// If the node does not fit in a page.
    pub fn page_bytes(&self) -> &[u8] {
        assert!(self.nbytes() <= PAGE_SIZE,
                "node of {} bytes does not fit in a page",
                self.nbytes());
        &self.data[..PAGE_SIZE.min(self.data.len())]
    }

    /// The node type. Unknown discriminants are rejected by `from_page`, and
    /// every other constructor writes a valid one.
    pub fn node_type(&self) -> NodeType {
        match enc::decode_u16(&self.data, 0) {
            0 => NodeType::Internal,
            _ => NodeType::Leaf,
        }
    }

    /// Number of keys stored in the node.
    pub fn key_count(&self) -> u16 {
        enc::decode_u16(&self.data, 2)
    }

    /// Write the node type and key count. The positions of the offset table
    /// and of the KV region depend on the key count, so this must be called
    /// before anything else is written.
    pub fn set_header(&mut self, node_type: NodeType, key_count: u16) {
        enc::encode_u16(&mut self.data, 0, node_type as u16);
        enc::encode_u16(&mut self.data, 2, key_count);
    }

    fn ptr_pos(&self, idx: u16) -> usize {
        assert!(idx < self.key_count(),
                "pointer index {} out of range for {} keys",
                idx,
                self.key_count());
        HEADER_SIZE + POINTER_SIZE * idx as usize
    }

    /// Child pointer at `idx`. Always zero for leaves.
    pub fn ptr(&self, idx: u16) -> u64 {
        enc::decode_u64(&self.data, self.ptr_pos(idx))
    }

    /// Set the child pointer at `idx`.
    pub fn set_ptr(&mut self, idx: u16, ptr: u64) {
        let pos = self.ptr_pos(idx);
        enc::encode_u64(&mut self.data, pos, ptr);
    }

    // Position of the stored offset `pos`, 1 <= pos <= nkeys.
    fn offset_pos(&self, pos: u16) -> usize {
        let n = self.key_count();
        assert!(pos >= 1 && pos <= n,
                "offset position {} out of range for {} keys",
                pos,
                n);
        HEADER_SIZE + POINTER_SIZE * n as usize + OFFSET_SIZE * (pos as usize - 1)
    }

    /// Start offset of KV `pos` within the KV region; `offset(nkeys)` is the
    /// size of the whole region.
    pub fn offset(&self, pos: u16) -> u16 {
        if pos == 0 {
            return 0;
        }
        enc::decode_u16(&self.data, self.offset_pos(pos))
    }

    /// Store the start offset of KV `pos`. Position 0 is implicit and cannot be
    /// written.
    pub fn set_offset(&mut self, pos: u16, offset: u16) {
        let at = self.offset_pos(pos);
        enc::encode_u16(&mut self.data, at, offset);
    }

    /// Absolute byte position of KV `idx`, `idx <= nkeys`.
    pub fn kv_pos(&self, idx: u16) -> usize {
        let n = self.key_count();
        assert!(idx <= n, "kv index {} out of range for {} keys", idx, n);
        HEADER_SIZE + (POINTER_SIZE + OFFSET_SIZE) * n as usize + self.offset(idx) as usize
    }

    fn kv_entry(&self, idx: u16) -> (usize, usize, usize) {
        assert!(idx < self.key_count(),
                "kv index {} out of range for {} keys",
                idx,
                self.key_count());
        let pos = self.kv_pos(idx);
        let klen = enc::decode_u16(&self.data, pos) as usize;
        let vlen = enc::decode_u16(&self.data, pos + 2) as usize;
        (pos + KV_HEADER_SIZE, klen, vlen)
    }

    /// Key of entry `idx`.
    pub fn key(&self, idx: u16) -> &[u8] {
        let (start, klen, _) = self.kv_entry(idx);
        &self.data[start..start + klen]
    }

    /// Value of entry `idx`. Always empty for internal nodes.
    pub fn value(&self, idx: u16) -> &[u8] {
        let (start, klen, vlen) = self.kv_entry(idx);
        &self.data[start + klen..start + klen + vlen]
    }

    /// Number of bytes used by the node, header included.
    pub fn nbytes(&self) -> usize {
        self.kv_pos(self.key_count())
    }
}

impl Default for Node {
    fn default() -> Node {
        Node::new()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Node")
            .field("node_type", &self.node_type())
            .field("key_count", &self.key_count())
            .field("nbytes", &self.nbytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Lays out a node by hand, without going through the builder.
    fn raw_leaf(kvs: &[(&str, &str)]) -> Node {
        let mut node = Node::new();
        node.set_header(NodeType::Leaf, kvs.len() as u16);
        let mut offset = 0u16;
        for (i, &(k, v)) in kvs.iter().enumerate() {
            let (k, v) = (k.as_bytes(), v.as_bytes());
            let pos = node.kv_pos(i as u16);
            let buf = node.as_bytes_mut();
            enc::encode_u16(buf, pos, k.len() as u16);
            enc::encode_u16(buf, pos + 2, v.len() as u16);
            buf[pos + 4..pos + 4 + k.len()].copy_from_slice(k);
            buf[pos + 4 + k.len()..pos + 4 + k.len() + v.len()].copy_from_slice(v);
            offset += (4 + k.len() + v.len()) as u16;
            node.set_offset(i as u16 + 1, offset);
        }
        node
    }

    #[test]
    fn header_round_trip() {
        let mut node = Node::new();
        node.set_header(NodeType::Leaf, 7);
        assert_eq!(node.node_type(), NodeType::Leaf);
        assert_eq!(node.key_count(), 7);
        assert_eq!(&node.as_bytes()[..4], &[1, 0, 7, 0]);
    }

    #[test]
    fn pointers_live_after_the_header() {
        let mut node = Node::new();
        node.set_header(NodeType::Internal, 2);
        node.set_ptr(1, 0x0102030405060708);
        assert_eq!(node.ptr(1), 0x0102030405060708);
        assert_eq!(&node.as_bytes()[12..20], &[8, 7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn offset_zero_is_implicit() {
        let mut node = Node::new();
        node.set_header(NodeType::Leaf, 3);
        node.set_offset(1, 10);
        assert_eq!(node.offset(0), 0);
        assert_eq!(node.offset(1), 10);
        // offsets start after three pointers
        assert_eq!(enc::decode_u16(node.as_bytes(), 4 + 24), 10);
    }

    #[test]
    #[should_panic]
    fn offset_zero_cannot_be_written() {
        let mut node = Node::new();
        node.set_header(NodeType::Leaf, 3);
        node.set_offset(0, 10);
    }

    #[test]
    #[should_panic]
    fn pointer_out_of_range_panics() {
        let mut node = Node::new();
        node.set_header(NodeType::Internal, 2);
        node.ptr(2);
    }

    #[test]
    fn keys_and_values_are_located_through_offsets() {
        let node = raw_leaf(&[("b", "2"), ("dd", "44"), ("fff", "")]);
        assert_eq!(node.key(0), b"b");
        assert_eq!(node.value(0), b"2");
        assert_eq!(node.key(1), b"dd");
        assert_eq!(node.value(1), b"44");
        assert_eq!(node.key(2), b"fff");
        assert_eq!(node.value(2), b"");
        assert_eq!(node.kv_pos(0), 4 + 30);
        assert_eq!(node.nbytes(), 4 + 30 + (4 + 2) + (4 + 4) + (4 + 3));
    }

    #[test]
    fn empty_node_uses_only_the_header() {
        let mut node = Node::new();
        node.set_header(NodeType::Leaf, 0);
        assert_eq!(node.nbytes(), HEADER_SIZE);
    }

    #[test]
    fn from_page_accepts_a_valid_node() {
        let node = raw_leaf(&[("a", "1"), ("b", "2")]);
        let decoded = Node::from_page(node.page_bytes().to_vec()).unwrap();
        assert_eq!(decoded, node);
    }

    #[test]
    fn from_page_rejects_unknown_types() {
        let mut page = vec![0u8; PAGE_SIZE];
        page[0] = 7;
        match Node::from_page(page) {
            Err(Error::InvalidNodeType(7)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn from_page_rejects_overrunning_offsets() {
        let mut page = vec![0u8; PAGE_SIZE];
        page[0] = 1;
        page[2] = 1;
        // one key whose only offset points past the page
        enc::encode_u16(&mut page, 4 + 8, PAGE_SIZE as u16);
        assert!(matches!(Node::from_page(page), Err(Error::CorruptedNode(_))));
    }

    #[test]
    fn from_page_rejects_inconsistent_lengths() {
        // klen claims 5000 bytes inside a 4 byte entry
        let mut page = vec![0u8; PAGE_SIZE];
        page[0] = 1;
        page[2] = 1;
        enc::encode_u16(&mut page, 4 + 8, 4);
        enc::encode_u16(&mut page, 4 + 8 + 2, 5000);
        assert!(matches!(Node::from_page(page), Err(Error::CorruptedNode(_))));

        // an entry too short to hold its own length prefix
        let mut page = raw_leaf(&[("a", "1"), ("b", "2")]).page_bytes().to_vec();
        enc::encode_u16(&mut page, 4 + 16, 2);
        assert!(matches!(Node::from_page(page), Err(Error::CorruptedNode(_))));

        // a value length one byte too long for its entry
        let mut page = raw_leaf(&[("a", "1"), ("b", "2")]).page_bytes().to_vec();
        let pos = 4 + 16 + 4;
        enc::encode_u16(&mut page, pos + 2, 2);
        assert!(matches!(Node::from_page(page), Err(Error::CorruptedNode(_))));
    }

    #[test]
    fn from_page_rejects_huge_key_counts() {
        let mut page = vec![0u8; PAGE_SIZE];
        enc::encode_u16(&mut page, 2, u16::MAX);
        assert!(matches!(Node::from_page(page), Err(Error::CorruptedNode(_))));
    }

    #[test]
    #[should_panic]
    fn page_bytes_rejects_oversized_nodes() {
        let mut node = Node::with_capacity(2 * PAGE_SIZE);
        node.set_header(NodeType::Leaf, 2);
        node.set_offset(1, (4 + MAX_VALUE_SIZE) as u16);
        node.set_offset(2, (8 + 2 * MAX_VALUE_SIZE) as u16);
        node.page_bytes();
    }
}
