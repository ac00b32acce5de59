//! Page storage consumed by the tree.
//!
//! The tree never holds references into storage: every child is a page id that
//! is resolved through a `PageStore`. A page is never rewritten once stored;
//! changing a node means allocating a new page and freeing the old one once
//! nothing reachable refers to it.
use std::collections::HashMap;

use crate::constants::PAGE_SIZE;
use crate::errors::{Error, Result};
use crate::page::{self, PageId, NULL_PAGE};

/// A mapping from page ids to page contents.
pub trait PageStore {
    /// Returns the content of a page, always `PAGE_SIZE` bytes.
    fn fetch(&self, page_id: PageId) -> Result<Vec<u8>>;

    /// Stores `content` as a new page and returns its id. Content shorter than
    /// a page is zero padded. Never returns `NULL_PAGE`.
    fn allocate(&mut self, content: &[u8]) -> Result<PageId>;

    /// Marks a page id as reusable.
    fn free(&mut self, page_id: PageId) -> Result<()>;
}

/// Page store kept entirely in memory.
#[derive(Debug)]
pub struct MemoryPageStore {
    pages: HashMap<PageId, Box<[u8]>>,
    free: Vec<PageId>,
    next: PageId,
    limit: Option<usize>,
}

impl MemoryPageStore {
    /// An unbounded store.
    pub fn new() -> MemoryPageStore {
        MemoryPageStore {
            pages: HashMap::new(),
            free: Vec::new(),
            next: NULL_PAGE + 1,
            limit: None,
        }
    }

    /// A store that holds at most `pages` live pages.
    pub fn with_limit(pages: usize) -> MemoryPageStore {
        MemoryPageStore { limit: Some(pages), ..MemoryPageStore::new() }
    }

    /// Number of live pages.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// True if no page is live.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// True if `page_id` is allocated and not freed.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.pages.contains_key(&page_id)
    }
}

impl Default for MemoryPageStore {
    fn default() -> MemoryPageStore {
        MemoryPageStore::new()
    }
}

impl PageStore for MemoryPageStore {
    fn fetch(&self, page_id: PageId) -> Result<Vec<u8>> {
        trace!("fetch page {}", page_id);
        self.pages
            .get(&page_id)
            .map(|p| p.to_vec())
            .ok_or(Error::PageNotFound(page_id))
    }

    fn allocate(&mut self, content: &[u8]) -> Result<PageId> {
        if content.len() > PAGE_SIZE {
            return Err(Error::PageTooLarge(content.len()));
        }
        if let Some(limit) = self.limit {
            if self.pages.len() >= limit {
                return Err(Error::CapacityExceeded);
            }
        }

        let id = match self.free.pop() {
            Some(id) => id,
            None => {
                let id = self.next;
                self.next += 1;
                id
            }
        };
        let mut page = page::zeroed();
        page[..content.len()].copy_from_slice(content);
        self.pages.insert(id, page);
        trace!("allocate page {}", id);
        Ok(id)
    }

    fn free(&mut self, page_id: PageId) -> Result<()> {
        if self.pages.remove(&page_id).is_none() {
            return Err(Error::PageNotFound(page_id));
        }
        self.free.push(page_id);
        trace!("free page {}", page_id);
        Ok(())
    }
}
