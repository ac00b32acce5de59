//! A page store backed by a memory mapped file.
//!
//! Page file layout
//!
//!    ------------------------------------------------------------------
//!   | meta page (4096) | page 1 (4096) | page 2 (4096) | ...           |
//!    ------------------------------------------------------------------
//!
//! Meta page layout
//!
//!    ---------------------------------------------------------------------------
//!   | magic (32) | version (32) | page size (32) | reserved (32) | page count (64) | root (64) |
//!    ---------------------------------------------------------------------------
//!
//! Page ids are page numbers in the file, so the meta page occupies id 0 and is
//! never handed out. The page count includes the meta page.
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use memmap::{Mmap, MmapMut, MmapOptions};

use crate::constants::*;
use crate::enc;
use crate::errors::{Error, Result};
use crate::page::{PageId, NULL_PAGE};
use crate::store::PageStore;

const META_OFFSET_MAGIC: usize = 0;
const META_OFFSET_VERSION: usize = 4;
const META_OFFSET_PAGE_SIZE: usize = 8;
const META_OFFSET_PAGE_COUNT: usize = 16;
const META_OFFSET_ROOT: usize = 24;

/// Settings represents the options that can be set when opening a page file.
#[derive(Debug, Clone, Copy)]
pub struct StoreSettings {
    /// Create the page file if it doesn't exist
    pub auto_create: bool,

    /// Open the page file in read-only mode. No file locks will be issued on
    /// the file and every write fails with `Error::ReadOnly`.
    pub read_only: bool,

    /// Number of pages, meta page included, a new page file is sized for. It
    /// is a hint to avoid growing and remapping the file early.
    pub initial_pages: u64,

    /// Upper bound on the number of pages in the file, meta page included.
    /// Allocations beyond it fail with `Error::CapacityExceeded`.
    pub max_pages: Option<u64>,
}

impl Default for StoreSettings {
    fn default() -> StoreSettings {
        StoreSettings {
            auto_create: true,
            read_only: false,
            initial_pages: DEFAULT_INITIAL_PAGES,
            max_pages: None,
        }
    }
}

#[derive(Debug)]
enum Map {
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

impl Map {
    fn open(file: &File, read_only: bool) -> Result<Map> {
        // The file is locked exclusively for writers; readers only ever see
        // pages that are no longer rewritten.
        let map = if read_only {
            Map::ReadOnly(unsafe { MmapOptions::new().map(file)? })
        } else {
            Map::ReadWrite(unsafe { MmapOptions::new().map_mut(file)? })
        };
        Ok(map)
    }

    fn bytes(&self) -> &[u8] {
        match *self {
            Map::ReadOnly(ref m) => &m[..],
            Map::ReadWrite(ref m) => &m[..],
        }
    }

    fn bytes_mut(&mut self) -> Result<&mut [u8]> {
        match *self {
            Map::ReadOnly(_) => Err(Error::ReadOnly),
            Map::ReadWrite(ref mut m) => Ok(&mut m[..]),
        }
    }

    fn flush(&self) -> Result<()> {
        if let Map::ReadWrite(ref m) = *self {
            m.flush()?;
        }
        Ok(())
    }
}

/// Page store persisted in a single memory mapped file.
#[derive(Debug)]
pub struct MmapPageStore {
    path: PathBuf,
    file: File,
    map: Map,
    settings: StoreSettings,
    // Freed ids are only reused within this process; the set is not persisted.
    free: BTreeSet<PageId>,
}

impl MmapPageStore {
    /// Open a page file
    ///
    /// A new page file will be created if none is found at the location and
    /// `auto_create` is set.
    pub fn open<P: AsRef<Path>>(path: P, settings: StoreSettings) -> Result<MmapPageStore> {
        let path = path.as_ref();
        match (path.exists(), settings.auto_create && !settings.read_only) {
            (false, false) => Err(Error::DatabaseNotFound),
            (false, true) => MmapPageStore::create(path, settings),
            (true, _) => MmapPageStore::init(path, settings),
        }
    }

    /// Create a new page file with a fresh meta page.
    fn create(path: &Path, settings: StoreSettings) -> Result<MmapPageStore> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        file.lock_exclusive()?;

        // Set length for at least the meta page and one data page
        let pages = settings.initial_pages.max(2);
        file.set_len(pages * PAGE_SIZE as u64)?;

        let mut map = Map::open(&file, false)?;
        {
            let meta = map.bytes_mut()?;
            enc::encode_u32(meta, META_OFFSET_MAGIC, MAGIC_KEY);
            enc::encode_u32(meta, META_OFFSET_VERSION, VERSION);
            enc::encode_u32(meta, META_OFFSET_PAGE_SIZE, PAGE_SIZE as u32);
            enc::encode_u64(meta, META_OFFSET_PAGE_COUNT, 1);
            enc::encode_u64(meta, META_OFFSET_ROOT, NULL_PAGE);
        }
        map.flush()?;
        info!("created page file {} with room for {} pages",
              path.display(),
              pages);

        Ok(MmapPageStore {
            path: path.to_path_buf(),
            file: file,
            map: map,
            settings: settings,
            free: BTreeSet::new(),
        })
    }

    /// Open an existing page file and validate its meta page.
    fn init(path: &Path, settings: StoreSettings) -> Result<MmapPageStore> {
        let file = OpenOptions::new()
            .read(true)
            .write(!settings.read_only)
            .open(path)?;

        // Lock file so that other processes using the page file in read-write
        // mode cannot use it at the same time. Two writers would hand out the
        // same page ids and overwrite each other's pages.
        if !settings.read_only {
            file.lock_exclusive()?;
        }

        if (file.metadata()?.len() as usize) < PAGE_SIZE {
            return Err(Error::DatabaseInvalid);
        }
        let map = Map::open(&file, settings.read_only)?;
        let store = MmapPageStore {
            path: path.to_path_buf(),
            file: file,
            map: map,
            settings: settings,
            free: BTreeSet::new(),
        };
        store.validate()?;
        info!("opened page file {} with {} pages, root {}",
              path.display(),
              store.page_count(),
              store.root());
        Ok(store)
    }

    // Validate that the meta page is in the right format
    fn validate(&self) -> Result<()> {
        let meta = self.map.bytes();
        if enc::decode_u32(meta, META_OFFSET_MAGIC) != MAGIC_KEY {
            return Err(Error::DatabaseInvalid);
        }
        if enc::decode_u32(meta, META_OFFSET_VERSION) != VERSION {
            return Err(Error::DatabaseVersionMismatch);
        }
        if enc::decode_u32(meta, META_OFFSET_PAGE_SIZE) as usize != PAGE_SIZE {
            return Err(Error::DatabaseInvalid);
        }
        let count = self.page_count();
        if count == 0 || count.saturating_mul(PAGE_SIZE as u64) > meta.len() as u64 {
            return Err(Error::DatabaseInvalid);
        }
        Ok(())
    }

    /// Path of the page file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of pages handed out so far, meta page included.
    pub fn page_count(&self) -> u64 {
        enc::decode_u64(self.map.bytes(), META_OFFSET_PAGE_COUNT)
    }

    /// Root page id recorded in the meta page, `NULL_PAGE` if none.
    pub fn root(&self) -> PageId {
        enc::decode_u64(self.map.bytes(), META_OFFSET_ROOT)
    }

    /// Record the root page id in the meta page.
    pub fn set_root(&mut self, root: PageId) -> Result<()> {
        enc::encode_u64(self.map.bytes_mut()?, META_OFFSET_ROOT, root);
        Ok(())
    }

    /// Flush every written page and the meta page to disk.
    pub fn sync(&self) -> Result<()> {
        self.map.flush()
    }

    fn is_live(&self, page_id: PageId) -> bool {
        page_id != NULL_PAGE && page_id < self.page_count() && !self.free.contains(&page_id)
    }

    // Make sure the map covers page `page_id`, growing the file if needed.
    fn ensure_mapped(&mut self, page_id: PageId) -> Result<()> {
        let needed = (page_id as usize + 1) * PAGE_SIZE;
        let mapped = self.map.bytes().len();
        if needed <= mapped {
            return Ok(());
        }

        let new_len = needed.max(mapped * 2);
        self.map.flush()?;
        self.file.set_len(new_len as u64)?;
        self.map = Map::open(&self.file, false)?;
        debug!("grew page file {} from {} to {} bytes",
               self.path.display(),
               mapped,
               new_len);
        Ok(())
    }
}

impl PageStore for MmapPageStore {
    fn fetch(&self, page_id: PageId) -> Result<Vec<u8>> {
        if !self.is_live(page_id) {
            return Err(Error::PageNotFound(page_id));
        }
        trace!("fetch page {}", page_id);
        let at = page_id as usize * PAGE_SIZE;
        Ok(self.map.bytes()[at..at + PAGE_SIZE].to_vec())
    }

    fn allocate(&mut self, content: &[u8]) -> Result<PageId> {
        if self.settings.read_only {
            return Err(Error::ReadOnly);
        }
        if content.len() > PAGE_SIZE {
            return Err(Error::PageTooLarge(content.len()));
        }

        let reused = self.free.iter().next().cloned();
        let id = match reused {
            Some(id) => {
                self.free.remove(&id);
                id
            }
            None => {
                let id = self.page_count();
                if let Some(max) = self.settings.max_pages {
                    if id >= max {
                        return Err(Error::CapacityExceeded);
                    }
                }
                self.ensure_mapped(id)?;
                enc::encode_u64(self.map.bytes_mut()?, META_OFFSET_PAGE_COUNT, id + 1);
                id
            }
        };

        let at = id as usize * PAGE_SIZE;
        let page = &mut self.map.bytes_mut()?[at..at + PAGE_SIZE];
        page[..content.len()].copy_from_slice(content);
        for b in &mut page[content.len()..] {
            *b = 0;
        }
        trace!("allocate page {}", id);
        Ok(id)
    }

    fn free(&mut self, page_id: PageId) -> Result<()> {
        if self.settings.read_only {
            return Err(Error::ReadOnly);
        }
        if !self.is_live(page_id) {
            return Err(Error::PageNotFound(page_id));
        }
        self.free.insert(page_id);
        trace!("free page {}", page_id);
        Ok(())
    }
}
