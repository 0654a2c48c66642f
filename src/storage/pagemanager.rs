use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, info, trace};

use crate::btree::node::Node;
use crate::btree::search::{self, NodeReader};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::storage::freelist::FreeList;
use crate::storage::meta::Meta;
use crate::storage::page::{Page, PageId, META_PAGE_ID};

/// Owns the backing file and the in-memory meta and free list.
///
/// Meta and free list changes stay in memory until `write_meta`,
/// `write_freelist` or `flush` is called. A single owner is assumed for the
/// lifetime of the handle.
#[derive(Debug)]
pub struct PageManager {
    file: File,
    page_size: usize,
    num_pages: PageId,
    meta: Meta,
    freelist: FreeList,
}

impl PageManager {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, &StoreConfig::default())
    }

    /// Open an existing store or initialize a new one.
    ///
    /// An empty file gets a fresh free list on page 1 and a meta record on
    /// page 0. The page size of an existing file is not recorded in it, so it
    /// must match the one the file was created with.
    pub fn open_with_config(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(config.create_if_missing)
            .open(path)?;

        let file_len = file.metadata()?.len();
        let page_size = config.page_size;

        if file_len % page_size as u64 != 0 {
            return Err(StoreError::CorruptPage(format!(
                "file length {file_len} is not a multiple of page size {page_size}"
            )));
        }

        let mut manager = PageManager {
            file,
            page_size,
            num_pages: file_len / page_size as u64,
            meta: Meta::new(),
            freelist: FreeList::new(),
        };

        if file_len == 0 {
            manager.initialize()?;
            info!(path = %path.display(), page_size, "initialized new store");
        } else {
            manager.meta = manager.read_meta()?;
            manager.freelist = manager.read_freelist()?;
            info!(
                path = %path.display(),
                page_size,
                pages = manager.num_pages,
                root = manager.meta.root,
                "opened store"
            );
        }

        Ok(manager)
    }

    fn initialize(&mut self) -> Result<()> {
        self.freelist = FreeList::new();
        self.meta = Meta::new();
        self.meta.freelist_page = self.freelist.next_page();
        self.write_freelist()?;
        self.write_meta()?;
        Ok(())
    }

    /// zero-filled page buffer, not yet bound to a page id
    pub fn allocate_page(&self) -> Page {
        Page::new(self.page_size)
    }

    pub fn read_page(&mut self, page_id: PageId) -> Result<Page> {
        if page_id >= self.num_pages {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("page {page_id} beyond end of file ({} pages)", self.num_pages),
            )
            .into());
        }

        let offset = self.offset(page_id)?;
        let mut page = self.allocate_page();
        page.id = page_id;

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut page.data)?;
        trace!(page = page_id, "read page");
        Ok(page)
    }

    /// Offsets past the end of the file leave a sparse gap.
    pub fn write_page(&mut self, page: &Page) -> Result<()> {
        if page.data.len() != self.page_size {
            return Err(StoreError::BufferSize {
                expected: self.page_size,
                got: page.data.len(),
            });
        }

        let offset = self.offset(page.id)?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&page.data)?;

        if page.id >= self.num_pages {
            self.num_pages = page.id + 1;
        }
        trace!(page = page.id, "wrote page");
        Ok(())
    }

    fn offset(&self, page_id: PageId) -> Result<u64> {
        page_id.checked_mul(self.page_size as u64).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("page {page_id} offset overflows"),
            )
            .into()
        })
    }

    pub fn get_node(&mut self, page_id: PageId) -> Result<Node> {
        if page_id == META_PAGE_ID {
            return Err(StoreError::InvalidNode(
                "page 0 holds the meta record".to_string(),
            ));
        }
        let page = self.read_page(page_id)?;
        let mut node = Node::deserialize(&page.data)?;
        node.page_id = page_id;
        Ok(node)
    }

    /// Encode and write a node, assigning it a page first if it has none.
    ///
    /// A node that already has a page is overwritten in place.
    pub fn write_node(&mut self, node: &mut Node) -> Result<PageId> {
        let mut page = self.allocate_page();
        node.serialize(&mut page.data)?;

        if node.page_id == 0 {
            node.page_id = self.freelist.next_page();
        } else {
            debug_assert!(
                !self.freelist.is_released(node.page_id),
                "writing node to released page {}",
                node.page_id
            );
        }
        page.id = node.page_id;

        self.write_page(&page)?;
        debug!(page = node.page_id, items = node.items.len(), "wrote node");
        Ok(node.page_id)
    }

    pub fn write_nodes(&mut self, nodes: &mut [Node]) -> Result<()> {
        for node in nodes.iter_mut() {
            self.write_node(node)?;
        }
        Ok(())
    }

    /// Return a node's page to the free list.
    ///
    /// The page bytes are left on disk untouched until the page is reused, so
    /// deleted keys and values stay readable in the file until then.
    pub fn delete_node(&mut self, page_id: PageId) {
        self.freelist.release_page(page_id);
        debug!(page = page_id, "deleted node");
    }

    pub fn read_meta(&mut self) -> Result<Meta> {
        let page = self.read_page(META_PAGE_ID)?;
        Meta::deserialize(&page.data)
    }

    pub fn write_meta(&mut self) -> Result<()> {
        let mut page = self.allocate_page();
        page.id = META_PAGE_ID;
        self.meta.serialize(&mut page.data)?;
        self.write_page(&page)?;
        debug!(
            root = self.meta.root,
            freelist_page = self.meta.freelist_page,
            "wrote meta"
        );
        Ok(())
    }

    pub fn read_freelist(&mut self) -> Result<FreeList> {
        if self.meta.freelist_page == META_PAGE_ID {
            return Err(StoreError::CorruptPage(
                "meta places the free list on page 0".to_string(),
            ));
        }
        let page = self.read_page(self.meta.freelist_page)?;
        FreeList::deserialize(&page.data)
    }

    pub fn write_freelist(&mut self) -> Result<()> {
        let mut page = self.allocate_page();
        page.id = self.meta.freelist_page;
        self.freelist.serialize(&mut page.data)?;
        self.write_page(&page)?;
        debug!(
            page = page.id,
            max_page = self.freelist.max_page(),
            released = self.freelist.released().len(),
            "wrote free list"
        );
        Ok(())
    }

    /// persist the free list and meta, then fsync
    pub fn flush(&mut self) -> Result<()> {
        self.write_freelist()?;
        self.write_meta()?;
        self.sync()
    }

    /// Look up `key` starting from the root recorded in meta.
    pub fn find_key(&mut self, key: &[u8]) -> Result<Option<(usize, Node)>> {
        if self.meta.root == 0 {
            return Ok(None);
        }
        let root = self.get_node(self.meta.root)?;
        search::find_key(self, &root, key)
    }

    pub fn root(&self) -> PageId {
        self.meta.root
    }

    /// takes effect on disk at the next `write_meta` or `flush`
    pub fn set_root(&mut self, page_id: PageId) {
        self.meta.root = page_id;
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn freelist(&self) -> &FreeList {
        &self.freelist
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn num_pages(&self) -> PageId {
        self.num_pages
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Release the file handle. Meta and free list are not written.
    pub fn close(self) -> Result<()> {
        self.file.sync_all()?;
        info!(pages = self.num_pages, "closed store");
        Ok(())
    }
}

impl NodeReader for PageManager {
    fn get_node(&mut self, page_id: PageId) -> Result<Node> {
        PageManager::get_node(self, page_id)
    }
}
