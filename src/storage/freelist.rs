use tracing::debug;

use crate::error::{Result, StoreError};
use crate::storage::page::{PageId, META_PAGE_ID, PAGE_ID_SIZE};

/// Encoded size of the counters that precede the released page ids.
pub const FREELIST_HEADER_SIZE: usize = PAGE_ID_SIZE + 2;

/// Allocation high-water mark plus a LIFO stack of reusable pages.
///
/// Single-writer discipline is assumed: nothing stops a caller from handing
/// out a page that is still referenced elsewhere.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreeList {
    max_page: PageId,
    released: Vec<PageId>,
}

// disk layout
mod disk {
    use core::ops::Range;

    pub const MAX_PAGE: Range<usize> = 0..8;
    pub const COUNT: Range<usize> = 8..10;
}

/// number of released page ids a page of `page_size` bytes can hold
pub fn freelist_capacity(page_size: usize) -> usize {
    page_size.saturating_sub(FREELIST_HEADER_SIZE) / PAGE_ID_SIZE
}

impl FreeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// reuse the most recently released page, else grow past `max_page`
    pub fn next_page(&mut self) -> PageId {
        if let Some(page) = self.released.pop() {
            debug!(page, "reusing released page");
            return page;
        }
        self.max_page += 1;
        debug!(page = self.max_page, "allocated new page");
        self.max_page
    }

    pub fn release_page(&mut self, page: PageId) {
        debug_assert!(page != META_PAGE_ID, "meta page cannot be released");
        debug_assert!(!self.is_released(page), "page {page} released twice");
        debug!(page, "released page");
        self.released.push(page);
    }

    pub fn is_released(&self, page: PageId) -> bool {
        self.released.contains(&page)
    }

    pub fn max_page(&self) -> PageId {
        self.max_page
    }

    pub fn released(&self) -> &[PageId] {
        &self.released
    }

    /// format:
    /// ┌──────────┬─────────┬──────────────────────┐
    /// │ Max Page │ Count   │ Released Page Ids    │
    /// │ (8B)     │ (2B)    │ Count × 8B           │
    /// └──────────┴─────────┴──────────────────────┘
    pub fn serialize(&self, buf: &mut [u8]) -> Result<()> {
        if buf.len() < FREELIST_HEADER_SIZE {
            return Err(StoreError::BufferSize {
                expected: FREELIST_HEADER_SIZE,
                got: buf.len(),
            });
        }
        // deserialize rejects these
        if let Some(&page) = self
            .released
            .iter()
            .find(|&&page| page == META_PAGE_ID || page > self.max_page)
        {
            return Err(StoreError::ReleasedOutOfRange {
                page,
                max_page: self.max_page,
            });
        }
        let capacity = freelist_capacity(buf.len()).min(u16::MAX as usize);
        if self.released.len() > capacity {
            return Err(StoreError::FreeListOverflow {
                count: self.released.len(),
                capacity,
            });
        }

        buf[disk::MAX_PAGE].copy_from_slice(&self.max_page.to_le_bytes());
        buf[disk::COUNT].copy_from_slice(&(self.released.len() as u16).to_le_bytes());

        let mut pos = FREELIST_HEADER_SIZE;
        for page in &self.released {
            buf[pos..pos + PAGE_ID_SIZE].copy_from_slice(&page.to_le_bytes());
            pos += PAGE_ID_SIZE;
        }
        Ok(())
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        if buf.len() < FREELIST_HEADER_SIZE {
            return Err(StoreError::CorruptPage(format!(
                "free list truncated to {} bytes",
                buf.len()
            )));
        }

        let max_page = u64::from_le_bytes([
            buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
        ]);
        let count = u16::from_le_bytes([buf[8], buf[9]]) as usize;

        let capacity = freelist_capacity(buf.len());
        if count > capacity {
            return Err(StoreError::CorruptPage(format!(
                "free list count {count} exceeds capacity {capacity}"
            )));
        }

        let mut released = Vec::with_capacity(count);
        for chunk in buf[FREELIST_HEADER_SIZE..]
            .chunks_exact(PAGE_ID_SIZE)
            .take(count)
        {
            let mut raw = [0u8; PAGE_ID_SIZE];
            raw.copy_from_slice(chunk);
            let page = u64::from_le_bytes(raw);
            if page == META_PAGE_ID || page > max_page {
                return Err(StoreError::CorruptPage(format!(
                    "released page {page} outside 1..={max_page}"
                )));
            }
            released.push(page);
        }

        Ok(Self { max_page, released })
    }
}
