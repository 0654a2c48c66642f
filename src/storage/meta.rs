use crate::error::{Result, StoreError};
use crate::storage::page::{PageId, PAGE_ID_SIZE};

/// Encoded size of the meta record, the rest of page 0 is unused.
pub const META_SIZE: usize = 2 * PAGE_ID_SIZE;

/// Locates the tree root and the free list page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Meta {
    /// 0 when the tree is empty
    pub root: PageId,
    pub freelist_page: PageId,
}

// disk layout
mod disk {
    use core::ops::Range;

    pub const ROOT: Range<usize> = 0..8;
    pub const FREELIST: Range<usize> = 8..16;
}

impl Meta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serialize(&self, buf: &mut [u8]) -> Result<()> {
        if buf.len() < META_SIZE {
            return Err(StoreError::BufferSize {
                expected: META_SIZE,
                got: buf.len(),
            });
        }
        buf[disk::ROOT].copy_from_slice(&self.root.to_le_bytes());
        buf[disk::FREELIST].copy_from_slice(&self.freelist_page.to_le_bytes());
        Ok(())
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        if buf.len() < META_SIZE {
            return Err(StoreError::CorruptPage(format!(
                "meta record truncated to {} bytes",
                buf.len()
            )));
        }
        Ok(Self {
            root: read_u64(&buf[disk::ROOT]),
            freelist_page: read_u64(&buf[disk::FREELIST]),
        })
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    u64::from_le_bytes(raw)
}
