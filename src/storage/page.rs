/// Fallback when the host page size cannot be queried.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Page 0 always holds the meta record.
pub const META_PAGE_ID: PageId = 0;

pub type PageId = u64;

/// Size in bytes of an encoded page number.
pub const PAGE_ID_SIZE: usize = 8;

/// One page-sized buffer, the unit of file I/O.
#[derive(Debug, Clone)]
pub struct Page {
    pub id: PageId,
    pub data: Vec<u8>,
}

impl Page {
    /// zero-filled page with an unassigned id
    pub fn new(page_size: usize) -> Self {
        Self {
            id: 0,
            data: vec![0u8; page_size],
        }
    }
}

#[cfg(unix)]
pub fn host_page_size() -> usize {
    // SAFETY: sysconf has no preconditions and only reads a system constant.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        DEFAULT_PAGE_SIZE
    }
}

#[cfg(not(unix))]
pub fn host_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}
