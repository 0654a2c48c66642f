//! Page-oriented storage substrate for an embedded ordered key-value store.
//!
//! The file is a sequence of fixed-size pages. Page 0 holds the [`Meta`]
//! record, one page holds the [`FreeList`] snapshot and every other allocated
//! page holds one encoded B-tree [`Node`].

pub mod btree;
pub mod config;
pub mod error;
pub mod storage;

pub use btree::{find_key, Item, Node, NodeReader};
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use storage::freelist::FreeList;
pub use storage::meta::Meta;
pub use storage::page::{Page, PageId, META_PAGE_ID};
pub use storage::pagemanager::PageManager;
