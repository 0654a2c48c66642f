pub mod freelist;
pub mod meta;
pub mod page;
pub mod pagemanager;
