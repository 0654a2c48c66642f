pub mod node;
pub mod search;

pub use node::{Item, Node};
pub use search::{find_key, NodeReader};
