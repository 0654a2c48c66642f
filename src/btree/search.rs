use std::borrow::Cow;
use std::collections::HashSet;

use tracing::trace;

use crate::btree::node::Node;
use crate::error::{Result, StoreError};
use crate::storage::page::PageId;

/// Source of decoded nodes for tree traversal.
pub trait NodeReader {
    fn get_node(&mut self, page_id: PageId) -> Result<Node>;
}

/// Descend from `root` looking for `key`.
///
/// Returns the index of the matching item and the node holding it, or `None`
/// once a leaf is reached without a match. An exact match in an internal node
/// ends the search there.
pub fn find_key<R: NodeReader + ?Sized>(
    reader: &mut R,
    root: &Node,
    key: &[u8],
) -> Result<Option<(usize, Node)>> {
    let mut visited = HashSet::new();
    if root.page_id != 0 {
        visited.insert(root.page_id);
    }

    let mut current = Cow::Borrowed(root);
    loop {
        let child_index = match current.find_key_in_node(key) {
            Ok(index) => return Ok(Some((index, current.into_owned()))),
            Err(_) if current.is_leaf() => return Ok(None),
            Err(child_index) => child_index,
        };

        let child = *current.children.get(child_index).ok_or_else(|| {
            StoreError::CorruptPage(format!(
                "node {} has no child at index {child_index}",
                current.page_id
            ))
        })?;
        if !visited.insert(child) {
            return Err(StoreError::CorruptPage(format!(
                "page {child} reached twice while descending"
            )));
        }

        trace!(from = current.page_id, child, child_index, "descending");
        current = Cow::Owned(reader.get_node(child)?);
    }
}
