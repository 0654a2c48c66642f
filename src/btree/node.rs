use std::cmp::Ordering;

use crate::config::MAX_PAGE_SIZE;
use crate::error::{Result, StoreError};
use crate::storage::page::{PageId, PAGE_ID_SIZE};

/// Key and value lengths are stored in one byte each.
pub const MAX_KEY_SIZE: usize = u8::MAX as usize;
pub const MAX_VALUE_SIZE: usize = u8::MAX as usize;

/// leaf flag (1B) + item count (2B)
pub const NODE_HEADER_SIZE: usize = 3;

const OFFSET_SIZE: usize = 2;

const LEAF_FLAG: u8 = 1;
const INTERNAL_FLAG: u8 = 0;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Item {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Item {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    fn encoded_size(&self) -> usize {
        1 + self.key.len() + 1 + self.value.len()
    }
}

/// Decoded contents of one B-tree page.
///
/// A node without children is a leaf. An internal node carries exactly one
/// more child pointer than it has items, and `children[i]` leads to the keys
/// ordered before `items[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    /// 0 until the node is first written
    pub page_id: PageId,
    pub items: Vec<Item>,
    pub children: Vec<PageId>,
}

impl Node {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn leaf(items: Vec<Item>) -> Self {
        Self {
            page_id: 0,
            items,
            children: Vec::new(),
        }
    }

    pub fn internal(items: Vec<Item>, children: Vec<PageId>) -> Self {
        Self {
            page_id: 0,
            items,
            children,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Linear scan of the items.
    ///
    /// `Ok(index)` on an exact match, otherwise `Err(index)` of the child that
    /// would hold `key`: the first item greater than `key`, or the last child.
    pub fn find_key_in_node(&self, key: &[u8]) -> std::result::Result<usize, usize> {
        for (index, item) in self.items.iter().enumerate() {
            match item.key.as_slice().cmp(key) {
                Ordering::Equal => return Ok(index),
                Ordering::Greater => return Err(index),
                Ordering::Less => {}
            }
        }
        Err(self.items.len())
    }

    /// bytes the node occupies once encoded
    pub fn encoded_size(&self) -> usize {
        let per_item = if self.is_leaf() {
            OFFSET_SIZE
        } else {
            PAGE_ID_SIZE + OFFSET_SIZE
        };
        let trailing_child = if self.is_leaf() { 0 } else { PAGE_ID_SIZE };
        let payload: usize = self.items.iter().map(Item::encoded_size).sum();

        NODE_HEADER_SIZE + self.items.len() * per_item + trailing_child + payload
    }

    fn validate(&self) -> Result<()> {
        if self.items.len() > u16::MAX as usize {
            return Err(StoreError::InvalidNode(format!(
                "{} items exceed the u16 item count",
                self.items.len()
            )));
        }
        if !self.is_leaf() && self.children.len() != self.items.len() + 1 {
            return Err(StoreError::InvalidNode(format!(
                "internal node has {} items but {} children",
                self.items.len(),
                self.children.len()
            )));
        }
        for item in &self.items {
            if item.key.len() > MAX_KEY_SIZE {
                return Err(StoreError::KeyTooLarge(item.key.len()));
            }
            if item.value.len() > MAX_VALUE_SIZE {
                return Err(StoreError::ValueTooLarge(item.value.len()));
            }
        }
        Ok(())
    }

    /// Encode into one page buffer.
    ///
    /// The header and the child/offset table grow from the front, item bytes
    /// are packed from the back as `key_len key value_len value`, and each
    /// offset points at its item's `key_len` byte.
    pub fn serialize(&self, buf: &mut [u8]) -> Result<()> {
        self.validate()?;

        if buf.len() > MAX_PAGE_SIZE {
            return Err(StoreError::InvalidConfig(format!(
                "page of {} bytes is not addressable by 16-bit offsets",
                buf.len()
            )));
        }
        let needed = self.encoded_size();
        if needed > buf.len() {
            return Err(StoreError::NodeOverflow {
                needed,
                page_size: buf.len(),
            });
        }

        buf.fill(0);
        let is_leaf = self.is_leaf();

        buf[0] = if is_leaf { LEAF_FLAG } else { INTERNAL_FLAG };
        buf[1..NODE_HEADER_SIZE].copy_from_slice(&(self.items.len() as u16).to_le_bytes());

        let mut left = NODE_HEADER_SIZE;
        let mut right = buf.len();

        for (index, item) in self.items.iter().enumerate() {
            if !is_leaf {
                buf[left..left + PAGE_ID_SIZE].copy_from_slice(&self.children[index].to_le_bytes());
                left += PAGE_ID_SIZE;
            }

            right -= item.value.len();
            buf[right..right + item.value.len()].copy_from_slice(&item.value);
            right -= 1;
            buf[right] = item.value.len() as u8;

            right -= item.key.len();
            buf[right..right + item.key.len()].copy_from_slice(&item.key);
            right -= 1;
            buf[right] = item.key.len() as u8;

            buf[left..left + OFFSET_SIZE].copy_from_slice(&(right as u16).to_le_bytes());
            left += OFFSET_SIZE;
        }

        if !is_leaf {
            let last = self.children[self.children.len() - 1];
            buf[left..left + PAGE_ID_SIZE].copy_from_slice(&last.to_le_bytes());
        }

        Ok(())
    }

    /// Decode a page buffer. The returned node has no page id assigned.
    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        if buf.len() < NODE_HEADER_SIZE {
            return Err(corrupt(format!("node page of {} bytes", buf.len())));
        }
        let is_leaf = match buf[0] {
            LEAF_FLAG => true,
            INTERNAL_FLAG => false,
            flag => return Err(corrupt(format!("unknown leaf flag {flag}"))),
        };
        let count = u16::from_le_bytes([buf[1], buf[2]]) as usize;

        let table_end = if is_leaf {
            NODE_HEADER_SIZE + count * OFFSET_SIZE
        } else {
            NODE_HEADER_SIZE + count * (PAGE_ID_SIZE + OFFSET_SIZE) + PAGE_ID_SIZE
        };
        if table_end > buf.len() {
            return Err(corrupt(format!(
                "{count} item table overruns {} byte page",
                buf.len()
            )));
        }

        let mut items = Vec::with_capacity(count);
        let mut children = Vec::with_capacity(if is_leaf { 0 } else { count + 1 });
        let mut left = NODE_HEADER_SIZE;

        for _ in 0..count {
            if !is_leaf {
                children.push(read_page_id(buf, left)?);
                left += PAGE_ID_SIZE;
            }

            let offset_bytes = take(buf, left, OFFSET_SIZE)?;
            let offset = u16::from_le_bytes([offset_bytes[0], offset_bytes[1]]) as usize;
            left += OFFSET_SIZE;

            if offset < table_end {
                return Err(corrupt(format!(
                    "item offset {offset} inside the pointer table"
                )));
            }
            items.push(read_item(buf, offset)?);
        }

        if !is_leaf {
            children.push(read_page_id(buf, left)?);
        }

        Ok(Self {
            page_id: 0,
            items,
            children,
        })
    }
}

fn corrupt(msg: String) -> StoreError {
    StoreError::CorruptPage(msg)
}

fn take(buf: &[u8], start: usize, len: usize) -> Result<&[u8]> {
    buf.get(start..start + len).ok_or_else(|| {
        corrupt(format!(
            "{len} bytes at offset {start} overrun {} byte page",
            buf.len()
        ))
    })
}

fn read_page_id(buf: &[u8], pos: usize) -> Result<PageId> {
    let mut raw = [0u8; PAGE_ID_SIZE];
    raw.copy_from_slice(take(buf, pos, PAGE_ID_SIZE)?);
    Ok(u64::from_le_bytes(raw))
}

fn read_item(buf: &[u8], mut pos: usize) -> Result<Item> {
    let key_len = take(buf, pos, 1)?[0] as usize;
    pos += 1;
    let key = take(buf, pos, key_len)?.to_vec();
    pos += key_len;

    let value_len = take(buf, pos, 1)?[0] as usize;
    pos += 1;
    let value = take(buf, pos, value_len)?.to_vec();

    Ok(Item { key, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PAGE: usize = 4096;

    fn encode(node: &Node) -> Vec<u8> {
        let mut buf = vec![0u8; PAGE];
        node.serialize(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_leaf_layout() {
        let node = Node::leaf(vec![Item::new("ab", "xyz")]);
        let buf = encode(&node);

        assert_eq!(buf[0], LEAF_FLAG);
        assert_eq!(u16::from_le_bytes([buf[1], buf[2]]), 1);

        // key_len, "ab", value_len, "xyz" packed against the end of the page
        let offset = u16::from_le_bytes([buf[3], buf[4]]) as usize;
        assert_eq!(offset, PAGE - 7);
        assert_eq!(&buf[offset..], &[2, b'a', b'b', 3, b'x', b'y', b'z']);
    }

    #[test]
    fn test_internal_layout() {
        let node = Node::internal(vec![Item::new("k", "v")], vec![7, 9]);
        let buf = encode(&node);

        assert_eq!(buf[0], INTERNAL_FLAG);
        assert_eq!(&buf[3..11], &7u64.to_le_bytes());
        let offset = u16::from_le_bytes([buf[11], buf[12]]) as usize;
        assert_eq!(&buf[13..21], &9u64.to_le_bytes());
        assert_eq!(&buf[offset..], &[1, b'k', 1, b'v']);
    }

    #[test]
    fn test_items_keep_order() {
        let node = Node::internal(
            vec![Item::new("a", "1"), Item::new("m", "22"), Item::new("t", "")],
            vec![10, 11, 12, 13],
        );
        let decoded = Node::deserialize(&encode(&node)).unwrap();
        assert_eq!(decoded.items, node.items);
        assert_eq!(decoded.children, node.children);
        assert!(!decoded.is_leaf());
    }

    #[test]
    fn test_max_sized_key_and_value() {
        let item = Item::new(vec![b'k'; MAX_KEY_SIZE], vec![b'v'; MAX_VALUE_SIZE]);
        let node = Node::leaf(vec![item.clone()]);
        let decoded = Node::deserialize(&encode(&node)).unwrap();
        assert_eq!(decoded.items, vec![item]);
    }

    #[test]
    fn test_oversized_key_or_value() {
        let mut buf = vec![0u8; PAGE];

        let node = Node::leaf(vec![Item::new(vec![0u8; 256], "v")]);
        assert!(matches!(
            node.serialize(&mut buf),
            Err(StoreError::KeyTooLarge(256))
        ));

        let node = Node::leaf(vec![Item::new("k", vec![0u8; 300])]);
        assert!(matches!(
            node.serialize(&mut buf),
            Err(StoreError::ValueTooLarge(300))
        ));
    }

    #[test]
    fn test_node_overflow() {
        let items: Vec<Item> = (0..20u8)
            .map(|i| Item::new(vec![i; 10], vec![i; 10]))
            .collect();
        let node = Node::leaf(items);
        let mut buf = vec![0u8; 256];

        let result = node.serialize(&mut buf);
        assert!(matches!(
            result,
            Err(StoreError::NodeOverflow { needed: 483, page_size: 256 })
        ));
    }

    #[test]
    fn test_child_count_mismatch() {
        let node = Node::internal(vec![Item::new("a", "1")], vec![2]);
        let mut buf = vec![0u8; PAGE];
        assert!(matches!(
            node.serialize(&mut buf),
            Err(StoreError::InvalidNode(_))
        ));
    }

    #[test]
    fn test_exact_fit() {
        let node = Node::leaf(vec![Item::new("abc", "defg")]);
        let mut buf = vec![0u8; node.encoded_size()];
        node.serialize(&mut buf).unwrap();
        assert_eq!(Node::deserialize(&buf).unwrap().items, node.items);
    }

    #[test]
    fn test_corrupt_pages() {
        assert!(matches!(
            Node::deserialize(&[1, 0]),
            Err(StoreError::CorruptPage(_))
        ));

        let mut buf = encode(&Node::leaf(vec![Item::new("a", "b")]));
        buf[0] = 7;
        assert!(matches!(
            Node::deserialize(&buf),
            Err(StoreError::CorruptPage(_))
        ));

        // item count larger than the page can hold
        let mut buf = vec![0u8; 64];
        buf[0] = LEAF_FLAG;
        buf[1..3].copy_from_slice(&1000u16.to_le_bytes());
        assert!(matches!(
            Node::deserialize(&buf),
            Err(StoreError::CorruptPage(_))
        ));

        // key length running past the end of the page
        let mut buf = encode(&Node::leaf(vec![Item::new("a", "b")]));
        let offset = u16::from_le_bytes([buf[3], buf[4]]) as usize;
        buf[offset] = 200;
        assert!(matches!(
            Node::deserialize(&buf),
            Err(StoreError::CorruptPage(_))
        ));

        // offset pointing back into the header
        let mut buf = encode(&Node::leaf(vec![Item::new("a", "b")]));
        buf[3..5].copy_from_slice(&1u16.to_le_bytes());
        assert!(matches!(
            Node::deserialize(&buf),
            Err(StoreError::CorruptPage(_))
        ));
    }

    #[test]
    fn test_find_key_in_node() {
        let node = Node::leaf(vec![
            Item::new("b", ""),
            Item::new("d", ""),
            Item::new("f", ""),
        ]);
        assert_eq!(node.find_key_in_node(b"d"), Ok(1));
        assert_eq!(node.find_key_in_node(b"a"), Err(0));
        assert_eq!(node.find_key_in_node(b"c"), Err(1));
        assert_eq!(node.find_key_in_node(b"z"), Err(3));
        assert_eq!(Node::new().find_key_in_node(b"a"), Err(0));
    }

    fn arb_items() -> impl Strategy<Value = Vec<Item>> {
        prop::collection::btree_map(
            prop::collection::vec(any::<u8>(), 0..48),
            prop::collection::vec(any::<u8>(), 0..48),
            0..24,
        )
        .prop_map(|map| map.into_iter().map(|(k, v)| Item::new(k, v)).collect())
    }

    proptest! {
        #[test]
        fn prop_leaf_roundtrip(items in arb_items()) {
            let node = Node::leaf(items);
            let decoded = Node::deserialize(&encode(&node)).unwrap();
            prop_assert_eq!(decoded, node);
        }

        #[test]
        fn prop_internal_roundtrip(items in arb_items(), seed in any::<u64>()) {
            let children: Vec<PageId> = (0..=items.len() as u64)
                .map(|i| seed.wrapping_add(i.wrapping_mul(0x9E37_79B9)))
                .collect();
            let node = Node::internal(items, children);
            let decoded = Node::deserialize(&encode(&node)).unwrap();
            prop_assert_eq!(decoded, node);
        }
    }
}
