use assert2::debug_assert;
use bytemuck::{Pod, Zeroable};

use super::Node;

/// Granularity of inner node addresses, in bytes.
/// Smaller than a node, so that the address fits more nodes than the bits
/// left after tagging would allow with a node sized stride.
pub const NODE_ADDRESS_UNIT: usize = 2;

/// Reference to a child of a node: either an inner node or a run of leaf items.
///
/// Layout of the packed value:
/// - bit 3 is the leaf tag
/// - leaf: bits 0..=2 are the item count, bits 4.. are the offset index
///   into the leaf array
/// - inner node: the whole value is the byte offset of the node in the node array,
///   in units of [`NODE_ADDRESS_UNIT`]. Nodes are 128 bytes, so this never
///   collides with the leaf tag.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct NodeRef(u32);

/// Decoded form of [`NodeRef`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeLink {
    Inner { index: NodeIdx },
    Leaf { offset: LeafIdx, items: u32 },
    Empty,
    Invalid,
}

impl NodeRef {
    const ENCODING_BITS: u32 = 4;
    const LEAF_SHIFT: u32 = 3;
    const LEAF_MASK: u32 = 1 << Self::LEAF_SHIFT;
    const ITEMS_MASK: u32 = Self::LEAF_MASK - 1;
    const OFFSET_MASK: u32 = u32::MAX << Self::ENCODING_BITS;

    /// Raw value step between two consecutive nodes in the node array.
    const NODE_STRIDE: u32 = (size_of::<Node>() / NODE_ADDRESS_UNIT) as u32;

    pub const MAX_ITEMS: u32 = Self::ITEMS_MASK;
    /// Highest leaf offset index; the one above it would alias `INVALID`.
    pub const MAX_LEAF_INDEX: u32 = (u32::MAX >> Self::ENCODING_BITS) - 1;
    pub const MAX_NODE_INDEX: u32 = u32::MAX / Self::NODE_STRIDE;

    /// Leaf with no items.
    pub const EMPTY: Self = Self(Self::LEAF_MASK);
    /// Marks an unused child slot. Never produced by a builder.
    pub const INVALID: Self = Self(u32::MAX);

    /// Create a new leaf reference, panics if offset or item count are out of range.
    pub fn new_leaf(offset: LeafIdx, items: u32) -> Self {
        assert!(items <= Self::MAX_ITEMS, "{items} leaf items");
        assert!(offset.raw() <= Self::MAX_LEAF_INDEX);
        Self(offset.raw() << Self::ENCODING_BITS | Self::LEAF_MASK | items)
    }

    /// Create a new inner node reference, panics if the index is out of range.
    pub fn new_inner(index: NodeIdx) -> Self {
        assert!(index.raw() <= Self::MAX_NODE_INDEX);
        Self(index.raw() * Self::NODE_STRIDE)
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub fn is_leaf(self) -> bool {
        self.0 & Self::LEAF_MASK != 0
    }

    pub fn is_node(self) -> bool {
        self.0 & Self::LEAF_MASK == 0
    }

    /// Byte offset of the leaf items in the leaf array and number of items.
    /// `stride` is the leaf addressing scale agreed on with the builder.
    pub fn leaf(self, stride: usize) -> (usize, u32) {
        debug_assert!(self.is_leaf(), "{self:?}");
        (self.offset() as usize * stride, self.items())
    }

    /// Byte offset of the node relative to the start of the node array.
    pub fn node_byte_offset(self) -> usize {
        debug_assert!(self.is_node(), "{self:?}");
        self.0 as usize * NODE_ADDRESS_UNIT
    }

    /// Index of the node in the node array.
    pub fn node_index(self) -> NodeIdx {
        debug_assert!(self.is_node(), "{self:?}");
        NodeIdx::from_raw_unchecked(self.0 / Self::NODE_STRIDE)
    }

    /// True if the reference points at the start of a node.
    pub fn is_node_aligned(self) -> bool {
        self.is_node() && self.0 % Self::NODE_STRIDE == 0
    }

    pub fn offset(self) -> u32 {
        self.0 & Self::OFFSET_MASK
    }

    pub fn offset_index(self) -> u32 {
        self.0 >> Self::ENCODING_BITS
    }

    pub fn items(self) -> u32 {
        self.0 & Self::ITEMS_MASK
    }

    pub fn decode(self) -> NodeLink {
        if self == Self::INVALID {
            NodeLink::Invalid
        } else if self == Self::EMPTY {
            NodeLink::Empty
        } else if self.is_leaf() {
            NodeLink::Leaf {
                offset: LeafIdx::from_raw_unchecked(self.offset_index()),
                items: self.items(),
            }
        } else {
            NodeLink::Inner {
                index: self.node_index(),
            }
        }
    }
}

impl Default for NodeRef {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl std::fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRef")
            .field("0", &format_args!("{:#010x}", self.0))
            .field("<decoded>", &self.decode())
            .finish()
    }
}

index_vec::define_index_type! {
    pub struct NodeIdx = u32;
    MAX_INDEX = NodeRef::MAX_NODE_INDEX as usize;
    IMPL_RAW_CONVERSIONS = true;
}

index_vec::define_index_type! {
    /// Offset index of a leaf run, in units of `1 << ENCODING_BITS` times the leaf stride.
    pub struct LeafIdx = u32;
    MAX_INDEX = NodeRef::MAX_LEAF_INDEX as usize;
    IMPL_RAW_CONVERSIONS = true;
}
