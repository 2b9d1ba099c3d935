use thiserror::Error;

use super::{Bvh4i, LEAF_STRIDE, MAX_DEPTH, N, NodeIdx, NodeRef, QuantizedNode};
use crate::geometry::WorldBox;

/// First broken data contract found in a hierarchy.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("root reference is invalid")]
    InvalidRoot,

    #[error("{node:?} does not point to the start of a node")]
    MisalignedNode { node: NodeRef },

    #[error("{node:?} points past the end of the node array ({len} nodes)")]
    NodeOutOfRange { node: NodeRef, len: usize },

    #[error("{leaf:?} ends at byte {end}, past the end of the leaf array ({len} bytes)")]
    LeafOutOfRange { leaf: NodeRef, end: usize, len: usize },

    #[error("slot {slot} of node {node:?} has inverted bounds {bounds:?}")]
    InvertedBounds {
        node: NodeIdx,
        slot: usize,
        bounds: WorldBox,
    },

    #[error("unused slot {slot} of node {node:?} has non-empty bounds {bounds:?}")]
    InvalidWithBounds {
        node: NodeIdx,
        slot: usize,
        bounds: WorldBox,
    },

    #[error("children of {node:?} extend outside of their parent box {parent:?}")]
    ChildOutsideParent { node: NodeRef, parent: WorldBox },

    #[error("quantized slot {slot} of node {node:?} does not contain {bounds:?}")]
    QuantizationNotConservative {
        node: NodeIdx,
        slot: usize,
        bounds: WorldBox,
    },

    #[error("tree is deeper than {} levels", MAX_DEPTH)]
    TooDeep,
}

impl Bvh4i {
    /// Walks the whole tree and checks everything a traversal relies on.
    pub fn validate(&self) -> Result<(), ValidationError> {
        log::debug!(
            "Validating {} nodes, {} leaf bytes",
            self.nodes.len(),
            self.leaf_bytes_total()
        );
        let result = if self.root == NodeRef::INVALID {
            Err(ValidationError::InvalidRoot)
        } else {
            self.validate_recursive(self.root, &self.bounds, 1)
        };
        if let Err(e) = &result {
            log::warn!("Validation failed: {e}");
        }
        result
    }

    fn validate_recursive(
        &self,
        node: NodeRef,
        parent: &WorldBox,
        depth: usize,
    ) -> Result<(), ValidationError> {
        if depth > MAX_DEPTH {
            return Err(ValidationError::TooDeep);
        }

        if node.is_leaf() {
            let (start, items) = node.leaf(LEAF_STRIDE);
            let end = start + items as usize * self.primitive_type.bytes;
            let len = self.leaf_bytes_total();
            return if end > len {
                Err(ValidationError::LeafOutOfRange {
                    leaf: node,
                    end,
                    len,
                })
            } else {
                Ok(())
            };
        }

        if !node.is_node_aligned() {
            return Err(ValidationError::MisalignedNode { node });
        }
        let index = node.node_index();
        let Some(inner) = self.nodes.get(index) else {
            return Err(ValidationError::NodeOutOfRange {
                node,
                len: self.nodes.len(),
            });
        };

        // Unused slots hold the empty box with either INVALID or EMPTY as reference.
        for slot in 0..N {
            let bounds = inner.bounds(slot);
            let child = inner.child(slot);
            if child == NodeRef::INVALID {
                if !bounds.is_empty() {
                    return Err(ValidationError::InvalidWithBounds {
                        node: index,
                        slot,
                        bounds,
                    });
                }
            } else if child != NodeRef::EMPTY && bounds.is_empty() {
                return Err(ValidationError::InvertedBounds {
                    node: index,
                    slot,
                    bounds,
                });
            }
        }

        if let Some(combined) = inner.combined_bounds() {
            if !parent.contains(&combined) {
                return Err(ValidationError::ChildOutsideParent {
                    node,
                    parent: parent.clone(),
                });
            }
        }

        let quantized = QuantizedNode::new(inner);
        for slot in inner.valid_slots() {
            let bounds = inner.bounds(slot);
            if !quantized.bounds(slot).contains(&bounds) {
                return Err(ValidationError::QuantizationNotConservative {
                    node: index,
                    slot,
                    bounds,
                });
            }
        }

        for slot in inner.valid_slots() {
            self.validate_recursive(inner.child(slot), &inner.bounds(slot), depth + 1)?;
        }

        Ok(())
    }
}
