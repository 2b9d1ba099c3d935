use assert2::debug_assert;
use bytemuck::{Pod, Zeroable};
use simba::simd::WideF32x4;
use wide::f32x4;

use super::{N, NodeRef};
use crate::{
    geometry::{FloatType, WorldBox, WorldBox4, WorldPoint, WorldPoint4},
    util::{SetBits, set_bits},
};

/// One corner of a child box, together with a reference field.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Corner {
    pub x: FloatType,
    pub y: FloatType,
    pub z: FloatType,
    pub child: NodeRef,
}

impl Corner {
    fn point(&self) -> WorldPoint {
        WorldPoint::new(self.x, self.y, self.z)
    }

    fn set_point(&mut self, p: &WorldPoint) {
        self.x = p.x;
        self.y = p.y;
        self.z = p.z;
    }
}

/// Full precision node, two cache lines.
///
/// The child reference of slot `i` is stored in `lower[i]`,
/// the reference field of `upper[i]` is unused and kept zero.
#[repr(C, align(64))]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Node {
    lower: [Corner; N],
    upper: [Corner; N],
}

const INVALID_LOWER: Corner = Corner {
    x: FloatType::INFINITY,
    y: FloatType::INFINITY,
    z: FloatType::INFINITY,
    child: NodeRef::INVALID,
};

const INVALID_UPPER: Corner = Corner {
    x: FloatType::NEG_INFINITY,
    y: FloatType::NEG_INFINITY,
    z: FloatType::NEG_INFINITY,
    child: NodeRef::from_raw(0),
};

impl Node {
    /// Node with all slots unused. Unused slots never win a min/max reduction.
    pub const EMPTY: Node = Node {
        lower: [INVALID_LOWER; N],
        upper: [INVALID_UPPER; N],
    };

    /// Creates a node from up to four children, padding the rest with invalid slots.
    pub fn from_children(children: &[(WorldBox, NodeRef)]) -> Node {
        assert!(children.len() <= N, "{} children", children.len());
        let mut node = Node::EMPTY;
        for (i, (bounds, child)) in children.iter().enumerate() {
            node.set_bounds(i, bounds);
            *node.child_mut(i) = *child;
        }
        node
    }

    pub fn bounds(&self, i: usize) -> WorldBox {
        debug_assert!(i < N);
        WorldBox::new(self.lower[i].point(), self.upper[i].point())
    }

    /// Writes the box of slot `i`, leaving its child reference alone.
    pub fn set_bounds(&mut self, i: usize, bounds: &WorldBox) {
        debug_assert!(i < N);
        self.lower[i].set_point(&bounds.min);
        self.upper[i].set_point(&bounds.max);
    }

    pub fn set_invalid(&mut self, i: usize) {
        debug_assert!(i < N);
        self.lower[i] = INVALID_LOWER;
        self.upper[i] = INVALID_UPPER;
    }

    /// Zero volume child on all three axes.
    pub fn is_point(&self, i: usize) -> bool {
        debug_assert!(i < N);
        self.lower[i].point() == self.upper[i].point()
    }

    pub fn is_empty_slot(&self, i: usize) -> bool {
        self.bounds(i).is_empty()
    }

    pub fn child(&self, i: usize) -> NodeRef {
        debug_assert!(i < N);
        self.lower[i].child
    }

    pub fn child_mut(&mut self, i: usize) -> &mut NodeRef {
        debug_assert!(i < N);
        &mut self.lower[i].child
    }

    /// Indices of slots with non-empty boxes.
    pub fn valid_slots(&self) -> SetBits {
        set_bits(self.child_bounds4().non_empty_mask())
    }

    /// Union of the non-empty child boxes, `None` if there are none.
    pub fn combined_bounds(&self) -> Option<WorldBox> {
        self.valid_slots()
            .map(|i| self.bounds(i))
            .reduce(|a, b| a.union(&b))
    }

    /// All four child boxes, one per lane.
    pub fn child_bounds4(&self) -> WorldBox4 {
        WorldBox4::new(gather(self.lower), gather(self.upper))
    }
}

impl Default for Node {
    fn default() -> Self {
        Node::EMPTY
    }
}

fn gather(corners: [Corner; N]) -> WorldPoint4 {
    WorldPoint4::new(
        WideF32x4(f32x4::from(corners.map(|c| c.x))),
        WideF32x4(f32x4::from(corners.map(|c| c.y))),
        WideF32x4(f32x4::from(corners.map(|c| c.z))),
    )
}
