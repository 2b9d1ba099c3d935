mod factory;
mod node;
mod node_ref;
mod primitive;
mod quantized_node;
mod sah;
mod statistics;
mod validation;

use std::{
    any::Any,
    sync::{Arc, Weak},
};

use assert2::debug_assert;
use index_vec::IndexVec;

use crate::geometry::WorldBox;

pub use factory::{BuildError, BuildOutput, BuildStrategy, Builder};
pub use node::{Corner, Node};
pub use node_ref::{LeafIdx, NODE_ADDRESS_UNIT, NodeIdx, NodeLink, NodeRef};
pub use primitive::{LeafBlock, Primitive, PrimitiveType, Triangle1, VirtualItem};
pub use quantized_node::QuantizedNode;
pub use sah::SahCostModel;
pub use statistics::TreeStatistics;
pub use validation::ValidationError;

/// Branching factor.
pub const N: usize = 4;
/// Cost of one traversal step in the SAH estimate.
pub const TRAVERSAL_COST: f32 = 1.0;
/// Depth limit for inner nodes produced by a builder.
pub const MAX_BUILD_DEPTH: usize = 26;
/// Additional depth a builder may spend on leaf chains.
pub const MAX_BUILD_DEPTH_LEAF: usize = 32;
/// Deepest tree a traversal stack has to handle.
pub const MAX_DEPTH: usize = MAX_BUILD_DEPTH + MAX_BUILD_DEPTH_LEAF;
/// Scale applied to a leaf reference offset to get a byte offset into the leaf array.
pub const LEAF_STRIDE: usize = 4;

// One leaf offset index step is exactly one leaf block.
const _: () = assert!((1 << 4) * LEAF_STRIDE == size_of::<LeafBlock>());

/// Four-wide BVH over a node array and a leaf array.
///
/// Populated once by a builder, read only afterwards.
#[derive(Clone, Debug)]
pub struct Bvh4i {
    root: NodeRef,
    bounds: WorldBox,
    primitive_type: PrimitiveType,
    geometry: GeometryHandle,

    nodes: IndexVec<NodeIdx, Node>,
    leaves: Vec<LeafBlock>,
}

impl Bvh4i {
    /// Empty hierarchy, nothing to hit.
    pub fn new(primitive_type: PrimitiveType, geometry: GeometryHandle) -> Bvh4i {
        Bvh4i {
            root: NodeRef::EMPTY,
            bounds: WorldBox::empty(),
            primitive_type,
            geometry,
            nodes: IndexVec::new(),
            leaves: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeRef {
        self.root
    }

    pub fn bounds(&self) -> &WorldBox {
        &self.bounds
    }

    pub fn primitive_type(&self) -> &PrimitiveType {
        &self.primitive_type
    }

    pub fn geometry(&self) -> &GeometryHandle {
        &self.geometry
    }

    pub fn nodes(&self) -> &IndexVec<NodeIdx, Node> {
        &self.nodes
    }

    pub fn node(&self, node: NodeRef) -> &Node {
        debug_assert!(node.is_node_aligned(), "{node:?}");
        &self.nodes[node.node_index()]
    }

    /// Raw bytes of the records of a leaf.
    pub fn leaf_bytes(&self, leaf: NodeRef) -> &[u8] {
        let (start, items) = leaf.leaf(LEAF_STRIDE);
        let len = items as usize * self.primitive_type.bytes;
        &bytemuck::cast_slice::<LeafBlock, u8>(&self.leaves)[start..start + len]
    }

    /// Records of a leaf, `P` must be the primitive type of this hierarchy.
    pub fn leaf_records<P: Primitive>(&self, leaf: NodeRef) -> &[P] {
        debug_assert!(P::TYPE == self.primitive_type);
        bytemuck::cast_slice(self.leaf_bytes(leaf))
    }

    pub fn node_bytes(&self) -> usize {
        self.nodes.len() * size_of::<Node>()
    }

    pub fn leaf_bytes_total(&self) -> usize {
        self.leaves.len() * size_of::<LeafBlock>()
    }

    /// Memory footprint of both arrays.
    pub fn bytes(&self) -> usize {
        self.node_bytes() + self.leaf_bytes_total()
    }

    /// Byte quantized copy of the node array, indexed the same way.
    pub fn quantized_nodes(&self) -> IndexVec<NodeIdx, QuantizedNode> {
        self.nodes.iter().map(QuantizedNode::from).collect()
    }
}

/// Non-owning handle to the geometry a hierarchy was built over.
#[derive(Clone, Default)]
pub struct GeometryHandle(Option<Weak<dyn Any + Send + Sync>>);

impl GeometryHandle {
    pub fn none() -> GeometryHandle {
        GeometryHandle(None)
    }

    pub fn new<T: Any + Send + Sync>(geometry: &Arc<T>) -> GeometryHandle {
        let weak: Weak<dyn Any + Send + Sync> = Arc::<T>::downgrade(geometry);
        GeometryHandle(Some(weak))
    }

    /// `None` if there is no geometry or it was already dropped.
    pub fn upgrade(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.0.as_ref()?.upgrade()
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.upgrade()?.downcast::<T>().ok()
    }
}

impl std::fmt::Debug for GeometryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            None => f.write_str("GeometryHandle(none)"),
            Some(weak) => write!(f, "GeometryHandle({} strong)", weak.strong_count()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::geometry::WorldPoint;

    use assert2::{assert, let_assert};

    fn b(min: [f32; 3], max: [f32; 3]) -> WorldBox {
        WorldBox::new(min.into(), max.into())
    }

    fn triangle(offset: f32, prim_id: u32) -> Triangle1 {
        Triangle1::new(
            [
                WorldPoint::new(offset, 0.0, 0.0),
                WorldPoint::new(offset + 1.0, 0.0, 0.0),
                WorldPoint::new(offset, 1.0, 1.0),
            ],
            0,
            prim_id,
            !0,
        )
    }

    /// Root with a three triangle leaf and an inner child holding two single triangle leaves.
    pub(super) fn two_level() -> Bvh4i {
        let mut output = BuildOutput::default();
        let root = output.reserve_node();
        let inner = output.reserve_node();

        let l0 = output.push_leaf(&[triangle(0.0, 0), triangle(0.5, 1), triangle(1.0, 2)]);
        let l1 = output.push_leaf(&[triangle(4.0, 3)]);
        let l2 = output.push_leaf(&[triangle(6.0, 4)]);

        output.nodes[inner] = Node::from_children(&[
            (b([4.0, 0.0, 0.0], [5.0, 1.0, 1.0]), l1),
            (b([6.0, 0.0, 0.0], [7.0, 1.0, 1.0]), l2),
        ]);
        output.nodes[root] = Node::from_children(&[
            (b([0.0, 0.0, 0.0], [2.0, 1.0, 1.0]), l0),
            (b([4.0, 0.0, 0.0], [7.0, 1.0, 1.0]), NodeRef::new_inner(inner)),
        ]);
        output.root = NodeRef::new_inner(root);
        output.bounds = b([0.0, 0.0, 0.0], [7.0, 1.0, 1.0]);

        Bvh4i::from_output(Triangle1::TYPE, GeometryHandle::none(), output)
    }

    #[test]
    fn new_is_empty() {
        let bvh = Bvh4i::new(Triangle1::TYPE, GeometryHandle::none());
        assert!(bvh.root() == NodeRef::EMPTY);
        assert!(bvh.bounds().is_empty());
        assert!(bvh.nodes().is_empty());
        assert!(bvh.bytes() == 0);
        assert!(bvh.leaf_bytes(bvh.root()).is_empty());
        assert!(bvh.quantized_nodes().is_empty());
    }

    #[test]
    fn bytes_sum_both_arrays() {
        let bvh = two_level();
        assert!(bvh.node_bytes() == 2 * 128);
        assert!(bvh.leaf_bytes_total() == 5 * 64);
        assert!(bvh.bytes() == bvh.node_bytes() + bvh.leaf_bytes_total());
    }

    #[test]
    fn leaf_records_resolve() {
        let bvh = two_level();
        let root = bvh.node(bvh.root());

        let leaf = bvh.leaf_records::<Triangle1>(root.child(0));
        assert!(leaf.len() == 3);
        assert!(leaf.iter().map(|t| t.prim_id()).collect::<Vec<_>>() == vec![0, 1, 2]);
        assert!(bvh.leaf_bytes(root.child(0)).len() == 3 * 64);

        let inner = bvh.node(root.child(1));
        let_assert!([t] = bvh.leaf_records::<Triangle1>(inner.child(1)));
        assert!(t.prim_id() == 4);
    }

    #[test]
    fn quantized_nodes_follow_node_indices() {
        let bvh = two_level();
        let quantized = bvh.quantized_nodes();
        assert!(quantized.len() == bvh.nodes().len());
        for (node, q) in bvh.nodes().iter().zip(quantized.iter()) {
            for i in node.valid_slots() {
                assert!(q.child(i) == node.child(i));
                assert!(q.bounds(i).contains(&node.bounds(i)));
            }
        }
    }

    #[test]
    fn geometry_handle_does_not_own() {
        let scene = Arc::new(vec![1u32, 2, 3]);
        let handle = GeometryHandle::new(&scene);
        let_assert!(Some(upgraded) = handle.downcast::<Vec<u32>>());
        assert!(*upgraded == vec![1, 2, 3]);
        assert!(handle.downcast::<String>().is_none());
        drop(upgraded);

        drop(scene);
        assert!(handle.upgrade().is_none());
        assert!(GeometryHandle::none().upgrade().is_none());
    }

    #[test]
    fn send_sync() {
        fn check<T: Send + Sync>() {}
        check::<Bvh4i>();
    }
}
