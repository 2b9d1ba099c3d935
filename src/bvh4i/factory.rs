use std::{any::Any, sync::Arc};

use assert2::assert;
use index_vec::IndexVec;
use thiserror::Error;

use super::{
    Bvh4i, GeometryHandle, LeafBlock, LeafIdx, Node, NodeIdx, NodeRef, Primitive, PrimitiveType,
    Triangle1, ValidationError, VirtualItem,
};
use crate::geometry::WorldBox;

/// Build algorithm, also selects the leaf record type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BuildStrategy {
    ObjectSplitBinnedSah,
    ObjectSplitMorton,
    ObjectSplitEnhancedMorton,
    ObjectSplitMorton64Bit,
    PreSplitsBinnedSah,
    VirtualGeometryBinnedSah,
    MemoryConservativeBinnedSah,
}

impl BuildStrategy {
    pub const ALL: [BuildStrategy; 7] = [
        BuildStrategy::ObjectSplitBinnedSah,
        BuildStrategy::ObjectSplitMorton,
        BuildStrategy::ObjectSplitEnhancedMorton,
        BuildStrategy::ObjectSplitMorton64Bit,
        BuildStrategy::PreSplitsBinnedSah,
        BuildStrategy::VirtualGeometryBinnedSah,
        BuildStrategy::MemoryConservativeBinnedSah,
    ];

    pub fn primitive_type(self) -> PrimitiveType {
        match self {
            BuildStrategy::VirtualGeometryBinnedSah => VirtualItem::TYPE,
            _ => Triangle1::TYPE,
        }
    }
}

/// Tree construction algorithm over scenes of type `S`.
pub trait Builder<S: ?Sized> {
    type Error: std::error::Error + Send + Sync + 'static;

    fn supports(&self, _strategy: BuildStrategy) -> bool {
        true
    }

    /// Leaves must hold records of `strategy.primitive_type()`, inner nodes
    /// must stay within [`MAX_BUILD_DEPTH`](super::MAX_BUILD_DEPTH) levels,
    /// leaf chains within [`MAX_BUILD_DEPTH_LEAF`](super::MAX_BUILD_DEPTH_LEAF) more.
    fn build(&mut self, scene: &S, strategy: BuildStrategy) -> Result<BuildOutput, Self::Error>;
}

/// Arrays written by a builder, moved into a [`Bvh4i`] afterwards.
#[derive(Clone, Debug)]
pub struct BuildOutput {
    pub root: NodeRef,
    pub bounds: WorldBox,
    pub nodes: IndexVec<NodeIdx, Node>,
    pub leaves: Vec<LeafBlock>,
}

impl BuildOutput {
    pub fn push_node(&mut self, node: Node) -> NodeIdx {
        self.nodes.push(node)
    }

    /// Placeholder node, to be overwritten once the children are known.
    pub fn reserve_node(&mut self) -> NodeIdx {
        self.push_node(Node::EMPTY)
    }

    /// Appends a leaf run starting at a new leaf block.
    /// Returns `EMPTY` for no records, panics on more than `MAX_ITEMS`.
    pub fn push_leaf<P: Primitive>(&mut self, records: &[P]) -> NodeRef {
        if records.is_empty() {
            return NodeRef::EMPTY;
        }
        assert!(records.len() <= NodeRef::MAX_ITEMS as usize, "{} records", records.len());

        let start = self.leaves.len();
        let bytes: &[u8] = bytemuck::cast_slice(records);
        let blocks = bytes.len().div_ceil(size_of::<LeafBlock>());
        self.leaves.resize(start + blocks, LeafBlock::default());
        bytemuck::cast_slice_mut::<LeafBlock, u8>(&mut self.leaves[start..])[..bytes.len()]
            .copy_from_slice(bytes);

        NodeRef::new_leaf(LeafIdx::from_usize(start), records.len() as u32)
    }
}

impl Default for BuildOutput {
    fn default() -> Self {
        BuildOutput {
            root: NodeRef::EMPTY,
            bounds: WorldBox::empty(),
            nodes: IndexVec::new(),
            leaves: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("builder does not support {0:?}")]
    UnsupportedStrategy(BuildStrategy),

    #[error("builder failed: {0}")]
    Builder(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("builder produced an invalid hierarchy: {0}")]
    InvalidOutput(#[from] ValidationError),
}

impl Bvh4i {
    pub(crate) fn from_output(
        primitive_type: PrimitiveType,
        geometry: GeometryHandle,
        output: BuildOutput,
    ) -> Bvh4i {
        Bvh4i {
            root: output.root,
            bounds: output.bounds,
            primitive_type,
            geometry,
            nodes: output.nodes,
            leaves: output.leaves,
        }
    }

    /// Builds a hierarchy over `scene`. Only a weak handle to the scene is kept.
    pub fn build<S: Any + Send + Sync>(
        scene: &Arc<S>,
        builder: &mut impl Builder<S>,
        strategy: BuildStrategy,
    ) -> Result<Bvh4i, BuildError> {
        if !builder.supports(strategy) {
            return Err(BuildError::UnsupportedStrategy(strategy));
        }

        let primitive_type = strategy.primitive_type();
        log::debug!("Building {strategy:?} with {} leaves", primitive_type.name);

        let output = builder
            .build(scene, strategy)
            .map_err(|e| BuildError::Builder(Box::new(e)))?;
        let bvh = Bvh4i::from_output(primitive_type, GeometryHandle::new(scene), output);

        #[cfg(debug_assertions)]
        bvh.validate()?;

        log::info!(
            "Built {strategy:?}: {} nodes ({} B), {} leaf blocks ({} B)",
            bvh.nodes.len(),
            bvh.node_bytes(),
            bvh.leaves.len(),
            bvh.leaf_bytes_total()
        );
        Ok(bvh)
    }

    pub fn triangle1_object_split_binned_sah<S: Any + Send + Sync>(
        scene: &Arc<S>,
        builder: &mut impl Builder<S>,
    ) -> Result<Bvh4i, BuildError> {
        Self::build(scene, builder, BuildStrategy::ObjectSplitBinnedSah)
    }

    pub fn triangle1_object_split_morton<S: Any + Send + Sync>(
        scene: &Arc<S>,
        builder: &mut impl Builder<S>,
    ) -> Result<Bvh4i, BuildError> {
        Self::build(scene, builder, BuildStrategy::ObjectSplitMorton)
    }

    pub fn triangle1_object_split_enhanced_morton<S: Any + Send + Sync>(
        scene: &Arc<S>,
        builder: &mut impl Builder<S>,
    ) -> Result<Bvh4i, BuildError> {
        Self::build(scene, builder, BuildStrategy::ObjectSplitEnhancedMorton)
    }

    pub fn triangle1_object_split_morton_64bit<S: Any + Send + Sync>(
        scene: &Arc<S>,
        builder: &mut impl Builder<S>,
    ) -> Result<Bvh4i, BuildError> {
        Self::build(scene, builder, BuildStrategy::ObjectSplitMorton64Bit)
    }

    pub fn triangle1_pre_splits_binned_sah<S: Any + Send + Sync>(
        scene: &Arc<S>,
        builder: &mut impl Builder<S>,
    ) -> Result<Bvh4i, BuildError> {
        Self::build(scene, builder, BuildStrategy::PreSplitsBinnedSah)
    }

    pub fn virtual_geometry_binned_sah<S: Any + Send + Sync>(
        scene: &Arc<S>,
        builder: &mut impl Builder<S>,
    ) -> Result<Bvh4i, BuildError> {
        Self::build(scene, builder, BuildStrategy::VirtualGeometryBinnedSah)
    }

    pub fn triangle1_memory_conservative_binned_sah<S: Any + Send + Sync>(
        scene: &Arc<S>,
        builder: &mut impl Builder<S>,
    ) -> Result<Bvh4i, BuildError> {
        Self::build(scene, builder, BuildStrategy::MemoryConservativeBinnedSah)
    }
}
