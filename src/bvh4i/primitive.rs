use bytemuck::{Pod, Zeroable};

use crate::geometry::{FloatType, WorldBox, WorldPoint, WorldVector};

/// Describes the leaf records of a BVH. Only leaf intersection and the SAH
/// estimate look at it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrimitiveType {
    pub name: &'static str,
    /// Size of a single leaf record in bytes
    pub bytes: usize,
    /// Cost of intersecting one record, relative to a traversal step
    pub intersection_cost: FloatType,
}

/// Plain-data leaf record.
pub trait Primitive: Pod {
    const TYPE: PrimitiveType;
}

/// Unit of leaf array storage. Leaf runs start on a block boundary.
#[repr(C, align(64))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct LeafBlock(pub [u8; 64]);

impl Default for LeafBlock {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Triangle packed into one cache line:
/// `v0 | prim_id`, `v1 | geom_id`, `v2 | mask`, `normal | 0`.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Triangle1 {
    v0: [FloatType; 3],
    prim_id: u32,
    v1: [FloatType; 3],
    geom_id: u32,
    v2: [FloatType; 3],
    mask: u32,
    normal: [FloatType; 3],
    _pad: u32,
}

impl Triangle1 {
    /// Normal is `(v0 - v1) × (v2 - v0)`, not normalized.
    pub fn new(
        vertices: [WorldPoint; 3],
        geom_id: u32,
        prim_id: u32,
        mask: u32,
    ) -> Triangle1 {
        let [v0, v1, v2] = vertices;
        let e1 = v0 - v1;
        let e2 = v2 - v0;
        Triangle1 {
            v0: v0.coords.into(),
            prim_id,
            v1: v1.coords.into(),
            geom_id,
            v2: v2.coords.into(),
            mask,
            normal: e1.cross(&e2).into(),
            _pad: 0,
        }
    }

    pub fn vertices(&self) -> [WorldPoint; 3] {
        [self.v0.into(), self.v1.into(), self.v2.into()]
    }

    pub fn normal(&self) -> WorldVector {
        self.normal.into()
    }

    pub fn geom_id(&self) -> u32 {
        self.geom_id
    }

    pub fn prim_id(&self) -> u32 {
        self.prim_id
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    pub fn bounds(&self) -> WorldBox {
        let [v0, v1, v2] = self.vertices();
        WorldBox::new(v0, v0)
            .union(&WorldBox::new(v1, v1))
            .union(&WorldBox::new(v2, v2))
    }
}

impl Primitive for Triangle1 {
    const TYPE: PrimitiveType = PrimitiveType {
        name: "triangle1",
        bytes: size_of::<Triangle1>(),
        intersection_cost: 1.0,
    };
}

/// Leaf record of user defined geometry, intersected through a callback
/// owned by the geometry.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct VirtualItem {
    pub geom_id: u32,
    pub item: u32,
}

impl Primitive for VirtualItem {
    const TYPE: PrimitiveType = PrimitiveType {
        name: "virtual",
        bytes: size_of::<VirtualItem>(),
        intersection_cost: 1.0,
    };
}
