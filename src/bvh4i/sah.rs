use assert2::assert;
use bon::bon;

use super::{Bvh4i, NodeLink, NodeRef, TRAVERSAL_COST};
use crate::geometry::{FloatType, WorldBox};

/// Constants of the surface area heuristic.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SahCostModel {
    /// Cost of visiting an inner node
    traversal_cost: FloatType,
    /// Cost of intersecting a single leaf record
    intersection_cost: FloatType,
}

#[bon]
impl SahCostModel {
    #[builder]
    pub fn new(
        #[builder(default = TRAVERSAL_COST)] traversal_cost: FloatType,
        #[builder(default = 1.0)] intersection_cost: FloatType,
    ) -> Self {
        assert!(traversal_cost >= 0.0);
        assert!(intersection_cost >= 0.0);
        SahCostModel {
            traversal_cost,
            intersection_cost,
        }
    }

    pub fn traversal_cost(&self) -> FloatType {
        self.traversal_cost
    }

    pub fn intersection_cost(&self) -> FloatType {
        self.intersection_cost
    }
}

impl Default for SahCostModel {
    fn default() -> Self {
        SahCostModel::builder().build()
    }
}

impl Bvh4i {
    /// Expected cost of a random ray through the root box, with the default
    /// traversal cost and the intersection cost of the primitive type.
    pub fn sah(&self) -> FloatType {
        self.sah_with(
            &SahCostModel::builder()
                .intersection_cost(self.primitive_type.intersection_cost)
                .build(),
        )
    }

    /// Every inner node costs `traversal_cost`, every leaf record `intersection_cost`,
    /// both weighted by the area of their box relative to the root box.
    /// A flat or unbounded root box weights everything by 1.
    pub fn sah_with(&self, model: &SahCostModel) -> FloatType {
        // Areas of f32 boxes overflow f32 above extents of ~1e19, never f64.
        let root_area = surface_area_f64(&self.bounds);
        let weight = |b: &WorldBox| {
            if root_area > 0.0 && root_area.is_finite() {
                surface_area_f64(b) / root_area
            } else {
                1.0
            }
        };
        self.sah_recursive(model, &weight, self.root, &self.bounds) as FloatType
    }

    fn sah_recursive(
        &self,
        model: &SahCostModel,
        weight: &impl Fn(&WorldBox) -> f64,
        node: NodeRef,
        bounds: &WorldBox,
    ) -> f64 {
        match node.decode() {
            NodeLink::Empty | NodeLink::Invalid => 0.0,
            NodeLink::Leaf { items, .. } => {
                f64::from(items) * f64::from(model.intersection_cost) * weight(bounds)
            }
            NodeLink::Inner { index } => {
                let inner = &self.nodes[index];
                let children: f64 = inner
                    .valid_slots()
                    .filter(|&i| inner.child(i) != NodeRef::INVALID)
                    .map(|i| self.sah_recursive(model, weight, inner.child(i), &inner.bounds(i)))
                    .sum();
                f64::from(model.traversal_cost) * weight(bounds) + children
            }
        }
    }
}

fn surface_area_f64(b: &WorldBox) -> f64 {
    if b.is_empty() {
        return 0.0;
    }
    let size = b.map_coords(f64::from).size();
    2.0 * (size.x * size.y + size.y * size.z + size.z * size.x)
}
