//! Byte quantized node, half the size of [`Node`].
//!
//! Child boxes are stored as 8 bit offsets from a per-node origin (`start`)
//! in multiples of a per-axis `step`. Quantization rounds outwards, so the
//! decompressed box always contains the original one.

use std::array;

use assert2::debug_assert;
use bytemuck::{Pod, Zeroable};
use simba::simd::WideF32x4;
use wide::f32x4;

use super::{N, Node, NodeRef};
use crate::geometry::{FloatType, WorldBox, WorldBox4, WorldPoint, WorldPoint4, WorldVector};

/// Number of steps between the lowest and the highest representable value.
const QUANTIZATION_STEPS: FloatType = u8::MAX as FloatType;

/// Field order keeps each child reference in the last 4 bytes of a 16 byte row.
#[repr(C, align(64))]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct QuantizedNode {
    start: [FloatType; 3],
    child0: NodeRef,
    step: [FloatType; 3],
    child1: NodeRef,
    /// `lower[3 * i + axis]`
    lower: [u8; 3 * N],
    child2: NodeRef,
    upper: [u8; 3 * N],
    child3: NodeRef,
}

impl QuantizedNode {
    pub fn new(node: &Node) -> Self {
        let origin = WorldPoint::origin();
        // Empty slots must not widen the range. A node without any valid child
        // collapses into a point at the origin.
        let enclosing = node
            .combined_bounds()
            .unwrap_or_else(|| WorldBox::new(origin, origin));
        let placeholder = WorldBox::new(enclosing.min, enclosing.min);
        let children: [WorldBox; N] = array::from_fn(|i| {
            if node.is_empty_slot(i) {
                placeholder.clone()
            } else {
                node.bounds(i)
            }
        });

        let mut quantized = QuantizedNode {
            start: enclosing.min.coords.into(),
            child0: node.child(0),
            step: [0.0; 3],
            child1: node.child(1),
            lower: [0; 3 * N],
            child2: node.child(2),
            upper: [0; 3 * N],
            child3: node.child(3),
        };

        for axis in 0..3 {
            let start = enclosing.min[axis];
            let end = enclosing.max[axis];
            let step = axis_step(start, end);
            let scale = if end > start {
                QUANTIZATION_STEPS / (end - start)
            } else {
                0.0
            };

            quantized.step[axis] = step;
            for (i, child) in children.iter().enumerate() {
                let (lower, upper) =
                    quantize_interval(start, step, scale, child.min[axis], child.max[axis]);
                quantized.lower[3 * i + axis] = lower;
                quantized.upper[3 * i + axis] = upper;
            }
        }

        debug_assert!(
            node.valid_slots()
                .all(|i| quantized.bounds(i).contains(&node.bounds(i))),
            "{node:?} -> {quantized:?}"
        );

        quantized
    }

    pub fn child(&self, i: usize) -> NodeRef {
        match i {
            0 => self.child0,
            1 => self.child1,
            2 => self.child2,
            3 => self.child3,
            _ => panic!("child slot {i} out of range"),
        }
    }

    pub fn start(&self) -> WorldPoint {
        self.start.into()
    }

    /// Size of one quantization step on each axis.
    pub fn step(&self) -> WorldVector {
        self.step.into()
    }

    pub fn lower_bytes(&self, i: usize) -> [u8; 3] {
        array::from_fn(|axis| self.lower[3 * i + axis])
    }

    pub fn upper_bytes(&self, i: usize) -> [u8; 3] {
        array::from_fn(|axis| self.upper[3 * i + axis])
    }

    /// Decompressed box of child `i`.
    pub fn bounds(&self, i: usize) -> WorldBox {
        debug_assert!(i < N);
        let corner = |bytes: &[u8; 3 * N]| {
            WorldPoint::from(array::from_fn::<_, 3, _>(|axis| {
                decompress(self.start[axis], self.step[axis], bytes[3 * i + axis])
            }))
        };
        WorldBox::new(corner(&self.lower), corner(&self.upper))
    }

    /// Decompressed boxes of all four children, one per lane.
    /// Bit-identical to [`Self::bounds`].
    pub fn bounds4(&self) -> WorldBox4 {
        let corner = |bytes: &[u8; 3 * N]| {
            let axis = |axis: usize| {
                let values: [FloatType; N] =
                    array::from_fn(|i| FloatType::from(bytes[3 * i + axis]));
                WideF32x4(
                    f32x4::splat(self.start[axis])
                        + f32x4::splat(self.step[axis]) * f32x4::from(values),
                )
            };
            WorldPoint4::new(axis(0), axis(1), axis(2))
        };
        WorldBox4::new(corner(&self.lower), corner(&self.upper))
    }

    pub fn is_point(&self, i: usize) -> bool {
        self.bounds(i).is_point()
    }
}

impl From<&Node> for QuantizedNode {
    fn from(node: &Node) -> Self {
        QuantizedNode::new(node)
    }
}

/// Kept as separate multiply and add; the lane-wise version does the same.
fn decompress(start: FloatType, step: FloatType, value: u8) -> FloatType {
    start + step * FloatType::from(value)
}

/// Step size for range `start..=end`, such that the highest byte value decompresses to
/// at least `end`.
fn axis_step(start: FloatType, end: FloatType) -> FloatType {
    let mut step = (end - start) / QUANTIZATION_STEPS;
    if !step.is_finite() {
        step = FloatType::MAX;
    }
    while decompress(start, step, u8::MAX) < end {
        step = step.next_up();
    }
    step
}

/// Encodes `lower..=upper` rounding outwards.
fn quantize_interval(
    start: FloatType,
    step: FloatType,
    scale: FloatType,
    lower: FloatType,
    upper: FloatType,
) -> (u8, u8) {
    let mut quantized_lower = to_byte((lower - start) * scale - 0.5);
    let mut quantized_upper = to_byte((upper - start) * scale + 0.5);

    // The half step margin covers the rounding, but `scale` and `step` are not exact
    // inverses. Walk outwards until the decompressed values enclose the input.
    while quantized_lower > 0 && decompress(start, step, quantized_lower) > lower {
        quantized_lower -= 1;
    }
    while quantized_upper < u8::MAX && decompress(start, step, quantized_upper) < upper {
        quantized_upper += 1;
    }

    (quantized_lower, quantized_upper)
}

fn to_byte(v: FloatType) -> u8 {
    // NaN saturates to 0
    v.round().clamp(0.0, QUANTIZATION_STEPS) as u8
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::geometry::test::world_box;

    use assert2::assert;
    use proptest::prelude::*;
    use simba::simd::SimdValue as _;
    use test_strategy::proptest;

    fn b(min: [f32; 3], max: [f32; 3]) -> WorldBox {
        WorldBox::new(min.into(), max.into())
    }

    fn node_with(children: &[Option<WorldBox>; N]) -> Node {
        let mut node = Node::EMPTY;
        for (i, child) in children.iter().enumerate() {
            if let Some(bounds) = child {
                node.set_bounds(i, bounds);
                *node.child_mut(i) = NodeRef::new_leaf((i as u32).into(), 1);
            }
        }
        node
    }

    fn optional_children() -> impl Strategy<Value = [Option<WorldBox>; N]> {
        proptest::array::uniform4(proptest::option::weighted(0.8, world_box()))
    }

    /// Moves the boxes far away from the origin, where float spacing is coarse.
    fn shifted(children: [Option<WorldBox>; N], offset: f32) -> [Option<WorldBox>; N] {
        let offset = WorldVector::repeat(offset);
        children.map(|child| child.map(|c| c.map(|p| *p + offset)))
    }

    #[test]
    fn layout() {
        assert!(size_of::<QuantizedNode>() == 64);
        assert!(align_of::<QuantizedNode>() == 64);
    }

    #[test]
    fn child_references_end_each_row() {
        let mut node = Node::EMPTY;
        for i in 0..N {
            *node.child_mut(i) = NodeRef::from_raw(0x1000 + i as u32);
        }
        let quantized = QuantizedNode::new(&node);
        let words: &[u32] = bytemuck::cast_slice(bytemuck::bytes_of(&quantized));
        for i in 0..N {
            assert!(words[3 + 4 * i] == 0x1000 + i as u32);
            assert!(quantized.child(i) == node.child(i));
        }
    }

    #[test]
    fn quantized_from_bytes() {
        let node = node_with(&[Some(b([0.0; 3], [1.0; 3])), None, None, None]);
        let quantized = QuantizedNode::new(&node);
        let copy: QuantizedNode = bytemuck::pod_read_unaligned(bytemuck::bytes_of(&quantized));
        assert!(copy == quantized);
        assert!(bytemuck::bytes_of(&QuantizedNode::zeroed()).iter().all(|b| *b == 0));
    }

    /// Two children, one of them a point, and two invalid slots.
    #[test]
    fn point_and_box_with_invalid_slots() {
        let b0 = b([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        let b1 = b([2.0, 2.0, 2.0], [2.0, 2.0, 2.0]);
        let node = node_with(&[Some(b0.clone()), Some(b1.clone()), None, None]);
        assert!(node.is_point(1));

        let quantized = QuantizedNode::new(&node);

        assert!(quantized.bounds(0).contains(&b0));
        assert!(quantized.bounds(1).contains(&b1));
        assert!(quantized.start() == WorldPoint::origin());
        assert!(quantized.step() == WorldVector::repeat(axis_step(0.0, 2.0)));
        assert!(quantized.child(2) == NodeRef::INVALID);
        assert!(quantized.child(3) == NodeRef::INVALID);
    }

    #[test]
    fn all_slots_invalid_collapse_to_origin() {
        let quantized = QuantizedNode::new(&Node::EMPTY);
        assert!(quantized.start() == WorldPoint::origin());
        assert!(quantized.step() == WorldVector::zeros());
        for i in 0..N {
            assert!(quantized.bounds(i) == b([0.0; 3], [0.0; 3]));
            assert!(quantized.is_point(i));
            assert!(quantized.child(i) == NodeRef::INVALID);
        }
    }

    #[test]
    fn flat_axis_is_reproduced_exactly() {
        let b0 = b([0.0, 0.0, 3.5], [1.0, 1.0, 3.5]);
        let b1 = b([-4.0, 2.0, 3.5], [0.5, 9.0, 3.5]);
        let quantized = QuantizedNode::new(&node_with(&[Some(b0), None, Some(b1), None]));
        assert!(quantized.step().z == 0.0);
        for i in [0, 2] {
            assert!(quantized.bounds(i).min.z == 3.5);
            assert!(quantized.bounds(i).max.z == 3.5);
        }
    }

    #[test]
    fn points_are_detected_after_decompression() {
        let p = b([1.0, 1.0, 1.0], [1.0, 1.0, 1.0]);
        let quantized = QuantizedNode::new(&node_with(&[Some(p.clone()), None, None, None]));
        assert!(quantized.is_point(0));
        assert!(quantized.bounds(0) == p);

        let wide = b([0.0, 0.0, 0.0], [8.0, 8.0, 8.0]);
        let quantized = QuantizedNode::new(&node_with(&[Some(p), Some(wide), None, None]));
        assert!(!quantized.is_point(1));
    }

    #[proptest]
    fn quantization_is_conservative(#[strategy(optional_children())] children: [Option<WorldBox>; N]) {
        let node = node_with(&children);
        let quantized = QuantizedNode::new(&node);
        for (i, child) in children.iter().enumerate() {
            if let Some(child) = child {
                assert!(quantized.bounds(i).contains(child), "{i}: {child:?}");
            }
        }
    }

    #[proptest]
    fn quantization_is_conservative_far_from_origin(
        #[strategy(optional_children())] children: [Option<WorldBox>; N],
        #[strategy(prop_oneof![Just(-3.0e6f32), Just(1.0e5f32), Just(7.77e7f32)])] offset: f32,
    ) {
        let children = shifted(children, offset);
        let quantized = QuantizedNode::new(&node_with(&children));
        for (i, child) in children.iter().enumerate() {
            if let Some(child) = child {
                assert!(quantized.bounds(i).contains(child), "{i}: {child:?}");
            }
        }
    }

    #[proptest]
    fn quantization_error_is_within_two_steps(
        #[strategy(optional_children())] children: [Option<WorldBox>; N],
    ) {
        let quantized = QuantizedNode::new(&node_with(&children));
        let step = quantized.step();
        for (i, child) in children.iter().enumerate() {
            let Some(child) = child else { continue };
            let decompressed = quantized.bounds(i);
            for axis in 0..3 {
                let tolerance = 2.0 * step[axis] + 1e-3;
                assert!(child.min[axis] - decompressed.min[axis] <= tolerance);
                assert!(decompressed.max[axis] - child.max[axis] <= tolerance);
            }
        }
    }

    #[proptest]
    fn invalid_slots_do_not_affect_range(
        #[strategy(world_box())] b0: WorldBox,
        #[strategy(world_box())] b1: WorldBox,
        #[strategy(0usize..N)] slot0: usize,
        #[strategy(1usize..N)] distance: usize,
    ) {
        let slot1 = (slot0 + distance) % N;
        let mut children = [None, None, None, None];
        children[slot0] = Some(b0.clone());
        children[slot1] = Some(b1.clone());

        let quantized = QuantizedNode::new(&node_with(&children));
        let union = b0.union(&b1);

        assert!(quantized.start() == union.min);
        for axis in 0..3 {
            assert!(quantized.step()[axis] == axis_step(union.min[axis], union.max[axis]));
        }

        let packed = QuantizedNode::new(&node_with(&[Some(b0), Some(b1), None, None]));
        assert!(quantized.start() == packed.start());
        assert!(quantized.step() == packed.step());
        assert!(quantized.lower_bytes(slot0) == packed.lower_bytes(0));
        assert!(quantized.upper_bytes(slot1) == packed.upper_bytes(1));
    }

    #[proptest]
    fn full_range_children_hit_the_byte_limits(
        #[strategy(world_box())] b0: WorldBox,
        #[strategy(world_box())] b1: WorldBox,
    ) {
        let union = b0.union(&b1);
        let quantized = QuantizedNode::new(&node_with(&[Some(union.clone()), Some(b0), Some(b1), None]));
        assert!(quantized.bounds(0).contains(&union));
        assert!(quantized.lower_bytes(0) == [0; 3]);
    }

    #[proptest]
    fn simd_decompression_matches_scalar(#[strategy(optional_children())] children: [Option<WorldBox>; N]) {
        let quantized = QuantizedNode::new(&node_with(&children));
        let boxes = quantized.bounds4();
        for i in 0..N {
            assert!(boxes.extract(i) == quantized.bounds(i));
        }
    }

    #[test]
    fn axis_step_reaches_the_end() {
        for (start, end) in [(0.0, 1.0), (-3.3, 17.1), (1.0e7, 1.0e7 + 3.0), (0.1, 0.1)] {
            let step = axis_step(start, end);
            assert!(decompress(start, step, u8::MAX) >= end);
        }
        assert!(axis_step(-f32::MAX, f32::MAX) == f32::MAX);
    }

    #[test]
    #[should_panic]
    fn child_out_of_range() {
        QuantizedNode::new(&Node::EMPTY).child(N);
    }
}
