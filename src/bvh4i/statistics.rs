use std::fmt::Display;

use super::{Bvh4i, NodeLink, NodeRef};
use crate::util::Stats;

/// Shape summary of a hierarchy.
#[derive(Clone, Debug, PartialEq)]
pub struct TreeStatistics {
    /// Depth of every leaf, root leaf has depth 1
    pub depth: Stats,
    /// Number of used slots per inner node
    pub inner_fill: Stats,
    /// Number of records per non-empty leaf
    pub leaf_items: Stats,
}

impl Bvh4i {
    pub fn statistics(&self) -> TreeStatistics {
        let mut statistics = TreeStatistics {
            depth: Stats::default(),
            inner_fill: self
                .nodes
                .iter()
                .map(|node| {
                    node.valid_slots()
                        .filter(|&i| node.child(i) != NodeRef::INVALID)
                        .count()
                })
                .collect(),
            leaf_items: Stats::default(),
        };
        self.statistics_recursive(self.root, 1, &mut statistics);
        statistics
    }

    fn statistics_recursive(&self, node: NodeRef, depth: usize, statistics: &mut TreeStatistics) {
        match node.decode() {
            NodeLink::Invalid => {}
            NodeLink::Empty => statistics.depth.add_sample(depth),
            NodeLink::Leaf { items, .. } => {
                statistics.depth.add_sample(depth);
                statistics.leaf_items.add_sample(items as usize);
            }
            NodeLink::Inner { index } => {
                let inner = &self.nodes[index];
                for i in inner.valid_slots() {
                    self.statistics_recursive(inner.child(i), depth + 1, statistics);
                }
            }
        }
    }
}

impl Display for TreeStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Depth: {}", self.depth)?;
        writeln!(f, "Inner node child count: {}", self.inner_fill)?;
        write!(f, "Leaf node fill: {}", self.leaf_items)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::bvh4i::{GeometryHandle, Primitive, Triangle1, test::two_level};

    use assert2::assert;

    #[test]
    fn two_level_shape() {
        let statistics = two_level().statistics();

        assert!(statistics.depth.min == 2);
        assert!(statistics.depth.max == 3);
        assert!(statistics.depth.count == 3);

        assert!(statistics.inner_fill.count == 2);
        assert!(statistics.inner_fill.min == 2);
        assert!(statistics.inner_fill.max == 2);

        assert!(statistics.leaf_items.sum == 5);
        assert!(statistics.leaf_items.max == 3);
    }

    #[test]
    fn empty_hierarchy() {
        let statistics = Bvh4i::new(Triangle1::TYPE, GeometryHandle::none()).statistics();
        assert!(statistics.depth.count == 1);
        assert!(statistics.inner_fill.count == 0);
        assert!(statistics.leaf_items.count == 0);
    }

    #[test]
    fn display() {
        let text = two_level().statistics().to_string();
        assert!(text.lines().count() == 3);
        assert!(text.starts_with("Depth: 2 - 3;"));
        assert!(text.contains("Inner node child count: 2 - 2; avg 2.0; 2 samples"));
    }
}
