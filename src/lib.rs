pub mod bvh4i;
pub mod geometry;
mod util;

pub use bvh4i::{Bvh4i, Node, NodeRef, QuantizedNode};
pub use util::{SetBits, Stats};
