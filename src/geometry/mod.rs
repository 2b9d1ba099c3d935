mod aabb;

use simba::simd::WideF32x4;

pub use aabb::AABB;

pub type FloatType = f32;
pub type SimdFloatType = WideF32x4;

pub type WorldPoint = nalgebra::Point3<FloatType>;
pub type WorldVector = nalgebra::Vector3<FloatType>;
pub type WorldBox = AABB<WorldPoint>;

/// Four points, one per lane; used for the children of a single node.
pub type WorldPoint4 = nalgebra::Point3<SimdFloatType>;
pub type WorldBox4 = AABB<WorldPoint4>;
