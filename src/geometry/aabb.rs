use std::ops::{Add, Sub};

use nalgebra::{DefaultAllocator, DimName, OPoint, Scalar, allocator::Allocator};
use simba::simd::{SimdPartialOrd as _, SimdValue};

use super::{FloatType, SimdFloatType, WorldBox, WorldBox4, WorldPoint, WorldVector};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AABB<Point> {
    pub min: Point,
    pub max: Point,
}

impl<Point> AABB<Point> {
    pub fn new(min: Point, max: Point) -> AABB<Point> {
        AABB { min, max }
    }

    pub fn with_size<S>(min: Point, size: &S) -> AABB<Point>
    where
        for<'a> &'a Point: Add<&'a S, Output = Point>,
    {
        let max = &min + size;
        AABB { min, max }
    }

    pub fn map<Point2, F: FnMut(&Point) -> Point2>(&self, mut f: F) -> AABB<Point2> {
        AABB {
            min: f(&self.min),
            max: f(&self.max),
        }
    }
}

impl<Point: Sub + Copy> AABB<Point> {
    pub fn size(&self) -> Point::Output {
        self.max - self.min
    }
}

impl<T: Scalar, D: DimName> AABB<OPoint<T, D>>
where
    DefaultAllocator: Allocator<D>,
{
    pub fn map_coords<T2: Scalar, F: FnMut(T) -> T2>(&self, mut f: F) -> AABB<OPoint<T2, D>> {
        self.map(|x| x.map(&mut f))
    }

    fn zip_map_coords<T2: Scalar, T3: Scalar, F: FnMut(T, T2) -> T3>(
        &self,
        rhs: &AABB<OPoint<T2, D>>,
        mut f: F,
    ) -> AABB<OPoint<T3, D>> {
        let mut zip = |x: &OPoint<T, D>, y: &OPoint<T2, D>| OPoint {
            coords: x.coords.zip_map(&y.coords, &mut f),
        };
        AABB {
            min: zip(&self.min, &rhs.min),
            max: zip(&self.max, &rhs.max),
        }
    }

    fn zip_apply_coords<T2: Scalar, F: FnMut(&mut T, T2)>(
        &mut self,
        rhs: &AABB<OPoint<T2, D>>,
        mut f: F,
    ) {
        self.min.coords.zip_apply(&rhs.min.coords, &mut f);
        self.max.coords.zip_apply(&rhs.max.coords, &mut f);
    }
}

impl WorldBox {
    /// Box that contains nothing and is the identity of `union`.
    /// This is also the sentinel written into unused node slots.
    pub fn empty() -> WorldBox {
        AABB {
            min: WorldPoint::from(WorldVector::repeat(FloatType::INFINITY)),
            max: WorldPoint::from(WorldVector::repeat(FloatType::NEG_INFINITY)),
        }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a WorldPoint>) -> Option<WorldBox> {
        let mut points = points.into_iter();
        let first = *points.next()?;
        Some(points.fold(WorldBox::new(first, first), |b, p| {
            b.union(&WorldBox::new(*p, *p))
        }))
    }

    pub fn union(&self, other: &WorldBox) -> WorldBox {
        AABB {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// True if the box is inverted on any axis (or contains NaN).
    pub fn is_empty(&self) -> bool {
        self.min
            .coords
            .iter()
            .zip(self.max.coords.iter())
            .any(|(min, max)| !(min <= max))
    }

    pub fn is_point(&self) -> bool {
        self.min == self.max
    }

    /// Inclusive, component-wise containment.
    pub fn contains(&self, other: &WorldBox) -> bool {
        let le = |a: &WorldPoint, b: &WorldPoint| {
            a.coords.iter().zip(b.coords.iter()).all(|(a, b)| a <= b)
        };
        le(&self.min, &other.min) && le(&other.max, &self.max)
    }

    pub fn surface_area(&self) -> FloatType {
        if self.is_empty() {
            return 0.0;
        }
        let size = self.size();
        2.0 * (size.x * size.y + size.y * size.z + size.z * size.x)
    }
}

impl WorldBox4 {
    /// Bitmask of lanes whose box is not empty.
    pub fn non_empty_mask(&self) -> u64 {
        let le = |a: SimdFloatType, b: SimdFloatType| a.simd_le(b);
        let mask = le(self.min.x, self.max.x)
            & le(self.min.y, self.max.y)
            & le(self.min.z, self.max.z);
        mask.0.move_mask() as u64
    }
}

impl<T: SimdValue + Scalar, D: DimName> SimdValue for AABB<OPoint<T, D>>
where
    T::Element: SimdValue + Scalar,
    DefaultAllocator: Allocator<D>,
{
    const LANES: usize = T::LANES;

    type Element = AABB<OPoint<T::Element, D>>;

    type SimdBool = T::SimdBool;

    fn splat(val: Self::Element) -> Self {
        val.map_coords(|x| T::splat(x))
    }

    fn extract(&self, i: usize) -> Self::Element {
        self.map_coords(|x| x.extract(i))
    }

    unsafe fn extract_unchecked(&self, i: usize) -> Self::Element {
        unsafe { self.map_coords(|x| x.extract_unchecked(i)) }
    }

    fn replace(&mut self, i: usize, val: Self::Element) {
        self.zip_apply_coords(&val, |x, y| x.replace(i, y.clone()));
    }

    unsafe fn replace_unchecked(&mut self, i: usize, val: Self::Element) {
        unsafe {
            self.zip_apply_coords(&val, |x, y| x.replace_unchecked(i, y.clone()));
        }
    }

    fn select(self, cond: Self::SimdBool, other: Self) -> Self {
        self.zip_map_coords(&other, |x, y| x.select(cond, y.clone()))
    }
}
