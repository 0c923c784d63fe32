// This file is part of Cartograph.
//
// Cartograph is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Cartograph is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Cartograph.  If not, see <http://www.gnu.org/licenses/>.
use nalgebra::Point3;
use std::ops::Sub;

/// An axis-aligned box over N ordered components. Used both for world
/// space extents and for geographic extents (lon/lat/HAE), so the
/// component type stays generic.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb<T, const N: usize> {
    lo: [T; N],
    hi: [T; N],
}

impl<T: Copy + PartialOrd + Sub<Output = T>, const N: usize> Aabb<T, N> {
    pub fn new(lo: [T; N], hi: [T; N]) -> Self {
        debug_assert!((0..N).all(|i| lo[i] <= hi[i]));
        Self { lo, hi }
    }

    pub fn contains(&self, p: [T; N]) -> bool {
        (0..N).all(|i| p[i] >= self.lo[i] && p[i] <= self.hi[i])
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        (0..N).all(|i| self.lo[i] <= other.hi[i] && self.hi[i] >= other.lo[i])
    }

    pub fn span(&self, i: usize) -> T {
        self.hi[i] - self.lo[i]
    }

    pub fn low(&self, i: usize) -> T {
        self.lo[i]
    }

    pub fn high(&self, i: usize) -> T {
        self.hi[i]
    }
}

pub type Aabb3 = Aabb<f64, 3>;

impl Aabb3 {
    pub fn from_bounds(lo: Point3<f64>, hi: Point3<f64>) -> Self {
        Self::new([lo.x, lo.y, lo.z], [hi.x, hi.y, hi.z])
    }

    /// Smallest box containing every input point. Empty input is a
    /// caller bug.
    pub fn from_points(points: &[Point3<f64>]) -> Self {
        debug_assert!(!points.is_empty());
        let mut lo = points[0];
        let mut hi = points[0];
        for p in &points[1..] {
            for i in 0..3 {
                if p[i] < lo[i] {
                    lo[i] = p[i];
                }
                if p[i] > hi[i] {
                    hi[i] = p[i];
                }
            }
        }
        Self::from_bounds(lo, hi)
    }

    pub fn lo(&self) -> Point3<f64> {
        Point3::new(self.lo[0], self.lo[1], self.lo[2])
    }

    pub fn hi(&self) -> Point3<f64> {
        Point3::new(self.hi[0], self.hi[1], self.hi[2])
    }

    pub fn center(&self) -> Point3<f64> {
        Point3::new(
            (self.lo[0] + self.hi[0]) / 2.,
            (self.lo[1] + self.hi[1]) / 2.,
            (self.lo[2] + self.hi[2]) / 2.,
        )
    }

    pub fn union(&self, other: &Self) -> Self {
        let mut lo = self.lo;
        let mut hi = self.hi;
        for i in 0..3 {
            if other.lo[i] < lo[i] {
                lo[i] = other.lo[i];
            }
            if other.hi[i] > hi[i] {
                hi[i] = other.hi[i];
            }
        }
        Self { lo, hi }
    }

    /// Distance from `p` to the nearest point of the box; zero inside.
    pub fn distance_to(&self, p: &Point3<f64>) -> f64 {
        let mut d2 = 0f64;
        for i in 0..3 {
            let v = p[i];
            if v < self.lo[i] {
                d2 += (self.lo[i] - v) * (self.lo[i] - v);
            } else if v > self.hi[i] {
                d2 += (v - self.hi[i]) * (v - self.hi[i]);
            }
        }
        d2.sqrt()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_contains_and_overlaps() {
        let b = Aabb::new([0f64; 3], [1f64; 3]);
        assert!(b.contains([0.5, 0.5, 0.5]));
        assert!(!b.contains([0., -1., 0.]));
        let c = Aabb::new([0.5f64; 3], [3f64; 3]);
        assert!(b.overlaps(&c));
        let d = Aabb::new([2f64; 3], [3f64; 3]);
        assert!(!b.overlaps(&d));
    }

    #[test]
    fn test_from_points_is_tight() {
        let b = Aabb3::from_points(&[
            Point3::new(1., -2., 3.),
            Point3::new(-1., 2., 0.),
            Point3::new(0., 0., 5.),
        ]);
        assert_eq!(b.lo(), Point3::new(-1., -2., 0.));
        assert_eq!(b.hi(), Point3::new(1., 2., 5.));
    }

    #[test]
    fn test_distance_to_surface() {
        let b = Aabb::new([0f64; 3], [1f64; 3]);
        assert_relative_eq!(b.distance_to(&Point3::new(0.5, 0.5, 0.5)), 0.);
        assert_relative_eq!(b.distance_to(&Point3::new(2., 0.5, 0.5)), 1.);
        assert_relative_eq!(b.distance_to(&Point3::new(2., 2., 0.5)), 2f64.sqrt());
    }
}
