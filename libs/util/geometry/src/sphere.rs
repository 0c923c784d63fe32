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
use crate::Aabb3;
use nalgebra::Point3;

/// Bounding sphere, e.g. around a scene node's geometry.
#[derive(Clone, Copy, Debug)]
pub struct Sphere {
    center: Point3<f64>,
    radius: f64,
}

impl Default for Sphere {
    fn default() -> Self {
        Self {
            center: Point3::origin(),
            radius: 1_f64,
        }
    }
}

impl Sphere {
    pub fn from_center_and_radius(center: &Point3<f64>, radius: f64) -> Self {
        Self {
            center: *center,
            radius,
        }
    }

    /// Sphere circumscribing the box.
    pub fn around(aabb: &Aabb3) -> Self {
        let center = aabb.center();
        let radius = (aabb.hi() - center).norm();
        Self { center, radius }
    }

    pub fn center(&self) -> &Point3<f64> {
        &self.center
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn contains(&self, p: &Point3<f64>) -> bool {
        (p - self.center).norm_squared() <= self.radius * self.radius
    }

    pub fn intersects_aabb(&self, aabb: &Aabb3) -> bool {
        aabb.distance_to(&self.center) <= self.radius
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_around_box() {
        let b = Aabb3::from_bounds(Point3::new(-1., -1., -1.), Point3::new(1., 1., 1.));
        let s = Sphere::around(&b);
        assert_eq!(*s.center(), Point3::origin());
        assert!(s.contains(&Point3::new(1., 1., 1.)));
        assert!(!s.contains(&Point3::new(2., 0., 0.)));
    }

    #[test]
    fn test_sphere_aabb_intersect() {
        let b = Aabb3::from_bounds(Point3::new(0., 0., 0.), Point3::new(1., 1., 1.));
        let near = Sphere::from_center_and_radius(&Point3::new(2., 0.5, 0.5), 1.5);
        let far = Sphere::from_center_and_radius(&Point3::new(3., 0.5, 0.5), 1.5);
        assert!(near.intersects_aabb(&b));
        assert!(!far.intersects_aabb(&b));
    }
}
