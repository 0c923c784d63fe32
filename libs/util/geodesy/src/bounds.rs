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
use crate::GeoPoint;
use smallvec::{smallvec, SmallVec};

/// A geographic rectangle. `west > east` encodes a span across the
/// antimeridian; all predicates account for that case.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl GeoBounds {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        debug_assert!(south <= north);
        Self {
            west,
            south,
            east,
            north,
        }
    }

    pub fn whole_earth() -> Self {
        Self::new(-180., -90., 180., 90.)
    }

    pub fn crosses_antimeridian(&self) -> bool {
        self.west > self.east
    }

    pub fn contains(&self, p: &GeoPoint) -> bool {
        if p.latitude < self.south || p.latitude > self.north {
            return false;
        }
        if self.crosses_antimeridian() {
            p.longitude >= self.west || p.longitude <= self.east
        } else {
            p.longitude >= self.west && p.longitude <= self.east
        }
    }

    pub fn intersects(&self, other: &Self) -> bool {
        if self.north < other.south || self.south > other.north {
            return false;
        }
        for a in self.split_at_antimeridian() {
            for b in other.split_at_antimeridian() {
                if a.west <= b.east && a.east >= b.west {
                    return true;
                }
            }
        }
        false
    }

    /// Split into non-crossing rectangles: the span west of the line
    /// first, then the span east of it. Non-crossing bounds come back
    /// unchanged.
    pub fn split_at_antimeridian(&self) -> SmallVec<[GeoBounds; 2]> {
        if self.crosses_antimeridian() {
            smallvec![
                Self::new(self.west, self.south, 180., self.north),
                Self::new(-180., self.south, self.east, self.north),
            ]
        } else {
            smallvec![*self]
        }
    }

    pub fn center(&self) -> GeoPoint {
        let lat = (self.south + self.north) / 2.;
        let lon = if self.crosses_antimeridian() {
            GeoPoint::wrap_longitude((self.west + self.east + 360.) / 2.)
        } else {
            (self.west + self.east) / 2.
        };
        GeoPoint::new(lat, lon)
    }

    /// Corner points ordered west/south, east/south, east/north,
    /// west/north.
    pub fn corners(&self) -> [GeoPoint; 4] {
        [
            GeoPoint::new(self.south, self.west),
            GeoPoint::new(self.south, self.east),
            GeoPoint::new(self.north, self.east),
            GeoPoint::new(self.north, self.west),
        ]
    }

    pub fn longitude_span(&self) -> f64 {
        if self.crosses_antimeridian() {
            360. - (self.west - self.east)
        } else {
            self.east - self.west
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_simple_containment() {
        let b = GeoBounds::new(-10., -5., 10., 5.);
        assert!(b.contains(&GeoPoint::new(0., 0.)));
        assert!(!b.contains(&GeoPoint::new(6., 0.)));
        assert!(!b.contains(&GeoPoint::new(0., 11.)));
        assert!(!b.crosses_antimeridian());
    }

    #[test]
    fn test_antimeridian_containment() {
        // Fiji-ish: from 170E across the line to 170W.
        let b = GeoBounds::new(170., -30., -170., 0.);
        assert!(b.crosses_antimeridian());
        assert!(b.contains(&GeoPoint::new(-15., 179.)));
        assert!(b.contains(&GeoPoint::new(-15., -179.)));
        assert!(!b.contains(&GeoPoint::new(-15., 0.)));
    }

    #[test]
    fn test_split_orders_west_of_line_first() {
        let b = GeoBounds::new(170., -30., -170., 0.);
        let parts = b.split_at_antimeridian();
        assert_eq!(parts.len(), 2);
        assert_relative_eq!(parts[0].west, 170.);
        assert_relative_eq!(parts[0].east, 180.);
        assert_relative_eq!(parts[1].west, -180.);
        assert_relative_eq!(parts[1].east, -170.);
        assert_relative_eq!(b.longitude_span(), 20.);
    }

    #[test]
    fn test_intersects_across_line() {
        let crossing = GeoBounds::new(170., -30., -170., 0.);
        let east_side = GeoBounds::new(-175., -20., -160., -10.);
        let elsewhere = GeoBounds::new(0., -20., 20., -10.);
        assert!(crossing.intersects(&east_side));
        assert!(!crossing.intersects(&elsewhere));
    }

    #[test]
    fn test_center_across_line() {
        let b = GeoBounds::new(170., -10., -170., 10.);
        let c = b.center();
        assert_relative_eq!(c.latitude, 0.);
        assert_relative_eq!(c.longitude, 180. - 360., epsilon = 1e-9);
    }
}
