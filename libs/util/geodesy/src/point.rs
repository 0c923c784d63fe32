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
use std::fmt;

/// A WGS84 geographic position: latitude and longitude in degrees,
/// height above ellipsoid in meters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub hae: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            hae: 0.,
        }
    }

    pub fn with_hae(latitude: f64, longitude: f64, hae: f64) -> Self {
        Self {
            latitude,
            longitude,
            hae,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.abs() <= 90. && self.longitude.abs() <= 180. && !self.hae.is_nan()
    }

    /// Wrap an arbitrary longitude into [-180, 180).
    pub fn wrap_longitude(longitude: f64) -> f64 {
        let mut lon = (longitude + 180.) % 360.;
        if lon < 0. {
            lon += 360.;
        }
        lon - 180.
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "({:0.6}, {:0.6}, {:0.1}m)",
            self.latitude, self.longitude, self.hae
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_wrap_longitude() {
        assert_relative_eq!(GeoPoint::wrap_longitude(0.), 0.);
        assert_relative_eq!(GeoPoint::wrap_longitude(190.), -170.);
        assert_relative_eq!(GeoPoint::wrap_longitude(-190.), 170.);
        assert_relative_eq!(GeoPoint::wrap_longitude(540.), -180.);
    }

    #[test]
    fn test_validity() {
        assert!(GeoPoint::new(45., 120.).is_valid());
        assert!(!GeoPoint::new(91., 0.).is_valid());
        assert!(!GeoPoint::new(0., 181.).is_valid());
    }
}
