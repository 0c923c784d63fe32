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
use crate::{GeoBounds, GeoPoint};
use nalgebra::Point3;
use std::fmt::Debug;

pub const WGS84_SRID: u32 = 4326;
pub const WEB_MERCATOR_SRID: u32 = 3857;

const WGS84_SEMI_MAJOR: f64 = 6_378_137.0;

// Latitude beyond which the mercator y term diverges.
const WEB_MERCATOR_MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// A map projection: a pure, stateless mapping between geographic and
/// projected world coordinates. Both the render thread and worker
/// threads call these concurrently, hence the Send + Sync bound.
pub trait Projection: Debug + Send + Sync + 'static {
    fn srid(&self) -> u32;

    /// Geographic to projected world space. The z component carries
    /// height above ellipsoid through unchanged.
    fn forward(&self, geo: &GeoPoint) -> Point3<f64>;

    /// Projected world space back to geographic.
    fn inverse(&self, world: &Point3<f64>) -> GeoPoint;

    /// The geographic region this projection is defined over.
    fn bounds(&self) -> GeoBounds;
}

/// Plate carrée: degrees map to world units directly. SRID 4326.
#[derive(Clone, Copy, Debug, Default)]
pub struct Equirectangular;

impl Projection for Equirectangular {
    fn srid(&self) -> u32 {
        WGS84_SRID
    }

    fn forward(&self, geo: &GeoPoint) -> Point3<f64> {
        Point3::new(geo.longitude, geo.latitude, geo.hae)
    }

    fn inverse(&self, world: &Point3<f64>) -> GeoPoint {
        GeoPoint::with_hae(world.y, world.x, world.z)
    }

    fn bounds(&self) -> GeoBounds {
        GeoBounds::whole_earth()
    }
}

/// Spherical web mercator. SRID 3857.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebMercator;

impl Projection for WebMercator {
    fn srid(&self) -> u32 {
        WEB_MERCATOR_SRID
    }

    fn forward(&self, geo: &GeoPoint) -> Point3<f64> {
        let lat = geo
            .latitude
            .clamp(-WEB_MERCATOR_MAX_LATITUDE, WEB_MERCATOR_MAX_LATITUDE);
        let x = WGS84_SEMI_MAJOR * geo.longitude.to_radians();
        let y = WGS84_SEMI_MAJOR
            * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.)
                .tan()
                .ln();
        Point3::new(x, y, geo.hae)
    }

    fn inverse(&self, world: &Point3<f64>) -> GeoPoint {
        let lon = (world.x / WGS84_SEMI_MAJOR).to_degrees();
        let lat = (2. * (world.y / WGS84_SEMI_MAJOR).exp().atan()
            - std::f64::consts::FRAC_PI_2)
            .to_degrees();
        GeoPoint::with_hae(lat, lon, world.z)
    }

    fn bounds(&self) -> GeoBounds {
        GeoBounds::new(
            -180.,
            -WEB_MERCATOR_MAX_LATITUDE,
            180.,
            WEB_MERCATOR_MAX_LATITUDE,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_equirectangular_roundtrip() {
        let proj = Equirectangular;
        let geo = GeoPoint::with_hae(37.7749, -122.4194, 52.);
        let rt = proj.inverse(&proj.forward(&geo));
        assert_relative_eq!(rt.latitude, geo.latitude);
        assert_relative_eq!(rt.longitude, geo.longitude);
        assert_relative_eq!(rt.hae, geo.hae);
    }

    #[test]
    fn test_web_mercator_roundtrip() {
        let proj = WebMercator;
        let geo = GeoPoint::new(51.5074, -0.1278);
        let rt = proj.inverse(&proj.forward(&geo));
        assert_relative_eq!(rt.latitude, geo.latitude, epsilon = 1e-9);
        assert_relative_eq!(rt.longitude, geo.longitude, epsilon = 1e-9);
    }

    #[test]
    fn test_web_mercator_clamps_poles() {
        let proj = WebMercator;
        let p = proj.forward(&GeoPoint::new(90., 0.));
        assert!(p.y.is_finite());
    }

    #[test]
    fn test_web_mercator_equator_scale() {
        let proj = WebMercator;
        let p = proj.forward(&GeoPoint::new(0., 180.));
        assert_relative_eq!(p.x, WGS84_SEMI_MAJOR * std::f64::consts::PI);
        assert_relative_eq!(p.y, 0.);
    }
}
