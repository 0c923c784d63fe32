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
use crate::{ScreenRect, ViewState};
use geodesy::{GeoBounds, GeoPoint, WGS84_SRID};

const METERS_PER_DEGREE: f64 = 111_319.490_793;

// OGC standardized rendering pixel size, for the display scale
// denominator.
const METERS_PER_DISPLAY_PIXEL: f64 = 0.000_28;

/// The live, mutable camera owned by the render thread. Mutators mark
/// the camera dirty; `snapshot` turns the accumulated state into an
/// immutable `ViewState`, bumping `draw_version` exactly when
/// something changed since the previous snapshot.
#[derive(Clone, Debug)]
pub struct MapCamera {
    center: GeoPoint,
    resolution: f64,
    rotation: f64,
    tilt: f64,
    animation_factor: f64,
    srid: u32,
    screen: ScreenRect,
    focus_x: f64,
    focus_y: f64,

    draw_version: u64,
    dirty: bool,
}

impl MapCamera {
    pub fn new(screen_width: f64, screen_height: f64, resolution: f64) -> Self {
        Self {
            center: GeoPoint::new(0., 0.),
            resolution,
            rotation: 0.,
            tilt: 0.,
            animation_factor: 1.,
            srid: WGS84_SRID,
            screen: ScreenRect::new(screen_width, screen_height),
            focus_x: screen_width / 2.,
            focus_y: screen_height / 2.,
            draw_version: 0,
            dirty: true,
        }
    }

    pub fn center(&self) -> &GeoPoint {
        &self.center
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn draw_version(&self) -> u64 {
        self.draw_version
    }

    pub fn set_center(&mut self, latitude: f64, longitude: f64) {
        self.center = GeoPoint::new(
            latitude.clamp(-90., 90.),
            GeoPoint::wrap_longitude(longitude),
        );
        self.dirty = true;
    }

    /// Pan by a screen-space pixel delta at the current resolution.
    pub fn pan_by(&mut self, dx_px: f64, dy_px: f64) {
        let r = self.rotation.to_radians();
        let east_m = (dx_px * r.cos() - dy_px * r.sin()) * self.resolution;
        let north_m = (dx_px * r.sin() + dy_px * r.cos()) * self.resolution;
        let dlat = north_m / METERS_PER_DEGREE;
        let dlon =
            east_m / (METERS_PER_DEGREE * self.center.latitude.to_radians().cos().max(1e-9));
        self.set_center(self.center.latitude + dlat, self.center.longitude + dlon);
    }

    /// Multiply the resolution; factors above one zoom out.
    pub fn zoom_by(&mut self, factor: f64) {
        debug_assert!(factor > 0.);
        self.resolution *= factor;
        self.dirty = true;
    }

    pub fn set_resolution(&mut self, resolution: f64) {
        debug_assert!(resolution > 0.);
        self.resolution = resolution;
        self.dirty = true;
    }

    pub fn set_rotation(&mut self, degrees: f64) {
        self.rotation = degrees.rem_euclid(360.);
        self.dirty = true;
    }

    pub fn rotate_by(&mut self, degrees: f64) {
        self.set_rotation(self.rotation + degrees);
    }

    pub fn set_tilt(&mut self, degrees: f64) {
        self.tilt = degrees.clamp(0., 89.);
        self.dirty = true;
    }

    pub fn set_animation_factor(&mut self, factor: f64) {
        self.animation_factor = factor.clamp(0., 1.);
        self.dirty = true;
    }

    pub fn set_screen_size(&mut self, width: f64, height: f64) {
        self.screen = ScreenRect::new(width, height);
        self.focus_x = width / 2.;
        self.focus_y = height / 2.;
        self.dirty = true;
    }

    pub fn set_focus(&mut self, x: f64, y: f64) {
        self.focus_x = x;
        self.focus_y = y;
        self.dirty = true;
    }

    pub fn set_srid(&mut self, srid: u32) {
        self.srid = srid;
        self.dirty = true;
    }

    /// Produce the per-frame snapshot. Call once per frame on the
    /// render thread, before dispatching any background queries.
    pub fn snapshot(&mut self) -> ViewState {
        if self.dirty {
            self.draw_version += 1;
            self.dirty = false;
            log::trace!("camera advanced to v{}", self.draw_version);
        }

        let (bounds, corners) = self.visible_region();
        ViewState {
            scale: self.resolution / METERS_PER_DISPLAY_PIXEL,
            resolution: self.resolution,
            center: self.center,
            rotation: self.rotation,
            tilt: self.tilt,
            animation_factor: self.animation_factor,
            draw_version: self.draw_version,
            srid: self.srid,
            crosses_antimeridian: bounds.crosses_antimeridian(),
            bounds,
            corners,
            screen: self.screen,
            focus_x: self.focus_x,
            focus_y: self.focus_y,
            settled: self.animation_factor >= 1.,
        }
    }

    /// Geographic region covered by the rotated, tilted viewport,
    /// as corner points plus their enclosing bounds.
    fn visible_region(&self) -> (GeoBounds, [GeoPoint; 4]) {
        let r = self.rotation.to_radians();
        let half_w = self.screen.width() / 2. * self.resolution;
        // Tilt stretches coverage toward the horizon; widen the
        // vertical half-extent with a secant factor.
        let half_h =
            self.screen.height() / 2. * self.resolution / self.tilt.to_radians().cos().max(0.1);

        let lat_cos = self.center.latitude.to_radians().cos().max(1e-9);
        let to_lat = |north_m: f64| north_m / METERS_PER_DEGREE;
        let to_lon = |east_m: f64| east_m / (METERS_PER_DEGREE * lat_cos);

        // Screen corners, rotated into the geographic frame. Order is
        // west/south, east/south, east/north, west/north at zero
        // rotation.
        let offsets_m = [
            (-half_w, -half_h),
            (half_w, -half_h),
            (half_w, half_h),
            (-half_w, half_h),
        ];
        let mut corners = [GeoPoint::default(); 4];
        for (i, (x, y)) in offsets_m.iter().enumerate() {
            let east_m = x * r.cos() - y * r.sin();
            let north_m = x * r.sin() + y * r.cos();
            corners[i] = GeoPoint::new(
                (self.center.latitude + to_lat(north_m)).clamp(-90., 90.),
                GeoPoint::wrap_longitude(self.center.longitude + to_lon(east_m)),
            );
        }

        // The axis-aligned envelope of the rotated rect.
        let half_lat = to_lat(half_h.abs() * r.cos().abs() + half_w.abs() * r.sin().abs());
        let half_lon = to_lon(half_w.abs() * r.cos().abs() + half_h.abs() * r.sin().abs());

        let south = (self.center.latitude - half_lat).clamp(-90., 90.);
        let north = (self.center.latitude + half_lat).clamp(-90., 90.);
        let bounds = if half_lon * 2. >= 360. {
            GeoBounds::new(-180., south, 180., north)
        } else {
            // west > east after wrapping encodes the antimeridian
            // crossing.
            GeoBounds::new(
                GeoPoint::wrap_longitude(self.center.longitude - half_lon),
                south,
                GeoPoint::wrap_longitude(self.center.longitude + half_lon),
                north,
            )
        };
        (bounds, corners)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_version_bumps_only_on_change() {
        let mut camera = MapCamera::new(800., 600., 100.);
        let v1 = camera.snapshot().draw_version;
        let v2 = camera.snapshot().draw_version;
        assert_eq!(v1, v2);

        camera.zoom_by(2.);
        let v3 = camera.snapshot().draw_version;
        assert!(v3 > v2);
    }

    #[test]
    fn test_versions_strictly_increase() {
        let mut camera = MapCamera::new(800., 600., 100.);
        let mut last = 0;
        for i in 0..10 {
            camera.set_rotation(i as f64 * 10.);
            let v = camera.snapshot().draw_version;
            assert!(v > last);
            last = v;
        }
    }

    #[test]
    fn test_bounds_contain_center() {
        let mut camera = MapCamera::new(1024., 768., 50.);
        camera.set_center(37.77, -122.42);
        camera.set_rotation(30.);
        camera.set_tilt(45.);
        let state = camera.snapshot();
        assert!(state.bounds.contains(&state.center));
    }

    #[test]
    fn test_antimeridian_crossing_detected() {
        let mut camera = MapCamera::new(1024., 768., 2000.);
        camera.set_center(0., 179.9);
        let state = camera.snapshot();
        assert!(state.crosses_antimeridian);
        assert!(state.bounds.crosses_antimeridian());
    }

    #[test]
    fn test_pan_moves_center() {
        let mut camera = MapCamera::new(800., 600., 100.);
        camera.pan_by(0., 100.);
        let state = camera.snapshot();
        assert!(state.center.latitude > 0.);
        assert_relative_eq!(state.center.longitude, 0., epsilon = 1e-12);
    }

    #[test]
    fn test_settled_tracks_animation() {
        let mut camera = MapCamera::new(800., 600., 100.);
        camera.set_animation_factor(0.5);
        assert!(!camera.snapshot().settled);
        camera.set_animation_factor(1.);
        assert!(camera.snapshot().settled);
    }
}
