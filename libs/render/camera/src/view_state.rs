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
use geodesy::{GeoBounds, GeoPoint};

/// The screen viewport in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScreenRect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl ScreenRect {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            left: 0.,
            top: 0.,
            right: width,
            bottom: height,
        }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }
}

/// Immutable per-frame snapshot of the camera and projection
/// parameters. Produced on the render thread and handed to workers by
/// value; a worker never observes a half-updated camera.
///
/// `draw_version` strictly increases every time any camera parameter
/// changes and is the only staleness signal in the pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewState {
    pub scale: f64,
    pub resolution: f64,
    pub center: GeoPoint,
    pub rotation: f64,
    pub tilt: f64,
    pub animation_factor: f64,
    pub draw_version: u64,
    pub srid: u32,
    pub bounds: GeoBounds,
    pub corners: [GeoPoint; 4],
    pub screen: ScreenRect,
    pub focus_x: f64,
    pub focus_y: f64,
    pub settled: bool,
    pub crosses_antimeridian: bool,
}

impl ViewState {
    /// Relative difference between this view's resolution and
    /// another's, for change-coalescing heuristics.
    pub fn resolution_delta(&self, other: &ViewState) -> f64 {
        let max = self.resolution.max(other.resolution);
        if max <= 0. {
            return 0.;
        }
        (self.resolution - other.resolution).abs() / max
    }

    /// True when the two snapshots would query identically: everything
    /// but the version counter and animation progress matches.
    pub fn same_query_parameters(&self, other: &ViewState) -> bool {
        self.resolution == other.resolution
            && self.center == other.center
            && self.rotation == other.rotation
            && self.tilt == other.tilt
            && self.srid == other.srid
            && self.screen == other.screen
    }

    /// Clip to a sub-span of longitudes, for antimeridian dual-query.
    pub fn with_bounds(&self, bounds: GeoBounds) -> ViewState {
        let mut state = self.clone();
        state.bounds = bounds;
        state.crosses_antimeridian = bounds.crosses_antimeridian();
        state
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    fn stub_state(resolution: f64) -> ViewState {
        ViewState {
            scale: 1.,
            resolution,
            center: GeoPoint::new(0., 0.),
            rotation: 0.,
            tilt: 0.,
            animation_factor: 1.,
            draw_version: 1,
            srid: 4326,
            bounds: GeoBounds::whole_earth(),
            corners: GeoBounds::whole_earth().corners(),
            screen: ScreenRect::new(800., 600.),
            focus_x: 400.,
            focus_y: 300.,
            settled: true,
            crosses_antimeridian: false,
        }
    }

    #[test]
    fn test_resolution_delta_is_relative() {
        let a = stub_state(100.);
        let b = stub_state(110.);
        assert_relative_eq!(a.resolution_delta(&b), 10. / 110.);
        assert_relative_eq!(a.resolution_delta(&a), 0.);
    }

    #[test]
    fn test_same_query_parameters_ignores_version() {
        let a = stub_state(100.);
        let mut b = stub_state(100.);
        b.draw_version = 99;
        b.animation_factor = 0.5;
        assert!(a.same_query_parameters(&b));
        b.rotation = 45.;
        assert!(!a.same_query_parameters(&b));
    }
}
