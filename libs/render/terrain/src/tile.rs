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
use geodesy::{GeoBounds, GeoPoint, WGS84_SRID};
use geometry::Aabb3;
use nalgebra::Matrix4;

const METERS_PER_DEGREE: f64 = 111_319.490_793;

/// Quad key into the global tile pyramid. Level 0 covers the earth in
/// two 180-degree tiles; each level quarters its parent, so level `n`
/// tiles span `180 / 2^n` degrees.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TileId {
    pub level: u8,
    pub x: u32,
    pub y: u32,
}

impl TileId {
    pub fn new(level: u8, x: u32, y: u32) -> Self {
        debug_assert!(x < 2u32 << level);
        debug_assert!(y < 1u32 << level);
        Self { level, x, y }
    }

    pub fn span_degrees(level: u8) -> f64 {
        180. / (1u64 << level) as f64
    }

    /// The tile containing `point` at `level`.
    pub fn containing(point: &GeoPoint, level: u8) -> Self {
        let span = Self::span_degrees(level);
        let x = (((point.longitude + 180.) / span) as u32).min((2u32 << level) - 1);
        let y = (((point.latitude + 90.) / span) as u32).min((1u32 << level) - 1);
        Self::new(level, x, y)
    }

    /// All tiles at `level` intersecting `bounds`, antimeridian spans
    /// included.
    pub fn covering(bounds: &GeoBounds, level: u8) -> Vec<Self> {
        let span = Self::span_degrees(level);
        let mut out = Vec::new();
        for part in bounds.split_at_antimeridian() {
            let x0 = (((part.west + 180.) / span).floor().max(0.)) as u32;
            let x1 = (((part.east + 180.) / span).ceil() as u32).min(2u32 << level);
            let y0 = (((part.south + 90.) / span).floor().max(0.)) as u32;
            let y1 = (((part.north + 90.) / span).ceil() as u32).min(1u32 << level);
            for y in y0..y1 {
                for x in x0..x1 {
                    out.push(Self::new(level, x, y));
                }
            }
        }
        out
    }

    pub fn bounds(&self) -> GeoBounds {
        let span = Self::span_degrees(self.level);
        let west = -180. + self.x as f64 * span;
        let south = -90. + self.y as f64 * span;
        GeoBounds::new(west, south, west + span, south + span)
    }

    /// Level whose post spacing best matches `resolution` meters per
    /// pixel for a tile of `posts` samples on a side.
    pub fn level_for_resolution(resolution: f64, posts: u32) -> u8 {
        let mut level = 0u8;
        while level < 20 {
            let post_spacing_m =
                Self::span_degrees(level) * METERS_PER_DEGREE / (posts - 1).max(1) as f64;
            if post_spacing_m <= resolution {
                break;
            }
            level += 1;
        }
        level
    }
}

/// A leased unit of terrain geometry. Valid only between a matching
/// `lock`/`unlock` pair on the terrain service; holders must not
/// retain the Arc past their `unlock`.
#[derive(Debug)]
pub struct TerrainTile {
    id: TileId,
    srid: u32,
    local_frame: Matrix4<f64>,
    aabb: Aabb3,
    heightmap: bool,
    posts_x: u32,
    posts_y: u32,
    has_data: bool,
    skirt_offset: usize,
    posts: Vec<f64>,
}

impl TerrainTile {
    /// Build a tile from a row-major post grid, south row first. An
    /// empty grid produces a no-data placeholder tile.
    pub fn from_posts(id: TileId, posts_x: u32, posts_y: u32, posts: Vec<f64>) -> Self {
        let has_data = !posts.is_empty();
        debug_assert!(!has_data || posts.len() == (posts_x * posts_y) as usize);
        debug_assert!(!has_data || (posts_x >= 2 && posts_y >= 2));

        let bounds = id.bounds();
        let (min_hae, max_hae) = posts.iter().fold((0f64, 0f64), |(lo, hi), &p| {
            (lo.min(p), hi.max(p))
        });
        let aabb = Aabb3::new(
            [bounds.west, bounds.south, min_hae],
            [bounds.east, bounds.north, max_hae],
        );

        // Local frame: meters relative to the tile center at the
        // center latitude.
        let center = bounds.center();
        let lon_scale = METERS_PER_DEGREE * center.latitude.to_radians().cos().max(1e-9);
        let local_frame = Matrix4::new_nonuniform_scaling(&nalgebra::Vector3::new(
            lon_scale,
            METERS_PER_DEGREE,
            1.,
        )) * Matrix4::new_translation(&nalgebra::Vector3::new(
            -center.longitude,
            -center.latitude,
            0.,
        ));

        // The render mesh indexes the interior grid first, then the
        // edge skirts that stitch neighboring tiles.
        let skirt_offset = if has_data {
            (posts_x.saturating_sub(1) * posts_y.saturating_sub(1) * 6) as usize
        } else {
            0
        };

        Self {
            id,
            srid: WGS84_SRID,
            local_frame,
            aabb,
            heightmap: true,
            posts_x,
            posts_y,
            has_data,
            skirt_offset,
            posts,
        }
    }

    pub fn id(&self) -> TileId {
        self.id
    }

    pub fn srid(&self) -> u32 {
        self.srid
    }

    pub fn local_frame(&self) -> &Matrix4<f64> {
        &self.local_frame
    }

    pub fn aabb(&self) -> &Aabb3 {
        &self.aabb
    }

    pub fn is_heightmap(&self) -> bool {
        self.heightmap
    }

    pub fn post_counts(&self) -> (u32, u32) {
        (self.posts_x, self.posts_y)
    }

    pub fn has_data(&self) -> bool {
        self.has_data
    }

    pub fn skirt_offset(&self) -> usize {
        self.skirt_offset
    }

    pub fn posts(&self) -> &[f64] {
        &self.posts
    }

    /// Bilinear height sample. NaN outside the tile or on a no-data
    /// tile.
    pub fn elevation_at(&self, latitude: f64, longitude: f64) -> f64 {
        if !self.has_data {
            return f64::NAN;
        }
        let bounds = self.id.bounds();
        if !bounds.contains(&GeoPoint::new(latitude, longitude)) {
            return f64::NAN;
        }

        let u = (longitude - bounds.west) / bounds.longitude_span() * (self.posts_x - 1) as f64;
        let v = (latitude - bounds.south) / (bounds.north - bounds.south)
            * (self.posts_y - 1) as f64;
        let x0 = (u.floor() as u32).min(self.posts_x - 2);
        let y0 = (v.floor() as u32).min(self.posts_y - 2);
        let fx = u - x0 as f64;
        let fy = v - y0 as f64;

        let at = |x: u32, y: u32| self.posts[(y * self.posts_x + x) as usize];
        let south = at(x0, y0) * (1. - fx) + at(x0 + 1, y0) * fx;
        let north = at(x0, y0 + 1) * (1. - fx) + at(x0 + 1, y0 + 1) * fx;
        south * (1. - fy) + north * fy
    }
}
