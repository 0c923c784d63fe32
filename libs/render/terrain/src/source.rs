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
use crate::TileId;
use anyhow::Result;

/// The persistence collaborator behind the terrain service: answers
/// "give me height posts for this tile" from whatever backing store
/// exists. Implementations are called from background read tasks and
/// must be safe to invoke concurrently.
///
/// `Ok(None)` means the store has no coverage there, which is a valid
/// answer, rendered as a no-data tile. `Err` means the store failed;
/// the fetch is logged and dropped, and the tile is retried only if
/// the view requests it again.
pub trait ElevationSource: Send + Sync + 'static {
    fn fetch_posts(&self, id: &TileId, posts_x: u32, posts_y: u32) -> Result<Option<Vec<f64>>>;
}

/// Analytic source for tests and offline rendering: height is a pure
/// function of position.
pub struct FunctionSource<F> {
    height: F,
}

impl<F> FunctionSource<F>
where
    F: Fn(f64, f64) -> f64 + Send + Sync + 'static,
{
    pub fn new(height: F) -> Self {
        Self { height }
    }
}

impl<F> ElevationSource for FunctionSource<F>
where
    F: Fn(f64, f64) -> f64 + Send + Sync + 'static,
{
    fn fetch_posts(&self, id: &TileId, posts_x: u32, posts_y: u32) -> Result<Option<Vec<f64>>> {
        let bounds = id.bounds();
        let mut posts = Vec::with_capacity((posts_x * posts_y) as usize);
        for y in 0..posts_y {
            let lat = bounds.south
                + (bounds.north - bounds.south) * y as f64 / (posts_y - 1).max(1) as f64;
            for x in 0..posts_x {
                let lon = bounds.west
                    + bounds.longitude_span() * x as f64 / (posts_x - 1).max(1) as f64;
                posts.push((self.height)(lat, lon));
            }
        }
        Ok(Some(posts))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_function_source_samples_grid() {
        let source = FunctionSource::new(|lat, _lon| lat);
        let id = TileId::new(2, 2, 2);
        let posts = source.fetch_posts(&id, 3, 3).unwrap().unwrap();
        assert_eq!(posts.len(), 9);
        // South row first; the north row samples higher latitudes.
        assert!(posts[0] < posts[8]);
    }
}
