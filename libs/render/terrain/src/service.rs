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

// The terrain render service hands reference-counted, versioned tiles
// to the render thread under a lock/unlock lease contract, backed by
// background tile fetches.
//
// Fetch pipeline: lock() enqueues needed tiles into a vote-ordered
// load queue, kicks off up to max_concurrent_reads background reads,
// and drains completed reads from a channel. Reads run on the rayon
// pool; results come back over crossbeam and are applied under the
// cache mutex. A read may outlive the view that wanted it, so every
// completion re-checks the tile's tracked state before applying.
use crate::{ElevationSource, TerrainTile, TileId};
use camera::ViewState;
use crossbeam::channel::{self, Receiver, Sender};
use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::{collections::BinaryHeap, sync::Arc};

/// Tunables for the tile cache and fetch machinery.
#[derive(Clone, Copy, Debug)]
pub struct TerrainDetail {
    /// Height posts per tile edge.
    pub posts_per_tile: u32,

    /// Concurrent background reads against the elevation source.
    pub max_concurrent_reads: usize,

    /// Lock generations a tile may go unseen before it becomes an
    /// eviction candidate.
    pub evict_after_generations: u64,

    /// Finest pyramid level the service will request.
    pub max_level: u8,
}

impl Default for TerrainDetail {
    fn default() -> Self {
        Self {
            posts_per_tile: 65,
            max_concurrent_reads: 5,
            evict_after_generations: 2,
            max_level: 16,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum FetchState {
    Pending,
    Reading,
    Resident,
}

#[derive(Default)]
struct CacheState {
    /// Monotonic; bumps whenever the resident tile set changes.
    version: u64,

    /// Bumps once per lock(); drives visibility staleness.
    generation: u64,

    resident: FxHashMap<TileId, Arc<TerrainTile>>,
    fetch_state: FxHashMap<TileId, FetchState>,
    last_seen: FxHashMap<TileId, u64>,

    /// Outstanding lease counts; a leased tile is never evicted.
    leases: FxHashMap<TileId, usize>,

    /// Requested loads by vote count. Entries can be stale repeats;
    /// the pop path re-checks fetch_state.
    load_queue: BinaryHeap<(u32, TileId)>,

    reads_in_flight: usize,
    running: bool,

    /// Cheap-path cache: (scene_version, cache version, needed set)
    /// of the previous lock, reused while nothing has moved.
    last_lock: Option<(u64, u64, Vec<TileId>)>,
}

type FetchResult = (TileId, Option<TerrainTile>);

pub struct TerrainRenderService {
    source: Arc<dyn ElevationSource>,
    detail: TerrainDetail,
    state: Mutex<CacheState>,
    tile_sender: Sender<FetchResult>,
    tile_receiver: Receiver<FetchResult>,
}

impl TerrainRenderService {
    pub fn new(source: Arc<dyn ElevationSource>) -> Self {
        Self::with_detail(source, TerrainDetail::default())
    }

    pub fn with_detail(source: Arc<dyn ElevationSource>, detail: TerrainDetail) -> Self {
        let (tile_sender, tile_receiver) = channel::unbounded();
        Self {
            source,
            detail,
            state: Mutex::new(CacheState::default()),
            tile_sender,
            tile_receiver,
        }
    }

    /// Enable background fetching. Until started, lock() returns only
    /// whatever is already resident.
    pub fn start(&self) {
        self.state.lock().running = true;
    }

    /// Disable fetching and drain every in-flight read so no
    /// background task outlives the caller's use of the source.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.running = false;
        state.load_queue.clear();
        state.fetch_state.retain(|_, s| *s != FetchState::Pending);
        // Results can also be drained by a concurrent lock(), so wait
        // with a timeout and re-check rather than parking on recv.
        while state.reads_in_flight > 0 {
            drop(state);
            match self
                .tile_receiver
                .recv_timeout(std::time::Duration::from_millis(50))
            {
                Ok((id, _)) => {
                    state = self.state.lock();
                    state.reads_in_flight -= 1;
                    if state.fetch_state.get(&id) == Some(&FetchState::Reading) {
                        state.fetch_state.remove(&id);
                    }
                }
                Err(channel::RecvTimeoutError::Timeout) => {
                    state = self.state.lock();
                }
                Err(channel::RecvTimeoutError::Disconnected) => return,
            }
        }
    }

    /// Monotonic counter identifying the resident tile set. Callers
    /// cache terrain-derived per-frame work against it.
    pub fn terrain_version(&self) -> u64 {
        self.state.lock().version
    }

    pub fn resident_tile_count(&self) -> usize {
        self.state.lock().resident.len()
    }

    /// Lease out the tiles needed to render `view`. The returned
    /// version is consistent for every returned tile; each call must
    /// be paired with an `unlock` of the returned set. An empty set is
    /// a valid answer, not an error. Never blocks on I/O.
    pub fn lock(
        &self,
        view: &ViewState,
        srid: u32,
        scene_version: u64,
    ) -> (u64, Vec<Arc<TerrainTile>>) {
        let mut state = self.state.lock();
        state.generation += 1;
        let generation = state.generation;

        let needed = match &state.last_lock {
            Some((scene, version, needed))
                if *scene == scene_version && *version == state.version =>
            {
                needed.clone()
            }
            _ => {
                let level = TileId::level_for_resolution(view.resolution, self.detail.posts_per_tile)
                    .min(self.detail.max_level);
                let needed = TileId::covering(&view.bounds, level);
                log::trace!(
                    "terrain resolve srid:{} scene:v{} level:{} tiles:{}",
                    srid,
                    scene_version,
                    level,
                    needed.len()
                );
                needed
            }
        };

        for id in &needed {
            state.last_seen.insert(*id, generation);
            match state.fetch_state.get(id).copied() {
                None => {
                    if state.running {
                        state.fetch_state.insert(*id, FetchState::Pending);
                        state.load_queue.push((1, *id));
                    }
                }
                Some(FetchState::Pending) => {
                    // Re-requested while still queued; a higher vote
                    // resurfaces it. Stale repeats are filtered on pop.
                    state.load_queue.push((2, *id));
                }
                Some(_) => {}
            }
        }

        self.pump_fetches(&mut state);
        self.evict_stale(&mut state);

        let mut tiles = Vec::with_capacity(needed.len());
        for id in &needed {
            if let Some(tile) = state.resident.get(id) {
                tiles.push(tile.clone());
                *state.leases.entry(*id).or_insert(0) += 1;
            }
        }
        state.last_lock = Some((scene_version, state.version, needed));
        (state.version, tiles)
    }

    /// Release a lease taken by `lock`. Callers must not retain any
    /// tile Arc past this call.
    pub fn unlock(&self, tiles: &[Arc<TerrainTile>]) {
        let mut state = self.state.lock();
        for tile in tiles {
            let id = tile.id();
            if let Some(count) = state.leases.get_mut(&id) {
                *count -= 1;
                if *count == 0 {
                    state.leases.remove(&id);
                }
            } else {
                log::warn!("unlock of unleased tile {:?}", id);
            }
        }
    }

    /// Point-sample the finest resident tile covering the position.
    /// Answers only from already-resident data; NaN when there is
    /// none. Never triggers or waits on a fetch.
    pub fn elevation_at(&self, latitude: f64, longitude: f64) -> f64 {
        let state = self.state.lock();
        let mut best: Option<&Arc<TerrainTile>> = None;
        for tile in state.resident.values() {
            if !tile.has_data() {
                continue;
            }
            if !tile
                .id()
                .bounds()
                .contains(&geodesy::GeoPoint::new(latitude, longitude))
            {
                continue;
            }
            if best.map_or(true, |b| tile.id().level > b.id().level) {
                best = Some(tile);
            }
        }
        best.map_or(f64::NAN, |tile| tile.elevation_at(latitude, longitude))
    }

    /// Apply completed reads and start new ones up to the concurrency
    /// bound. Caller holds the cache mutex.
    fn pump_fetches(&self, state: &mut CacheState) {
        let mut applied = 0;
        while let Ok((id, maybe_tile)) = self.tile_receiver.try_recv() {
            state.reads_in_flight -= 1;

            // The view may have moved on while the read was out; a
            // tile no longer tracked as Reading just gets dropped.
            if state.fetch_state.get(&id) != Some(&FetchState::Reading) {
                continue;
            }
            match maybe_tile {
                Some(tile) => {
                    state.resident.insert(id, Arc::new(tile));
                    state.fetch_state.insert(id, FetchState::Resident);
                    applied += 1;
                }
                None => {
                    // Failed read; forget it so a later view can retry.
                    state.fetch_state.remove(&id);
                }
            }
        }
        if applied > 0 {
            state.version += 1;
        }

        let mut started = 0;
        while state.running && state.reads_in_flight < self.detail.max_concurrent_reads {
            let (_, id) = match state.load_queue.pop() {
                Some(entry) => entry,
                None => break,
            };
            if state.fetch_state.get(&id) != Some(&FetchState::Pending) {
                continue;
            }
            state.fetch_state.insert(id, FetchState::Reading);
            state.reads_in_flight += 1;
            started += 1;

            let source = self.source.clone();
            let sender = self.tile_sender.clone();
            let posts = self.detail.posts_per_tile;
            rayon::spawn(move || {
                let tile = match source.fetch_posts(&id, posts, posts) {
                    Ok(Some(grid)) => Some(TerrainTile::from_posts(id, posts, posts, grid)),
                    // No coverage: keep a no-data placeholder so the
                    // same hole is not re-fetched every frame.
                    Ok(None) => Some(TerrainTile::from_posts(id, posts, posts, Vec::new())),
                    Err(err) => {
                        log::warn!("terrain fetch failed for {:?}: {:#}", id, err);
                        None
                    }
                };
                sender.send((id, tile)).ok();
            });
        }
        if applied > 0 || started > 0 {
            log::trace!(
                "terrain pump applied:{} started:{} out:{}",
                applied,
                started,
                state.reads_in_flight
            );
        }
    }

    /// Drop resident tiles that have gone unseen for long enough,
    /// skipping anything still leased out.
    fn evict_stale(&self, state: &mut CacheState) {
        let horizon = state
            .generation
            .saturating_sub(self.detail.evict_after_generations);
        let stale: Vec<TileId> = state
            .resident
            .keys()
            .filter(|id| {
                state.last_seen.get(id).copied().unwrap_or(0) < horizon
                    && !state.leases.contains_key(id)
            })
            .copied()
            .collect();
        if stale.is_empty() {
            return;
        }
        for id in stale {
            state.resident.remove(&id);
            state.fetch_state.remove(&id);
            state.last_seen.remove(&id);
            log::trace!("evicted terrain tile {:?}", id);
        }
        state.version += 1;
    }
}

impl Drop for TerrainRenderService {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FunctionSource;
    use camera::MapCamera;
    use std::time::{Duration, Instant};

    fn small_detail() -> TerrainDetail {
        // Coarse pyramid so a test view needs only a handful of tiles.
        TerrainDetail {
            posts_per_tile: 17,
            max_concurrent_reads: 4,
            evict_after_generations: 2,
            max_level: 5,
        }
    }

    fn flat_service(detail: TerrainDetail) -> TerrainRenderService {
        TerrainRenderService::with_detail(
            Arc::new(FunctionSource::new(|lat, lon| lat + lon)),
            detail,
        )
    }

    /// Drive lock/unlock until every requested read has been applied.
    fn settle(service: &TerrainRenderService, view: &ViewState) {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let (_, tiles) = service.lock(view, 4326, 1);
            service.unlock(&tiles);
            let state = service.state.lock();
            let quiet = state.reads_in_flight == 0 && state.load_queue.is_empty();
            drop(state);
            if quiet || Instant::now() > deadline {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn view_over(lat: f64, lon: f64) -> ViewState {
        let mut camera = MapCamera::new(800., 600., 500.);
        camera.set_center(lat, lon);
        camera.snapshot()
    }

    fn lock_until_resident(
        service: &TerrainRenderService,
        view: &ViewState,
    ) -> (u64, Vec<Arc<TerrainTile>>) {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let (version, tiles) = service.lock(view, 4326, 1);
            if !tiles.is_empty() || Instant::now() > deadline {
                return (version, tiles);
            }
            service.unlock(&tiles);
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_empty_service_locks_clean() {
        let service = flat_service(small_detail());
        let view = view_over(10., 10.);
        // Not started: nothing resident, and that is not an error.
        let (version, tiles) = service.lock(&view, 4326, 1);
        assert_eq!(version, 0);
        assert!(tiles.is_empty());
        service.unlock(&tiles);
    }

    #[test]
    fn test_lock_after_fetch_returns_tiles() {
        let service = flat_service(small_detail());
        service.start();
        let view = view_over(10., 10.);
        let (version, tiles) = lock_until_resident(&service, &view);
        assert!(version > 0);
        assert!(!tiles.is_empty());
        for tile in &tiles {
            assert!(tile.has_data());
            assert!(tile.id().bounds().intersects(&view.bounds));
        }
        service.unlock(&tiles);
        service.stop();
    }

    #[test]
    fn test_unchanged_view_is_stable() {
        let service = flat_service(small_detail());
        service.start();
        let view = view_over(10., 10.);
        settle(&service, &view);

        let (v1, t1) = service.lock(&view, 4326, 1);
        let (v2, t2) = service.lock(&view, 4326, 1);
        assert_eq!(v1, v2);
        let ids1: Vec<TileId> = t1.iter().map(|t| t.id()).collect();
        let ids2: Vec<TileId> = t2.iter().map(|t| t.id()).collect();
        assert_eq!(ids1, ids2);
        service.unlock(&t1);
        service.unlock(&t2);
        service.stop();
    }

    #[test]
    fn test_version_is_monotonic() {
        let service = flat_service(TerrainDetail {
            evict_after_generations: 1,
            ..small_detail()
        });
        service.start();
        let mut last = 0;
        for i in 0..6 {
            let view = view_over(10. + i as f64 * 20., 10.);
            let (version, tiles) = service.lock(&view, 4326, 1);
            assert!(version >= last);
            last = version;
            service.unlock(&tiles);
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(service.terrain_version() >= last);
        service.stop();
    }

    #[test]
    fn test_leased_tiles_survive_eviction() {
        let service = flat_service(TerrainDetail {
            evict_after_generations: 1,
            ..small_detail()
        });
        service.start();
        let home = view_over(10., 10.);
        settle(&service, &home);
        let (_, leased) = service.lock(&home, 4326, 1);
        assert!(!leased.is_empty());
        let leased_ids: Vec<TileId> = leased.iter().map(|t| t.id()).collect();

        // Drive the view far away until eviction pressure has had
        // every chance to run.
        for i in 0..8 {
            let view = view_over(-40., -120. + i as f64 * 5.);
            let (_, tiles) = service.lock(&view, 4326, 1);
            service.unlock(&tiles);
            std::thread::sleep(Duration::from_millis(5));
        }

        // The leased tiles are still resident and still usable.
        {
            let state = service.state.lock();
            for id in &leased_ids {
                assert!(state.resident.contains_key(id), "leased tile evicted");
            }
        }
        for tile in &leased {
            assert!(tile.posts().len() > 0);
        }

        // Once released, the same pressure may reclaim them.
        service.unlock(&leased);
        let view = view_over(-40., -60.);
        let (_, tiles) = service.lock(&view, 4326, 1);
        service.unlock(&tiles);
        let state = service.state.lock();
        for id in &leased_ids {
            assert!(!state.resident.contains_key(id), "stale tile retained");
        }
        drop(state);
        service.stop();
    }

    #[test]
    fn test_elevation_answers_resident_only() {
        let service = flat_service(small_detail());
        // Nothing resident anywhere: NaN, immediately.
        assert!(service.elevation_at(10., 10.).is_nan());

        service.start();
        let view = view_over(10., 10.);
        settle(&service, &view);
        let (_, tiles) = service.lock(&view, 4326, 1);
        assert!(!tiles.is_empty());
        let sample = service.elevation_at(10., 10.);
        assert!((sample - 20.).abs() < 1., "bilinear of lat+lon near 20");
        // Far outside anything fetched.
        assert!(service.elevation_at(-80., 170.).is_nan());
        service.unlock(&tiles);
        service.stop();
    }
}
