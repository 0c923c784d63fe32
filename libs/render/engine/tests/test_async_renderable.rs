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
use anyhow::Result;
use camera::{MapCamera, ViewState};
use parking_lot::Mutex;
use render::{AsyncQuery, AsyncRenderable, QueuedRenderContext, RenderPass};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use sync::CancelFlag;

const BATCH: usize = 64;

/// Commits BATCH copies of the dispatched draw version, and records
/// every version the worker observed.
struct VersionBatchQuery {
    observed: Mutex<Vec<u64>>,
}

impl VersionBatchQuery {
    fn new() -> Self {
        Self {
            observed: Mutex::new(Vec::new()),
        }
    }
}

impl AsyncQuery for VersionBatchQuery {
    type Context = Vec<u64>;
    type Renderable = u64;

    fn create_context(&self) -> Self::Context {
        Vec::with_capacity(BATCH)
    }

    fn reset_context(&self, context: &mut Self::Context) {
        context.clear();
    }

    fn query(
        &self,
        context: &mut Self::Context,
        state: &ViewState,
        _cancel: &CancelFlag,
    ) -> Result<()> {
        self.observed.lock().push(state.draw_version);
        context.extend(std::iter::repeat(state.draw_version).take(BATCH));
        Ok(())
    }

    fn update_renderable_lists(
        &self,
        context: &mut Self::Context,
        current: &mut Vec<u64>,
        retired: &mut Vec<u64>,
    ) {
        retired.append(current);
        current.extend(context.iter().copied());
    }
}

#[test]
fn test_snapshot_isolation_under_camera_churn() {
    let _ = env_logger::builder().is_test(true).try_init();

    let render_context = Arc::new(QueuedRenderContext::new());
    let mut renderable =
        AsyncRenderable::new(Arc::new(VersionBatchQuery::new()), render_context.clone());

    let mut camera = MapCamera::new(1024., 768., 1000.);
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        camera.pan_by(3., 1.);
        let state = camera.snapshot();
        let mut seen = Vec::with_capacity(BATCH);
        renderable.draw(&state, RenderPass::SCENES, |&entry| seen.push(entry));
        render_context.pump();

        // A committed list is all-or-nothing: one full batch of a
        // single version, never a mix of pre- and post-swap entries.
        if !seen.is_empty() {
            assert_eq!(seen.len(), BATCH);
            assert!(seen.iter().all(|&v| v == seen[0]), "torn list: {:?}", seen);
        }
    }
    renderable.release();
}

#[test]
fn test_worker_observes_monotonic_versions() {
    let query = Arc::new(VersionBatchQuery::new());
    let mut renderable = AsyncRenderable::new(query.clone(), Arc::new(QueuedRenderContext::new()));

    let mut camera = MapCamera::new(800., 600., 500.);
    for step in 0..100 {
        camera.set_rotation(step as f64 * 3.6);
        let state = camera.snapshot();
        renderable.draw(&state, RenderPass::SURFACE, |_| {});
    }
    assert!(renderable.wait_until_idle(Duration::from_secs(10)));
    renderable.release();

    let observed = query.observed.lock();
    assert!(!observed.is_empty());
    for pair in observed.windows(2) {
        assert!(pair[0] <= pair[1], "worker saw versions out of order");
    }
}

#[test]
fn test_first_draw_empty_then_populated() {
    let render_context = Arc::new(QueuedRenderContext::new());
    let mut renderable =
        AsyncRenderable::new(Arc::new(VersionBatchQuery::new()), render_context);

    let mut camera = MapCamera::new(800., 600., 500.);
    let state = camera.snapshot();

    let mut count = 0;
    renderable.draw(&state, RenderPass::SURFACE, |_| count += 1);
    assert_eq!(count, 0, "list must be empty before the worker has run");

    assert!(renderable.wait_until_idle(Duration::from_secs(10)));
    renderable.draw(&state, RenderPass::SURFACE, |_| count += 1);
    assert_eq!(count, BATCH);
    renderable.release();
}
