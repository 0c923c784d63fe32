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

// The asynchronous renderable engine. One dedicated worker thread per
// renderable instance computes "what should be drawn" off the render
// thread; the render thread draws whatever list was last committed,
// stale but never torn.
//
// Locking discipline:
//   * The monitor guards the dispatch state (pending target, prepared
//     state, shutdown). The render thread holds it only for the length
//     of a dispatch decision; the worker parks on it while idle.
//   * The renderable list is under a reader/writer lock. draw() reads;
//     the worker writes only inside update_renderable_lists. A reader
//     sees the entirely-old or entirely-new list, never a mix.
//   * Renderables never die on the worker: anything falling out of
//     view is queued back to the render thread for release.
use crate::{EngineDetail, RenderContext, RenderPass};
use anyhow::Result;
use camera::ViewState;
use parking_lot::{RwLock, RwLockReadGuard};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use sync::{CancelFlag, Monitor};

/// The per-renderable capability the engine is generic over. The
/// engine owns all worker-loop and locking logic; implementations
/// supply only the domain semantics.
pub trait AsyncQuery: Send + Sync + 'static {
    /// Opaque accumulator filled during one query pass. Touched only
    /// by the worker during `query`, and by the same thread under the
    /// write lock during `update_renderable_lists`.
    type Context: Send + 'static;

    /// A drawable handle committed to the render thread's list.
    type Renderable: Send + Sync + 'static;

    fn create_context(&self) -> Self::Context;

    /// Clear the accumulator for reuse; called after every pass so no
    /// per-frame allocation is needed.
    fn reset_context(&self, context: &mut Self::Context);

    /// Background pass: resolve what `state` should display into
    /// `context`. Long passes must poll `cancel` and bail early once a
    /// newer state has superseded them.
    fn query(&self, context: &mut Self::Context, state: &ViewState, cancel: &CancelFlag)
        -> Result<()>;

    /// Commit pass, invoked on the worker under the write lock.
    /// Replace `current` from the accumulator; every renderable
    /// removed from `current` must be pushed to `retired`, which the
    /// engine routes back to the render thread for release.
    fn update_renderable_lists(
        &self,
        context: &mut Self::Context,
        current: &mut Vec<Self::Renderable>,
        retired: &mut Vec<Self::Renderable>,
    );

    /// Whether moving from `last` to `next` warrants a re-query.
    fn should_query(&self, last: &ViewState, next: &ViewState, detail: &EngineDetail) -> bool {
        if last.same_query_parameters(next) {
            return false;
        }
        let camera_only_zoom = last.center == next.center
            && last.rotation == next.rotation
            && last.tilt == next.tilt
            && last.srid == next.srid
            && last.screen == next.screen;
        if camera_only_zoom {
            return last.resolution_delta(next) >= detail.resolution_epsilon;
        }
        true
    }

    /// Release GPU-side resources. Always invoked on the render
    /// thread: from a queued callback for retired renderables, or
    /// under the write lock during `release`.
    fn release_renderable(&self, _renderable: &mut Self::Renderable) {}
}

#[derive(Debug, Default)]
struct DispatchState {
    /// Latest snapshot waiting for the worker. Overwritten, never
    /// queued: a burst of camera motion coalesces to one pass.
    target: Option<ViewState>,

    /// The snapshot of the last committed query.
    prepared: Option<ViewState>,

    querying: bool,
    shutdown: bool,
}

pub struct AsyncRenderable<Q: AsyncQuery> {
    query_impl: Arc<Q>,
    render_context: Arc<dyn RenderContext>,
    detail: EngineDetail,

    monitor: Arc<Monitor<DispatchState>>,
    renderables: Arc<RwLock<Vec<Q::Renderable>>>,
    cancel: CancelFlag,
    invalid: Arc<AtomicBool>,

    worker: Option<JoinHandle<()>>,
    released: bool,
}

impl<Q: AsyncQuery> AsyncRenderable<Q> {
    pub fn new(query_impl: Arc<Q>, render_context: Arc<dyn RenderContext>) -> Self {
        Self::with_detail(query_impl, render_context, EngineDetail::default())
    }

    pub fn with_detail(
        query_impl: Arc<Q>,
        render_context: Arc<dyn RenderContext>,
        detail: EngineDetail,
    ) -> Self {
        Self {
            query_impl,
            render_context,
            detail,
            monitor: Arc::new(Monitor::new(DispatchState::default())),
            renderables: Arc::new(RwLock::new(Vec::new())),
            cancel: CancelFlag::new(),
            invalid: Arc::new(AtomicBool::new(false)),
            worker: None,
            released: false,
        }
    }

    pub fn query_impl(&self) -> &Arc<Q> {
        &self.query_impl
    }

    /// Called every frame from the render thread. Dispatches a
    /// background query when the view warrants one, then draws the
    /// currently committed list. Never waits for the worker.
    pub fn draw<F>(&mut self, state: &ViewState, _pass: RenderPass, mut draw_renderable: F)
    where
        F: FnMut(&Q::Renderable),
    {
        if self.released {
            log::warn!("draw called on released renderable");
            return;
        }
        self.ensure_worker();

        let forced = self.invalid.swap(false, Ordering::AcqRel);
        {
            let mut guard = self.monitor.lock();
            let last = guard.target.as_ref().or(guard.prepared.as_ref());
            let wanted = match last {
                None => true,
                Some(last) => forced || self.query_impl.should_query(last, state, &self.detail),
            };
            if wanted {
                if guard.querying {
                    // Supersede the pass in flight; the worker polls
                    // this and abandons early.
                    self.cancel.cancel();
                }
                guard.target = Some(state.clone());
                drop(guard);
                self.monitor.notify_one();
            }
        }

        // Draw whatever is committed. The read lock excludes only the
        // brief commit swap, never the query itself.
        for renderable in self.renderables.read().iter() {
            draw_renderable(renderable);
        }
    }

    /// Mark the prepared state stale so the next draw re-queries even
    /// with identical camera parameters, e.g. after underlying content
    /// changed.
    pub fn invalidate(&self) {
        self.invalidate_no_sync();
        self.render_context.request_repaint();
    }

    /// As `invalidate`, without waking the host; for callers already
    /// inside a frame.
    pub fn invalidate_no_sync(&self) {
        self.invalid.store(true, Ordering::Release);
    }

    /// Stop the worker and release every held renderable. Must be
    /// called on the render thread; the write lock is held across the
    /// release so no late commit can race it.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Some(worker) = self.worker.take() {
            self.monitor.signal(|state| state.shutdown = true);
            self.cancel.cancel();
            if worker.join().is_err() {
                log::error!("async renderable worker panicked during shutdown");
            }
        }

        let mut current = self.renderables.write();
        for renderable in current.iter_mut() {
            self.query_impl.release_renderable(renderable);
        }
        current.clear();
    }

    /// Read access to the committed list, for hit-testing and
    /// diagnostics on the render thread.
    pub fn renderables(&self) -> RwLockReadGuard<Vec<Q::Renderable>> {
        self.renderables.read()
    }

    pub fn is_idle(&self) -> bool {
        let guard = self.monitor.lock();
        !guard.querying && guard.target.is_none()
    }

    /// Block until the worker has drained all pending work or the
    /// timeout elapses. Test and shutdown convenience; the render loop
    /// never calls this.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.monitor.lock();
        while guard.querying || guard.target.is_some() {
            let now = Instant::now();
            if now >= deadline || !self.monitor.wait_for(&mut guard, deadline - now) {
                return !guard.querying && guard.target.is_none();
            }
        }
        true
    }

    fn ensure_worker(&mut self) {
        if self.worker.is_some() {
            return;
        }
        let context = self.query_impl.create_context();
        let query_impl = self.query_impl.clone();
        let render_context = self.render_context.clone();
        let monitor = self.monitor.clone();
        let renderables = self.renderables.clone();
        let cancel = self.cancel.clone();
        let worker = thread::Builder::new()
            .name("async-renderable".to_owned())
            .spawn(move || {
                worker_loop(
                    query_impl,
                    render_context,
                    monitor,
                    renderables,
                    cancel,
                    context,
                );
            })
            .expect("spawn async renderable worker");
        self.worker = Some(worker);
    }
}

impl<Q: AsyncQuery> Drop for AsyncRenderable<Q> {
    fn drop(&mut self) {
        // Renderable release needs the render thread; all we can
        // guarantee here is that the worker stops.
        if let Some(worker) = self.worker.take() {
            log::warn!("async renderable dropped without release");
            self.monitor.signal(|state| state.shutdown = true);
            self.cancel.cancel();
            worker.join().ok();
        }
    }
}

fn worker_loop<Q: AsyncQuery>(
    query_impl: Arc<Q>,
    render_context: Arc<dyn RenderContext>,
    monitor: Arc<Monitor<DispatchState>>,
    renderables: Arc<RwLock<Vec<Q::Renderable>>>,
    cancel: CancelFlag,
    mut context: Q::Context,
) {
    loop {
        let state = {
            let mut guard = monitor.lock();
            loop {
                if guard.shutdown {
                    return;
                }
                if let Some(state) = guard.target.take() {
                    guard.querying = true;
                    break state;
                }
                monitor.wait(&mut guard);
            }
        };

        cancel.reset();
        let result = query_impl.query(&mut context, &state, &cancel);

        let committed = match result {
            Ok(()) if cancel.is_cancelled() => {
                // A newer state superseded this pass; the committed
                // list stays untouched and the loop picks the newer
                // target up immediately.
                log::trace!("query for v{} abandoned", state.draw_version);
                false
            }
            Ok(()) => {
                let mut retired = Vec::new();
                {
                    let mut current = renderables.write();
                    query_impl.update_renderable_lists(&mut context, &mut current, &mut retired);
                }
                if !retired.is_empty() {
                    let releaser = query_impl.clone();
                    render_context.queue_on_render_thread(Box::new(move || {
                        for mut renderable in retired {
                            releaser.release_renderable(&mut renderable);
                        }
                    }));
                }
                render_context.request_repaint();
                true
            }
            Err(err) => {
                // Per-pass failures degrade to "no visible change";
                // the previous list stays committed.
                log::warn!("query for v{} failed: {:#}", state.draw_version, err);
                false
            }
        };

        query_impl.reset_context(&mut context);

        let mut guard = monitor.lock();
        if committed {
            guard.prepared = Some(state);
        }
        guard.querying = false;
        drop(guard);
        monitor.notify_all();
    }
}
