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

// Background mesh loading for scene nodes. Two priority classes: the
// "now visible" queue for nodes on screen and the prefetch queue for
// nodes expected soon. A fixed pool drains them smallest-GSD-first,
// taking from the visible queue whenever it has work.
//
// Queues re-sort lazily: enqueue marks them dirty and the next
// dequeue pays one O(n log n) sort, so a burst of arrivals does not
// pay per-insert ordering cost.
use crate::{MeshSource, SceneNode};
use fxhash::FxHashMap;
use nalgebra::Point3;
use ordered_float::OrderedFloat;
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};
use sync::{CancelFlag, Monitor};

/// Ephemeral state for one queued load. The GSD is purely a queue
/// priority key; smaller reads as closer and loads sooner.
#[derive(Clone, Debug)]
pub struct LoadContext {
    pub centroid: Point3<f64>,
    pub radius: f64,
    pub gsd: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct LoaderDetail {
    /// Pool size. Zero is legal and leaves the queues undrained,
    /// which the queue-semantics tests rely on.
    pub threads: usize,
}

impl Default for LoaderDetail {
    fn default() -> Self {
        Self { threads: 4 }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LoaderStats {
    pub visible_queued: usize,
    pub prefetch_queued: usize,
    pub executing: usize,
}

struct QueuedLoad {
    node: Arc<SceneNode>,
    context: LoadContext,
}

#[derive(Default)]
struct LoaderState {
    /// Kept descending by GSD once sorted; pop() takes the smallest.
    visible: Vec<QueuedLoad>,
    prefetch: Vec<QueuedLoad>,
    visible_dirty: bool,
    prefetch_dirty: bool,

    /// Node id to (cancel flag, came-from-prefetch) for loads now on
    /// a pool thread.
    executing: FxHashMap<u64, (CancelFlag, bool)>,

    shutdown: bool,
}

impl LoaderState {
    fn queue_mut(&mut self, prefetch: bool) -> (&mut Vec<QueuedLoad>, &mut bool) {
        if prefetch {
            (&mut self.prefetch, &mut self.prefetch_dirty)
        } else {
            (&mut self.visible, &mut self.visible_dirty)
        }
    }

    fn take_next(&mut self) -> Option<(QueuedLoad, bool)> {
        // Visible work always wins; prefetch only drains when the
        // visible queue is empty.
        for prefetch in [false, true] {
            let (queue, dirty) = self.queue_mut(prefetch);
            if queue.is_empty() {
                continue;
            }
            if *dirty {
                queue.sort_by_key(|q| std::cmp::Reverse(OrderedFloat(q.context.gsd)));
                *dirty = false;
            }
            return queue.pop().map(|q| (q, prefetch));
        }
        None
    }
}

pub struct NodeLoader {
    monitor: Arc<Monitor<LoaderState>>,
    workers: Vec<JoinHandle<()>>,
}

impl NodeLoader {
    pub fn new(source: Arc<dyn MeshSource>) -> Self {
        Self::with_detail(source, LoaderDetail::default())
    }

    pub fn with_detail(source: Arc<dyn MeshSource>, detail: LoaderDetail) -> Self {
        let monitor = Arc::new(Monitor::new(LoaderState::default()));
        let workers = (0..detail.threads)
            .map(|i| {
                let source = source.clone();
                let monitor = monitor.clone();
                thread::Builder::new()
                    .name(format!("node-load-{}", i))
                    .spawn(move || worker_loop(source, monitor))
                    .expect("spawn node loader worker")
            })
            .collect();
        Self { monitor, workers }
    }

    /// Queue `node` for background load in the given priority class.
    /// A node already queued in the other class moves rather than
    /// duplicating; a node currently executing is left alone.
    pub fn enqueue(&self, node: Arc<SceneNode>, context: LoadContext, prefetch: bool) {
        self.monitor.signal(|state| {
            if state.executing.contains_key(&node.id()) {
                return;
            }

            let (other, _) = state.queue_mut(!prefetch);
            other.retain(|q| q.node.id() != node.id());

            let id = node.id();
            let (queue, dirty) = state.queue_mut(prefetch);
            if let Some(existing) = queue.iter_mut().find(|q| q.node.id() == id) {
                // Re-prioritize in place.
                existing.context = context;
            } else {
                queue.push(QueuedLoad { node, context });
            }
            *dirty = true;
        });
    }

    /// Best-effort cancel: dequeue if queued, flag if executing, and
    /// quietly do nothing for an unknown node.
    pub fn cancel(&self, node: &SceneNode) {
        let mut state = self.monitor.lock();
        let id = node.id();
        state.visible.retain(|q| q.node.id() != id);
        state.prefetch.retain(|q| q.node.id() != id);
        if let Some((cancel, _)) = state.executing.get(&id) {
            cancel.cancel();
        }
    }

    /// Empty both queues and flag every executing load.
    pub fn cancel_all(&self) {
        let mut state = self.monitor.lock();
        state.visible.clear();
        state.prefetch.clear();
        for (cancel, _) in state.executing.values() {
            cancel.cancel();
        }
    }

    /// Queued-or-executing state for the given priority class.
    pub fn is_queued(&self, node: &SceneNode, prefetch: bool) -> bool {
        let state = self.monitor.lock();
        let id = node.id();
        let queued = if prefetch {
            state.prefetch.iter().any(|q| q.node.id() == id)
        } else {
            state.visible.iter().any(|q| q.node.id() == id)
        };
        queued
            || state
                .executing
                .get(&id)
                .map_or(false, |(_, from_prefetch)| *from_prefetch == prefetch)
    }

    pub fn stats(&self) -> LoaderStats {
        let state = self.monitor.lock();
        LoaderStats {
            visible_queued: state.visible.len(),
            prefetch_queued: state.prefetch.len(),
            executing: state.executing.len(),
        }
    }

    /// Stop the pool. Queued loads are dropped; executing loads are
    /// flagged and joined.
    pub fn shutdown(&mut self) {
        {
            let mut state = self.monitor.lock();
            state.shutdown = true;
            state.visible.clear();
            state.prefetch.clear();
            for (cancel, _) in state.executing.values() {
                cancel.cancel();
            }
        }
        self.monitor.notify_all();
        for worker in self.workers.drain(..) {
            worker.join().ok();
        }
    }

}

impl Drop for NodeLoader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(source: Arc<dyn MeshSource>, monitor: Arc<Monitor<LoaderState>>) {
    loop {
        let (job, cancel) = {
            let mut state = monitor.lock();
            loop {
                if state.shutdown {
                    return;
                }
                if let Some((job, from_prefetch)) = state.take_next() {
                    let cancel = CancelFlag::new();
                    state
                        .executing
                        .insert(job.node.id(), (cancel.clone(), from_prefetch));
                    break (job, cancel);
                }
                monitor.wait(&mut state);
            }
        };

        let lod = job.node.lod_for_gsd(job.context.gsd);
        if !job.node.has_mesh(lod) {
            match source.load_mesh(&job.node, lod, &cancel) {
                Ok(Some(mesh)) => {
                    if cancel.is_cancelled() {
                        log::trace!("load of node {} abandoned", job.node.id());
                    } else {
                        job.node.set_mesh(lod, mesh);
                    }
                }
                Ok(None) => {
                    log::debug!("no mesh payload for node {} lod {}", job.node.id(), lod);
                }
                Err(err) => {
                    // The node simply stays meshless until some later
                    // visibility pass re-enqueues it.
                    log::warn!("mesh load failed for node {}: {:#}", job.node.id(), err);
                }
            }
        }

        monitor.signal(|state| {
            state.executing.remove(&job.node.id());
        });
    }
}
