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
use parking_lot::Mutex;
use std::{
    sync::atomic::{AtomicU64, Ordering},
    thread::{self, ThreadId},
};

/// The host rendering loop, as the async pipeline sees it. GPU-facing
/// resources may only be touched on the thread that owns the GL
/// context, so background workers hand release work back through
/// `queue_on_render_thread` rather than dropping resources themselves.
pub trait RenderContext: Send + Sync + 'static {
    fn is_render_thread(&self) -> bool;

    /// Queue `work` to run on the render thread at the top of a
    /// subsequent frame.
    fn queue_on_render_thread(&self, work: Box<dyn FnOnce() + Send>);

    /// Ask the host to schedule another frame soon.
    fn request_repaint(&self);
}

/// A render context that collects queued work for the owner to pump
/// once per frame. The constructing thread is taken to be the render
/// thread.
pub struct QueuedRenderContext {
    render_thread: ThreadId,
    queued: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    repaint_requests: AtomicU64,
}

impl Default for QueuedRenderContext {
    fn default() -> Self {
        Self::new()
    }
}

impl QueuedRenderContext {
    pub fn new() -> Self {
        Self {
            render_thread: thread::current().id(),
            queued: Mutex::new(Vec::new()),
            repaint_requests: AtomicU64::new(0),
        }
    }

    /// Run all queued callbacks. Must be called from the render
    /// thread; queued work assumes it.
    pub fn pump(&self) {
        debug_assert!(self.is_render_thread());
        let pending = std::mem::take(&mut *self.queued.lock());
        for work in pending {
            work();
        }
    }

    pub fn queued_len(&self) -> usize {
        self.queued.lock().len()
    }

    /// Number of repaint requests since the last take.
    pub fn take_repaint_requests(&self) -> u64 {
        self.repaint_requests.swap(0, Ordering::AcqRel)
    }
}

impl RenderContext for QueuedRenderContext {
    fn is_render_thread(&self) -> bool {
        thread::current().id() == self.render_thread
    }

    fn queue_on_render_thread(&self, work: Box<dyn FnOnce() + Send>) {
        self.queued.lock().push(work);
    }

    fn request_repaint(&self) {
        self.repaint_requests.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[test]
    fn test_pump_runs_queued_work_in_order() {
        let context = QueuedRenderContext::new();
        let ran = Arc::new(AtomicUsize::new(0));
        for i in 0..3 {
            let ran = ran.clone();
            context.queue_on_render_thread(Box::new(move || {
                assert_eq!(ran.fetch_add(1, Ordering::SeqCst), i);
            }));
        }
        assert_eq!(context.queued_len(), 3);
        context.pump();
        assert_eq!(ran.load(Ordering::SeqCst), 3);
        assert_eq!(context.queued_len(), 0);
    }

    #[test]
    fn test_render_thread_identity() {
        let context = Arc::new(QueuedRenderContext::new());
        assert!(context.is_render_thread());
        let remote = context.clone();
        std::thread::spawn(move || {
            assert!(!remote.is_render_thread());
            remote.request_repaint();
        })
        .join()
        .unwrap();
        assert_eq!(context.take_repaint_requests(), 1);
        assert_eq!(context.take_repaint_requests(), 0);
    }
}
