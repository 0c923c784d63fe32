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
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// A mutex paired with a condition variable, in the classic monitor
/// arrangement. All waits must happen under the guard returned by
/// `lock`; waking re-acquires the same mutex before returning.
#[derive(Debug, Default)]
pub struct Monitor<T> {
    state: Mutex<T>,
    cond: Condvar,
}

impl<T> Monitor<T> {
    pub fn new(state: T) -> Self {
        Self {
            state: Mutex::new(state),
            cond: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<T> {
        self.state.lock()
    }

    /// Block until signaled. Spurious wakeups are possible; callers
    /// must re-check their predicate after waking.
    pub fn wait(&self, guard: &mut MutexGuard<T>) {
        self.cond.wait(guard);
    }

    /// Block until signaled or the timeout elapses. Returns false if
    /// the wait timed out without a signal.
    pub fn wait_for(&self, guard: &mut MutexGuard<T>, timeout: Duration) -> bool {
        !self.cond.wait_for(guard, timeout).timed_out()
    }

    /// Block until `predicate` returns true, re-checking on every wake.
    pub fn wait_while<F>(&self, guard: &mut MutexGuard<T>, mut blocked: F)
    where
        F: FnMut(&mut T) -> bool,
    {
        while blocked(&mut *guard) {
            self.cond.wait(guard);
        }
    }

    pub fn notify_one(&self) {
        self.cond.notify_one();
    }

    pub fn notify_all(&self) {
        self.cond.notify_all();
    }

    /// Run `f` under the lock and wake one waiter afterwards.
    pub fn signal<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        let rv = f(&mut *self.state.lock());
        self.cond.notify_one();
        rv
    }
}
