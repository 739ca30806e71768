// SPDX-License-Identifier: MIT
//
// Counters of a pool and the scaling decisions taken on them.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Consistent snapshot of the counters a scaling decision depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Demand {
    pub active_jobs: u32,
    pub live_workers: u32,
    pub max_workers: u32,
}

impl Demand {
    /// More outstanding work than workers, and room below the ceiling.
    pub fn wants_worker(&self) -> bool {
        let below_ceiling = self.max_workers == 0 || self.live_workers < self.max_workers;
        below_ceiling && self.active_jobs > self.live_workers
    }

    /// More workers than outstanding work, so one of them may retire.
    pub fn has_surplus(&self) -> bool {
        self.active_jobs < self.live_workers
    }
}

/// `active_jobs` and `live_workers` of a pool.
///
/// Both counters are only ever changed with atomic operations. Decisions that
/// read both (spawn, retire) and changes of `live_workers` are taken while
/// holding `decision`, which is never held across a blocking call except
/// inside the condition waits below.
#[derive(Debug)]
pub struct Census {
    active_jobs: AtomicU32,
    live_workers: AtomicU32,
    max_workers: u32,
    decision: Mutex<()>,
    changed: Condvar,
}

impl Census {
    pub fn new(max_workers: u32) -> Self {
        Self {
            active_jobs: AtomicU32::new(0),
            live_workers: AtomicU32::new(0),
            max_workers,
            decision: Mutex::new(()),
            changed: Condvar::new(),
        }
    }

    pub fn active_jobs(&self) -> u32 {
        self.active_jobs.load(Ordering::SeqCst)
    }

    pub fn live_workers(&self) -> u32 {
        self.live_workers.load(Ordering::SeqCst)
    }

    pub fn max_workers(&self) -> u32 {
        self.max_workers
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The mutex guards no data, a poisoned lock is as good as a healthy one.
        self.decision.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn demand(&self) -> Demand {
        Demand {
            active_jobs: self.active_jobs(),
            live_workers: self.live_workers(),
            max_workers: self.max_workers,
        }
    }

    /// Count a job as accepted.
    pub fn begin_job(&self) {
        self.active_jobs.fetch_add(1, Ordering::SeqCst);
    }

    /// Count a job as finished (or discarded). Wakes `wait_quiescent` on zero.
    pub fn finish_job(&self) {
        let previous = self.active_jobs.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "active job counter underflow");
        if previous == 1 {
            let _guard = self.lock();
            self.changed.notify_all();
        }
    }

    /// Reserve a slot for a new worker if demand calls for one. The slot is
    /// counted as live right away, so a burst of dispatches cannot reserve
    /// more slots than the ceiling allows.
    pub fn reserve_worker(&self) -> Option<Demand> {
        let _guard = self.lock();
        let demand = self.demand();
        if demand.wants_worker() {
            self.live_workers.fetch_add(1, Ordering::SeqCst);
            Some(demand)
        } else {
            None
        }
    }

    /// Reserve a slot unconditionally (initial workers), still bounded by the ceiling.
    pub fn reserve_initial_worker(&self) -> bool {
        let _guard = self.lock();
        let live = self.live_workers();
        if self.max_workers == 0 || live < self.max_workers {
            self.live_workers.fetch_add(1, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    /// Give a slot back (worker exit or failed spawn).
    pub fn release_worker(&self) {
        let _guard = self.lock();
        let previous = self.live_workers.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "live worker counter underflow");
        if previous == 1 {
            self.changed.notify_all();
        }
    }

    /// Give the calling worker's slot back if capacity exceeds demand.
    /// Returns `true` if the worker must retire.
    pub fn retire_if_surplus(&self) -> bool {
        let _guard = self.lock();
        if self.demand().has_surplus() {
            let previous = self.live_workers.fetch_sub(1, Ordering::SeqCst);
            if previous == 1 {
                self.changed.notify_all();
            }
            true
        } else {
            false
        }
    }

    /// Block until no job is queued or executing. `progress` is called with the
    /// remaining count every `report_every` while waiting.
    pub fn wait_quiescent(&self, report_every: Duration, mut progress: impl FnMut(u32)) {
        let mut guard = self.lock();
        loop {
            let active = self.active_jobs();
            if active == 0 {
                return;
            }
            progress(active);
            guard = self
                .changed
                .wait_timeout_while(guard, report_every, |_| self.active_jobs() != 0)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Block until every worker has exited.
    pub fn wait_workers_gone(&self) {
        let guard = self.lock();
        let _guard = self
            .changed
            .wait_while(guard, |_| self.live_workers() != 0)
            .unwrap_or_else(PoisonError::into_inner);
    }
}
