// SPDX-License-Identifier: MIT
//
// Worker threads.
//
// A worker moves through `Idle -> Running -> Idle ...` until it either times
// out while the pool has more workers than work (`Retiring`), or its intake is
// disconnected during shutdown. A worker never comes back: a new worker is a
// new thread.

use std::cell::Cell;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::job_engine::envelope::Envelope;
use crate::job_engine::shared::Shared;

thread_local! {
    static ON_WORKER: Cell<bool> = const { Cell::new(false) };
}

/// Whether the calling thread is a pool worker, i.e. whether code running here
/// may be a job.
pub(crate) fn on_worker_thread() -> bool {
    ON_WORKER.with(Cell::get)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Retiring,
    Dead,
}

/// What an idle worker does next.
#[derive(Debug)]
pub enum Wakeup<J> {
    Job(J),
    IdleTimeout,
    Disconnected,
}

/// Transition out of `Idle`. `surplus` is only consulted on an idle timeout
/// and must give the worker's slot back when it returns `true`.
pub fn next_state<J>(wakeup: &Wakeup<J>, surplus: impl FnOnce() -> bool) -> WorkerState {
    match wakeup {
        Wakeup::Job(_) => WorkerState::Running,
        Wakeup::IdleTimeout if surplus() => WorkerState::Retiring,
        Wakeup::IdleTimeout => WorkerState::Idle,
        Wakeup::Disconnected => WorkerState::Dead,
    }
}

fn wait_for_job<J>(intake: &Receiver<J>, idle_timeout: Duration) -> Wakeup<J> {
    match intake.recv_timeout(idle_timeout) {
        Ok(job) => Wakeup::Job(job),
        Err(RecvTimeoutError::Timeout) => Wakeup::IdleTimeout,
        Err(RecvTimeoutError::Disconnected) => Wakeup::Disconnected,
    }
}

pub struct Worker<T, E> {
    id: u64,
    shared: Arc<Shared<T, E>>,
    intake: Receiver<Envelope<T, E>>,
}

impl<T, E> Worker<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new(id: u64, shared: Arc<Shared<T, E>>, intake: Receiver<Envelope<T, E>>) -> Self {
        Self { id, shared, intake }
    }

    /// Worker loop. The live slot was reserved by whoever started this thread
    /// and is given back exactly once, also when a job panics.
    pub fn run(self) {
        ON_WORKER.with(|on_worker| on_worker.set(true));
        let mut slot = LiveSlot {
            id: self.id,
            shared: self.shared.clone(),
            held: true,
        };
        let log = &self.shared.log;
        log.info(format_args!(
            "Started worker {}. Worker count = {}",
            self.id,
            self.shared.census.live_workers()
        ));

        let idle_timeout = self.shared.settings.idle_timeout;
        loop {
            let wakeup = wait_for_job(&self.intake, idle_timeout);
            match next_state(&wakeup, || self.shared.census.retire_if_surplus()) {
                WorkerState::Running => {
                    if let Wakeup::Job(envelope) = wakeup {
                        log.debug(format_args!(
                            "Worker {} running job {}",
                            self.id,
                            envelope.id()
                        ));
                        // The idle timer starts over once this returns.
                        envelope.run(&self.shared.outputs);
                    }
                }
                WorkerState::Idle => {}
                WorkerState::Retiring => {
                    // retire_if_surplus already gave the slot back
                    slot.held = false;
                    log.info(format_args!(
                        "Worker {} timed out and retired. Worker count = {}",
                        self.id,
                        self.shared.census.live_workers()
                    ));
                    return;
                }
                WorkerState::Dead => return,
            }
        }
    }
}

/// Gives the worker's live slot back when the thread ends.
struct LiveSlot<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    id: u64,
    shared: Arc<Shared<T, E>>,
    held: bool,
}

impl<T, E> Drop for LiveSlot<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn drop(&mut self) {
        if !self.held {
            return;
        }
        self.shared.census.release_worker();

        if thread::panicking() {
            self.shared.log.error(format_args!(
                "Worker {} died with a panicking job. Worker count = {}",
                self.id,
                self.shared.census.live_workers()
            ));
            // Queued work must not wait for a worker that is gone.
            self.shared.scale();
        } else {
            self.shared.log.info(format_args!(
                "Stopped worker {}. Worker count = {}",
                self.id,
                self.shared.census.live_workers()
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_wakes_into_running() {
        let state = next_state(&Wakeup::Job(()), || panic!("not consulted"));
        assert_eq!(state, WorkerState::Running);
    }

    #[test]
    fn idle_timeout_retires_only_with_surplus() {
        assert_eq!(
            next_state(&Wakeup::<()>::IdleTimeout, || true),
            WorkerState::Retiring
        );
        assert_eq!(
            next_state(&Wakeup::<()>::IdleTimeout, || false),
            WorkerState::Idle
        );
    }

    #[test]
    fn disconnect_is_terminal() {
        let state = next_state(&Wakeup::<()>::Disconnected, || panic!("not consulted"));
        assert_eq!(state, WorkerState::Dead);
    }

    #[test]
    fn only_worker_threads_are_marked() {
        assert!(!on_worker_thread());
        let marked = thread::spawn(|| {
            ON_WORKER.with(|on_worker| on_worker.set(true));
            on_worker_thread()
        });
        assert!(marked.join().unwrap());
        assert!(!on_worker_thread());
    }

    #[test]
    fn wait_for_job_reports_timeout_and_disconnect() {
        let (tx, rx) = crossbeam_channel::bounded::<u32>(0);
        assert!(matches!(
            wait_for_job(&rx, Duration::from_millis(5)),
            Wakeup::IdleTimeout
        ));
        drop(tx);
        assert!(matches!(
            wait_for_job(&rx, Duration::from_millis(5)),
            Wakeup::Disconnected
        ));
    }
}
