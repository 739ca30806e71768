// SPDX-License-Identifier: MIT
//
// Shutdown coordinator: the one-time teardown of a pool.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::job_engine::dispatcher::DispatcherThreads;
use crate::job_engine::envelope::Envelope;
use crate::job_engine::shared::Shared;
use crate::job_engine::worker;
use crate::logging::PoolLog;

/// How often `stop` reports the number of jobs it is still waiting for.
const STOP_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Everything the teardown needs. Lives behind an `Arc` so that the teardown
/// can be moved off a worker thread.
#[derive(Debug)]
pub struct Shutdown<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub shared: Arc<Shared<T, E>>,
    pub intake: async_channel::Sender<Envelope<T, E>>,
    threads: Mutex<Option<DispatcherThreads>>,
    terminated: (Mutex<bool>, Condvar),
}

impl<T, E> Shutdown<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new(
        shared: Arc<Shared<T, E>>,
        intake: async_channel::Sender<Envelope<T, E>>,
        threads: DispatcherThreads,
    ) -> Self {
        Self {
            shared,
            intake,
            threads: Mutex::new(Some(threads)),
            terminated: (Mutex::new(false), Condvar::new()),
        }
    }

    /// Stop accepting jobs, wait for quiescence, then close intake, buffer,
    /// worker channel and outputs. Only the first call tears down and returns `true`.
    pub fn stop(&self) -> bool {
        let log = &self.shared.log;
        if self
            .shared
            .stopping
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log.info(format_args!("Stop already triggered"));
            return false;
        }

        log.info(format_args!("Requesting shut down of the pool"));
        self.shared
            .census
            .wait_quiescent(STOP_PROGRESS_INTERVAL, |active| {
                log.debug(format_args!("Cannot stop yet. Active jobs = {active}"));
            });

        // No accepted job is left anywhere, nothing can be sent any more.
        self.intake.close();
        let threads = self
            .threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(threads) = threads {
            join(log, "dispatcher", threads.dispatch);
            join(log, "drain", threads.drain);
        }

        if self.shared.outputs.close() {
            log.debug(format_args!("Closed error and result channels"));
        }
        self.shared.census.wait_workers_gone();

        let (done, cvar) = &self.terminated;
        *done.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();

        log.info(format_args!("Successfully shut down the pool"));
        true
    }

    /// Stop from a context that must not block on the pool: the last handle
    /// dropped inside a job would otherwise wait for that very job.
    pub fn stop_detached(self: &Arc<Self>) {
        if self.shared.is_stopping() {
            return;
        }
        let shutdown = self.clone();
        let spawned = thread::Builder::new()
            .name(format!("{}-shutdown", self.shared.settings.name))
            .spawn(move || {
                shutdown.stop();
            });
        if let Err(e) = spawned {
            self.shared.log.error(format_args!(
                "Failed to spawn the shutdown thread, pool is left running: {e}"
            ));
        }
    }

    /// Stop on release of the last handle: inline, unless a pool job is
    /// running on this thread.
    pub fn stop_on_release(self: &Arc<Self>) {
        if worker::on_worker_thread() {
            self.stop_detached();
        } else {
            self.stop();
        }
    }

    pub fn await_termination(&self) {
        let (done, cvar) = &self.terminated;
        let guard = done.lock().unwrap_or_else(PoisonError::into_inner);
        let _guard = cvar
            .wait_while(guard, |done| !*done)
            .unwrap_or_else(PoisonError::into_inner);
    }

    pub fn is_terminated(&self) -> bool {
        *self
            .terminated
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn join(log: &PoolLog, what: &str, handle: JoinHandle<()>) {
    if handle.join().is_err() {
        log.error(format_args!("The {what} thread panicked"));
    }
}
