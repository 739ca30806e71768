// SPDX-License-Identifier: MIT
//
// The public pool handle: submission entry points and accessors.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::job_engine::dispatcher;
use crate::job_engine::envelope::{Envelope, Protocol, Ticket};
use crate::job_engine::shared::Shared;
use crate::job_engine::shutdown::Shutdown;
use crate::options::PoolOptions;

/// Snapshot of the pool state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub name: String,
    pub active_jobs: u32,
    pub live_workers: u32,
    pub max_workers: u32,
    pub stopping: bool,
}

/// A pool of worker threads that scales with demand.
///
/// `T` is the value type of jobs submitted with [`Pool::submit_check_result`],
/// `E` the error type of jobs submitted with [`Pool::submit_check_error`] and
/// [`Pool::submit_check_result`].
///
/// All methods take `&self`; share a pool between submitting threads with an
/// `Arc`. `stop` must not be called from inside a job, it would wait for
/// itself; dropping a handle inside a job is fine.
#[derive(Debug)]
pub struct Pool<T = (), E = anyhow::Error>
where
    T: Send + 'static,
    E: Send + 'static,
{
    shared: Arc<Shared<T, E>>,
    shutdown: Arc<Shutdown<T, E>>,
    next_job_id: AtomicU64,
}

impl<T, E> Pool<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Create a pool, start its dispatcher and its initial workers.
    pub fn new(options: PoolOptions) -> anyhow::Result<Self> {
        let settings = options.normalize();
        let (workers_tx, workers_rx) = crossbeam_channel::bounded(0);
        // Do not make the intake larger: while the dispatcher is blocked on a
        // full buffer, submitters have to block as well.
        let (intake_tx, intake_rx) = async_channel::bounded(1);
        let queue_capacity = settings.queue_capacity;

        let shared = Arc::new(Shared::new(settings, workers_rx));
        let threads = dispatcher::start(shared.clone(), intake_rx, workers_tx, queue_capacity)?;
        shared.start_initial_workers();

        shared.log.info(format_args!(
            "Pool started: max workers = {}, idle timeout = {:?}, queue capacity = {}",
            shared.settings.max_workers, shared.settings.idle_timeout, queue_capacity
        ));

        Ok(Self {
            shutdown: Arc::new(Shutdown::new(shared.clone(), intake_tx, threads)),
            shared,
            next_job_id: AtomicU64::new(0),
        })
    }

    /// Submit a job whose outcome is discarded.
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.accept(Protocol::Detached(Box::new(job)));
    }

    /// Submit a job whose error, if any, is posted to [`Pool::errors`].
    pub fn submit_check_error<F>(&self, job: F)
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
    {
        self.accept(Protocol::CheckError(Box::new(job)));
    }

    /// Submit a job whose error is posted to [`Pool::errors`], or whose value
    /// is posted to [`Pool::results`].
    pub fn submit_check_result<F>(&self, job: F)
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        self.accept(Protocol::CheckResult(Box::new(job)));
    }

    /// Count the job, then hand it to the dispatcher. Blocks while the buffer
    /// is full. After `stop` was called the job is logged and dropped.
    fn accept(&self, protocol: Protocol<T, E>) {
        if self.shared.is_stopping() {
            self.reject(protocol.name());
            return;
        }

        let ticket = Ticket::issue(self.shared.census.clone());
        // Stop may have started between the check above and the ticket. Either
        // it sees this ticket and waits for the job, or the job is rolled back here.
        if self.shared.is_stopping() {
            drop(ticket);
            self.reject(protocol.name());
            return;
        }

        let id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
        let envelope = Envelope::new(id, protocol, ticket);
        if let Err(e) = self.shutdown.intake.send_blocking(envelope) {
            self.shared
                .log
                .error(format_args!("Intake closed, dropped job {id}: {e}"));
        }
    }

    fn reject(&self, protocol: &str) {
        self.shared.log.error(format_args!(
            "Cannot accept {protocol} job - shutting down the pool"
        ));
    }

    /// Errors of jobs submitted with `submit_check_error` or
    /// `submit_check_result`. Best effort: if nobody reads and the channel is
    /// full, further errors are dropped. Start reading before submitting so no
    /// early error is missed. The channel is closed when `stop` returns.
    pub fn errors(&self) -> async_channel::Receiver<E> {
        self.shared.outputs.errors()
    }

    /// Values of jobs submitted with `submit_check_result`, same delivery
    /// rules as [`Pool::errors`].
    pub fn results(&self) -> async_channel::Receiver<T> {
        self.shared.outputs.results()
    }

    /// Jobs accepted and not finished yet (queued or executing).
    pub fn active_job_count(&self) -> u32 {
        self.shared.census.active_jobs()
    }

    pub fn live_worker_count(&self) -> u32 {
        self.shared.census.live_workers()
    }

    pub fn is_stopping(&self) -> bool {
        self.shared.is_stopping()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            name: self.shared.settings.name.clone(),
            active_jobs: self.active_job_count(),
            live_workers: self.live_worker_count(),
            max_workers: self.shared.census.max_workers(),
            stopping: self.is_stopping(),
        }
    }

    /// Stop accepting jobs, wait for every accepted job to finish, then shut
    /// down the dispatcher, the workers and the output channels.
    ///
    /// Only the first call does this and returns `true`. Any other call
    /// returns `false` right away; use [`Pool::await_termination`] to wait
    /// for the first one to finish.
    pub fn stop(&self) -> bool {
        self.shutdown.stop()
    }

    /// Block until a `stop` (from any thread) has finished its teardown.
    pub fn await_termination(&self) {
        self.shutdown.await_termination();
    }

    pub fn is_terminated(&self) -> bool {
        self.shutdown.is_terminated()
    }
}

impl<T, E> Drop for Pool<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Dropping the last handle stops the pool. When that happens inside one
    /// of its own jobs, the teardown continues on a separate thread.
    fn drop(&mut self) {
        self.shutdown.stop_on_release();
    }
}
