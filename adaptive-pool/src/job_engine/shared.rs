// SPDX-License-Identifier: MIT
//
// State shared by the pool handle, the dispatcher threads and the workers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::Receiver;

use crate::job_engine::census::Census;
use crate::job_engine::envelope::Envelope;
use crate::job_engine::outputs::Outputs;
use crate::job_engine::worker::Worker;
use crate::logging::PoolLog;
use crate::options::Settings;

#[derive(Debug)]
pub struct Shared<T, E> {
    pub settings: Settings,
    pub log: PoolLog,
    pub census: Arc<Census>,
    pub outputs: Outputs<T, E>,
    pub stopping: AtomicBool,
    /// Receiving end of the rendezvous channel every worker pulls from. Kept
    /// here so that new workers can be handed a clone.
    worker_intake: Receiver<Envelope<T, E>>,
    next_worker_id: AtomicU64,
}

impl<T, E> Shared<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new(settings: Settings, worker_intake: Receiver<Envelope<T, E>>) -> Self {
        let log = PoolLog::new(settings.name.clone(), settings.log_level);
        Self {
            census: Arc::new(Census::new(settings.max_workers)),
            outputs: Outputs::new(settings.output_capacity, log.clone()),
            stopping: AtomicBool::new(false),
            worker_intake,
            next_worker_id: AtomicU64::new(0),
            log,
            settings,
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Scaling controller: start one more worker if there is more outstanding
    /// work than workers and the ceiling allows it.
    pub fn scale(self: &Arc<Self>) {
        if let Some(demand) = self.census.reserve_worker() {
            self.log.debug(format_args!(
                "Spawning worker: active jobs = {}, live workers = {}",
                demand.active_jobs, demand.live_workers
            ));
            self.start_worker();
        }
    }

    /// Start the initial worker set.
    pub fn start_initial_workers(self: &Arc<Self>) {
        for _ in 0..self.settings.initial_workers {
            if self.census.reserve_initial_worker() {
                self.start_worker();
            }
        }
    }

    /// Start a worker thread for a slot already reserved in the census.
    fn start_worker(self: &Arc<Self>) {
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let worker = Worker::new(id, self.clone(), self.worker_intake.clone());

        let spawned = thread::Builder::new()
            .name(format!("{}-worker-{}", self.settings.name, id))
            .spawn(move || worker.run());

        if let Err(e) = spawned {
            self.census.release_worker();
            self.log
                .error(format_args!("Failed to spawn worker {id}: {e}"));
        }
    }
}
