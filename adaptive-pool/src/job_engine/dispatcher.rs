// SPDX-License-Identifier: MIT
//
// The dispatcher loop (intake -> idle worker or buffer) and the drain loop
// (buffer -> next worker that frees up). Both run on dedicated threads and own
// the only senders of the worker intake: when both have returned, idle workers
// see a disconnected channel and exit.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::Context;
use crossbeam_channel::{Sender, TrySendError};

use crate::job_engine::envelope::Envelope;
use crate::job_engine::shared::Shared;

/// Handles of the two dispatcher threads.
#[derive(Debug)]
pub struct DispatcherThreads {
    pub dispatch: JoinHandle<()>,
    pub drain: JoinHandle<()>,
}

/// Start the dispatcher and the drain loop.
pub fn start<T, E>(
    shared: Arc<Shared<T, E>>,
    intake: async_channel::Receiver<Envelope<T, E>>,
    workers: Sender<Envelope<T, E>>,
    buffer_capacity: usize,
) -> anyhow::Result<DispatcherThreads>
where
    T: Send + 'static,
    E: Send + 'static,
{
    let (buffer_tx, buffer_rx) = async_channel::bounded(buffer_capacity);
    let name = shared.settings.name.clone();

    let drain = {
        let shared = shared.clone();
        let workers = workers.clone();
        thread::Builder::new()
            .name(format!("{name}-drain"))
            .spawn(move || drain_loop(shared, buffer_rx, workers))
            .context("failed to spawn the buffer drain thread")?
    };

    // run dispatcher in a dedicated thread
    let dispatch = thread::Builder::new()
        .name(format!("{name}-dispatcher"))
        .spawn(move || dispatch_loop(shared, intake, buffer_tx, workers))
        .context("failed to spawn the dispatcher thread")?;

    Ok(DispatcherThreads { dispatch, drain })
}

/// Hand each accepted envelope straight to an idle worker, or buffer it. The
/// buffer push blocks while the buffer is full, which in turn blocks the
/// submitting callers.
fn dispatch_loop<T, E>(
    shared: Arc<Shared<T, E>>,
    intake: async_channel::Receiver<Envelope<T, E>>,
    buffer: async_channel::Sender<Envelope<T, E>>,
    workers: Sender<Envelope<T, E>>,
) where
    T: Send + 'static,
    E: Send + 'static,
{
    let log = &shared.log;
    while let Ok(envelope) = intake.recv_blocking() {
        let id = envelope.id();
        match workers.try_send(envelope) {
            Ok(()) => {
                log.debug(format_args!("Handed job {id} to an idle worker"));
                shared.scale();
            }
            Err(TrySendError::Full(envelope)) => {
                shared.scale();
                log.debug(format_args!("No idle worker, buffering job {id}"));
                if let Err(e) = buffer.send_blocking(envelope) {
                    // Dropping the envelope releases its ticket.
                    log.error(format_args!("Buffer closed, dropped job {id}: {e}"));
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                log.error(format_args!("Worker intake disconnected, dropped job {id}"));
            }
        }
    }

    // The intake has been closed and the pool is quiescent.
    buffer.close();
    log.info(format_args!("Dispatcher shutting down gracefully"));
}

/// Promote buffered envelopes to workers as soon as one becomes free.
fn drain_loop<T, E>(
    shared: Arc<Shared<T, E>>,
    buffer: async_channel::Receiver<Envelope<T, E>>,
    workers: Sender<Envelope<T, E>>,
) where
    T: Send + 'static,
    E: Send + 'static,
{
    let log = &shared.log;
    while let Ok(envelope) = buffer.recv_blocking() {
        let id = envelope.id();
        shared.scale();
        if workers.send(envelope).is_err() {
            log.error(format_args!("Worker intake disconnected, dropped job {id}"));
        } else {
            log.debug(format_args!("Handed buffered job {id} to a worker"));
        }
    }
    log.debug(format_args!("Buffer closed, drain loop ended"));
}
