// SPDX-License-Identifier: MIT
//
// Best-effort output channels for job errors and job results.

use async_channel::{Receiver, Sender, TrySendError};

use crate::logging::PoolLog;

/// Sending halves of the error and result channels, plus one receiver of each
/// that is handed out (cloned) to callers.
///
/// Sends never block: when a channel is full the outcome is dropped, so a slow
/// reader can never stall job execution.
#[derive(Debug)]
pub struct Outputs<T, E> {
    errors_tx: Sender<E>,
    errors_rx: Receiver<E>,
    results_tx: Sender<T>,
    results_rx: Receiver<T>,
    log: PoolLog,
}

impl<T, E> Outputs<T, E> {
    pub fn new(capacity: usize, log: PoolLog) -> Self {
        let (errors_tx, errors_rx) = async_channel::bounded(capacity);
        let (results_tx, results_rx) = async_channel::bounded(capacity);
        Self {
            errors_tx,
            errors_rx,
            results_tx,
            results_rx,
            log,
        }
    }

    pub fn errors(&self) -> Receiver<E> {
        self.errors_rx.clone()
    }

    pub fn results(&self) -> Receiver<T> {
        self.results_rx.clone()
    }

    pub fn report_error(&self, job_id: u64, error: E) {
        match self.errors_tx.try_send(error) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.log.debug(format_args!(
                "Error channel full, dropped error of job {job_id}"
            )),
            Err(TrySendError::Closed(_)) => self.log.error(format_args!(
                "Error channel already closed, dropped error of job {job_id}"
            )),
        }
    }

    pub fn report_result(&self, job_id: u64, value: T) {
        match self.results_tx.try_send(value) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.log.debug(format_args!(
                "Result channel full, dropped result of job {job_id}"
            )),
            Err(TrySendError::Closed(_)) => self.log.error(format_args!(
                "Result channel already closed, dropped result of job {job_id}"
            )),
        }
    }

    /// Close both channels. Receivers still get what is buffered, then the end
    /// of the stream. Returns `true` if this call closed them.
    pub fn close(&self) -> bool {
        let errors_closed = self.errors_tx.close();
        let results_closed = self.results_tx.close();
        errors_closed && results_closed
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.errors_tx.is_closed() && self.results_tx.is_closed()
    }
}
