// SPDX-License-Identifier: MIT
//
// Envelopes: a caller's job together with the way its outcome is routed.

use std::fmt;
use std::sync::Arc;

use crate::job_engine::census::Census;
use crate::job_engine::outputs::Outputs;

/// How the outcome of a job is routed.
pub enum Protocol<T, E> {
    /// Fire and forget, the outcome is discarded.
    Detached(Box<dyn FnOnce() + Send + 'static>),
    /// An error goes to the error channel.
    CheckError(Box<dyn FnOnce() -> Result<(), E> + Send + 'static>),
    /// An error goes to the error channel, a value to the result channel. Never both.
    CheckResult(Box<dyn FnOnce() -> Result<T, E> + Send + 'static>),
}

impl<T, E> Protocol<T, E> {
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Detached(_) => "detached",
            Protocol::CheckError(_) => "check-error",
            Protocol::CheckResult(_) => "check-result",
        }
    }
}

/// Proof that a job has been counted in `active_jobs`. Dropping it counts the
/// job as finished, whether it ran, was discarded, or panicked.
pub struct Ticket {
    census: Arc<Census>,
}

impl Ticket {
    /// Counts the job. Must only be called once the job is accepted.
    pub fn issue(census: Arc<Census>) -> Self {
        census.begin_job();
        Self { census }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.census.finish_job();
    }
}

pub struct Envelope<T, E> {
    id: u64,
    protocol: Protocol<T, E>,
    ticket: Ticket,
}

impl<T, E> Envelope<T, E> {
    pub fn new(id: u64, protocol: Protocol<T, E>, ticket: Ticket) -> Self {
        Self {
            id,
            protocol,
            ticket,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Run the job on the calling thread and post its outcome. The job is
    /// counted as finished only after the outcome has been posted.
    pub fn run(self, outputs: &Outputs<T, E>) {
        let Envelope {
            id,
            protocol,
            ticket,
        } = self;

        match protocol {
            Protocol::Detached(job) => job(),
            Protocol::CheckError(job) => {
                if let Err(error) = job() {
                    outputs.report_error(id, error);
                }
            }
            Protocol::CheckResult(job) => match job() {
                Ok(value) => outputs.report_result(id, value),
                Err(error) => outputs.report_error(id, error),
            },
        }

        drop(ticket);
    }
}

impl<T, E> fmt::Debug for Envelope<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("id", &self.id)
            .field("protocol", &self.protocol.name())
            .finish()
    }
}
