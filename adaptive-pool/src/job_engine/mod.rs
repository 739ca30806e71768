// SPDX-License-Identifier: MIT
//
//! # Design: Demand-Scaled Worker Pool
//!
//! ## Overview
//! A pool of worker threads that runs caller-submitted jobs with bounded parallelism.
//!
//! - Submitters hand envelopes to a single dispatcher thread through a one-slot intake.
//! - The dispatcher tries a non-blocking handoff to a worker blocked on the rendezvous
//!   channel; otherwise it pushes the envelope into a bounded buffer (backpressure).
//! - A drain thread promotes buffered envelopes to workers as they free up.
//! - Every dispatch asks the scaling controller whether one more worker is warranted.
//! - Idle workers retire after a timeout if there are more workers than jobs.
//! - `stop` waits for quiescence, then closes intake, buffer, worker channel and outputs, in that order.
//!
//! ```text
//!            submit / submit_check_error / submit_check_result
//!                                  |
//!                          +-------v-------+
//!                          |  Dispatcher   |----- scale() ---> spawn worker
//!                          +---+-------+---+
//!                   try_send   |       |  buffer full -> blocks
//!                              |   +---v-----------+
//!                              |   | Bounded buffer|
//!                              |   +---+-----------+
//!                              |       | drain loop (blocking send)
//!                          +---v-------v---+
//!                          | Worker intake |  (rendezvous)
//!                          +-+-----+-----+-+
//!                            |     |     |
//!                         +--v-+ +-v--+ +v---+
//!                         | W0 | | W1 | | Wn |  --> error / result channels
//!                         +----+ +----+ +----+
//! ```

pub mod census;
pub mod dispatcher;
pub mod envelope;
pub mod outputs;
pub mod pool;
pub mod shared;
pub mod shutdown;
pub mod worker;
