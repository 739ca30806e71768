// SPDX-License-Identifier: MIT
//
//! Bounded, demand-scaled worker pool.
//!
//! ```no_run
//! use adaptive_pool::{Pool, PoolOptions};
//!
//! let pool: Pool<String> = Pool::new(PoolOptions::default().max_workers(8))?;
//! let results = pool.results();
//!
//! for i in 0..4 {
//!     pool.submit_check_result(move || Ok(format!("v{i}")));
//! }
//! pool.stop();
//!
//! while let Ok(value) = results.recv_blocking() {
//!     println!("{value}");
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod job_engine;
pub mod logging;
pub mod options;

pub use job_engine::pool::{Pool, PoolStats};
pub use options::{LogLevel, PoolOptions};
