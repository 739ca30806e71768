// SPDX-License-Identifier: MIT
// pool-demo: runs a batch of sleeping jobs through an adaptive pool
//
// - Reads its scenario from the command line.
// - Drains the error and result channels on reader threads.
// - Prints a run report as text or JSON.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use adaptive_pool::{LogLevel, Pool, PoolOptions};
use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use futures::executor::block_on;
use futures::StreamExt;
use log::info;
use serde::Serialize;

/// How jobs are submitted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum, Default, Serialize)]
#[clap(rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
enum Mode {
    #[default]
    /// Outcomes are discarded
    Detached,
    /// Even-indexed jobs fail, their errors are collected
    CheckError,
    /// Even-indexed jobs fail, odd-indexed jobs return a value
    CheckResult,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum, Default)]
enum Verbosity {
    #[default]
    Silent,
    Info,
    Debug,
}

impl From<Verbosity> for LogLevel {
    fn from(verbosity: Verbosity) -> Self {
        match verbosity {
            Verbosity::Silent => LogLevel::Silent,
            Verbosity::Info => LogLevel::Info,
            Verbosity::Debug => LogLevel::Debug,
        }
    }
}

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Number of jobs to submit
    #[arg(long, default_value_t = 500)]
    jobs: u32,

    /// How long every job sleeps, in milliseconds
    #[arg(long = "sleep-ms", default_value_t = 5)]
    sleep_ms: u64,

    /// Upper bound of workers (0 = unbounded)
    #[arg(long = "max-workers", default_value_t = 64)]
    max_workers: u32,

    /// Idle time after which a surplus worker retires, in milliseconds
    #[arg(long = "idle-timeout-ms")]
    idle_timeout_ms: Option<u64>,

    /// Capacity of the buffer for jobs no idle worker could take
    #[arg(long = "queue-capacity")]
    queue_capacity: Option<usize>,

    #[arg(long, value_enum, default_value_t)]
    mode: Mode,

    /// Verbosity of the pool itself (RUST_LOG still applies)
    #[arg(long, value_enum, default_value_t)]
    verbosity: Verbosity,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct Report {
    jobs: u32,
    mode: Mode,
    max_workers: u32,
    elapsed_ms: u128,
    errors_seen: usize,
    results_seen: usize,
    peak_workers: u32,
}

fn pool_options(args: &Args) -> PoolOptions {
    let mut options = PoolOptions::default()
        .name("pool-demo")
        .max_workers(args.max_workers)
        .log_level(args.verbosity.into());
    if let Some(ms) = args.idle_timeout_ms {
        options = options.idle_timeout(Duration::from_millis(ms));
    }
    if let Some(capacity) = args.queue_capacity {
        options = options.queue_capacity(capacity);
    }
    options
}

fn run(args: &Args) -> anyhow::Result<Report> {
    let pool: Arc<Pool<u32, String>> =
        Arc::new(Pool::new(pool_options(args)).context("failed to create the pool")?);

    // Start reading before submitting so that no early outcome is missed.
    let errors = pool.errors();
    let results = pool.results();
    let error_reader = thread::spawn(move || block_on(errors.count()));
    let result_reader = thread::spawn(move || block_on(results.count()));

    let peak = Arc::new(AtomicU32::new(0));
    let sleep = Duration::from_millis(args.sleep_ms);
    let start = Instant::now();

    for i in 0..args.jobs {
        let observer = Arc::downgrade(&pool);
        let peak = peak.clone();
        let body = move || {
            if let Some(pool) = observer.upgrade() {
                peak.fetch_max(pool.live_worker_count(), Ordering::Relaxed);
            }
            thread::sleep(sleep);
        };
        match args.mode {
            Mode::Detached => pool.submit(body),
            Mode::CheckError => pool.submit_check_error(move || {
                body();
                if i % 2 == 0 {
                    Err(format!("job {i} failed"))
                } else {
                    Ok(())
                }
            }),
            Mode::CheckResult => pool.submit_check_result(move || {
                body();
                if i % 2 == 0 {
                    Err(format!("job {i} failed"))
                } else {
                    Ok(i)
                }
            }),
        }
    }

    pool.stop();
    let elapsed = start.elapsed();
    info!("Stopped after {:?}: {:?}", elapsed, pool.stats());

    let errors_seen = match error_reader.join() {
        Ok(count) => count,
        Err(_) => bail!("error reader panicked"),
    };
    let results_seen = match result_reader.join() {
        Ok(count) => count,
        Err(_) => bail!("result reader panicked"),
    };

    Ok(Report {
        jobs: args.jobs,
        mode: args.mode,
        max_workers: args.max_workers,
        elapsed_ms: elapsed.as_millis(),
        errors_seen,
        results_seen,
        peak_workers: peak.load(Ordering::Relaxed),
    })
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let report = run(&args)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{} jobs ({:?}) with max {} workers finished in {} ms",
            report.jobs, report.mode, report.max_workers, report.elapsed_ms
        );
        println!(
            "errors seen: {}, results seen: {}, peak workers: {}",
            report.errors_seen, report.results_seen, report.peak_workers
        );
    }
    Ok(())
}
