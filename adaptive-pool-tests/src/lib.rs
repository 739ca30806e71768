// SPDX-License-Identifier: MIT
//
// Helpers shared by the integration tests of adaptive-pool.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use adaptive_pool::{LogLevel, Pool, PoolOptions};

/// Holds jobs until it is opened.
#[derive(Debug, Clone, Default)]
pub struct Gate {
    state: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wait(&self) {
        let (open, cvar) = &*self.state;
        let guard = open.lock().unwrap();
        let _guard = cvar.wait_while(guard, |open| !*open).unwrap();
    }

    pub fn open(&self) {
        let (open, cvar) = &*self.state;
        *open.lock().unwrap() = true;
        cvar.notify_all();
    }
}

/// Counts how often each job id ran.
#[derive(Debug, Clone, Default)]
pub struct Tally {
    runs: Arc<Mutex<HashMap<usize, usize>>>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, id: usize) {
        *self.runs.lock().unwrap().entry(id).or_insert(0) += 1;
    }

    pub fn total(&self) -> usize {
        self.runs.lock().unwrap().values().sum()
    }

    /// True if every id in `0..n` ran exactly once and nothing else ran.
    pub fn exactly_once(&self, n: usize) -> bool {
        let runs = self.runs.lock().unwrap();
        runs.len() == n && (0..n).all(|id| runs.get(&id) == Some(&1))
    }
}

/// Poll `condition` until it holds or `deadline` has passed.
pub fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

pub fn test_options(name: &str) -> PoolOptions {
    PoolOptions::default().name(name).log_level(LogLevel::Debug)
}

/// Outcome of [`run_sleepers`].
#[derive(Debug, Clone, Copy)]
pub struct SleeperRun {
    /// From the first submission until `stop` returned.
    pub elapsed: Duration,
    /// Highest live worker count seen while the jobs ran.
    pub peak_workers: u32,
}

/// Submit `jobs` jobs that each sleep for `sleep` and stop the pool, while a
/// sampler thread tracks the live worker count.
pub fn run_sleepers(
    options: PoolOptions,
    jobs: usize,
    sleep: Duration,
) -> anyhow::Result<SleeperRun> {
    let pool: Arc<Pool> = Arc::new(Pool::new(options)?);
    let peak = Arc::new(AtomicU32::new(0));
    let done = Arc::new(AtomicBool::new(false));

    let sampler = {
        let pool = pool.clone();
        let peak = peak.clone();
        let done = done.clone();
        thread::spawn(move || {
            while !done.load(Ordering::SeqCst) {
                peak.fetch_max(pool.live_worker_count(), Ordering::SeqCst);
                thread::sleep(Duration::from_micros(200));
            }
        })
    };

    let start = Instant::now();
    for _ in 0..jobs {
        pool.submit(move || thread::sleep(sleep));
    }
    pool.stop();
    let elapsed = start.elapsed();

    done.store(true, Ordering::SeqCst);
    if sampler.join().is_err() {
        anyhow::bail!("worker count sampler panicked");
    }
    Ok(SleeperRun {
        elapsed,
        peak_workers: peak.load(Ordering::SeqCst),
    })
}

/// Route pool logs to the test output. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .is_test(true)
        .try_init();
}
