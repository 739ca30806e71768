// SPDX-License-Identifier: MIT
//
// Properties every pool must hold, independent of timing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use adaptive_pool::{Pool, PoolOptions};
use adaptive_pool_tests::{init_logging, test_options, wait_until, Gate, Tally};
use futures::executor::block_on;
use futures::StreamExt;

#[test]
fn test_every_accepted_job_runs_exactly_once() {
    init_logging();
    let pool: Pool = Pool::new(test_options("completion").max_workers(8)).unwrap();
    let tally = Tally::new();

    for id in 0..1_000 {
        let tally = tally.clone();
        pool.submit(move || tally.record(id));
    }
    pool.stop();

    assert!(tally.exactly_once(1_000));
    assert_eq!(pool.active_job_count(), 0);
}

#[test]
fn test_concurrent_submitters() {
    init_logging();
    let pool: Arc<Pool> = Arc::new(Pool::new(test_options("submitters")).unwrap());
    let tally = Tally::new();

    let submitters: Vec<_> = (0..8)
        .map(|s| {
            let pool = pool.clone();
            let tally = tally.clone();
            thread::spawn(move || {
                for i in 0..100 {
                    let tally = tally.clone();
                    pool.submit(move || tally.record(s * 100 + i));
                }
            })
        })
        .collect();
    for submitter in submitters {
        submitter.join().unwrap();
    }
    pool.stop();

    assert!(tally.exactly_once(800));
}

#[test]
fn test_full_buffer_blocks_submitter_without_dropping() {
    init_logging();
    let pool: Arc<Pool> = Arc::new(
        Pool::new(test_options("backpressure").max_workers(1).queue_capacity(128)).unwrap(),
    );
    let gate = Gate::new();
    let tally = Tally::new();
    let submitted = Arc::new(AtomicUsize::new(0));
    const JOBS: usize = 300;

    let submitter = {
        let pool = pool.clone();
        let gate = gate.clone();
        let tally = tally.clone();
        let submitted = submitted.clone();
        thread::spawn(move || {
            for id in 0..JOBS {
                let gate = gate.clone();
                let tally = tally.clone();
                pool.submit(move || {
                    gate.wait();
                    tally.record(id);
                });
                submitted.fetch_add(1, Ordering::SeqCst);
            }
        })
    };

    // The single worker is held by the gate: the buffer fills up and the
    // submitter has to block.
    assert!(wait_until(Duration::from_secs(5), || {
        submitted.load(Ordering::SeqCst) >= 128
    }));
    thread::sleep(Duration::from_millis(200));
    let before_release = submitted.load(Ordering::SeqCst);
    assert!(before_release < JOBS, "submitter never blocked");
    assert_eq!(tally.total(), 0);

    gate.open();
    submitter.join().unwrap();
    pool.stop();

    assert_eq!(submitted.load(Ordering::SeqCst), JOBS);
    assert!(tally.exactly_once(JOBS));
}

#[test]
fn test_submissions_after_stop_are_rejected() {
    init_logging();
    let pool: Pool<u32, String> = Pool::new(test_options("rejection")).unwrap();
    let tally = Tally::new();
    pool.stop();

    let before = pool.active_job_count();
    let t = tally.clone();
    pool.submit(move || t.record(0));
    pool.submit_check_error(|| Err("late".to_string()));
    pool.submit_check_result(|| Ok(7));

    assert_eq!(pool.active_job_count(), before);
    assert_eq!(tally.total(), 0);
    assert!(pool.is_stopping());
}

#[test]
fn test_stop_during_submission_storm() {
    init_logging();
    let pool: Arc<Pool> = Arc::new(Pool::new(test_options("storm")).unwrap());
    let ran = Arc::new(AtomicUsize::new(0));
    let accepted_or_not = Arc::new(AtomicUsize::new(0));

    let submitters: Vec<_> = (0..4)
        .map(|_| {
            let pool = pool.clone();
            let ran = ran.clone();
            let attempts = accepted_or_not.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    let ran = ran.clone();
                    pool.submit(move || {
                        ran.fetch_add(1, Ordering::SeqCst);
                    });
                    attempts.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(2));
    pool.stop();
    let ran_at_stop = ran.load(Ordering::SeqCst);

    for submitter in submitters {
        submitter.join().unwrap();
    }

    // Nothing runs after stop returned, and nothing is left counted.
    assert_eq!(ran.load(Ordering::SeqCst), ran_at_stop);
    assert_eq!(pool.active_job_count(), 0);
    assert_eq!(accepted_or_not.load(Ordering::SeqCst), 800);
}

#[test]
fn test_check_result_error_never_reaches_result_channel() {
    init_logging();
    let pool: Pool<String, String> = Pool::new(test_options("routing")).unwrap();
    let errors = pool.errors();
    let results = pool.results();
    let error_reader = thread::spawn(move || block_on(errors.collect::<Vec<String>>()));
    let result_reader = thread::spawn(move || block_on(results.count()));

    for i in 0..50 {
        pool.submit_check_result(move || Err(format!("e{i}")));
    }
    pool.stop();

    assert_eq!(result_reader.join().unwrap(), 0);
    let errors = error_reader.join().unwrap();
    // the reader keeps up with 50 errors, nothing is dropped
    assert_eq!(errors.len(), 50);
    assert!(errors.iter().all(|e| e.starts_with('e')));
}

#[test]
fn test_full_output_channel_drops_outcomes() {
    init_logging();
    let pool: Pool<String, String> =
        Pool::new(test_options("drops").output_capacity(1)).unwrap();

    for i in 0..10 {
        pool.submit_check_result(move || Err(format!("e{i}")));
    }
    // Nobody reads while the jobs run; stop must not hang on the full channel.
    pool.stop();

    let errors = pool.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors.recv_blocking().is_ok());
    assert!(errors.recv_blocking().is_err());
    assert!(pool.results().recv_blocking().is_err());
}

#[test]
fn test_worker_count_stays_below_ceiling() {
    init_logging();
    let pool: Arc<Pool> = Arc::new(Pool::new(test_options("ceiling").max_workers(4)).unwrap());
    let peak = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicUsize::new(0));

    let sampler = {
        let pool = pool.clone();
        let peak = peak.clone();
        let done = done.clone();
        thread::spawn(move || {
            while done.load(Ordering::SeqCst) == 0 {
                peak.fetch_max(pool.live_worker_count() as usize, Ordering::SeqCst);
                thread::sleep(Duration::from_micros(200));
            }
        })
    };

    for _ in 0..200 {
        pool.submit(|| thread::sleep(Duration::from_millis(1)));
    }
    pool.stop();
    done.store(1, Ordering::SeqCst);
    sampler.join().unwrap();

    assert!(peak.load(Ordering::SeqCst) <= 4);
}

#[test]
fn test_concurrent_stop_is_idempotent() {
    init_logging();
    let pool: Arc<Pool<(), String>> = Arc::new(Pool::new(test_options("double-stop")).unwrap());
    for _ in 0..10 {
        pool.submit_check_error(|| {
            thread::sleep(Duration::from_millis(5));
            Err("failed".to_string())
        });
    }

    let barrier = Arc::new(Barrier::new(2));
    let stoppers: Vec<_> = (0..2)
        .map(|_| {
            let pool = pool.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                pool.stop()
            })
        })
        .collect();
    let results: Vec<bool> = stoppers.into_iter().map(|s| s.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|tore_down| **tore_down).count(), 1);
    pool.await_termination();
    assert!(pool.is_terminated());
    assert_eq!(pool.live_worker_count(), 0);
}

#[test]
fn test_unbounded_pool_scales_on_demand() {
    init_logging();
    let pool: Pool = Pool::new(PoolOptions::default().name("unbounded").max_workers(0)).unwrap();
    let gate = Gate::new();
    for _ in 0..100 {
        let gate = gate.clone();
        pool.submit(move || gate.wait());
    }

    // 100 blocked jobs: an unbounded pool ends up with a worker for each one.
    assert!(wait_until(Duration::from_secs(5), || pool.live_worker_count() >= 100));
    gate.open();
    pool.stop();
    assert_eq!(pool.live_worker_count(), 0);
}

#[test]
fn test_idle_workers_retire() {
    init_logging();
    let pool: Pool =
        Pool::new(test_options("retire").idle_timeout(Duration::from_millis(20))).unwrap();
    for _ in 0..16 {
        pool.submit(|| thread::sleep(Duration::from_millis(10)));
    }

    assert!(wait_until(Duration::from_secs(5), || pool.active_job_count() == 0));
    assert!(wait_until(Duration::from_secs(5), || pool.live_worker_count() == 0));

    // a retired pool still takes work
    let tally = Tally::new();
    let t = tally.clone();
    pool.submit(move || t.record(0));
    pool.stop();
    assert!(tally.exactly_once(1));
}

#[test]
fn test_last_handle_dropped_inside_a_job() {
    init_logging();
    let pool: Arc<Pool> = Arc::new(Pool::new(test_options("last-handle")).unwrap());
    let errors = pool.errors();
    let gate = Gate::new();
    let tally = Tally::new();

    let handle = pool.clone();
    let job_gate = gate.clone();
    let t = tally.clone();
    pool.submit(move || {
        job_gate.wait();
        t.record(0);
        // the last handle goes away on the worker running this job
        drop(handle);
    });
    drop(pool);
    gate.open();

    // The teardown must finish without waiting for the job that started it.
    assert!(wait_until(Duration::from_secs(5), || errors.is_closed()));
    assert!(tally.exactly_once(1));
}
