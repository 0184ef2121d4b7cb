//! A slow stage holds back the stages feeding it

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chain_pool::{Args, Callable, Job, PoolError, RetryPolicy, Source, ThreadPool};

use crate::helpers::*;

/// With B slowed down, A never runs far ahead of it.
#[test]
fn test_slow_consumer_throttles_producer() {
    const JOBS: usize = 40;
    const A_WORKERS: usize = 2;
    const B_WORKERS: usize = 1;
    const CAPACITY: usize = 2;

    let produced = Arc::new(AtomicUsize::new(0));
    let consumed = Arc::new(AtomicUsize::new(0));
    let max_gap = Arc::new(AtomicUsize::new(0));

    let slow = {
        let produced = Arc::clone(&produced);
        let consumed = Arc::clone(&consumed);
        let max_gap = Arc::clone(&max_gap);
        Callable::named("slow", move |_| {
            std::thread::sleep(Duration::from_millis(5));
            let gap = produced
                .load(Ordering::SeqCst)
                .saturating_sub(consumed.load(Ordering::SeqCst));
            max_gap.fetch_max(gap, Ordering::SeqCst);
            consumed.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        })
    };
    let fast = {
        let produced = Arc::clone(&produced);
        Callable::named("fast", move |args| {
            produced.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Job::new(slow.clone(), args.clone())))
        })
    };
    let jobs = (0..JOBS).map(move |n| Job::new(fast.clone(), Args::new().arg(n)));

    let observer = CountingObserver::new();
    let producer = config("producer", A_WORKERS, CAPACITY);
    let mut a = ThreadPool::with_source(producer, Source::jobs(jobs))
        .unwrap()
        .with_observer(observer.clone());
    let mut b = ThreadPool::new(config("consumer", B_WORKERS, CAPACITY)).unwrap();
    a.forward(&mut b).unwrap();

    a.run().unwrap();
    b.run().unwrap();
    b.wait().unwrap();
    a.wait().unwrap();

    assert_eq!(consumed.load(Ordering::SeqCst), JOBS);
    assert!(observer.queue_full() > 0);

    // Results held by A's workers, the forward queue, B's consumer,
    // B's input queue and B's workers.
    let bound = A_WORKERS + CAPACITY + 1 + CAPACITY + B_WORKERS;
    assert!(
        max_gap.load(Ordering::SeqCst) <= bound,
        "producer ran {} jobs ahead",
        max_gap.load(Ordering::SeqCst)
    );
}

/// A bounded retry policy turns a stuck queue into a source error.
#[test]
fn test_source_stalls_with_bounded_retry() {
    let recorder = Recorder::new();
    let callable = recorder.slow_callable(Duration::from_millis(200));
    let jobs = (0..5).map(move |n| Job::new(callable.clone(), Args::new().arg(n)));

    let stalled = config("stalled", 1, 1)
        .with_queue_timeout(Duration::from_millis(10))
        .with_retry(RetryPolicy::bounded(Duration::from_millis(1), 2));
    let mut pool = ThreadPool::with_source(stalled, Source::jobs(jobs)).unwrap();
    pool.run().unwrap();
    pool.wait().unwrap();

    assert!(matches!(
        pool.source_error(),
        Some(PoolError::SourceStalled { attempts: 2 })
    ));
    assert!(recorder.len() >= 1 && recorder.len() < 5);
}

/// Results that cannot be forwarded are dropped and reported, never lost
/// silently.
#[test]
fn test_forward_gives_up_with_bounded_retry() {
    const JOBS: usize = 20;

    let recorder = Recorder::new();
    let slow = recorder.slow_callable(Duration::from_millis(20));
    let fast = Callable::named("fast", move |args| {
        Ok(Some(Job::new(slow.clone(), args.clone())))
    });
    let jobs = (0..JOBS).map(move |n| Job::new(fast.clone(), Args::new().arg(n)));

    let observer = CountingObserver::new();
    let a_config = config("impatient", 4, 1)
        .with_queue_timeout(Duration::from_millis(5))
        .with_retry(RetryPolicy::bounded(Duration::from_millis(1), 1));
    let mut a = ThreadPool::with_source(a_config, Source::jobs(jobs))
        .unwrap()
        .with_observer(observer.clone());
    let mut b = ThreadPool::new(config("patient", 1, 1)).unwrap();
    a.forward(&mut b).unwrap();

    a.run().unwrap();
    b.run().unwrap();
    b.wait().unwrap();
    a.wait().unwrap();

    // Every job A ran either reached B or was reported as dropped.
    let dropped = observer.forward_failed.load(Ordering::SeqCst);
    assert!(dropped > 0);
    assert_eq!(recorder.len() + dropped, observer.completed());
    assert!(observer.completed() <= JOBS);
    assert!(b.source_error().is_none());
}

/// A downstream consumer that gives up releases the pool feeding it.
#[test]
fn test_stalled_downstream_releases_upstream() {
    const JOBS: usize = 10;

    let recorder = Recorder::new();
    let slow = recorder.slow_callable(Duration::from_millis(200));
    let fast = Callable::named("fast", move |args| {
        Ok(Some(Job::new(slow.clone(), args.clone())))
    });
    let jobs = (0..JOBS).map(move |n| Job::new(fast.clone(), Args::new().arg(n)));

    let observer = CountingObserver::new();
    let mut a = ThreadPool::with_source(config("feeder", 2, 1), Source::jobs(jobs))
        .unwrap()
        .with_observer(observer.clone());
    let b_config = config("gives_up", 1, 1)
        .with_queue_timeout(Duration::from_millis(10))
        .with_retry(RetryPolicy::bounded(Duration::from_millis(1), 1));
    let mut b = ThreadPool::new(b_config).unwrap();
    a.forward(&mut b).unwrap();

    a.run().unwrap();
    b.run().unwrap();
    b.wait().unwrap();
    assert!(matches!(
        b.source_error(),
        Some(PoolError::SourceStalled { attempts: 1 })
    ));

    let (done_tx, done_rx) = std::sync::mpsc::channel();
    let upstream = std::thread::spawn(move || {
        let result = a.wait();
        let _ = done_tx.send(());
        result
    });
    assert!(
        done_rx.recv_timeout(Duration::from_secs(5)).is_ok(),
        "upstream pool never finished"
    );
    upstream.join().unwrap().unwrap();

    // Every upstream job still ran; results past the stall were dropped.
    assert_eq!(observer.completed(), JOBS);
    assert!(observer.forward_failed.load(Ordering::SeqCst) > 0);
    assert!(recorder.len() < JOBS);
}
