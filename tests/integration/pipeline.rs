//! Forwarding results from one pool into the next

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chain_pool::{Args, Callable, Job, MetricsObserver, PoolState, Source, ThreadPool};

use crate::helpers::*;

/// A stage that hands `x * 2` to `next`.
fn doubler(next: Callable) -> Callable {
    Callable::named("double", move |args| {
        let x = args.require_i64(0)?;
        Ok(Some(Job::new(next.clone(), Args::new().arg(x * 2))))
    })
}

/// Every result of A becomes exactly one job of B.
#[test]
fn test_forward_runs_every_result() {
    let recorder = Recorder::new();
    let double = doubler(recorder.callable());
    let jobs = (0..50).map(move |n| Job::new(double.clone(), Args::new().arg(n)));

    let mut a = ThreadPool::with_source(config("a", 3, 5), Source::jobs(jobs)).unwrap();
    let mut b = ThreadPool::new(config("b", 2, 5)).unwrap();
    a.forward(&mut b).unwrap();

    a.run().unwrap();
    b.run().unwrap();
    b.wait().unwrap();
    a.wait().unwrap();

    assert_eq!(recorder.sorted(), (0..50).map(|n| n * 2).collect::<Vec<i64>>());
    assert_eq!(b.fed_count(), 50);
    assert_eq!(a.state(), PoolState::Finished);
}

/// A pool fed by hand shuts its downstream down once it goes idle.
#[test]
fn test_forward_from_manual_pool() {
    let recorder = Recorder::new();
    let double = doubler(recorder.callable());

    let mut a = ThreadPool::new(config("manual-a", 2, 10)).unwrap();
    let mut b = ThreadPool::new(config("manual-b", 2, 10)).unwrap();
    a.forward(&mut b).unwrap();

    a.run().unwrap();
    b.run().unwrap();
    for n in 0..8 {
        a.add(double.clone(), Args::new().arg(n)).unwrap();
    }
    a.wait().unwrap();
    b.wait().unwrap();

    assert_eq!(recorder.sorted(), vec![0, 2, 4, 6, 8, 10, 12, 14]);
}

/// Jobs that return nothing have nothing to forward.
#[test]
fn test_empty_results_not_forwarded() {
    let ran_downstream = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ran_downstream);
    let downstream = Callable::named("count", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    });
    let evens_only = Callable::named("evens", move |args| {
        let x = args.require_i64(0)?;
        if x % 2 == 0 {
            Ok(Some(Job::new(downstream.clone(), Args::new().arg(x))))
        } else {
            Ok(None)
        }
    });
    let jobs = (0..10).map(move |n| Job::new(evens_only.clone(), Args::new().arg(n)));

    let mut a = ThreadPool::with_source(config("filter", 2, 4), Source::jobs(jobs)).unwrap();
    let mut b = ThreadPool::new(config("evens", 2, 4)).unwrap();
    a.forward(&mut b).unwrap();

    a.run().unwrap();
    b.run().unwrap();
    b.wait().unwrap();
    a.wait().unwrap();

    assert_eq!(ran_downstream.load(Ordering::SeqCst), 5);
}

/// Three stages: double, add one, record.
#[test]
fn test_three_stage_chain() {
    let recorder = Recorder::new();
    let record = recorder.callable();
    let add_one = Callable::named("add_one", move |args| {
        let x = args.require_i64(0)?;
        Ok(Some(Job::new(record.clone(), Args::new().arg(x + 1))))
    });
    let double = doubler(add_one);
    let jobs = (0..30).map(move |n| Job::new(double.clone(), Args::new().arg(n)));

    let mut first = ThreadPool::with_source(config("first", 2, 3), Source::jobs(jobs)).unwrap();
    let mut second = ThreadPool::new(config("second", 2, 3)).unwrap();
    let mut third = ThreadPool::new(config("third", 2, 3)).unwrap();
    first.forward(&mut second).unwrap();
    second.forward(&mut third).unwrap();

    first.run().unwrap();
    second.run().unwrap();
    third.run().unwrap();
    third.wait().unwrap();
    second.wait().unwrap();
    first.wait().unwrap();

    assert_eq!(
        recorder.sorted(),
        (0..30).map(|n| n * 2 + 1).collect::<Vec<i64>>()
    );
}

#[test]
fn test_metrics_across_stages() {
    let metrics = Arc::new(MetricsObserver::new().unwrap());
    let recorder = Recorder::new();
    let double = doubler(recorder.callable());
    let jobs = (0..12).map(move |n| Job::new(double.clone(), Args::new().arg(n)));

    let mut a = ThreadPool::with_source(config("stage_a", 2, 4), Source::jobs(jobs))
        .unwrap()
        .with_observer(metrics.clone());
    let mut b = ThreadPool::new(config("stage_b", 2, 4))
        .unwrap()
        .with_observer(metrics.clone());
    a.forward(&mut b).unwrap();

    a.run().unwrap();
    b.run().unwrap();
    b.wait().unwrap();
    a.wait().unwrap();

    let ok = |pool: &str| {
        metrics
            .jobs_total
            .with_label_values(&[pool, "success"])
            .get()
    };
    assert_eq!(ok("stage_a"), 12.0);
    assert_eq!(ok("stage_b"), 12.0);
    assert_eq!(
        metrics
            .source_jobs_total
            .with_label_values(&["stage_b"])
            .get(),
        12.0
    );
    assert_eq!(
        metrics.workers_active.with_label_values(&["stage_a"]).get(),
        0.0
    );

    let text = metrics.export().unwrap();
    assert!(text.contains("chain_pool_job_duration_seconds"));
}
