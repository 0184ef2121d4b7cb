//! Pools fed by a source consumer

use std::io::{BufReader, Write};
use std::time::Duration;

use chain_pool::{Args, Job, JobSpec, PoolError, Registry, Source, ThreadPool};
use serde_json::json;

use crate::helpers::*;

fn recording_registry(recorder: &Recorder) -> Registry {
    let record = recorder.callable();
    let mut registry = Registry::new();
    registry.register("record", move |args| record.call(args));
    registry
}

/// A hundred job triples, each recorded exactly once.
#[test]
fn test_source_of_triples() {
    let recorder = Recorder::new();
    let triples: Vec<_> = (0..100).map(|n| json!(["record", [n], {}])).collect();
    let source = Source::values(triples, recording_registry(&recorder));

    let mut pool = ThreadPool::with_source(config("triples", 4, 10), source).unwrap();
    pool.run().unwrap();
    pool.wait().unwrap();

    assert_eq!(recorder.sorted(), (0..100).collect::<Vec<i64>>());
    assert_eq!(pool.fed_count(), 100);
    assert!(pool.source_error().is_none());
    assert_eq!(pool.queue().in_flight(), 0);
}

/// A source far larger than the queue is fed without losing anything.
#[test]
fn test_source_larger_than_queue() {
    let recorder = Recorder::new();
    let callable = recorder.callable();
    let jobs = (0..500).map(move |n| Job::new(callable.clone(), Args::new().arg(n)));

    let mut pool = ThreadPool::with_source(config("large", 3, 4), Source::jobs(jobs)).unwrap();
    pool.run().unwrap();
    pool.wait().unwrap();

    assert_eq!(recorder.len(), 500);
    assert_eq!(recorder.sorted(), (0..500).collect::<Vec<i64>>());
}

/// Workers wait for a slow source instead of treating a quiet queue as the end.
#[test]
fn test_slow_source_keeps_workers_alive() {
    let recorder = Recorder::new();
    let callable = recorder.callable();
    let jobs = (0..5).map(move |n| {
        // Longer than queue_timeout between items.
        std::thread::sleep(Duration::from_millis(80));
        Job::new(callable.clone(), Args::new().arg(n))
    });

    let mut pool = ThreadPool::with_source(config("trickle", 2, 4), Source::jobs(jobs)).unwrap();
    pool.run().unwrap();
    pool.wait().unwrap();

    assert_eq!(recorder.sorted(), vec![0, 1, 2, 3, 4]);
}

/// A malformed item stops the source; items before it still run.
#[test]
fn test_malformed_item_aborts_source() {
    let recorder = Recorder::new();
    let observer = CountingObserver::new();
    let values = vec![
        json!(["record", [1], {}]),
        json!(["record", [2], {}]),
        json!(["record", 3]),
        json!(["record", [4], {}]),
    ];

    let mut pool = ThreadPool::with_source(
        config("malformed", 2, 10),
        Source::values(values, recording_registry(&recorder)),
    )
    .unwrap()
    .with_observer(observer.clone());
    pool.run().unwrap();
    pool.wait().unwrap();

    assert_eq!(recorder.sorted(), vec![1, 2]);
    assert_eq!(pool.fed_count(), 2);
    assert!(matches!(pool.source_error(), Some(PoolError::MalformedJob(_))));
    assert_eq!(
        observer
            .source_failed
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

#[test]
fn test_unknown_callable_aborts_source() {
    let recorder = Recorder::new();
    let specs = vec![JobSpec::new("record", vec![json!(7)]), JobSpec::new("nope", vec![])];

    let mut pool = ThreadPool::with_source(
        config("unknown", 1, 10),
        Source::specs(specs, recording_registry(&recorder)),
    )
    .unwrap();
    pool.run().unwrap();
    pool.wait().unwrap();

    assert_eq!(recorder.sorted(), vec![7]);
    let err = pool.source_error().unwrap();
    assert!(err.to_string().contains("nope"));
}

#[test]
fn test_json_lines_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for n in 0..20 {
        if n % 2 == 0 {
            writeln!(file, r#"{{"call": "record", "args": [{}]}}"#, n).unwrap();
        } else {
            writeln!(file, r#"["record", [{}], {{}}]"#, n).unwrap();
        }
        writeln!(file).unwrap();
    }
    file.flush().unwrap();

    let recorder = Recorder::new();
    let reader = BufReader::new(file.reopen().unwrap());
    let mut pool = ThreadPool::with_source(
        config("lines", 3, 5),
        Source::json_lines(reader, recording_registry(&recorder)),
    )
    .unwrap();
    pool.run().unwrap();
    pool.wait().unwrap();

    assert_eq!(recorder.sorted(), (0..20).collect::<Vec<i64>>());
    assert_eq!(pool.fed_count(), 20);
}

#[test]
fn test_set_source_after_run_rejected() {
    let mut pool = ThreadPool::new(config("late", 1, 2)).unwrap();
    pool.run().unwrap();
    let err = pool.set_source(Source::jobs(Vec::new())).unwrap_err();
    assert!(matches!(err, PoolError::AlreadyStarted));
    pool.wait().unwrap();
}
