//! Job failures stay inside the job

use chain_pool::{Args, Callable, JobError, ThreadPool};

use crate::helpers::*;

/// A single worker survives an error and a panic and runs what follows.
#[test]
fn test_failures_do_not_kill_worker() {
    let observer = CountingObserver::new();
    let recorder = Recorder::new();
    let mut pool = ThreadPool::new(config("isolated", 1, 10))
        .unwrap()
        .with_observer(observer.clone());

    let fails = Callable::named("fails", |_| Err(JobError::new("bad input")));
    let panics = Callable::named("panics", |_| panic!("job blew up"));

    pool.run().unwrap();
    pool.add(fails, Args::new()).unwrap();
    pool.add(panics, Args::new()).unwrap();
    for n in 0..3 {
        pool.add(recorder.callable(), Args::new().arg(n)).unwrap();
    }
    pool.wait().unwrap();

    assert_eq!(recorder.sorted(), vec![0, 1, 2]);
    assert_eq!(observer.failed(), 2);
    assert_eq!(observer.completed(), 3);
    assert_eq!(pool.queue().in_flight(), 0);

    let errors = observer.errors();
    assert!(errors.iter().any(|e| e.contains("bad input")));
    assert!(errors.iter().any(|e| e.contains("job blew up")));
}

/// A missing argument is reported like any other job error.
#[test]
fn test_argument_errors_are_job_failures() {
    let observer = CountingObserver::new();
    let recorder = Recorder::new();
    let mut pool = ThreadPool::new(config("args", 2, 4))
        .unwrap()
        .with_observer(observer.clone());

    pool.run().unwrap();
    pool.add(recorder.callable(), Args::new()).unwrap();
    pool.add(recorder.callable(), Args::new().arg("not a number"))
        .unwrap();
    pool.wait().unwrap();

    assert_eq!(recorder.len(), 0);
    assert_eq!(observer.failed(), 2);
}
