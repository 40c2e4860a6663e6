//! Load tests with 1000+ sources.
//!
//! These tests verify the registry under high load:
//! - 1000 sources initialized concurrently
//! - Parallel reads while refreshes run
//! - Many callers racing on the same stale source
//!
//! Run with: `cargo test --package integration-tests load_tests -- --nocapture`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use snapcache::prelude::*;
use snapcache::registry::MemoryReporter;
use tokio::sync::Barrier;

/// Test that the scheduler can initialize 1000 sources.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_1000_sources() {
    let scheduler = RefreshScheduler::new();
    let num_sources = 1000;

    for i in 0..num_sources {
        scheduler
            .register(
                format!("tenant-{i}.quota"),
                move || async move { Ok::<_, BoxError>(vec![i; 8]) },
                RegisterOptions::every(3600),
            )
            .unwrap();
    }

    let start = Instant::now();
    let summary = scheduler.reinitialize_check().await;
    let elapsed = start.elapsed();

    assert_eq!(summary.refreshed, num_sources);
    assert_eq!(summary.failed, 0);
    println!("Initialized {} sources in {:?}", num_sources, elapsed);

    // A second pass finds everything fresh.
    let summary = scheduler.reinitialize_check().await;
    assert_eq!(summary.fresh, num_sources);

    for i in [0, 499, 999] {
        let data = scheduler
            .get_data::<Vec<usize>>(&format!("tenant-{i}.quota"))
            .unwrap()
            .unwrap();
        assert_eq!(data.as_slice(), [i; 8]);
    }
}

/// Test concurrent readers while a source keeps refreshing.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reads_during_refresh() {
    let scheduler = RefreshScheduler::new();
    let counter = Arc::new(AtomicUsize::new(0));
    let calls = Arc::clone(&counter);
    scheduler
        .register(
            "hot",
            move || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, BoxError>((n, n * 2)) }
            },
            RegisterOptions::default(),
        )
        .unwrap();
    scheduler.reinitialize_check().await;

    let num_readers = 50;
    let barrier = Arc::new(Barrier::new(num_readers + 1));
    let mut handles = Vec::with_capacity(num_readers);

    for _ in 0..num_readers {
        let scheduler = scheduler.clone();
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            for _ in 0..200 {
                // Every observed pair comes from one refresh.
                let pair = scheduler.get_data::<(usize, usize)>("hot").unwrap().unwrap();
                assert_eq!(pair.1, pair.0 * 2);
                tokio::task::yield_now().await;
            }
        }));
    }

    barrier.wait().await;
    for _ in 0..100 {
        scheduler.refresh("hot").await.unwrap();
    }

    for handle in handles {
        handle.await.expect("reader panicked");
    }
    assert!(counter.load(Ordering::SeqCst) >= 101);
}

/// Test many callers racing on one stale source.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_refresh_stampede() {
    let reporter = Arc::new(MemoryReporter::new());
    let scheduler = RefreshScheduler::builder()
        .reporter(reporter.clone())
        .build()
        .unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    let calls = Arc::clone(&counter);
    scheduler
        .register(
            "expensive",
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, BoxError>("report")
                }
            },
            RegisterOptions::every(3600),
        )
        .unwrap();

    let num_callers = 100;
    let barrier = Arc::new(Barrier::new(num_callers));
    let handles: Vec<_> = (0..num_callers)
        .map(|_| {
            let scheduler = scheduler.clone();
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                scheduler.maybe_refresh("expensive").await.unwrap()
            })
        })
        .collect();

    let mut refreshed = 0;
    for handle in handles {
        let outcome = handle.await.expect("caller panicked");
        assert!(!outcome.is_failed());
        if outcome.snapshot().is_some() {
            refreshed += 1;
        }
    }

    // Callers that arrive after the refresh completes see a fresh source.
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(refreshed >= 1);
    assert!(reporter.is_empty());
}
