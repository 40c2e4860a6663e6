//! Freshness, de-duplication and failure handling across the public API.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use snapcache::prelude::*;
use snapcache::registry::MemoryReporter;
use tokio::sync::Notify;

struct Fixture {
    scheduler: RefreshScheduler,
    clock: Arc<ManualClock>,
    reporter: Arc<MemoryReporter>,
}

fn fixture() -> Fixture {
    let clock = Arc::new(ManualClock::new(10_000));
    let reporter = Arc::new(MemoryReporter::new());
    let scheduler = RefreshScheduler::builder()
        .clock(clock.clone())
        .reporter(reporter.clone())
        .build()
        .expect("default config is valid");
    Fixture {
        scheduler,
        clock,
        reporter,
    }
}

/// Register a source whose value is the number of times it has run.
fn counting(f: &Fixture, name: &str, interval: u64) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    f.scheduler
        .register(
            name,
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Ok::<_, BoxError>(n as u64) }
            },
            RegisterOptions::every(interval),
        )
        .unwrap();
    calls
}

#[tokio::test]
async fn no_refresh_before_interval_elapses() {
    let f = fixture();
    let calls = counting(&f, "counter", 10);

    f.scheduler.reinitialize_check().await;
    let id = f.scheduler.get_data_id("counter").unwrap();

    f.clock.advance(9);
    let summary = f.scheduler.reinitialize_check().await;

    assert_eq!(summary.fresh, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(f.scheduler.get_data_id("counter").unwrap(), id);
}

#[tokio::test]
async fn refresh_after_interval_elapses() {
    let f = fixture();
    let calls = counting(&f, "counter", 10);

    f.scheduler.reinitialize_check().await;
    let first_id = f.scheduler.get_data_id("counter").unwrap();

    f.clock.advance(10);
    let summary = f.scheduler.reinitialize_check().await;

    assert_eq!(summary.refreshed, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(*f.scheduler.get_data::<u64>("counter").unwrap().unwrap(), 2);
    assert_ne!(f.scheduler.get_data_id("counter").unwrap(), first_id);

    let snapshot = f.scheduler.snapshot("counter").unwrap().unwrap();
    assert_eq!(snapshot.created_at_secs(), 10_010);
}

#[tokio::test]
async fn zero_interval_refreshes_on_every_check() {
    let f = fixture();
    let calls = counting(&f, "always", 0);

    for _ in 0..3 {
        f.scheduler.reinitialize_check().await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn concurrent_refreshes_share_one_execution() {
    let f = fixture();
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Notify::new());

    let (counter, wait) = (Arc::clone(&calls), Arc::clone(&gate));
    f.scheduler
        .register(
            "slow",
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                let wait = Arc::clone(&wait);
                async move {
                    wait.notified().await;
                    Ok::<_, BoxError>(serde_json::json!({"v": 1}))
                }
            },
            RegisterOptions::every(60),
        )
        .unwrap();

    let release = async {
        let source = f.scheduler.registry().get("slow").unwrap();
        while !source.is_refreshing() || f.scheduler.registry().stats().refreshes_joined() < 1 {
            tokio::task::yield_now().await;
        }
        gate.notify_one();
    };

    let (a, b, ()) = tokio::join!(
        f.scheduler.maybe_refresh("slow"),
        f.scheduler.maybe_refresh("slow"),
        release
    );

    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(a.snapshot().unwrap(), b.snapshot().unwrap()));
    assert_eq!(f.scheduler.registry().stats().refreshes_started(), 1);
    assert!(f.reporter.is_empty());
}

#[tokio::test]
async fn failure_preserves_state_and_reports_once() {
    let f = fixture();
    let failing = Arc::new(AtomicBool::new(false));
    let calls = Arc::new(AtomicUsize::new(0));

    let (flag, counter) = (Arc::clone(&failing), Arc::clone(&calls));
    f.scheduler
        .register(
            "flaky",
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                let fail = flag.load(Ordering::SeqCst);
                async move {
                    if fail {
                        Err(BoxError::from("upstream unavailable"))
                    } else {
                        Ok(n as u64)
                    }
                }
            },
            RegisterOptions::every(5),
        )
        .unwrap();

    f.scheduler.reinitialize_check().await;
    let good_id = f.scheduler.get_data_id("flaky").unwrap();

    failing.store(true, Ordering::SeqCst);
    f.clock.advance(5);
    let summary = f.scheduler.reinitialize_check().await;

    assert_eq!(summary.failed, 1);
    assert_eq!(*f.scheduler.get_data::<u64>("flaky").unwrap().unwrap(), 1);
    assert_eq!(f.scheduler.get_data_id("flaky").unwrap(), good_id);

    let failures = f.reporter.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].source.as_str(), "flaky");
    assert_eq!(failures[0].phase, RefreshPhase::Procedure);
    assert!(failures[0].message.contains("upstream unavailable"));

    // The failed attempt did not refresh the timestamp, so the source is still stale.
    failing.store(false, Ordering::SeqCst);
    let summary = f.scheduler.reinitialize_check().await;
    assert_eq!(summary.refreshed, 1);
    assert_eq!(*f.scheduler.get_data::<u64>("flaky").unwrap().unwrap(), 3);
    assert_ne!(f.scheduler.get_data_id("flaky").unwrap(), good_id);
    assert_eq!(f.reporter.len(), 1);
}

#[tokio::test]
async fn panicking_procedure_is_reported() {
    let f = fixture();
    f.scheduler
        .register(
            "explodes",
            || async {
                if true {
                    panic!("boom");
                }
                Ok::<u8, BoxError>(0)
            },
            RegisterOptions::default(),
        )
        .unwrap();

    let summary = f.scheduler.reinitialize_check().await;

    assert_eq!(summary.failed, 1);
    assert!(f.scheduler.get_data::<u8>("explodes").unwrap().is_none());
    let failures = f.reporter.failures_for("explodes");
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].phase, RefreshPhase::Panicked);
    assert!(!f.scheduler.registry().get("explodes").unwrap().is_refreshing());
}

#[tokio::test]
async fn watch_sees_changes_only() {
    let f = fixture();
    let value = Arc::new(AtomicUsize::new(1));
    let current = Arc::clone(&value);
    f.scheduler
        .register(
            "level",
            move || {
                let v = current.load(Ordering::SeqCst);
                async move { Ok::<_, BoxError>(v) }
            },
            RegisterOptions::default(),
        )
        .unwrap();
    let mut watch = f.scheduler.watch("level").unwrap();

    f.scheduler.reinitialize_check().await;
    let first = watch.recv().await.unwrap();
    assert!(first.previous.is_empty());
    assert_eq!(*first.snapshot.data::<usize>().unwrap(), 1);

    // Same content, same identity: no update.
    f.scheduler.reinitialize_check().await;
    assert!(watch.try_recv().is_err());

    value.store(2, Ordering::SeqCst);
    f.scheduler.reinitialize_check().await;
    let second = watch.recv().await.unwrap();
    assert_eq!(second.previous, *first.snapshot.identity());
    assert_eq!(*second.snapshot.data::<usize>().unwrap(), 2);
}
