//! Tick and reset behavior, run on paused tokio time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use snapcache::prelude::*;
use snapcache::registry::MemoryReporter;

fn scheduler_with(clock: &Arc<ManualClock>) -> RefreshScheduler {
    RefreshScheduler::builder()
        .clock(clock.clone())
        .reporter(Arc::new(MemoryReporter::new()))
        .tick_period(Duration::from_secs(1))
        .build()
        .unwrap()
}

fn counting(scheduler: &RefreshScheduler, name: &str, interval: u64) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    scheduler
        .register(
            name,
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, BoxError>("payload") }
            },
            RegisterOptions::every(interval),
        )
        .unwrap();
    calls
}

#[tokio::test(start_paused = true)]
async fn tick_refreshes_each_source_on_its_own_interval() {
    let clock = Arc::new(ManualClock::new(0));
    let scheduler = scheduler_with(&clock);
    let fast = counting(&scheduler, "fast", 1);
    let slow = counting(&scheduler, "slow", 3);

    scheduler.initialize_all().await;
    assert!(scheduler.is_ticking());

    // Move the clock half-way between ticks so each tick sees a settled time.
    tokio::time::sleep(Duration::from_millis(500)).await;
    for _ in 0..6 {
        clock.advance(1);
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    assert_eq!(fast.load(Ordering::SeqCst), 7);
    assert_eq!(slow.load(Ordering::SeqCst), 3);

    scheduler.reinitialize_stop();
}

#[tokio::test(start_paused = true)]
async fn stop_and_restart_tick() {
    let clock = Arc::new(ManualClock::new(0));
    let scheduler = scheduler_with(&clock);
    let calls = counting(&scheduler, "always", 0);

    scheduler.initialize_all().await;
    scheduler.reinitialize_stop();
    assert!(!scheduler.is_ticking());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    scheduler.reinitialize_start().unwrap();
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    scheduler.reinitialize_stop();
}

#[tokio::test(start_paused = true)]
async fn reset_clears_everything_and_stops_tick() {
    let clock = Arc::new(ManualClock::new(0));
    let scheduler = scheduler_with(&clock);
    let calls = counting(&scheduler, "acl", 0);
    let mut watch = scheduler.watch("acl").unwrap();

    scheduler.initialize_all().await;
    assert!(watch.recv().await.is_some());

    scheduler.reset();

    assert!(!scheduler.has_source("acl"));
    assert!(scheduler.registry().is_empty());
    assert!(!scheduler.is_ticking());
    assert!(matches!(
        scheduler.get_data::<&str>("acl"),
        Err(SnapcacheError::NotFound { .. })
    ));
    // Watches of removed sources end.
    assert!(watch.recv().await.is_none());

    // No further ticks.
    clock.advance(100);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The scheduler is usable again after a reset.
    let again = counting(&scheduler, "acl", 0);
    scheduler.initialize_all().await;
    assert_eq!(again.load(Ordering::SeqCst), 1);
    scheduler.reset();
}

#[tokio::test(start_paused = true)]
async fn reset_discards_in_flight_refresh() {
    let clock = Arc::new(ManualClock::new(0));
    let scheduler = scheduler_with(&clock);
    scheduler
        .register(
            "slow",
            || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, BoxError>(1u8)
            },
            RegisterOptions::default(),
        )
        .unwrap();
    let source = scheduler.registry().get("slow").unwrap();

    let pending = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.maybe_refresh("slow").await }
    });
    while !source.is_refreshing() {
        tokio::task::yield_now().await;
    }

    scheduler.reset();
    let outcome = pending.await.unwrap().unwrap();

    // The detached source finished, but nothing is visible through the scheduler.
    assert!(outcome.snapshot().is_some());
    assert!(source.is_detached());
    assert!(!scheduler.has_source("slow"));
}

#[tokio::test(start_paused = true)]
async fn dropping_scheduler_ends_tick() {
    let clock = Arc::new(ManualClock::new(0));
    let scheduler = scheduler_with(&clock);
    let calls = counting(&scheduler, "always", 0);
    let registry = Arc::clone(scheduler.registry());

    scheduler.initialize_all().await;
    drop(scheduler);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(registry.stats().ticks(), 0);
}
