//! Registration and read-path integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use snapcache::prelude::*;

fn ok<T>(value: T) -> impl Fn() -> futures::future::Ready<Result<T, BoxError>> + Send + Sync
where
    T: Clone + Send + Sync + 'static,
{
    move || futures::future::ready(Ok(value.clone()))
}

#[test]
fn registration_rejects_invalid_names() {
    let registry = SourceRegistry::new();

    for name in ["", "white space", "tab\tname", "emoji-\u{1f600}"] {
        let err = registry
            .register(name, ok(1u8), RegisterOptions::default())
            .unwrap_err();
        assert!(
            matches!(err, SnapcacheError::Configuration(_)),
            "{name:?} should be rejected, got {err}"
        );
    }

    let too_long = "a".repeat(SourceName::MAX_LEN + 1);
    assert!(registry
        .register(too_long, ok(1u8), RegisterOptions::default())
        .is_err());
    assert!(registry.is_empty());
}

#[test]
fn registration_rejects_invalid_interval_text() {
    for bad in [json!({"refresh_interval": "soon"}), json!({"refresh_interval": -5})] {
        let err = RegisterOptions::from_value(bad).unwrap_err();
        assert!(matches!(err, SnapcacheError::Configuration(_)));
    }
    assert!(RefreshInterval::parse("ten").is_err());
    assert_eq!(RefreshInterval::parse(" 10 ").unwrap().as_secs(), 10);
}

#[test]
fn registration_rejects_duplicates() {
    let registry = SourceRegistry::new();
    registry
        .register("pricing.table", ok(1u8), RegisterOptions::every(10))
        .unwrap();

    let err = registry
        .register("pricing.table", ok(2u8), RegisterOptions::every(10))
        .unwrap_err();
    assert!(matches!(err, SnapcacheError::DuplicateName { .. }));
    assert!(err.is_registration_error());
    assert_eq!(registry.len(), 1);
}

#[test]
fn registration_runs_nothing() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let registry = SourceRegistry::new();
    let source = registry
        .register(
            "lazy",
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                futures::future::ready(Ok::<_, BoxError>(1u8))
            },
            RegisterOptions::default(),
        )
        .unwrap();

    assert!(source.snapshot().is_none());
    assert!(!source.is_refreshing());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn unknown_source_reads_fail() {
    let scheduler = RefreshScheduler::new();

    assert!(!scheduler.has_source("missing"));
    assert!(matches!(
        scheduler.get_data::<u8>("missing"),
        Err(SnapcacheError::NotFound { .. })
    ));
    assert!(matches!(
        scheduler.get_data_id("missing"),
        Err(SnapcacheError::NotFound { .. })
    ));
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Limits {
    v: u32,
}

#[tokio::test]
async fn initialize_populates_data_and_identity() {
    let scheduler = RefreshScheduler::new();
    scheduler
        .register("limits", ok(Limits { v: 1 }), RegisterOptions::every(10))
        .unwrap();

    let summary = scheduler.initialize_all().await;
    assert_eq!(summary.refreshed, 1);

    let data = scheduler.get_data::<Limits>("limits").unwrap().unwrap();
    assert_eq!(*data, Limits { v: 1 });

    let id = scheduler.get_data_id("limits").unwrap();
    assert!(!id.is_empty());
    assert_eq!(id.as_str().len(), SnapshotIdentity::LEN);
    // Identity depends only on content.
    assert_eq!(id, SnapshotIdentity::compute(&json!({"v": 1})).unwrap());

    scheduler.reset();
}

#[tokio::test]
async fn reads_with_wrong_type_fail() {
    let scheduler = RefreshScheduler::new();
    scheduler
        .register("limits", ok(Limits { v: 1 }), RegisterOptions::default())
        .unwrap();
    scheduler.reinitialize_check().await;

    let err = scheduler.get_data::<String>("limits").unwrap_err();
    assert!(matches!(err, SnapcacheError::TypeMismatch { .. }));
}

#[tokio::test]
async fn snapshot_data_is_shared_not_copied() {
    let scheduler = RefreshScheduler::new();
    scheduler
        .register("rules", ok(vec![1u32, 2, 3]), RegisterOptions::every(60))
        .unwrap();
    scheduler.reinitialize_check().await;

    let first = scheduler.get_data::<Vec<u32>>("rules").unwrap().unwrap();
    let second = scheduler.get_data::<Vec<u32>>("rules").unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    // Readers that want to edit work on their own copy.
    let mut copy = (*first).clone();
    copy.push(4);
    assert_eq!(*scheduler.get_data::<Vec<u32>>("rules").unwrap().unwrap(), [1, 2, 3]);
}
