mod common;

use serde_json::json;
use tierset::{
    application::preload::{PreloadConfig, PreloadReport, Preloader},
    cache::SharedCache,
};

use common::{CountingRepo, CountingShared, store_over};

fn keys(list: &[&str]) -> Vec<String> {
    list.iter().map(|key| key.to_string()).collect()
}

#[tokio::test]
async fn preload_counts_loaded_and_missing_keys() {
    let repo = CountingRepo::new("memory.settings");
    let shared = CountingShared::new();
    let store = store_over(&repo, &shared);
    store
        .set_many([("app.name", json!("tierset")), ("app.locale", json!("en"))], None)
        .await
        .expect("seed");
    store.clear_memory_cache();

    let config = PreloadConfig {
        keys: keys(&["app.name", "app.locale", "app.missing"]),
        ..PreloadConfig::default()
    };
    let report = Preloader::new(store.clone(), config).run().await;

    assert_eq!(
        report,
        PreloadReport {
            loaded: 2,
            missing: 1,
            failed: 0,
            skipped: false,
        }
    );
}

#[tokio::test]
async fn preloaded_keys_are_served_from_memory() {
    let repo = CountingRepo::new("memory.settings");
    let shared = CountingShared::new();
    let writer = store_over(&repo, &shared);
    writer.set("app.name", json!("tierset"), None).await.expect("seed");

    let cold = store_over(&repo, &shared);
    let config = PreloadConfig {
        keys: keys(&["app.name", "app.missing"]),
        concurrency: 1,
        ..PreloadConfig::default()
    };
    Preloader::new(cold.clone(), config).run().await;

    repo.reset();
    shared.reset();
    assert_eq!(cold.get("app.name").await, Some(json!("tierset")));
    assert_eq!(cold.get_or("app.missing", json!(0)).await, json!(0));
    assert_eq!(repo.calls(), 0);
    assert_eq!(shared.calls(), 0);
}

#[tokio::test]
async fn preload_is_skipped_when_disabled_or_empty() {
    let repo = CountingRepo::new("memory.settings");
    let shared = CountingShared::new();
    let store = store_over(&repo, &shared);

    let disabled = PreloadConfig {
        enabled: false,
        keys: keys(&["app.name"]),
        ..PreloadConfig::default()
    };
    assert!(Preloader::new(store.clone(), disabled).run().await.skipped);

    let empty = PreloadConfig::default();
    assert!(Preloader::new(store.clone(), empty).run().await.skipped);

    assert_eq!(repo.calls(), 0);
}

#[tokio::test]
async fn preload_is_skipped_when_table_is_not_ready() {
    let repo = CountingRepo::new("memory.settings");
    let shared = CountingShared::new();
    let store = store_over(&repo, &shared);
    repo.set_ready(false);

    let config = PreloadConfig {
        keys: keys(&["app.name"]),
        ..PreloadConfig::default()
    };
    let report = Preloader::new(store.clone(), config.clone()).run().await;
    assert!(report.skipped);
    assert_eq!(repo.calls(), 1, "only the readiness check runs");
    assert!(!store.is_memo_cached("app.name"));

    repo.set_failing(true);
    repo.set_ready(true);
    assert!(Preloader::new(store, config).run().await.skipped);
}

#[tokio::test]
async fn preload_counts_failures_and_continues() {
    let repo = CountingRepo::new("memory.settings");
    let shared = CountingShared::new();
    let store = store_over(&repo, &shared);
    store.set("app.name", json!("tierset"), None).await.expect("seed");
    store.clear_memory_cache();
    shared.inner.forget(&store.cache_key("app.name").render()).await.expect("forget");
    repo.break_key("app.flaky");

    let config = PreloadConfig {
        keys: keys(&["app.flaky", "app.name"]),
        ..PreloadConfig::default()
    };
    let report = Preloader::new(store.clone(), config).run().await;

    assert_eq!(report.failed, 1);
    assert_eq!(report.loaded, 1);
    assert!(!report.skipped);
    assert!(!store.is_memo_cached("app.flaky"));
    assert!(store.is_memo_cached("app.name"));
}
