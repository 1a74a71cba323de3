//! Deploying a new version over an active one.

use std::sync::Arc;

use http::StatusCode;
use sitecache_common::ManualClock;
use sitecache_sw::testing::{Reply, ScriptedFetcher};
use sitecache_sw::{
    CacheStore, ClientType, Host, MemoryCacheStore, SiteConfig, SiteWorker, SwError,
    VersionConfig, WorkerEvent, WorkerState,
};
use tokio::sync::mpsc;
use url::Url;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("sitecache_sw=debug")
        .with_test_writer()
        .try_init();
}

fn config(version: &str) -> SiteConfig {
    SiteConfig::new(Url::parse("https://example.com").unwrap())
        .with_versions(VersionConfig::for_release("site", version))
}

fn host() -> (
    Host,
    MemoryCacheStore,
    Arc<ScriptedFetcher>,
    mpsc::UnboundedReceiver<WorkerEvent>,
) {
    init_tracing();
    let store = MemoryCacheStore::new();
    let fetcher = Arc::new(ScriptedFetcher::new(Url::parse("https://example.com").unwrap()));
    for asset in &config("1").static_assets {
        fetcher.respond(asset, Reply::ok("asset"));
    }
    let (host, events) = Host::new(
        Arc::new(store.clone()),
        fetcher.clone(),
        Arc::new(ManualClock::new(0)),
    );
    (host, store, fetcher, events)
}

fn drain(events: &mut mpsc::UnboundedReceiver<WorkerEvent>) -> Vec<WorkerEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

#[tokio::test]
async fn new_version_replaces_old_and_sweeps_its_caches() {
    let (host, store, _fetcher, mut events) = host();
    let page = host
        .clients
        .write()
        .await
        .open_window(Url::parse("https://example.com/").unwrap());

    let v1 = SiteWorker::new(config("1"), host.clone()).unwrap();
    v1.install().wait().await.unwrap();
    v1.activate().wait().await.unwrap();
    assert_eq!(v1.state().await, WorkerState::Active);
    assert_eq!(
        host.clients.read().await.get(page.id).unwrap().controller,
        Some(v1.id())
    );
    drain(&mut events);

    let v2 = SiteWorker::new(config("2"), host.clone()).unwrap();
    v2.install().wait().await.unwrap();
    assert_eq!(v2.state().await, WorkerState::Installed);
    assert!(host.registration.read().await.is_updating());

    let report = v2.activate().wait().await.unwrap();
    assert_eq!(report.replaced, Some(v1.id()));
    assert_eq!(report.claimed, vec![page.id]);
    assert_eq!(v1.state().await, WorkerState::Redundant);
    assert_eq!(v2.state().await, WorkerState::Active);

    let mut names = store.keys().await.unwrap();
    names.sort();
    assert_eq!(names, vec!["site-dynamic-v2", "site-static-v2"]);
    let mut deleted = report.deleted.clone();
    deleted.sort();
    assert_eq!(deleted, vec!["site-dynamic-v1", "site-static-v1"]);

    let seen = drain(&mut events);
    assert!(seen.contains(&WorkerEvent::SkipWaiting { worker_id: v2.id() }));
    assert!(seen.contains(&WorkerEvent::ControllerChange {
        client_id: page.id,
        worker_id: v2.id(),
    }));
    assert_eq!(
        seen.last(),
        Some(&WorkerEvent::StateChange {
            worker_id: v2.id(),
            state: WorkerState::Active,
        })
    );
    assert_eq!(host.clients.read().await.match_all(ClientType::Window).len(), 1);
}

#[tokio::test]
async fn failed_precache_aborts_install() {
    let (host, store, fetcher, _events) = host();
    fetcher.respond("/manifest.json", Reply::status(StatusCode::NOT_FOUND));

    let worker = SiteWorker::new(config("1"), host.clone()).unwrap();
    let result = worker.install().wait().await;
    assert!(matches!(result, Err(SwError::InstallFailed(_))));
    assert_eq!(worker.state().await, WorkerState::Redundant);

    // No asset made it into the static cache.
    let static_cache = store.get("site-static-v1").await;
    if let Some(cache) = static_cache {
        assert!(cache.is_empty().await);
    }

    // A redundant worker cannot activate.
    assert!(matches!(
        worker.activate().wait().await,
        Err(SwError::StateError(_))
    ));
}

#[tokio::test]
async fn network_failure_during_install_is_fatal() {
    let (host, _store, fetcher, _events) = host();
    fetcher.respond("/icons/icon-512x512.png", Reply::Fail);

    let worker = SiteWorker::new(config("1"), host).unwrap();
    assert!(matches!(
        worker.install().wait().await,
        Err(SwError::InstallFailed(_))
    ));
}

#[tokio::test]
async fn clear_cache_waits_for_running_install() {
    let (host, store, _fetcher, _events) = host();
    let worker = SiteWorker::new(config("1"), host).unwrap();

    let install = worker.install();
    let (tx, rx) = tokio::sync::oneshot::channel();
    let clear = worker.handle_message(&serde_json::json!({"type": "CLEAR_CACHE"}), Some(tx));

    install.wait().await.unwrap();
    clear.wait().await.unwrap();
    assert!(rx.await.unwrap().success);
    // Whichever ran first, the clear never interleaves with precaching.
    let names = store.keys().await.unwrap();
    assert!(names.is_empty() || names.len() == 2);
}
