//! Integration tests for background reload of observable suppliers.

mod common;

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use strata_config::{
    Config, ConfigOptions, ObservableFileSupplier, ObservableRestSupplier, ParserFactory,
    RestEndpoint, Value,
};
use tempfile::TempDir;

use common::{document, init_tracing, Endpoint};

const POLL: Duration = Duration::from_millis(20);

/// Replace the file atomically with a modification time `age` in the future.
fn rewrite(path: &Path, content: &str, age: Duration) {
    let staged = path.with_extension("staged");
    fs::write(&staged, content).unwrap();
    let file = File::options().write(true).open(&staged).unwrap();
    file.set_modified(SystemTime::now() + age).unwrap();
    drop(file);
    fs::rename(&staged, path).unwrap();
}

/// Wait until the condition holds, polling every few milliseconds.
async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_poller_picks_up_file_changes() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.yaml");
    rewrite(&path, "node: v1\n", Duration::ZERO);

    let parsers = Arc::new(ParserFactory::default());
    let supplier = ObservableFileSupplier::new(&path, "yaml", parsers).unwrap();

    let config = Config::new(ConfigOptions::new().with_poll_interval(POLL)).unwrap();
    config.add_supplier("file", 0, Arc::new(supplier)).unwrap();

    let changes = Arc::new(Mutex::new(Vec::new()));
    let seen = changes.clone();
    config
        .add_observer("node", move |old, new| {
            seen.lock().push((old.clone(), new.clone()));
        })
        .unwrap();

    rewrite(&path, "node: v2\n", Duration::from_secs(10));

    assert!(eventually(|| config.string("node").ok().as_deref() == Some("v2")).await);
    assert_eq!(
        changes.lock().first().cloned(),
        Some((Value::from("v1"), Value::from("v2")))
    );

    config.close().unwrap();
    assert!(!config.is_polling());
}

#[tokio::test]
async fn test_poller_records_reload_errors() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.json");
    rewrite(&path, r#"{"node": "v1"}"#, Duration::ZERO);

    let supplier =
        ObservableFileSupplier::new(&path, "json", Arc::new(ParserFactory::default())).unwrap();

    let config = Config::new(ConfigOptions::new().with_poll_interval(POLL)).unwrap();
    config.add_supplier("file", 0, Arc::new(supplier)).unwrap();

    rewrite(&path, "{ not json", Duration::from_secs(10));

    assert!(eventually(|| config.last_reload_error().is_some()).await);
    // the last good content stays visible
    assert_eq!(config.string("node").unwrap(), "v1");

    rewrite(&path, r#"{"node": "v3"}"#, Duration::from_secs(20));

    assert!(eventually(|| config.string("node").ok().as_deref() == Some("v3")).await);
    assert!(eventually(|| config.last_reload_error().is_none()).await);
}

#[tokio::test]
async fn test_remote_reload_follows_timestamp() {
    init_tracing();
    let remote = Endpoint::start(document("2024-05-01T10:00:00Z", r#"{"node": "v1"}"#)).await;

    let supplier = ObservableRestSupplier::new(
        reqwest::Client::new(),
        RestEndpoint::new(remote.uri.as_str(), "json", "data"),
        "meta.updated",
        Arc::new(ParserFactory::default()),
    )
    .await
    .unwrap();

    let config = Config::default();
    config.add_supplier("remote", 0, Arc::new(supplier)).unwrap();

    remote.set_body(document("2024-05-01T10:00:00Z", r#"{"node": "stale"}"#));
    assert!(!config.reload().await.unwrap());
    assert_eq!(config.string("node").unwrap(), "v1");

    remote.set_body(document("2024-05-01T11:00:00Z", r#"{"node": "v2"}"#));
    assert!(config.reload().await.unwrap());
    assert_eq!(config.string("node").unwrap(), "v2");
}

#[tokio::test]
async fn test_dropping_config_stops_poller() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.yaml");
    rewrite(&path, "node: v1\n", Duration::ZERO);

    let supplier =
        ObservableFileSupplier::new(&path, "yaml", Arc::new(ParserFactory::default())).unwrap();
    let supplier = Arc::new(supplier);

    {
        let config = Config::new(ConfigOptions::new().with_poll_interval(POLL)).unwrap();
        config.add_supplier("file", 0, supplier.clone()).unwrap();
        assert!(config.is_polling());
    }

    // the poller held the only other reference through the config state
    assert!(eventually(|| Arc::strong_count(&supplier) == 1).await);
}
