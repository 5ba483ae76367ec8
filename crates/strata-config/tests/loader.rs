//! Integration tests for bootstrapping a `Config` from a base file.

mod common;

use std::fs;

use serde::{Deserialize, Serialize};
use strata_config::{
    Config, ConfigError, ConfigLoader, LoaderOptions, SupplierFactory, SupplierOptions, Value,
};
use tempfile::TempDir;

use common::{document, init_tracing, Endpoint};

#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
struct Server {
    host: String,
    port: u16,
    #[serde(rename = "maxConnections")]
    max_connections: u32,
    tls: bool,
}

fn loader(base: &std::path::Path) -> ConfigLoader {
    let factory = SupplierFactory::with_defaults(&SupplierOptions::default()).unwrap();
    ConfigLoader::new(factory)
        .with_options(LoaderOptions::new().with_base_file(base.to_str().unwrap(), "yaml"))
}

/// Every built-in supplier type declared in one base file.
#[tokio::test]
async fn test_load_every_supplier_type() {
    init_tracing();
    std::env::set_var("STRATA_IT_LOADER_HOST", "env.local");

    let remote = Endpoint::start(document(
        "2024-05-01T10:00:00Z",
        r#"{"server": {"port": 9443, "tls": true}}"#,
    ))
    .await;

    let dir = TempDir::new().unwrap();
    let conf_d = dir.path().join("conf.d");
    fs::create_dir(&conf_d).unwrap();
    fs::write(conf_d.join("10-server.yaml"), "server:\n  port: 8081\n  maxConnections: 64\n").unwrap();
    fs::write(conf_d.join("20-feature.yaml"), "feature:\n  beta: true\n").unwrap();

    let extra = dir.path().join("extra.toml");
    fs::write(&extra, "[server]\nport = 7000\n\n[limits]\nrate = 2.5\n").unwrap();

    let base = dir.path().join("config.yaml");
    fs::write(
        &base,
        format!(
            r#"
server:
  host: base.local
  port: 8080
  maxConnections: 16
  tls: false
strata:
  config:
    suppliers:
      directory:
        type: dir
        path: {conf_d}
        priority: 10
      environment:
        type: env
        priority: 100
        mappings:
          server:
            host: STRATA_IT_LOADER_HOST
      grouped:
        type: aggregate
        priority: 5
        suppliers:
          - type: file
            path: {extra}
            format: toml
      remote:
        type: observable_rest
        uri: {uri}
        format: json
        priority: 50
        path:
          config: data
          timestamp: meta.updated
"#,
            conf_d = conf_d.display(),
            extra = extra.display(),
            uri = remote.uri,
        ),
    )
    .unwrap();

    let config = Config::default();
    loader(&base).load(&config).await.unwrap();

    for id in ["base", "directory", "environment", "grouped", "remote"] {
        assert!(config.has_supplier(id), "missing supplier {id}");
    }

    // environment (100) > remote (50) > directory (10) > grouped (5) > base (0)
    assert_eq!(config.string("server.host").unwrap(), "env.local");
    assert_eq!(config.int("server.port").unwrap(), 9443);
    assert!(config.bool("server.tls").unwrap());
    assert_eq!(config.int("server.maxconnections").unwrap(), 64);
    assert_eq!(config.float("limits.rate").unwrap(), 2.5);
    assert!(config.bool("feature.beta").unwrap());

    // keys are matched to fields ignoring case
    let server = config.populate("server", Server::default()).unwrap();
    assert_eq!(
        server,
        Server {
            host: "env.local".to_string(),
            port: 9443,
            max_connections: 64,
            tls: true,
        }
    );

    config.close().unwrap();
    assert!(!config.has("server"));
}

#[tokio::test]
async fn test_load_with_custom_list_path_and_base_priority() {
    init_tracing();
    let dir = TempDir::new().unwrap();

    let overrides = dir.path().join("overrides.json");
    fs::write(&overrides, r#"{"node": "override"}"#).unwrap();

    let base = dir.path().join("config.yaml");
    fs::write(
        &base,
        format!(
            "node: base\napp:\n  sources:\n    overrides:\n      type: file\n      format: json\n      path: {}\n",
            overrides.display()
        ),
    )
    .unwrap();

    let factory = SupplierFactory::with_defaults(&SupplierOptions::default()).unwrap();
    let loader = ConfigLoader::new(factory).with_options(
        LoaderOptions::new()
            .with_base_id("root")
            .with_base_file(base.to_str().unwrap(), "yaml")
            .with_base_priority(10)
            .with_list_path("app.sources"),
    );

    let config = Config::default();
    loader.load(&config).await.unwrap();

    assert!(config.has_supplier("root"));
    assert!(config.has_supplier("overrides"));
    // the base outranks the listed supplier registered at priority 0
    assert_eq!(config.get("node").unwrap(), Value::from("base"));
}

#[tokio::test]
async fn test_listed_supplier_failure_is_returned() {
    init_tracing();
    let dir = TempDir::new().unwrap();

    let base = dir.path().join("config.yaml");
    fs::write(
        &base,
        "strata:\n  config:\n    suppliers:\n      missing:\n        type: file\n        path: /nonexistent/strata/file.yaml\n",
    )
    .unwrap();

    let config = Config::default();
    let err = loader(&base).load(&config).await.unwrap_err();

    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(config.has_supplier("base"));
    assert!(!config.has_supplier("missing"));
}
