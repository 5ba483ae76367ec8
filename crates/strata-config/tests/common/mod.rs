//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

static TRACING: Once = Once::new();

/// Install a test subscriber honoring `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Minimal HTTP endpoint answering every request with the current body.
pub struct Endpoint {
    /// Body returned by the next request.
    pub body: Arc<Mutex<String>>,
    /// URI of the endpoint.
    pub uri: String,
}

impl Endpoint {
    /// Bind on a random local port and serve until the runtime stops.
    pub async fn start(body: impl Into<String>) -> Self {
        let body = Arc::new(Mutex::new(body.into()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let served = body.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let body = served.lock().clone();
                tokio::spawn(async move {
                    let mut request = [0u8; 4096];
                    let _ = socket.read(&mut request).await;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self {
            body,
            uri: format!("http://{addr}/config"),
        }
    }

    /// Replace the served body.
    pub fn set_body(&self, body: impl Into<String>) {
        *self.body.lock() = body.into();
    }
}

/// Remote document with a timestamp and a configuration node.
pub fn document(timestamp: &str, config: &str) -> String {
    format!(r#"{{"meta": {{"updated": "{timestamp}"}}, "data": {config}}}"#)
}
