//! REST suppliers.
//!
//! Both suppliers issue an HTTP GET, decode the body in the declared format
//! and extract the partial found at the configured path of the response.
//! The observable variant also reads an RFC3339 timestamp from the response
//! and only replaces its partial when that timestamp moves forward.

use std::io::Cursor;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info};

use super::factory::{format_or, required_string};
use super::{
    description_type, BoxFuture, ObservableSupplier, Snapshot, Supplier, SupplierCreator,
    SupplierFactory,
};
use crate::{ConfigError, ConfigResult, ParserFactory, Partial, Value};

/// Location and layout of a remote configuration document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestEndpoint {
    /// URI requested with GET.
    pub uri: String,
    /// Format of the response body.
    pub format: String,
    /// Dotted path of the configuration partial inside the response.
    pub config_path: String,
}

impl RestEndpoint {
    /// Create an endpoint description.
    pub fn new(
        uri: impl Into<String>,
        format: impl Into<String>,
        config_path: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            format: format.into(),
            config_path: config_path.into(),
        }
    }

    async fn fetch(&self, client: &reqwest::Client, parsers: &ParserFactory) -> ConfigResult<Partial> {
        debug!(uri = %self.uri, "fetching remote configuration");
        let response = client.get(&self.uri).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConfigError::HttpStatus {
                uri: self.uri.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        parsers.parse(&self.format, Box::new(Cursor::new(body.to_vec())))
    }

    fn extract(&self, response: &Partial) -> ConfigResult<Partial> {
        response.partial(&self.config_path)
    }
}

fn extract_timestamp(response: &Partial, path: &str) -> ConfigResult<DateTime<Utc>> {
    let raw = response.string(path)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|source| ConfigError::Timestamp { value: raw, source })
}

/// Supplier fetching a remote document once at construction.
#[derive(Debug)]
pub struct RestSupplier {
    snapshot: Snapshot,
}

impl RestSupplier {
    /// Fetch the endpoint and extract its configuration partial.
    ///
    /// # Errors
    ///
    /// Returns the transport, status or parser error of the request, and
    /// `ConfigError::PathNotFound` or `ConfigError::Conversion` if the
    /// configuration path is absent from the response or not a partial.
    pub async fn new(
        client: &reqwest::Client,
        endpoint: &RestEndpoint,
        parsers: &ParserFactory,
    ) -> ConfigResult<Self> {
        let response = endpoint.fetch(client, parsers).await?;
        Ok(Self {
            snapshot: Snapshot::new(endpoint.extract(&response)?),
        })
    }
}

impl Supplier for RestSupplier {
    fn get(&self, path: &str) -> ConfigResult<Value> {
        self.snapshot.get(path)
    }

    fn get_or(&self, path: &str, default: Value) -> ConfigResult<Value> {
        self.snapshot.get_or(path, default)
    }

    fn has(&self, path: &str) -> bool {
        self.snapshot.has(path)
    }
}

/// Supplier re-fetching a remote document and replacing its partial when the
/// document's timestamp is later than the one last seen.
#[derive(Debug)]
pub struct ObservableRestSupplier {
    client: reqwest::Client,
    endpoint: RestEndpoint,
    timestamp_path: String,
    parsers: Arc<ParserFactory>,
    timestamp: Mutex<DateTime<Utc>>,
    snapshot: Snapshot,
}

impl ObservableRestSupplier {
    /// Fetch the endpoint, extract its configuration partial and timestamp.
    ///
    /// # Errors
    ///
    /// Same as [`RestSupplier::new`], plus `ConfigError::Timestamp` if the
    /// timestamp is not RFC3339.
    pub async fn new(
        client: reqwest::Client,
        endpoint: RestEndpoint,
        timestamp_path: impl Into<String>,
        parsers: Arc<ParserFactory>,
    ) -> ConfigResult<Self> {
        let timestamp_path = timestamp_path.into();
        let response = endpoint.fetch(&client, &parsers).await?;
        let partial = endpoint.extract(&response)?;
        let timestamp = extract_timestamp(&response, &timestamp_path)?;

        Ok(Self {
            client,
            endpoint,
            timestamp_path,
            parsers,
            timestamp: Mutex::new(timestamp),
            snapshot: Snapshot::new(partial),
        })
    }

    /// Timestamp of the document currently held.
    pub fn timestamp(&self) -> DateTime<Utc> {
        *self.timestamp.lock()
    }

    async fn refresh(&self) -> ConfigResult<bool> {
        let response = self.endpoint.fetch(&self.client, &self.parsers).await?;
        let timestamp = extract_timestamp(&response, &self.timestamp_path)?;

        // compare and swap under one guard so a slower, older fetch never
        // replaces a newer document
        let mut current = self.timestamp.lock();
        if timestamp <= *current {
            return Ok(false);
        }
        self.snapshot.replace(self.endpoint.extract(&response)?);
        *current = timestamp;
        drop(current);

        info!(uri = %self.endpoint.uri, %timestamp, "remote configuration reloaded");
        Ok(true)
    }
}

impl Supplier for ObservableRestSupplier {
    fn get(&self, path: &str) -> ConfigResult<Value> {
        self.snapshot.get(path)
    }

    fn get_or(&self, path: &str, default: Value) -> ConfigResult<Value> {
        self.snapshot.get_or(path, default)
    }

    fn has(&self, path: &str) -> bool {
        self.snapshot.has(path)
    }

    fn as_observable(&self) -> Option<&dyn ObservableSupplier> {
        Some(self)
    }
}

impl ObservableSupplier for ObservableRestSupplier {
    fn reload(&self) -> BoxFuture<'_, ConfigResult<bool>> {
        Box::pin(self.refresh())
    }
}

fn endpoint(description: &Partial, default_format: &str) -> ConfigResult<RestEndpoint> {
    Ok(RestEndpoint {
        uri: required_string(description, "uri")?,
        format: format_or(description, default_format)?,
        config_path: required_string(description, "path.config")?,
    })
}

/// Creates [`RestSupplier`]s from `type: rest` descriptions.
#[derive(Debug, Clone)]
pub struct RestSupplierCreator {
    client: reqwest::Client,
    parsers: Arc<ParserFactory>,
    default_format: String,
}

impl RestSupplierCreator {
    /// Create a creator sharing the HTTP client and parsers.
    pub fn new(client: reqwest::Client, parsers: Arc<ParserFactory>, default_format: &str) -> Self {
        Self {
            client,
            parsers,
            default_format: default_format.to_string(),
        }
    }
}

impl SupplierCreator for RestSupplierCreator {
    fn accept(&self, description: &Partial) -> bool {
        description_type(description).as_deref() == Some("rest")
    }

    fn create<'a>(
        &'a self,
        description: &'a Partial,
        _factory: &'a SupplierFactory,
    ) -> BoxFuture<'a, ConfigResult<Box<dyn Supplier>>> {
        Box::pin(async move {
            let endpoint = endpoint(description, &self.default_format)?;
            let supplier = RestSupplier::new(&self.client, &endpoint, &self.parsers).await?;
            Ok(Box::new(supplier) as Box<dyn Supplier>)
        })
    }
}

/// Creates [`ObservableRestSupplier`]s from `type: observable_rest` descriptions.
#[derive(Debug, Clone)]
pub struct ObservableRestSupplierCreator {
    client: reqwest::Client,
    parsers: Arc<ParserFactory>,
    default_format: String,
}

impl ObservableRestSupplierCreator {
    /// Create a creator sharing the HTTP client and parsers.
    pub fn new(client: reqwest::Client, parsers: Arc<ParserFactory>, default_format: &str) -> Self {
        Self {
            client,
            parsers,
            default_format: default_format.to_string(),
        }
    }
}

impl SupplierCreator for ObservableRestSupplierCreator {
    fn accept(&self, description: &Partial) -> bool {
        description_type(description).as_deref() == Some("observable_rest")
    }

    fn create<'a>(
        &'a self,
        description: &'a Partial,
        _factory: &'a SupplierFactory,
    ) -> BoxFuture<'a, ConfigResult<Box<dyn Supplier>>> {
        Box::pin(async move {
            let endpoint = endpoint(description, &self.default_format)?;
            let timestamp_path = required_string(description, "path.timestamp")?;
            let supplier = ObservableRestSupplier::new(
                self.client.clone(),
                endpoint,
                timestamp_path,
                self.parsers.clone(),
            )
            .await?;
            Ok(Box::new(supplier) as Box<dyn Supplier>)
        })
    }
}
