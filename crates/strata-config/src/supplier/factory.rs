//! Supplier factory.
//!
//! Turns declarative descriptions (partials with a `type` field) into
//! suppliers through an ordered list of [`SupplierCreator`]s.

use std::sync::Arc;

use tracing::debug;

use super::{
    description_type, AggregateSupplierCreator, BoxFuture, DirSupplierCreator, EnvSupplierCreator,
    FileSupplierCreator, ObservableFileSupplierCreator, ObservableRestSupplierCreator,
    RestSupplierCreator, Supplier,
};
use crate::{ConfigError, ConfigResult, ParserFactory, Partial, SupplierOptions};

/// Builds suppliers from the descriptions it accepts.
pub trait SupplierCreator: Send + Sync {
    /// Returns true if this creator handles the description.
    fn accept(&self, description: &Partial) -> bool;

    /// Create a supplier from the description.
    ///
    /// The factory is passed along so composite suppliers can resolve nested
    /// descriptions.
    fn create<'a>(
        &'a self,
        description: &'a Partial,
        factory: &'a SupplierFactory,
    ) -> BoxFuture<'a, ConfigResult<Box<dyn Supplier>>>;
}

/// Ordered registry of supplier creators.
///
/// # Example
///
/// ```no_run
/// use strata_config::{Partial, SupplierFactory, SupplierOptions};
///
/// # async fn example() -> Result<(), strata_config::ConfigError> {
/// let factory = SupplierFactory::with_defaults(&SupplierOptions::default())?;
///
/// let mut description = Partial::new();
/// description.set("type", "file")?.set("path", "config/app.yaml")?;
///
/// let supplier = factory.create(Some(&description)).await?;
/// # Ok(())
/// # }
/// ```
pub struct SupplierFactory {
    creators: Vec<Box<dyn SupplierCreator>>,
}

impl SupplierFactory {
    /// Create a factory with no creators registered.
    #[must_use]
    pub fn new() -> Self {
        Self {
            creators: Vec::new(),
        }
    }

    /// Create a factory with every built-in creator and the default parsers.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Http` if the HTTP client cannot be built.
    pub fn with_defaults(options: &SupplierOptions) -> ConfigResult<Self> {
        Self::with_parsers(options, Arc::new(ParserFactory::default()))
    }

    /// Create a factory with every built-in creator sharing the given parsers.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Http` if the HTTP client cannot be built.
    pub fn with_parsers(options: &SupplierOptions, parsers: Arc<ParserFactory>) -> ConfigResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.http_timeout)
            .build()?;
        let format = options.default_format.as_str();

        let mut factory = Self::new();
        factory
            .register(EnvSupplierCreator)
            .register(FileSupplierCreator::new(parsers.clone(), format))
            .register(ObservableFileSupplierCreator::new(parsers.clone(), format))
            .register(DirSupplierCreator::new(parsers.clone(), format))
            .register(RestSupplierCreator::new(client.clone(), parsers.clone(), format))
            .register(ObservableRestSupplierCreator::new(client, parsers, format))
            .register(AggregateSupplierCreator);
        Ok(factory)
    }

    /// Append a creator. Earlier registrations take precedence.
    pub fn register(&mut self, creator: impl SupplierCreator + 'static) -> &mut Self {
        self.creators.push(Box::new(creator));
        self
    }

    /// Create a supplier from a description.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidSupplier` if the description is missing or
    /// no creator accepts it, and any error of the accepting creator.
    pub async fn create(&self, description: Option<&Partial>) -> ConfigResult<Box<dyn Supplier>> {
        let description =
            description.ok_or_else(|| ConfigError::invalid_supplier("missing supplier description"))?;

        let creator = self
            .creators
            .iter()
            .find(|creator| creator.accept(description))
            .ok_or_else(|| {
                ConfigError::invalid_supplier(format!(
                    "no creator accepts supplier type {:?}",
                    description_type(description).unwrap_or_default()
                ))
            })?;

        debug!(
            supplier_type = %description_type(description).unwrap_or_default(),
            "creating configuration supplier"
        );
        creator.create(description, self).await
    }
}

impl Default for SupplierFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SupplierFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupplierFactory")
            .field("creators", &self.creators.len())
            .finish()
    }
}

/// Read a required string field of a description.
pub(crate) fn required_string(description: &Partial, path: &str) -> ConfigResult<String> {
    match description.string(path) {
        Ok(value) => Ok(value),
        Err(ConfigError::PathNotFound { .. }) => Err(ConfigError::invalid_supplier(format!(
            "missing required field {path:?}"
        ))),
        Err(_) => Err(ConfigError::invalid_supplier(format!(
            "field {path:?} must be a string"
        ))),
    }
}

/// Read the `format` field of a description, falling back to the default.
pub(crate) fn format_or(description: &Partial, default: &str) -> ConfigResult<String> {
    description
        .string_or("format", default)
        .map_err(|_| ConfigError::invalid_supplier("field \"format\" must be a string"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PartialSupplier, Value};

    struct StaticCreator;

    impl SupplierCreator for StaticCreator {
        fn accept(&self, description: &Partial) -> bool {
            description_type(description).as_deref() == Some("static")
        }

        fn create<'a>(
            &'a self,
            description: &'a Partial,
            _factory: &'a SupplierFactory,
        ) -> BoxFuture<'a, ConfigResult<Box<dyn Supplier>>> {
            Box::pin(async move {
                let data = description.partial_or("data", Partial::new())?;
                Ok(Box::new(PartialSupplier::new(data)) as Box<dyn Supplier>)
            })
        }
    }

    fn description(kind: &str) -> Partial {
        let mut description = Partial::new();
        description.set("type", kind).unwrap();
        description.set("data.node", "value").unwrap();
        description
    }

    #[tokio::test]
    async fn test_create_dispatches_by_type() {
        let mut factory = SupplierFactory::new();
        factory.register(StaticCreator);

        let supplier = factory.create(Some(&description("static"))).await.unwrap();
        assert_eq!(supplier.get("node").unwrap(), Value::from("value"));
    }

    #[tokio::test]
    async fn test_create_missing_description() {
        let factory = SupplierFactory::new();
        let err = factory.create(None).await.err().unwrap();
        assert!(matches!(err, ConfigError::InvalidSupplier { .. }));
    }

    #[tokio::test]
    async fn test_create_unknown_type() {
        let mut factory = SupplierFactory::new();
        factory.register(StaticCreator);

        let err = factory.create(Some(&description("ftp"))).await.err().unwrap();
        assert!(err.to_string().contains("ftp"));
    }

    #[tokio::test]
    async fn test_defaults_reject_untyped_description() {
        let factory = SupplierFactory::with_defaults(&SupplierOptions::default()).unwrap();
        let err = factory.create(Some(&Partial::new())).await.err().unwrap();
        assert!(matches!(err, ConfigError::InvalidSupplier { .. }));
    }

    #[test]
    fn test_required_string() {
        let mut description = Partial::new();
        description.set("path", 1).unwrap();

        assert!(required_string(&description, "uri")
            .unwrap_err()
            .to_string()
            .contains("missing required field"));
        assert!(required_string(&description, "path")
            .unwrap_err()
            .to_string()
            .contains("must be a string"));
    }

    #[test]
    fn test_format_or() {
        let mut description = Partial::new();
        assert_eq!(format_or(&description, "yaml").unwrap(), "yaml");

        description.set("format", "json").unwrap();
        assert_eq!(format_or(&description, "yaml").unwrap(), "json");
    }
}
