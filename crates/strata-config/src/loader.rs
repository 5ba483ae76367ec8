//! Bootstrap of a [`Config`] from a base file.
//!
//! The [`ConfigLoader`] registers the base file supplier, then reads a list
//! of supplier descriptions from the merged configuration and registers a
//! supplier for each one.

use std::sync::Arc;

use tracing::{debug, info};

use crate::options::load_dotenv;
use crate::{Config, ConfigError, ConfigResult, LoaderOptions, Partial, SupplierFactory};

/// Loads the supplier layout of a [`Config`] from its base file.
///
/// The base file may declare further suppliers under the list path
/// (`strata.config.suppliers` by default), keyed by supplier id:
///
/// ```yaml
/// strata:
///   config:
///     suppliers:
///       overrides:
///         type: observable_file
///         path: config/overrides.yaml
///         priority: 10
///       remote:
///         type: rest
///         uri: http://config.local/app
///         format: json
///         path:
///           config: data
/// ```
///
/// # Example
///
/// ```no_run
/// use strata_config::{Config, ConfigLoader, LoaderOptions, SupplierFactory, SupplierOptions};
///
/// # async fn example() -> Result<(), strata_config::ConfigError> {
/// let factory = SupplierFactory::with_defaults(&SupplierOptions::from_env()?)?;
/// let loader = ConfigLoader::new(factory)
///     .with_dotenv()
///     .with_options(LoaderOptions::from_env()?);
///
/// let config = Config::default();
/// loader.load(&config).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    factory: SupplierFactory,
    options: LoaderOptions,
}

impl ConfigLoader {
    /// Create a loader with default options.
    #[must_use]
    pub fn new(factory: SupplierFactory) -> Self {
        Self {
            factory,
            options: LoaderOptions::default(),
        }
    }

    /// Replace the loader options.
    #[must_use]
    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    /// Load a `.env` file into the process environment, if one exists.
    ///
    /// Call before [`LoaderOptions::from_env`] so the file can set loader
    /// variables.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        load_dotenv();
        self
    }

    /// The loader options.
    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// The factory resolving supplier descriptions.
    pub fn factory(&self) -> &SupplierFactory {
        &self.factory
    }

    /// Description of the base file supplier.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::EmptyPath` if a field path is empty, which
    /// cannot happen with the fixed field names used here.
    pub fn base_description(&self) -> ConfigResult<Partial> {
        let mut description = Partial::new();
        description
            .set("type", "file")?
            .set("path", self.options.base_path.as_str())?
            .set("format", self.options.base_format.as_str())?;
        Ok(description)
    }

    /// Register the base supplier and every supplier listed in the merged
    /// configuration. Does nothing when the loader is inactive.
    ///
    /// Listed suppliers are registered in id order with the `priority`
    /// field of their description, 0 if absent.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while creating or registering a
    /// supplier, including `ConfigError::DuplicateSupplier` when an id is
    /// already taken.
    pub async fn load(&self, config: &Config) -> ConfigResult<()> {
        if !self.options.active {
            debug!("configuration loader inactive, skipping");
            return Ok(());
        }

        let base = self.factory.create(Some(&self.base_description()?)).await?;
        config.add_supplier(
            self.options.base_id.as_str(),
            self.options.base_priority,
            Arc::from(base),
        )?;

        let list = match config.partial(&self.options.list_path) {
            Ok(list) => list,
            Err(e) if e.is_path_not_found() || e.is_conversion() => {
                debug!(path = %self.options.list_path, "no supplier list declared");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        for (id, description) in list.iter() {
            let description = description.as_partial();
            let priority = match description {
                Some(description) => priority_of(id, description)?,
                None => 0,
            };

            let supplier = self.factory.create(description).await?;
            config.add_supplier(id.as_str(), priority, Arc::from(supplier))?;
        }

        info!(suppliers = list.len() + 1, "configuration loaded");
        Ok(())
    }
}

fn priority_of(id: &str, description: &Partial) -> ConfigResult<i32> {
    let priority = description.int_or("priority", 0)?;
    i32::try_from(priority)
        .map_err(|_| ConfigError::conversion(format!("{id}.priority"), "i32", "int"))
}
