//! Runtime configuration engine for Strata services.
//!
//! Configuration is read from several sources at once, each wrapped in a
//! [`Supplier`]. A [`Config`] merges their data by priority into one
//! read-only view, tells observers when a watched value changes, and can
//! poll sources that support reloading in the background.
//!
//! # Overview
//!
//! - [`Partial`] / [`Value`] - the nested tree of configuration values,
//!   addressed by dotted paths such as `server.http.port`
//! - [`ParserFactory`] - JSON, YAML and TOML decoders producing partials
//! - [`Supplier`] - environment, file, directory, REST and aggregate sources
//! - [`SupplierFactory`] - builds suppliers from declarative descriptions
//! - [`Config`] - priority merge, observers and background reload
//! - [`ConfigLoader`] - bootstraps a `Config` from a base file
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use strata_config::{Config, ConfigLoader, ConfigOptions, SupplierFactory, SupplierOptions};
//!
//! # async fn example() -> Result<(), strata_config::ConfigError> {
//! let config = Config::new(ConfigOptions::new().with_poll_interval(Duration::from_secs(5)))?;
//!
//! let factory = SupplierFactory::with_defaults(&SupplierOptions::default())?;
//! ConfigLoader::new(factory).load(&config).await?;
//!
//! let port = config.int_or("server.port", 8080)?;
//! config.add_observer("log.level", |old, new| {
//!     tracing::info!(%old, %new, "log level changed");
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! # Base File
//!
//! ```yaml
//! server:
//!   port: 8080
//!
//! strata:
//!   config:
//!     suppliers:
//!       env:
//!         type: env
//!         priority: 100
//!         mappings:
//!           server:
//!             port: APP_PORT
//!       overrides:
//!         type: observable_file
//!         path: /etc/app/overrides.json
//!         format: json
//!         priority: 50
//! ```
//!
//! # Environment Variables
//!
//! The engine's own options can be read from `STRATA_CONFIG_*` variables
//! with [`LoaderOptions::from_env`], [`SupplierOptions::from_env`] and
//! [`ConfigOptions::from_env`].

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod options;
mod parser;
mod partial;
pub mod supplier;
mod value;

pub use config::Config;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use options::{
    load_dotenv, ConfigOptions, LoaderOptions, SupplierOptions, ENV_BASE_FORMAT, ENV_BASE_ID,
    ENV_BASE_PATH, ENV_BASE_PRIORITY, ENV_DEFAULT_FORMAT, ENV_HTTP_TIMEOUT_MS, ENV_LIST_PATH,
    ENV_LOADER_ACTIVE, ENV_POLL_INTERVAL_MS,
};
pub use parser::{
    JsonParser, JsonParserCreator, Parser, ParserCreator, ParserFactory, ParserReader, TomlParser,
    TomlParserCreator, YamlParser, YamlParserCreator,
};
pub use partial::Partial;
pub use supplier::{
    AggregateSupplier, BoxFuture, DirSupplier, EnvSupplier, FileSupplier, ObservableFileSupplier,
    ObservableRestSupplier, ObservableSupplier, PartialSupplier, RestEndpoint, RestSupplier,
    Supplier, SupplierCreator, SupplierFactory,
};
pub use value::{convert, Value};
