//! Environment variable supplier.

use std::env::{self, VarError};

use tracing::{debug, warn};

use super::{description_type, BoxFuture, Snapshot, Supplier, SupplierCreator, SupplierFactory};
use crate::{ConfigError, ConfigResult, Partial, Value};

/// Supplier reading a fixed set of environment variables.
///
/// Each variable is stored as a string at its mapped dotted path. Variables
/// that are not set are skipped. A value that is not valid unicode is stored
/// with the invalid sequences replaced by `U+FFFD`.
///
/// # Example
///
/// ```
/// use strata_config::{EnvSupplier, Supplier};
///
/// let supplier = EnvSupplier::new([("STRATA_DOC_UNSET_VAR", "server.port")]).unwrap();
/// assert!(!supplier.has("server.port"));
/// ```
#[derive(Debug)]
pub struct EnvSupplier {
    snapshot: Snapshot,
}

impl EnvSupplier {
    /// Read the variables of the mapping `(variable name, destination path)`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::EmptyPath` if a set variable maps to an empty path.
    pub fn new<I, K, P>(mappings: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = (K, P)>,
        K: AsRef<str>,
        P: AsRef<str>,
    {
        let mut partial = Partial::new();
        for (name, path) in mappings {
            let name = name.as_ref();
            match env::var(name) {
                Ok(value) => {
                    partial.set(path.as_ref(), value)?;
                }
                Err(VarError::NotPresent) => {
                    debug!(var = %name, "environment variable not set, skipping");
                }
                Err(VarError::NotUnicode(raw)) => {
                    warn!(var = %name, "environment variable is not valid unicode, storing lossy value");
                    partial.set(path.as_ref(), raw.to_string_lossy().into_owned())?;
                }
            }
        }

        Ok(Self {
            snapshot: Snapshot::new(partial),
        })
    }
}

impl Supplier for EnvSupplier {
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

/// Creates [`EnvSupplier`]s from `type: env` descriptions.
///
/// The `mappings` field mirrors the destination layout: each leaf holds the
/// name of the variable to read, and its dotted path is the destination.
///
/// ```yaml
/// type: env
/// mappings:
///   server:
///     port: APP_PORT
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSupplierCreator;

impl EnvSupplierCreator {
    fn mappings(description: &Partial) -> ConfigResult<Vec<(String, String)>> {
        let tree = description
            .partial_or("mappings", Partial::new())
            .map_err(|_| ConfigError::invalid_supplier("field \"mappings\" must be a map"))?;

        let mut mappings = Vec::new();
        collect_leaves(&tree, "", &mut mappings)?;
        Ok(mappings)
    }
}

fn collect_leaves(
    tree: &Partial,
    prefix: &str,
    into: &mut Vec<(String, String)>,
) -> ConfigResult<()> {
    for (key, value) in tree.iter() {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Partial(child) => collect_leaves(child, &path, into)?,
            Value::String(name) => into.push((name.clone(), path)),
            other => {
                return Err(ConfigError::invalid_supplier(format!(
                    "mapping {path:?} must name a variable, found {}",
                    other.type_name()
                )))
            }
        }
    }
    Ok(())
}

impl SupplierCreator for EnvSupplierCreator {
    fn accept(&self, description: &Partial) -> bool {
        description_type(description).as_deref() == Some("env")
    }

    fn create<'a>(
        &'a self,
        description: &'a Partial,
        _factory: &'a SupplierFactory,
    ) -> BoxFuture<'a, ConfigResult<Box<dyn Supplier>>> {
        Box::pin(async move {
            let supplier = EnvSupplier::new(Self::mappings(description)?)?;
            Ok(Box::new(supplier) as Box<dyn Supplier>)
        })
    }
}
