//! Configuration suppliers.
//!
//! A [`Supplier`] holds the [`Partial`] produced by one external source.
//! Suppliers that can re-check their source implement
//! [`ObservableSupplier`] and are polled by the [`Config`](crate::Config)
//! background reload.
//!
//! | Supplier | Source |
//! |---|---|
//! | [`EnvSupplier`] | environment variables mapped to paths |
//! | [`FileSupplier`] | one file, parsed once |
//! | [`ObservableFileSupplier`] | one file, re-parsed when its mtime changes |
//! | [`DirSupplier`] | every file of a format in a directory tree |
//! | [`RestSupplier`] | an HTTP endpoint, fetched once |
//! | [`ObservableRestSupplier`] | an HTTP endpoint, re-fetched when its timestamp moves |
//! | [`AggregateSupplier`] | a fixed list of other suppliers |
//! | [`PartialSupplier`] | an in-memory partial |

use std::future::Future;
use std::pin::Pin;

use parking_lot::Mutex;

use crate::{ConfigResult, Partial, Value};

mod aggregate;
mod dir;
mod env;
mod factory;
mod file;
mod rest;

pub use aggregate::{AggregateSupplier, AggregateSupplierCreator};
pub use dir::{DirSupplier, DirSupplierCreator};
pub use env::{EnvSupplier, EnvSupplierCreator};
pub use factory::{SupplierCreator, SupplierFactory};
pub use file::{FileSupplier, FileSupplierCreator, ObservableFileSupplier, ObservableFileSupplierCreator};
pub use rest::{
    ObservableRestSupplier, ObservableRestSupplierCreator, RestEndpoint, RestSupplier,
    RestSupplierCreator,
};

/// Boxed future returned by the async operations of supplier trait objects.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A source of configuration.
pub trait Supplier: Send + Sync {
    /// Get a copy of the value stored at the path.
    fn get(&self, path: &str) -> ConfigResult<Value>;

    /// Get a copy of the value stored at the path, or the default if absent.
    fn get_or(&self, path: &str, default: Value) -> ConfigResult<Value>;

    /// Check whether the path resolves.
    fn has(&self, path: &str) -> bool;

    /// Release any resource held by the supplier.
    fn close(&self) -> ConfigResult<()> {
        Ok(())
    }

    /// Access the reload capability, for suppliers that have one.
    fn as_observable(&self) -> Option<&dyn ObservableSupplier> {
        None
    }
}

/// A supplier that can re-check its source.
pub trait ObservableSupplier: Supplier {
    /// Re-check the source, returning true if the held partial was replaced.
    ///
    /// On error the held partial is left unchanged.
    fn reload(&self) -> BoxFuture<'_, ConfigResult<bool>>;
}

/// The partial held by a supplier, guarded by the supplier's own lock.
#[derive(Debug, Default)]
pub(crate) struct Snapshot {
    partial: Mutex<Partial>,
}

impl Snapshot {
    pub(crate) fn new(partial: Partial) -> Self {
        Self {
            partial: Mutex::new(partial),
        }
    }

    pub(crate) fn get(&self, path: &str) -> ConfigResult<Value> {
        self.partial.lock().get(path)
    }

    pub(crate) fn get_or(&self, path: &str, default: Value) -> ConfigResult<Value> {
        self.partial.lock().get_or(path, default)
    }

    pub(crate) fn has(&self, path: &str) -> bool {
        self.partial.lock().has(path)
    }

    pub(crate) fn replace(&self, partial: Partial) {
        *self.partial.lock() = partial;
    }
}

/// Supplier over a partial built in memory.
///
/// Useful to register programmatic defaults or overrides next to
/// file and remote sources.
///
/// # Example
///
/// ```
/// use strata_config::{Partial, PartialSupplier, Supplier};
///
/// let mut defaults = Partial::new();
/// defaults.set("server.port", 8080).unwrap();
///
/// let supplier = PartialSupplier::new(defaults);
/// assert!(supplier.has("server.port"));
/// ```
#[derive(Debug, Default)]
pub struct PartialSupplier {
    snapshot: Snapshot,
}

impl PartialSupplier {
    /// Create a supplier holding a copy of the partial.
    pub fn new(partial: Partial) -> Self {
        Self {
            snapshot: Snapshot::new(partial),
        }
    }
}

impl Supplier for PartialSupplier {
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

/// Read the `type` discriminator of a supplier description.
pub(crate) fn description_type(description: &Partial) -> Option<String> {
    description.string("type").ok()
}
