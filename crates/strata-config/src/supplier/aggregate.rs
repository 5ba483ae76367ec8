//! Aggregate supplier.

use tracing::{debug, warn};

use super::{description_type, BoxFuture, Snapshot, Supplier, SupplierCreator, SupplierFactory};
use crate::{ConfigError, ConfigResult, Partial, Value};

/// Supplier merging a fixed list of suppliers into one partial.
///
/// Members are merged in list order at construction, so later members
/// override earlier ones on conflicting paths. The aggregate owns its
/// members and closes them when closed.
pub struct AggregateSupplier {
    members: Vec<Box<dyn Supplier>>,
    snapshot: Snapshot,
}

impl AggregateSupplier {
    /// Merge the full partials of the members.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while reading a member.
    pub fn new(members: Vec<Box<dyn Supplier>>) -> ConfigResult<Self> {
        let mut partial = Partial::new();
        for member in &members {
            match member.get("")? {
                Value::Partial(tree) => partial.merge(&tree),
                other => return Err(ConfigError::conversion("", "partial", other.type_name())),
            }
        }

        debug!(members = members.len(), "aggregated configuration suppliers");
        Ok(Self {
            members,
            snapshot: Snapshot::new(partial),
        })
    }

    /// Number of aggregated suppliers.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if no supplier is aggregated.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl std::fmt::Debug for AggregateSupplier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateSupplier")
            .field("members", &self.members.len())
            .field("snapshot", &self.snapshot)
            .finish()
    }
}

impl Supplier for AggregateSupplier {
    fn get(&self, path: &str) -> ConfigResult<Value> {
        self.snapshot.get(path)
    }

    fn get_or(&self, path: &str, default: Value) -> ConfigResult<Value> {
        self.snapshot.get_or(path, default)
    }

    fn has(&self, path: &str) -> bool {
        self.snapshot.has(path)
    }

    fn close(&self) -> ConfigResult<()> {
        let mut first = None;
        for member in &self.members {
            if let Err(e) = member.close() {
                warn!(error = %e, "failed to close aggregated supplier");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

/// Creates [`AggregateSupplier`]s from `type: aggregate` descriptions.
///
/// Every item of the `suppliers` list is itself a description resolved
/// through the factory.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateSupplierCreator;

impl SupplierCreator for AggregateSupplierCreator {
    fn accept(&self, description: &Partial) -> bool {
        description_type(description).as_deref() == Some("aggregate")
    }

    fn create<'a>(
        &'a self,
        description: &'a Partial,
        factory: &'a SupplierFactory,
    ) -> BoxFuture<'a, ConfigResult<Box<dyn Supplier>>> {
        Box::pin(async move {
            let items = description
                .list_or("suppliers", Vec::new())
                .map_err(|_| ConfigError::invalid_supplier("field \"suppliers\" must be a list"))?;

            let mut members = Vec::with_capacity(items.len());
            for item in &items {
                members.push(factory.create(item.as_partial()).await?);
            }

            let supplier = AggregateSupplier::new(members)?;
            Ok(Box::new(supplier) as Box<dyn Supplier>)
        })
    }
}
