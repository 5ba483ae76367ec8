//! The configuration engine.
//!
//! A [`Config`] merges the partials of its registered suppliers by priority
//! into one read view, notifies observers when observed values change, and
//! optionally polls observable suppliers in a background tokio task.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{ConfigError, ConfigOptions, ConfigResult, Partial, Supplier, Value};

type Callback = Box<dyn Fn(&Value, &Value) + Send + Sync>;

struct Registration {
    id: String,
    priority: i32,
    supplier: Arc<dyn Supplier>,
}

struct Observer {
    path: String,
    current: Value,
    callback: Callback,
}

#[derive(Default)]
struct State {
    // registration order
    suppliers: Vec<Registration>,
    merged: Partial,
    observers: Vec<Observer>,
    last_reload_error: Option<String>,
}

impl State {
    fn position(&self, id: &str) -> Option<usize> {
        self.suppliers.iter().position(|registration| registration.id == id)
    }

    /// Merge every supplier in ascending priority, then notify observers.
    fn rebuild(&mut self) {
        let mut ordered: Vec<&Registration> = self.suppliers.iter().collect();
        ordered.sort_by_key(|registration| registration.priority);

        let mut merged = Partial::new();
        for registration in ordered {
            match registration.supplier.get("") {
                Ok(Value::Partial(partial)) => merged.merge(&partial),
                Ok(other) => warn!(
                    supplier_id = %registration.id,
                    found = other.type_name(),
                    "configuration supplier root is not a partial, skipping"
                ),
                Err(e) => warn!(
                    supplier_id = %registration.id,
                    error = %e,
                    "failed to read configuration supplier, skipping"
                ),
            }
        }

        self.merged = merged;
        self.notify();
    }

    fn notify(&mut self) {
        for observer in &mut self.observers {
            let value = self.merged.get(&observer.path).unwrap_or(Value::Null);
            if value != observer.current {
                debug!(path = %observer.path, "observed configuration value changed");
                (observer.callback)(&observer.current, &value);
                observer.current = value;
            }
        }
    }
}

struct Poller {
    shutdown: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl Poller {
    fn spawn(handle: &Handle, state: Arc<Mutex<State>>, period: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = handle.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // the first tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        // failures are logged and recorded by the cycle
                        let _ = reload_cycle(&state).await;
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("configuration poller received shutdown signal");
                        break;
                    }
                }
            }
        });

        info!(interval_ms = period.as_millis(), "configuration poller started");
        Self { shutdown, task }
    }

    fn stop(self) {
        let _ = self.shutdown.try_send(());
        self.task.abort();
    }
}

/// One poll cycle: reload every observable supplier outside the Config lock,
/// then rebuild once if any of them changed.
async fn reload_cycle(state: &Mutex<State>) -> ConfigResult<bool> {
    let observables: Vec<(String, Arc<dyn Supplier>)> = {
        let state = state.lock();
        state
            .suppliers
            .iter()
            .filter(|registration| registration.supplier.as_observable().is_some())
            .map(|registration| (registration.id.clone(), registration.supplier.clone()))
            .collect()
    };

    let mut changed = false;
    let mut first_error = None;
    for (id, supplier) in &observables {
        let Some(observable) = supplier.as_observable() else {
            continue;
        };
        match observable.reload().await {
            Ok(true) => {
                debug!(supplier_id = %id, "configuration supplier changed");
                changed = true;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(supplier_id = %id, error = %e, "failed to reload configuration supplier");
                first_error.get_or_insert(e);
            }
        }
    }

    let mut state = state.lock();
    if changed {
        state.rebuild();
        info!("configuration rebuilt after reload");
    }
    state.last_reload_error = first_error.as_ref().map(ToString::to_string);

    match first_error {
        Some(e) => Err(e),
        None => Ok(changed),
    }
}

/// Prioritized merge of configuration suppliers.
///
/// Suppliers with a higher priority override lower ones on conflicting
/// paths; equal priorities keep registration order, later winning.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use strata_config::{Config, Partial, PartialSupplier};
///
/// let mut defaults = Partial::new();
/// defaults.set("server.port", 8080).unwrap();
/// let mut overrides = Partial::new();
/// overrides.set("server.port", 9090).unwrap();
///
/// let config = Config::default();
/// config.add_supplier("defaults", 0, Arc::new(PartialSupplier::new(defaults))).unwrap();
/// config.add_supplier("overrides", 10, Arc::new(PartialSupplier::new(overrides))).unwrap();
///
/// assert_eq!(config.int("server.port").unwrap(), 9090);
/// ```
pub struct Config {
    state: Arc<Mutex<State>>,
    poller: Mutex<Option<Poller>>,
}

impl Config {
    /// Create an empty configuration.
    ///
    /// A non-zero poll interval spawns the background reload task on the
    /// current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Runtime` if polling is requested outside of a
    /// tokio runtime.
    pub fn new(options: ConfigOptions) -> ConfigResult<Self> {
        let state = Arc::new(Mutex::new(State::default()));

        let poller = if options.poll_interval.is_zero() {
            None
        } else {
            let handle = Handle::try_current().map_err(|e| ConfigError::Runtime(e.to_string()))?;
            Some(Poller::spawn(&handle, state.clone(), options.poll_interval))
        };

        Ok(Self {
            state,
            poller: Mutex::new(poller),
        })
    }

    /// Register a supplier and rebuild the merged view.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::DuplicateSupplier` if the id is taken; the
    /// registered supplier and the rejected one are left untouched.
    pub fn add_supplier(
        &self,
        id: impl Into<String>,
        priority: i32,
        supplier: Arc<dyn Supplier>,
    ) -> ConfigResult<()> {
        let id = id.into();
        let mut state = self.state.lock();
        if state.position(&id).is_some() {
            return Err(ConfigError::duplicate_supplier(id));
        }

        info!(supplier_id = %id, priority, "configuration supplier registered");
        state.suppliers.push(Registration {
            id,
            priority,
            supplier,
        });
        state.rebuild();
        Ok(())
    }

    /// Unregister and close a supplier, then rebuild. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns the error raised while closing the supplier.
    pub fn remove_supplier(&self, id: &str) -> ConfigResult<()> {
        let registration = {
            let mut state = self.state.lock();
            let Some(index) = state.position(id) else {
                return Ok(());
            };
            let registration = state.suppliers.remove(index);
            state.rebuild();
            registration
        };

        info!(supplier_id = %id, "configuration supplier removed");
        registration.supplier.close()
    }

    /// Unregister and close every supplier, then rebuild to an empty view.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while closing; every supplier is
    /// closed regardless.
    pub fn remove_all_suppliers(&self) -> ConfigResult<()> {
        let registrations = {
            let mut state = self.state.lock();
            let registrations = std::mem::take(&mut state.suppliers);
            state.rebuild();
            registrations
        };

        close_all(registrations)
    }

    /// Check whether a supplier is registered under the id.
    pub fn has_supplier(&self, id: &str) -> bool {
        self.state.lock().position(id).is_some()
    }

    /// Change the priority of a supplier and rebuild.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::SupplierNotFound` if the id is unknown.
    pub fn supplier_priority(&self, id: &str, priority: i32) -> ConfigResult<()> {
        let mut state = self.state.lock();
        let index = state
            .position(id)
            .ok_or_else(|| ConfigError::supplier_not_found(id))?;

        state.suppliers[index].priority = priority;
        debug!(supplier_id = %id, priority, "configuration supplier priority changed");
        state.rebuild();
        Ok(())
    }

    /// Watch a path. The callback receives `(old, new)` each time a rebuild
    /// changes the value at the path; a vanished path is reported as
    /// [`Value::Null`].
    ///
    /// Callbacks run inside the rebuild and must not call back into the
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::PathNotFound` if the path does not resolve now.
    pub fn add_observer<F>(&self, path: impl Into<String>, callback: F) -> ConfigResult<()>
    where
        F: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        let path = path.into();
        let mut state = self.state.lock();
        let current = state.merged.get(&path)?;

        state.observers.push(Observer {
            path,
            current,
            callback: Box::new(callback),
        });
        Ok(())
    }

    /// Drop every observer of a path. Returns true if any was registered.
    pub fn remove_observer(&self, path: &str) -> bool {
        let mut state = self.state.lock();
        let before = state.observers.len();
        state.observers.retain(|observer| observer.path != path);
        state.observers.len() != before
    }

    fn view<T>(&self, read: impl FnOnce(&Partial) -> T) -> T {
        read(&self.state.lock().merged)
    }

    /// Copy of the value at the path.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::PathNotFound` if the path does not resolve.
    pub fn get(&self, path: &str) -> ConfigResult<Value> {
        self.view(|merged| merged.get(path))
    }

    /// Copy of the value at the path, or the default if absent.
    ///
    /// Reading the merged view does not fail; the `Result` matches
    /// [`Supplier::get_or`].
    pub fn get_or(&self, path: &str, default: impl Into<Value>) -> ConfigResult<Value> {
        self.view(|merged| merged.get_or(path, default))
    }

    /// Check whether the path resolves.
    pub fn has(&self, path: &str) -> bool {
        self.view(|merged| merged.has(path))
    }

    /// Boolean at the path.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::PathNotFound` or `ConfigError::Conversion`.
    pub fn bool(&self, path: &str) -> ConfigResult<bool> {
        self.view(|merged| merged.bool(path))
    }

    /// Boolean at the path, or the default if absent.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Conversion` if the stored value is not a boolean.
    pub fn bool_or(&self, path: &str, default: bool) -> ConfigResult<bool> {
        self.view(|merged| merged.bool_or(path, default))
    }

    /// Integer at the path.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::PathNotFound` or `ConfigError::Conversion`.
    pub fn int(&self, path: &str) -> ConfigResult<i64> {
        self.view(|merged| merged.int(path))
    }

    /// Integer at the path, or the default if absent.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Conversion` if the stored value is not an integer.
    pub fn int_or(&self, path: &str, default: i64) -> ConfigResult<i64> {
        self.view(|merged| merged.int_or(path, default))
    }

    /// Float at the path. Integers are widened.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::PathNotFound` or `ConfigError::Conversion`.
    pub fn float(&self, path: &str) -> ConfigResult<f64> {
        self.view(|merged| merged.float(path))
    }

    /// Float at the path, or the default if absent.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Conversion` if the stored value is not numeric.
    pub fn float_or(&self, path: &str, default: f64) -> ConfigResult<f64> {
        self.view(|merged| merged.float_or(path, default))
    }

    /// String at the path.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::PathNotFound` or `ConfigError::Conversion`.
    pub fn string(&self, path: &str) -> ConfigResult<String> {
        self.view(|merged| merged.string(path))
    }

    /// String at the path, or the default if absent.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Conversion` if the stored value is not a string.
    pub fn string_or(&self, path: &str, default: &str) -> ConfigResult<String> {
        self.view(|merged| merged.string_or(path, default))
    }

    /// List at the path.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::PathNotFound` or `ConfigError::Conversion`.
    pub fn list(&self, path: &str) -> ConfigResult<Vec<Value>> {
        self.view(|merged| merged.list(path))
    }

    /// List at the path, or the default if absent.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Conversion` if the stored value is not a list.
    pub fn list_or(&self, path: &str, default: Vec<Value>) -> ConfigResult<Vec<Value>> {
        self.view(|merged| merged.list_or(path, default))
    }

    /// Partial at the path. The empty path returns the whole merged view.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::PathNotFound` or `ConfigError::Conversion`.
    pub fn partial(&self, path: &str) -> ConfigResult<Partial> {
        self.view(|merged| merged.partial(path))
    }

    /// Partial at the path, or the default if absent.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Conversion` if the stored value is not a partial.
    pub fn partial_or(&self, path: &str, default: Partial) -> ConfigResult<Partial> {
        self.view(|merged| merged.partial_or(path, default))
    }

    /// Overlay the partial at the path onto a struct.
    ///
    /// See [`Partial::populate`].
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::PathNotFound` if the path does not resolve and
    /// `ConfigError::Populate` if a field does not fit its stored value.
    pub fn populate<T>(&self, path: &str, target: T) -> ConfigResult<T>
    where
        T: Serialize + DeserializeOwned,
    {
        self.view(|merged| merged.populate(path, target))
    }

    /// Run one reload cycle now: reload every observable supplier and
    /// rebuild if any changed. Returns whether a rebuild happened.
    ///
    /// # Errors
    ///
    /// Returns the first supplier reload error of the cycle, after every
    /// supplier was reloaded and the rebuild ran.
    pub async fn reload(&self) -> ConfigResult<bool> {
        reload_cycle(&self.state).await
    }

    /// Error message of the last reload cycle, if it failed.
    pub fn last_reload_error(&self) -> Option<String> {
        self.state.lock().last_reload_error.clone()
    }

    /// Whether the background reload task is running.
    pub fn is_polling(&self) -> bool {
        self.poller.lock().is_some()
    }

    /// Stop the poller, then unregister and close every supplier in
    /// registration order.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while closing; every supplier is
    /// closed regardless.
    pub fn close(&self) -> ConfigResult<()> {
        self.stop_poller();

        let registrations = {
            let mut state = self.state.lock();
            state.observers.clear();
            state.merged = Partial::new();
            std::mem::take(&mut state.suppliers)
        };

        info!(suppliers = registrations.len(), "closing configuration");
        close_all(registrations)
    }

    fn stop_poller(&self) {
        if let Some(poller) = self.poller.lock().take() {
            poller.stop();
            debug!("configuration poller stopped");
        }
    }
}

fn close_all(registrations: Vec<Registration>) -> ConfigResult<()> {
    let mut first = None;
    for registration in registrations {
        if let Err(e) = registration.supplier.close() {
            warn!(supplier_id = %registration.id, error = %e, "failed to close configuration supplier");
            first.get_or_insert(e);
        }
    }
    first.map_or(Ok(()), Err)
}

impl Default for Config {
    /// An empty configuration without background polling.
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            poller: Mutex::new(None),
        }
    }
}

impl Drop for Config {
    fn drop(&mut self) {
        self.stop_poller();
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        let suppliers: Vec<(&str, i32)> = state
            .suppliers
            .iter()
            .map(|registration| (registration.id.as_str(), registration.priority))
            .collect();

        f.debug_struct("Config")
            .field("suppliers", &suppliers)
            .field("observers", &state.observers.len())
            .field("polling", &self.poller.lock().is_some())
            .finish()
    }
}
