//! The nested configuration tree.
//!
//! A [`Partial`] maps string keys to [`Value`]s, where a value can itself be a
//! partial. Nodes are addressed with dotted paths (`server.http.port`); empty
//! segments are ignored, so `a...b` and `a.b` address the same node and the
//! empty path addresses the whole tree.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{ConfigError, ConfigResult, Value};

/// Nested key/value configuration tree.
///
/// # Example
///
/// ```
/// use strata_config::Partial;
///
/// let mut partial = Partial::new();
/// partial.set("server.port", 8080).unwrap();
///
/// assert_eq!(partial.int("server.port").unwrap(), 8080);
/// assert_eq!(partial.int_or("server.workers", 4).unwrap(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Partial {
    entries: BTreeMap<String, Value>,
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|segment| !segment.is_empty())
}

fn is_root(path: &str) -> bool {
    segments(path).next().is_none()
}

impl Partial {
    /// Create an empty partial.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of top-level entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the partial has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top-level keys in sorted order.
    pub fn entries(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Iterate over the top-level entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub(crate) fn insert(&mut self, key: String, value: Value) {
        self.entries.insert(key, value);
    }

    pub(crate) fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = segments(path);
        let mut current = self.entries.get(segments.next()?)?;
        for segment in segments {
            current = current.as_partial()?.entries.get(segment)?;
        }
        Some(current)
    }

    /// Check whether the path resolves to a value (a stored null counts).
    pub fn has(&self, path: &str) -> bool {
        is_root(path) || self.lookup(path).is_some()
    }

    /// Get a copy of the value stored at the path.
    ///
    /// The empty path returns the whole tree.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::PathNotFound` if nothing is stored at the path.
    pub fn get(&self, path: &str) -> ConfigResult<Value> {
        if is_root(path) {
            return Ok(Value::Partial(self.clone()));
        }
        self.lookup(path)
            .cloned()
            .ok_or_else(|| ConfigError::path_not_found(path))
    }

    /// Get a copy of the value stored at the path, or the default if absent.
    pub fn get_or(&self, path: &str, default: impl Into<Value>) -> ConfigResult<Value> {
        match self.get(path) {
            Err(ConfigError::PathNotFound { .. }) => Ok(default.into()),
            other => other,
        }
    }

    /// Store a value at the path, creating intermediate partials as needed.
    ///
    /// Non-partial values met along the path are replaced by partials.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::EmptyPath` if the path has no segment.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> ConfigResult<&mut Self> {
        let segments: Vec<&str> = segments(path).collect();
        let (last, parents) = segments.split_last().ok_or(ConfigError::EmptyPath)?;

        let mut node = &mut *self;
        for segment in parents {
            node = node.child_mut(segment);
        }
        node.entries.insert((*last).to_string(), value.into());

        Ok(self)
    }

    fn child_mut(&mut self, key: &str) -> &mut Partial {
        let slot = self.entries.entry(key.to_string()).or_default();
        if !matches!(slot, Value::Partial(_)) {
            *slot = Value::Partial(Partial::new());
        }
        match slot {
            Value::Partial(child) => child,
            _ => unreachable!("slot holds a partial"),
        }
    }

    fn fetch<T>(
        &self,
        path: &str,
        default: Option<T>,
        expected: &'static str,
        extract: impl FnOnce(&Value) -> Option<T>,
    ) -> ConfigResult<T> {
        let root;
        let value = if is_root(path) {
            root = Value::Partial(self.clone());
            &root
        } else {
            match self.lookup(path) {
                Some(value) => value,
                None => return default.ok_or_else(|| ConfigError::path_not_found(path)),
            }
        };
        extract(value).ok_or_else(|| ConfigError::conversion(path, expected, value.type_name()))
    }

    /// Get a boolean.
    pub fn bool(&self, path: &str) -> ConfigResult<bool> {
        self.fetch(path, None, "bool", Value::as_bool)
    }

    /// Get a boolean, or the default if absent.
    pub fn bool_or(&self, path: &str, default: bool) -> ConfigResult<bool> {
        self.fetch(path, Some(default), "bool", Value::as_bool)
    }

    /// Get an integer.
    pub fn int(&self, path: &str) -> ConfigResult<i64> {
        self.fetch(path, None, "int", Value::as_int)
    }

    /// Get an integer, or the default if absent.
    pub fn int_or(&self, path: &str, default: i64) -> ConfigResult<i64> {
        self.fetch(path, Some(default), "int", Value::as_int)
    }

    /// Get a float. Stored integers are widened.
    pub fn float(&self, path: &str) -> ConfigResult<f64> {
        self.fetch(path, None, "float", Value::as_float)
    }

    /// Get a float, or the default if absent.
    pub fn float_or(&self, path: &str, default: f64) -> ConfigResult<f64> {
        self.fetch(path, Some(default), "float", Value::as_float)
    }

    /// Get a string.
    pub fn string(&self, path: &str) -> ConfigResult<String> {
        self.fetch(path, None, "string", |v| v.as_str().map(str::to_string))
    }

    /// Get a string, or the default if absent.
    pub fn string_or(&self, path: &str, default: &str) -> ConfigResult<String> {
        self.fetch(path, Some(default.to_string()), "string", |v| {
            v.as_str().map(str::to_string)
        })
    }

    /// Get a list.
    pub fn list(&self, path: &str) -> ConfigResult<Vec<Value>> {
        self.fetch(path, None, "list", |v| v.as_list().map(<[Value]>::to_vec))
    }

    /// Get a list, or the default if absent.
    pub fn list_or(&self, path: &str, default: Vec<Value>) -> ConfigResult<Vec<Value>> {
        self.fetch(path, Some(default), "list", |v| v.as_list().map(<[Value]>::to_vec))
    }

    /// Get a nested partial.
    pub fn partial(&self, path: &str) -> ConfigResult<Partial> {
        self.fetch(path, None, "partial", |v| v.as_partial().cloned())
    }

    /// Get a nested partial, or the default if absent.
    pub fn partial_or(&self, path: &str, default: Partial) -> ConfigResult<Partial> {
        self.fetch(path, Some(default), "partial", |v| v.as_partial().cloned())
    }

    /// Overlay `other` onto this partial.
    ///
    /// Where both sides hold a partial the merge recurses; otherwise the value
    /// from `other` replaces ours.
    pub fn merge(&mut self, other: &Partial) {
        for (key, value) in &other.entries {
            match (self.entries.get_mut(key), value) {
                (Some(Value::Partial(mine)), Value::Partial(theirs)) => mine.merge(theirs),
                _ => {
                    self.entries.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// Copy the values stored under `path` into `target`.
    ///
    /// Fields are matched by name, ignoring ASCII case, and nested structs are
    /// populated recursively. Fields with no matching key keep their current
    /// value.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::PathNotFound` if nothing is stored at the path, and
    /// `ConfigError::Populate` if a stored value does not fit its field.
    ///
    /// # Example
    ///
    /// ```
    /// use serde::{Deserialize, Serialize};
    /// use strata_config::Partial;
    ///
    /// #[derive(Serialize, Deserialize)]
    /// struct Server {
    ///     host: String,
    ///     port: u16,
    /// }
    ///
    /// let mut partial = Partial::new();
    /// partial.set("server.port", 9000).unwrap();
    ///
    /// let server = partial
    ///     .populate("server", Server { host: "localhost".into(), port: 80 })
    ///     .unwrap();
    /// assert_eq!(server.host, "localhost");
    /// assert_eq!(server.port, 9000);
    /// ```
    pub fn populate<T>(&self, path: &str, target: T) -> ConfigResult<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let source = self.get(path)?;
        let populate_error = |e: serde_json::Error| ConfigError::Populate {
            path: path.to_string(),
            message: e.to_string(),
        };

        let mut current = serde_json::to_value(&target).map_err(populate_error)?;
        overlay(&mut current, &source);
        serde_json::from_value(current).map_err(populate_error)
    }
}

fn overlay(target: &mut serde_json::Value, source: &Value) {
    match (target, source) {
        (serde_json::Value::Object(fields), Value::Partial(partial)) => {
            for (key, value) in partial.iter() {
                let field = fields
                    .keys()
                    .find(|name| name.eq_ignore_ascii_case(key))
                    .cloned()
                    .unwrap_or_else(|| key.clone());
                match fields.get_mut(&field) {
                    Some(slot) => overlay(slot, value),
                    None => {
                        fields.insert(field, value.to_json());
                    }
                }
            }
        }
        (target, source) => *target = source.to_json(),
    }
}

impl FromIterator<(String, Value)> for Partial {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
