//! Configuration values.
//!
//! [`Value`] is the tagged union stored in a [`Partial`]. Decoder output of
//! any self-describing format is normalized into it through [`convert`].

use std::fmt;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::{ConfigError, ConfigResult, Partial};

// Key the toml crate uses to smuggle datetimes through `deserialize_any`.
const TOML_DATETIME_KEY: &str = "$__toml_private_datetime";

/// A configuration value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Explicit null. Present, but holding nothing.
    #[default]
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Floating point scalar.
    Float(f64),
    /// String scalar.
    String(String),
    /// Ordered list of values.
    List(Vec<Value>),
    /// Nested partial.
    Partial(Partial),
}

impl Value {
    /// Name of the stored type, used in conversion errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Partial(_) => "partial",
        }
    }

    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrow the boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrow the integer, if this is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Read a float. Integers widen.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Borrow the string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the list, if this is one.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow the partial, if this is one.
    pub fn as_partial(&self) -> Option<&Partial> {
        match self {
            Self::Partial(p) => Some(p),
            _ => None,
        }
    }

    pub(crate) fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Partial(p) => serde_json::Value::Object(
                p.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => write!(f, "{s}"),
            Self::List(_) | Self::Partial(_) => write!(f, "{}", self.to_json()),
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Self::Int(i64::from(v))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Partial> for Value {
    fn from(v: Partial) -> Self {
        Self::Partial(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::String(s) => serializer.serialize_str(s),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Partial(p) => p.serialize(serializer),
        }
    }
}

impl Serialize for Partial {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Deserializing a [`Value`] is the normalization step: maps become
/// partials with lower-cased string keys whatever the key type was.
impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

impl<'de> Deserialize<'de> for Partial {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Partial(p) => Ok(p),
            Value::Null => Ok(Partial::new()),
            other => Err(de::Error::invalid_type(
                de::Unexpected::Other(other.type_name()),
                &"a map",
            )),
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a configuration value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Int(v))
    }

    #[allow(clippy::cast_precision_loss)]
    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        Ok(i64::try_from(v).map_or(Value::Float(v as f64), Value::Int))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        Value::deserialize(deserializer)
    }

    fn visit_newtype_struct<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> Result<Value, D::Error> {
        Value::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<Value>()? {
            items.push(item);
        }
        Ok(Value::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
        let mut partial = Partial::new();
        while let Some(MapKey(key)) = map.next_key::<MapKey>()? {
            let value = map.next_value::<Value>()?;
            partial.insert(key, value);
        }

        if partial.len() == 1 {
            if let Some(Value::String(datetime)) = partial.lookup(TOML_DATETIME_KEY) {
                return Ok(Value::String(datetime.clone()));
            }
        }

        Ok(Value::Partial(partial))
    }
}

/// Map key of any scalar type, stringified and lower-cased.
struct MapKey(String);

impl<'de> Deserialize<'de> for MapKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MapKeyVisitor)
    }
}

struct MapKeyVisitor;

impl Visitor<'_> for MapKeyVisitor {
    type Value = MapKey;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a scalar map key")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<MapKey, E> {
        Ok(MapKey(v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<MapKey, E> {
        Ok(MapKey(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<MapKey, E> {
        Ok(MapKey(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<MapKey, E> {
        Ok(MapKey(v.to_string()))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<MapKey, E> {
        Ok(MapKey(lower_key(v)))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<MapKey, E> {
        Ok(MapKey(lower_key(&v)))
    }
}

fn lower_key(key: &str) -> String {
    if key == TOML_DATETIME_KEY {
        key.to_string()
    } else {
        key.to_lowercase()
    }
}

/// Normalize generic decoder output into a [`Value`].
///
/// Accepts anything that is a self-describing serde deserializer, which
/// covers the value types of `serde_json`, `serde_yaml` and `toml`. Maps with
/// any scalar key type become partials keyed by lower-cased strings, and
/// lists are normalized element by element.
///
/// # Example
///
/// ```
/// use strata_config::{convert, Value};
///
/// let json = serde_json::json!({"Server": {"Port": 8080}});
/// let value = convert(json).unwrap();
/// let partial = value.as_partial().unwrap();
/// assert_eq!(partial.int("server.port").unwrap(), 8080);
/// ```
pub fn convert<'de, D>(input: D) -> ConfigResult<Value>
where
    D: Deserializer<'de>,
    D::Error: fmt::Display,
{
    Value::deserialize(input).map_err(|e| ConfigError::parse("generic", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_lowercases_nested_keys() {
        let json = serde_json::json!({
            "Server": {"HTTP_Addr": "0.0.0.0", "Ports": [80, {"TLS": true}]}
        });

        let value = convert(json).unwrap();
        let partial = value.as_partial().unwrap();

        assert_eq!(partial.string("server.http_addr").unwrap(), "0.0.0.0");
        let ports = partial.list("server.ports").unwrap();
        assert_eq!(ports[0], Value::Int(80));
        assert!(ports[1].as_partial().unwrap().bool("tls").unwrap());
    }

    #[test]
    fn test_convert_yaml_non_string_keys() {
        let yaml: serde_yaml::Value = serde_yaml::from_str("1: one\ntrue: yes\nName: x\n").unwrap();

        let value = convert(yaml).unwrap();
        let partial = value.as_partial().unwrap();

        assert_eq!(partial.string("1").unwrap(), "one");
        assert_eq!(partial.string("true").unwrap(), "yes");
        assert_eq!(partial.string("name").unwrap(), "x");
    }

    #[test]
    fn test_convert_toml_datetime_becomes_string() {
        let toml: toml::Value = toml::from_str("released = 2024-01-02T03:04:05Z").unwrap();

        let value = convert(toml).unwrap();

        assert_eq!(
            value.as_partial().unwrap().string("released").unwrap(),
            "2024-01-02T03:04:05Z"
        );
    }

    #[test]
    fn test_convert_scalars() {
        assert_eq!(convert(serde_json::json!(null)).unwrap(), Value::Null);
        assert_eq!(convert(serde_json::json!(1.5)).unwrap(), Value::Float(1.5));
        assert_eq!(convert(serde_json::json!(u64::MAX)).unwrap(), Value::Float(u64::MAX as f64));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::from(3).type_name(), "int");
        assert_eq!(Value::from("x").type_name(), "string");
        assert_eq!(Value::from(vec![1, 2]).type_name(), "list");
        assert_eq!(Value::from(Partial::new()).type_name(), "partial");
    }

    #[test]
    fn test_float_widens_int() {
        assert_eq!(Value::Int(2).as_float(), Some(2.0));
        assert_eq!(Value::String("2".into()).as_float(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from("text").to_string(), "text");
        assert_eq!(Value::from(vec![1, 2]).to_string(), "[1,2]");
    }
}
