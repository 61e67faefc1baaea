//! The dynamic value tree produced by decoding and consumed by encoding.
//!
//! # Design
//! `Value` mirrors JSON with two additions. `Object` is a record read through
//! a registered schema: it remembers its type name, and a field that was
//! missing or `null` on the wire is simply not present. `Custom` holds a Rust
//! value produced by an extension adapter (a `chrono::NaiveDate`, a
//! `uuid::Uuid`, ...) and compares with that type's own `PartialEq`.
//!
//! Integers keep their integral identity: `12` decodes as `Integer(12)`,
//! never as `Float(12.0)`. `Integer` and `Unsigned` compare by numeric
//! value, so `Unsigned(5) == Integer(5)`; integers never equal floats.
//!
//! A `null` object field is equivalent to a missing one: it is skipped on
//! encode, and `Object` equality ignores it.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

/// Insertion-ordered string-keyed fields.
pub type Fields = IndexMap<String, Value>;

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    /// Integers above `i64::MAX`. Decoding never produces a smaller one, and
    /// a smaller one equals the `Integer` of the same value.
    Unsigned(u64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Map(Fields),
    Object(Object),
    Custom(CustomValue),
}

impl Value {
    /// Builds a `Map` from key/value pairs, keeping their order.
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) | Value::Unsigned(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
            Value::Custom(_) => "custom value",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Unsigned(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            Value::Unsigned(u) => Some(*u as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Fields> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Field `key` of a `Map` or `Object`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(map) => map.get(key),
            Value::Object(object) => object.get(key),
            _ => None,
        }
    }

    fn integral(&self) -> Option<i128> {
        match self {
            Value::Integer(i) => Some((*i).into()),
            Value::Unsigned(u) => Some((*u).into()),
            _ => None,
        }
    }

    /// The Rust value inside a `Custom`, if it is a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Custom(custom) => custom.downcast_ref(),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(_) | Value::Unsigned(_), Value::Integer(_) | Value::Unsigned(_)) => {
                self.integral() == other.integral()
            }
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Custom(a), Value::Custom(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i.into())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        match i64::try_from(u) {
            Ok(i) => Value::Integer(i),
            Err(_) => Value::Unsigned(u),
        }
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(object)
    }
}

impl From<CustomValue> for Value {
    fn from(custom: CustomValue) -> Self {
        Value::Custom(custom)
    }
}

/// A record read through a registered object schema.
///
/// Two objects are equal when their type names match and their non-null
/// fields match, in any order.
#[derive(Debug, Clone)]
pub struct Object {
    type_name: String,
    fields: Fields,
}

impl Object {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Fields::new(),
        }
    }

    /// Builder-style `insert`.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        fn present(fields: &Fields) -> impl Iterator<Item = (&String, &Value)> {
            fields.iter().filter(|(_, value)| !value.is_null())
        }
        self.type_name == other.type_name
            && present(&self.fields).count() == present(&other.fields).count()
            && present(&self.fields).all(|(name, value)| other.fields.get(name) == Some(value))
    }
}

trait DynCustom: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn eq_dyn(&self, other: &dyn DynCustom) -> bool;
}

impl<T> DynCustom for T
where
    T: Any + fmt::Debug + PartialEq + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_dyn(&self, other: &dyn DynCustom) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }
}

/// A value owned by an extension adapter, tagged with the name the adapter
/// is registered under.
#[derive(Clone)]
pub struct CustomValue {
    type_name: Arc<str>,
    inner: Arc<dyn DynCustom>,
}

impl CustomValue {
    pub fn new<T>(type_name: &str, value: T) -> Self
    where
        T: Any + fmt::Debug + PartialEq + Send + Sync,
    {
        Self {
            type_name: Arc::from(type_name),
            inner: Arc::new(value),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (*self.inner).as_any().downcast_ref()
    }
}

impl PartialEq for CustomValue {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name && (*self.inner).eq_dyn(&*other.inner)
    }
}

impl fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.type_name, &*self.inner)
    }
}
