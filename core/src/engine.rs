//! The configured JSON engine: `serde_json` plus a registry of named types.
//!
//! # Design
//! `serde_json` does the text work (parsing and writing). On top of it the
//! engine keeps one registry keyed by type name, where each name is either an
//! object schema (a record read field by field) or a value adapter (a custom
//! Rust value such as a date). Reading walks a `serde_json::Value` against a
//! `TypeDescriptor`; writing walks a `Value` the other way.
//!
//! The registry is filled through `EngineBuilder` and frozen by `build`.
//! Registering a name twice keeps the later entry.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Number, Value as JsonValue};
use tracing::{debug, trace};

use crate::config::CodecConfig;
use crate::descriptor::{Bindings, TypeDescriptor};
use crate::error::{BoxError, DecodeError, EncodeError};
use crate::extension::Extension;
use crate::value::{CustomValue, Fields, Object, Value};

/// Reads and writes one custom value type.
pub trait ValueAdapter: Send + Sync {
    /// Name the adapter is registered under and that its values carry.
    fn type_name(&self) -> &str;

    fn read(&self, json: &JsonValue) -> Result<CustomValue, BoxError>;

    fn write(&self, value: &CustomValue) -> Result<JsonValue, BoxError>;
}

/// A `ValueAdapter` built from two plain functions.
pub struct FnAdapter<T> {
    type_name: String,
    read: fn(&JsonValue) -> Result<T, BoxError>,
    write: fn(&T) -> Result<JsonValue, BoxError>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> FnAdapter<T> {
    pub fn new(
        type_name: impl Into<String>,
        read: fn(&JsonValue) -> Result<T, BoxError>,
        write: fn(&T) -> Result<JsonValue, BoxError>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            read,
            write,
            _marker: PhantomData,
        }
    }
}

impl<T> ValueAdapter for FnAdapter<T>
where
    T: Any + fmt::Debug + PartialEq + Send + Sync,
{
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn read(&self, json: &JsonValue) -> Result<CustomValue, BoxError> {
        Ok(CustomValue::new(&self.type_name, (self.read)(json)?))
    }

    fn write(&self, value: &CustomValue) -> Result<JsonValue, BoxError> {
        let inner = value.downcast_ref::<T>().ok_or_else(|| {
            format!(
                "value tagged `{}` is not a {}",
                value.type_name(),
                std::any::type_name::<T>()
            )
        })?;
        (self.write)(inner)
    }
}

/// A record type: ordered fields, each with a descriptor that may refer to
/// the schema's type parameters as `$Name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSchema {
    name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    params: Vec<String>,
    fields: IndexMap<String, TypeDescriptor>,
}

impl ObjectSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            fields: IndexMap::new(),
        }
    }

    /// Declares a type parameter.
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(name.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, ty: TypeDescriptor) -> Self {
        self.fields.insert(name.into(), ty);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn fields(&self) -> &IndexMap<String, TypeDescriptor> {
        &self.fields
    }
}

#[derive(Clone)]
enum Registered {
    Adapter(Arc<dyn ValueAdapter>),
    Object(Arc<ObjectSchema>),
}

/// Collects registrations before the engine is frozen.
#[derive(Default)]
pub struct EngineBuilder {
    types: HashMap<String, Registered>,
    fail_on_unknown_properties: bool,
    pretty_print: bool,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn adapter<A: ValueAdapter + 'static>(&mut self, adapter: A) -> &mut Self {
        let name = adapter.type_name().to_string();
        self.register(name, Registered::Adapter(Arc::new(adapter)));
        self
    }

    pub fn object(&mut self, schema: ObjectSchema) -> &mut Self {
        let name = schema.name().to_string();
        self.register(name, Registered::Object(Arc::new(schema)));
        self
    }

    /// Runs the extension's registration hook against this builder.
    pub fn extension(&mut self, extension: &dyn Extension) -> &mut Self {
        extension.register(self);
        self
    }

    pub fn fail_on_unknown_properties(&mut self, enabled: bool) -> &mut Self {
        self.fail_on_unknown_properties = enabled;
        self
    }

    pub fn pretty_print(&mut self, enabled: bool) -> &mut Self {
        self.pretty_print = enabled;
        self
    }

    pub fn build(&mut self) -> JsonEngine {
        JsonEngine {
            types: std::mem::take(&mut self.types),
            fail_on_unknown_properties: self.fail_on_unknown_properties,
            pretty_print: self.pretty_print,
        }
    }

    fn register(&mut self, name: String, entry: Registered) {
        if self.types.insert(name.clone(), entry).is_some() {
            debug!(type_name = %name, "replacing earlier registration");
        }
    }
}

/// An immutable, shareable JSON engine.
pub struct JsonEngine {
    types: HashMap<String, Registered>,
    fail_on_unknown_properties: bool,
    pretty_print: bool,
}

impl JsonEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// A fresh engine with `config`'s engine flags and `extensions` applied
    /// in order.
    pub fn from_config(config: &CodecConfig, extensions: &[&dyn Extension]) -> Self {
        let mut builder = EngineBuilder::new();
        builder
            .fail_on_unknown_properties(config.fail_on_unknown_properties)
            .pretty_print(config.pretty_print);
        for extension in extensions {
            builder.extension(*extension);
        }
        builder.build()
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    pub fn pretty_print(&self) -> bool {
        self.pretty_print
    }

    /// Parses JSON text and reads it as `ty`.
    pub fn read_str(&self, text: &str, ty: &TypeDescriptor) -> Result<Value, DecodeError> {
        let json: JsonValue = serde_json::from_str(text)?;
        self.read_json(&json, ty)
    }

    /// Reads an already parsed JSON tree as `ty`.
    pub fn read_json(&self, json: &JsonValue, ty: &TypeDescriptor) -> Result<Value, DecodeError> {
        self.read_node(json, ty, &Bindings::new(), &JsonPath::Root)
    }

    /// Writes `value` as `ty` into a JSON tree.
    pub fn write_json(&self, value: &Value, ty: &TypeDescriptor) -> Result<JsonValue, EncodeError> {
        self.write_node(value, ty, &Bindings::new(), &JsonPath::Root)
    }

    /// Writes `value` as `ty` into JSON bytes.
    pub fn write_vec(&self, value: &Value, ty: &TypeDescriptor) -> Result<Vec<u8>, EncodeError> {
        let json = self.write_json(value, ty)?;
        let bytes = if self.pretty_print {
            serde_json::to_vec_pretty(&json)?
        } else {
            serde_json::to_vec(&json)?
        };
        Ok(bytes)
    }

    fn read_node(
        &self,
        json: &JsonValue,
        ty: &TypeDescriptor,
        bindings: &Bindings,
        path: &JsonPath<'_>,
    ) -> Result<Value, DecodeError> {
        if json.is_null() {
            return Ok(Value::Null);
        }
        match ty {
            TypeDescriptor::Bytes | TypeDescriptor::Any => Ok(natural(json)),
            TypeDescriptor::Bool => json
                .as_bool()
                .map(Value::Bool)
                .ok_or_else(|| read_mismatch(path, ty, json)),
            TypeDescriptor::Integer => match json {
                JsonValue::Number(n) if n.is_i64() || n.is_u64() => Ok(number(n)),
                _ => Err(read_mismatch(path, ty, json)),
            },
            TypeDescriptor::Float => json
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| read_mismatch(path, ty, json)),
            TypeDescriptor::String => json
                .as_str()
                .map(|s| Value::String(s.to_string()))
                .ok_or_else(|| read_mismatch(path, ty, json)),
            TypeDescriptor::Sequence(item) => {
                let items = json
                    .as_array()
                    .ok_or_else(|| read_mismatch(path, ty, json))?;
                items
                    .iter()
                    .enumerate()
                    .map(|(i, node)| self.read_node(node, item, bindings, &JsonPath::Index(path, i)))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
            TypeDescriptor::Map { key, value } => {
                let entries = json
                    .as_object()
                    .ok_or_else(|| read_mismatch(path, ty, json))?;
                let mut map = Fields::with_capacity(entries.len());
                for (k, node) in entries {
                    let child = JsonPath::Key(path, k);
                    self.check_key(k, key, bindings, &child)?;
                    map.insert(k.clone(), self.read_node(node, value, bindings, &child)?);
                }
                Ok(Value::Map(map))
            }
            TypeDescriptor::Named(name) => self.read_named(json, name, &Bindings::new(), path),
            TypeDescriptor::Parameterized { name, args } => {
                let bound = bind_args(args, bindings).map_err(|name| {
                    DecodeError::UnboundVariable {
                        name,
                        path: path.to_string(),
                    }
                })?;
                self.read_named(json, name, &bound, path)
            }
            TypeDescriptor::Variable(name) => match bindings.get(name) {
                Some(bound) => self.read_node(json, bound, &Bindings::new(), path),
                None => Err(DecodeError::UnboundVariable {
                    name: name.clone(),
                    path: path.to_string(),
                }),
            },
        }
    }

    fn read_named(
        &self,
        json: &JsonValue,
        name: &str,
        bindings: &Bindings,
        path: &JsonPath<'_>,
    ) -> Result<Value, DecodeError> {
        match self.types.get(name) {
            None => Err(DecodeError::UnknownType {
                type_name: name.to_string(),
                path: path.to_string(),
            }),
            Some(Registered::Adapter(adapter)) => {
                adapter
                    .read(json)
                    .map(Value::Custom)
                    .map_err(|source| DecodeError::Adapter {
                        type_name: name.to_string(),
                        path: path.to_string(),
                        source,
                    })
            }
            Some(Registered::Object(schema)) => {
                if let Some(param) = schema.params().iter().find(|p| !bindings.contains_key(*p)) {
                    return Err(DecodeError::MissingTypeArgument {
                        type_name: name.to_string(),
                        param: param.clone(),
                        path: path.to_string(),
                    });
                }
                let properties = json.as_object().ok_or_else(|| DecodeError::Mismatch {
                    path: path.to_string(),
                    expected: name.to_string(),
                    found: json_kind(json),
                })?;
                self.check_properties(schema, properties, path)?;

                let mut object = Object::new(name);
                for (field, field_ty) in schema.fields() {
                    let node = match properties.get(field) {
                        None | Some(JsonValue::Null) => continue,
                        Some(node) => node,
                    };
                    let value =
                        self.read_node(node, field_ty, bindings, &JsonPath::Key(path, field))?;
                    object.insert(field.clone(), value);
                }
                Ok(Value::Object(object))
            }
        }
    }

    fn check_properties(
        &self,
        schema: &ObjectSchema,
        properties: &JsonMap<String, JsonValue>,
        path: &JsonPath<'_>,
    ) -> Result<(), DecodeError> {
        for property in properties.keys() {
            if schema.fields().contains_key(property) {
                continue;
            }
            if self.fail_on_unknown_properties {
                return Err(DecodeError::UnknownProperty {
                    type_name: schema.name().to_string(),
                    property: property.clone(),
                    path: path.to_string(),
                });
            }
            trace!(type_name = schema.name(), property = %property, "ignoring unknown property");
        }
        Ok(())
    }

    fn check_key(
        &self,
        key: &str,
        ty: &TypeDescriptor,
        bindings: &Bindings,
        path: &JsonPath<'_>,
    ) -> Result<(), DecodeError> {
        let ok = match ty {
            TypeDescriptor::String | TypeDescriptor::Any => true,
            TypeDescriptor::Integer => key.parse::<i64>().is_ok(),
            TypeDescriptor::Named(name) => match self.types.get(name) {
                Some(Registered::Adapter(adapter)) => {
                    adapter.read(&JsonValue::String(key.to_string())).is_ok()
                }
                _ => false,
            },
            TypeDescriptor::Variable(name) => match bindings.get(name) {
                Some(bound) => return self.check_key(key, bound, &Bindings::new(), path),
                None => {
                    return Err(DecodeError::UnboundVariable {
                        name: name.clone(),
                        path: path.to_string(),
                    })
                }
            },
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(DecodeError::Mismatch {
                path: path.to_string(),
                expected: format!("{ty} key"),
                found: "string key",
            })
        }
    }

    fn write_node(
        &self,
        value: &Value,
        ty: &TypeDescriptor,
        bindings: &Bindings,
        path: &JsonPath<'_>,
    ) -> Result<JsonValue, EncodeError> {
        if value.is_null() {
            return Ok(JsonValue::Null);
        }
        match (ty, value) {
            (TypeDescriptor::Bytes | TypeDescriptor::Any, _) => self.write_natural(value, path),
            (TypeDescriptor::Bool, Value::Bool(b)) => Ok(JsonValue::Bool(*b)),
            (TypeDescriptor::Integer, Value::Integer(i)) => Ok((*i).into()),
            (TypeDescriptor::Integer, Value::Unsigned(u)) => Ok((*u).into()),
            // Integers are rejected: `3` would read back as `Float(3.0)`.
            (TypeDescriptor::Float, Value::Float(f)) => float(*f, path),
            (TypeDescriptor::String, Value::String(s)) => Ok(JsonValue::String(s.clone())),
            (TypeDescriptor::Sequence(item), Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, v)| self.write_node(v, item, bindings, &JsonPath::Index(path, i)))
                .collect::<Result<Vec<_>, _>>()
                .map(JsonValue::Array),
            (TypeDescriptor::Map { value: value_ty, .. }, Value::Map(entries)) => {
                let mut out = JsonMap::with_capacity(entries.len());
                for (k, v) in entries {
                    let json = self.write_node(v, value_ty, bindings, &JsonPath::Key(path, k))?;
                    out.insert(k.clone(), json);
                }
                Ok(JsonValue::Object(out))
            }
            (TypeDescriptor::Named(name), _) => {
                self.write_named(value, name, &Bindings::new(), path)
            }
            (TypeDescriptor::Parameterized { name, args }, _) => {
                let bound = bind_args(args, bindings).map_err(|name| {
                    EncodeError::UnboundVariable {
                        name,
                        path: path.to_string(),
                    }
                })?;
                self.write_named(value, name, &bound, path)
            }
            (TypeDescriptor::Variable(name), _) => match bindings.get(name) {
                Some(bound) => self.write_node(value, bound, &Bindings::new(), path),
                None => Err(EncodeError::UnboundVariable {
                    name: name.clone(),
                    path: path.to_string(),
                }),
            },
            _ => Err(write_mismatch(path, ty, value)),
        }
    }

    fn write_named(
        &self,
        value: &Value,
        name: &str,
        bindings: &Bindings,
        path: &JsonPath<'_>,
    ) -> Result<JsonValue, EncodeError> {
        match self.types.get(name) {
            None => Err(EncodeError::UnknownType {
                type_name: name.to_string(),
                path: path.to_string(),
            }),
            Some(Registered::Adapter(adapter)) => match value {
                Value::Custom(custom) => self.write_custom(&**adapter, custom, path),
                other => Err(EncodeError::Mismatch {
                    path: path.to_string(),
                    expected: name.to_string(),
                    found: other.kind(),
                }),
            },
            Some(Registered::Object(schema)) => {
                if let Some(param) = schema.params().iter().find(|p| !bindings.contains_key(*p)) {
                    return Err(EncodeError::MissingTypeArgument {
                        type_name: name.to_string(),
                        param: param.clone(),
                        path: path.to_string(),
                    });
                }
                let fields = match value {
                    Value::Object(object) => object.fields(),
                    Value::Map(map) => map,
                    other => {
                        return Err(EncodeError::Mismatch {
                            path: path.to_string(),
                            expected: name.to_string(),
                            found: other.kind(),
                        })
                    }
                };
                let mut out = JsonMap::new();
                for (field, field_ty) in schema.fields() {
                    let Some(field_value) = fields.get(field).filter(|v| !v.is_null()) else {
                        continue;
                    };
                    let json = self.write_node(
                        field_value,
                        field_ty,
                        bindings,
                        &JsonPath::Key(path, field),
                    )?;
                    out.insert(field.clone(), json);
                }
                Ok(JsonValue::Object(out))
            }
        }
    }

    /// JSON for `value` without a descriptor: maps and objects in insertion
    /// order, custom values through the adapter named by their tag.
    fn write_natural(&self, value: &Value, path: &JsonPath<'_>) -> Result<JsonValue, EncodeError> {
        match value {
            Value::Null => Ok(JsonValue::Null),
            Value::Bool(b) => Ok(JsonValue::Bool(*b)),
            Value::Integer(i) => Ok((*i).into()),
            Value::Unsigned(u) => Ok((*u).into()),
            Value::Float(f) => float(*f, path),
            Value::String(s) => Ok(JsonValue::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| self.write_natural(v, &JsonPath::Index(path, i)))
                .collect::<Result<Vec<_>, _>>()
                .map(JsonValue::Array),
            Value::Map(fields) => self.write_natural_fields(fields, path),
            Value::Object(object) => self.write_natural_fields(object.fields(), path),
            Value::Custom(custom) => match self.types.get(custom.type_name()) {
                Some(Registered::Adapter(adapter)) => {
                    self.write_custom(&**adapter, custom, path)
                }
                _ => Err(EncodeError::UnsupportedType {
                    type_name: custom.type_name().to_string(),
                    path: path.to_string(),
                }),
            },
        }
    }

    fn write_natural_fields(
        &self,
        fields: &Fields,
        path: &JsonPath<'_>,
    ) -> Result<JsonValue, EncodeError> {
        let mut out = JsonMap::with_capacity(fields.len());
        for (k, v) in fields {
            out.insert(k.clone(), self.write_natural(v, &JsonPath::Key(path, k))?);
        }
        Ok(JsonValue::Object(out))
    }

    fn write_custom(
        &self,
        adapter: &dyn ValueAdapter,
        custom: &CustomValue,
        path: &JsonPath<'_>,
    ) -> Result<JsonValue, EncodeError> {
        adapter.write(custom).map_err(|source| EncodeError::Adapter {
            type_name: adapter.type_name().to_string(),
            path: path.to_string(),
            source,
        })
    }
}

impl fmt::Debug for JsonEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("JsonEngine")
            .field("types", &names)
            .field("fail_on_unknown_properties", &self.fail_on_unknown_properties)
            .field("pretty_print", &self.pretty_print)
            .finish()
    }
}

impl Default for JsonEngine {
    fn default() -> Self {
        EngineBuilder::new().build()
    }
}

/// Location of a node, rendered as `$`, `$[1]`, `$.data`, ...
enum JsonPath<'a> {
    Root,
    Index(&'a JsonPath<'a>, usize),
    Key(&'a JsonPath<'a>, &'a str),
}

impl fmt::Display for JsonPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsonPath::Root => f.write_str("$"),
            JsonPath::Index(parent, i) => write!(f, "{parent}[{i}]"),
            JsonPath::Key(parent, key) => write!(f, "{parent}.{key}"),
        }
    }
}

/// Resolves a parameterized type's arguments against the enclosing bindings.
fn bind_args(args: &Bindings, outer: &Bindings) -> Result<Bindings, String> {
    args.iter()
        .map(|(slot, ty)| Ok((slot.clone(), ty.bind(outer)?)))
        .collect()
}

fn natural(json: &JsonValue) -> Value {
    match json {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => number(n),
        JsonValue::String(s) => Value::String(s.clone()),
        JsonValue::Array(items) => Value::Array(items.iter().map(natural).collect()),
        JsonValue::Object(entries) => Value::Map(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), natural(v)))
                .collect(),
        ),
    }
}

/// Narrowest numeric variant that holds `n` exactly.
fn number(n: &Number) -> Value {
    if let Some(i) = n.as_i64() {
        Value::Integer(i)
    } else if let Some(u) = n.as_u64() {
        Value::Unsigned(u)
    } else {
        Value::Float(n.as_f64().unwrap_or(f64::NAN))
    }
}

fn float(f: f64, path: &JsonPath<'_>) -> Result<JsonValue, EncodeError> {
    Number::from_f64(f)
        .map(JsonValue::Number)
        .ok_or_else(|| EncodeError::NonFiniteNumber {
            path: path.to_string(),
        })
}

fn json_kind(json: &JsonValue) -> &'static str {
    match json {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(n) if n.is_f64() => "float",
        JsonValue::Number(_) => "integer",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

fn read_mismatch(path: &JsonPath<'_>, ty: &TypeDescriptor, json: &JsonValue) -> DecodeError {
    DecodeError::Mismatch {
        path: path.to_string(),
        expected: ty.to_string(),
        found: json_kind(json),
    }
}

fn write_mismatch(path: &JsonPath<'_>, ty: &TypeDescriptor, value: &Value) -> EncodeError {
    EncodeError::Mismatch {
        path: path.to_string(),
        expected: ty.to_string(),
        found: value.kind(),
    }
}
