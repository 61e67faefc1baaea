//! Type descriptors: the shape a body is decoded into or encoded from.
//!
//! # Design
//! A descriptor is plain data instead of a reflected type, so generic
//! parameters survive all the way to the decoder: `list<Zone>` and
//! `DataWrapper<T = integer>` are distinct values the engine can match on.
//!
//! Descriptors have a compact textual form that round-trips through
//! `Display` / `FromStr` and is what serde reads and writes:
//!
//! | text                        | descriptor                               |
//! |-----------------------------|------------------------------------------|
//! | `bytes`                     | raw byte-array target                    |
//! | `any`                       | natural JSON shape                       |
//! | `bool`, `integer`, `float`, `string` | primitives                      |
//! | `list<T>`                   | ordered sequence of `T`                  |
//! | `map<K, V>`                 | mapping with string keys                 |
//! | `Zone`                      | registered object schema or custom value |
//! | `DataWrapper<T = integer>`  | generic object schema with bound slots   |
//! | `$T`                        | slot reference inside a generic schema   |
//!
//! A name that is a keyword above or contains characters other than
//! alphanumerics, `_`, `.` and `:` is written in double quotes (`"list"`,
//! `"my type"`), with `\"` and `\\` escapes. Nesting is limited to
//! `MAX_DEPTH` levels.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ParseDescriptorError;

/// Deepest nesting `FromStr` accepts.
pub const MAX_DEPTH: usize = 64;

/// Words that parse as something other than a named type.
const KEYWORDS: &[&str] = &[
    "bytes", "any", "bool", "boolean", "integer", "int", "long", "float", "double", "number",
    "string", "list", "map",
];

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | ':')
}

/// Writes `name` bare when it reads back as itself, quoted otherwise.
fn write_name(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if !name.is_empty() && name.chars().all(is_name_char) && !KEYWORDS.contains(&name) {
        return f.write_str(name);
    }
    f.write_str("\"")?;
    for c in name.chars() {
        if matches!(c, '"' | '\\') {
            f.write_str("\\")?;
        }
        write!(f, "{c}")?;
    }
    f.write_str("\"")
}

/// Slot name to bound descriptor.
pub type Bindings = BTreeMap<String, TypeDescriptor>;

/// The target or source type of a codec call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDescriptor {
    Bytes,
    Any,
    Bool,
    Integer,
    Float,
    String,
    Sequence(Box<TypeDescriptor>),
    Map {
        key: Box<TypeDescriptor>,
        value: Box<TypeDescriptor>,
    },
    Named(String),
    Parameterized {
        name: String,
        args: Bindings,
    },
    Variable(String),
}

impl TypeDescriptor {
    pub fn sequence_of(item: TypeDescriptor) -> Self {
        TypeDescriptor::Sequence(Box::new(item))
    }

    pub fn map_of(key: TypeDescriptor, value: TypeDescriptor) -> Self {
        TypeDescriptor::Map {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    /// `map<string, V>`, the common case.
    pub fn string_map(value: TypeDescriptor) -> Self {
        Self::map_of(TypeDescriptor::String, value)
    }

    pub fn named(name: impl Into<String>) -> Self {
        TypeDescriptor::Named(name.into())
    }

    pub fn parameterized<I, K>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = (K, TypeDescriptor)>,
        K: Into<String>,
    {
        TypeDescriptor::Parameterized {
            name: name.into(),
            args: args.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn variable(name: impl Into<String>) -> Self {
        TypeDescriptor::Variable(name.into())
    }

    pub fn is_bytes(&self) -> bool {
        matches!(self, TypeDescriptor::Bytes)
    }

    /// Replaces every `Variable` with its binding.
    ///
    /// Returns the name of the first variable that has no binding.
    pub fn bind(&self, bindings: &Bindings) -> Result<TypeDescriptor, String> {
        Ok(match self {
            TypeDescriptor::Variable(name) => match bindings.get(name) {
                Some(bound) => bound.clone(),
                None => return Err(name.clone()),
            },
            TypeDescriptor::Sequence(item) => Self::sequence_of(item.bind(bindings)?),
            TypeDescriptor::Map { key, value } => {
                Self::map_of(key.bind(bindings)?, value.bind(bindings)?)
            }
            TypeDescriptor::Parameterized { name, args } => TypeDescriptor::Parameterized {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|(slot, ty)| Ok((slot.clone(), ty.bind(bindings)?)))
                    .collect::<Result<_, String>>()?,
            },
            other => other.clone(),
        })
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Bytes => f.write_str("bytes"),
            TypeDescriptor::Any => f.write_str("any"),
            TypeDescriptor::Bool => f.write_str("bool"),
            TypeDescriptor::Integer => f.write_str("integer"),
            TypeDescriptor::Float => f.write_str("float"),
            TypeDescriptor::String => f.write_str("string"),
            TypeDescriptor::Sequence(item) => write!(f, "list<{item}>"),
            TypeDescriptor::Map { key, value } => write!(f, "map<{key}, {value}>"),
            TypeDescriptor::Named(name) => write_name(f, name),
            TypeDescriptor::Parameterized { name, args } => {
                write_name(f, name)?;
                f.write_str("<")?;
                for (i, (slot, ty)) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_name(f, slot)?;
                    write!(f, " = {ty}")?;
                }
                f.write_str(">")
            }
            TypeDescriptor::Variable(name) => {
                f.write_str("$")?;
                write_name(f, name)
            }
        }
    }
}

impl FromStr for TypeDescriptor {
    type Err = ParseDescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser {
            input: s,
            pos: 0,
            depth: 0,
        };
        let ty = parser.parse_type()?;
        parser.skip_whitespace();
        if parser.pos < s.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(ty)
    }
}

impl Serialize for TypeDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TypeDescriptor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn parse_type(&mut self) -> Result<TypeDescriptor, ParseDescriptorError> {
        if self.depth == MAX_DEPTH {
            return Err(self.error("type is nested too deeply"));
        }
        self.depth += 1;
        let ty = self.parse_nested();
        self.depth -= 1;
        ty
    }

    fn parse_nested(&mut self) -> Result<TypeDescriptor, ParseDescriptorError> {
        self.skip_whitespace();
        if self.eat('$') {
            return Ok(TypeDescriptor::Variable(self.name()?));
        }
        if self.input[self.pos..].starts_with('"') {
            let name = self.quoted()?;
            return self.named_or_parameterized(name);
        }
        let start = self.pos;
        let ident = self.ident()?;
        let primitive = match ident {
            "bytes" => Some(TypeDescriptor::Bytes),
            "any" => Some(TypeDescriptor::Any),
            "bool" | "boolean" => Some(TypeDescriptor::Bool),
            "integer" | "int" | "long" => Some(TypeDescriptor::Integer),
            "float" | "double" | "number" => Some(TypeDescriptor::Float),
            "string" => Some(TypeDescriptor::String),
            _ => None,
        };
        if let Some(primitive) = primitive {
            return Ok(primitive);
        }
        match ident {
            "list" => {
                self.expect('<')?;
                let item = self.parse_type()?;
                self.expect('>')?;
                Ok(TypeDescriptor::sequence_of(item))
            }
            "map" => {
                self.expect('<')?;
                let key = self.parse_type()?;
                self.expect(',')?;
                let value = self.parse_type()?;
                self.expect('>')?;
                if !matches!(
                    key,
                    TypeDescriptor::String
                        | TypeDescriptor::Any
                        | TypeDescriptor::Integer
                        | TypeDescriptor::Named(_)
                        | TypeDescriptor::Variable(_)
                ) {
                    self.pos = start;
                    return Err(self.error("map keys must be string, any, integer or named"));
                }
                Ok(TypeDescriptor::map_of(key, value))
            }
            name => self.named_or_parameterized(name.to_string()),
        }
    }

    fn named_or_parameterized(&mut self, name: String) -> Result<TypeDescriptor, ParseDescriptorError> {
        self.skip_whitespace();
        if !self.eat('<') {
            return Ok(TypeDescriptor::Named(name));
        }
        let mut args = Bindings::new();
        loop {
            let slot = self.name()?;
            self.expect('=')?;
            let ty = self.parse_type()?;
            if args.insert(slot, ty).is_some() {
                return Err(self.error("type argument bound twice"));
            }
            self.skip_whitespace();
            if self.eat('>') {
                break;
            }
            self.expect(',')?;
        }
        Ok(TypeDescriptor::Parameterized { name, args })
    }

    /// A bare identifier or a quoted name.
    fn name(&mut self) -> Result<String, ParseDescriptorError> {
        self.skip_whitespace();
        if self.input[self.pos..].starts_with('"') {
            self.quoted()
        } else {
            self.ident().map(str::to_string)
        }
    }

    fn quoted(&mut self) -> Result<String, ParseDescriptorError> {
        let start = self.pos;
        self.pos += 1;
        let input = self.input;
        let mut name = String::new();
        let mut chars = input[self.pos..].chars();
        while let Some(c) = chars.next() {
            self.pos += c.len_utf8();
            match c {
                '"' => return Ok(name),
                '\\' => match chars.next() {
                    Some(escaped) => {
                        self.pos += escaped.len_utf8();
                        name.push(escaped);
                    }
                    None => break,
                },
                c => name.push(c),
            }
        }
        self.pos = start;
        Err(self.error("unterminated quoted name"))
    }

    fn ident(&mut self) -> Result<&'a str, ParseDescriptorError> {
        self.skip_whitespace();
        let input = self.input;
        let rest = &input[self.pos..];
        let len = rest
            .find(|c: char| !is_name_char(c))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error("expected a type name"));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    fn expect(&mut self, c: char) -> Result<(), ParseDescriptorError> {
        self.skip_whitespace();
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(&format!("expected `{c}`")))
        }
    }

    fn eat(&mut self, c: char) -> bool {
        if self.input[self.pos..].starts_with(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.input[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn error(&self, message: &str) -> ParseDescriptorError {
        ParseDescriptorError {
            position: self.pos,
            message: message.to_string(),
        }
    }
}
