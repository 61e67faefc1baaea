//! Error types for the JSON body codec.
//!
//! # Design
//! Encoding and decoding fail independently, so each direction has its own
//! enum. Shape errors carry the JSON path of the offending node (`$`,
//! `$[1]`, `$.data`) so a caller can tell which part of a large body was
//! rejected. Engine errors from `serde_json` and adapter errors are kept as
//! `source` rather than flattened into strings.

use thiserror::Error;

/// Error type returned by value adapters.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A value could not be written as JSON.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// A custom value has no adapter registered under its type name.
    #[error("no adapter registered for custom type `{type_name}` at {path}")]
    UnsupportedType { type_name: String, path: String },

    #[error("unknown type `{type_name}` at {path}")]
    UnknownType { type_name: String, path: String },

    #[error("expected {expected} at {path}, found {found}")]
    Mismatch {
        path: String,
        expected: String,
        found: &'static str,
    },

    #[error("non-finite number at {path} cannot be written as JSON")]
    NonFiniteNumber { path: String },

    #[error("type variable `${name}` is not bound at {path}")]
    UnboundVariable { name: String, path: String },

    #[error("type `{type_name}` needs an argument for `{param}` at {path}")]
    MissingTypeArgument {
        type_name: String,
        param: String,
        path: String,
    },

    #[error("adapter for `{type_name}` failed at {path}: {source}")]
    Adapter {
        type_name: String,
        path: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to write JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A response body could not be turned into the requested shape.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The body is not valid JSON, or serde rejected it on the typed path.
    #[error("could not parse response body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected {expected} at {path}, found {found}")]
    Mismatch {
        path: String,
        expected: String,
        found: &'static str,
    },

    #[error("unknown type `{type_name}` at {path}")]
    UnknownType { type_name: String, path: String },

    #[error("unknown property `{property}` for type `{type_name}` at {path}")]
    UnknownProperty {
        type_name: String,
        property: String,
        path: String,
    },

    #[error("type variable `${name}` is not bound at {path}")]
    UnboundVariable { name: String, path: String },

    #[error("type `{type_name}` needs an argument for `{param}` at {path}")]
    MissingTypeArgument {
        type_name: String,
        param: String,
        path: String,
    },

    #[error("adapter for `{type_name}` rejected the value at {path}: {source}")]
    Adapter {
        type_name: String,
        path: String,
        #[source]
        source: BoxError,
    },
}

/// The textual form of a type descriptor could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid type descriptor at offset {position}: {message}")]
pub struct ParseDescriptorError {
    pub position: usize,
    pub message: String,
}
