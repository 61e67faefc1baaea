//! JSON request/response body codec for HTTP clients.
//!
//! # Overview
//! Sits between a transport that only knows status codes, headers and byte
//! payloads, and application code that wants structured values. The
//! transport executes the round-trip (host-does-IO pattern); this crate only
//! turns a `Value` into a request body and a fully read response into a
//! `Value`.
//!
//! # Design
//! - `JsonEncoder` / `JsonDecoder` are immutable after construction and hold
//!   an `Arc<JsonEngine>`, so they can be shared across threads.
//! - Target shapes are explicit `TypeDescriptor` values (`list<Zone>`,
//!   `map<string, any>`, `DataWrapper<T = integer>`), not reflected types.
//! - Custom value types and record schemas are taught to the engine through
//!   `Extension`s applied once at construction.
//! - Empty responses decode to an explicit sentinel: empty bytes for `bytes`
//!   targets, `Decoded::Absent` for everything else.
//! - `encode_typed` / `decode_typed` offer the plain serde path for
//!   statically typed callers under the same body and charset rules.

pub mod charset;
pub mod codec;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod extension;
pub mod http;
pub mod value;


pub use charset::Charset;
pub use codec::{Decoded, JsonCodec, JsonCodecBuilder, JsonDecoder, JsonEncoder};
pub use config::CodecConfig;
pub use descriptor::{Bindings, TypeDescriptor};
pub use engine::{EngineBuilder, FnAdapter, JsonEngine, ObjectSchema, ValueAdapter};
pub use error::{BoxError, DecodeError, EncodeError, ParseDescriptorError};
pub use extension::{Extension, LocalDateExtension, UuidExtension};
pub use http::{BodyCarrier, HttpMethod, HttpRequest, HttpResponse, APPLICATION_JSON};
pub use value::{CustomValue, Fields, Object, Value};
