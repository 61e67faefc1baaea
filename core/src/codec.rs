//! Stateless JSON encoder and decoder for HTTP bodies.
//!
//! # Design
//! `JsonEncoder` and `JsonDecoder` hold only an `Arc<JsonEngine>` and a few
//! flags fixed at construction, and carry no mutable state between calls.
//! Each call is one synchronous pass over an in-memory body, so instances can
//! be shared freely across threads. The caller executes the HTTP round-trip
//! and hands the decoder a fully read `HttpResponse`.
//!
//! Decoding runs in a fixed order: the empty-body policy first (204, 404 when
//! dismissed, or no body), then raw bytes for `bytes` targets, then charset
//! resolution, then a typed parse driven by the `TypeDescriptor`.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;

use crate::charset::{self, Charset};
use crate::config::CodecConfig;
use crate::descriptor::TypeDescriptor;
use crate::engine::JsonEngine;
use crate::error::{DecodeError, EncodeError};
use crate::extension::Extension;
use crate::http::{BodyCarrier, HttpResponse, APPLICATION_JSON};
use crate::value::{Fields, Value};

/// Result of decoding a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Raw body of a `bytes` target. Empty for empty responses.
    Bytes(Vec<u8>),
    Value(Value),
    /// The response carried no payload and the target is not `bytes`.
    Absent,
}

impl Decoded {
    fn empty_for(ty: &TypeDescriptor) -> Self {
        if ty.is_bytes() {
            Decoded::Bytes(Vec::new())
        } else {
            Decoded::Absent
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Decoded::Absent)
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Decoded::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Decoded::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Replaces `Absent` with the natural empty value of `ty`: `[]` for
    /// sequences, `{}` for maps, `Null` for everything else.
    pub fn or_empty(self, ty: &TypeDescriptor) -> Self {
        match (self, ty) {
            (Decoded::Absent, TypeDescriptor::Bytes) => Decoded::Bytes(Vec::new()),
            (Decoded::Absent, TypeDescriptor::Sequence(_)) => Decoded::Value(Value::Array(Vec::new())),
            (Decoded::Absent, TypeDescriptor::Map { .. }) => Decoded::Value(Value::Map(Fields::new())),
            (Decoded::Absent, _) => Decoded::Value(Value::Null),
            (decoded, _) => decoded,
        }
    }
}

/// Writes values as JSON request bodies.
#[derive(Debug, Clone)]
pub struct JsonEncoder {
    engine: Arc<JsonEngine>,
}

impl JsonEncoder {
    /// An encoder over a fresh engine with no extensions.
    pub fn new(config: &CodecConfig) -> Self {
        Self::with_extensions(config, &[])
    }

    /// An encoder over a fresh engine with `extensions` applied in order.
    pub fn with_extensions(config: &CodecConfig, extensions: &[&dyn Extension]) -> Self {
        Self::with_engine(Arc::new(JsonEngine::from_config(config, extensions)))
    }

    /// An encoder over a caller-built engine.
    pub fn with_engine(engine: Arc<JsonEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &JsonEngine {
        &self.engine
    }

    /// Serializes `value` as `ty` and stores it as the carrier's body with
    /// content type `application/json` and charset UTF-8.
    ///
    /// A `bytes` descriptor writes the natural JSON of the value with no type
    /// hints, whatever its shape.
    pub fn encode<C>(&self, value: &Value, ty: &TypeDescriptor, carrier: &mut C) -> Result<(), EncodeError>
    where
        C: BodyCarrier + ?Sized,
    {
        let body = self.engine.write_vec(value, ty)?;
        carrier.set_body(body, Charset::utf8(), APPLICATION_JSON);
        Ok(())
    }

    /// Serializes a statically typed value with serde, bypassing descriptors
    /// and extension adapters.
    pub fn encode_typed<T, C>(&self, value: &T, carrier: &mut C) -> Result<(), EncodeError>
    where
        T: Serialize + ?Sized,
        C: BodyCarrier + ?Sized,
    {
        let body = if self.engine.pretty_print() {
            serde_json::to_vec_pretty(value)?
        } else {
            serde_json::to_vec(value)?
        };
        carrier.set_body(body, Charset::utf8(), APPLICATION_JSON);
        Ok(())
    }
}

/// Reads JSON response bodies into values.
#[derive(Debug, Clone)]
pub struct JsonDecoder {
    engine: Arc<JsonEngine>,
    dismiss_404: bool,
    default_charset: Charset,
}

impl JsonDecoder {
    /// A decoder over a fresh engine with no extensions.
    pub fn new(config: &CodecConfig) -> Self {
        Self::with_extensions(config, &[])
    }

    /// A decoder over a fresh engine with `extensions` applied in order.
    pub fn with_extensions(config: &CodecConfig, extensions: &[&dyn Extension]) -> Self {
        Self::with_engine(config, Arc::new(JsonEngine::from_config(config, extensions)))
    }

    /// A decoder over a caller-built engine. Only the decoder flags of
    /// `config` apply; the engine keeps its own settings.
    pub fn with_engine(config: &CodecConfig, engine: Arc<JsonEngine>) -> Self {
        Self {
            engine,
            dismiss_404: config.dismiss_404,
            default_charset: config.resolved_charset(),
        }
    }

    pub fn engine(&self) -> &JsonEngine {
        &self.engine
    }

    /// Decodes `response` as `ty`.
    ///
    /// Returns `Decoded::Bytes` for `bytes` targets (empty when the response
    /// has no payload), `Decoded::Absent` for other targets of an empty
    /// response, and `Decoded::Value` otherwise.
    pub fn decode(&self, response: HttpResponse, ty: &TypeDescriptor) -> Result<Decoded, DecodeError> {
        let HttpResponse { status, headers, body } = response;
        let Some(body) = self.payload(status, body) else {
            trace!(status, target = %ty, "empty response body");
            return Ok(Decoded::empty_for(ty));
        };
        if ty.is_bytes() {
            return Ok(Decoded::Bytes(body));
        }
        let charset = charset::resolve(&headers, self.default_charset);
        let text = charset.decode(&body);
        self.engine.read_str(&text, ty).map(Decoded::Value)
    }

    /// Decodes `response` straight into `T` with serde, under the same
    /// empty-body and charset rules as `decode`. `None` means no payload.
    pub fn decode_typed<T: DeserializeOwned>(&self, response: HttpResponse) -> Result<Option<T>, DecodeError> {
        let HttpResponse { status, headers, body } = response;
        let Some(body) = self.payload(status, body) else {
            trace!(status, "empty response body");
            return Ok(None);
        };
        let charset = charset::resolve(&headers, self.default_charset);
        let text = charset.decode(&body);
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// The body, unless the status or the body itself means "no payload".
    fn payload(&self, status: u16, body: Option<Vec<u8>>) -> Option<Vec<u8>> {
        if status == 204 || (status == 404 && self.dismiss_404) {
            return None;
        }
        body.filter(|body| !body.is_empty())
    }
}

/// An encoder and a decoder sharing one engine.
#[derive(Debug, Clone)]
pub struct JsonCodec {
    encoder: JsonEncoder,
    decoder: JsonDecoder,
}

impl JsonCodec {
    pub fn new(config: &CodecConfig) -> Self {
        Self::builder().config(config.clone()).build()
    }

    pub fn builder<'a>() -> JsonCodecBuilder<'a> {
        JsonCodecBuilder::default()
    }

    pub fn encoder(&self) -> &JsonEncoder {
        &self.encoder
    }

    pub fn decoder(&self) -> &JsonDecoder {
        &self.decoder
    }

    pub fn encode<C>(&self, value: &Value, ty: &TypeDescriptor, carrier: &mut C) -> Result<(), EncodeError>
    where
        C: BodyCarrier + ?Sized,
    {
        self.encoder.encode(value, ty, carrier)
    }

    pub fn decode(&self, response: HttpResponse, ty: &TypeDescriptor) -> Result<Decoded, DecodeError> {
        self.decoder.decode(response, ty)
    }
}

/// Builds a `JsonCodec`. An explicit engine takes precedence over
/// extensions; when both are given the extensions are not applied.
#[derive(Default)]
pub struct JsonCodecBuilder<'a> {
    config: CodecConfig,
    extensions: Vec<&'a dyn Extension>,
    engine: Option<Arc<JsonEngine>>,
}

impl<'a> JsonCodecBuilder<'a> {
    pub fn config(mut self, config: CodecConfig) -> Self {
        self.config = config;
        self
    }

    pub fn extension(mut self, extension: &'a dyn Extension) -> Self {
        self.extensions.push(extension);
        self
    }

    pub fn engine(mut self, engine: Arc<JsonEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn build(self) -> JsonCodec {
        let engine = match self.engine {
            Some(engine) => engine,
            None => Arc::new(JsonEngine::from_config(&self.config, &self.extensions)),
        };
        JsonCodec {
            encoder: JsonEncoder::with_engine(Arc::clone(&engine)),
            decoder: JsonDecoder::with_engine(&self.config, engine),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ObjectSchema;
    use crate::http::{HttpMethod, HttpRequest};
    use crate::value::Object;

    fn zone_schema() -> ObjectSchema {
        ObjectSchema::new("Zone")
            .field("name", TypeDescriptor::String)
            .field("id", TypeDescriptor::String)
    }

    fn decoder() -> JsonDecoder {
        JsonDecoder::with_extensions(&CodecConfig::default(), &[&zone_schema()])
    }

    fn ty(text: &str) -> TypeDescriptor {
        text.parse().unwrap()
    }

    fn request() -> HttpRequest {
        HttpRequest::new(HttpMethod::Post, "http://localhost:3000/zones")
    }

    #[test]
    fn no_content_decodes_to_empty_bytes() {
        let response = HttpResponse::new(204);
        assert_eq!(
            decoder().decode(response, &TypeDescriptor::Bytes).unwrap(),
            Decoded::Bytes(Vec::new())
        );
        let response = HttpResponse::new(204).with_body(Vec::new());
        assert_eq!(
            decoder().decode(response, &TypeDescriptor::Bytes).unwrap(),
            Decoded::Bytes(Vec::new())
        );
    }

    #[test]
    fn no_content_ignores_a_stray_body() {
        let response = HttpResponse::new(204).with_body("{not json");
        assert!(decoder().decode(response, &ty("Zone")).unwrap().is_absent());
    }

    #[test]
    fn not_found_decodes_to_empty_when_dismissed() {
        let response = HttpResponse::new(404).with_body(r#"{"error":"missing"}"#);
        assert_eq!(
            decoder().decode(response, &TypeDescriptor::Bytes).unwrap(),
            Decoded::Bytes(Vec::new())
        );
    }

    #[test]
    fn not_found_body_is_parsed_when_not_dismissed() {
        let config = CodecConfig {
            dismiss_404: false,
            ..CodecConfig::default()
        };
        let decoder = JsonDecoder::new(&config);
        let response = HttpResponse::new(404).with_body(r#"{"error":"missing"}"#);
        let value = decoder.decode(response, &TypeDescriptor::Any).unwrap();
        assert_eq!(value, Decoded::Value(Value::map([("error", "missing")])));

        let response = HttpResponse::new(404);
        assert!(decoder.decode(response, &TypeDescriptor::Any).unwrap().is_absent());
    }

    #[test]
    fn empty_body_for_object_target_is_absent() {
        let response = HttpResponse::new(200).with_body(Vec::new());
        let decoded = decoder().decode(response, &ty("list<Zone>")).unwrap();
        assert_eq!(decoded, Decoded::Absent);
        assert_eq!(
            decoded.or_empty(&ty("list<Zone>")),
            Decoded::Value(Value::Array(Vec::new()))
        );
    }

    #[test]
    fn bytes_target_skips_json_parsing() {
        let response = HttpResponse::new(200)
            .with_header("Content-Type", "application/json; charset=ISO-8859-1")
            .with_body(vec![0xC1, b'{']);
        assert_eq!(
            decoder().decode(response, &TypeDescriptor::Bytes).unwrap(),
            Decoded::Bytes(vec![0xC1, b'{'])
        );
    }

    #[test]
    fn invalid_json_is_a_decode_error() {
        let response = HttpResponse::new(200).with_body("not json");
        let err = decoder().decode(response, &ty("Zone")).unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    #[test]
    fn shape_mismatch_is_a_decode_error() {
        let response = HttpResponse::new(200).with_body(r#"{"name":"a."}"#);
        let err = decoder().decode(response, &ty("list<Zone>")).unwrap_err();
        assert_eq!(err.to_string(), "expected list<Zone> at $, found object");
    }

    #[test]
    fn decodes_zone_with_latin1_charset() {
        let body: Vec<u8> = "{\n  \"name\" : \"DENOMINATOR.IO.\",\n  \"id\" : \"ÁÉÍÓÚÀÈÌÒÙÄËÏÖÜÑ\"\n}"
            .chars()
            .map(|c| c as u32 as u8)
            .collect();
        let response = HttpResponse::new(200)
            .with_header("Content-Type", "application/json;charset=ISO-8859-1")
            .with_body(body);
        let value = decoder().decode(response, &ty("Zone")).unwrap().into_value().unwrap();
        assert_eq!(value.get("id").and_then(Value::as_str), Some("ÁÉÍÓÚÀÈÌÒÙÄËÏÖÜÑ"));
    }

    #[test]
    fn utf8_body_with_byte_order_mark_decodes() {
        let mut body = vec![0xEF, 0xBB, 0xBF];
        body.extend_from_slice(br#"{"name":"a."}"#);
        let response = HttpResponse::new(200)
            .with_header("Content-Type", "application/json; charset=UTF-8")
            .with_body(body);
        let value = decoder().decode(response, &ty("Zone")).unwrap().into_value().unwrap();
        assert_eq!(value.get("name").and_then(Value::as_str), Some("a."));
    }

    #[test]
    fn encode_sets_json_body_and_content_type() {
        let encoder = JsonEncoder::new(&CodecConfig::default());
        let mut req = request();
        let value = Value::map([("foo", 1)]);
        encoder.encode(&value, &ty("map<string, any>"), &mut req).unwrap();
        assert_eq!(req.body.as_deref(), Some(&br#"{"foo":1}"#[..]));
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.charset, Some(Charset::utf8()));

        let mut req = request();
        encoder.encode(&value, &TypeDescriptor::Bytes, &mut req).unwrap();
        assert_eq!(req.body.as_deref(), Some(&br#"{"foo":1}"#[..]));
    }

    #[test]
    fn failed_encode_leaves_carrier_untouched() {
        let encoder = JsonEncoder::new(&CodecConfig::default());
        let mut req = request();
        let err = encoder
            .encode(&Value::Float(f64::INFINITY), &TypeDescriptor::Float, &mut req)
            .unwrap_err();
        assert!(matches!(err, EncodeError::NonFiniteNumber { .. }));
        assert!(req.body.is_none());
        assert!(req.headers.is_empty());
    }

    #[test]
    fn pretty_print_indents_body() {
        let config = CodecConfig {
            pretty_print: true,
            ..CodecConfig::default()
        };
        let encoder = JsonEncoder::new(&config);
        let mut req = request();
        encoder
            .encode(&Value::map([("foo", 1)]), &TypeDescriptor::Any, &mut req)
            .unwrap();
        assert_eq!(req.body.as_deref(), Some(&b"{\n  \"foo\": 1\n}"[..]));
    }

    #[test]
    fn typed_paths_use_serde_directly() {
        #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Zone {
            name: String,
            #[serde(default, skip_serializing_if = "Option::is_none")]
            id: Option<String>,
        }

        let encoder = JsonEncoder::new(&CodecConfig::default());
        let mut req = request();
        let zone = Zone {
            name: "denominator.io.".to_string(),
            id: None,
        };
        encoder.encode_typed(&zone, &mut req).unwrap();
        assert_eq!(req.body.as_deref(), Some(&br#"{"name":"denominator.io."}"#[..]));

        let response = HttpResponse::new(200).with_body(req.body.unwrap());
        let back: Option<Zone> = decoder().decode_typed(response).unwrap();
        assert_eq!(back, Some(zone));

        let empty: Option<Zone> = decoder().decode_typed(HttpResponse::new(204)).unwrap();
        assert_eq!(empty, None);
    }

    #[test]
    fn explicit_engine_wins_over_extensions() {
        let engine = Arc::new(JsonEngine::builder().object(zone_schema()).build());
        let other = ObjectSchema::new("Other");
        let codec = JsonCodec::builder()
            .extension(&other)
            .engine(Arc::clone(&engine))
            .build();
        assert!(codec.decoder().engine().is_registered("Zone"));
        assert!(!codec.decoder().engine().is_registered("Other"));
        assert!(codec.encoder().engine().is_registered("Zone"));
    }

    #[test]
    fn codec_round_trips_objects() {
        let zone = zone_schema();
        let codec = JsonCodec::builder().extension(&zone).build();
        let ty = ty("list<Zone>");
        let value = Value::Array(vec![
            Object::new("Zone").with("name", "denominator.io.").into(),
            Object::new("Zone")
                .with("name", "denominator.io.")
                .with("id", "ABCD")
                .into(),
        ]);

        let mut req = request();
        codec.encode(&value, &ty, &mut req).unwrap();
        let response = HttpResponse::new(200)
            .with_header("content-type", "application/json")
            .with_body(req.body.unwrap());
        assert_eq!(codec.decode(response, &ty).unwrap(), Decoded::Value(value));
    }
}
