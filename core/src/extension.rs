//! Extension modules: configuration-time plugins that teach the engine about
//! specific value types.
//!
//! An extension only ever sees an `EngineBuilder`. The codec calls
//! `register` once while building a fresh engine and never consults the
//! extension again.

use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::engine::{EngineBuilder, FnAdapter, ObjectSchema};
use crate::error::BoxError;
use crate::value::{CustomValue, Value};

/// Registers adapters or object schemas with an engine under construction.
pub trait Extension: Send + Sync {
    fn register(&self, engine: &mut EngineBuilder);
}

impl Extension for ObjectSchema {
    fn register(&self, engine: &mut EngineBuilder) {
        engine.object(self.clone());
    }
}

/// `chrono::NaiveDate` as an ISO-8601 calendar date string (`2020-01-02`).
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDateExtension;

impl LocalDateExtension {
    pub const TYPE_NAME: &'static str = "LocalDate";
    const FORMAT: &'static str = "%Y-%m-%d";

    /// Wraps `date` the way this extension's adapter reads it.
    pub fn value(date: NaiveDate) -> Value {
        Value::Custom(CustomValue::new(Self::TYPE_NAME, date))
    }

    fn read(json: &JsonValue) -> Result<NaiveDate, BoxError> {
        let text = json.as_str().ok_or("expected an ISO-8601 date string")?;
        Ok(NaiveDate::parse_from_str(text, Self::FORMAT)?)
    }

    fn write(date: &NaiveDate) -> Result<JsonValue, BoxError> {
        Ok(JsonValue::String(date.format(Self::FORMAT).to_string()))
    }
}

impl Extension for LocalDateExtension {
    fn register(&self, engine: &mut EngineBuilder) {
        engine.adapter(FnAdapter::new(Self::TYPE_NAME, Self::read, Self::write));
    }
}

/// `uuid::Uuid` as a hyphenated string.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidExtension;

impl UuidExtension {
    pub const TYPE_NAME: &'static str = "Uuid";

    pub fn value(id: Uuid) -> Value {
        Value::Custom(CustomValue::new(Self::TYPE_NAME, id))
    }

    fn read(json: &JsonValue) -> Result<Uuid, BoxError> {
        let text = json.as_str().ok_or("expected a UUID string")?;
        Ok(Uuid::parse_str(text)?)
    }

    fn write(id: &Uuid) -> Result<JsonValue, BoxError> {
        Ok(JsonValue::String(id.hyphenated().to_string()))
    }
}

impl Extension for UuidExtension {
    fn register(&self, engine: &mut EngineBuilder) {
        engine.adapter(FnAdapter::new(Self::TYPE_NAME, Self::read, Self::write));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::TypeDescriptor;
    use crate::engine::JsonEngine;
    use crate::error::DecodeError;

    fn engine(extensions: &[&dyn Extension]) -> JsonEngine {
        let mut builder = JsonEngine::builder();
        for extension in extensions {
            builder.extension(*extension);
        }
        builder.build()
    }

    #[test]
    fn local_dates_round_trip() {
        let engine = engine(&[&LocalDateExtension]);
        let ty = TypeDescriptor::sequence_of(TypeDescriptor::named("LocalDate"));
        let value = engine.read_str(r#"["2020-01-02","2021-02-03"]"#, &ty).unwrap();
        assert_eq!(
            value,
            Value::Array(vec![
                LocalDateExtension::value(NaiveDate::from_ymd_opt(2020, 1, 2).unwrap()),
                LocalDateExtension::value(NaiveDate::from_ymd_opt(2021, 2, 3).unwrap()),
            ])
        );
        let json = engine.write_json(&value, &ty).unwrap();
        assert_eq!(json, serde_json::json!(["2020-01-02", "2021-02-03"]));
    }

    #[test]
    fn bad_date_is_an_adapter_error() {
        let engine = engine(&[&LocalDateExtension]);
        let err = engine
            .read_str(r#"["2020-13-45"]"#, &"list<LocalDate>".parse().unwrap())
            .unwrap_err();
        assert!(matches!(err, DecodeError::Adapter { ref path, .. } if path == "$[0]"));
    }

    struct CompactDates;

    impl Extension for CompactDates {
        fn register(&self, engine: &mut EngineBuilder) {
            engine.adapter(FnAdapter::new(
                LocalDateExtension::TYPE_NAME,
                |json| {
                    let text = json.as_str().ok_or("expected a compact date")?;
                    Ok(NaiveDate::parse_from_str(text, "%Y%m%d")?)
                },
                |date: &NaiveDate| Ok(JsonValue::String(date.format("%Y%m%d").to_string())),
            ));
        }
    }

    #[test]
    fn later_date_adapter_overrides_only_dates() {
        let zone = ObjectSchema::new("Zone").field("name", TypeDescriptor::String);
        let engine = engine(&[&LocalDateExtension, &zone, &CompactDates]);
        let date = LocalDateExtension::value(NaiveDate::from_ymd_opt(2020, 1, 2).unwrap());

        let json = engine.write_json(&date, &TypeDescriptor::named("LocalDate")).unwrap();
        assert_eq!(json, JsonValue::String("20200102".to_string()));

        let zone = engine.read_str(r#"{"name":"a."}"#, &TypeDescriptor::named("Zone")).unwrap();
        assert_eq!(zone.get("name"), Some(&Value::from("a.")));
    }

    #[test]
    fn uuids_round_trip() {
        let engine = engine(&[&UuidExtension]);
        let id = Uuid::new_v4();
        let value = UuidExtension::value(id);
        let json = engine.write_json(&value, &TypeDescriptor::Any).unwrap();
        assert_eq!(json, JsonValue::String(id.to_string()));
        let back = engine.read_json(&json, &TypeDescriptor::named("Uuid")).unwrap();
        assert_eq!(back.downcast_ref::<Uuid>(), Some(&id));
    }

    #[test]
    fn schema_is_an_extension() {
        let zone = ObjectSchema::new("Zone").field("name", TypeDescriptor::String);
        let engine = engine(&[&zone, &UuidExtension]);
        assert!(engine.is_registered("Zone"));
        assert!(engine.is_registered("Uuid"));
        assert!(!engine.is_registered("LocalDate"));
    }
}
