//! Fixture HTTP server for exercising the JSON body codec over real HTTP.
//!
//! Serves zones from an in-memory store plus a few canned responses: a body
//! encoded as ISO-8859-1 with a matching `charset`, a list of ISO dates, and
//! an echo route that returns the request body and content type unchanged.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Accented id served by `/latin1/zone`; not representable in ASCII.
pub const LATIN1_ZONE_ID: &str = "ÁÉÍÓÚÀÈÌÒÙÄËÏÖÜÑ";

pub const DATES_JSON: &str = r#"["2020-01-02","2021-02-03"]"#;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

pub type Db = Arc<RwLock<Vec<Zone>>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Vec::new()));
    Router::new()
        .route("/zones", get(list_zones).post(create_zone))
        .route("/zones/{id}", get(get_zone).delete(delete_zone))
        .route("/latin1/zone", get(latin1_zone))
        .route("/dates", get(dates))
        .route("/echo", post(echo))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn list_zones(State(db): State<Db>) -> Json<Vec<Zone>> {
    Json(db.read().await.clone())
}

async fn create_zone(State(db): State<Db>, Json(mut zone): Json<Zone>) -> (StatusCode, Json<Zone>) {
    if zone.id.is_none() {
        zone.id = Some(Uuid::new_v4().to_string());
    }
    db.write().await.push(zone.clone());
    tracing::debug!(name = %zone.name, "zone created");
    (StatusCode::CREATED, Json(zone))
}

async fn get_zone(State(db): State<Db>, Path(id): Path<String>) -> Result<Json<Zone>, StatusCode> {
    let zones = db.read().await;
    zones
        .iter()
        .find(|zone| zone.id.as_deref() == Some(id.as_str()))
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn delete_zone(State(db): State<Db>, Path(id): Path<String>) -> StatusCode {
    let mut zones = db.write().await;
    let before = zones.len();
    zones.retain(|zone| zone.id.as_deref() != Some(id.as_str()));
    if zones.len() < before {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn latin1_zone() -> impl IntoResponse {
    let text = format!("{{\n  \"name\" : \"DENOMINATOR.IO.\",\n  \"id\" : \"{LATIN1_ZONE_ID}\"\n}}");
    let body: Vec<u8> = text.chars().map(|c| c as u32 as u8).collect();
    (
        [(header::CONTENT_TYPE, "application/json;charset=ISO-8859-1")],
        body,
    )
}

async fn dates() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], DATES_JSON)
}

async fn echo(headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    ([(header::CONTENT_TYPE, content_type)], body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_without_id_omits_field() {
        let zone = Zone {
            name: "denominator.io.".to_string(),
            id: None,
        };
        let json = serde_json::to_string(&zone).unwrap();
        assert_eq!(json, r#"{"name":"denominator.io."}"#);
    }

    #[test]
    fn zone_id_is_optional_on_input() {
        let zone: Zone = serde_json::from_str(r#"{"name":"a."}"#).unwrap();
        assert!(zone.id.is_none());
        let zone: Zone = serde_json::from_str(r#"{"name":"a.","id":"ABCD"}"#).unwrap();
        assert_eq!(zone.id.as_deref(), Some("ABCD"));
    }

    #[test]
    fn zone_rejects_missing_name() {
        let result: Result<Zone, _> = serde_json::from_str(r#"{"id":"ABCD"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn latin1_id_fits_in_one_byte_per_char() {
        assert!(LATIN1_ZONE_ID.chars().all(|c| (c as u32) < 0x100));
    }
}
