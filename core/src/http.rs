//! HTTP transport types for the host-does-IO pattern.
//!
//! # Design
//! These types describe HTTP requests and responses as plain data. The codec
//! writes bodies into `HttpRequest` values and reads bodies out of
//! `HttpResponse` values without ever touching the network. The caller
//! (host) executes the actual I/O and hands the decoder a fully read body.
//!
//! All fields use owned types (`String`, `Vec`) so values can be moved
//! between the transport and the codec without lifetime concerns.

use crate::charset::Charset;

/// Media type written by the encoder.
pub const APPLICATION_JSON: &str = "application/json";

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// Anything that can receive an encoded request body.
///
/// The encoder calls `set_body` exactly once per successful `encode`.
pub trait BodyCarrier {
    fn set_body(&mut self, body: Vec<u8>, charset: Charset, content_type: &str);
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub charset: Option<Charset>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
            charset: None,
        }
    }

    /// First value of the header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

impl BodyCarrier for HttpRequest {
    fn set_body(&mut self, body: Vec<u8>, charset: Charset, content_type: &str) {
        self.headers
            .retain(|(name, _)| !name.eq_ignore_ascii_case("content-type"));
        self.headers
            .push(("content-type".to_string(), content_type.to_string()));
        self.body = Some(body);
        self.charset = Some(charset);
    }
}

/// An HTTP response described as plain data.
///
/// Constructed by the caller after executing a request, then passed by value
/// to `JsonDecoder::decode`. A `None` body and an empty body are treated the
/// same way by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// First value of the header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let response = HttpResponse::new(200).with_header("Content-Type", "application/json");
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.header("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(response.header("accept"), None);
    }

    #[test]
    fn set_body_replaces_existing_content_type() {
        let mut req = HttpRequest::new(HttpMethod::Post, "http://localhost:3000/zones");
        req.headers
            .push(("Content-Type".to_string(), "text/plain".to_string()));
        req.headers.push(("accept".to_string(), "*/*".to_string()));

        req.set_body(b"{}".to_vec(), Charset::utf8(), APPLICATION_JSON);

        assert_eq!(
            req.headers,
            vec![
                ("accept".to_string(), "*/*".to_string()),
                ("content-type".to_string(), "application/json".to_string()),
            ]
        );
        assert_eq!(req.body.as_deref(), Some(&b"{}"[..]));
        assert_eq!(req.charset, Some(Charset::utf8()));
    }
}
