//! Response context and wire conversion
//!
//! A [`Response`] collects status, headers and body while the chain runs.
//! It may be sent exactly once; the transport writes it out afterwards.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Response {
    status_code: u16,
    headers: BTreeMap<String, String>,
    body: Value,
    sent: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub const fn new() -> Self {
        Self {
            status_code: 200,
            headers: BTreeMap::new(),
            body: Value::Null,
            sent: false,
        }
    }

    /// Set the status code
    pub fn status(&mut self, status_code: u16) -> &mut Self {
        self.status_code = status_code;
        self
    }

    pub const fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Set a header, replacing any previous value under the same name
    ///
    /// Names are case-insensitive and stored lowercased.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let mut name = name.into();
        name.make_ascii_lowercase();
        self.headers.insert(name, value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub const fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub const fn body(&self) -> &Value {
        &self.body
    }

    pub const fn is_sent(&self) -> bool {
        self.sent
    }

    /// Send the response with `body`
    ///
    /// Fails with [`Error::DuplicateSend`] if the response was already sent.
    pub fn send(&mut self, body: impl Into<Value>) -> Result<()> {
        if self.sent {
            return Err(Error::DuplicateSend);
        }
        self.body = body.into();
        self.sent = true;
        Ok(())
    }

    /// Send the response without a body
    pub fn end(&mut self) -> Result<()> {
        self.send(Value::Null)
    }

    /// Serialize `body` and send it; a falsy body (null, `false`, zero,
    /// empty string or container) is rejected
    pub fn json<T: Serialize>(&mut self, body: &T) -> Result<()> {
        let value = serde_json::to_value(body).map_err(Error::handler)?;
        if is_empty_body(&value) {
            return Err(Error::InvalidBody);
        }
        self.send(value)
    }

    /// Encoded body bytes: containers as JSON, strings verbatim, other
    /// scalars stringified, null as empty
    pub fn body_bytes(&self) -> Bytes {
        match &self.body {
            Value::Null => Bytes::new(),
            Value::String(s) => Bytes::from(s.clone()),
            value @ (Value::Object(_) | Value::Array(_)) => Bytes::from(value.to_string()),
            other => Bytes::from(other.to_string()),
        }
    }

    /// Convert into a wire response
    ///
    /// Caller headers are written first, then the forced
    /// `Content-Type: application/json`.
    pub fn into_hyper(self, server_name: &str) -> hyper::Response<Full<Bytes>> {
        let body = self.body_bytes();
        let status = StatusCode::from_u16(self.status_code).unwrap_or_else(|_| {
            crate::logger::log_warning(&format!(
                "Invalid status code {}, using 500",
                self.status_code
            ));
            StatusCode::INTERNAL_SERVER_ERROR
        });

        let mut builder = hyper::Response::builder()
            .status(status)
            .header("Server", server_name);
        for (name, value) in &self.headers {
            if name == "content-type" {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder
            .header("Content-Type", "application/json")
            .body(Full::new(body))
            .unwrap_or_else(|e| {
                log_build_error(status.as_str(), &e);
                build_error_response(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
            })
    }
}

fn is_empty_body(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => true,
        Value::Number(n) => n.as_f64().is_some_and(|f| f.abs() < f64::EPSILON),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Build a JSON error response outside the dispatch pipeline
pub fn build_error_response(status: StatusCode, message: &str) -> hyper::Response<Full<Bytes>> {
    let body = serde_json::json!({ "error": message }).to_string();
    hyper::Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|e| {
            log_build_error(status.as_str(), &e);
            hyper::Response::new(Full::new(Bytes::new()))
        })
}

/// Build 413 Payload Too Large response
pub fn build_413_response() -> hyper::Response<Full<Bytes>> {
    build_error_response(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large")
}

/// Log response build error
fn log_build_error(status: &str, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}
