//! Request context
//!
//! Built once per incoming request. Only the decoded body and the route
//! parameters are filled in after construction, each exactly once.

use chrono::{DateTime, Local};
use hyper::body::Bytes;
use hyper::{HeaderMap, Method};
use std::collections::HashMap;

use super::body::Body;
use crate::routing::Params;

/// Query parameters, last value wins per key
pub type Query = HashMap<String, String>;

#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    path_without_query: String,
    headers: HeaderMap,
    raw_body: Bytes,
    body: Body,
    query: Query,
    params: Params,
    received_at: DateTime<Local>,
}

impl Request {
    /// Build a request from the method, the raw request target and headers
    pub fn new(method: Method, target: &str, headers: HeaderMap) -> Self {
        let (path_without_query, query) = split_target(target);

        Self {
            method,
            path: target.to_string(),
            path_without_query: path_without_query.to_string(),
            headers,
            raw_body: Bytes::new(),
            body: Body::Empty,
            query: parse_query(query),
            params: Params::new(),
            received_at: Local::now(),
        }
    }

    #[must_use]
    pub fn with_raw_body(mut self, raw_body: impl Into<Bytes>) -> Self {
        self.raw_body = raw_body.into();
        self
    }

    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Raw request target, query string included
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn path_without_query(&self) -> &str {
        &self.path_without_query
    }

    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header, if it is valid visible ASCII
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub const fn raw_body(&self) -> &Bytes {
        &self.raw_body
    }

    /// Decoded body
    pub const fn body(&self) -> &Body {
        &self.body
    }

    pub const fn query(&self) -> &Query {
        &self.query
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    pub const fn params(&self) -> &Params {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub const fn received_at(&self) -> DateTime<Local> {
        self.received_at
    }

    /// Whether the method never carries a decodable body
    pub fn is_get_class(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }

    pub(crate) fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    pub(crate) fn bind_params(&mut self, params: Params) {
        debug_assert!(self.params.is_empty(), "route params bound twice");
        self.params = params;
    }
}

/// Split a request target into path and query, dropping any fragment
fn split_target(target: &str) -> (&str, &str) {
    let target = target.split_once('#').map_or(target, |(before, _)| before);
    target.split_once('?').unwrap_or((target, ""))
}

/// Percent-decode a query string; blank values are dropped
fn parse_query(query: &str) -> Query {
    url::form_urlencoded::parse(query.as_bytes())
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}
