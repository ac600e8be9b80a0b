//! Request body decoding
//!
//! Dispatch is driven solely by the `Content-Type` header, with any
//! parameters after `;` stripped before comparison:
//! - `application/json` -> [`Body::Json`]
//! - `application/x-www-form-urlencoded` -> [`Body::Form`], duplicate keys kept
//! - `text/plain` -> [`Body::Text`], strict UTF-8
//! - `multipart/form-data` -> [`Body::Multipart`], files spooled to disk
//! - anything else -> [`Body::Text`], lossy UTF-8

use hyper::body::Bytes;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
use hyper::HeaderMap;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

use super::multipart::{self, MultipartForm};
use crate::error::{Error, Result};

/// Form fields, every value kept per key in arrival order
pub type FormData = HashMap<String, Vec<String>>;

/// A decoded request body
#[derive(Debug, Default)]
pub enum Body {
    /// No body, or a zero-length one
    #[default]
    Empty,
    Json(Value),
    Form(FormData),
    Multipart(MultipartForm),
    Text(String),
}

impl Body {
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub const fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub const fn as_form(&self) -> Option<&FormData> {
        match self {
            Self::Form(form) => Some(form),
            _ => None,
        }
    }

    pub const fn as_multipart(&self) -> Option<&MultipartForm> {
        match self {
            Self::Multipart(form) => Some(form),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Media type of a `Content-Type` value, parameters stripped
pub fn media_type(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or("").trim()
}

/// Decode `raw` according to the request headers
///
/// Only the first `Content-Length` bytes are considered when the header is
/// present. Multipart file parts are written below `upload_dir`.
pub fn decode(headers: &HeaderMap, raw: &Bytes, upload_dir: &Path) -> Result<Body> {
    let raw = limit_to_content_length(headers, raw);
    if raw.is_empty() {
        return Ok(Body::Empty);
    }

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let media = media_type(content_type);

    if media.eq_ignore_ascii_case("application/json") {
        Ok(Body::Json(serde_json::from_slice(raw)?))
    } else if media.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
        Ok(Body::Form(parse_form(raw)))
    } else if media.eq_ignore_ascii_case("text/plain") {
        let text = std::str::from_utf8(raw).map_err(|e| Error::BodyParse(e.to_string()))?;
        Ok(Body::Text(text.to_string()))
    } else if media.eq_ignore_ascii_case("multipart/form-data") {
        let boundary = multipart::parse_boundary(content_type)?;
        Ok(Body::Multipart(multipart::parse(raw, &boundary, upload_dir)?))
    } else {
        Ok(Body::Text(String::from_utf8_lossy(raw).into_owned()))
    }
}

fn limit_to_content_length<'a>(headers: &HeaderMap, raw: &'a [u8]) -> &'a [u8] {
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok());

    match declared {
        Some(len) if len < raw.len() => &raw[..len],
        _ => raw,
    }
}

fn parse_form(raw: &[u8]) -> FormData {
    let mut form = FormData::new();
    for (key, value) in url::form_urlencoded::parse(raw) {
        form.entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    form
}
