//! Route pattern matching module
//!
//! A pattern is a `/`-delimited template of literal and `:name` segments.
//! Pattern and path must split into the same number of segments; there are
//! no wildcard or greedy segments, and trailing slashes are significant.

use std::collections::HashMap;
use std::fmt;

/// Named parameters bound by a dynamic segment
pub type Params = HashMap<String, String>;

/// One `/`-delimited piece of a pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Must equal the path segment byte for byte
    Literal(String),
    /// `:name`, binds any non-empty path segment
    Param(String),
}

/// A parsed route pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    pub fn parse(raw: &str) -> Self {
        let segments = raw
            .split('/')
            .map(|seg| match seg.strip_prefix(':') {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(seg.to_string()),
            })
            .collect();

        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    /// The pattern as declared
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Check whether `path` matches this pattern
    pub fn matches(&self, path: &str) -> bool {
        let mut parts = path.split('/');

        for segment in &self.segments {
            match parts.next() {
                Some(part) if segment_matches(segment, part) => {}
                _ => return false,
            }
        }

        parts.next().is_none()
    }

    /// Match `path` and collect the dynamic segment bindings
    ///
    /// Returns `None` when the path does not match.
    pub fn captures(&self, path: &str) -> Option<Params> {
        if !self.matches(path) {
            return None;
        }

        let params = self
            .segments
            .iter()
            .zip(path.split('/'))
            .filter_map(|(segment, part)| match segment {
                Segment::Param(name) => Some((name.clone(), part.to_string())),
                Segment::Literal(_) => None,
            })
            .collect();

        Some(params)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn segment_matches(segment: &Segment, part: &str) -> bool {
    match segment {
        Segment::Param(_) => !part.is_empty(),
        Segment::Literal(literal) => literal == part,
    }
}

/// Check if a raw path matches a raw pattern
pub fn match_pattern(pattern: &str, path: &str) -> bool {
    Pattern::parse(pattern).matches(path)
}

/// Extract named parameters; empty when the path does not match
pub fn extract_params(pattern: &str, path: &str) -> Params {
    Pattern::parse(pattern).captures(path).unwrap_or_default()
}
