//! Routing module
//!
//! Provides Express-style routing:
//! - `/`-delimited patterns with `:name` dynamic segments
//! - An ordered route table keyed by pattern and method

mod matcher;
mod router;

pub use matcher::{extract_params, match_pattern, Params, Pattern, Segment};
pub use router::{Route, Router};
