//! expressway
//!
//! An Express-style HTTP dispatch engine: routes are declared as
//! `/`-delimited patterns with `:name` segments, each bound to a chain of
//! middleware ending in a controller. Global middleware runs first, a
//! single error middleware catches every failure, and request bodies are
//! decoded by content type before dispatch.

pub mod app;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod logger;
pub mod routing;
pub mod server;

pub use app::App;
pub use dispatch::{Controller, ErrorMiddleware, Handler, Middleware, Next};
pub use error::{Error, HandlerResult, Result};
pub use http::{Body, Request, Response};
