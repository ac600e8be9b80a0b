//! Dispatch module
//!
//! Handler shapes and the continuation-passing chain executor.

mod dispatcher;
mod handler;

pub use dispatcher::{Dispatcher, Next};
pub use handler::{Controller, ErrorMiddleware, Handler, IntoChain, Middleware};
