//! Handler shapes
//!
//! The role of a handler is decided at registration time by the type it is
//! wrapped in, never by inspecting the callable:
//! - [`Middleware`] receives a [`Next`] continuation
//! - [`Controller`] is terminal and receives no continuation
//! - [`ErrorMiddleware`] replaces default error handling

use std::fmt;
use std::sync::Arc;

use super::dispatcher::Next;
use crate::error::{Error, HandlerResult};
use crate::http::{Request, Response};

type MiddlewareFn = dyn Fn(&mut Request, &mut Response, Next<'_, '_>) -> HandlerResult + Send + Sync;
type ControllerFn = dyn Fn(&mut Request, &mut Response) -> HandlerResult + Send + Sync;
type ErrorMiddlewareFn = dyn Fn(&mut Request, &mut Response, &Error) -> HandlerResult + Send + Sync;

/// Chain stage that may hand control to the rest of the chain
#[derive(Clone)]
pub struct Middleware(Arc<MiddlewareFn>);

impl Middleware {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Request, &mut Response, Next<'_, '_>) -> HandlerResult + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub(crate) fn call(&self, req: &mut Request, res: &mut Response, next: Next<'_, '_>) -> HandlerResult {
        (self.0)(req, res, next)
    }
}

/// Terminal chain stage
#[derive(Clone)]
pub struct Controller(Arc<ControllerFn>);

impl Controller {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Request, &mut Response) -> HandlerResult + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub(crate) fn call(&self, req: &mut Request, res: &mut Response) -> HandlerResult {
        (self.0)(req, res)
    }
}

/// Handler invoked in place of the default error response
#[derive(Clone)]
pub struct ErrorMiddleware(Arc<ErrorMiddlewareFn>);

impl ErrorMiddleware {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Request, &mut Response, &Error) -> HandlerResult + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub(crate) fn call(&self, req: &mut Request, res: &mut Response, err: &Error) -> HandlerResult {
        (self.0)(req, res, err)
    }
}

/// A route chain entry, tagged with its role
#[derive(Clone)]
pub enum Handler {
    Middleware(Middleware),
    Controller(Controller),
}

impl From<Middleware> for Handler {
    fn from(m: Middleware) -> Self {
        Self::Middleware(m)
    }
}

impl From<Controller> for Handler {
    fn from(c: Controller) -> Self {
        Self::Controller(c)
    }
}

/// Anything that can be registered as a route chain
///
/// A controller alone, a single handler, or an ordered list whose last
/// element is the controller.
pub trait IntoChain {
    fn into_chain(self) -> Vec<Handler>;
}

impl IntoChain for Vec<Handler> {
    fn into_chain(self) -> Vec<Handler> {
        self
    }
}

impl IntoChain for Handler {
    fn into_chain(self) -> Vec<Handler> {
        vec![self]
    }
}

impl IntoChain for Controller {
    fn into_chain(self) -> Vec<Handler> {
        vec![Handler::Controller(self)]
    }
}

impl IntoChain for (Middleware, Controller) {
    fn into_chain(self) -> Vec<Handler> {
        vec![self.0.into(), self.1.into()]
    }
}

impl IntoChain for (Vec<Middleware>, Controller) {
    fn into_chain(self) -> Vec<Handler> {
        let (middlewares, controller) = self;
        middlewares
            .into_iter()
            .map(Handler::Middleware)
            .chain(std::iter::once(Handler::Controller(controller)))
            .collect()
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Middleware(_) => f.write_str("Middleware"),
            Self::Controller(_) => f.write_str("Controller"),
        }
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Middleware")
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Controller")
    }
}

impl fmt::Debug for ErrorMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ErrorMiddleware")
    }
}
