//! Route table
//!
//! Maps each declared pattern to its per-method handler chains. Patterns are
//! tried in declaration order and the first one that matches the path and
//! has a chain for the requested method wins, even if a later pattern would
//! be more specific.

use hyper::Method;
use std::collections::HashMap;

use super::matcher::{Params, Pattern};
use crate::dispatch::{Controller, Handler, Middleware};
use crate::error::{Error, Result};

/// A registered method + pattern with its validated handler chain
#[derive(Debug, Clone)]
pub struct Route {
    pattern: Pattern,
    method: Method,
    middlewares: Vec<Middleware>,
    controller: Controller,
}

impl Route {
    /// Validate a handler chain: non-empty, a controller last, middleware
    /// everywhere else
    pub fn new(method: Method, pattern: Pattern, mut handlers: Vec<Handler>) -> Result<Self> {
        let controller = match handlers.pop() {
            Some(Handler::Controller(controller)) => controller,
            Some(Handler::Middleware(_)) => {
                return Err(Error::InvalidHandlerChain(format!(
                    "{method} {pattern}: last handler must be a controller"
                )))
            }
            None => {
                return Err(Error::InvalidHandlerChain(format!(
                    "{method} {pattern}: missing controller"
                )))
            }
        };

        let middlewares = handlers
            .into_iter()
            .enumerate()
            .map(|(i, handler)| match handler {
                Handler::Middleware(middleware) => Ok(middleware),
                Handler::Controller(_) => Err(Error::InvalidHandlerChain(format!(
                    "{method} {pattern}: controller at position {i} is not last"
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            pattern,
            method,
            middlewares,
            controller,
        })
    }

    pub const fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub const fn method(&self) -> &Method {
        &self.method
    }

    pub fn middlewares(&self) -> &[Middleware] {
        &self.middlewares
    }

    pub const fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Chain length, controller included
    pub fn stages(&self) -> usize {
        self.middlewares.len() + 1
    }
}

#[derive(Debug)]
struct Entry {
    pattern: Pattern,
    methods: HashMap<Method, Route>,
}

/// Ordered route table
#[derive(Debug, Default)]
pub struct Router {
    entries: Vec<Entry>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler chain for `method` on `pattern`
    ///
    /// Registering the same method and pattern again replaces the chain but
    /// keeps the pattern's original position.
    pub fn register(&mut self, method: Method, pattern: &str, handlers: Vec<Handler>) -> Result<&Route> {
        let pattern = Pattern::parse(pattern);
        let route = Route::new(method.clone(), pattern.clone(), handlers)?;

        let index = match self.entries.iter().position(|e| e.pattern == pattern) {
            Some(index) => index,
            None => {
                self.entries.push(Entry {
                    pattern,
                    methods: HashMap::new(),
                });
                self.entries.len() - 1
            }
        };

        let methods = &mut self.entries[index].methods;
        methods.insert(method.clone(), route);
        Ok(&methods[&method])
    }

    /// Find the first route matching `path` that handles `method`
    ///
    /// A path that matches a pattern without a chain for `method` is
    /// reported as [`Error::RouteNotFound`], the same as no match at all.
    pub fn lookup(&self, method: &Method, path: &str) -> Result<(&Route, Params)> {
        self.entries
            .iter()
            .filter_map(|entry| entry.methods.get(method))
            .find_map(|route| route.pattern.captures(path).map(|params| (route, params)))
            .ok_or(Error::RouteNotFound)
    }

    /// Number of distinct patterns
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All registered routes, grouped by pattern in declaration order
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.entries.iter().flat_map(|e| e.methods.values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_controller() -> Handler {
        Controller::new(|_req, res| res.send("ok")).into()
    }

    fn tagged(tag: &'static str) -> Handler {
        Controller::new(move |_req, res| res.send(tag)).into()
    }

    fn pass() -> Handler {
        Middleware::new(|req, res, next| next.run(req, res)).into()
    }

    #[test]
    fn test_register_and_lookup() {
        let mut router = Router::new();
        router.register(Method::GET, "/hello/:id", vec![ok_controller()]).unwrap();

        let (route, params) = router.lookup(&Method::GET, "/hello/42").unwrap();
        assert_eq!(route.pattern().as_str(), "/hello/:id");
        assert_eq!(params["id"], "42");
    }

    #[test]
    fn test_empty_chain_rejected() {
        let mut router = Router::new();
        let err = router.register(Method::GET, "/", Vec::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidHandlerChain(_)));
        assert!(router.is_empty());
    }

    #[test]
    fn test_chain_must_end_with_controller() {
        let mut router = Router::new();
        let err = router.register(Method::GET, "/", vec![pass()]).unwrap_err();
        assert!(matches!(err, Error::InvalidHandlerChain(_)));

        let err = router
            .register(Method::GET, "/", vec![ok_controller(), ok_controller()])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidHandlerChain(ref msg) if msg.contains("position 0")));
    }

    #[test]
    fn test_first_declared_pattern_wins() {
        let mut router = Router::new();
        router.register(Method::GET, "/users/:id", vec![tagged("dynamic")]).unwrap();
        router.register(Method::GET, "/users/me", vec![tagged("literal")]).unwrap();

        let (route, params) = router.lookup(&Method::GET, "/users/me").unwrap();
        assert_eq!(route.pattern().as_str(), "/users/:id");
        assert_eq!(params["id"], "me");
    }

    #[test]
    fn test_method_mismatch_is_not_found() {
        let mut router = Router::new();
        router.register(Method::GET, "/items", vec![ok_controller()]).unwrap();
        assert!(matches!(
            router.lookup(&Method::POST, "/items"),
            Err(Error::RouteNotFound)
        ));
    }

    #[test]
    fn test_later_pattern_serves_other_method() {
        let mut router = Router::new();
        router.register(Method::GET, "/items/:id", vec![ok_controller()]).unwrap();
        router.register(Method::DELETE, "/items/:key", vec![ok_controller()]).unwrap();

        let (route, params) = router.lookup(&Method::DELETE, "/items/9").unwrap();
        assert_eq!(route.method(), &Method::DELETE);
        assert_eq!(params["key"], "9");
    }

    #[test]
    fn test_methods_share_pattern_entry() {
        let mut router = Router::new();
        router.register(Method::GET, "/a", vec![ok_controller()]).unwrap();
        router.register(Method::POST, "/a", vec![pass(), ok_controller()]).unwrap();
        assert_eq!(router.len(), 1);
        assert_eq!(router.routes().count(), 2);

        let (route, _) = router.lookup(&Method::POST, "/a").unwrap();
        assert_eq!(route.stages(), 2);
    }

    #[test]
    fn test_unknown_path() {
        let router = Router::new();
        assert!(matches!(
            router.lookup(&Method::GET, "/nope"),
            Err(Error::RouteNotFound)
        ));
    }
}
