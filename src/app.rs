//! Application facade
//!
//! `App` owns the route table, the global middlewares and the optional
//! error middleware. It is built once before serving starts and is then
//! shared read-only by every connection.
//!
//! Per request: decode body (non-GET) -> route lookup -> dispatch chain ->
//! route any failure to the error middleware or the default JSON error.

use hyper::{Method, StatusCode};
use serde_json::json;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::config::HttpConfig;
use crate::dispatch::{Dispatcher, ErrorMiddleware, IntoChain, Middleware};
use crate::error::{Error, HandlerResult, Result};
use crate::http::{self, Request, Response};
use crate::logger;
use crate::routing::Router;

#[derive(Debug, Default)]
pub struct App {
    router: Router,
    middlewares: Vec<Middleware>,
    error_middleware: Option<ErrorMiddleware>,
    http: HttpConfig,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(http: HttpConfig) -> Self {
        Self {
            http,
            ..Self::default()
        }
    }

    /// Append a global middleware; globals run before route middlewares in
    /// registration order
    pub fn use_middleware(&mut self, middleware: Middleware) -> &mut Self {
        self.middlewares.push(middleware);
        self
    }

    /// Install the error middleware; only one may ever be registered
    pub fn use_error_middleware(&mut self, handler: ErrorMiddleware) -> Result<&mut Self> {
        if self.error_middleware.is_some() {
            return Err(Error::DuplicateErrorMiddleware);
        }
        self.error_middleware = Some(handler);
        Ok(self)
    }

    /// Register a handler chain for `method` on `pattern`
    pub fn route(&mut self, method: Method, pattern: &str, chain: impl IntoChain) -> Result<&mut Self> {
        let route = self.router.register(method, pattern, chain.into_chain())?;
        logger::log_route_registered(route.method(), pattern, route.stages());
        Ok(self)
    }

    pub fn get(&mut self, pattern: &str, chain: impl IntoChain) -> Result<&mut Self> {
        self.route(Method::GET, pattern, chain)
    }

    pub fn post(&mut self, pattern: &str, chain: impl IntoChain) -> Result<&mut Self> {
        self.route(Method::POST, pattern, chain)
    }

    pub fn put(&mut self, pattern: &str, chain: impl IntoChain) -> Result<&mut Self> {
        self.route(Method::PUT, pattern, chain)
    }

    pub fn patch(&mut self, pattern: &str, chain: impl IntoChain) -> Result<&mut Self> {
        self.route(Method::PATCH, pattern, chain)
    }

    pub fn delete(&mut self, pattern: &str, chain: impl IntoChain) -> Result<&mut Self> {
        self.route(Method::DELETE, pattern, chain)
    }

    pub const fn router(&self) -> &Router {
        &self.router
    }

    pub const fn http_config(&self) -> &HttpConfig {
        &self.http
    }

    /// Run the full pipeline for one request
    ///
    /// Every failure is handled here; the returned response may still be
    /// unsent if the chain halted without producing one.
    pub fn handle(&self, req: &mut Request) -> Response {
        let mut res = Response::new();
        if let Err(err) = self.dispatch(req, &mut res) {
            self.handle_error(req, &mut res, err);
        }
        res
    }

    fn dispatch(&self, req: &mut Request, res: &mut Response) -> HandlerResult {
        if !req.is_get_class() {
            let body = http::decode(req.headers(), req.raw_body(), &self.http.upload_dir())?;
            req.set_body(body);
        }

        let (route, params) = match self.router.lookup(req.method(), req.path_without_query()) {
            Ok(found) => found,
            Err(Error::RouteNotFound) => {
                res.status(StatusCode::NOT_FOUND.as_u16());
                return res.send(json!({ "error": Error::RouteNotFound.public_message() }));
            }
            Err(err) => return Err(err),
        };
        req.bind_params(params);

        let mut dispatcher = Dispatcher::new(&self.middlewares, route);
        let result = catch_panic(|| dispatcher.run(req, res));

        if self.http.debug_mode && result.is_ok() && !dispatcher.reached_controller() {
            logger::log_debug(&format!(
                "{} {}: chain halted at stage {} of {}",
                req.method(),
                req.path(),
                dispatcher.index(),
                dispatcher.stages()
            ));
        }
        result
    }

    fn handle_error(&self, req: &mut Request, res: &mut Response, err: Error) {
        if matches!(err, Error::DuplicateSend) {
            logger::log_error(&format!(
                "{} {}: handler sent the response twice",
                req.method(),
                req.path()
            ));
        }
        if self.http.debug_mode {
            logger::log_debug(&format!("{} {}: {err:?}", req.method(), req.path()));
        }

        if let Some(handler) = &self.error_middleware {
            if let Err(e) = catch_panic(|| handler.call(req, res, &err)) {
                logger::log_error(&format!("Error middleware failed: {e}"));
                if !res.is_sent() {
                    send_default_error(res, &Error::Handler(e.to_string()));
                }
            }
            return;
        }

        if res.is_sent() {
            logger::log_error(&format!(
                "{} {}: error after response was sent: {err}",
                req.method(),
                req.path()
            ));
            return;
        }
        send_default_error(res, &err);
    }
}

fn send_default_error(res: &mut Response, err: &Error) {
    res.status(err.status_code().as_u16());
    if let Err(e) = res.send(json!({ "error": err.public_message() })) {
        logger::log_error(&format!("Failed to send error response: {e}"));
    }
}

/// Run `f`, turning a panic into a handler error
fn catch_panic(f: impl FnOnce() -> HandlerResult) -> HandlerResult {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| Err(Error::Handler(panic_message(&*payload))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Controller, Handler};
    use crate::http::Body;
    use hyper::header::CONTENT_TYPE;
    use hyper::HeaderMap;
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    type Trace = Arc<Mutex<Vec<String>>>;

    fn recording(trace: &Trace, name: &str) -> Middleware {
        let trace = Arc::clone(trace);
        let name = name.to_string();
        Middleware::new(move |req, res, next| {
            trace.lock().unwrap().push(name.clone());
            next.run(req, res)
        })
    }

    fn echo(trace: &Trace) -> Controller {
        let trace = Arc::clone(trace);
        Controller::new(move |req, res| {
            trace.lock().unwrap().push("controller".to_string());
            res.json(&json!({ "path": req.path(), "params": req.params() }))
        })
    }

    fn get(path: &str) -> Request {
        Request::new(Method::GET, path, HeaderMap::new())
    }

    fn post(path: &str, content_type: &str, body: &str) -> Request {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, content_type.parse().unwrap());
        Request::new(Method::POST, path, headers).with_raw_body(body.to_string())
    }

    #[test]
    fn test_global_then_route_order() {
        let trace = Trace::default();
        let mut app = App::new();
        app.use_middleware(recording(&trace, "A"))
            .use_middleware(recording(&trace, "B"));
        app.get("/x", (recording(&trace, "C"), echo(&trace))).unwrap();

        let res = app.handle(&mut get("/x"));
        assert_eq!(res.status_code(), 200);
        assert_eq!(*trace.lock().unwrap(), vec!["A", "B", "C", "controller"]);
    }

    #[test]
    fn test_params_bound_and_query_ignored_for_matching() {
        let trace = Trace::default();
        let mut app = App::new();
        app.get("/hello/:id", echo(&trace)).unwrap();

        let mut req = get("/hello/42?verbose=1");
        let res = app.handle(&mut req);
        assert_eq!(req.param("id"), Some("42"));
        assert_eq!(res.body()["params"]["id"], "42");
        assert_eq!(res.body()["path"], "/hello/42?verbose=1");
    }

    #[test]
    fn test_not_found_skips_middleware() {
        let trace = Trace::default();
        let mut app = App::new();
        app.use_middleware(recording(&trace, "A"));
        app.get("/known", echo(&trace)).unwrap();

        let res = app.handle(&mut get("/unknown"));
        assert_eq!(res.status_code(), 404);
        assert_eq!(res.body(), &json!({ "error": "Not Found" }));
        assert!(trace.lock().unwrap().is_empty());
    }

    #[test]
    fn test_method_mismatch_is_404() {
        let trace = Trace::default();
        let mut app = App::new();
        app.get("/only-get", echo(&trace)).unwrap();

        let res = app.handle(&mut post("/only-get", "text/plain", "x"));
        assert_eq!(res.status_code(), 404);
    }

    #[test]
    fn test_second_error_middleware_rejected() {
        let mut app = App::new();
        app.use_error_middleware(ErrorMiddleware::new(|_req, _res, _err| Ok(())))
            .unwrap();
        let err = app
            .use_error_middleware(ErrorMiddleware::new(|_req, _res, _err| Ok(())))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateErrorMiddleware));
    }

    #[test]
    fn test_invalid_chain_rejected_at_registration() {
        let mut app = App::new();
        let pass = Middleware::new(|req, res, next| next.run(req, res));
        assert!(matches!(
            app.post("/x", vec![Handler::Middleware(pass)]),
            Err(Error::InvalidHandlerChain(_))
        ));
        assert!(matches!(
            app.post("/x", Vec::<Handler>::new()),
            Err(Error::InvalidHandlerChain(_))
        ));
    }

    #[test]
    fn test_handler_error_default_500() {
        let mut app = App::new();
        app.get("/fail", Controller::new(|_req, _res| Err(Error::handler("db down"))))
            .unwrap();

        let res = app.handle(&mut get("/fail"));
        assert_eq!(res.status_code(), 500);
        assert_eq!(res.body(), &json!({ "error": "Something went wrong" }));
    }

    #[test]
    fn test_panic_is_caught() {
        let mut app = App::new();
        app.get("/panic", Controller::new(|_req, _res| panic!("kaboom")))
            .unwrap();

        let res = app.handle(&mut get("/panic"));
        assert_eq!(res.status_code(), 500);
        assert!(res.is_sent());
    }

    #[test]
    fn test_error_middleware_receives_error() {
        let mut app = App::new();
        app.use_error_middleware(ErrorMiddleware::new(|req, res, err| {
            res.status(400).json(&json!({
                "message": format!("CUSTOM ERROR: {err}"),
                "path": req.path(),
            }))
        }))
        .unwrap();
        app.get("/fail", Controller::new(|_req, _res| Err(Error::handler("nope"))))
            .unwrap();

        let res = app.handle(&mut get("/fail"));
        assert_eq!(res.status_code(), 400);
        assert_eq!(res.body()["message"], "CUSTOM ERROR: nope");
        assert_eq!(res.body()["path"], "/fail");
    }

    #[test]
    fn test_error_middleware_panic_falls_back() {
        let mut app = App::new();
        app.use_error_middleware(ErrorMiddleware::new(|_req, _res, _err| panic!("worse")))
            .unwrap();
        app.get("/fail", Controller::new(|_req, _res| Err(Error::handler("bad"))))
            .unwrap();

        let res = app.handle(&mut get("/fail"));
        assert_eq!(res.status_code(), 500);
        assert!(res.is_sent());
    }

    #[test]
    fn test_error_after_send_is_swallowed() {
        let mut app = App::new();
        app.get(
            "/late",
            Controller::new(|_req, res| {
                res.status(201).send("first")?;
                Err(Error::handler("after send"))
            }),
        )
        .unwrap();

        let res = app.handle(&mut get("/late"));
        assert_eq!(res.status_code(), 201);
        assert_eq!(res.body(), &Value::from("first"));
    }

    #[test]
    fn test_duplicate_send_surfaces_as_error() {
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = Arc::clone(&seen);

        let mut app = App::new();
        app.use_error_middleware(ErrorMiddleware::new(move |_req, _res, err| {
            *seen_clone.lock().unwrap() = Some(matches!(err, Error::DuplicateSend));
            Ok(())
        }))
        .unwrap();
        app.get(
            "/twice",
            Controller::new(|_req, res| {
                res.send("one")?;
                res.send("two")
            }),
        )
        .unwrap();

        let res = app.handle(&mut get("/twice"));
        assert_eq!(res.body(), &Value::from("one"));
        assert_eq!(*seen.lock().unwrap(), Some(true));
    }

    #[test]
    fn test_json_body_decoded() {
        let mut app = App::new();
        app.post(
            "/echo",
            Controller::new(|req, res| {
                let value = req.body().as_json().cloned().unwrap_or(Value::Null);
                res.send(value)
            }),
        )
        .unwrap();

        let res = app.handle(&mut post("/echo", "application/json", r#"{"x":1}"#));
        assert_eq!(res.body(), &json!({ "x": 1 }));
    }

    #[test]
    fn test_form_body_decoded() {
        let mut app = App::new();
        app.post(
            "/form",
            Controller::new(|req, res| {
                let form = req.body().as_form().cloned().unwrap_or_default();
                res.send(json!(form))
            }),
        )
        .unwrap();

        let res = app.handle(&mut post(
            "/form",
            "application/x-www-form-urlencoded",
            "a=1&a=2&b=3",
        ));
        assert_eq!(res.body(), &json!({ "a": ["1", "2"], "b": ["3"] }));
    }

    #[test]
    fn test_malformed_body_default_400() {
        let trace = Trace::default();
        let mut app = App::new();
        app.post("/echo", echo(&trace)).unwrap();

        let res = app.handle(&mut post("/echo", "application/json", "{oops"));
        assert_eq!(res.status_code(), 400);
        assert_eq!(res.body(), &json!({ "error": "Invalid request body" }));
        assert!(trace.lock().unwrap().is_empty());
    }

    #[test]
    fn test_get_never_decodes() {
        let mut app = App::new();
        app.get(
            "/peek",
            Controller::new(|req, res| res.send(req.body().is_empty())),
        )
        .unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, "application/json".parse().unwrap());
        let mut req = Request::new(Method::GET, "/peek", headers).with_raw_body("{broken");
        let res = app.handle(&mut req);
        assert_eq!(res.status_code(), 200);
        assert_eq!(res.body(), &Value::Bool(true));
        assert!(matches!(req.body(), Body::Empty));
    }

    #[test]
    fn test_halting_middleware_leaves_response_unsent() {
        let trace = Trace::default();
        let mut app = App::with_config(HttpConfig {
            debug_mode: true,
            ..HttpConfig::default()
        });
        app.use_middleware(Middleware::new(|_req, _res, _next| Ok(())));
        app.get("/stuck", echo(&trace)).unwrap();

        let res = app.handle(&mut get("/stuck"));
        assert!(!res.is_sent());
        assert!(trace.lock().unwrap().is_empty());
    }

    #[test]
    fn test_multipart_upload_cleaned_up_with_request() {
        let dir = std::env::temp_dir().join(format!("expressway-app-{}", std::process::id()));
        let mut app = App::with_config(HttpConfig {
            upload_dir: Some(dir.to_string_lossy().to_string()),
            ..HttpConfig::default()
        });
        app.post(
            "/upload",
            Controller::new(|req, res| {
                let form = req.body().as_multipart().ok_or_else(|| Error::handler("no form"))?;
                let file = form["file"][0].as_file().ok_or_else(|| Error::handler("no file"))?;
                res.send(file.path().to_string_lossy().to_string())
            }),
        )
        .unwrap();

        let body = "--B\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.bin\"\r\n\r\nDATA\r\n--B--\r\n";
        let mut req = post("/upload", "multipart/form-data; boundary=B", body);
        let res = app.handle(&mut req);

        let path = std::path::PathBuf::from(res.body().as_str().unwrap());
        assert!(path.exists());
        drop(req);
        assert!(!path.exists());
    }
}
