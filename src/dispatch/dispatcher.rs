//! Middleware dispatcher
//!
//! Runs one resolved chain depth-first. The dispatcher is an explicit state
//! object holding the ordered stages and a cursor; a middleware hands control
//! onward by consuming the [`Next`] it was given, which advances the cursor
//! and invokes the following stage. `Next` is moved into [`Next::run`], so a
//! continuation cannot be invoked twice.

use super::handler::{Controller, Middleware};
use crate::error::HandlerResult;
use crate::http::{Request, Response};
use crate::routing::Route;

/// Cursor over one request's handler chain
pub struct Dispatcher<'c> {
    middlewares: Vec<&'c Middleware>,
    controller: &'c Controller,
    index: usize,
}

impl<'c> Dispatcher<'c> {
    /// Chain global middlewares (in `use` order) with a route's own stages
    pub fn new(global: &'c [Middleware], route: &'c Route) -> Self {
        let middlewares = global.iter().chain(route.middlewares()).collect();
        Self::from_parts(middlewares, route.controller())
    }

    pub const fn from_parts(middlewares: Vec<&'c Middleware>, controller: &'c Controller) -> Self {
        Self {
            middlewares,
            controller,
            index: 0,
        }
    }

    /// Execute the chain from its first stage
    pub fn run(&mut self, req: &mut Request, res: &mut Response) -> HandlerResult {
        self.index = 0;
        self.invoke(req, res)
    }

    /// Number of stages, controller included
    pub fn stages(&self) -> usize {
        self.middlewares.len() + 1
    }

    /// Index of the deepest stage reached so far
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Whether the terminal controller was invoked
    pub fn reached_controller(&self) -> bool {
        self.index == self.middlewares.len()
    }

    fn advance_and_invoke(&mut self, req: &mut Request, res: &mut Response) -> HandlerResult {
        self.index += 1;
        self.invoke(req, res)
    }

    fn invoke(&mut self, req: &mut Request, res: &mut Response) -> HandlerResult {
        match self.middlewares.get(self.index).copied() {
            Some(middleware) => middleware.call(req, res, Next { dispatcher: self }),
            None => self.controller.call(req, res),
        }
    }
}

/// Continuation handed to a middleware
pub struct Next<'d, 'c> {
    dispatcher: &'d mut Dispatcher<'c>,
}

impl Next<'_, '_> {
    /// Hand control to the next stage of the chain
    pub fn run(self, req: &mut Request, res: &mut Response) -> HandlerResult {
        self.dispatcher.advance_and_invoke(req, res)
    }

    /// Position of the stage that owns this continuation
    pub fn stage(&self) -> usize {
        self.dispatcher.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::{Arc, Mutex};

    type Trace = Arc<Mutex<Vec<&'static str>>>;

    fn recording(trace: &Trace, name: &'static str) -> Middleware {
        let trace = Arc::clone(trace);
        Middleware::new(move |req, res, next| {
            trace.lock().unwrap().push(name);
            next.run(req, res)
        })
    }

    fn halting(trace: &Trace, name: &'static str) -> Middleware {
        let trace = Arc::clone(trace);
        Middleware::new(move |_req, res, _next| {
            trace.lock().unwrap().push(name);
            res.status(401).send("halted")
        })
    }

    fn terminal(trace: &Trace, name: &'static str) -> Controller {
        let trace = Arc::clone(trace);
        Controller::new(move |_req, res| {
            trace.lock().unwrap().push(name);
            res.send("done")
        })
    }

    fn request() -> Request {
        Request::new(hyper::Method::GET, "/", hyper::HeaderMap::new())
    }

    #[test]
    fn test_order_global_then_route_then_controller() {
        let trace = Trace::default();
        let (a, b, c) = (recording(&trace, "A"), recording(&trace, "B"), recording(&trace, "C"));
        let d = terminal(&trace, "D");

        let mut dispatcher = Dispatcher::from_parts(vec![&a, &b, &c], &d);
        let mut res = Response::new();
        dispatcher.run(&mut request(), &mut res).unwrap();

        assert_eq!(*trace.lock().unwrap(), vec!["A", "B", "C", "D"]);
        assert!(dispatcher.reached_controller());
        assert_eq!(dispatcher.stages(), 4);
        assert!(res.is_sent());
    }

    #[test]
    fn test_middleware_without_next_halts_chain() {
        let trace = Trace::default();
        let a = halting(&trace, "A");
        let b = recording(&trace, "B");
        let c = terminal(&trace, "controller");

        let mut dispatcher = Dispatcher::from_parts(vec![&a, &b], &c);
        let mut res = Response::new();
        dispatcher.run(&mut request(), &mut res).unwrap();

        assert_eq!(*trace.lock().unwrap(), vec!["A"]);
        assert!(!dispatcher.reached_controller());
        assert_eq!(dispatcher.index(), 0);
        assert_eq!(res.status_code(), 401);
    }

    #[test]
    fn test_controller_only_chain() {
        let trace = Trace::default();
        let c = terminal(&trace, "controller");
        let mut dispatcher = Dispatcher::from_parts(Vec::new(), &c);
        dispatcher.run(&mut request(), &mut Response::new()).unwrap();
        assert_eq!(*trace.lock().unwrap(), vec!["controller"]);
    }

    #[test]
    fn test_error_propagates_out_of_chain() {
        let trace = Trace::default();
        let a = recording(&trace, "A");
        let failing = Middleware::new(|_req, _res, _next| Err(Error::handler("boom")));
        let c = terminal(&trace, "controller");

        let mut dispatcher = Dispatcher::from_parts(vec![&a, &failing], &c);
        let err = dispatcher.run(&mut request(), &mut Response::new()).unwrap_err();

        assert!(matches!(err, Error::Handler(ref msg) if msg == "boom"));
        assert_eq!(*trace.lock().unwrap(), vec!["A"]);
        assert_eq!(dispatcher.index(), 1);
    }

    #[test]
    fn test_middleware_observes_downstream_result() {
        let outer = Middleware::new(|req, res, next| {
            let stage = next.stage();
            next.run(req, res)?;
            res.set_header("x-outer-stage", stage.to_string());
            Ok(())
        });
        let c = Controller::new(|_req, res| res.send("ok"));

        let mut dispatcher = Dispatcher::from_parts(vec![&outer], &c);
        let mut res = Response::new();
        dispatcher.run(&mut request(), &mut res).unwrap();
        assert_eq!(res.header("x-outer-stage"), Some("0"));
    }
}
