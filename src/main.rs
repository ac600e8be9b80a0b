use expressway::config::Config;
use expressway::{logger, server, App, Controller, ErrorMiddleware, Middleware};
use serde_json::json;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Optional first argument: config file path without extension
    let cfg = match std::env::args().nth(1) {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };
    logger::init(&cfg)?;

    // Create Tokio runtime, sized by `server.workers` when set
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build()?;

    let app = build_app(&cfg)?;
    runtime.block_on(server::serve(app, cfg))
}

fn build_app(cfg: &Config) -> expressway::Result<App> {
    let mut app = App::with_config(cfg.http.clone());

    app.use_middleware(Middleware::new(|req, res, next| {
        logger::log_request(req.method(), req.path());
        next.run(req, res)
    }));

    app.use_error_middleware(ErrorMiddleware::new(|req, res, err| {
        let message = err.to_string();
        res.status(400).json(&json!({
            "message": format!("CUSTOM ERROR: {message}"),
            "error": message,
            "path": req.path(),
            "timestamp": req.received_at().to_rfc3339(),
        }))
    }))?;

    let echo = Controller::new(|req, res| {
        res.status(200).json(&json!({
            "message": format!("Echo from {} {}", req.path(), req.method()),
            "query": req.query(),
            "params": req.params(),
        }))
    });

    app.get("/hello", echo.clone())?
        .get("/hello/:id", echo.clone())?
        .get("/hello/:id/:name/aaaaaaaaaa/:no", echo)?;

    Ok(app)
}
