//! Server module
//!
//! Binds the listener and feeds every accepted connection into the shared
//! [`App`]. The route table is frozen once `serve` starts.

pub mod connection;
pub mod listener;
pub mod signal;

// `loop` is a keyword, so the module is exposed as `server_loop`
#[path = "loop.rs"]
pub mod server_loop;

pub use listener::create_reusable_listener;
pub use server_loop::start_server_loop;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use crate::app::App;
use crate::config::Config;
use crate::logger;

/// State shared by the accept loop and every connection task
#[derive(Debug)]
pub struct ServerState {
    pub app: App,
    pub config: Config,
    pub active_connections: AtomicUsize,
}

impl ServerState {
    pub const fn new(app: App, config: Config) -> Self {
        Self {
            app,
            config,
            active_connections: AtomicUsize::new(0),
        }
    }
}

/// Bind the configured address and serve `app` until SIGINT/SIGTERM
pub async fn serve(app: App, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config.get_socket_addr()?;
    let listener = create_reusable_listener(addr)?;
    logger::log_server_start(&addr, &config);

    let state = Arc::new(ServerState::new(app, config));

    // Use LocalSet for spawn_local support
    let local = tokio::task::LocalSet::new();
    local.run_until(start_server_loop(listener, state)).await
}
