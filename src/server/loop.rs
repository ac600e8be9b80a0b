// Server loop module
// Accepts connections until a shutdown signal arrives

use std::sync::Arc;
use tokio::net::TcpListener;

use super::connection::accept_connection;
use super::signal::shutdown_signal;
use super::ServerState;
use crate::logger;

/// Accept loop; must run inside a `LocalSet` since connections are served
/// with `spawn_local`
pub async fn start_server_loop(
    listener: TcpListener,
    state: Arc<ServerState>,
) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => accept_connection(stream, peer_addr, &state),
                    Err(e) => logger::log_error(&format!("Failed to accept connection: {e}")),
                }
            }

            () = &mut shutdown => {
                drop(listener);
                return Ok(());
            }
        }
    }
}
