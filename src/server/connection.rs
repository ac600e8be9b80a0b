// Connection handling module
// Serves one TCP connection and turns each HTTP request into an App dispatch

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body as _, Bytes, Incoming};
use hyper::header::CONTENT_LENGTH;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{StatusCode, Version};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::ServerState;
use crate::http::{self, Request};
use crate::logger::{self, AccessLogEntry};

/// Accept a connection, enforcing `max_connections`
pub fn accept_connection(
    stream: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    state: &Arc<ServerState>,
) {
    // Increment first, then check, so concurrent accepts cannot overshoot
    let prev_count = state.active_connections.fetch_add(1, Ordering::SeqCst);

    if let Some(max_conn) = state.config.performance.max_connections {
        if prev_count >= usize::try_from(max_conn).unwrap_or(usize::MAX) {
            state.active_connections.fetch_sub(1, Ordering::SeqCst);
            logger::log_warning(&format!(
                "Max connections reached: {prev_count}/{max_conn}. Connection rejected."
            ));
            drop(stream);
            return;
        }
    }

    if state.config.logging.access_log {
        logger::log_connection_accepted(&peer_addr);
    }

    handle_connection(stream, peer_addr, Arc::clone(state));
}

/// Serve a connection on a local task
///
/// The whole connection is bounded by `max(read_timeout, write_timeout)`;
/// a request whose chain never sends a response is released by it.
fn handle_connection(stream: tokio::net::TcpStream, peer_addr: SocketAddr, state: Arc<ServerState>) {
    tokio::task::spawn_local(async move {
        let io = TokioIo::new(stream);

        let performance = &state.config.performance;
        let timeout_duration =
            Duration::from_secs(std::cmp::max(performance.read_timeout, performance.write_timeout));

        let mut builder = http1::Builder::new();
        builder.keep_alive(performance.keep_alive_timeout > 0);

        let service_state = Arc::clone(&state);
        let conn = builder.serve_connection(
            io,
            service_fn(move |req| handle_request(req, Arc::clone(&service_state), peer_addr)),
        );

        match tokio::time::timeout(timeout_duration, conn).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => logger::log_connection_error(&err),
            Err(_) => logger::log_warning(&format!(
                "Connection from {peer_addr} timed out after {} seconds",
                timeout_duration.as_secs()
            )),
        }

        state.active_connections.fetch_sub(1, Ordering::SeqCst);
    });
}

/// Collect the body, dispatch through the app and write the access log
pub async fn handle_request(
    req: hyper::Request<Incoming>,
    state: Arc<ServerState>,
    peer_addr: SocketAddr,
) -> Result<hyper::Response<Full<Bytes>>, Infallible> {
    let http_config = state.app.http_config();

    if let Some(resp) = check_body_size(&req, http_config.max_body_size) {
        return Ok(resp);
    }

    let (parts, body) = req.into_parts();
    let limit = usize::try_from(http_config.max_body_size).unwrap_or(usize::MAX);
    let raw_body = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            logger::log_error(&format!("Request body exceeded {limit} bytes"));
            return Ok(http::build_413_response());
        }
        Err(e) => {
            logger::log_error(&format!("Failed to read request body: {e}"));
            return Ok(http::build_error_response(
                StatusCode::BAD_REQUEST,
                "Invalid request body",
            ));
        }
    };

    let target = parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path(), hyper::http::uri::PathAndQuery::as_str)
        .to_string();
    let mut entry = AccessLogEntry::new(
        peer_addr.ip().to_string(),
        parts.method.to_string(),
        target.clone(),
        chrono::Local::now(),
    )
    .with_headers(&parts.headers);
    entry.http_version = version_str(parts.version).to_string();

    let mut request = Request::new(parts.method, &target, parts.headers).with_raw_body(raw_body);

    let started = Instant::now();
    let response = state.app.handle(&mut request);

    if !response.is_sent() {
        logger::log_warning(&format!(
            "{} {target}: chain finished without sending a response",
            request.method()
        ));
        // Dropped with the connection when its timeout fires
        std::future::pending::<()>().await;
    }

    let wire = response.into_hyper(&http_config.server_name);
    // Uploaded files live until the response exists
    drop(request);

    if state.config.logging.access_log {
        entry.status = wire.status().as_u16();
        entry.body_bytes = wire
            .body()
            .size_hint()
            .exact()
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0);
        entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(wire)
}

/// Reject early from `Content-Length` before reading anything
fn check_body_size(
    req: &hyper::Request<Incoming>,
    max_body_size: u64,
) -> Option<hyper::Response<Full<Bytes>>> {
    let content_length = req.headers().get(CONTENT_LENGTH)?;
    let Ok(size_str) = content_length.to_str() else {
        logger::log_warning("Content-Length header contains non-ASCII characters");
        return None;
    };

    match size_str.trim().parse::<u64>() {
        Ok(size) if size > max_body_size => {
            logger::log_error(&format!(
                "Request body too large: {size} bytes (max: {max_body_size})"
            ));
            Some(http::build_413_response())
        }
        Ok(_) => None,
        Err(_) => {
            logger::log_warning(&format!(
                "Invalid Content-Length value: '{size_str}', skipping size check"
            ));
            None
        }
    }
}

fn version_str(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2",
        Version::HTTP_3 => "3",
        _ => "1.1",
    }
}
