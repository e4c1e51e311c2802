//! HTTP transport
//!
//! `POST /mcp` takes one JSON-RPC message per request body and answers with
//! the JSON-RPC response (or `202 Accepted` for notifications). `GET /health`
//! reports the remote session state. Plain HTTP; terminate TLS in front.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::fleet::FleetConnector;

use super::error::McpError;
use super::server::McpServer;

/// Larger bodies are rejected with 413
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Accept connections on `listener` until `shutdown` resolves
pub async fn run_http<C, F>(
    server: Arc<McpServer<C>>,
    listener: TcpListener,
    shutdown: F,
) -> Result<(), McpError>
where
    C: FleetConnector,
    F: Future<Output = ()>,
{
    let local_addr = listener.local_addr()?;
    info!("MCP HTTP transport listening on http://{}/mcp", local_addr);

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                let (stream, remote_addr) = match accept_result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("HTTP accept error: {}", e);
                        continue;
                    }
                };
                serve_connection(Arc::clone(&server), stream, remote_addr);
            }

            _ = &mut shutdown => {
                info!("MCP HTTP transport shutting down");
                return Ok(());
            }
        }
    }
}

fn serve_connection<C: FleetConnector>(
    server: Arc<McpServer<C>>,
    stream: tokio::net::TcpStream,
    remote_addr: SocketAddr,
) {
    let io = TokioIo::new(stream);

    tokio::spawn(async move {
        let service = service_fn(move |req| {
            let server = Arc::clone(&server);
            async move { handle_request(req, server).await }
        });

        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
            // Clients dropping mid-request is routine
            if !e.is_incomplete_message() {
                warn!("HTTP connection error from {}: {}", remote_addr, e);
            }
        }
    });
}

async fn handle_request<C: FleetConnector>(
    req: Request<hyper::body::Incoming>,
    server: Arc<McpServer<C>>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::POST, "/mcp") => Ok(serve_rpc(req, server).await),
        (&Method::GET, "/health") => Ok(serve_health(&server)),
        (_, "/mcp") | (_, "/health") => Ok(plain(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")),
        _ => Ok(plain(StatusCode::NOT_FOUND, "Not Found")),
    }
}

async fn serve_rpc<C: FleetConnector>(
    req: Request<hyper::body::Incoming>,
    server: Arc<McpServer<C>>,
) -> Response<Full<Bytes>> {
    let body = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return plain(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large");
        }
        Err(e) => {
            debug!("Failed to read request body: {}", e);
            return plain(StatusCode::BAD_REQUEST, "Unreadable request body");
        }
    };

    let line = String::from_utf8_lossy(&body);
    match server.handle_line(&line).await {
        Some(response) => match serde_json::to_vec(&response) {
            Ok(json) => with_content_type(StatusCode::OK, "application/json", json),
            Err(e) => {
                warn!("Failed to serialize response: {}", e);
                plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        },
        None => plain(StatusCode::ACCEPTED, ""),
    }
}

fn serve_health<C: FleetConnector>(server: &McpServer<C>) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "status": "ok",
        "session": server.session_state().to_string(),
        "initialized": server.is_initialized(),
        "idle_workers": server.idle_workers(),
    });
    with_content_type(StatusCode::OK, "application/json", body.to_string())
}

fn plain(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    with_content_type(status, "text/plain", body)
}

fn with_content_type(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
