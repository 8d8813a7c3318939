//! HTTP/1 front end for the graph service.
//!
//! # Responsibility
//! - Accept connections, authenticate callers, and hand each request to
//!   `api::route` on a blocking worker.
//!
//! # Invariants
//! - Every request opens its own SQLite connection; write serialization is
//!   left to SQLite's immediate transactions.
//! - Request bodies above `MAX_BODY_BYTES` are rejected with 413 unread.

use crate::api::{self, ApiResponse, ResponseBody};
use crate::config::{Settings, TokenTable};
use anyhow::{anyhow, Result};
use bytes::Bytes;
use golden_graph_core::open_db;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use log::{error, info, warn};
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;

pub const MAX_BODY_BYTES: usize = 1024 * 1024;

struct ServerState {
    db_path: PathBuf,
    tokens: TokenTable,
}

/// Builds the runtime and serves until the process is stopped.
pub fn serve(settings: Settings) -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))?;

    rt.block_on(async move { serve_async(settings).await })
}

async fn serve_async(settings: Settings) -> Result<()> {
    // Apply migrations once before accepting traffic.
    tokio::task::spawn_blocking({
        let db_path = settings.db_path.clone();
        move || open_db(&db_path).map(drop)
    })
    .await
    .map_err(|e| anyhow!("failed to join migration task: {e}"))??;

    if settings.tokens.is_empty() {
        warn!("event=server_start module=server status=degraded reason=no_tokens_configured");
    }

    let state = Arc::new(ServerState {
        db_path: settings.db_path.clone(),
        tokens: settings.tokens,
    });

    let listener = TcpListener::bind(settings.listen)
        .await
        .map_err(|e| anyhow!("failed to bind {}: {e}", settings.listen))?;
    let bound = listener
        .local_addr()
        .map_err(|e| anyhow!("failed to read bound addr: {e}"))?;
    info!(
        "event=server_start module=server status=ok addr={} db={} tokens={}",
        bound,
        state.db_path.display(),
        state.tokens.len()
    );

    loop {
        let (stream, _peer) = listener
            .accept()
            .await
            .map_err(|e| anyhow!("accept failed: {e}"))?;
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, state.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                warn!("event=http_connection module=server status=error error={e}");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<ServerState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    let auth_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let response = match api::authenticate(&state.tokens, auth_header) {
        Err(rejected) => rejected,
        Ok(caller) => match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
            Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => ApiResponse::error(
                StatusCode::PAYLOAD_TOO_LARGE,
                "bad_request",
                &format!("request body exceeds {MAX_BODY_BYTES} bytes"),
            ),
            Err(err) => ApiResponse::error(
                StatusCode::BAD_REQUEST,
                "bad_request",
                &format!("failed to read request body: {err}"),
            ),
            Ok(collected) => {
                let body = collected.to_bytes();
                let db_path = state.db_path.clone();
                let (method, path) = (method.clone(), path.clone());
                tokio::task::spawn_blocking(move || match open_db(&db_path) {
                    Ok(conn) => api::route(&conn, &method, &path, query.as_deref(), &body, &caller),
                    Err(err) => {
                        error!("event=db_open module=server status=error error={err}");
                        ApiResponse::error(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "storage",
                            "database unavailable",
                        )
                    }
                })
                .await
                .unwrap_or_else(|err| {
                    error!("event=http_request module=server status=error error=worker_join:{err}");
                    ApiResponse::error(StatusCode::INTERNAL_SERVER_ERROR, "storage", "worker failed")
                })
            }
        },
    };

    info!(
        "event=http_request module=server status={} method={} path={} duration_ms={}",
        response.status.as_u16(),
        method,
        path,
        started.elapsed().as_millis()
    );
    Ok(render(response))
}

fn render(response: ApiResponse) -> Response<Full<Bytes>> {
    let (content_type, body) = match response.body {
        ResponseBody::Json(value) => (
            "application/json",
            serde_json::to_vec(&value).unwrap_or_else(|_| b"{\"error\":\"serialize\"}".to_vec()),
        ),
        ResponseBody::Text(text) => ("text/plain; charset=utf-8", text.into_bytes()),
    };
    Response::builder()
        .status(response.status)
        .header(CONTENT_TYPE, content_type)
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"{\"error\":\"internal\"}"))))
}
