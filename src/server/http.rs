//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling; routing is a plain
//! match over path segments, in keeping with the thin route layer.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::config::Args;
use crate::db::CacheDb;
use crate::ledger::JsonRpcLedger;
use crate::pinning::{HttpStoreTransport, PinningClient};
use crate::routes;
use crate::sync::SyncEngine;
use crate::types::{Result, StorygateError};

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub db: CacheDb,
    pub store: Arc<PinningClient<HttpStoreTransport>>,
    pub engine: Arc<SyncEngine<JsonRpcLedger, HttpStoreTransport>>,
    pub started_at: Instant,
}

/// Accept loop; serves until the process exits.
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Storygate listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        debug!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!(%method, %path, "Incoming request");

    let response = route(state, &method, &path, req).await;
    Ok(response.unwrap_or_else(error_to_response))
}

async fn route(
    state: Arc<AppState>,
    method: &Method,
    path: &str,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    match (method, segments.as_slice()) {
        (&Method::GET, ["health"]) | (&Method::GET, ["healthz"]) => {
            let uptime = state.started_at.elapsed().as_secs();
            let body = routes::HealthResponse::new(state.args.node_id.to_string(), uptime);
            Ok(json_response(StatusCode::OK, &body))
        }

        (&Method::POST, ["api", "v1", "authors"]) => {
            let body = read_body(req).await?;
            let request: routes::RegisterAuthorRequest = serde_json::from_slice(&body)
                .map_err(|e| StorygateError::Config(format!("invalid author payload: {e}")))?;
            let author = routes::register_author(&state.db, request).await?;
            Ok(json_response(StatusCode::CREATED, &author))
        }

        (&Method::GET, ["api", "v1", "authors", author_id, "stories"]) => {
            let body = routes::author_stories(&state.db, &state.engine, author_id).await?;
            Ok(json_response(StatusCode::OK, &body))
        }

        (&Method::POST, ["api", "v1", "authors", author_id, "sync"]) => {
            let body = routes::trigger_author_sync(&state.engine, author_id).await?;
            Ok(json_response(StatusCode::ACCEPTED, &body))
        }

        (&Method::GET, ["api", "v1", "authors", author_id, "sync"]) => {
            let body = routes::author_sync_state(&state.engine, author_id).await?;
            Ok(json_response(StatusCode::OK, &body))
        }

        (&Method::GET, ["api", "v1", "stories", story_id]) => {
            let story_id: u64 = story_id
                .parse()
                .map_err(|_| StorygateError::NotFound(format!("story {story_id}")))?;
            let body = routes::story_detail(&state.db, &state.store, story_id).await?;
            Ok(json_response(StatusCode::OK, &body))
        }

        _ => Ok(error_response(
            StatusCode::NOT_FOUND,
            "no such route",
            "not_found",
        )),
    }
}

/// Collect a request body into bytes.
async fn read_body(req: Request<Incoming>) -> Result<Bytes> {
    let collected = req
        .into_body()
        .collect()
        .await
        .map_err(|e| StorygateError::Internal(format!("failed to read request body: {e}")))?;
    Ok(collected.to_bytes())
}

/// API error response body
#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
    code: &'static str,
}

fn error_to_response(error: StorygateError) -> Response<Full<Bytes>> {
    match error {
        StorygateError::NotFound(what) => {
            error_response(StatusCode::NOT_FOUND, &what, "not_found")
        }
        StorygateError::Config(message) => {
            error_response(StatusCode::BAD_REQUEST, &message, "bad_request")
        }
        other => {
            error!(error = %other, "Request failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &other.to_string(),
                "internal",
            )
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let bytes = serde_json::to_vec(body).unwrap_or_default();

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Cache-Control", "no-cache")
        .body(Full::new(Bytes::from(bytes)))
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Full::new(Bytes::from(r#"{"error":"Internal error"}"#)))
                .unwrap()
        })
}

fn error_response(status: StatusCode, message: &str, code: &'static str) -> Response<Full<Bytes>> {
    json_response(
        status,
        &ApiError {
            error: message.to_string(),
            code,
        },
    )
}
