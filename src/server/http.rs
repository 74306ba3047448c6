//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Routing is a single
//! match over `(method, path segments)`; each API area owns a handler in
//! `routes`.

use bytes::Bytes;
use http_body_util::{BodyExt, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::JwtValidator;
use crate::config::Args;
use crate::db::MemStorage;
use crate::routes::{self, FullBody};
use crate::types::{Result, StudyhallError};

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// The in-memory entity store
    pub store: Arc<MemStorage>,
    /// Token signer/verifier built once from the configured secret
    pub jwt: JwtValidator,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(args: Args, store: Arc<MemStorage>) -> Result<Self> {
        let secret = args
            .jwt_secret()
            .ok_or_else(|| StudyhallError::Config("JWT secret not configured".into()))?;
        let jwt = JwtValidator::new(secret, args.jwt_expiry_seconds)?;

        Ok(Self {
            args,
            store,
            jwt,
            started_at: Instant::now(),
        })
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Studyhall listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - insecure defaults in use");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Collect the body under the size cap, then route
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<FullBody>, Infallible> {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let (parts, body) = req.into_parts();
    let bytes = match Limited::new(body, state.args.max_body_bytes).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(%addr, %method, %path, error = %e, "Rejected request body");
            let mut response = if e.is::<http_body_util::LengthLimitError>() {
                routes::json_error(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    &format!("Request body exceeds {} bytes", state.args.max_body_bytes),
                    "PAYLOAD_TOO_LARGE",
                )
            } else {
                routes::json_error(
                    StatusCode::BAD_REQUEST,
                    "Failed to read request body",
                    "BAD_REQUEST",
                )
            };
            routes::apply_cors(&mut response);
            return Ok(response);
        }
    };

    let response = route(state, Request::from_parts(parts, bytes)).await;

    info!(
        "[{}] {} {} -> {} ({} ms)",
        addr,
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    Ok(response)
}

/// Dispatch a fully-read request to its handler.
///
/// Errors returned by handlers are rendered as JSON here, and CORS headers
/// are added to every response.
pub async fn route(state: Arc<AppState>, req: Request<Bytes>) -> Response<FullBody> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if method == Method::OPTIONS {
        return routes::preflight_response();
    }

    let result = match segments.as_slice() {
        ["health"] | ["healthz"] if method == Method::GET => routes::health_check(&state).await,
        ["version"] if method == Method::GET => routes::version_info(),

        ["auth", rest @ ..] => routes::handle_auth_request(req, &state, rest).await,

        ["api", "users", rest @ ..] => routes::handle_users_request(req, &state, rest).await,
        ["api", "papers", rest @ ..] => routes::handle_papers_request(req, &state, rest).await,
        ["api", "resources", rest @ ..] => {
            routes::handle_resources_request(req, &state, rest).await
        }
        ["api", "discussions", rest @ ..] => {
            routes::handle_discussions_request(req, &state, rest).await
        }
        ["api", "replies", rest @ ..] => routes::handle_replies_request(req, &state, rest).await,
        ["api", "groups", rest @ ..] => routes::handle_groups_request(req, &state, rest).await,
        ["api", "sessions", rest @ ..] => routes::handle_sessions_request(req, &state, rest).await,
        ["api", "friends", rest @ ..] => routes::handle_friends_request(req, &state, rest).await,
        ["api", "messages", rest @ ..] => routes::handle_messages_request(req, &state, rest).await,
        ["api", "activity"] if method == Method::GET => {
            routes::handle_recent_activity(req, &state).await
        }
        ["api", "admin", rest @ ..] => routes::handle_admin_request(req, &state, rest).await,

        _ => Ok(routes::route_not_found(&method, &path)),
    };

    let mut response = match result {
        Ok(response) => response,
        Err(e) => {
            if e.status_code().is_server_error() {
                error!(%method, %path, error = %e, "Request failed");
            } else {
                debug!(%method, %path, error = %e, "Request rejected");
            }
            routes::error_response(&e)
        }
    };
    routes::apply_cors(&mut response);
    response
}
