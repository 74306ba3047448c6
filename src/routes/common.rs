//! Shared helpers for route handlers: JSON responses, request parsing,
//! input checks and caller authentication.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS};
use hyper::header::{ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::{
    extract_token_from_header, get_required_permission, is_operation_allowed, PermissionLevel,
};
use crate::db::schemas::{NewAdminAction, User};
use crate::server::AppState;
use crate::types::{Result, StudyhallError};

pub type FullBody = Full<Bytes>;

/// What every handler returns; errors are rendered by the router
pub type HandlerResult = Result<Response<FullBody>>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// =============================================================================
// Response Helpers
// =============================================================================

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<FullBody> {
    let json = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

pub fn ok<T: Serialize>(body: &T) -> HandlerResult {
    Ok(json_response(StatusCode::OK, body))
}

pub fn created<T: Serialize>(body: &T) -> HandlerResult {
    Ok(json_response(StatusCode::CREATED, body))
}

pub fn no_content() -> HandlerResult {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    Ok(response)
}

pub fn json_error(status: StatusCode, error: &str, code: &str) -> Response<FullBody> {
    json_response(
        status,
        &ErrorResponse {
            error: error.to_string(),
            code: code.to_string(),
        },
    )
}

pub fn error_response(err: &StudyhallError) -> Response<FullBody> {
    json_error(err.status_code(), &err.to_string(), err.code())
}

pub fn route_not_found(method: &Method, path: &str) -> Response<FullBody> {
    json_error(
        StatusCode::NOT_FOUND,
        &format!("No route for {} {}", method, path),
        "ROUTE_NOT_FOUND",
    )
}

/// Shorthand used at the bottom of each handler's match
pub fn no_route(req: &Request<Bytes>) -> HandlerResult {
    Ok(route_not_found(req.method(), req.uri().path()))
}

pub fn apply_cors(response: &mut Response<FullBody>) {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PATCH, DELETE, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
}

/// CORS preflight response
pub fn preflight_response() -> Response<FullBody> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    apply_cors(&mut response);
    response
        .headers_mut()
        .insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    response
}

// =============================================================================
// Request Parsing
// =============================================================================

pub fn parse_json<T: DeserializeOwned>(req: &Request<Bytes>) -> Result<T> {
    if req.body().is_empty() {
        return Err(StudyhallError::BadRequest("Request body is required".into()));
    }
    serde_json::from_slice(req.body())
        .map_err(|e| StudyhallError::BadRequest(format!("Invalid JSON body: {}", e)))
}

/// Like `parse_json`, but an empty body yields the default value
pub fn parse_json_or_default<T: DeserializeOwned + Default>(req: &Request<Bytes>) -> Result<T> {
    if req.body().is_empty() {
        return Ok(T::default());
    }
    parse_json(req)
}

pub fn parse_query<T: DeserializeOwned + Default>(req: &Request<Bytes>) -> Result<T> {
    match req.uri().query() {
        Some(q) if !q.is_empty() => Ok(serde_urlencoded::from_str(q)?),
        _ => Ok(T::default()),
    }
}

pub fn parse_id(segment: &str, kind: &str) -> Result<u32> {
    segment
        .parse()
        .map_err(|_| StudyhallError::BadRequest(format!("Invalid {} id: {}", kind, segment)))
}

/// `?limit=` clamped into `1..=max`
pub fn clamp_limit(limit: Option<usize>, default: usize, max: usize) -> usize {
    limit.unwrap_or(default).clamp(1, max)
}

// =============================================================================
// Input Checks
// =============================================================================

/// Required text: non-blank and at most `max` characters
pub fn require_text(field: &str, value: &str, max: usize) -> Result<()> {
    if value.trim().is_empty() {
        return Err(StudyhallError::BadRequest(format!("{} is required", field)));
    }
    check_length(field, value, max)
}

/// Optional text: if present, at most `max` characters
pub fn optional_text(field: &str, value: Option<&str>, max: usize) -> Result<()> {
    value.map_or(Ok(()), |v| check_length(field, v, max))
}

fn check_length(field: &str, value: &str, max: usize) -> Result<()> {
    if value.chars().count() > max {
        return Err(StudyhallError::BadRequest(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(())
}

// =============================================================================
// Authentication
// =============================================================================

fn get_auth_header(req: &Request<Bytes>) -> Option<&str> {
    req.headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Resolve the bearer token to the current stored user.
///
/// The user is re-read from the store, so bans and role changes apply to
/// tokens issued before them.
pub async fn authenticate(state: &AppState, req: &Request<Bytes>) -> Result<User> {
    let token = extract_token_from_header(get_auth_header(req))
        .ok_or_else(|| StudyhallError::Unauthorized("No token provided".into()))?;

    let result = state.jwt.verify_token(token);
    let claims = match (result.valid, result.claims) {
        (true, Some(claims)) => claims,
        _ => {
            return Err(StudyhallError::Unauthorized(
                result.error.unwrap_or_else(|| "Invalid token".into()),
            ))
        }
    };

    state
        .store
        .get_user(claims.sub)
        .await
        .ok_or_else(|| StudyhallError::Unauthorized("Account no longer exists".into()))
}

/// Gate for anonymous endpoints: `operation` must be whitelisted at the
/// public level
pub fn allow_public(operation: &str) -> Result<()> {
    if is_operation_allowed(operation, PermissionLevel::Public) {
        Ok(())
    } else {
        Err(StudyhallError::Forbidden(format!(
            "{} is not a public operation",
            operation
        )))
    }
}

/// Authenticate and check the caller may perform `operation`
pub async fn require_user(state: &AppState, req: &Request<Bytes>, operation: &str) -> Result<User> {
    let user = authenticate(state, req).await?;
    if user.is_banned {
        return Err(StudyhallError::Forbidden("Account is banned".into()));
    }

    let level = PermissionLevel::for_user(&user);
    match get_required_permission(operation) {
        Some(required) if level >= required => Ok(user),
        Some(required) => Err(StudyhallError::Forbidden(format!(
            "{} requires {} permission",
            operation, required
        ))),
        None => Err(StudyhallError::Forbidden(format!(
            "Unknown operation: {}",
            operation
        ))),
    }
}

// =============================================================================
// Audit
// =============================================================================

/// Optional body of admin deletions
#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn record_admin_action(
    state: &AppState,
    admin: &User,
    action: &str,
    target_type: &str,
    target_id: u32,
    reason: Option<String>,
) {
    state
        .store
        .create_admin_action(NewAdminAction {
            admin_id: admin.id,
            action: action.to_string(),
            target_type: target_type.to_string(),
            target_id,
            reason,
        })
        .await;
    info!(admin_id = admin.id, action, target_type, target_id, "Admin action");
}
