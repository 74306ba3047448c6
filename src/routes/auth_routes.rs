//! HTTP Routes for Authentication
//!
//! - POST /auth/register - Create an account and get a JWT token
//! - POST /auth/login    - Authenticate by username or email
//! - GET  /auth/me       - Current user from token

use bytes::Bytes;
use hyper::{Method, Request, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::common::{
    json_response, no_route, ok, optional_text, parse_json, require_text, require_user,
    HandlerResult,
};
use crate::auth::{check_password_strength, hash_password, verify_password, PermissionLevel, TokenInput};
use crate::db::schemas::{NewActivity, NewUser, Role, User};
use crate::server::AppState;
use crate::types::{Result, StudyhallError};

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 32;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub institution: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub year_of_study: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Username or email
    #[serde(alias = "username", alias = "email")]
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    /// Token lifetime in seconds
    pub expires_in: u64,
    pub user: User,
}

// =============================================================================
// Validation
// =============================================================================

fn validate_username(username: &str) -> Result<()> {
    let len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(StudyhallError::BadRequest(format!(
            "Username must be {}-{} characters",
            USERNAME_MIN, USERNAME_MAX
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(StudyhallError::BadRequest(
            "Username may only contain letters, digits, '_', '-' and '.'".into(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_email(email: &str) -> Result<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !email.contains(' '),
        None => false,
    };
    if !valid {
        return Err(StudyhallError::BadRequest(format!("Invalid email address: {}", email)));
    }
    Ok(())
}

fn auth_response(state: &AppState, user: User, status: StatusCode) -> HandlerResult {
    let token = state.jwt.generate_token(TokenInput {
        user_id: user.id,
        username: user.username.clone(),
        permission_level: PermissionLevel::for_user(&user),
    })?;
    Ok(json_response(
        status,
        &AuthResponse {
            token,
            expires_in: state.jwt.expiry_seconds(),
            user,
        },
    ))
}

// =============================================================================
// Route Handlers
// =============================================================================

/// POST /auth/register
async fn handle_register(req: Request<Bytes>, state: &AppState) -> HandlerResult {
    let body: RegisterRequest = parse_json(&req)?;

    validate_username(&body.username)?;
    validate_email(&body.email)?;
    check_password_strength(&body.password)?;
    optional_text("displayName", body.display_name.as_deref(), 64)?;
    optional_text("institution", body.institution.as_deref(), 128)?;
    optional_text("department", body.department.as_deref(), 128)?;

    let display_name = body
        .display_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| body.username.clone());

    let user = state
        .store
        .create_user(NewUser {
            username: body.username,
            email: body.email,
            password_hash: hash_password(&body.password)?,
            display_name,
            institution: body.institution,
            department: body.department,
            year_of_study: body.year_of_study,
            role: Role::Regular,
            ..Default::default()
        })
        .await?;

    state
        .store
        .create_activity(NewActivity::new(user.id, "user_joined").target("user", user.id))
        .await;

    info!(user_id = user.id, username = %user.username, "User registered");
    auth_response(state, user, StatusCode::CREATED)
}

/// POST /auth/login
async fn handle_login(req: Request<Bytes>, state: &AppState) -> HandlerResult {
    let body: LoginRequest = parse_json(&req)?;
    require_text("identifier", &body.identifier, 254)?;
    if body.password.is_empty() {
        return Err(StudyhallError::BadRequest("password is required".into()));
    }

    let user = if body.identifier.contains('@') {
        state.store.get_user_by_email(&body.identifier).await
    } else {
        state.store.get_user_by_username(&body.identifier).await
    };

    // Same message for unknown user and wrong password
    let user = match user {
        Some(user) if verify_password(&body.password, &user.password_hash)? => user,
        _ => {
            warn!(identifier = %body.identifier, "Failed login attempt");
            return Err(StudyhallError::Unauthorized("Invalid credentials".into()));
        }
    };

    if user.is_banned {
        return Err(StudyhallError::Forbidden("Account is banned".into()));
    }

    let user = state.store.touch_user(user.id).await?;
    info!(user_id = user.id, "User logged in");
    auth_response(state, user, StatusCode::OK)
}

/// GET /auth/me
async fn handle_me(req: Request<Bytes>, state: &AppState) -> HandlerResult {
    let user = require_user(state, &req, "me").await?;
    ok(&user)
}

// =============================================================================
// Main Router
// =============================================================================

/// Handle /auth/* requests
pub async fn handle_auth_request(
    req: Request<Bytes>,
    state: &AppState,
    segments: &[&str],
) -> HandlerResult {
    let method = req.method().clone();
    match (&method, segments) {
        (&Method::POST, ["register"]) => handle_register(req, state).await,
        (&Method::POST, ["login"]) => handle_login(req, state).await,
        (&Method::GET, ["me"]) => handle_me(req, state).await,
        _ => no_route(&req),
    }
}
