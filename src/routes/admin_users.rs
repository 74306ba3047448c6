//! Admin API endpoints for user moderation
//!
//! ## Endpoints
//!
//! - `GET /api/admin/users` - List users with pagination, search, filter
//! - `POST /api/admin/users/{id}/ban` - Ban a user
//! - `POST /api/admin/users/{id}/unban` - Lift a ban
//! - `POST /api/admin/users/{id}/grant-admin` - First admin only
//! - `POST /api/admin/users/{id}/revoke-admin` - First admin only
//! - `GET /api/admin/actions?limit=` - Audit log, newest first
//! - `GET /api/admin/stats` - Record counts
//!
//! ## Authentication
//!
//! All endpoints require Admin permission level via JWT token. Role changes
//! are further restricted to the first admin by the store.

use bytes::Bytes;
use hyper::{Method, Request};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::common::{
    clamp_limit, no_route, ok, optional_text, parse_id, parse_json_or_default, parse_query,
    record_admin_action, require_user, HandlerResult, ReasonRequest,
};
use crate::db::schemas::{Role, User};
use crate::db::MAX_SEARCH_LIMIT;
use crate::server::AppState;
use crate::types::StudyhallError;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Query parameters for listing users
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListUsersQuery {
    pub page: usize,
    pub limit: usize,
    /// Case-insensitive substring of username, display name or email
    pub search: Option<String>,
    pub role: Option<Role>,
    pub is_banned: Option<bool>,
}

impl Default for ListUsersQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 20,
            search: None,
            role: None,
            is_banned: None,
        }
    }
}

impl ListUsersQuery {
    fn matches(&self, user: &User) -> bool {
        if self.role.is_some_and(|r| r != user.role) {
            return false;
        }
        if self.is_banned.is_some_and(|b| b != user.is_banned) {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => {
                let needle = s.to_lowercase();
                [&user.username, &user.display_name, &user.email]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&needle))
            }
            _ => true,
        }
    }
}

/// Paginated users response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsersResponse {
    pub users: Vec<User>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}

/// Page `users` (already filtered) for the listing
fn paginate(users: Vec<User>, page: usize, limit: usize) -> UsersResponse {
    let page = page.max(1);
    let limit = limit.clamp(1, MAX_SEARCH_LIMIT);
    let total = users.len();
    let users = users
        .into_iter()
        .skip((page - 1) * limit)
        .take(limit)
        .collect();

    UsersResponse {
        users,
        total,
        page,
        limit,
        total_pages: total.div_ceil(limit),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ActionsQuery {
    limit: Option<usize>,
}

// =============================================================================
// Endpoint Handlers
// =============================================================================

/// GET /api/admin/users
async fn handle_list_users(req: Request<Bytes>, state: &AppState) -> HandlerResult {
    require_user(state, &req, "list_users").await?;
    let params: ListUsersQuery = parse_query(&req)?;

    let users: Vec<User> = state
        .store
        .get_users()
        .await
        .into_iter()
        .filter(|u| params.matches(u))
        .collect();

    ok(&paginate(users, params.page, params.limit))
}

#[derive(Debug, Clone, Copy)]
enum Moderation {
    Ban,
    Unban,
    GrantAdmin,
    RevokeAdmin,
}

impl Moderation {
    fn operation(self) -> &'static str {
        match self {
            Moderation::Ban => "ban_user",
            Moderation::Unban => "unban_user",
            Moderation::GrantAdmin => "grant_admin",
            Moderation::RevokeAdmin => "revoke_admin",
        }
    }
}

/// POST /api/admin/users/{id}/{ban|unban|grant-admin|revoke-admin}
async fn handle_moderate(
    req: Request<Bytes>,
    state: &AppState,
    id: &str,
    action: Moderation,
) -> HandlerResult {
    let admin = require_user(state, &req, action.operation()).await?;
    let target_id = parse_id(id, "user")?;
    let body: ReasonRequest = parse_json_or_default(&req)?;
    optional_text("reason", body.reason.as_deref(), 500)?;

    if target_id == admin.id && matches!(action, Moderation::Ban) {
        return Err(StudyhallError::BadRequest("Cannot ban yourself".into()));
    }

    let user = match action {
        Moderation::Ban => state.store.ban_user(admin.id, target_id).await?,
        Moderation::Unban => state.store.unban_user(admin.id, target_id).await?,
        Moderation::GrantAdmin => state.store.grant_admin(admin.id, target_id).await?,
        Moderation::RevokeAdmin => state.store.revoke_admin(admin.id, target_id).await?,
    };

    record_admin_action(state, &admin, action.operation(), "user", target_id, body.reason).await;
    info!(
        admin_id = admin.id,
        target_id,
        role = ?user.role,
        banned = user.is_banned,
        "User moderated"
    );
    ok(&user)
}

/// GET /api/admin/actions
async fn handle_actions(req: Request<Bytes>, state: &AppState) -> HandlerResult {
    require_user(state, &req, "admin_actions").await?;
    let query: ActionsQuery = parse_query(&req)?;
    let limit = clamp_limit(query.limit, 50, MAX_SEARCH_LIMIT);
    ok(&state.store.get_admin_actions(limit).await)
}

/// GET /api/admin/stats
async fn handle_stats(req: Request<Bytes>, state: &AppState) -> HandlerResult {
    require_user(state, &req, "admin_stats").await?;
    ok(&state.store.stats().await)
}

// =============================================================================
// Main Router
// =============================================================================

/// Handle /api/admin/* requests
pub async fn handle_admin_request(
    req: Request<Bytes>,
    state: &AppState,
    segments: &[&str],
) -> HandlerResult {
    let method = req.method().clone();
    match (&method, segments) {
        (&Method::GET, ["users"]) => handle_list_users(req, state).await,
        (&Method::POST, ["users", id, "ban"]) => {
            handle_moderate(req, state, id, Moderation::Ban).await
        }
        (&Method::POST, ["users", id, "unban"]) => {
            handle_moderate(req, state, id, Moderation::Unban).await
        }
        (&Method::POST, ["users", id, "grant-admin"]) => {
            handle_moderate(req, state, id, Moderation::GrantAdmin).await
        }
        (&Method::POST, ["users", id, "revoke-admin"]) => {
            handle_moderate(req, state, id, Moderation::RevokeAdmin).await
        }
        (&Method::GET, ["actions"]) => handle_actions(req, state).await,
        (&Method::GET, ["stats"]) => handle_stats(req, state).await,
        _ => no_route(&req),
    }
}
