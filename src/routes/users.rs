//! User profile endpoints
//!
//! - `GET /api/users/leaderboard` - Top users by points (public)
//! - `GET /api/users/search?q=` - Find users by name
//! - `PATCH /api/users/me` - Update own profile
//! - `GET /api/users/{id}` - Profile (full record for self)
//! - `GET /api/users/{id}/activity` - A user's recent activity

use bytes::Bytes;
use hyper::{Method, Request};
use serde::Deserialize;

use super::auth_routes::validate_email;
use super::common::{
    allow_public, clamp_limit, no_route, ok, optional_text, parse_id, parse_json, parse_query,
    require_text, require_user, HandlerResult,
};
use crate::db::schemas::{UpdateUser, UserProfile};
use crate::db::{SearchQuery, MAX_SEARCH_LIMIT};
use crate::server::AppState;
use crate::types::StudyhallError;

#[derive(Debug, Default, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

async fn handle_leaderboard(req: Request<Bytes>, state: &AppState) -> HandlerResult {
    allow_public("leaderboard")?;
    let query: LimitQuery = parse_query(&req)?;
    let limit = clamp_limit(query.limit, 10, MAX_SEARCH_LIMIT);
    let board: Vec<UserProfile> = state
        .store
        .get_leaderboard(limit)
        .await
        .iter()
        .map(UserProfile::from)
        .collect();
    ok(&board)
}

async fn handle_search(req: Request<Bytes>, state: &AppState) -> HandlerResult {
    require_user(state, &req, "search_users").await?;
    let query: SearchQuery = parse_query(&req)?;
    let users: Vec<UserProfile> = state
        .store
        .search_users(&query)
        .await
        .iter()
        .map(UserProfile::from)
        .collect();
    ok(&users)
}

async fn handle_update_me(req: Request<Bytes>, state: &AppState) -> HandlerResult {
    let caller = require_user(state, &req, "update_profile").await?;
    let update: UpdateUser = parse_json(&req)?;

    if let Some(name) = &update.display_name {
        require_text("displayName", name, 64)?;
    }
    if let Some(email) = &update.email {
        validate_email(email)?;
    }
    optional_text("bio", update.bio.as_deref(), 500)?;
    optional_text("institution", update.institution.as_deref(), 128)?;
    optional_text("department", update.department.as_deref(), 128)?;
    optional_text("avatar", update.avatar.as_deref(), 512)?;
    if matches!(update.year_of_study, Some(y) if !(1..=10).contains(&y)) {
        return Err(StudyhallError::BadRequest(
            "yearOfStudy must be between 1 and 10".into(),
        ));
    }

    let user = state.store.update_user(caller.id, update).await?;
    ok(&user)
}

async fn handle_get_user(req: Request<Bytes>, state: &AppState, id: &str) -> HandlerResult {
    let caller = require_user(state, &req, "get_user").await?;
    let id = parse_id(id, "user")?;
    let user = state
        .store
        .get_user(id)
        .await
        .ok_or(StudyhallError::not_found("user", id))?;

    if caller.id == user.id || caller.is_admin() {
        ok(&user)
    } else {
        ok(&UserProfile::from(&user))
    }
}

async fn handle_user_activity(req: Request<Bytes>, state: &AppState, id: &str) -> HandlerResult {
    require_user(state, &req, "user_activity").await?;
    let id = parse_id(id, "user")?;
    let query: LimitQuery = parse_query(&req)?;
    let limit = clamp_limit(query.limit, 20, MAX_SEARCH_LIMIT);
    ok(&state.store.get_user_activities(id, limit).await)
}

/// Handle /api/users/* requests
pub async fn handle_users_request(
    req: Request<Bytes>,
    state: &AppState,
    segments: &[&str],
) -> HandlerResult {
    let method = req.method().clone();
    match (&method, segments) {
        (&Method::GET, ["leaderboard"]) => handle_leaderboard(req, state).await,
        (&Method::GET, ["search"]) => handle_search(req, state).await,
        (&Method::PATCH, ["me"]) => handle_update_me(req, state).await,
        (&Method::GET, [id]) => handle_get_user(req, state, id).await,
        (&Method::GET, [id, "activity"]) => handle_user_activity(req, state, id).await,
        _ => no_route(&req),
    }
}
