//! Study groups, their sessions and group chat
//!
//! Groups:
//! - `GET /api/groups?course=&creatorId=&isPrivate=` - Public listing
//! - `GET /api/groups/search?q=`
//! - `GET /api/groups/mine` - Groups the caller belongs to
//! - `POST /api/groups` - Create; the creator becomes a group admin
//! - `GET /api/groups/{id}` - Group with creator name and member count
//! - `DELETE /api/groups/{id}` - Creator or site admin
//! - `GET /api/groups/{id}/members`
//! - `POST /api/groups/{id}/join`, `POST /api/groups/{id}/leave`
//! - `GET|POST /api/groups/{id}/sessions` - Members only
//! - `GET|POST /api/groups/{id}/messages?limit=` - Members only
//!
//! Sessions:
//! - `GET /api/sessions/upcoming` - Caller's future sessions across groups
//! - `GET /api/sessions/search?q=`

use bytes::Bytes;
use hyper::{Method, Request};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::common::{
    allow_public, clamp_limit, created, no_content, no_route, ok, optional_text, parse_id,
    parse_json, parse_query, record_admin_action, require_text, require_user, HandlerResult,
};
use crate::db::points;
use crate::db::schemas::{
    NewActivity, NewGroupChatMessage, NewStudyGroup, NewStudySession, StudyGroup, User,
};
use crate::db::{SearchQuery, StudyGroupFilter, MAX_SEARCH_LIMIT};
use crate::server::AppState;
use crate::types::{Result, StudyhallError};

#[derive(Debug, Default, Deserialize)]
struct ChatQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    content: String,
}

fn validate_group(group: &NewStudyGroup) -> Result<()> {
    require_text("name", &group.name, 100)?;
    optional_text("description", group.description.as_deref(), 2000)?;
    optional_text("course", group.course.as_deref(), 64)?;
    let hex = group.color.strip_prefix('#').unwrap_or("");
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(StudyhallError::BadRequest(format!(
            "color must look like #rrggbb, got {}",
            group.color
        )));
    }
    Ok(())
}

fn validate_session(session: &NewStudySession) -> Result<()> {
    require_text("title", &session.title, 200)?;
    optional_text("description", session.description.as_deref(), 2000)?;
    optional_text("location", session.location.as_deref(), 200)?;
    optional_text("meetingLink", session.meeting_link.as_deref(), 1024)?;
    if session.end_time <= session.start_time {
        return Err(StudyhallError::BadRequest(
            "endTime must be after startTime".into(),
        ));
    }
    Ok(())
}

async fn load_group(state: &AppState, id: &str) -> Result<StudyGroup> {
    let id = parse_id(id, "study group")?;
    state
        .store
        .get_study_group(id)
        .await
        .ok_or(StudyhallError::not_found("study group", id))
}

/// Members only; site admins are not exempt
async fn require_member(state: &AppState, group: &StudyGroup, user: &User) -> Result<()> {
    if state.store.is_group_member(group.id, user.id).await {
        Ok(())
    } else {
        Err(StudyhallError::Forbidden(format!(
            "Not a member of group {}",
            group.id
        )))
    }
}

// =============================================================================
// Groups
// =============================================================================

async fn handle_list(req: Request<Bytes>, state: &AppState) -> HandlerResult {
    allow_public("list_groups")?;
    let filter: StudyGroupFilter = parse_query(&req)?;
    ok(&state.store.get_study_groups(&filter).await)
}

async fn handle_search(req: Request<Bytes>, state: &AppState) -> HandlerResult {
    allow_public("search_groups")?;
    let query: SearchQuery = parse_query(&req)?;
    ok(&state.store.search_groups(&query).await)
}

async fn handle_mine(req: Request<Bytes>, state: &AppState) -> HandlerResult {
    let user = require_user(state, &req, "my_groups").await?;
    ok(&state.store.get_user_study_groups(user.id).await)
}

async fn handle_create(req: Request<Bytes>, state: &AppState) -> HandlerResult {
    let user = require_user(state, &req, "create_group").await?;
    let mut input: NewStudyGroup = parse_json(&req)?;
    validate_group(&input)?;
    input.creator_id = user.id;

    let (group, _) = state.store.create_study_group_with_creator(input).await?;
    state
        .store
        .award_points(user.id, points::STUDY_GROUP)
        .await?;
    state
        .store
        .create_activity(
            NewActivity::new(user.id, "group_create")
                .target("study_group", group.id)
                .metadata(json!({ "name": group.name })),
        )
        .await;

    info!(group_id = group.id, creator_id = user.id, "Study group created");
    created(&group)
}

async fn handle_get(req: Request<Bytes>, state: &AppState, id: &str) -> HandlerResult {
    require_user(state, &req, "get_group").await?;
    let id = parse_id(id, "study group")?;
    let view = state
        .store
        .get_study_group_view(id)
        .await
        .ok_or(StudyhallError::not_found("study group", id))?;
    ok(&view)
}

async fn handle_delete(req: Request<Bytes>, state: &AppState, id: &str) -> HandlerResult {
    let user = require_user(state, &req, "delete_group").await?;
    let group = load_group(state, id).await?;

    if group.creator_id != user.id && !user.is_admin() {
        return Err(StudyhallError::Forbidden(
            "Only the creator or an admin can delete this group".into(),
        ));
    }

    state.store.delete_study_group(group.id).await?;
    if group.creator_id != user.id {
        record_admin_action(state, &user, "delete_group", "study_group", group.id, None).await;
    }
    info!(group_id = group.id, deleted_by = user.id, "Study group deleted");
    no_content()
}

async fn handle_members(req: Request<Bytes>, state: &AppState, id: &str) -> HandlerResult {
    let user = require_user(state, &req, "group_members").await?;
    let group = load_group(state, id).await?;
    if group.is_private {
        require_member(state, &group, &user).await?;
    }
    ok(&state.store.get_group_members(group.id).await)
}

async fn handle_join(req: Request<Bytes>, state: &AppState, id: &str) -> HandlerResult {
    let user = require_user(state, &req, "join_group").await?;
    let group = load_group(state, id).await?;
    if group.is_private {
        return Err(StudyhallError::Forbidden(format!(
            "Group {} is private",
            group.id
        )));
    }

    let member = state.store.add_group_member(group.id, user.id, false).await?;
    state
        .store
        .create_activity(
            NewActivity::new(user.id, "group_join")
                .target("study_group", group.id)
                .metadata(json!({ "name": group.name })),
        )
        .await;
    created(&member)
}

async fn handle_leave(req: Request<Bytes>, state: &AppState, id: &str) -> HandlerResult {
    let user = require_user(state, &req, "leave_group").await?;
    let group = load_group(state, id).await?;
    state.store.remove_group_member(group.id, user.id).await?;
    no_content()
}

// =============================================================================
// Sessions
// =============================================================================

async fn handle_list_sessions(req: Request<Bytes>, state: &AppState, id: &str) -> HandlerResult {
    let user = require_user(state, &req, "list_sessions").await?;
    let group = load_group(state, id).await?;
    require_member(state, &group, &user).await?;
    ok(&state.store.get_study_sessions(group.id).await)
}

async fn handle_create_session(req: Request<Bytes>, state: &AppState, id: &str) -> HandlerResult {
    let user = require_user(state, &req, "create_session").await?;
    let group = load_group(state, id).await?;
    require_member(state, &group, &user).await?;

    let mut input: NewStudySession = parse_json(&req)?;
    validate_session(&input)?;
    input.group_id = group.id;
    input.created_by = user.id;

    let session = state.store.create_study_session(input).await?;
    state
        .store
        .create_activity(
            NewActivity::new(user.id, "session_create")
                .target("study_session", session.id)
                .metadata(json!({
                    "groupId": group.id,
                    "title": session.title,
                    "startTime": session.start_time,
                })),
        )
        .await;
    created(&session)
}

async fn handle_upcoming(req: Request<Bytes>, state: &AppState) -> HandlerResult {
    let user = require_user(state, &req, "upcoming_sessions").await?;
    ok(&state.store.get_upcoming_study_sessions(user.id).await)
}

async fn handle_search_sessions(req: Request<Bytes>, state: &AppState) -> HandlerResult {
    require_user(state, &req, "search_sessions").await?;
    let query: SearchQuery = parse_query(&req)?;
    ok(&state.store.search_sessions(&query).await)
}

// =============================================================================
// Chat
// =============================================================================

async fn handle_read_chat(req: Request<Bytes>, state: &AppState, id: &str) -> HandlerResult {
    let user = require_user(state, &req, "read_chat").await?;
    let group = load_group(state, id).await?;
    require_member(state, &group, &user).await?;

    let query: ChatQuery = parse_query(&req)?;
    let limit = clamp_limit(
        query.limit,
        state.args.chat_history_limit,
        MAX_SEARCH_LIMIT.max(state.args.chat_history_limit),
    );
    ok(&state.store.get_group_chat_messages(group.id, limit).await)
}

async fn handle_send_chat(req: Request<Bytes>, state: &AppState, id: &str) -> HandlerResult {
    let user = require_user(state, &req, "send_chat").await?;
    let group = load_group(state, id).await?;
    require_member(state, &group, &user).await?;

    let body: ChatRequest = parse_json(&req)?;
    require_text("content", &body.content, 2_000)?;

    let message = state
        .store
        .create_group_chat_message(NewGroupChatMessage {
            group_id: group.id,
            user_id: user.id,
            content: body.content,
        })
        .await?;
    created(&message)
}

/// Handle /api/groups/* requests
pub async fn handle_groups_request(
    req: Request<Bytes>,
    state: &AppState,
    segments: &[&str],
) -> HandlerResult {
    let method = req.method().clone();
    match (&method, segments) {
        (&Method::GET, []) => handle_list(req, state).await,
        (&Method::GET, ["search"]) => handle_search(req, state).await,
        (&Method::GET, ["mine"]) => handle_mine(req, state).await,
        (&Method::POST, []) => handle_create(req, state).await,
        (&Method::GET, [id]) => handle_get(req, state, id).await,
        (&Method::DELETE, [id]) => handle_delete(req, state, id).await,
        (&Method::GET, [id, "members"]) => handle_members(req, state, id).await,
        (&Method::POST, [id, "join"]) => handle_join(req, state, id).await,
        (&Method::POST, [id, "leave"]) => handle_leave(req, state, id).await,
        (&Method::GET, [id, "sessions"]) => handle_list_sessions(req, state, id).await,
        (&Method::POST, [id, "sessions"]) => handle_create_session(req, state, id).await,
        (&Method::GET, [id, "messages"]) => handle_read_chat(req, state, id).await,
        (&Method::POST, [id, "messages"]) => handle_send_chat(req, state, id).await,
        _ => no_route(&req),
    }
}

/// Handle /api/sessions/* requests
pub async fn handle_sessions_request(
    req: Request<Bytes>,
    state: &AppState,
    segments: &[&str],
) -> HandlerResult {
    let method = req.method().clone();
    match (&method, segments) {
        (&Method::GET, ["upcoming"]) => handle_upcoming(req, state).await,
        (&Method::GET, ["search"]) => handle_search_sessions(req, state).await,
        _ => no_route(&req),
    }
}
