//! Friend list and friend requests
//!
//! - `GET /api/friends` - Caller's friends with profiles
//! - `GET /api/friends/requests` - Incoming pending requests
//! - `POST /api/friends/requests` - Body `{"userId": 7}`
//! - `POST /api/friends/requests/{id}/accept`
//! - `POST /api/friends/requests/{id}/reject`
//! - `DELETE /api/friends/{userId}` - Unfriend

use bytes::Bytes;
use hyper::{Method, Request};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::common::{created, no_content, no_route, ok, parse_id, parse_json, require_user, HandlerResult};
use crate::db::schemas::{FriendRequestStatus, NewActivity};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FriendRequestBody {
    user_id: u32,
}

async fn handle_list(req: Request<Bytes>, state: &AppState) -> HandlerResult {
    let user = require_user(state, &req, "list_friends").await?;
    ok(&state.store.get_friends(user.id).await)
}

async fn handle_pending(req: Request<Bytes>, state: &AppState) -> HandlerResult {
    let user = require_user(state, &req, "friend_requests").await?;
    ok(&state.store.get_pending_friend_requests(user.id).await)
}

async fn handle_send(req: Request<Bytes>, state: &AppState) -> HandlerResult {
    let user = require_user(state, &req, "send_friend_request").await?;
    let body: FriendRequestBody = parse_json(&req)?;
    let request = state.store.send_friend_request(user.id, body.user_id).await?;
    info!(
        request_id = request.id,
        sender_id = user.id,
        receiver_id = body.user_id,
        "Friend request sent"
    );
    created(&request)
}

async fn handle_respond(
    req: Request<Bytes>,
    state: &AppState,
    id: &str,
    accept: bool,
) -> HandlerResult {
    let user = require_user(state, &req, "respond_friend_request").await?;
    let id = parse_id(id, "friend request")?;
    let request = state.store.respond_friend_request(id, user.id, accept).await?;

    if request.status == FriendRequestStatus::Accepted {
        state
            .store
            .create_activity(
                NewActivity::new(user.id, "friend_added")
                    .target("user", request.sender_id)
                    .metadata(json!({ "requestId": request.id })),
            )
            .await;
    }
    ok(&request)
}

async fn handle_remove(req: Request<Bytes>, state: &AppState, id: &str) -> HandlerResult {
    let user = require_user(state, &req, "remove_friend").await?;
    let friend_id = parse_id(id, "user")?;
    state.store.remove_friendship(user.id, friend_id).await?;
    no_content()
}

/// Handle /api/friends/* requests
pub async fn handle_friends_request(
    req: Request<Bytes>,
    state: &AppState,
    segments: &[&str],
) -> HandlerResult {
    let method = req.method().clone();
    match (&method, segments) {
        (&Method::GET, []) => handle_list(req, state).await,
        (&Method::GET, ["requests"]) => handle_pending(req, state).await,
        (&Method::POST, ["requests"]) => handle_send(req, state).await,
        (&Method::POST, ["requests", id, "accept"]) => handle_respond(req, state, id, true).await,
        (&Method::POST, ["requests", id, "reject"]) => handle_respond(req, state, id, false).await,
        (&Method::DELETE, [id]) => handle_remove(req, state, id).await,
        _ => no_route(&req),
    }
}
