//! Direct messages between users
//!
//! - `GET /api/messages` - Conversation partners with last message and unread count
//! - `GET /api/messages/{userId}?limit=` - Thread with one user; marks it read
//! - `POST /api/messages/{userId}` - Body `{"content": "..."}`

use bytes::Bytes;
use hyper::{Method, Request};
use serde::Deserialize;

use super::common::{
    clamp_limit, created, no_route, ok, parse_id, parse_json, parse_query, require_text,
    require_user, HandlerResult,
};
use crate::db::schemas::NewDirectMessage;
use crate::server::AppState;
use crate::types::StudyhallError;

const MAX_THREAD_LIMIT: usize = 500;

#[derive(Debug, Default, Deserialize)]
struct ThreadQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    content: String,
}

async fn handle_partners(req: Request<Bytes>, state: &AppState) -> HandlerResult {
    let user = require_user(state, &req, "list_conversations").await?;
    ok(&state.store.get_conversation_partners(user.id).await)
}

async fn handle_thread(req: Request<Bytes>, state: &AppState, id: &str) -> HandlerResult {
    let user = require_user(state, &req, "read_conversation").await?;
    let other_id = parse_id(id, "user")?;
    let query: ThreadQuery = parse_query(&req)?;
    let limit = clamp_limit(query.limit, state.args.chat_history_limit, MAX_THREAD_LIMIT);

    state.store.mark_conversation_read(user.id, other_id).await;
    ok(&state.store.get_conversation(user.id, other_id, limit).await)
}

async fn handle_send(req: Request<Bytes>, state: &AppState, id: &str) -> HandlerResult {
    let user = require_user(state, &req, "send_message").await?;
    let receiver_id = parse_id(id, "user")?;
    if receiver_id == user.id {
        return Err(StudyhallError::BadRequest(
            "Cannot send a message to yourself".into(),
        ));
    }

    let body: MessageBody = parse_json(&req)?;
    require_text("content", &body.content, 5_000)?;

    let message = state
        .store
        .send_direct_message(NewDirectMessage {
            sender_id: user.id,
            receiver_id,
            content: body.content,
        })
        .await?;
    created(&message)
}

/// Handle /api/messages/* requests
pub async fn handle_messages_request(
    req: Request<Bytes>,
    state: &AppState,
    segments: &[&str],
) -> HandlerResult {
    let method = req.method().clone();
    match (&method, segments) {
        (&Method::GET, []) => handle_partners(req, state).await,
        (&Method::GET, [id]) => handle_thread(req, state, id).await,
        (&Method::POST, [id]) => handle_send(req, state, id).await,
        _ => no_route(&req),
    }
}
