//! Discussion forum endpoints
//!
//! Posts:
//! - `GET /api/discussions` - Summaries, filterable by course, author, tag
//! - `GET /api/discussions/search?q=`
//! - `POST /api/discussions`
//! - `GET /api/discussions/{id}` - Full thread; counts a view
//! - `POST /api/discussions/{id}/vote` - Body `{"value": 1}` or `{"value": -1}`
//! - `POST /api/discussions/{id}/replies`
//! - `DELETE /api/discussions/{id}` - Author or admin
//!
//! Replies:
//! - `POST /api/replies/{id}/vote`
//! - `POST /api/replies/{id}/accept` - Post author only
//! - `POST /api/replies/{id}/comments`

use std::collections::BTreeSet;

use bytes::Bytes;
use hyper::{Method, Request};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::common::{
    allow_public, created, no_content, no_route, ok, optional_text, parse_id, parse_json,
    parse_query, record_admin_action, require_text, require_user, HandlerResult,
};
use crate::db::points;
use crate::db::schemas::{NewActivity, NewDiscussionComment, NewDiscussionPost, NewDiscussionReply};
use crate::db::{DiscussionFilter, SearchQuery};
use crate::server::AppState;
use crate::types::{Result, StudyhallError};

const MAX_TAGS: usize = 10;

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub value: i32,
}

impl VoteRequest {
    fn delta(&self) -> Result<i32> {
        match self.value {
            1 | -1 => Ok(self.value),
            _ => Err(StudyhallError::BadRequest("vote value must be 1 or -1".into())),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ContentRequest {
    pub content: String,
}

fn validate_post(post: &NewDiscussionPost) -> Result<()> {
    require_text("title", &post.title, 200)?;
    require_text("content", &post.content, 10_000)?;
    optional_text("course", post.course.as_deref(), 64)?;
    if post.tags.len() > MAX_TAGS {
        return Err(StudyhallError::BadRequest(format!(
            "At most {} tags are allowed",
            MAX_TAGS
        )));
    }
    post.tags.iter().try_for_each(|t| require_text("tag", t, 32))
}

/// Trim and lowercase tags, dropping repeats while keeping first-seen order
fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

// =============================================================================
// Posts
// =============================================================================

async fn handle_list(req: Request<Bytes>, state: &AppState) -> HandlerResult {
    allow_public("list_discussions")?;
    let filter: DiscussionFilter = parse_query(&req)?;
    ok(&state.store.get_discussion_post_summaries(&filter).await)
}

async fn handle_search(req: Request<Bytes>, state: &AppState) -> HandlerResult {
    allow_public("search_discussions")?;
    let query: SearchQuery = parse_query(&req)?;
    ok(&state.store.search_discussions(&query).await)
}

async fn handle_create(req: Request<Bytes>, state: &AppState) -> HandlerResult {
    let user = require_user(state, &req, "create_discussion").await?;
    let mut input: NewDiscussionPost = parse_json(&req)?;
    input.tags = normalize_tags(input.tags);
    validate_post(&input)?;
    input.author_id = user.id;

    let post = state.store.create_discussion_post(input).await;
    state
        .store
        .award_points(user.id, points::DISCUSSION_POST)
        .await?;
    state
        .store
        .create_activity(
            NewActivity::new(user.id, "discussion_post")
                .target("discussion", post.id)
                .metadata(json!({ "title": post.title })),
        )
        .await;
    created(&post)
}

async fn handle_get(state: &AppState, id: &str) -> HandlerResult {
    allow_public("get_discussion")?;
    let id = parse_id(id, "discussion post")?;
    state.store.record_post_view(id).await?;
    let view = state
        .store
        .get_discussion_post(id)
        .await
        .ok_or(StudyhallError::not_found("discussion post", id))?;
    ok(&view)
}

async fn handle_vote_post(req: Request<Bytes>, state: &AppState, id: &str) -> HandlerResult {
    require_user(state, &req, "vote").await?;
    let id = parse_id(id, "discussion post")?;
    let vote: VoteRequest = parse_json(&req)?;
    ok(&state.store.vote_discussion_post(id, vote.delta()?).await?)
}

async fn handle_reply(req: Request<Bytes>, state: &AppState, id: &str) -> HandlerResult {
    let user = require_user(state, &req, "reply").await?;
    let post_id = parse_id(id, "discussion post")?;
    let body: ContentRequest = parse_json(&req)?;
    require_text("content", &body.content, 10_000)?;

    let reply = state
        .store
        .create_discussion_reply(NewDiscussionReply {
            post_id,
            author_id: user.id,
            content: body.content,
        })
        .await?;
    state
        .store
        .award_points(user.id, points::DISCUSSION_REPLY)
        .await?;
    state
        .store
        .create_activity(
            NewActivity::new(user.id, "discussion_reply")
                .target("discussion", post_id)
                .metadata(json!({ "replyId": reply.id })),
        )
        .await;
    created(&reply)
}

async fn handle_delete(req: Request<Bytes>, state: &AppState, id: &str) -> HandlerResult {
    let user = require_user(state, &req, "delete_discussion").await?;
    let id = parse_id(id, "discussion post")?;
    let post = state
        .store
        .get_post(id)
        .await
        .ok_or(StudyhallError::not_found("discussion post", id))?;

    if post.author_id != user.id && !user.is_admin() {
        return Err(StudyhallError::Forbidden(
            "Only the author or an admin can delete this post".into(),
        ));
    }

    state.store.delete_discussion_post(id).await?;
    if post.author_id != user.id {
        record_admin_action(state, &user, "delete_discussion", "discussion", id, None)
            .await;
    }
    info!(post_id = id, deleted_by = user.id, "Discussion deleted");
    no_content()
}

/// Handle /api/discussions/* requests
pub async fn handle_discussions_request(
    req: Request<Bytes>,
    state: &AppState,
    segments: &[&str],
) -> HandlerResult {
    let method = req.method().clone();
    match (&method, segments) {
        (&Method::GET, []) => handle_list(req, state).await,
        (&Method::GET, ["search"]) => handle_search(req, state).await,
        (&Method::POST, []) => handle_create(req, state).await,
        (&Method::GET, [id]) => handle_get(state, id).await,
        (&Method::POST, [id, "vote"]) => handle_vote_post(req, state, id).await,
        (&Method::POST, [id, "replies"]) => handle_reply(req, state, id).await,
        (&Method::DELETE, [id]) => handle_delete(req, state, id).await,
        _ => no_route(&req),
    }
}

// =============================================================================
// Replies
// =============================================================================

async fn handle_vote_reply(req: Request<Bytes>, state: &AppState, id: &str) -> HandlerResult {
    require_user(state, &req, "vote").await?;
    let id = parse_id(id, "reply")?;
    let vote: VoteRequest = parse_json(&req)?;
    ok(&state.store.vote_reply(id, vote.delta()?).await?)
}

async fn handle_accept(req: Request<Bytes>, state: &AppState, id: &str) -> HandlerResult {
    let user = require_user(state, &req, "accept_reply").await?;
    let id = parse_id(id, "reply")?;
    let reply = state
        .store
        .get_reply(id)
        .await
        .ok_or(StudyhallError::not_found("reply", id))?;
    let post = state
        .store
        .get_post(reply.post_id)
        .await
        .ok_or(StudyhallError::not_found("discussion post", reply.post_id))?;

    if post.author_id != user.id {
        return Err(StudyhallError::Forbidden(
            "Only the post author can accept a reply".into(),
        ));
    }

    ok(&state.store.accept_reply(id).await?)
}

async fn handle_comment(req: Request<Bytes>, state: &AppState, id: &str) -> HandlerResult {
    let user = require_user(state, &req, "comment").await?;
    let reply_id = parse_id(id, "reply")?;
    let body: ContentRequest = parse_json(&req)?;
    require_text("content", &body.content, 2_000)?;

    let comment = state
        .store
        .create_discussion_comment(NewDiscussionComment {
            reply_id,
            author_id: user.id,
            content: body.content,
        })
        .await?;
    created(&comment)
}

/// Handle /api/replies/* requests
pub async fn handle_replies_request(
    req: Request<Bytes>,
    state: &AppState,
    segments: &[&str],
) -> HandlerResult {
    let method = req.method().clone();
    match (&method, segments) {
        (&Method::POST, [id, "vote"]) => handle_vote_reply(req, state, id).await,
        (&Method::POST, [id, "accept"]) => handle_accept(req, state, id).await,
        (&Method::POST, [id, "comments"]) => handle_comment(req, state, id).await,
        _ => no_route(&req),
    }
}
