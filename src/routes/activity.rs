//! Site-wide activity feed: `GET /api/activity?limit=`

use bytes::Bytes;
use hyper::Request;
use serde::Deserialize;

use super::common::{allow_public, clamp_limit, ok, parse_query, HandlerResult};
use crate::db::MAX_SEARCH_LIMIT;
use crate::server::AppState;

const DEFAULT_FEED_LIMIT: usize = 20;

#[derive(Debug, Default, Deserialize)]
struct FeedQuery {
    limit: Option<usize>,
}

/// Newest activities first
pub async fn handle_recent_activity(req: Request<Bytes>, state: &AppState) -> HandlerResult {
    allow_public("recent_activity")?;
    let query: FeedQuery = parse_query(&req)?;
    let limit = clamp_limit(query.limit, DEFAULT_FEED_LIMIT, MAX_SEARCH_LIMIT);
    ok(&state.store.get_recent_activities(limit).await)
}
