//! Past papers and shared resources
//!
//! Papers:
//! - `GET /api/papers` - List with exact-match filters
//! - `GET /api/papers/search?q=` - Ranked search
//! - `POST /api/papers` - Upload (file reference only)
//! - `GET /api/papers/{id}`
//! - `POST /api/papers/{id}/download` - Count a download, returns the file URL
//! - `DELETE /api/papers/{id}` - Admin removal
//!
//! Resources follow the same shape under `/api/resources`.

use bytes::Bytes;
use hyper::{Method, Request};
use serde_json::json;
use tracing::info;

use super::common::{
    allow_public, created, no_content, no_route, ok, optional_text, parse_id, parse_json,
    parse_json_or_default, parse_query, record_admin_action, require_text, require_user,
    HandlerResult, ReasonRequest,
};
use crate::db::points;
use crate::db::schemas::{NewActivity, NewPaper, NewResource};
use crate::db::{PaperFilter, ResourceFilter, SearchQuery};
use crate::server::AppState;
use crate::types::{Result, StudyhallError};

fn validate_paper(paper: &NewPaper) -> Result<()> {
    require_text("title", &paper.title, 200)?;
    require_text("course", &paper.course, 64)?;
    require_text("fileUrl", &paper.file_url, 1024)?;
    require_text("resourceType", &paper.resource_type, 32)?;
    optional_text("description", paper.description.as_deref(), 2000)?;
    optional_text("institution", paper.institution.as_deref(), 128)?;
    if matches!(paper.year, Some(y) if !(1900..=2100).contains(&y)) {
        return Err(StudyhallError::BadRequest("year is out of range".into()));
    }
    Ok(())
}

fn validate_resource(resource: &NewResource) -> Result<()> {
    require_text("title", &resource.title, 200)?;
    require_text("url", &resource.url, 1024)?;
    require_text("resourceType", &resource.resource_type, 32)?;
    optional_text("description", resource.description.as_deref(), 2000)?;
    optional_text("course", resource.course.as_deref(), 64)
}

// =============================================================================
// Papers
// =============================================================================

async fn handle_list_papers(req: Request<Bytes>, state: &AppState) -> HandlerResult {
    allow_public("list_papers")?;
    let filter: PaperFilter = parse_query(&req)?;
    ok(&state.store.get_papers(&filter).await)
}

async fn handle_search_papers(req: Request<Bytes>, state: &AppState) -> HandlerResult {
    allow_public("search_papers")?;
    let query: SearchQuery = parse_query(&req)?;
    ok(&state.store.search_papers(&query).await)
}

async fn handle_upload_paper(req: Request<Bytes>, state: &AppState) -> HandlerResult {
    let user = require_user(state, &req, "upload_paper").await?;
    let mut input: NewPaper = parse_json(&req)?;
    validate_paper(&input)?;
    input.uploader_id = user.id;

    let paper = state.store.create_paper(input).await;
    state.store.award_points(user.id, points::PAPER_UPLOAD).await?;
    state
        .store
        .create_activity(
            NewActivity::new(user.id, "paper_upload")
                .target("paper", paper.id)
                .metadata(json!({ "title": paper.title, "course": paper.course })),
        )
        .await;

    info!(paper_id = paper.id, uploader_id = user.id, "Paper uploaded");
    created(&paper)
}

async fn handle_get_paper(state: &AppState, id: &str) -> HandlerResult {
    allow_public("get_paper")?;
    let id = parse_id(id, "paper")?;
    let paper = state
        .store
        .get_paper(id)
        .await
        .ok_or(StudyhallError::not_found("paper", id))?;
    ok(&paper)
}

async fn handle_download_paper(state: &AppState, id: &str) -> HandlerResult {
    allow_public("download_paper")?;
    let id = parse_id(id, "paper")?;
    let paper = state.store.increment_paper_downloads(id).await?;
    ok(&json!({
        "fileUrl": paper.file_url,
        "fileName": paper.file_name,
        "downloads": paper.downloads,
    }))
}

async fn handle_delete_paper(req: Request<Bytes>, state: &AppState, id: &str) -> HandlerResult {
    let admin = require_user(state, &req, "delete_paper").await?;
    let id = parse_id(id, "paper")?;
    let body: ReasonRequest = parse_json_or_default(&req)?;

    state.store.delete_paper(id).await?;
    record_admin_action(state, &admin, "delete_paper", "paper", id, body.reason).await;
    no_content()
}

/// Handle /api/papers/* requests
pub async fn handle_papers_request(
    req: Request<Bytes>,
    state: &AppState,
    segments: &[&str],
) -> HandlerResult {
    let method = req.method().clone();
    match (&method, segments) {
        (&Method::GET, []) => handle_list_papers(req, state).await,
        (&Method::GET, ["search"]) => handle_search_papers(req, state).await,
        (&Method::POST, []) => handle_upload_paper(req, state).await,
        (&Method::GET, [id]) => handle_get_paper(state, id).await,
        (&Method::POST, [id, "download"]) => handle_download_paper(state, id).await,
        (&Method::DELETE, [id]) => handle_delete_paper(req, state, id).await,
        _ => no_route(&req),
    }
}

// =============================================================================
// Resources
// =============================================================================

async fn handle_list_resources(req: Request<Bytes>, state: &AppState) -> HandlerResult {
    allow_public("list_resources")?;
    let filter: ResourceFilter = parse_query(&req)?;
    ok(&state.store.get_resources(&filter).await)
}

async fn handle_create_resource(req: Request<Bytes>, state: &AppState) -> HandlerResult {
    let user = require_user(state, &req, "create_resource").await?;
    let mut input: NewResource = parse_json(&req)?;
    validate_resource(&input)?;
    input.uploader_id = user.id;

    let resource = state.store.create_resource(input).await;
    state
        .store
        .award_points(user.id, points::RESOURCE_SHARE)
        .await?;
    state
        .store
        .create_activity(
            NewActivity::new(user.id, "resource_share")
                .target("resource", resource.id)
                .metadata(json!({ "title": resource.title })),
        )
        .await;
    created(&resource)
}

async fn handle_get_resource(state: &AppState, id: &str) -> HandlerResult {
    allow_public("get_resource")?;
    let id = parse_id(id, "resource")?;
    let resource = state
        .store
        .get_resource(id)
        .await
        .ok_or(StudyhallError::not_found("resource", id))?;
    ok(&resource)
}

async fn handle_download_resource(state: &AppState, id: &str) -> HandlerResult {
    allow_public("download_resource")?;
    let id = parse_id(id, "resource")?;
    let resource = state.store.increment_resource_downloads(id).await?;
    ok(&json!({ "url": resource.url, "downloads": resource.downloads }))
}

async fn handle_delete_resource(req: Request<Bytes>, state: &AppState, id: &str) -> HandlerResult {
    let admin = require_user(state, &req, "delete_resource").await?;
    let id = parse_id(id, "resource")?;
    let body: ReasonRequest = parse_json_or_default(&req)?;

    state.store.delete_resource(id).await?;
    record_admin_action(state, &admin, "delete_resource", "resource", id, body.reason).await;
    no_content()
}

/// Handle /api/resources/* requests
pub async fn handle_resources_request(
    req: Request<Bytes>,
    state: &AppState,
    segments: &[&str],
) -> HandlerResult {
    let method = req.method().clone();
    match (&method, segments) {
        (&Method::GET, []) => handle_list_resources(req, state).await,
        (&Method::POST, []) => handle_create_resource(req, state).await,
        (&Method::GET, [id]) => handle_get_resource(state, id).await,
        (&Method::POST, [id, "download"]) => handle_download_resource(state, id).await,
        (&Method::DELETE, [id]) => handle_delete_resource(req, state, id).await,
        _ => no_route(&req),
    }
}
