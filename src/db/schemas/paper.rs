//! Papers and shared resources
//!
//! Both are file- or link-backed uploads with a download counter. The store
//! keeps only the reference string; the file itself lives elsewhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An uploaded past paper, notes set or similar document
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paper {
    pub id: u32,
    pub title: String,
    pub description: Option<String>,
    pub course: String,
    pub year: Option<u16>,
    pub institution: Option<String>,
    pub file_url: String,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    /// Kind of document, e.g. "exam", "notes", "assignment"
    pub resource_type: String,
    pub uploader_id: u32,
    pub downloads: u32,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPaper {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub course: String,
    #[serde(default)]
    pub year: Option<u16>,
    #[serde(default)]
    pub institution: Option<String>,
    pub file_url: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default = "default_paper_type")]
    pub resource_type: String,
    /// Filled in from the caller's token, never from the body
    #[serde(skip)]
    pub uploader_id: u32,
}

fn default_paper_type() -> String {
    "paper".to_string()
}

/// A shared study resource (link, video, slide deck, ...)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: u32,
    pub title: String,
    pub description: Option<String>,
    pub course: Option<String>,
    pub resource_type: String,
    pub url: String,
    pub uploader_id: u32,
    pub downloads: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewResource {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub course: Option<String>,
    #[serde(default = "default_resource_type")]
    pub resource_type: String,
    pub url: String,
    #[serde(skip)]
    pub uploader_id: u32,
}

fn default_resource_type() -> String {
    "link".to_string()
}
