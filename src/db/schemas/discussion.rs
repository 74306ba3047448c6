//! Discussion forum records
//!
//! Posts own replies, replies own comments. The tree is not stored; it is
//! rebuilt on read from the `post_id` / `reply_id` back-references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscussionPost {
    pub id: u32,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub course: Option<String>,
    pub author_id: u32,
    pub votes: i32,
    pub views: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDiscussionPost {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub course: Option<String>,
    #[serde(skip)]
    pub author_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscussionReply {
    pub id: u32,
    pub post_id: u32,
    pub author_id: u32,
    pub content: String,
    pub votes: i32,
    pub is_accepted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDiscussionReply {
    #[serde(skip)]
    pub post_id: u32,
    #[serde(skip)]
    pub author_id: u32,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscussionComment {
    pub id: u32,
    pub reply_id: u32,
    pub author_id: u32,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDiscussionComment {
    #[serde(skip)]
    pub reply_id: u32,
    #[serde(skip)]
    pub author_id: u32,
    pub content: String,
}
