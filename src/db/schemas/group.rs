//! Study groups, their members, sessions and chat

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyGroup {
    pub id: u32,
    pub name: String,
    pub description: Option<String>,
    pub course: Option<String>,
    /// UI accent colour, e.g. "#4f46e5"
    pub color: String,
    pub creator_id: u32,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudyGroup {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub course: Option<String>,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(skip)]
    pub creator_id: u32,
}

fn default_color() -> String {
    "#4f46e5".to_string()
}

/// Membership row, unique per (group, user)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyGroupMember {
    pub id: u32,
    pub group_id: u32,
    pub user_id: u32,
    /// Administrator of this group (not of the site)
    pub is_admin: bool,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySession {
    pub id: u32,
    pub group_id: u32,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub location: Option<String>,
    pub meeting_link: Option<String>,
    pub created_by: u32,
    pub created_at: DateTime<Utc>,
}

impl StudySession {
    pub fn is_virtual(&self) -> bool {
        self.meeting_link.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudySession {
    #[serde(skip)]
    pub group_id: u32,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub meeting_link: Option<String>,
    #[serde(skip)]
    pub created_by: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupChatMessage {
    pub id: u32,
    pub group_id: u32,
    pub user_id: u32,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewGroupChatMessage {
    pub group_id: u32,
    pub user_id: u32,
    pub content: String,
}
