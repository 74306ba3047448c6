//! Append-only logs: the activity feed and the admin audit trail

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Feed entry. `metadata` is free-form; consumers must not assume a shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: u32,
    pub user_id: u32,
    /// e.g. "paper_upload", "discussion_post", "group_join"
    pub activity_type: String,
    pub target_id: Option<u32>,
    pub target_type: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewActivity {
    pub user_id: u32,
    pub activity_type: String,
    pub target_id: Option<u32>,
    pub target_type: Option<String>,
    pub metadata: serde_json::Value,
}

impl NewActivity {
    pub fn new(user_id: u32, activity_type: &str) -> Self {
        Self {
            user_id,
            activity_type: activity_type.to_string(),
            target_id: None,
            target_type: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn target(mut self, target_type: &str, target_id: u32) -> Self {
        self.target_type = Some(target_type.to_string());
        self.target_id = Some(target_id);
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Audit entry for an administrative action
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAction {
    pub id: u32,
    pub admin_id: u32,
    /// e.g. "ban_user", "grant_admin", "delete_paper"
    pub action: String,
    pub target_type: String,
    pub target_id: u32,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAdminAction {
    pub admin_id: u32,
    pub action: String,
    pub target_type: String,
    pub target_id: u32,
    pub reason: Option<String>,
}
