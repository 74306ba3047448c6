//! Permission levels and the API operation whitelist
//!
//! Every route names its operation, anonymous ones included; the level
//! required for it is looked up here. Operations missing from the table are
//! refused.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::schemas::{Role, User};

/// Permission levels for API operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum PermissionLevel {
    /// Anonymous visitor - browsing only
    #[default]
    Public = 0,
    /// Logged-in student
    Authenticated = 1,
    /// Site administrator
    Admin = 2,
}

impl PermissionLevel {
    /// Level granted to a stored user. Banned users keep no privileges.
    pub fn for_user(user: &User) -> Self {
        if user.is_banned {
            return PermissionLevel::Public;
        }
        match user.role {
            Role::Admin => PermissionLevel::Admin,
            Role::Regular => PermissionLevel::Authenticated,
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionLevel::Public => write!(f, "PUBLIC"),
            PermissionLevel::Authenticated => write!(f, "AUTHENTICATED"),
            PermissionLevel::Admin => write!(f, "ADMIN"),
        }
    }
}

/// Get the required permission level for an API operation.
/// Returns None for unknown operations (which should be blocked).
pub fn get_required_permission(operation: &str) -> Option<PermissionLevel> {
    match operation {
        // Public - browsing
        "list_papers"
        | "search_papers"
        | "get_paper"
        | "download_paper"
        | "list_resources"
        | "get_resource"
        | "download_resource"
        | "list_discussions"
        | "search_discussions"
        | "get_discussion"
        | "list_groups"
        | "search_groups"
        | "recent_activity"
        | "leaderboard" => Some(PermissionLevel::Public),

        // Authenticated - contributing and socialising
        "me"
        | "get_user"
        | "update_profile"
        | "search_users"
        | "user_activity"
        | "upload_paper"
        | "create_resource"
        | "create_discussion"
        | "delete_discussion"
        | "vote"
        | "reply"
        | "comment"
        | "accept_reply"
        | "create_group"
        | "delete_group"
        | "get_group"
        | "group_members"
        | "join_group"
        | "leave_group"
        | "my_groups"
        | "list_sessions"
        | "create_session"
        | "upcoming_sessions"
        | "search_sessions"
        | "read_chat"
        | "send_chat"
        | "list_friends"
        | "friend_requests"
        | "send_friend_request"
        | "respond_friend_request"
        | "remove_friend"
        | "list_conversations"
        | "read_conversation"
        | "send_message" => Some(PermissionLevel::Authenticated),

        // Admin - moderation and role management
        "list_users"
        | "ban_user"
        | "unban_user"
        | "grant_admin"
        | "revoke_admin"
        | "delete_paper"
        | "delete_resource"
        | "admin_actions"
        | "admin_stats" => Some(PermissionLevel::Admin),

        _ => None,
    }
}

/// Check if an operation is allowed for the given permission level
pub fn is_operation_allowed(operation: &str, level: PermissionLevel) -> bool {
    match get_required_permission(operation) {
        Some(required) => level >= required,
        None => false,
    }
}
