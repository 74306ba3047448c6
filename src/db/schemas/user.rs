//! User records
//!
//! A student or administrator account. Role and ban state are independent:
//! an admin can be banned and keeps the admin role while banned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder avatar served when a user has none (or no longer exists)
pub const DEFAULT_AVATAR: &str = "/avatars/default.png";

/// Display name used when a referenced user no longer exists
pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Regular,
    Admin,
}

/// Stored user record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u32,
    pub username: String,
    pub email: String,
    /// Argon2 PHC hash, never serialized
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: String,
    pub bio: Option<String>,
    pub institution: Option<String>,
    pub department: Option<String>,
    pub year_of_study: Option<u8>,
    pub avatar: Option<String>,
    pub role: Role,
    pub is_banned: bool,
    pub points: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_active_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Name shown next to content; falls back to the username
    pub fn name(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.username
        } else {
            &self.display_name
        }
    }

    pub fn avatar_or_default(&self) -> &str {
        self.avatar.as_deref().unwrap_or(DEFAULT_AVATAR)
    }
}

/// Insertable subset of a user; the store stamps the rest
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    pub bio: Option<String>,
    pub institution: Option<String>,
    pub department: Option<String>,
    pub year_of_study: Option<u8>,
    pub avatar: Option<String>,
    pub role: Role,
}

/// Partial profile update; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUser {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub institution: Option<String>,
    pub department: Option<String>,
    pub year_of_study: Option<u8>,
    pub avatar: Option<String>,
}

/// Public view of another user's profile (no email)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: u32,
    pub username: String,
    pub display_name: String,
    pub avatar: String,
    pub bio: Option<String>,
    pub institution: Option<String>,
    pub department: Option<String>,
    pub year_of_study: Option<u8>,
    pub role: Role,
    pub points: u32,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            display_name: user.name().to_string(),
            avatar: user.avatar_or_default().to_string(),
            bio: user.bio.clone(),
            institution: user.institution.clone(),
            department: user.department.clone(),
            year_of_study: user.year_of_study,
            role: user.role,
            points: user.points,
            created_at: user.created_at,
        }
    }
}
