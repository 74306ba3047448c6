//! Friend requests, friendships and direct messages

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendRequestStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub id: u32,
    pub sender_id: u32,
    pub receiver_id: u32,
    pub status: FriendRequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Undirected friendship, stored once per unordered pair
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Friendship {
    pub id: u32,
    pub user1_id: u32,
    pub user2_id: u32,
    pub created_at: DateTime<Utc>,
}

impl Friendship {
    pub fn involves(&self, user_id: u32) -> bool {
        self.user1_id == user_id || self.user2_id == user_id
    }

    /// The other party, if `user_id` is one of the two
    pub fn other(&self, user_id: u32) -> Option<u32> {
        if self.user1_id == user_id {
            Some(self.user2_id)
        } else if self.user2_id == user_id {
            Some(self.user1_id)
        } else {
            None
        }
    }

    pub fn connects(&self, a: u32, b: u32) -> bool {
        self.other(a) == Some(b)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    pub id: u32,
    pub sender_id: u32,
    pub receiver_id: u32,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl DirectMessage {
    /// True if the message was exchanged between `a` and `b`, either way
    pub fn between(&self, a: u32, b: u32) -> bool {
        (self.sender_id == a && self.receiver_id == b)
            || (self.sender_id == b && self.receiver_id == a)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewDirectMessage {
    pub sender_id: u32,
    pub receiver_id: u32,
    pub content: String,
}
