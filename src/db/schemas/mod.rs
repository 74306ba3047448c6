//! Record types for the in-memory store
//!
//! Each stored type has a `New*` counterpart holding only the fields a
//! caller may supply. Ids, timestamps and counters are stamped by the store.

mod activity;
mod discussion;
mod group;
mod paper;
mod social;
mod user;

pub use activity::{Activity, AdminAction, NewActivity, NewAdminAction};
pub use discussion::{
    DiscussionComment, DiscussionPost, DiscussionReply, NewDiscussionComment, NewDiscussionPost,
    NewDiscussionReply,
};
pub use group::{
    GroupChatMessage, NewGroupChatMessage, NewStudyGroup, NewStudySession, StudyGroup,
    StudyGroupMember, StudySession,
};
pub use paper::{NewPaper, NewResource, Paper, Resource};
pub use social::{DirectMessage, FriendRequest, FriendRequestStatus, Friendship, NewDirectMessage};
pub use user::{NewUser, Role, UpdateUser, User, UserProfile, DEFAULT_AVATAR, UNKNOWN_AUTHOR};
