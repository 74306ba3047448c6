//! In-memory data layer
//!
//! - `schemas` - record types and their insertable counterparts
//! - `store` - `MemStorage`, the tables and every mutation
//! - `query` - exact-match filters and ranked search
//! - `resolvers` - joined views for API responses
//! - `seed` - first admin plus sample accounts at startup
//!
//! State is volatile: everything is lost on restart.

mod query;
mod resolvers;
pub mod schemas;
mod seed;
mod store;

pub use query::{
    ranked_search, DiscussionFilter, Filter, MatchRank, PaperFilter, ResourceFilter, SearchQuery,
    Searchable, StudyGroupFilter, MAX_SEARCH_LIMIT,
};
pub use resolvers::{
    ChatMessageView, CommentView, ConversationSummary, DiscussionPostSummary, DiscussionPostView,
    FriendRequestView, FriendView, GroupMemberView, ReplyView, StudyGroupView, UpcomingSession,
};
pub use seed::{seed, SeedOptions, SeedReport, SAMPLE_PASSWORD};
pub use store::{points, MemStorage, StoreStats};
