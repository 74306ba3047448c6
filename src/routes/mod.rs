//! HTTP routes for Studyhall

pub mod activity;
pub mod admin_users;
pub mod auth_routes;
pub mod common;
pub mod discussions;
pub mod friends;
pub mod groups;
pub mod health;
pub mod messages;
pub mod papers;
pub mod users;

pub use activity::handle_recent_activity;
pub use admin_users::handle_admin_request;
pub use auth_routes::handle_auth_request;
pub use common::{
    apply_cors, error_response, json_error, json_response, preflight_response, route_not_found,
    ErrorResponse, FullBody, HandlerResult,
};
pub use discussions::{handle_discussions_request, handle_replies_request};
pub use friends::handle_friends_request;
pub use groups::{handle_groups_request, handle_sessions_request};
pub use health::{health_check, version_info};
pub use messages::handle_messages_request;
pub use papers::{handle_papers_request, handle_resources_request};
pub use users::handle_users_request;
