//! Studyhall - student collaboration backend
//!
//! Students share past papers and resources, ask questions in a discussion
//! forum, organise study groups with scheduled sessions and group chat, and
//! keep in touch with friends through direct messages.
//!
//! ## Layout
//!
//! - **db**: In-memory record store, filters, ranked search and view resolvers
//! - **auth**: JWT tokens, Argon2 password hashing, permission levels
//! - **routes**: JSON HTTP handlers, one module per resource
//! - **server**: hyper accept loop and path router

pub mod auth;
pub mod config;
pub mod db;
pub mod routes;
pub mod server;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{Result, StudyhallError};
