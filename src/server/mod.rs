//! HTTP server for Studyhall
//!
//! Uses hyper with one spawned task per connection. Request bodies are
//! collected (with a size cap) before routing so handlers work on plain
//! `Request<Bytes>`.

pub mod http;

pub use http::{route, run, AppState};
