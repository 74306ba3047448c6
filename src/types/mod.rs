//! Shared types for Studyhall

mod error;

pub use error::{Result, StudyhallError};
