//! Authenticated access to the Linglear backend.
//!
//! [`ApiClient`] attaches the session's bearer token, refreshes it before it
//! expires and recovers once from a backend "token expired" rejection before
//! giving up on the session.

pub mod backend;
pub mod client;

pub use backend::{BACKEND_KEY, normalize_base};
pub use client::ApiClient;
