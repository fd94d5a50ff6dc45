//! Core types and traits for the linglear workspace.
//!
//! This crate defines the shared abstractions used across all layers of the
//! session core, including error types, token representations, and the
//! traits each collaborator implements.

pub mod error;
pub mod token;
pub mod traits;

pub use error::{LinglearError, RefreshError, Result};
pub use token::{Claims, TokenKind, TokenPair};
pub use traits::{
    ChannelHandle, ChannelMessage, HiddenContext, KeyValueStore, Navigator, SessionView,
    SilentTransport,
};
