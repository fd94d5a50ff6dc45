//! Storage for the linglear session core.
//!
//! Provides key-value backends (in-memory for tests and transient state,
//! JSON file for durable state) and the [`TokenStore`] that every session
//! component reads credentials through.

pub mod file;
pub mod memory;
pub mod tokens;

pub use file::JsonFileStore;
pub use memory::InMemoryStore;
pub use tokens::{
    CREDENTIAL_KEYS, EMAIL_KEY, LEGACY_ID_TOKEN_KEY, REDIRECT_HINT_KEY, TokenStore,
};
