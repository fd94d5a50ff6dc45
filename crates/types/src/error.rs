//! Unified error types for the linglear workspace.

use thiserror::Error;

/// Why a silent re-authentication attempt did not produce tokens.
///
/// Cloneable so every waiter on a shared attempt observes the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// The identity provider answered with an OAuth error (no session,
    /// consent required, ...).
    #[error("identity provider error: {code}{}", detail(.description))]
    Provider {
        code: String,
        description: Option<String>,
    },

    /// No answer arrived within the silent refresh window.
    #[error("silent refresh timed out")]
    Timeout,

    /// The answer carried neither an access token nor an identity token.
    #[error("silent refresh returned no tokens")]
    EmptyResult,

    /// The hidden context could not be opened.
    #[error("silent refresh transport error: {0}")]
    Transport(String),

    /// The hidden context went away before answering.
    #[error("silent refresh channel closed")]
    ChannelClosed,

    /// The session ended or was replaced while the attempt was running; its
    /// result was discarded.
    #[error("silent refresh cancelled, the session changed")]
    Cancelled,
}

fn detail(description: &Option<String>) -> String {
    description
        .as_deref()
        .map(|d| format!(" ({d})"))
        .unwrap_or_default()
}

/// Enumerates all error kinds that can occur across linglear crates.
#[derive(Debug, Error)]
pub enum LinglearError {
    /// Interactive authentication failure.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Silent re-authentication failed; the local session has been dropped.
    #[error(transparent)]
    Refresh(#[from] RefreshError),

    /// The session expired and the user must log in again.
    #[error("session expired, please log in again")]
    SessionExpired,

    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(String),

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Key-value storage backend error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration loading or validation error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The API returned a non-success status.
    #[error("upstream error: status={status}, body={body}")]
    Upstream { status: u16, body: String },
}

// ── Feature-gated From impls ──────────────────────────────────────────────────

#[cfg(feature = "rquest")]
impl From<rquest::Error> for LinglearError {
    fn from(e: rquest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl From<std::io::Error> for LinglearError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl LinglearError {
    /// Returns `true` if the caller has to re-authenticate interactively.
    #[must_use]
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::SessionExpired | Self::Refresh(_))
            || matches!(self, Self::Upstream { status: 401, .. })
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, LinglearError>;
