//! Traits shared across all linglear crates.
//!
//! Every collaborator the session core talks to (durable storage, the hidden
//! re-authentication context, navigation, the identity display) is defined
//! here so that higher layers depend only on `linglear-types`.

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

/// A synchronous string key-value store (the `localStorage` role).
///
/// Backends report failures; callers that must never fail wrap them (see
/// `linglear_store::TokenStore`).
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>>;
    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Remove `key`; removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// A structured message received from another browsing context.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMessage {
    /// Origin of the sender, e.g. `https://linglear.com`.
    pub origin: String,
    /// The message payload.
    pub data: Value,
}

impl ChannelMessage {
    pub fn new(origin: impl Into<String>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            data,
        }
    }
}

/// A hidden, isolated browsing context opened for silent re-authentication.
pub trait HiddenContext: Send {
    /// Tear the context down. Must be idempotent.
    fn close(&mut self);
}

/// An open silent re-authentication channel.
///
/// Dropping the handle detaches the message listener and closes the hidden
/// context, whatever the outcome of the attempt was.
pub struct ChannelHandle {
    messages: mpsc::UnboundedReceiver<ChannelMessage>,
    context: Box<dyn HiddenContext>,
}

impl ChannelHandle {
    pub fn new(
        messages: mpsc::UnboundedReceiver<ChannelMessage>,
        context: Box<dyn HiddenContext>,
    ) -> Self {
        Self { messages, context }
    }

    /// Wait for the next message; `None` once the sender side is gone.
    pub async fn recv(&mut self) -> Option<ChannelMessage> {
        self.messages.recv().await
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.messages.close();
        self.context.close();
    }
}

/// Opens hidden contexts pointed at the identity provider.
#[async_trait]
pub trait SilentTransport: Send + Sync {
    /// Open a hidden context at `url` and start listening for messages.
    async fn open(&self, url: &str) -> Result<ChannelHandle>;
}

/// Moves the user agent between pages.
pub trait Navigator: Send + Sync {
    /// Navigate away to `url` (login page, provider logout, ...).
    fn navigate(&self, url: &str);
    /// Rewrite the current history entry without navigating.
    fn replace_url(&self, url: &str);
}

/// Reflects the session in the user interface.
pub trait SessionView: Send + Sync {
    /// Show the signed-in state with the given display identity.
    fn show_logged_in(&self, identity: &str);
    /// Show the signed-out state, with an optional notice such as
    /// "Session expired".
    fn show_logged_out(&self, notice: Option<&str>);
}
