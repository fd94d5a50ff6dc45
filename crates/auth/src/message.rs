//! The silent-refresh relay message and its validation.
//!
//! The completion page posts one structured message to the context that
//! started the attempt. Only messages that pass [`MessageFilter`] (exact
//! origin, exact type tag, matching state) are acted upon; everything else
//! is dropped.

use crate::fragment::FragmentParams;
use linglear_types::{ChannelMessage, RefreshError, TokenPair};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type tag distinguishing relay messages from unrelated traffic.
pub const MESSAGE_TYPE: &str = "LINGLEAR_SILENT_TOKENS";

/// Payload relayed by the completion page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SilentTokensMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl SilentTokensMessage {
    /// Build the relay payload from the completion page's fragment.
    #[must_use]
    pub fn from_fragment(params: &FragmentParams) -> Self {
        Self {
            kind: MESSAGE_TYPE.to_string(),
            access_token: params.access_token.clone(),
            id_token: params.id_token.clone(),
            error: params.error.clone(),
            error_description: params.error_description.clone(),
            state: params.state.clone(),
        }
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    fn normalized(mut self) -> Self {
        for field in [
            &mut self.access_token,
            &mut self.id_token,
            &mut self.error,
            &mut self.error_description,
            &mut self.state,
        ] {
            if field.as_deref() == Some("") {
                *field = None;
            }
        }
        self
    }

    /// What this message means for the pending attempt.
    ///
    /// # Errors
    ///
    /// [`RefreshError::Provider`] when the provider reported an error,
    /// [`RefreshError::EmptyResult`] when neither token is present.
    pub fn outcome(self) -> Result<TokenPair, RefreshError> {
        if let Some(code) = self.error {
            return Err(RefreshError::Provider {
                code,
                description: self.error_description,
            });
        }
        let pair = TokenPair::new(self.access_token, self.id_token);
        if pair.is_empty() {
            Err(RefreshError::EmptyResult)
        } else {
            Ok(pair)
        }
    }
}

/// Why a received message was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    ForeignOrigin(String),
    WrongType,
    StateMismatch,
    Malformed,
}

/// Allow-list check applied to every received message.
#[derive(Debug, Clone)]
pub struct MessageFilter {
    origin: String,
    state: Option<String>,
}

impl MessageFilter {
    /// Accept only messages from exactly `origin`.
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            state: None,
        }
    }

    /// Additionally require that a message echoing a `state` echoes this one.
    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Validate `msg`, saying why it was rejected.
    ///
    /// # Errors
    ///
    /// Returns the first [`Rejection`] that applies.
    pub fn check(&self, msg: &ChannelMessage) -> Result<SilentTokensMessage, Rejection> {
        if msg.origin != self.origin {
            return Err(Rejection::ForeignOrigin(msg.origin.clone()));
        }
        if msg.data.get("type").and_then(Value::as_str) != Some(MESSAGE_TYPE) {
            return Err(Rejection::WrongType);
        }
        let parsed = serde_json::from_value::<SilentTokensMessage>(msg.data.clone())
            .map_err(|_| Rejection::Malformed)?
            .normalized();
        if let (Some(expected), Some(got)) = (&self.state, &parsed.state)
            && expected != got
        {
            return Err(Rejection::StateMismatch);
        }
        Ok(parsed)
    }

    /// Validate `msg`, logging and dropping anything that is not ours.
    #[must_use]
    pub fn accept(&self, msg: &ChannelMessage) -> Option<SilentTokensMessage> {
        match self.check(msg) {
            Ok(m) => Some(m),
            Err(reason) => {
                tracing::debug!(origin = %msg.origin, ?reason, "ignoring message");
                None
            }
        }
    }
}
