//! Parsing the URL fragment the identity provider redirects back with.
//!
//! The implicit flow returns `access_token`, `id_token` (or `error` and
//! `error_description`) plus the echoed `state` in the fragment, so they
//! never reach a server log.

use linglear_types::{RefreshError, TokenPair};
use serde::Deserialize;

/// Parameters the provider may put in the redirect fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FragmentParams {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.is_empty())
}

impl FragmentParams {
    /// Parse a fragment (with or without the leading `#`).
    ///
    /// Returns `None` for an empty or undecodable fragment.
    #[must_use]
    pub fn parse(fragment: &str) -> Option<Self> {
        let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
        if fragment.is_empty() {
            return None;
        }
        let raw: Self = serde_urlencoded::from_str(fragment).ok()?;
        Some(Self {
            access_token: non_empty(raw.access_token),
            id_token: non_empty(raw.id_token),
            error: non_empty(raw.error),
            error_description: non_empty(raw.error_description),
            state: non_empty(raw.state),
        })
    }

    /// Parse the fragment of a full URL.
    #[must_use]
    pub fn from_url(url: &str) -> Option<Self> {
        Self::parse(url.split_once('#')?.1)
    }

    #[must_use]
    pub fn has_tokens(&self) -> bool {
        self.access_token.is_some() || self.id_token.is_some()
    }

    /// `true` if the fragment carries anything the session cares about.
    #[must_use]
    pub fn is_relevant(&self) -> bool {
        self.has_tokens() || self.error.is_some()
    }

    #[must_use]
    pub fn tokens(&self) -> TokenPair {
        TokenPair::new(self.access_token.clone(), self.id_token.clone())
    }

    /// The provider error, if the redirect reported one.
    #[must_use]
    pub fn provider_error(&self) -> Option<RefreshError> {
        self.error.as_ref().map(|code| RefreshError::Provider {
            code: code.clone(),
            description: self.error_description.clone(),
        })
    }
}

/// `url` without its fragment, suitable for rewriting the history entry.
#[must_use]
pub fn strip_fragment(url: &str) -> &str {
    url.split_once('#').map_or(url, |(base, _)| base)
}
