//! Token representations: kinds, pairs and decoded claims.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Which credential a stored token is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Short-lived bearer credential for API calls.
    Access,
    /// Credential carrying identity claims (email, username).
    Identity,
}

impl TokenKind {
    /// The well-known durable storage key for this kind.
    #[must_use]
    pub fn storage_key(self) -> &'static str {
        match self {
            Self::Access => "linglear_access_token",
            Self::Identity => "linglear_id_token",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Access => write!(f, "access"),
            Self::Identity => write!(f, "identity"),
        }
    }
}

/// The credentials issued together by one login or silent refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl TokenPair {
    /// Build a pair, treating empty strings as absent.
    pub fn new(access_token: Option<String>, id_token: Option<String>) -> Self {
        Self {
            access_token: access_token.filter(|t| !t.is_empty()),
            id_token: id_token.filter(|t| !t.is_empty()),
        }
    }

    /// Returns `true` if neither token is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.id_token.is_none()
    }

    /// The token to present as `Authorization: Bearer`.
    ///
    /// The access token is canonical; the identity token is only a fallback
    /// for backends that accept either.
    #[must_use]
    pub fn bearer(&self) -> Option<&str> {
        self.access_token.as_deref().or(self.id_token.as_deref())
    }

    pub fn get(&self, kind: TokenKind) -> Option<&str> {
        match kind {
            TokenKind::Access => self.access_token.as_deref(),
            TokenKind::Identity => self.id_token.as_deref(),
        }
    }
}

/// Claims decoded from the payload segment of a compact token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    #[must_use]
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Absolute expiry in seconds since the epoch, if present and numeric.
    ///
    /// Fractional values are truncated; anything non-numeric is ignored.
    #[must_use]
    pub fn exp(&self) -> Option<i64> {
        match self.0.get("exp")? {
            Value::Number(n) => n.as_i64().or_else(|| {
                #[allow(clippy::cast_possible_truncation)]
                n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)
            }),
            _ => None,
        }
    }

    fn str_claim(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// The name shown for the signed-in user.
    ///
    /// Prefers `email`, then the Cognito username, then a generic `username`,
    /// else an empty string.
    #[must_use]
    pub fn display_identity(&self) -> String {
        self.str_claim("email")
            .or_else(|| self.str_claim("cognito:username"))
            .or_else(|| self.str_claim("username"))
            .unwrap_or_default()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(v: Value) -> Claims {
        match v {
            Value::Object(map) => Claims::new(map),
            _ => panic!("claims must be an object"),
        }
    }

    #[test]
    fn test_storage_keys() {
        assert_eq!(TokenKind::Access.storage_key(), "linglear_access_token");
        assert_eq!(TokenKind::Identity.storage_key(), "linglear_id_token");
    }

    #[test]
    fn test_pair_filters_empty() {
        let pair = TokenPair::new(Some(String::new()), Some("id".into()));
        assert_eq!(pair.access_token, None);
        assert_eq!(pair.id_token.as_deref(), Some("id"));
        assert!(!pair.is_empty());
        assert!(TokenPair::new(None, Some(String::new())).is_empty());
    }

    #[test]
    fn test_bearer_prefers_access() {
        let both = TokenPair::new(Some("at".into()), Some("id".into()));
        assert_eq!(both.bearer(), Some("at"));
        let id_only = TokenPair::new(None, Some("id".into()));
        assert_eq!(id_only.bearer(), Some("id"));
        assert_eq!(TokenPair::default().bearer(), None);
    }

    #[test]
    fn test_exp_integer_and_float() {
        assert_eq!(claims(json!({"exp": 1_700_000_000})).exp(), Some(1_700_000_000));
        assert_eq!(claims(json!({"exp": 1_700_000_000.7})).exp(), Some(1_700_000_000));
    }

    #[test]
    fn test_exp_missing_or_wrong_type() {
        assert_eq!(claims(json!({})).exp(), None);
        assert_eq!(claims(json!({"exp": "1700000000"})).exp(), None);
        assert_eq!(claims(json!({"exp": null})).exp(), None);
    }

    #[test]
    fn test_display_identity_precedence() {
        let c = claims(json!({
            "email": "a@example.com",
            "cognito:username": "cog",
            "username": "plain"
        }));
        assert_eq!(c.display_identity(), "a@example.com");

        let c = claims(json!({"cognito:username": "cog", "username": "plain"}));
        assert_eq!(c.display_identity(), "cog");

        let c = claims(json!({"email": "", "username": "plain"}));
        assert_eq!(c.display_identity(), "plain");

        assert_eq!(claims(json!({"sub": "x"})).display_identity(), "");
    }
}
