//! The token store: credential access over a [`KeyValueStore`] that never
//! fails.
//!
//! Backend errors are logged and degrade to "absent" (reads) or no-ops
//! (writes). Nothing is cached; every read goes to the backend so that a
//! logout through one handle is visible through every other.

use crate::memory::InMemoryStore;
use linglear_types::{KeyValueStore, TokenKind, TokenPair};
use std::sync::Arc;

/// Durable key for the derived display identity.
pub const EMAIL_KEY: &str = "ling_auth_email";

/// Legacy mirror of the identity token kept for older pages.
pub const LEGACY_ID_TOKEN_KEY: &str = "ling_auth_id_token";

/// Transient key recording where to return after a forced re-login.
pub const REDIRECT_HINT_KEY: &str = "post_login_redirect";

/// Every credential key any version of the dashboard has written.
pub const CREDENTIAL_KEYS: &[&str] = &[
    "linglear_access_token",
    "linglear_id_token",
    "linglear_refresh_token",
    "linglear_tokens",
    "linglear_token",
    "linglear_email",
    "ling_auth_id_token",
    "ling_auth_access_token",
    "ling_auth_refresh_token",
    "ling_auth_email",
];

/// Token persistence shared by every session component.
#[derive(Clone)]
pub struct TokenStore {
    durable: Arc<dyn KeyValueStore>,
    transient: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    /// Wraps a durable backend; transient entries live in memory.
    pub fn new(durable: Arc<dyn KeyValueStore>) -> Self {
        Self {
            durable,
            transient: Arc::new(InMemoryStore::new()),
        }
    }

    /// Replace the transient backend (the `sessionStorage` role).
    #[must_use]
    pub fn with_transient(mut self, transient: Arc<dyn KeyValueStore>) -> Self {
        self.transient = transient;
        self
    }

    /// An in-memory store for tests and one-off sessions.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    fn read(backend: &dyn KeyValueStore, key: &str) -> Option<String> {
        match backend.get(key) {
            Ok(v) => v.filter(|s| !s.is_empty()),
            Err(e) => {
                tracing::warn!(key, error = %e, "storage read failed, treating as absent");
                None
            }
        }
    }

    fn write(backend: &dyn KeyValueStore, key: &str, value: &str) {
        if let Err(e) = backend.set(key, value) {
            tracing::warn!(key, error = %e, "storage write failed, ignoring");
        }
    }

    fn delete(backend: &dyn KeyValueStore, key: &str) {
        if let Err(e) = backend.remove(key) {
            tracing::warn!(key, error = %e, "storage remove failed, ignoring");
        }
    }

    /// The stored token of the given kind.
    #[must_use]
    pub fn get(&self, kind: TokenKind) -> Option<String> {
        Self::read(self.durable.as_ref(), kind.storage_key())
    }

    pub fn set(&self, kind: TokenKind, token: &str) {
        Self::write(self.durable.as_ref(), kind.storage_key(), token);
        if kind == TokenKind::Identity {
            Self::write(self.durable.as_ref(), LEGACY_ID_TOKEN_KEY, token);
        }
    }

    pub fn clear(&self, kind: TokenKind) {
        Self::delete(self.durable.as_ref(), kind.storage_key());
        if kind == TokenKind::Identity {
            Self::delete(self.durable.as_ref(), LEGACY_ID_TOKEN_KEY);
        }
    }

    /// Remove every credential key, current and legacy.
    pub fn clear_all(&self) {
        for key in CREDENTIAL_KEYS {
            Self::delete(self.durable.as_ref(), key);
        }
    }

    /// Both tokens as currently stored.
    #[must_use]
    pub fn tokens(&self) -> TokenPair {
        TokenPair::new(self.get(TokenKind::Access), self.get(TokenKind::Identity))
    }

    /// Persist whichever tokens the pair carries; absent ones are left as is.
    pub fn save(&self, pair: &TokenPair) {
        if let Some(at) = &pair.access_token {
            self.set(TokenKind::Access, at);
        }
        if let Some(id) = &pair.id_token {
            self.set(TokenKind::Identity, id);
        }
    }

    #[must_use]
    pub fn email(&self) -> Option<String> {
        Self::read(self.durable.as_ref(), EMAIL_KEY)
    }

    pub fn set_email(&self, email: &str) {
        if email.is_empty() {
            Self::delete(self.durable.as_ref(), EMAIL_KEY);
        } else {
            Self::write(self.durable.as_ref(), EMAIL_KEY, email);
        }
    }

    /// A non-credential durable setting (e.g. the backend override).
    #[must_use]
    pub fn preference(&self, key: &str) -> Option<String> {
        Self::read(self.durable.as_ref(), key)
    }

    pub fn set_preference(&self, key: &str, value: &str) {
        Self::write(self.durable.as_ref(), key, value);
    }

    pub fn clear_preference(&self, key: &str) {
        Self::delete(self.durable.as_ref(), key);
    }

    /// Remember where to send the user back after logging in again.
    pub fn set_redirect_hint(&self, url: &str) {
        Self::write(self.transient.as_ref(), REDIRECT_HINT_KEY, url);
    }

    /// Consume the redirect hint, if one was recorded.
    #[must_use]
    pub fn take_redirect_hint(&self) -> Option<String> {
        let hint = Self::read(self.transient.as_ref(), REDIRECT_HINT_KEY)?;
        Self::delete(self.transient.as_ref(), REDIRECT_HINT_KEY);
        Some(hint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linglear_types::{LinglearError, Result};

    /// A backend that fails every operation, like disabled browser storage.
    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(LinglearError::Storage("storage disabled".into()))
        }
        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(LinglearError::Storage("quota exceeded".into()))
        }
        fn remove(&self, _key: &str) -> Result<()> {
            Err(LinglearError::Storage("storage disabled".into()))
        }
    }

    #[test]
    fn test_set_get_clear() {
        let store = TokenStore::in_memory();
        store.set(TokenKind::Access, "at");
        store.set(TokenKind::Identity, "id");
        assert_eq!(store.get(TokenKind::Access).as_deref(), Some("at"));
        assert_eq!(store.get(TokenKind::Identity).as_deref(), Some("id"));
        assert_eq!(store.preference(LEGACY_ID_TOKEN_KEY).as_deref(), Some("id"));

        store.clear(TokenKind::Identity);
        assert!(store.get(TokenKind::Identity).is_none());
        assert!(store.preference(LEGACY_ID_TOKEN_KEY).is_none());
        assert_eq!(store.get(TokenKind::Access).as_deref(), Some("at"));
    }

    #[test]
    fn test_empty_value_is_absent() {
        let backend = Arc::new(InMemoryStore::new());
        backend.set("linglear_access_token", "").unwrap();
        let store = TokenStore::new(backend);
        assert!(store.get(TokenKind::Access).is_none());
    }

    #[test]
    fn test_clear_all_removes_every_credential_key() {
        let backend = Arc::new(InMemoryStore::new());
        for key in CREDENTIAL_KEYS {
            backend.set(key, "x").unwrap();
        }
        backend.set("linglear_backend_base", "https://api.example.com").unwrap();
        let store = TokenStore::new(backend.clone());
        store.clear_all();
        for key in CREDENTIAL_KEYS {
            assert!(backend.get(key).unwrap().is_none(), "{key} survived");
        }
        assert!(backend.get("linglear_backend_base").unwrap().is_some());
    }

    #[test]
    fn test_save_pair_keeps_missing_side() {
        let store = TokenStore::in_memory();
        store.set(TokenKind::Identity, "old-id");
        store.save(&TokenPair::new(Some("new-at".into()), None));
        let pair = store.tokens();
        assert_eq!(pair.access_token.as_deref(), Some("new-at"));
        assert_eq!(pair.id_token.as_deref(), Some("old-id"));
    }

    #[test]
    fn test_handles_share_state() {
        let a = TokenStore::in_memory();
        let b = a.clone();
        a.set(TokenKind::Access, "at");
        b.clear_all();
        assert!(a.get(TokenKind::Access).is_none());
    }

    #[test]
    fn test_email() {
        let store = TokenStore::in_memory();
        store.set_email("a@example.com");
        assert_eq!(store.email().as_deref(), Some("a@example.com"));
        store.set_email("");
        assert!(store.email().is_none());
    }

    #[test]
    fn test_redirect_hint_is_consumed() {
        let store = TokenStore::in_memory();
        assert!(store.take_redirect_hint().is_none());
        store.set_redirect_hint("https://linglear.com/dashboard.html#votes");
        assert_eq!(
            store.take_redirect_hint().as_deref(),
            Some("https://linglear.com/dashboard.html#votes")
        );
        assert!(store.take_redirect_hint().is_none());
    }

    #[test]
    fn test_redirect_hint_is_transient() {
        let durable = Arc::new(InMemoryStore::new());
        let store = TokenStore::new(durable.clone());
        store.set_redirect_hint("/x");
        assert!(durable.is_empty());
    }

    #[test]
    fn test_broken_backend_degrades() {
        let store = TokenStore::new(Arc::new(BrokenStore)).with_transient(Arc::new(BrokenStore));
        store.set(TokenKind::Access, "at");
        assert!(store.get(TokenKind::Access).is_none());
        assert!(store.tokens().is_empty());
        store.clear_all();
        store.set_email("a@example.com");
        assert!(store.email().is_none());
        store.set_redirect_hint("/x");
        assert!(store.take_redirect_hint().is_none());
    }
}
