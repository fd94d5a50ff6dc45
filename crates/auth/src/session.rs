//! The session controller.
//!
//! Owns the session lifecycle: picking tokens up from a login redirect,
//! restoring a stored session, interactive login and logout.

use crate::{
    channel::SilentChannel,
    endpoints::Endpoints,
    fragment::{FragmentParams, strip_fragment},
    jwt::{identity_of, is_well_formed},
    scheduler::{RefreshScheduler, RefreshSettings},
};
use linglear_config::RefreshConfig;
use linglear_store::TokenStore;
use linglear_types::{
    Navigator, RefreshError, SessionView, SilentTransport, TokenKind, TokenPair,
};
use std::sync::Arc;

/// Where the session stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    LoggedIn { identity: String },
    /// A silent refresh is outstanding.
    Refreshing,
}

pub struct SessionController {
    scheduler: RefreshScheduler,
    endpoints: Arc<Endpoints>,
    navigator: Arc<dyn Navigator>,
    view: Arc<dyn SessionView>,
}

impl SessionController {
    pub fn new(
        endpoints: Arc<Endpoints>,
        store: TokenStore,
        transport: Arc<dyn SilentTransport>,
        navigator: Arc<dyn Navigator>,
        view: Arc<dyn SessionView>,
        config: &RefreshConfig,
    ) -> Self {
        let channel = SilentChannel::new(transport, Arc::clone(&endpoints))
            .with_timeout(config.silent_timeout());
        let scheduler = RefreshScheduler::new(
            store,
            channel,
            Arc::clone(&view),
            RefreshSettings::from_config(config),
        );
        Self {
            scheduler,
            endpoints,
            navigator,
            view,
        }
    }

    #[must_use]
    pub fn store(&self) -> &TokenStore {
        self.scheduler.store()
    }

    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    #[must_use]
    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    /// Initialise the session for the page at `current_url`.
    ///
    /// Tokens in the URL fragment (a login redirect) win over stored ones. A
    /// stored session is shown immediately and then validated, refreshing it
    /// or logging out as needed.
    pub async fn start(&self, current_url: &str) -> SessionState {
        if let Some(params) = FragmentParams::from_url(current_url) {
            if params.has_tokens() {
                let identity = self.complete_login(&params.tokens());
                self.navigator.replace_url(strip_fragment(current_url));
                if let Some(hint) = self.store().take_redirect_hint() {
                    tracing::debug!(%hint, "returning to page recorded before re-login");
                    self.navigator.navigate(&hint);
                }
                return SessionState::LoggedIn { identity };
            }
            if let Some(error) = params.provider_error() {
                tracing::warn!(%error, "login redirect carried an error");
            }
        }

        let stored = self.store().tokens();
        let restorable = [stored.access_token.as_deref(), stored.id_token.as_deref()]
            .into_iter()
            .flatten()
            .any(is_well_formed);
        if !restorable {
            self.store().clear_all();
            self.view.show_logged_out(None);
            return SessionState::LoggedOut;
        }

        self.view.show_logged_in(&self.identity());
        match self.scheduler.ensure_fresh_tokens().await {
            Ok(_) => SessionState::LoggedIn {
                identity: self.identity(),
            },
            Err(_) => SessionState::LoggedOut,
        }
    }

    /// Replace whatever session existed with `pair` and start the refresh
    /// timer. Returns the display identity.
    pub fn complete_login(&self, pair: &TokenPair) -> String {
        let identity = self.scheduler.start_session(pair);
        tracing::info!(%identity, "logged in");
        identity
    }

    /// Send the user to the hosted login page.
    pub fn login(&self) {
        self.navigator.navigate(&self.endpoints.login_url());
    }

    /// End the session locally and at the identity provider.
    pub fn logout(&self) {
        self.scheduler.force_logout(None);
        tracing::info!("logged out");
        self.navigator.navigate(&self.endpoints.logout_url());
    }

    /// End the session locally only.
    pub fn force_logout(&self, notice: Option<&str>) {
        self.scheduler.force_logout(notice);
    }

    /// See [`RefreshScheduler::ensure_fresh_tokens`].
    ///
    /// # Errors
    ///
    /// Any refresh failure; the session is logged out when this errors.
    pub async fn ensure_fresh_tokens(&self) -> Result<TokenPair, RefreshError> {
        self.scheduler.ensure_fresh_tokens().await
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        if self.scheduler.channel().is_in_flight() {
            return SessionState::Refreshing;
        }
        let tokens = self.store().tokens();
        let any_valid = [tokens.access_token.as_deref(), tokens.id_token.as_deref()]
            .into_iter()
            .flatten()
            .any(is_well_formed);
        if any_valid {
            SessionState::LoggedIn {
                identity: self.identity(),
            }
        } else {
            SessionState::LoggedOut
        }
    }

    /// Display identity: from the identity token, else the stored email.
    #[must_use]
    pub fn identity(&self) -> String {
        self.store()
            .get(TokenKind::Identity)
            .map(|t| identity_of(&t))
            .filter(|s| !s.is_empty())
            .or_else(|| self.store().email())
            .unwrap_or_default()
    }

    /// Stop background work. Stored tokens are left alone.
    pub fn stop(&self) {
        self.scheduler.cancel();
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.stop();
    }
}
