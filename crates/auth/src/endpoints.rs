//! Hosted identity provider endpoints (Cognito hosted UI, implicit flow).
//!
//! Interactive login, silent (`prompt=none`) re-authentication and logout
//! URLs. Tokens come back in the URL fragment of the redirect URI.

use linglear_config::IdentityConfig;
use linglear_types::{LinglearError, Result};
use url::Url;

/// Path of the authorization endpoint under the hosted UI domain.
pub const AUTHORIZE_PATH: &str = "/oauth2/authorize";

/// Path of the logout endpoint under the hosted UI domain.
pub const LOGOUT_PATH: &str = "/logout";

/// The implicit grant: tokens are returned directly in the fragment.
pub const RESPONSE_TYPE: &str = "token";

/// Resolved identity provider URLs for one app client.
#[derive(Debug, Clone)]
pub struct Endpoints {
    authorize: Url,
    logout: Url,
    client_id: String,
    scope: String,
    redirect_uri: Url,
    silent_redirect_uri: Url,
    logout_uri: Url,
    app_origin: String,
}

fn parse(field: &str, value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| LinglearError::Config(format!("invalid {field} '{value}': {e}")))
}

/// `scheme://host[:port]` of `url`, as the browser reports message origins.
#[must_use]
pub fn origin_of(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    let origin = url.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

impl Endpoints {
    /// Resolve every endpoint from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LinglearError::Config`] if any configured URL is invalid.
    pub fn from_config(config: &IdentityConfig) -> Result<Self> {
        let domain = parse("identity.domain", config.domain.trim_end_matches('/'))?;
        let authorize = domain
            .join(AUTHORIZE_PATH)
            .map_err(|e| LinglearError::Config(e.to_string()))?;
        let logout = domain
            .join(LOGOUT_PATH)
            .map_err(|e| LinglearError::Config(e.to_string()))?;
        Ok(Self {
            authorize,
            logout,
            client_id: config.client_id.clone(),
            scope: config.scopes.join(" "),
            redirect_uri: parse("identity.redirect_uri", &config.redirect_uri)?,
            silent_redirect_uri: parse(
                "identity.silent_redirect_uri",
                &config.silent_redirect_uri,
            )?,
            logout_uri: parse("identity.logout_uri", config.logout_uri())?,
            app_origin: config.app_origin.trim_end_matches('/').to_string(),
        })
    }

    fn authorize_url(&self, redirect_uri: &Url, silent: bool, state: Option<&str>) -> String {
        let mut url = self.authorize.clone();
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("client_id", &self.client_id)
                .append_pair("response_type", RESPONSE_TYPE)
                .append_pair("scope", &self.scope)
                .append_pair("redirect_uri", redirect_uri.as_str());
            if silent {
                q.append_pair("prompt", "none");
            }
            if let Some(state) = state {
                q.append_pair("state", state);
            }
        }
        url.into()
    }

    /// Interactive hosted-UI login, returning to the redirect URI.
    #[must_use]
    pub fn login_url(&self) -> String {
        self.authorize_url(&self.redirect_uri, false, None)
    }

    /// Interactive login carrying a `state` value to check on return.
    #[must_use]
    pub fn login_url_with_state(&self, state: &str) -> String {
        self.authorize_url(&self.redirect_uri, false, Some(state))
    }

    /// Silent re-authentication: succeeds only with an existing provider
    /// session, otherwise the provider redirects back with an error.
    #[must_use]
    pub fn silent_url(&self, state: &str) -> String {
        self.authorize_url(&self.silent_redirect_uri, true, Some(state))
    }

    /// Provider logout, which redirects back to the logout URI.
    #[must_use]
    pub fn logout_url(&self) -> String {
        let mut url = self.logout.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("logout_uri", self.logout_uri.as_str());
        url.into()
    }

    /// Origin that relayed silent-refresh messages must carry.
    #[must_use]
    pub fn app_origin(&self) -> &str {
        &self.app_origin
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        self.redirect_uri.as_str()
    }

    #[must_use]
    pub fn silent_redirect_uri(&self) -> &str {
        self.silent_redirect_uri.as_str()
    }
}
