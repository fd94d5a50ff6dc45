use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

fn default_domain() -> String {
    "https://linglear-auth-1.auth.us-east-1.amazoncognito.com".to_string()
}
fn default_client_id() -> String {
    "6lsk8r1jbfs2g0619pb6a01t9q".to_string()
}
fn default_redirect_uri() -> String {
    "https://linglear.com/".to_string()
}
fn default_silent_redirect_uri() -> String {
    "https://linglear.com/silent-refresh.html".to_string()
}
fn default_app_origin() -> String {
    "https://linglear.com".to_string()
}
fn default_scopes() -> Vec<String> {
    vec!["openid".to_string(), "email".to_string()]
}

/// Hosted identity provider (Cognito hosted UI) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Hosted UI domain, without a trailing slash.
    #[serde(default = "default_domain")]
    pub domain: String,
    /// App client ID registered with the user pool.
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Callback URL for interactive login. Must be registered on the client.
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    /// Callback URL of the silent refresh completion page.
    #[serde(default = "default_silent_redirect_uri")]
    pub silent_redirect_uri: String,
    /// Where the provider sends the user after logout (defaults to
    /// `redirect_uri`).
    #[serde(default)]
    pub logout_uri: Option<String>,
    /// Requested scopes.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// Origin that silent refresh messages must come from.
    #[serde(default = "default_app_origin")]
    pub app_origin: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            client_id: default_client_id(),
            redirect_uri: default_redirect_uri(),
            silent_redirect_uri: default_silent_redirect_uri(),
            logout_uri: None,
            scopes: default_scopes(),
            app_origin: default_app_origin(),
        }
    }
}

impl IdentityConfig {
    /// The effective post-logout URI.
    #[must_use]
    pub fn logout_uri(&self) -> &str {
        self.logout_uri.as_deref().unwrap_or(&self.redirect_uri)
    }
}

fn default_lead_secs() -> u64 {
    60
}
fn default_min_delay_secs() -> u64 {
    5
}
fn default_skew_secs() -> u64 {
    60
}
fn default_silent_timeout_secs() -> u64 {
    10
}

/// Token renewal timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// How long before expiry the proactive refresh fires.
    #[serde(default = "default_lead_secs")]
    pub lead_secs: u64,
    /// Floor for the proactive refresh delay.
    #[serde(default = "default_min_delay_secs")]
    pub min_delay_secs: u64,
    /// Remaining lifetime at or below which a token counts as expired.
    #[serde(default = "default_skew_secs")]
    pub skew_secs: u64,
    /// Hard timeout for one silent re-authentication attempt.
    #[serde(default = "default_silent_timeout_secs")]
    pub silent_timeout_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            lead_secs: default_lead_secs(),
            min_delay_secs: default_min_delay_secs(),
            skew_secs: default_skew_secs(),
            silent_timeout_secs: default_silent_timeout_secs(),
        }
    }
}

impl RefreshConfig {
    #[must_use]
    pub fn lead(&self) -> Duration {
        Duration::from_secs(self.lead_secs)
    }

    #[must_use]
    pub fn min_delay(&self) -> Duration {
        Duration::from_secs(self.min_delay_secs)
    }

    #[must_use]
    pub fn silent_timeout(&self) -> Duration {
        Duration::from_secs(self.silent_timeout_secs)
    }
}

fn default_base_url() -> String {
    "https://api.linglear.com".to_string()
}
fn default_api_skew_secs() -> u64 {
    30
}

/// Downstream API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Default backend base URL (a stored override wins).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Skew applied before sending a request with a token.
    #[serde(default = "default_api_skew_secs")]
    pub expiry_skew_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            expiry_skew_secs: default_api_skew_secs(),
        }
    }
}

/// Durable storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON store file (default: `~/.linglear/store.json`).
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_loopback_port() -> u16 {
    53682
}

/// Local listener used by the CLI in place of the completion page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopbackConfig {
    #[serde(default = "default_loopback_port")]
    pub port: u16,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            port: default_loopback_port(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub loopback: LoopbackConfig,
}

/// Prefix for environment overrides, e.g. `LINGLEAR_IDENTITY__CLIENT_ID`.
pub const ENV_PREFIX: &str = "LINGLEAR_";

impl Config {
    /// Parses configuration from a YAML string, merged with defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the YAML is invalid or extraction fails.
    #[allow(clippy::result_large_err)]
    pub fn from_yaml(yaml: &str) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Format as _, Serialized, Yaml},
        };
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::string(yaml))
            .extract()
    }

    /// Loads configuration from a file path, merged with defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the file cannot be read or parsed.
    #[allow(clippy::result_large_err)]
    pub fn from_file(path: &std::path::Path) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Format as _, Serialized, Yaml},
        };
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .extract()
    }

    /// Loads defaults, then the optional YAML file, then `LINGLEAR_*`
    /// environment variables (`__` separates nested keys).
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the file or an environment value
    /// cannot be parsed.
    #[allow(clippy::result_large_err)]
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Env, Format as _, Serialized, Yaml},
        };
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }
}
