//! The authenticated backend client.

use crate::backend::{BACKEND_KEY, build_url, normalize_base};
use linglear_auth::{ExpiryPolicy, RefreshScheduler, SESSION_EXPIRED_NOTICE};
use linglear_config::ApiConfig;
use linglear_store::{LEGACY_ID_TOKEN_KEY, TokenStore};
use linglear_types::{LinglearError, Result};
use regex::Regex;
use rquest::{Client, Method, Response};
use serde_json::{Value, json};

/// Backend rejection messages that mean the bearer token has expired.
const EXPIRED_PATTERN: &str = r"(?i)token expired|jwt expired|expired";

/// Single-token key written by early dashboard versions.
const LEGACY_TOKEN_KEY: &str = "linglear_token";

/// JSON bundle `{access_token, id_token}` written by some login flows.
const PACKED_TOKENS_KEY: &str = "linglear_tokens";

/// JSON client for the Linglear backend.
pub struct ApiClient {
    http: Client,
    scheduler: RefreshScheduler,
    default_base: String,
    skew: i64,
    expired: Regex,
    return_to: Option<String>,
}

impl ApiClient {
    /// # Errors
    ///
    /// Returns [`LinglearError::Config`] if the configured base URL is not an
    /// HTTP(S) URL.
    pub fn new(http: Client, scheduler: RefreshScheduler, config: &ApiConfig) -> Result<Self> {
        let default_base = normalize_base(&config.base_url).ok_or_else(|| {
            LinglearError::Config(format!("invalid api.base_url '{}'", config.base_url))
        })?;
        let expired =
            Regex::new(EXPIRED_PATTERN).map_err(|e| LinglearError::Config(e.to_string()))?;
        Ok(Self {
            http,
            scheduler,
            default_base,
            skew: i64::try_from(config.expiry_skew_secs).unwrap_or(i64::MAX),
            expired,
            return_to: None,
        })
    }

    /// Page to come back to after a forced re-login.
    #[must_use]
    pub fn with_return_to(mut self, url: impl Into<String>) -> Self {
        self.return_to = Some(url.into());
        self
    }

    fn store(&self) -> &TokenStore {
        self.scheduler.store()
    }

    /// The backend base URL in effect: a stored override, else the default.
    #[must_use]
    pub fn backend(&self) -> String {
        self.store()
            .preference(BACKEND_KEY)
            .and_then(|saved| normalize_base(&saved))
            .unwrap_or_else(|| self.default_base.clone())
    }

    /// Override the backend base URL. An empty or invalid value removes the
    /// override. Returns the base URL now in effect.
    pub fn set_backend(&self, base: &str) -> String {
        match normalize_base(base) {
            Some(normalized) => {
                self.store().set_preference(BACKEND_KEY, &normalized);
                normalized
            }
            None => {
                self.store().clear_preference(BACKEND_KEY);
                self.default_base.clone()
            }
        }
    }

    /// The token to authorize with: access token first, then the identity
    /// token, then whatever older dashboard versions left behind.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        let store = self.store();
        if let Some(token) = store.tokens().bearer() {
            return Some(token.to_string());
        }
        for key in [LEGACY_ID_TOKEN_KEY, LEGACY_TOKEN_KEY] {
            if let Some(token) = store.preference(key) {
                return Some(token);
            }
        }
        let packed: Value = serde_json::from_str(&store.preference(PACKED_TOKENS_KEY)?).ok()?;
        ["access_token", "id_token"]
            .into_iter()
            .find_map(|k| packed.get(k).and_then(Value::as_str).filter(|s| !s.is_empty()))
            .map(str::to_string)
    }

    /// A token that is safe to send now, refreshed first if it is about to
    /// expire.
    async fn bearer(&self) -> Result<Option<String>> {
        let Some(token) = self.token() else {
            return Ok(None);
        };
        if !ExpiryPolicy::is_expired_or_near(&token, self.skew) {
            return Ok(Some(token));
        }
        tracing::debug!("token expires within skew, refreshing before request");
        match self.scheduler.ensure_fresh_tokens().await {
            Ok(pair) => Ok(pair.bearer().map(str::to_string)),
            Err(_) => Err(self.session_expired()),
        }
    }

    /// Record where to return and report the session as over. The local
    /// logout has already happened.
    fn session_expired(&self) -> LinglearError {
        if let Some(url) = &self.return_to {
            self.store().set_redirect_hint(url);
        }
        LinglearError::SessionExpired
    }

    fn force_relogin(&self) -> LinglearError {
        self.scheduler.force_logout(Some(SESSION_EXPIRED_NOTICE));
        self.session_expired()
    }

    fn is_expired_rejection(&self, err: &LinglearError) -> bool {
        matches!(err, LinglearError::Upstream { status: 401, body } if self.expired.is_match(body))
    }

    /// Send a JSON request and return the decoded response body.
    ///
    /// # Errors
    ///
    /// [`LinglearError::SessionExpired`] when the session could not be kept
    /// alive, [`LinglearError::Upstream`] for any other non-2xx status, or a
    /// transport error.
    pub async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = build_url(&self.backend(), path);
        let token = self.bearer().await?;
        let first = self.send(&method, &url, body, token.as_deref()).await;
        if !first.as_ref().is_err_and(|e| self.is_expired_rejection(e)) {
            return first;
        }

        tracing::info!(%url, "backend rejected an expired token, refreshing once");
        let pair = match self.scheduler.refresh().await {
            Ok(pair) => pair,
            Err(_) => return Err(self.session_expired()),
        };
        let retry = self.send(&method, &url, body, pair.bearer()).await;
        match retry {
            Err(ref e) if self.is_expired_rejection(e) => {
                tracing::warn!("token rejected again after refresh");
                Err(self.force_relogin())
            }
            other => other,
        }
    }

    async fn send(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<Value> {
        let mut req = self
            .http
            .request(method.clone(), url)
            .header("Content-Type", "application/json");
        if let Some(token) = token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        if let Some(body) = body {
            req = req.body(body.to_string());
        }
        read_response(req.send().await?).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn get(&self, path: &str) -> Result<Value> {
        self.request(Method::GET, path, None).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::POST, path, Some(body)).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn put(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::PUT, path, Some(body)).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.request(Method::DELETE, path, None).await
    }
}

async fn read_response(resp: Response) -> Result<Value> {
    let status = resp.status();
    let text = resp.text().await?;
    let data = parse_body(&text);
    if status.is_success() {
        Ok(data)
    } else {
        Err(LinglearError::Upstream {
            status: status.as_u16(),
            body: error_message(&data).unwrap_or_else(|| format!("HTTP {status}")),
        })
    }
}

/// JSON body, `{"raw": text}` if it is not JSON, `null` if empty.
fn parse_body(text: &str) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| json!({ "raw": text }))
}

/// The backend's own error text: `error`, else `message`.
fn error_message(data: &Value) -> Option<String> {
    ["error", "message"]
        .into_iter()
        .filter_map(|k| data.get(k))
        .find(|v| !v.is_null() && v.as_str() != Some(""))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
}
