//! Proactive token refresh.
//!
//! [`RefreshScheduler::ensure_fresh_tokens`] is the single entry point used
//! by both the session controller and the API client. It keeps at most one
//! refresh timer pending, due a fixed lead before the access token expires.
//!
//! Every logout or login starts a new session epoch. A refresh only applies
//! its result, or ends the session on failure, if the epoch it started in is
//! still current.

use crate::{
    channel::SilentChannel,
    expiry::{ExpiryPolicy, now_secs},
    jwt::identity_of,
};
use linglear_config::RefreshConfig;
use linglear_store::TokenStore;
use linglear_types::{RefreshError, SessionView, TokenPair};
use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::task::JoinHandle;

/// Notice shown when a refresh failure ends the session.
pub const SESSION_EXPIRED_NOTICE: &str = "Session expired. Please log in again.";

/// Timing knobs of the scheduler.
#[derive(Debug, Clone, Copy)]
pub struct RefreshSettings {
    /// How long before expiry the timer fires.
    pub lead: Duration,
    /// Floor for the timer delay.
    pub min_delay: Duration,
    /// Remaining lifetime below which a token is refreshed before use.
    pub skew: Duration,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            lead: Duration::from_secs(60),
            min_delay: Duration::from_secs(5),
            skew: Duration::from_secs(60),
        }
    }
}

impl RefreshSettings {
    #[must_use]
    pub fn from_config(config: &RefreshConfig) -> Self {
        Self {
            lead: config.lead(),
            min_delay: config.min_delay(),
            skew: Duration::from_secs(config.skew_secs),
        }
    }
}

/// Delay until a refresh is due for a token with `remaining` seconds left.
///
/// `None` when the token is already expired.
#[must_use]
pub fn refresh_delay(remaining: i64, lead: Duration, min_delay: Duration) -> Option<Duration> {
    if remaining <= 0 {
        return None;
    }
    let lead = i64::try_from(lead.as_secs()).unwrap_or(i64::MAX);
    let due = u64::try_from(remaining.saturating_sub(lead)).unwrap_or(0);
    Some(Duration::from_secs(due).max(min_delay))
}

#[derive(Default)]
struct TimerSlot {
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

struct Inner {
    store: TokenStore,
    channel: SilentChannel,
    view: Arc<dyn SessionView>,
    policy: ExpiryPolicy,
    settings: RefreshSettings,
    epoch: AtomicU64,
    timer: Mutex<TimerSlot>,
}

impl Inner {
    fn timer(&self) -> MutexGuard<'_, TimerSlot> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn next_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Move past `epoch` if it is still current.
    fn advance_from(&self, epoch: u64) -> bool {
        self.epoch
            .compare_exchange(
                epoch,
                epoch.wrapping_add(1),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.timer().pending.take() {
            task.abort();
        }
    }
}

/// Keeps the stored tokens fresh. Cheap to clone.
#[derive(Clone)]
pub struct RefreshScheduler {
    inner: Arc<Inner>,
}

impl RefreshScheduler {
    pub fn new(
        store: TokenStore,
        channel: SilentChannel,
        view: Arc<dyn SessionView>,
        settings: RefreshSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                channel,
                view,
                policy: ExpiryPolicy::new(settings.skew),
                settings,
                epoch: AtomicU64::new(0),
                timer: Mutex::new(TimerSlot::default()),
            }),
        }
    }

    #[must_use]
    pub fn store(&self) -> &TokenStore {
        &self.inner.store
    }

    #[must_use]
    pub fn channel(&self) -> &SilentChannel {
        &self.inner.channel
    }

    #[must_use]
    pub fn policy(&self) -> ExpiryPolicy {
        self.inner.policy
    }

    /// Return usable tokens, refreshing silently if the stored access token
    /// is missing, malformed, expired or about to expire.
    ///
    /// # Errors
    ///
    /// Any refresh failure. The session has already been logged out locally
    /// when this returns an error.
    pub async fn ensure_fresh_tokens(&self) -> Result<TokenPair, RefreshError> {
        let stored = self.inner.store.tokens();
        if let Some(access) = stored.access_token.as_deref()
            && self.inner.policy.is_usable(access)
        {
            self.arm(access);
            return Ok(stored);
        }
        tracing::debug!("access token missing or near expiry, refreshing silently");
        self.refresh().await
    }

    /// Refresh silently regardless of what is stored, e.g. after the backend
    /// rejected a token that still looks valid locally.
    ///
    /// # Errors
    ///
    /// Any refresh failure; the session has been logged out locally.
    /// [`RefreshError::Cancelled`] if a logout or login happened while the
    /// attempt was running, in which case nothing was stored.
    pub async fn refresh(&self) -> Result<TokenPair, RefreshError> {
        let epoch = self.inner.epoch();
        let outcome = self
            .inner
            .channel
            .attempt()
            .await
            .and_then(|pair| match pair.access_token {
                Some(_) => Ok(pair),
                None => Err(RefreshError::EmptyResult),
            });
        match outcome {
            Ok(_) if self.inner.epoch() != epoch => {
                tracing::debug!("session changed during refresh, result discarded");
                Err(RefreshError::Cancelled)
            }
            Ok(pair) => {
                self.apply_tokens(&pair);
                if let Some(access) = pair.access_token.as_deref() {
                    self.arm(access);
                }
                Ok(self.inner.store.tokens())
            }
            Err(e) => {
                // waiters on one attempt share an epoch; only the first ends the session
                if self.inner.advance_from(epoch) {
                    tracing::warn!(error = %e, "token refresh failed, ending session");
                    self.end_session(Some(SESSION_EXPIRED_NOTICE));
                }
                Err(e)
            }
        }
    }

    /// Replace whatever session existed with `pair` and arm its timer.
    /// Refreshes still running for the previous session are discarded.
    /// Returns the display identity.
    pub fn start_session(&self, pair: &TokenPair) -> String {
        self.inner.next_epoch();
        self.inner.store.clear_all();
        let identity = self.apply_tokens(pair);
        if let Some(access) = pair.access_token.as_deref() {
            self.arm(access);
        }
        identity
    }

    /// Persist `pair` with its derived identity and show the user as
    /// signed in. Returns the identity shown.
    pub fn apply_tokens(&self, pair: &TokenPair) -> String {
        let store = &self.inner.store;
        store.save(pair);
        let derived = pair
            .id_token
            .as_deref()
            .map(identity_of)
            .filter(|s| !s.is_empty());
        let identity = match derived {
            Some(identity) => {
                store.set_email(&identity);
                identity
            }
            None => store.email().unwrap_or_default(),
        };
        self.inner.view.show_logged_in(&identity);
        identity
    }

    /// Local-only logout: cancel the timer, clear every credential and show
    /// the signed-out state. A refresh still in flight will not restore the
    /// session.
    pub fn force_logout(&self, notice: Option<&str>) {
        self.inner.next_epoch();
        self.end_session(notice);
    }

    fn end_session(&self, notice: Option<&str>) {
        self.cancel();
        self.inner.store.clear_all();
        self.inner.view.show_logged_out(notice);
    }

    /// Schedule a refresh ahead of `access_token`'s expiry, replacing any
    /// pending one. Returns the delay, or `None` if no timer was armed
    /// because expiry is unknown or already past.
    pub fn arm(&self, access_token: &str) -> Option<Duration> {
        let delay = ExpiryPolicy::remaining_at(access_token, now_secs()).and_then(|left| {
            refresh_delay(left, self.inner.settings.lead, self.inner.settings.min_delay)
        });

        let mut slot = self.inner.timer();
        slot.generation = slot.generation.wrapping_add(1);
        if let Some(old) = slot.pending.take() {
            old.abort();
        }
        let Some(delay) = delay else {
            tracing::debug!("no refresh timer armed, expiry unknown or past");
            return None;
        };

        let generation = slot.generation;
        let weak = Arc::downgrade(&self.inner);
        slot.pending = Some(tokio::spawn(fire_after(weak, generation, delay)));
        tracing::debug!(delay_secs = delay.as_secs(), "refresh timer armed");
        Some(delay)
    }

    /// Cancel the pending timer, if any.
    pub fn cancel(&self) {
        let mut slot = self.inner.timer();
        slot.generation = slot.generation.wrapping_add(1);
        if let Some(task) = slot.pending.take() {
            task.abort();
            tracing::debug!("refresh timer cancelled");
        }
    }

    #[must_use]
    pub fn timer_pending(&self) -> bool {
        self.inner.timer().pending.is_some()
    }
}

async fn fire_after(inner: Weak<Inner>, generation: u64, delay: Duration) {
    tokio::time::sleep(delay).await;
    let Some(inner) = inner.upgrade() else {
        return;
    };
    {
        let mut slot = inner.timer();
        if slot.generation != generation {
            return;
        }
        // detach so the refresh below may arm a successor without aborting us
        slot.pending.take();
    }
    tracing::debug!("refresh timer fired");
    let scheduler = RefreshScheduler { inner };
    // armed `lead` ahead of expiry, which may be earlier than the skew
    let _ = scheduler.refresh().await;
}
