//! Silent re-authentication channel.
//!
//! One attempt = one hidden context pointed at the provider's authorization
//! endpoint with `prompt=none`, waiting for the completion page's relay
//! message. Attempts are single-flight: callers arriving while one is
//! outstanding share its outcome instead of opening a second context.
//!
//! Whatever the outcome (tokens, provider error, timeout, transport failure)
//! the hidden context is closed, the listener is detached and the
//! single-flight slot is released.

use crate::{
    endpoints::Endpoints,
    message::{MessageFilter, SilentTokensMessage},
    state,
};
use futures::future::{BoxFuture, FutureExt as _, Shared};
use linglear_types::{ChannelHandle, RefreshError, SilentTransport, TokenPair};
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

/// Default hard timeout for one attempt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

type Attempt = Shared<BoxFuture<'static, Result<TokenPair, RefreshError>>>;
type Slot = Arc<Mutex<Option<Attempt>>>;

fn lock(slot: &Slot) -> MutexGuard<'_, Option<Attempt>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Empties the single-flight slot when the attempt task ends, including by
/// panic or abort.
struct Release(Slot);

impl Drop for Release {
    fn drop(&mut self) {
        lock(&self.0).take();
    }
}

/// Obtains fresh tokens without user interaction.
pub struct SilentChannel {
    transport: Arc<dyn SilentTransport>,
    endpoints: Arc<Endpoints>,
    timeout: Duration,
    inflight: Slot,
}

impl SilentChannel {
    pub fn new(transport: Arc<dyn SilentTransport>, endpoints: Arc<Endpoints>) -> Self {
        Self {
            transport,
            endpoints,
            timeout: DEFAULT_TIMEOUT,
            inflight: Arc::new(Mutex::new(None)),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `true` while an attempt is outstanding.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        lock(&self.inflight).is_some()
    }

    /// Run a silent attempt, or join the one already running.
    ///
    /// # Errors
    ///
    /// Returns the [`RefreshError`] describing why no tokens were obtained;
    /// every caller sharing the attempt receives the same error.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime.
    pub async fn attempt(&self) -> Result<TokenPair, RefreshError> {
        let attempt = {
            let mut slot = lock(&self.inflight);
            if let Some(pending) = slot.as_ref() {
                tracing::debug!("joining in-flight silent refresh");
                pending.clone()
            } else {
                let shared = self.spawn_attempt();
                *slot = Some(shared.clone());
                shared
            }
        };
        attempt.await
    }

    /// Start the attempt task. Called with the slot locked, so the task
    /// cannot release the slot before it has been filled.
    fn spawn_attempt(&self) -> Attempt {
        let state = state::silent_state();
        let url = self.endpoints.silent_url(&state);
        let filter = MessageFilter::new(self.endpoints.app_origin()).with_state(state);
        let transport = Arc::clone(&self.transport);
        let timeout = self.timeout;
        let release = Release(Arc::clone(&self.inflight));

        let task = tokio::spawn(async move {
            let _release = release;
            run_attempt(transport.as_ref(), &url, &filter, timeout).await
        });

        async move {
            task.await.unwrap_or_else(|e| {
                Err(RefreshError::Transport(format!(
                    "silent refresh task failed: {e}"
                )))
            })
        }
        .boxed()
        .shared()
    }
}

async fn run_attempt(
    transport: &dyn SilentTransport,
    url: &str,
    filter: &MessageFilter,
    timeout: Duration,
) -> Result<TokenPair, RefreshError> {
    let exchange = async {
        let mut handle = transport
            .open(url)
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;
        await_reply(&mut handle, filter).await?.outcome()
        // `handle` drops here: context closed, listener detached
    };
    let outcome = tokio::time::timeout(timeout, exchange)
        .await
        .unwrap_or(Err(RefreshError::Timeout));
    match &outcome {
        Ok(_) => tracing::info!("silent refresh succeeded"),
        Err(e) => tracing::warn!(error = %e, "silent refresh failed"),
    }
    outcome
}

/// Wait for the first message on `handle` that passes `filter`.
///
/// # Errors
///
/// [`RefreshError::ChannelClosed`] if the context goes away first.
pub(crate) async fn await_reply(
    handle: &mut ChannelHandle,
    filter: &MessageFilter,
) -> Result<SilentTokensMessage, RefreshError> {
    while let Some(msg) = handle.recv().await {
        if let Some(reply) = filter.accept(&msg) {
            return Ok(reply);
        }
    }
    Err(RefreshError::ChannelClosed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MESSAGE_TYPE;
    use crate::testing::{
        MockTransport, Script, error_message, foreign_message, tokens_message,
    };
    use linglear_config::IdentityConfig;
    use serde_json::json;

    fn channel(transport: Arc<MockTransport>) -> SilentChannel {
        let endpoints = Arc::new(Endpoints::from_config(&IdentityConfig::default()).unwrap());
        SilentChannel::new(transport, endpoints)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success() {
        let transport = MockTransport::replying(vec![tokens_message("AAA", "BBB")]);
        let ch = channel(transport.clone());
        let pair = ch.attempt().await.unwrap();
        assert_eq!(pair, TokenPair::new(Some("AAA".into()), Some("BBB".into())));
        assert_eq!(transport.opened(), 1);
        assert_eq!(transport.live(), 0);
        assert!(!ch.is_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_silent_authorize_url() {
        let transport = MockTransport::replying(vec![tokens_message("AAA", "")]);
        let ch = channel(transport.clone());
        ch.attempt().await.unwrap();
        let url = &transport.urls()[0];
        assert!(url.contains("prompt=none"));
        assert!(url.contains("state=sr_"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_attempts_share_one_context() {
        let transport = MockTransport::replying(vec![tokens_message("AAA", "BBB")]);
        let ch = channel(transport.clone());
        let (a, b) = tokio::join!(ch.attempt(), ch.attempt());
        assert_eq!(transport.opened(), 1);
        assert_eq!(a, b);
        assert!(a.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_failures_share_outcome() {
        let transport = MockTransport::replying(vec![error_message("login_required")]);
        let ch = channel(transport.clone());
        let (a, b, c) = tokio::join!(ch.attempt(), ch.attempt(), ch.attempt());
        assert_eq!(transport.opened(), 1);
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert!(matches!(a, Err(RefreshError::Provider { ref code, .. }) if code == "login_required"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_attempts_open_new_contexts() {
        let transport = MockTransport::replying(vec![tokens_message("AAA", "")]);
        let ch = channel(transport.clone());
        ch.attempt().await.unwrap();
        ch.attempt().await.unwrap();
        assert_eq!(transport.opened(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_tears_down_context() {
        let transport = MockTransport::new(Script::Silence);
        let ch = channel(transport.clone()).with_timeout(Duration::from_secs(10));
        let started = tokio::time::Instant::now();
        let err = ch.attempt().await.unwrap_err();
        assert_eq!(err, RefreshError::Timeout);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed < Duration::from_secs(11));
        assert_eq!(transport.live(), 0);
        assert!(!ch.is_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_while_waiting() {
        let transport = MockTransport::new(Script::Reply(
            Duration::from_secs(2),
            vec![tokens_message("AAA", "")],
        ));
        let ch = Arc::new(channel(transport.clone()));
        let bg = {
            let ch = Arc::clone(&ch);
            tokio::spawn(async move { ch.attempt().await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(ch.is_in_flight());
        assert_eq!(transport.live(), 1);
        bg.await.unwrap().unwrap();
        assert!(!ch.is_in_flight());
        assert_eq!(transport.live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreign_origin_ignored() {
        let transport = MockTransport::replying(vec![foreign_message(
            json!({"type": MESSAGE_TYPE, "accessToken": "stolen"}),
        )]);
        let ch = channel(transport.clone()).with_timeout(Duration::from_secs(3));
        assert_eq!(ch.attempt().await, Err(RefreshError::Timeout));
        assert_eq!(transport.live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrelated_messages_skipped() {
        let transport = MockTransport::replying(vec![
            foreign_message(json!({"type": MESSAGE_TYPE, "accessToken": "stolen"})),
            linglear_types::ChannelMessage::new(
                crate::testing::ORIGIN,
                json!({"type": "analytics", "accessToken": "nope"}),
            ),
            tokens_message("AAA", "BBB"),
        ]);
        let pair = channel(transport).attempt().await.unwrap();
        assert_eq!(pair.access_token.as_deref(), Some("AAA"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_result() {
        let transport = MockTransport::replying(vec![tokens_message("", "")]);
        let ch = channel(transport.clone());
        assert_eq!(ch.attempt().await, Err(RefreshError::EmptyResult));
        assert_eq!(transport.live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_releases_slot() {
        let transport = MockTransport::new(Script::Fail);
        let ch = channel(transport.clone());
        assert!(matches!(
            ch.attempt().await,
            Err(RefreshError::Transport(_))
        ));
        assert!(!ch.is_in_flight());

        transport.set_script(Script::Reply(Duration::ZERO, vec![tokens_message("AAA", "")]));
        assert!(ch.attempt().await.is_ok());
    }
}
