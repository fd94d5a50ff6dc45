//! Interactive login for command-line use.
//!
//! Opens the hosted login page through a [`SilentTransport`] (normally the
//! loopback transport, which launches the system browser) and waits for the
//! completion page to relay the tokens back.

use crate::{channel::await_reply, message::MessageFilter, session::SessionController, state};
use linglear_types::{LinglearError, RefreshError, Result, SilentTransport};
use std::time::Duration;

/// How long the user gets to complete the hosted login.
pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(120);

/// Run the full interactive login and establish the session.
///
/// Returns the display identity of the signed-in user.
///
/// # Errors
///
/// Returns an error if the transport cannot be opened, the provider reports
/// an error, no tokens arrive within `timeout`, or the relay carries no
/// tokens.
pub async fn interactive_login(
    session: &SessionController,
    transport: &dyn SilentTransport,
    timeout: Duration,
) -> Result<String> {
    let state = state::random_state();
    let url = session.endpoints().login_url_with_state(&state);
    let filter = MessageFilter::new(session.endpoints().app_origin()).with_state(state);

    let exchange = async {
        let mut handle = transport.open(&url).await?;
        let reply = await_reply(&mut handle, &filter).await?;
        Ok::<_, LinglearError>(reply.outcome()?)
    };
    let pair = tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| RefreshError::Timeout)??;
    Ok(session.complete_login(&pair))
}
