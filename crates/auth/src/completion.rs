//! Logic of the silent-refresh completion page.
//!
//! The page is loaded twice per attempt: first with an empty fragment, when
//! it starts the `prompt=none` authorization itself, then again when the
//! provider redirects back with tokens or an error in the fragment, which it
//! relays to its opener before cleaning its own URL.

use crate::{
    endpoints::Endpoints,
    fragment::{FragmentParams, strip_fragment},
    message::SilentTokensMessage,
    state,
};

/// What the completion page should do for a given location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionAction {
    /// Post `message` to the opener, then replace the URL with `cleaned_url`.
    Relay {
        message: SilentTokensMessage,
        cleaned_url: String,
    },
    /// No result yet: navigate to the silent authorization URL.
    Authorize { url: String, state: String },
}

/// Decide the page's action for `location` (its full current URL).
#[must_use]
pub fn handle(location: &str, endpoints: &Endpoints) -> CompletionAction {
    match FragmentParams::from_url(location).filter(FragmentParams::is_relevant) {
        Some(params) => CompletionAction::Relay {
            message: SilentTokensMessage::from_fragment(&params),
            cleaned_url: strip_fragment(location).to_string(),
        },
        None => {
            let state = state::silent_state();
            CompletionAction::Authorize {
                url: endpoints.silent_url(&state),
                state,
            }
        }
    }
}

/// Build the relay payload from already-decoded redirect parameters.
#[must_use]
pub fn relay_message(params: &FragmentParams) -> SilentTokensMessage {
    SilentTokensMessage::from_fragment(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MESSAGE_TYPE;
    use linglear_config::IdentityConfig;

    fn endpoints() -> Endpoints {
        Endpoints::from_config(&IdentityConfig::default()).unwrap()
    }

    #[test]
    fn test_relays_tokens_and_cleans_url() {
        let action = handle(
            "https://linglear.com/silent-refresh.html#access_token=AAA&id_token=BBB&state=sr_x",
            &endpoints(),
        );
        let CompletionAction::Relay {
            message,
            cleaned_url,
        } = action
        else {
            panic!("expected relay");
        };
        assert_eq!(message.kind, MESSAGE_TYPE);
        assert_eq!(message.access_token.as_deref(), Some("AAA"));
        assert_eq!(message.id_token.as_deref(), Some("BBB"));
        assert_eq!(message.state.as_deref(), Some("sr_x"));
        assert_eq!(cleaned_url, "https://linglear.com/silent-refresh.html");
    }

    #[test]
    fn test_relays_provider_error() {
        let action = handle(
            "https://linglear.com/silent-refresh.html#error=login_required",
            &endpoints(),
        );
        assert!(matches!(
            action,
            CompletionAction::Relay { message, .. } if message.error.as_deref() == Some("login_required")
        ));
    }

    #[test]
    fn test_starts_silent_authorization() {
        let action = handle("https://linglear.com/silent-refresh.html", &endpoints());
        let CompletionAction::Authorize { url, state } = action else {
            panic!("expected authorize");
        };
        assert!(state.starts_with(state::SILENT_STATE_PREFIX));
        assert!(url.contains("prompt=none"));
        assert!(url.contains(&state));
    }

    #[test]
    fn test_unrelated_fragment_starts_authorization() {
        let action = handle("https://linglear.com/silent-refresh.html#foo=bar", &endpoints());
        assert!(matches!(action, CompletionAction::Authorize { .. }));
    }
}
