//! Token lifecycle for the Linglear dashboard.
//!
//! Claim decoding and expiry checks, silent re-authentication through a
//! hidden context, proactive refresh scheduling and the session controller
//! that ties them together. The [`SessionController`] is the entry point.

pub mod channel;
pub mod completion;
pub mod endpoints;
pub mod expiry;
pub mod flow;
pub mod fragment;
pub mod jwt;
pub mod loopback;
pub mod message;
pub mod scheduler;
pub mod session;
pub mod state;

#[cfg(test)]
mod testing;

pub use channel::SilentChannel;
pub use endpoints::Endpoints;
pub use expiry::{ExpiryPolicy, Freshness};
pub use loopback::LoopbackTransport;
pub use message::{MessageFilter, SilentTokensMessage};
pub use scheduler::{RefreshScheduler, RefreshSettings, SESSION_EXPIRED_NOTICE};
pub use session::{SessionController, SessionState};
