//! Random `state` values for authorization requests.

use rand::RngCore as _;

/// Prefix that marks a state value as belonging to a silent refresh.
pub const SILENT_STATE_PREFIX: &str = "sr_";

/// Generate a random `state` parameter (32 lowercase hex chars).
#[must_use]
pub fn random_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().fold(String::with_capacity(32), |mut s, b| {
        use std::fmt::Write as _;
        let _ = write!(s, "{b:02x}");
        s
    })
}

/// A state value for a silent refresh attempt.
#[must_use]
pub fn silent_state() -> String {
    format!("{SILENT_STATE_PREFIX}{}", random_state())
}
