//! Token expiry policy.
//!
//! A well-formed token without a readable `exp` is treated as usable; a
//! missing claim alone never logs the user out. The backend has the final say
//! for such tokens.

use crate::jwt::{decode_claims, is_well_formed};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Sentinel returned by [`ExpiryPolicy::seconds_remaining`] when a token has
/// no readable `exp` claim.
pub const UNKNOWN_EXPIRY: i64 = -1;

/// Default skew for session-level checks (seconds).
pub const DEFAULT_SKEW_SECS: i64 = 60;

/// Current time in whole seconds since the epoch.
#[must_use]
pub fn now_secs() -> i64 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs();
    i64::try_from(secs).unwrap_or(i64::MAX)
}

/// How usable a token is right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Remaining lifetime exceeds the skew, or expiry is unknown.
    Usable,
    /// Still valid, but within the skew window.
    NearExpiry,
    /// Already past `exp`.
    Expired,
}

/// Decides whether tokens are usable, given a safety skew.
#[derive(Debug, Clone, Copy)]
pub struct ExpiryPolicy {
    skew: i64,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            skew: DEFAULT_SKEW_SECS,
        }
    }
}

impl ExpiryPolicy {
    #[must_use]
    pub fn new(skew: Duration) -> Self {
        Self {
            skew: i64::try_from(skew.as_secs()).unwrap_or(i64::MAX),
        }
    }

    #[must_use]
    pub fn skew_secs(&self) -> i64 {
        self.skew
    }

    /// Seconds until `exp` at time `now`; `None` if expiry is unknown.
    #[must_use]
    pub fn remaining_at(token: &str, now: i64) -> Option<i64> {
        decode_claims(token)?.exp().map(|exp| exp.saturating_sub(now))
    }

    /// Seconds until `exp`, or [`UNKNOWN_EXPIRY`] if it cannot be read.
    ///
    /// A genuinely expired token also yields a negative value; use
    /// [`ExpiryPolicy::remaining_at`] to tell the two apart.
    #[must_use]
    pub fn seconds_remaining(token: &str) -> i64 {
        Self::remaining_at(token, now_secs()).unwrap_or(UNKNOWN_EXPIRY)
    }

    /// `true` iff the token has a readable `exp` and `exp - now <= skew`.
    #[must_use]
    pub fn is_expired_or_near(token: &str, skew: i64) -> bool {
        Self::is_expired_or_near_at(token, skew, now_secs())
    }

    #[must_use]
    pub fn is_expired_or_near_at(token: &str, skew: i64, now: i64) -> bool {
        Self::remaining_at(token, now).is_some_and(|left| left <= skew)
    }

    /// Classify `token` against this policy's skew.
    #[must_use]
    pub fn classify(&self, token: &str) -> Freshness {
        self.classify_at(token, now_secs())
    }

    #[must_use]
    pub fn classify_at(&self, token: &str, now: i64) -> Freshness {
        match Self::remaining_at(token, now) {
            Some(left) if left <= 0 => Freshness::Expired,
            Some(left) if left <= self.skew => Freshness::NearExpiry,
            _ => Freshness::Usable,
        }
    }

    /// `true` if `token` is well-formed and can be sent now under this
    /// policy's skew. Malformed tokens count as absent, not as usable.
    #[must_use]
    pub fn is_usable(&self, token: &str) -> bool {
        is_well_formed(token) && self.classify(token) == Freshness::Usable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::testing::{make_token, now, token_expiring_in};
    use serde_json::json;

    #[test]
    fn test_near_expiry_within_skew() {
        // exp = now + 10s, skew = 30s
        let token = token_expiring_in(10);
        assert!(ExpiryPolicy::is_expired_or_near(&token, 30));
        assert!(!ExpiryPolicy::is_expired_or_near(&token, 5));
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let now = 1_000_000;
        let token = make_token(&json!({"exp": now + 30}));
        assert!(ExpiryPolicy::is_expired_or_near_at(&token, 30, now));
        assert!(!ExpiryPolicy::is_expired_or_near_at(&token, 29, now));
    }

    #[test]
    fn test_iff_property_over_range() {
        let now = 1_700_000_000;
        for offset in -120..=120 {
            let token = make_token(&json!({"exp": now + offset}));
            for skew in [0, 30, 60] {
                assert_eq!(
                    ExpiryPolicy::is_expired_or_near_at(&token, skew, now),
                    offset <= skew,
                    "offset={offset} skew={skew}"
                );
            }
        }
    }

    #[test]
    fn test_unknown_expiry_is_lenient() {
        let token = make_token(&json!({"email": "a@example.com"}));
        assert_eq!(ExpiryPolicy::seconds_remaining(&token), UNKNOWN_EXPIRY);
        assert!(!ExpiryPolicy::is_expired_or_near(&token, 60));
        assert_eq!(ExpiryPolicy::default().classify(&token), Freshness::Usable);
    }

    #[test]
    fn test_seconds_remaining() {
        let left = ExpiryPolicy::seconds_remaining(&token_expiring_in(3600));
        assert!((3590..=3600).contains(&left), "left={left}");
        assert!(ExpiryPolicy::seconds_remaining(&token_expiring_in(-500)) < -400);
    }

    #[test]
    fn test_classify() {
        let policy = ExpiryPolicy::new(Duration::from_secs(60));
        let now = now();
        assert_eq!(
            policy.classify_at(&make_token(&json!({"exp": now + 3600})), now),
            Freshness::Usable
        );
        assert_eq!(
            policy.classify_at(&make_token(&json!({"exp": now + 60})), now),
            Freshness::NearExpiry
        );
        assert_eq!(
            policy.classify_at(&make_token(&json!({"exp": now})), now),
            Freshness::Expired
        );
        assert!(policy.is_usable(&token_expiring_in(600)));
        assert!(!policy.is_usable(&token_expiring_in(30)));
        assert!(!policy.is_usable("not-a-jwt"));
    }
}
