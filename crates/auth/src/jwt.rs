//! Claim extraction from compact JWTs.
//!
//! No signature verification happens here: the tokens come straight from the
//! identity provider over TLS and are only read for expiry and display
//! identity, never for authorization decisions.

use base64::{
    Engine as _,
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use linglear_types::Claims;
use serde_json::Value;

/// base64url that accepts the payload with or without `=` padding.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode the claims of `token`.
///
/// Returns `None` for an empty token, a token without exactly three
/// dot-separated segments, a payload that is not base64url, or a payload that
/// is not a JSON object.
#[must_use]
pub fn decode_claims(token: &str) -> Option<Claims> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    let bytes = URL_SAFE_LENIENT.decode(payload).ok()?;
    match serde_json::from_slice::<Value>(&bytes).ok()? {
        Value::Object(map) => Some(Claims::new(map)),
        _ => None,
    }
}

/// Returns `true` if `token` decodes to claims.
#[must_use]
pub fn is_well_formed(token: &str) -> bool {
    decode_claims(token).is_some()
}

/// Display identity carried by an identity token, or `""`.
#[must_use]
pub fn identity_of(id_token: &str) -> String {
    decode_claims(id_token)
        .map(|c| c.display_identity())
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod testing {
    use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
    use serde_json::Value;
    use std::time::{SystemTime, UNIX_EPOCH};

    pub fn now() -> i64 {
        i64::try_from(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_secs(),
        )
        .unwrap()
    }

    /// An unsigned compact token carrying `claims`.
    pub fn make_token(claims: &Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
        format!("{header}.{payload}.c2lnbmF0dXJl")
    }

    /// A token expiring `secs` from now (negative for the past).
    pub fn token_expiring_in(secs: i64) -> String {
        make_token(&serde_json::json!({ "exp": now() + secs }))
    }
}
