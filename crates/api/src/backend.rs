//! Backend base URL resolution.

/// Durable preference key holding a user-chosen backend base URL.
pub const BACKEND_KEY: &str = "linglear_backend_base";

/// Normalise a backend base URL: trimmed, `http`/`https` only, no trailing
/// slashes. `None` if the input is empty or not an HTTP(S) URL.
#[must_use]
pub fn normalize_base(url: &str) -> Option<String> {
    let url = url.trim();
    let scheme_len = ["https://", "http://"]
        .into_iter()
        .find(|scheme| {
            url.get(..scheme.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(scheme))
        })?
        .len();
    let trimmed = url.trim_end_matches('/');
    (trimmed.len() > scheme_len).then(|| trimmed.to_string())
}

/// Join `path` onto `base`, adding the leading `/` if missing.
#[must_use]
pub fn build_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        base.to_string()
    } else if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base() {
        assert_eq!(
            normalize_base("  https://api.linglear.com/// ").as_deref(),
            Some("https://api.linglear.com")
        );
        assert_eq!(
            normalize_base("HTTP://localhost:8080/").as_deref(),
            Some("HTTP://localhost:8080")
        );
        assert_eq!(normalize_base(""), None);
        assert_eq!(normalize_base("   "), None);
        assert_eq!(normalize_base("ftp://files.linglear.com"), None);
        assert_eq!(normalize_base("api.linglear.com"), None);
        assert_eq!(normalize_base("https://"), None);
    }

    #[test]
    fn test_build_url() {
        let base = "https://api.linglear.com";
        assert_eq!(build_url(base, "/api/me"), "https://api.linglear.com/api/me");
        assert_eq!(build_url(base, "api/me"), "https://api.linglear.com/api/me");
        assert_eq!(build_url(base, ""), base);
    }
}
