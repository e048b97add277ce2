use crate::jar::{CookieJar, SECURE_COOKIE_PREFIX};

/// Locate the OAuth CSRF/state token inside a persisted cookie jar.
///
/// The server stores it under `<prefix>.oauth_state`, either with or without
/// the secure wire-format prefix depending on its cookie settings. Both
/// naming conventions are tried for every configured prefix; prefix order is
/// the priority order. An absent or unparseable jar yields `None`.
pub(crate) fn extract_oauth_state(
    jar_json: Option<&str>,
    cookie_prefixes: &[String],
) -> Option<String> {
    let jar: CookieJar = serde_json::from_str(jar_json?).ok()?;

    for prefix in cookie_prefixes {
        let candidates = [
            format!("{SECURE_COOKIE_PREFIX}{prefix}.oauth_state"),
            format!("{prefix}.oauth_state"),
        ];

        for name in candidates {
            if let Some(cookie) = jar.get(&name)
                && !cookie.value.is_empty()
            {
                return Some(cookie.value.clone());
            }
        }
    }

    None
}
