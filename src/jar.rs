use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc2822;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, PrimitiveDateTime};

use crate::cookie::parse_set_cookie_header;

/// Wire-format prefix of cookie names set with secure attributes.
pub const SECURE_COOKIE_PREFIX: &str = "__Secure-";

/// A cookie name signals an actual auth-state change when it contains one of
/// these markers. Everything else (CSRF helpers, CDN bot-mitigation cookies,
/// ...) is bookkeeping that must not trigger session refetches.
const SESSION_COOKIE_MARKERS: [&str; 2] = ["session_token", "session_data"];

/// `Expires` dates on the wire: `Wed, 21 Oct 2026 07:28:00 GMT`.
const IMF_FIXDATE: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// A single persisted cookie: its current value and an absolute expiry.
///
/// `expires` is always an absolute point in time, never a relative duration.
/// `None` means the cookie does not expire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub value: String,

    #[serde(with = "time::serde::rfc3339::option")]
    pub expires: Option<OffsetDateTime>,
}

impl StoredCookie {
    pub fn expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires.is_some_and(|expires| expires < now)
    }
}

/// The persisted map from cookie name to [`StoredCookie`], stored as a single
/// JSON blob under one preference-store key.
///
/// Entries past their expiry are not eagerly deleted; they are filtered out
/// lazily when serializing to a `Cookie` header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CookieJar(HashMap<String, StoredCookie>);

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a jar from its persisted JSON form. A corrupted blob is treated
    /// as "no previous jar" rather than an error.
    pub fn from_json(json: &str) -> Self {
        match serde_json::from_str(json) {
            Ok(jar) => jar,
            Err(err) => {
                tracing::debug!(?err, "Could not parse persisted cookie jar. Starting fresh.");
                Self::new()
            }
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            tracing::error!(?err, "Could not serialize cookie jar.");
            "{}".to_owned()
        })
    }

    pub fn get(&self, name: &str) -> Option<&StoredCookie> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge all cookies from a raw `Set-Cookie` header into this jar.
    ///
    /// New entries overwrite old entries of the same name; untouched names
    /// are preserved. A relative `max-age` is converted into an absolute
    /// expiry relative to now and takes precedence over an `expires`
    /// attribute. Without either, the cookie never expires.
    pub fn merge_set_cookie(&mut self, header: &str) {
        let now = OffsetDateTime::now_utc();

        for (name, entry) in parse_set_cookie_header(header) {
            let expires = if let Some(max_age) = entry
                .attribute("max-age")
                .and_then(|it| it.parse::<i64>().ok())
            {
                Some(now + Duration::seconds(max_age))
            } else if let Some(date) = entry.attribute("expires") {
                let parsed = parse_cookie_date(date);
                if parsed.is_none() {
                    tracing::debug!(date, "Could not parse cookie `expires` attribute. Treating the cookie as non-expiring.");
                }
                parsed
            } else {
                None
            };

            self.0.insert(
                name,
                StoredCookie {
                    value: entry.value,
                    expires,
                },
            );
        }
    }

    /// Serialize all non-expired entries into a `Cookie` request header value.
    pub fn header_value(&self) -> String {
        let now = OffsetDateTime::now_utc();
        self.0
            .iter()
            .filter(|(_, cookie)| !cookie.expired_at(now))
            .map(|(name, cookie)| format!("{name}={}", cookie.value))
            .join("; ")
    }
}

/// Strip the secure wire-format prefix from a cookie name, if present.
pub fn strip_secure_cookie_prefix(name: &str) -> &str {
    name.strip_prefix(SECURE_COOKIE_PREFIX).unwrap_or(name)
}

/// Normalize a name for use as a preference-store key. Some platform secure
/// stores reject colons in keys.
pub fn normalize_cookie_name(name: &str) -> String {
    name.replace(':', "_")
}

/// Whether the session-relevant cookies differ between a previously persisted
/// jar and its successor.
///
/// Only cookie *values* are compared; a refreshed expiry alone does not count
/// as a change. No previous jar (or an unparseable one) always counts as
/// changed. This predicate gates session-change notifications so that expiry
/// bookkeeping and unrelated third-party cookies cannot cause refetch storms.
pub fn has_session_cookie_changed(prev_json: Option<&str>, next_json: &str) -> bool {
    let Some(prev_json) = prev_json else {
        return true;
    };
    let Ok(prev) = serde_json::from_str::<HashMap<String, StoredCookie>>(prev_json) else {
        return true;
    };
    let Ok(next) = serde_json::from_str::<HashMap<String, StoredCookie>>(next_json) else {
        return true;
    };

    let session_keys: HashSet<&String> = prev
        .keys()
        .chain(next.keys())
        .filter(|key| SESSION_COOKIE_MARKERS.iter().any(|m| key.contains(m)))
        .collect();

    session_keys.into_iter().any(|key| {
        let prev_value = prev.get(key).map(|cookie| &cookie.value);
        let next_value = next.get(key).map(|cookie| &cookie.value);
        prev_value != next_value
    })
}

/// Whether a raw `Set-Cookie` header contains any cookie belonging to the
/// auth system, identified by the configured cookie-name prefixes.
///
/// Cookie names are matched after stripping the secure prefix. An empty
/// configured prefix falls back to matching well-known session suffixes.
/// Headers failing this check are skipped entirely; processing unrelated
/// cookies (e.g. a CDN challenge cookie) would trigger infinite refetch
/// loops.
pub fn has_relevant_cookies(header: &str, cookie_prefixes: &[String]) -> bool {
    let cookies = parse_set_cookie_header(header);

    for name in cookies.keys() {
        let name = strip_secure_cookie_prefix(name);
        for prefix in cookie_prefixes {
            if prefix.is_empty() {
                if SESSION_COOKIE_MARKERS
                    .iter()
                    .any(|marker| name.ends_with(marker))
                {
                    return true;
                }
            } else if name.starts_with(prefix.as_str()) {
                return true;
            }
        }
    }

    false
}

fn parse_cookie_date(date: &str) -> Option<OffsetDateTime> {
    if let Ok(parsed) = PrimitiveDateTime::parse(date, IMF_FIXDATE) {
        return Some(parsed.assume_utc());
    }
    OffsetDateTime::parse(date, &Rfc2822).ok()
}

#[cfg(test)]
mod tests {
    use assertr::prelude::*;
    use time::macros::datetime;

    use super::*;

    fn jar_json(entries: &[(&str, &str, Option<&str>)]) -> String {
        let mut jar = serde_json::Map::new();
        for (name, value, expires) in entries {
            jar.insert(
                (*name).to_owned(),
                serde_json::json!({ "value": value, "expires": expires }),
            );
        }
        serde_json::Value::Object(jar).to_string()
    }

    #[test]
    fn merge_computes_absolute_expiry_from_max_age() {
        let mut jar = CookieJar::new();
        jar.merge_set_cookie("session_token=abc; Max-Age=3600; Path=/");

        let now = OffsetDateTime::now_utc();
        let expires = jar.get("session_token").unwrap().expires.unwrap();
        assert_that(expires - now).is_in_range(Duration::seconds(3590)..=Duration::seconds(3610));
    }

    #[test]
    fn merge_parses_expires_attribute() {
        let mut jar = CookieJar::new();
        jar.merge_set_cookie("session_token=abc; Expires=Wed, 21 Oct 2026 07:28:00 GMT");

        assert_that(jar.get("session_token").unwrap().expires)
            .is_equal_to(Some(datetime!(2026-10-21 07:28:00 UTC)));
    }

    #[test]
    fn merge_prefers_max_age_over_expires() {
        let mut jar = CookieJar::new();
        jar.merge_set_cookie(
            "session_token=abc; Max-Age=60; Expires=Wed, 21 Oct 2026 07:28:00 GMT",
        );

        let expires = jar.get("session_token").unwrap().expires.unwrap();
        assert_that(expires < datetime!(2026-10-21 07:28:00 UTC)).is_true();
    }

    #[test]
    fn merge_without_expiry_never_expires() {
        let mut jar = CookieJar::new();
        jar.merge_set_cookie("session_token=abc; Path=/; HttpOnly");
        assert_that(jar.get("session_token").unwrap().expires).is_equal_to(None);
    }

    #[test]
    fn merge_overwrites_same_name_and_preserves_others() {
        let mut jar = CookieJar::from_json(&jar_json(&[
            ("session_token", "old", None),
            ("untouched", "kept", None),
        ]));
        jar.merge_set_cookie("session_token=new");

        assert_that(jar.get("session_token").unwrap().value.as_str()).is_equal_to("new");
        assert_that(jar.get("untouched").unwrap().value.as_str()).is_equal_to("kept");
    }

    #[test]
    fn from_json_treats_corrupt_blob_as_empty() {
        let jar = CookieJar::from_json("not json at all");
        assert_that(jar.is_empty()).is_true();
    }

    #[test]
    fn header_value_serializes_single_entry() {
        let jar = CookieJar::from_json(&jar_json(&[("session_token", "X", None)]));
        assert_that(jar.header_value()).is_equal_to("session_token=X");
    }

    #[test]
    fn header_value_skips_expired_entries() {
        let jar = CookieJar::from_json(&jar_json(&[
            ("session_token", "X", None),
            ("stale", "Y", Some("2001-01-01T00:00:00Z")),
        ]));
        assert_that(jar.header_value()).is_equal_to("session_token=X");
    }

    #[test]
    fn remerging_serialized_jar_is_idempotent() {
        let mut jar = CookieJar::new();
        jar.merge_set_cookie("session_token=abc; Max-Age=3600, other=xyz");

        let mut remerged = CookieJar::new();
        remerged.merge_set_cookie(&jar.header_value());

        assert_that(remerged.len()).is_equal_to(jar.len());
        assert_that(remerged.get("session_token").unwrap().value.as_str()).is_equal_to("abc");
        assert_that(remerged.get("other").unwrap().value.as_str()).is_equal_to("xyz");
    }

    #[test]
    fn session_change_without_previous_jar() {
        let next = jar_json(&[("better-auth.session_token", "A", None)]);
        assert_that(has_session_cookie_changed(None, &next)).is_true();
    }

    #[test]
    fn session_change_with_corrupt_previous_jar() {
        let next = jar_json(&[("better-auth.session_token", "A", None)]);
        assert_that(has_session_cookie_changed(Some("garbage"), &next)).is_true();
    }

    #[test]
    fn session_change_ignores_identical_values() {
        let prev = jar_json(&[("better-auth.session_token", "A", None)]);
        let next = jar_json(&[("better-auth.session_token", "A", None)]);
        assert_that(has_session_cookie_changed(Some(&prev), &next)).is_false();
    }

    #[test]
    fn session_change_ignores_expiry_only_updates() {
        let prev = jar_json(&[("better-auth.session_token", "A", Some("2026-01-01T00:00:00Z"))]);
        let next = jar_json(&[("better-auth.session_token", "A", Some("2027-01-01T00:00:00Z"))]);
        assert_that(has_session_cookie_changed(Some(&prev), &next)).is_false();
    }

    #[test]
    fn session_change_detects_value_updates() {
        let prev = jar_json(&[("better-auth.session_token", "A", None)]);
        let next = jar_json(&[("better-auth.session_token", "B", None)]);
        assert_that(has_session_cookie_changed(Some(&prev), &next)).is_true();
    }

    #[test]
    fn session_change_detects_removed_session_cookie() {
        let prev = jar_json(&[("better-auth.session_token", "A", None)]);
        let next = jar_json(&[("unrelated", "x", None)]);
        assert_that(has_session_cookie_changed(Some(&prev), &next)).is_true();
    }

    #[test]
    fn session_change_ignores_unrelated_cookies() {
        let prev = jar_json(&[
            ("better-auth.session_token", "A", None),
            ("__cf_bm", "one", None),
        ]);
        let next = jar_json(&[
            ("better-auth.session_token", "A", None),
            ("__cf_bm", "two", None),
        ]);
        assert_that(has_session_cookie_changed(Some(&prev), &next)).is_false();
    }

    #[test]
    fn relevance_rejects_third_party_cookies() {
        let prefixes = vec!["better-auth".to_owned()];
        assert_that(has_relevant_cookies("__cf_bm=abc123; Path=/; HttpOnly", &prefixes))
            .is_false();
    }

    #[test]
    fn relevance_accepts_prefixed_cookies() {
        let prefixes = vec!["better-auth".to_owned()];
        assert_that(has_relevant_cookies("better-auth.session_token=abc", &prefixes)).is_true();
    }

    #[test]
    fn relevance_strips_secure_prefix_before_matching() {
        let prefixes = vec!["better-auth".to_owned()];
        assert_that(has_relevant_cookies(
            "__Secure-better-auth.session_token=abc; Secure",
            &prefixes,
        ))
        .is_true();
    }

    #[test]
    fn relevance_falls_back_to_session_suffixes_for_empty_prefix() {
        let prefixes = vec![String::new()];
        assert_that(has_relevant_cookies("my-app.session_token=abc", &prefixes)).is_true();
        assert_that(has_relevant_cookies("__cf_bm=abc", &prefixes)).is_false();
    }

    #[test]
    fn normalize_replaces_colons() {
        assert_that(normalize_cookie_name("my:app_cookie")).is_equal_to("my_app_cookie");
        assert_that(normalize_cookie_name("plain")).is_equal_to("plain");
    }
}
