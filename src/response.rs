use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

/// Body of a successful session fetch: the authenticated user and the active
/// server-side session. Both are passed through as-is; their exact shape is
/// defined by the auth server and any plugins active on it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SessionPayload {
    #[serde(default)]
    pub user: Option<serde_json::Value>,

    #[serde(default)]
    pub session: Option<serde_json::Value>,

    #[serde(flatten)]
    pub additional: HashMap<String, serde_json::Value>,
}

impl SessionPayload {
    /// Whether this payload actually carries session data. Only such payloads
    /// are written to the offline cache; error-shaped or empty bodies must
    /// never overwrite a previously cached session.
    pub fn carries_session_data(&self) -> bool {
        self.user.is_some() || self.session.is_some()
    }
}

/// Response to sign-in and sign-up style requests.
///
/// Credential-based flows answer with `token`/`user` directly. Social
/// sign-in flows instead answer with `redirect: true` and the provider's
/// authorization `url`, which the client must open in a browser.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SignInResponse {
    #[serde(default)]
    pub redirect: bool,

    #[serde(default)]
    pub url: Option<Url>,

    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub user: Option<serde_json::Value>,

    #[serde(flatten)]
    pub additional: HashMap<String, serde_json::Value>,
}

/// Error body returned by the auth server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error code, e.g. `INVALID_EMAIL_OR_PASSWORD`.
    #[serde(default)]
    pub code: Option<String>,

    /// Human-readable message.
    #[serde(default)]
    pub message: Option<String>,

    /// HTTP status of the response this error was read from. Not part of the
    /// body; filled in by the request pipeline.
    #[serde(skip)]
    pub status: u16,
}

#[cfg(test)]
mod tests {
    use assertr::prelude::*;

    use super::*;

    #[test]
    fn session_payload_with_user_carries_session_data() {
        let payload: SessionPayload =
            serde_json::from_value(serde_json::json!({ "user": { "id": "1" } })).unwrap();
        assert_that(payload.carries_session_data()).is_true();
    }

    #[test]
    fn empty_session_payload_carries_no_session_data() {
        let payload: SessionPayload = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_that(payload.carries_session_data()).is_false();
    }

    #[test]
    fn session_payload_preserves_additional_fields() {
        let payload: SessionPayload = serde_json::from_value(serde_json::json!({
            "user": { "id": "1" },
            "session": { "id": "s1" },
            "activeOrganizationId": "org1",
        }))
        .unwrap();
        assert_that(payload.additional.contains_key("activeOrganizationId")).is_true();
    }

    #[test]
    fn sign_in_response_defaults_to_non_redirect() {
        let response: SignInResponse =
            serde_json::from_value(serde_json::json!({ "token": "abc" })).unwrap();
        assert_that(response.redirect).is_false();
        assert_that(response.token).is_equal_to(Some("abc".to_owned()));
    }

    #[test]
    fn sign_in_response_with_redirect() {
        let response: SignInResponse = serde_json::from_value(serde_json::json!({
            "redirect": true,
            "url": "https://accounts.example.com/o/oauth2/auth?state=xyz",
        }))
        .unwrap();
        assert_that(response.redirect).is_true();
        assert_that(response.url.is_some()).is_true();
    }
}
