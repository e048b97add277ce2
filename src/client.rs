use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;
use snafu::ResultExt;
use url::Url;

use crate::internal::bridge::AuthBridge;
use crate::request::{self, RequestError, SerdeSnafu};
use crate::response::{SessionPayload, SignInResponse};
use crate::storage::StorageError;

/// Client for a better-auth style server.
///
/// Every request runs through the offline bridge: the persisted cookie jar
/// attaches on the way out, and `Set-Cookie`/auth-token headers are folded
/// back into it on the way back. Obtain an instance via
/// [`crate::BetterAuth::client`], which keeps all call sites on one shared
/// bridge and therefore one consistent view of the persisted state.
#[derive(Debug, Clone)]
pub struct AuthClient {
    base_url: Url,
    bridge: Arc<AuthBridge>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignInEmailRequest {
    pub email: String,
    pub password: String,

    #[serde(rename = "rememberMe", skip_serializing_if = "Option::is_none")]
    pub remember_me: Option<bool>,

    #[serde(rename = "callbackURL", skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignUpEmailRequest {
    pub name: String,
    pub email: String,
    pub password: String,

    #[serde(rename = "callbackURL", skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignInSocialRequest {
    /// Provider id as configured on the server, e.g. `github`.
    pub provider: String,

    #[serde(rename = "callbackURL", skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,

    #[serde(rename = "newUserCallbackURL", skip_serializing_if = "Option::is_none")]
    pub new_user_callback_url: Option<String>,

    #[serde(rename = "errorCallbackURL", skip_serializing_if = "Option::is_none")]
    pub error_callback_url: Option<String>,

    /// Provider-issued token for silent sign-in. When present, the server
    /// answers directly and no browser redirect happens.
    #[serde(rename = "idToken", skip_serializing_if = "Option::is_none")]
    pub id_token: Option<serde_json::Value>,
}

impl AuthClient {
    pub(crate) fn new(base_url: Url, bridge: Arc<AuthBridge>) -> Self {
        Self { base_url, bridge }
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let joined = format!("{}{}", url.path().trim_end_matches('/'), path);
        url.set_path(&joined);
        url
    }

    async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<Option<serde_json::Value>, RequestError> {
        request::execute(&self.bridge, Method::POST, self.endpoint(path), Some(body)).await
    }

    /// Sign in with email and password.
    pub async fn sign_in_email(
        &self,
        request: SignInEmailRequest,
    ) -> Result<SignInResponse, RequestError> {
        let body = serde_json::to_value(&request).context(SerdeSnafu {})?;
        let data = self.post("/sign-in/email", body).await?;
        decode_sign_in_response(data)
    }

    /// Create an account with email and password. Depending on server
    /// configuration this also signs the new user in.
    pub async fn sign_up_email(
        &self,
        request: SignUpEmailRequest,
    ) -> Result<SignInResponse, RequestError> {
        let body = serde_json::to_value(&request).context(SerdeSnafu {})?;
        let data = self.post("/sign-up/email", body).await?;
        decode_sign_in_response(data)
    }

    /// Sign in with a social provider.
    ///
    /// Without an `id_token`, the server answers with a redirect. When a
    /// deep-link scheme is configured, the bridge then opens the provider's
    /// authorization page in the system browser and completes the flow
    /// through the deep-link callback; the `session` signal updates once the
    /// relayed cookie arrives.
    pub async fn sign_in_social(
        &self,
        request: SignInSocialRequest,
    ) -> Result<SignInResponse, RequestError> {
        let body = serde_json::to_value(&request).context(SerdeSnafu {})?;
        let data = self.post("/sign-in/social", body).await?;
        decode_sign_in_response(data)
    }

    /// Sign out. All locally persisted auth state is cleared before the
    /// server round-trip completes.
    pub async fn sign_out(&self) -> Result<(), RequestError> {
        self.post("/sign-out", serde_json::json!({})).await?;
        Ok(())
    }

    /// The current session as the server sees it. `None` means not signed
    /// in. Successful responses refresh the offline session cache.
    pub async fn get_session(&self) -> Result<Option<SessionPayload>, RequestError> {
        let data = request::execute(
            &self.bridge,
            Method::GET,
            self.endpoint("/get-session"),
            None,
        )
        .await?;

        match data {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value).map(Some).context(SerdeSnafu {}),
        }
    }

    /// The persisted cookies as a `Cookie` header value, for attaching to
    /// manual requests against other endpoints of the same server.
    pub async fn cookie_header(&self) -> Result<String, StorageError> {
        self.bridge.cookie_header_value().await
    }

    /// The cached session payload for offline bootstrap, if any.
    pub async fn cached_session(&self) -> Result<Option<SessionPayload>, StorageError> {
        self.bridge.session_cache().load().await
    }

    /// Drop all persisted auth state (cookie jar and session cache).
    pub async fn clear_storage(&self) -> Result<(), StorageError> {
        self.bridge.clear_storage().await
    }

    /// The login method the user last completed, e.g. `email` or `github`.
    pub async fn last_used_login_method(&self) -> Result<Option<String>, StorageError> {
        self.bridge.login_methods().get().await
    }

    pub async fn is_last_used_login_method(&self, method: &str) -> Result<bool, StorageError> {
        self.bridge.login_methods().is_last_used(method).await
    }

    pub async fn clear_last_used_login_method(&self) -> Result<(), StorageError> {
        self.bridge.login_methods().clear().await
    }
}

fn decode_sign_in_response(
    data: Option<serde_json::Value>,
) -> Result<SignInResponse, RequestError> {
    let value = data.unwrap_or_else(|| serde_json::json!({}));
    serde_json::from_value(value).context(SerdeSnafu {})
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assertr::prelude::*;
    use leptos::prelude::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::{Options, UseBetterAuthOptions};
    use crate::state::SessionSnapshot;
    use crate::storage::{InMemoryPreferenceStore, PreferenceStore};

    const COOKIE_KEY: &str = "better-auth_cookie";

    struct Harness {
        storage: Arc<InMemoryPreferenceStore>,
        notifications: Arc<AtomicUsize>,
        session_atom: RwSignal<SessionSnapshot>,
        client: AuthClient,
    }

    async fn harness(server: &MockServer) -> Harness {
        let storage = Arc::new(InMemoryPreferenceStore::new());
        let options = Options::new(UseBetterAuthOptions::new(
            Url::parse(&format!("{}/api/auth", server.uri())).unwrap(),
            storage.clone(),
        ));

        let notifications = Arc::new(AtomicUsize::new(0));
        let counter = notifications.clone();
        let notify = Callback::new(move |()| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let session_atom = RwSignal::new(SessionSnapshot::initial());
        let bridge = Arc::new(AuthBridge::new(&options, session_atom, notify));
        let client = AuthClient::new(options.server_url.clone(), bridge);

        Harness {
            storage,
            notifications,
            session_atom,
            client,
        }
    }

    #[tokio::test]
    async fn sign_in_persists_session_cookie_and_notifies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/sign-in/email"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(
                        "set-cookie",
                        "better-auth.session_token=abc; Max-Age=604800; Path=/; HttpOnly",
                    )
                    .set_body_json(serde_json::json!({
                        "token": "abc",
                        "user": { "id": "1", "email": "jane@example.com" },
                    })),
            )
            .mount(&server)
            .await;
        let harness = harness(&server).await;

        let response = harness
            .client
            .sign_in_email(SignInEmailRequest {
                email: "jane@example.com".to_owned(),
                password: "hunter2".to_owned(),
                remember_me: None,
                callback_url: None,
            })
            .await
            .unwrap();

        assert_that(response.token).is_equal_to(Some("abc".to_owned()));
        assert_that(harness.notifications.load(Ordering::SeqCst)).is_equal_to(1);

        let jar_json = harness.storage.get(COOKIE_KEY).await.unwrap().unwrap();
        assert_that(jar_json.contains("better-auth.session_token")).is_true();
    }

    #[tokio::test]
    async fn requests_attach_the_persisted_cookie_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/get-session"))
            .and(header("cookie", "session_token=X"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "user": { "id": "1" },
                "session": { "id": "s1" },
            })))
            .mount(&server)
            .await;
        let harness = harness(&server).await;
        harness
            .storage
            .set(COOKIE_KEY, r#"{"session_token":{"value":"X","expires":null}}"#)
            .await
            .unwrap();

        let session = harness.client.get_session().await.unwrap();
        assert_that(session.unwrap().carries_session_data()).is_true();
    }

    #[tokio::test]
    async fn anonymous_session_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/get-session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::Value::Null))
            .mount(&server)
            .await;
        let harness = harness(&server).await;

        assert_that(harness.client.get_session().await.unwrap()).is_equal_to(None);
    }

    #[tokio::test]
    async fn error_responses_are_decoded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/sign-in/email"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "code": "INVALID_EMAIL_OR_PASSWORD",
                "message": "Invalid email or password",
            })))
            .mount(&server)
            .await;
        let harness = harness(&server).await;

        let result = harness
            .client
            .sign_in_email(SignInEmailRequest {
                email: "jane@example.com".to_owned(),
                password: "wrong".to_owned(),
                remember_me: None,
                callback_url: None,
            })
            .await;

        match result {
            Err(RequestError::ErrResponse { error_response }) => {
                assert_that(error_response.code)
                    .is_equal_to(Some("INVALID_EMAIL_OR_PASSWORD".to_owned()));
                assert_that(error_response.status).is_equal_to(401);
            }
            other => panic!("Expected an error response, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_responses_never_touch_the_jar() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/sign-in/email"))
            .respond_with(
                ResponseTemplate::new(401)
                    .insert_header("set-cookie", "better-auth.session_token=evil")
                    .set_body_json(serde_json::json!({ "code": "UNAUTHORIZED" })),
            )
            .mount(&server)
            .await;
        let harness = harness(&server).await;

        let _ = harness
            .client
            .sign_in_email(SignInEmailRequest {
                email: "jane@example.com".to_owned(),
                password: "wrong".to_owned(),
                remember_me: None,
                callback_url: None,
            })
            .await;

        assert_that(harness.storage.get(COOKIE_KEY).await.unwrap()).is_equal_to(None);
        assert_that(harness.notifications.load(Ordering::SeqCst)).is_equal_to(0);
    }

    #[tokio::test]
    async fn sign_out_clears_local_state_and_session_atom() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/sign-out"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
            })))
            .mount(&server)
            .await;
        let harness = harness(&server).await;
        harness
            .storage
            .set(COOKIE_KEY, r#"{"better-auth.session_token":{"value":"X","expires":null}}"#)
            .await
            .unwrap();
        harness.session_atom.set(SessionSnapshot {
            data: Some(
                serde_json::from_value(serde_json::json!({ "user": { "id": "1" } })).unwrap(),
            ),
            error: None,
            pending: false,
        });

        harness.client.sign_out().await.unwrap();

        assert_that(harness.storage.get(COOKIE_KEY).await.unwrap()).is_equal_to(None);
        assert_that(harness.session_atom.get_untracked().data.is_none()).is_true();
    }

    #[tokio::test]
    async fn get_session_refreshes_the_offline_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/get-session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "user": { "id": "1" },
                "session": { "id": "s1" },
            })))
            .mount(&server)
            .await;
        let harness = harness(&server).await;

        harness.client.get_session().await.unwrap();

        let cached = harness.client.cached_session().await.unwrap().unwrap();
        assert_that(cached.carries_session_data()).is_true();
    }

    #[tokio::test]
    async fn login_method_is_recorded_on_successful_sign_in() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/sign-in/email"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "abc",
                "user": { "id": "1" },
            })))
            .mount(&server)
            .await;
        let harness = harness(&server).await;

        harness
            .client
            .sign_in_email(SignInEmailRequest {
                email: "jane@example.com".to_owned(),
                password: "hunter2".to_owned(),
                remember_me: None,
                callback_url: None,
            })
            .await
            .unwrap();

        assert_that(harness.client.last_used_login_method().await.unwrap())
            .is_equal_to(Some("email".to_owned()));
        assert_that(harness.client.is_last_used_login_method("email").await.unwrap()).is_true();
    }
}
