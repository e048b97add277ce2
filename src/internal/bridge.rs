use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};

use http::{HeaderValue, header};
use leptos::prelude::*;
use snafu::ResultExt;
use url::Url;

use crate::config::Options;
use crate::internal::last_login_method::LastLoginMethodStore;
use crate::internal::oauth_state::extract_oauth_state;
use crate::internal::session_cache::SessionCache;
use crate::jar::{
    CookieJar, has_relevant_cookies, has_session_cookie_changed, normalize_cookie_name,
};
use crate::platform::{AppEvents, CapabilityError, ExternalBrowser};
use crate::request::{
    CapabilitySnafu, RequestError, RequestInit, ResponseContext, StorageSnafu,
    combined_set_cookie_header,
};
use crate::state::SessionSnapshot;
use crate::storage::{PreferenceStore, StorageError};

/// Response header carrying a bearer token, for transports that cannot use
/// real cookies. Treated exactly like a `Set-Cookie` for the session token.
const AUTH_TOKEN_HEADER: &str = "set-auth-token";

/// Identifies the native shell origin to the server.
const SHELL_ORIGIN_HEADER: &str = "capacitor-origin";

/// Tells the server to hand back raw authorization URLs instead of proxying
/// redirects itself.
const SKIP_OAUTH_PROXY_HEADER: &str = "x-skip-oauth-proxy";

/// Server route that relays an OAuth redirect back into the app.
const AUTHORIZATION_PROXY_PATH: &str = "/expo-authorization-proxy";

/// Body fields that may carry app-relative callback URLs.
const CALLBACK_URL_FIELDS: [&str; 3] = ["callbackURL", "newUserCallbackURL", "errorCallbackURL"];

/// The fetch interceptor wrapping every request to the auth server.
///
/// Before a request goes out, the persisted cookie jar is serialized into its
/// `Cookie` header. After a successful response, `Set-Cookie` and auth-token
/// headers are folded back into the jar, the offline session cache is
/// maintained, and redirect-based OAuth flows are bridged through the system
/// browser and a deep-link listener.
///
/// Note on concurrency: the jar is read-merged-written per response. Two
/// responses completing out of order can lose one cookie update. The
/// underlying store offers no compare-and-swap, so this remains an accepted,
/// low-consequence race; the next response heals the jar.
pub(crate) struct AuthBridge {
    storage: Arc<dyn PreferenceStore>,
    app_events: Option<Arc<dyn AppEvents>>,
    browser: Option<Arc<dyn ExternalBrowser>>,
    cookie_prefixes: Vec<String>,
    scheme: Option<String>,
    disable_session_cache: bool,
    track_login_method: bool,
    cookie_key: String,
    session_cache: SessionCache,
    login_methods: LastLoginMethodStore,

    /// In-memory session state, flipped synchronously on sign-out.
    session_atom: RwSignal<SessionSnapshot>,

    /// Channel into the session layer: "the cached session is stale,
    /// refetch it".
    notify_session_changed: Callback<()>,

    /// At most one deep-link listener is live at a time. A freshly started
    /// redirect flow replaces any unresolved one.
    pending_oauth: Mutex<Option<PendingOAuth>>,
}

struct PendingOAuth {
    callback_url: Option<String>,
    handle: crate::platform::ListenerHandle,
}

impl Debug for AuthBridge {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthBridge")
            .field("cookie_prefixes", &self.cookie_prefixes)
            .field("scheme", &self.scheme)
            .field("disable_session_cache", &self.disable_session_cache)
            .field("track_login_method", &self.track_login_method)
            .field("cookie_key", &self.cookie_key)
            .finish_non_exhaustive()
    }
}

impl AuthBridge {
    pub(crate) fn new(
        options: &Options,
        session_atom: RwSignal<SessionSnapshot>,
        notify_session_changed: Callback<()>,
    ) -> Self {
        Self {
            storage: options.storage.clone(),
            app_events: options.platform.app_events.clone(),
            browser: options.platform.browser.clone(),
            cookie_prefixes: options.cookie_prefixes.clone(),
            scheme: options.scheme.clone(),
            disable_session_cache: options.advanced.disable_session_cache,
            track_login_method: options.advanced.track_login_method,
            cookie_key: normalize_cookie_name(&format!("{}_cookie", options.storage_prefix)),
            session_cache: SessionCache::new(options.storage.clone(), &options.storage_prefix),
            login_methods: LastLoginMethodStore::new(
                options.storage.clone(),
                &options.storage_prefix,
            ),
            session_atom,
            notify_session_changed,
            pending_oauth: Mutex::new(None),
        }
    }

    pub(crate) fn session_cache(&self) -> &SessionCache {
        &self.session_cache
    }

    pub(crate) fn login_methods(&self) -> &LastLoginMethodStore {
        &self.login_methods
    }

    /// Serialize the persisted jar into a `Cookie` request header value.
    pub(crate) async fn cookie_header_value(&self) -> Result<String, StorageError> {
        let jar_json = self.storage.get(&self.cookie_key).await?;
        Ok(jar_json
            .as_deref()
            .map(CookieJar::from_json)
            .unwrap_or_default()
            .header_value())
    }

    /// Drop all persisted auth state.
    pub(crate) async fn clear_storage(&self) -> Result<(), StorageError> {
        self.storage.remove(&self.cookie_key).await?;
        self.session_cache.clear().await
    }

    /// Pre-request hook: attach the persisted cookies and shell
    /// identification headers, and clear all auth state when the request is
    /// about to sign out.
    pub(crate) async fn init(
        &self,
        url: &Url,
        mut init: RequestInit,
    ) -> Result<RequestInit, RequestError> {
        let cookie = self.cookie_header_value().await.context(StorageSnafu {})?;
        if !cookie.is_empty() {
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    init.headers.insert(header::COOKIE, value);
                }
                Err(err) => {
                    tracing::warn!(
                        ?err,
                        "Stored cookies do not form a valid `Cookie` header. Not attaching them."
                    );
                }
            }
        }

        if let Some(scheme) = &self.scheme {
            if let Ok(value) = HeaderValue::from_str(&format!("{scheme}://")) {
                init.headers.insert(SHELL_ORIGIN_HEADER, value);
            }
            init.headers
                .insert(SKIP_OAUTH_PROXY_HEADER, HeaderValue::from_static("true"));

            if let Some(body) = init.body.as_mut() {
                rewrite_callback_urls(body, scheme);
            }
        }

        if url.path().contains("/sign-out") {
            // Clear everything before the round-trip completes. Even a slow
            // or failing network call must not leave a stale session
            // readable.
            self.storage
                .remove(&self.cookie_key)
                .await
                .context(StorageSnafu {})?;
            self.session_cache.clear().await.context(StorageSnafu {})?;
            self.session_atom.set(SessionSnapshot::signed_out());
        }

        Ok(init)
    }

    /// Post-response hook. Steps are strictly sequential; later steps depend
    /// on earlier writes having completed.
    pub(crate) async fn on_success(
        self: &Arc<Self>,
        ctx: ResponseContext<'_>,
    ) -> Result<(), RequestError> {
        if let Some(token) = ctx
            .headers
            .get(AUTH_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            && !token.is_empty()
        {
            let prefix = self.cookie_prefixes[0].as_str();
            let pseudo_cookie = format!("{prefix}.session_token={token}");
            let changed = self
                .merge_into_jar(&pseudo_cookie)
                .await
                .context(StorageSnafu {})?;
            if changed {
                self.notify_session_changed.run(());
            }
        }

        if let Some(set_cookie) = combined_set_cookie_header(ctx.headers) {
            if has_relevant_cookies(&set_cookie, &self.cookie_prefixes) {
                let changed = self
                    .merge_into_jar(&set_cookie)
                    .await
                    .context(StorageSnafu {})?;
                if changed {
                    self.notify_session_changed.run(());
                }
            } else {
                tracing::trace!("`Set-Cookie` header carries no auth cookies. Skipping it.");
            }
        }

        if ctx.request_url.path().contains("/get-session")
            && !self.disable_session_cache
            && let Some(data) = ctx.data
            && carries_session_data(data)
        {
            self.session_cache.save(data).await.context(StorageSnafu {})?;
        }

        if self.track_login_method {
            self.login_methods
                .record(ctx.request_url)
                .await
                .context(StorageSnafu {})?;
        }

        if let Some(data) = ctx.data
            && data
                .get("redirect")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false)
            && is_redirect_sign_in_request(ctx.request_url, ctx.request_body)
            && self.scheme.is_some()
        {
            self.begin_redirect_sign_in(ctx.request_url, ctx.request_body, data)
                .await?;
        }

        Ok(())
    }

    /// Read-merge-write the persisted jar. Returns whether a session-relevant
    /// cookie value changed. The jar is persisted even without such a change
    /// to keep expiry bookkeeping fresh.
    async fn merge_into_jar(&self, set_cookie: &str) -> Result<bool, StorageError> {
        let prev = self.storage.get(&self.cookie_key).await?;
        let mut jar = prev.as_deref().map(CookieJar::from_json).unwrap_or_default();
        jar.merge_set_cookie(set_cookie);
        let next = jar.to_json();
        self.storage.set(&self.cookie_key, &next).await?;
        Ok(has_session_cookie_changed(prev.as_deref(), &next))
    }

    /// Open the provider's authorization page in the system browser and
    /// register a one-shot deep-link listener that recovers the session
    /// cookie from the callback URL.
    async fn begin_redirect_sign_in(
        self: &Arc<Self>,
        request_url: &Url,
        request_body: Option<&serde_json::Value>,
        data: &serde_json::Value,
    ) -> Result<(), RequestError> {
        let Some(authorization_url) = data.get("url").and_then(serde_json::Value::as_str) else {
            tracing::warn!("Redirect-based sign-in response carried no authorization URL.");
            return Ok(());
        };

        // This path cannot degrade gracefully: without a browser and deep
        // links there is no way to complete the flow.
        let browser = self
            .browser
            .clone()
            .ok_or(CapabilityError::Unavailable {
                capability: "ExternalBrowser",
            })
            .context(CapabilitySnafu {})?;
        let app_events = self
            .app_events
            .clone()
            .ok_or(CapabilityError::Unavailable {
                capability: "AppEvents",
            })
            .context(CapabilitySnafu {})?;

        let jar_json = self
            .storage
            .get(&self.cookie_key)
            .await
            .context(StorageSnafu {})?;
        let oauth_state = extract_oauth_state(jar_json.as_deref(), &self.cookie_prefixes);

        let mut proxy_url = request_url.clone();
        proxy_url.set_path(AUTHORIZATION_PROXY_PATH);
        proxy_url.set_query(None);
        proxy_url.set_fragment(None);
        {
            let mut query = proxy_url.query_pairs_mut();
            query.append_pair("authorizationURL", authorization_url);
            if let Some(state) = &oauth_state {
                query.append_pair("oauthState", state);
            }
        }

        let callback_url = request_body
            .and_then(|body| body.get("callbackURL"))
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned);

        tracing::trace!(%proxy_url, "Opening external browser for redirect-based sign-in.");
        browser.open(&proxy_url).await.context(CapabilitySnafu {})?;

        if let Some(stale) = self.pending().take() {
            tracing::debug!(
                "Replacing the unresolved deep-link listener of a previous sign-in attempt."
            );
            stale.handle.remove();
        }

        let bridge = Arc::clone(self);
        let handle = app_events.on_url_open(Box::new(move |url| {
            let bridge = Arc::clone(&bridge);
            let url = url.to_owned();
            leptos::task::spawn_local(async move {
                if let Err(err) = bridge.complete_redirect_sign_in(&url).await {
                    tracing::error!(?err, "Could not process deep-link callback.");
                }
            });
        }));
        *self.pending() = Some(PendingOAuth {
            callback_url,
            handle,
        });

        Ok(())
    }

    /// Handle a deep link while a redirect flow is pending. Unrelated links
    /// leave the flow untouched; the completing link merges the relayed
    /// cookie, notifies the session layer, closes the browser and removes
    /// the listener, each exactly once.
    pub(crate) async fn complete_redirect_sign_in(&self, url: &str) -> Result<(), RequestError> {
        let Ok(parsed) = Url::parse(url) else {
            tracing::debug!(url, "Ignoring deep link that is not a valid URL.");
            return Ok(());
        };

        let cookie_param = parsed
            .query_pairs()
            .find(|(name, _)| name == "cookie")
            .map(|(_, value)| value.into_owned());

        let matches_callback = self
            .pending()
            .as_ref()
            .and_then(|pending| pending.callback_url.clone())
            .is_some_and(|callback| deep_link_matches(&callback, url, &parsed));

        if cookie_param.is_none() && !matches_callback {
            return Ok(());
        }

        if let Some(cookie) = cookie_param {
            self.merge_into_jar(&cookie).await.context(StorageSnafu {})?;
            self.notify_session_changed.run(());
        }

        let Some(pending) = self.pending().take() else {
            return Ok(());
        };
        if let Some(browser) = &self.browser
            && let Err(err) = browser.close().await
        {
            tracing::debug!(?err, "Could not close the external browser. It may already be closed.");
        }
        pending.handle.remove();

        Ok(())
    }

    fn pending(&self) -> MutexGuard<'_, Option<PendingOAuth>> {
        self.pending_oauth
            .lock()
            .unwrap_or_else(|err| err.into_inner())
    }
}

fn rewrite_callback_urls(body: &mut serde_json::Value, scheme: &str) {
    for field in CALLBACK_URL_FIELDS {
        if let Some(value) = body.get_mut(field) {
            if let Some(path) = value.as_str().filter(|path| path.starts_with('/')) {
                let deep_link = format!("{scheme}:/{path}");
                *value = serde_json::Value::String(deep_link);
            }
        }
    }
}

fn carries_session_data(data: &serde_json::Value) -> bool {
    let field_present =
        |name: &str| data.get(name).is_some_and(|value| !value.is_null());
    field_present("user") || field_present("session")
}

fn is_redirect_sign_in_request(url: &Url, body: Option<&serde_json::Value>) -> bool {
    let path = url.path();
    (path.contains("/sign-in") || path.contains("/link-social"))
        && body.is_none_or(|body| body.get("idToken").is_none())
}

fn deep_link_matches(callback: &str, raw_url: &str, parsed: &Url) -> bool {
    if callback.starts_with('/') {
        parsed.path() == callback
    } else {
        raw_url.starts_with(callback)
    }
}
