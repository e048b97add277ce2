use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::platform::PlatformCapabilities;
use crate::storage::PreferenceStore;

/// Default prefix for preference-store keys and server cookie names.
pub const DEFAULT_PREFIX: &str = "better-auth";

/// Represents the parameters required for initializing the auth integration:
/// where the auth server lives, where persisted state goes, and which
/// capabilities the hosting shell provides.
pub struct UseBetterAuthOptions {
    /// Base URL of the auth server's API, e.g. `https://app.example.com/api/auth`.
    pub server_url: Url,

    /// Persistent key-value storage for the cookie jar and the offline
    /// session cache.
    pub storage: Arc<dyn PreferenceStore>,

    /// Capabilities of the hosting shell. Leave at `Default` on plain web
    /// targets.
    pub platform: PlatformCapabilities,

    /// Prefix for preference-store keys.
    /// Defaults to [`DEFAULT_PREFIX`].
    pub storage_prefix: String,

    /// Prefix(es) of the server's cookie names, in priority order. Only
    /// `Set-Cookie` headers matching one of these are processed, which keeps
    /// third-party cookies (e.g. CDN bot mitigation) from triggering session
    /// refetches.
    /// Defaults to `[DEFAULT_PREFIX]`.
    pub cookie_prefixes: Vec<String>,

    /// Deep-link scheme of the app, e.g. `myapp`. Required for redirect-based
    /// OAuth sign-in. Without it, requests are sent without shell
    /// identification headers and redirect flows are not bridged.
    pub scheme: Option<String>,

    pub advanced: AdvancedOptions,
}

impl UseBetterAuthOptions {
    /// Options with recommended defaults for everything but `server_url` and
    /// `storage`.
    pub fn new(server_url: Url, storage: Arc<dyn PreferenceStore>) -> Self {
        Self {
            server_url,
            storage,
            platform: PlatformCapabilities::default(),
            storage_prefix: DEFAULT_PREFIX.to_owned(),
            cookie_prefixes: vec![DEFAULT_PREFIX.to_owned()],
            scheme: None,
            advanced: AdvancedOptions::default(),
        }
    }
}

impl Debug for UseBetterAuthOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UseBetterAuthOptions")
            .field("server_url", &self.server_url)
            .field("platform", &self.platform)
            .field("storage_prefix", &self.storage_prefix)
            .field("cookie_prefixes", &self.cookie_prefixes)
            .field("scheme", &self.scheme)
            .field("advanced", &self.advanced)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct AdvancedOptions {
    /// Disable the offline session cache. The session is then only ever read
    /// from the server.
    /// Defaults to `false`.
    pub disable_session_cache: bool,

    /// Remember which login method the user last completed, so login screens
    /// can highlight it.
    /// Defaults to `true`.
    pub track_login_method: bool,

    /// Refetch the session whenever the app returns to the foreground.
    /// Defaults to `true`.
    pub refetch_on_focus: bool,

    /// Refetch the session whenever network connectivity is regained.
    /// Defaults to `true`.
    pub refetch_on_reconnect: bool,

    /// Additionally refetch the session on a fixed interval while online.
    /// Defaults to `None` (disabled).
    pub session_refetch_interval: Option<Duration>,
}

impl Default for AdvancedOptions {
    fn default() -> Self {
        Self {
            disable_session_cache: false,
            track_login_method: true,
            refetch_on_focus: true,
            refetch_on_reconnect: true,
            session_refetch_interval: None,
        }
    }
}

pub(crate) struct Options {
    pub(crate) server_url: Url,
    pub(crate) storage: Arc<dyn PreferenceStore>,
    pub(crate) platform: PlatformCapabilities,
    pub(crate) storage_prefix: String,
    pub(crate) cookie_prefixes: Vec<String>,
    pub(crate) scheme: Option<String>,
    pub(crate) advanced: AdvancedOptions,
}

impl Options {
    pub(crate) fn new(options: UseBetterAuthOptions) -> Self {
        let UseBetterAuthOptions {
            server_url,
            storage,
            platform,
            mut storage_prefix,
            mut cookie_prefixes,
            scheme,
            advanced,
        } = options;

        if storage_prefix.is_empty() {
            storage_prefix = DEFAULT_PREFIX.to_owned();
        }
        if cookie_prefixes.is_empty() {
            cookie_prefixes = vec![DEFAULT_PREFIX.to_owned()];
        }

        Self {
            server_url,
            storage,
            platform,
            storage_prefix,
            cookie_prefixes,
            scheme,
            advanced,
        }
    }
}

impl Debug for Options {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("server_url", &self.server_url)
            .field("platform", &self.platform)
            .field("storage_prefix", &self.storage_prefix)
            .field("cookie_prefixes", &self.cookie_prefixes)
            .field("scheme", &self.scheme)
            .field("advanced", &self.advanced)
            .finish_non_exhaustive()
    }
}
