use std::sync::Arc;

use url::Url;

use crate::jar::normalize_cookie_name;
use crate::storage::{PreferenceStore, StorageError};

/// Auth request paths whose last segment names the login method used.
const METHOD_PATHS: [&str; 4] = [
    "/callback/",
    "/oauth2/callback/",
    "/sign-in/email",
    "/sign-up/email",
];

/// Derive the login method from the path of a completed auth request, e.g.
/// `/callback/github` resolves to `github` and `/sign-in/email` to `email`.
/// Returns `None` for requests that do not complete a login.
pub(crate) fn resolve_login_method(url: &Url) -> Option<String> {
    let path = url.path();

    if METHOD_PATHS.iter().any(|p| path.contains(p)) {
        return path
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .map(str::to_owned);
    }
    if path.contains("siwe") {
        return Some("siwe".to_owned());
    }
    if path.contains("/passkey/verify-authentication") {
        return Some("passkey".to_owned());
    }

    None
}

/// Remembers which login method the user last completed, so a login screen
/// can highlight it ("last used").
///
/// # Internal Use
/// This is an internal component exposed via the `internals` feature flag for
/// advanced use cases like testing or debugging.
pub struct LastLoginMethodStore {
    storage: Arc<dyn PreferenceStore>,
    key: String,
}

impl LastLoginMethodStore {
    pub(crate) fn new(storage: Arc<dyn PreferenceStore>, storage_prefix: &str) -> Self {
        Self {
            key: normalize_cookie_name(&format!("{storage_prefix}_last_login_method")),
            storage,
        }
    }

    /// Record the method derived from a completed auth request, if any.
    pub(crate) async fn record(&self, url: &Url) -> Result<(), StorageError> {
        let Some(method) = resolve_login_method(url) else {
            return Ok(());
        };
        tracing::trace!(method, "Recording last used login method.");
        self.storage.set(&self.key, &method).await
    }

    pub async fn get(&self) -> Result<Option<String>, StorageError> {
        self.storage.get(&self.key).await
    }

    pub async fn is_last_used(&self, method: &str) -> Result<bool, StorageError> {
        Ok(self.get().await?.as_deref() == Some(method))
    }

    pub async fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove(&self.key).await
    }
}
