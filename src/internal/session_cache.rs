use std::sync::Arc;

use crate::jar::normalize_cookie_name;
use crate::response::SessionPayload;
use crate::storage::{PreferenceStore, StorageError};

/// Persists the last successful session payload so the app can boot into an
/// authenticated state while offline.
///
/// # Internal Use
/// This is an internal component exposed via the `internals` feature flag for
/// advanced use cases like testing or debugging.
pub struct SessionCache {
    storage: Arc<dyn PreferenceStore>,
    key: String,
}

impl SessionCache {
    pub(crate) fn new(storage: Arc<dyn PreferenceStore>, storage_prefix: &str) -> Self {
        Self {
            key: normalize_cookie_name(&format!("{storage_prefix}_session_data")),
            storage,
        }
    }

    /// Store a session payload verbatim.
    ///
    /// Callers must only pass bodies of successful session fetches that
    /// actually carry a user or session; anything else would poison the
    /// offline bootstrap.
    pub async fn save(&self, payload: &serde_json::Value) -> Result<(), StorageError> {
        self.storage.set(&self.key, &payload.to_string()).await
    }

    /// The cached payload, if any. A corrupted cache entry reads as absent.
    pub async fn load(&self) -> Result<Option<SessionPayload>, StorageError> {
        let Some(raw) = self.storage.get(&self.key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(payload) => Ok(Some(payload)),
            Err(err) => {
                tracing::debug!(?err, "Could not parse cached session. Ignoring it.");
                Ok(None)
            }
        }
    }

    pub async fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove(&self.key).await
    }
}

#[cfg(test)]
mod tests {
    use assertr::prelude::*;

    use super::*;
    use crate::storage::InMemoryPreferenceStore;

    fn cut() -> (Arc<InMemoryPreferenceStore>, SessionCache) {
        let storage = Arc::new(InMemoryPreferenceStore::new());
        let cache = SessionCache::new(storage.clone(), "better-auth");
        (storage, cache)
    }

    #[tokio::test]
    async fn save_load_clear_roundtrip() {
        let (_, cache) = cut();

        assert_that(cache.load().await.unwrap()).is_equal_to(None);

        let payload = serde_json::json!({ "user": { "id": "1" }, "session": { "id": "s1" } });
        cache.save(&payload).await.unwrap();

        let loaded = cache.load().await.unwrap().unwrap();
        assert_that(loaded.carries_session_data()).is_true();

        cache.clear().await.unwrap();
        assert_that(cache.load().await.unwrap()).is_equal_to(None);
    }

    #[tokio::test]
    async fn corrupted_cache_reads_as_absent() {
        let (storage, cache) = cut();
        storage
            .set("better-auth_session_data", "not json")
            .await
            .unwrap();

        assert_that(cache.load().await.unwrap()).is_equal_to(None);
    }

    #[tokio::test]
    async fn storage_key_is_normalized() {
        let storage = Arc::new(InMemoryPreferenceStore::new());
        let cache = SessionCache::new(storage.clone(), "my:app");
        cache.save(&serde_json::json!({ "user": {} })).await.unwrap();

        assert_that(storage.get("my_app_session_data").await.unwrap().is_some()).is_true();
    }
}
