use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use snafu::Snafu;

/// An error resulting from operations on a [`PreferenceStore`].
#[derive(Debug, Snafu)]
pub enum StorageError {
    #[snafu(display("StorageError: Backend error: {message}"))]
    Backend { message: String },
}

impl StorageError {
    pub fn backend(message: impl Into<String>) -> Self {
        StorageError::Backend {
            message: message.into(),
        }
    }
}

/// Asynchronous key-value storage backing the cookie jar, the offline session
/// cache and the last-login-method slot.
///
/// String keys, string values; all JSON encoding is done by this crate.
/// Implement this against whatever persistent preference storage the hosting
/// shell provides (a native bridge, `localStorage`, an SQLite file, ...).
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Retrieve the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, overwriting any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove the value stored under `key`. Removing an absent key is not an
    /// error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Non-persistent [`PreferenceStore`]. Useful in tests, and on plain web
/// targets where the webview's own cookie handling already does the right
/// thing and nothing needs to survive a reload.
#[derive(Debug, Default)]
pub struct InMemoryPreferenceStore {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|err| err.into_inner())
    }
}

#[async_trait]
impl PreferenceStore for InMemoryPreferenceStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assertr::prelude::*;

    use super::*;

    #[tokio::test]
    async fn in_memory_store_roundtrip() {
        let store = InMemoryPreferenceStore::new();

        assert_that(store.get("key").await.unwrap()).is_equal_to(None);

        store.set("key", "value").await.unwrap();
        assert_that(store.get("key").await.unwrap()).is_equal_to(Some("value".to_owned()));

        store.remove("key").await.unwrap();
        assert_that(store.get("key").await.unwrap()).is_equal_to(None);
    }

    #[tokio::test]
    async fn removing_absent_key_is_not_an_error() {
        let store = InMemoryPreferenceStore::new();
        store.remove("never-set").await.unwrap();
    }
}
