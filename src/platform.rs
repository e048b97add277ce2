//! Optional capabilities of the hosting shell.
//!
//! A mobile webview shell typically provides app-lifecycle events, network
//! connectivity events, deep-link notifications and a system browser. None of
//! them are required: every capability is modeled as a trait held in an
//! `Option`, and callers branch on presence instead of failing at startup.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use snafu::Snafu;
use url::Url;

#[derive(Debug, Snafu)]
pub enum CapabilityError {
    #[snafu(display("CapabilityError: No `{capability}` capability was configured"))]
    Unavailable { capability: &'static str },

    #[snafu(display("CapabilityError: Platform error: {message}"))]
    Platform { message: String },
}

impl CapabilityError {
    pub fn platform(message: impl Into<String>) -> Self {
        CapabilityError::Platform {
            message: message.into(),
        }
    }
}

/// Handle to a registered listener. Calling [`ListenerHandle::remove`]
/// unregisters the listener; dropping the handle keeps it registered.
pub struct ListenerHandle(Option<Box<dyn FnOnce() + Send + Sync>>);

impl ListenerHandle {
    pub fn new(remove: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self(Some(Box::new(remove)))
    }

    /// A handle whose removal does nothing.
    pub fn noop() -> Self {
        Self(None)
    }

    pub fn remove(mut self) {
        if let Some(remove) = self.0.take() {
            remove();
        }
    }
}

impl Debug for ListenerHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ListenerHandle")
            .field(&self.0.as_ref().map(|_| "..."))
            .finish()
    }
}

/// App lifecycle and deep-link events from the hosting shell.
pub trait AppEvents: Send + Sync {
    /// Register `listener` for foreground/background transitions. It receives
    /// `true` whenever the app enters the foreground.
    fn on_state_change(&self, listener: Box<dyn Fn(bool) + Send + Sync>) -> ListenerHandle;

    /// Register `listener` for every URL the app is opened with (deep links).
    fn on_url_open(&self, listener: Box<dyn Fn(&str) + Send + Sync>) -> ListenerHandle;
}

/// Network connectivity events from the hosting shell.
pub trait NetworkEvents: Send + Sync {
    /// Register `listener` for connectivity transitions. It receives `true`
    /// when connectivity is gained and `false` when it is lost.
    fn on_connectivity_change(&self, listener: Box<dyn Fn(bool) + Send + Sync>) -> ListenerHandle;
}

/// The system browser, used for redirect-based OAuth sign-in. The flow opens
/// the provider's authorization page outside the webview and resumes through
/// a deep link.
#[async_trait]
pub trait ExternalBrowser: Send + Sync {
    async fn open(&self, url: &Url) -> Result<(), CapabilityError>;

    /// Close a browser previously opened with [`ExternalBrowser::open`].
    /// Closing an already-closed browser is not an error.
    async fn close(&self) -> Result<(), CapabilityError>;
}

/// The capabilities a hosting shell may provide. All default to absent.
///
/// Without `network_events` the library assumes it is always online. Without
/// `app_events` foreground refetching and deep-link completion never trigger.
/// Without `browser` the redirect-based OAuth sign-in path fails when it is
/// actually taken; everything else degrades silently.
#[derive(Clone, Default)]
pub struct PlatformCapabilities {
    pub app_events: Option<Arc<dyn AppEvents>>,
    pub network_events: Option<Arc<dyn NetworkEvents>>,
    pub browser: Option<Arc<dyn ExternalBrowser>>,
}

impl Debug for PlatformCapabilities {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        fn presence<T>(opt: &Option<T>) -> &'static str {
            match opt {
                Some(_) => "present",
                None => "absent",
            }
        }
        f.debug_struct("PlatformCapabilities")
            .field("app_events", &presence(&self.app_events))
            .field("network_events", &presence(&self.network_events))
            .field("browser", &presence(&self.browser))
            .finish()
    }
}
