use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};

use crate::platform::{ListenerHandle, NetworkEvents};

type OnlineListener = Arc<dyn Fn(bool) + Send + Sync>;

/// Deduplicating fan-out for network connectivity transitions.
///
/// Consumed by the session refetch scheduler: regaining connectivity is the
/// moment to resynchronize the session, while refetches are suppressed
/// entirely when offline. Transitions are deduplicated so that a platform
/// re-reporting the current state does not cause redundant refetches.
///
/// # Internal Use
/// This is an internal component exposed via the `internals` feature flag for
/// advanced use cases like testing or debugging.
pub struct OnlineManager {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    /// `None` until the platform reported the first transition.
    online: Option<bool>,
    listeners: HashMap<u64, OnlineListener>,
    next_listener_id: u64,
    platform: Option<ListenerHandle>,
    setup_done: bool,
}

impl OnlineManager {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Register `listener` for connectivity transitions. Multiple independent
    /// subscribers are supported; the returned handle removes only this one.
    pub fn subscribe(
        self: &Arc<Self>,
        listener: impl Fn(bool) + Send + Sync + 'static,
    ) -> ListenerHandle {
        let id = {
            let mut state = self.state();
            let id = state.next_listener_id;
            state.next_listener_id += 1;
            state.listeners.insert(id, Arc::new(listener));
            id
        };

        let manager = Arc::downgrade(self);
        ListenerHandle::new(move || {
            if let Some(manager) = Weak::upgrade(&manager) {
                manager.state().listeners.remove(&id);
            }
        })
    }

    /// Feed a connectivity transition into the manager. Listeners are only
    /// invoked when the state actually changes.
    pub fn set_online(&self, online: bool) {
        let listeners: Vec<OnlineListener> = {
            let mut state = self.state();
            if state.online == Some(online) {
                return;
            }
            state.online = Some(online);
            state.listeners.values().cloned().collect()
        };

        tracing::trace!(online, "Network connectivity changed.");
        for listener in listeners {
            listener(online);
        }
    }

    /// Whether the device is currently considered online. Unknown
    /// connectivity counts as online.
    pub fn is_online(&self) -> bool {
        self.state().online.unwrap_or(true)
    }

    /// One-time platform wiring. Later calls are no-ops, so any number of
    /// call sites may share this manager. Without a network-events capability
    /// the manager falls back to "always online".
    pub(crate) fn setup(self: &Arc<Self>, network_events: Option<&Arc<dyn NetworkEvents>>) {
        {
            let mut state = self.state();
            if state.setup_done {
                return;
            }
            state.setup_done = true;
        }

        let Some(network_events) = network_events else {
            tracing::debug!("No network-events capability. Assuming the device is always online.");
            self.set_online(true);
            return;
        };

        let manager = Arc::downgrade(self);
        let handle = network_events.on_connectivity_change(Box::new(move |online| {
            if let Some(manager) = Weak::upgrade(&manager) {
                manager.set_online(online);
            }
        }));
        self.state().platform = Some(handle);
    }
}

static ONLINE_MANAGER: OnceLock<Arc<OnlineManager>> = OnceLock::new();

/// The process-wide [`OnlineManager`].
///
/// The first caller constructs it; all later callers share the same instance,
/// its listener set and its single underlying platform subscription.
pub fn online_manager() -> Arc<OnlineManager> {
    Arc::clone(ONLINE_MANAGER.get_or_init(|| Arc::new(OnlineManager::new())))
}
