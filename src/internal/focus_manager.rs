use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};

use crate::platform::{AppEvents, ListenerHandle};

type FocusListener = Arc<dyn Fn(bool) + Send + Sync>;

/// Deduplicating fan-out for app foreground/background transitions.
///
/// Consumed by the session refetch scheduler: returning to the foreground is
/// the moment to check whether the session changed while the app was away.
/// Transitions are deduplicated so that a platform re-reporting the current
/// state does not cause redundant refetches.
///
/// # Internal Use
/// This is an internal component exposed via the `internals` feature flag for
/// advanced use cases like testing or debugging.
pub struct FocusManager {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    /// `None` until the platform reported the first transition.
    focused: Option<bool>,
    listeners: HashMap<u64, FocusListener>,
    next_listener_id: u64,
    platform: Option<ListenerHandle>,
    setup_done: bool,
}

impl FocusManager {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Register `listener` for focus transitions. Multiple independent
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

    /// Feed a foreground/background transition into the manager. Listeners
    /// are only invoked when the state actually changes.
    pub fn set_focused(&self, focused: bool) {
        let listeners: Vec<FocusListener> = {
            let mut state = self.state();
            if state.focused == Some(focused) {
                return;
            }
            state.focused = Some(focused);
            state.listeners.values().cloned().collect()
        };

        tracing::trace!(focused, "App focus changed.");
        for listener in listeners {
            listener(focused);
        }
    }

    pub fn is_focused(&self) -> Option<bool> {
        self.state().focused
    }

    /// One-time platform wiring. Later calls are no-ops, so any number of
    /// call sites may share this manager. Without an app-events capability
    /// the manager simply never fires.
    pub(crate) fn setup(self: &Arc<Self>, app_events: Option<&Arc<dyn AppEvents>>) {
        {
            let mut state = self.state();
            if state.setup_done {
                return;
            }
            state.setup_done = true;
        }

        let Some(app_events) = app_events else {
            tracing::debug!("No app-events capability. Focus transitions will never fire.");
            return;
        };

        let manager = Arc::downgrade(self);
        let handle = app_events.on_state_change(Box::new(move |active| {
            if let Some(manager) = Weak::upgrade(&manager) {
                manager.set_focused(active);
            }
        }));
        self.state().platform = Some(handle);
    }
}

static FOCUS_MANAGER: OnceLock<Arc<FocusManager>> = OnceLock::new();

/// The process-wide [`FocusManager`].
///
/// The first caller constructs it; all later callers share the same instance,
/// its listener set and its single underlying platform subscription.
pub fn focus_manager() -> Arc<FocusManager> {
    Arc::clone(FOCUS_MANAGER.get_or_init(|| Arc::new(FocusManager::new())))
}
