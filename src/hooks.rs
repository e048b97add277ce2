use std::sync::Arc;

use leptos::prelude::*;

use crate::action;
use crate::client::AuthClient;
use crate::config::{Options, UseBetterAuthOptions};
use crate::internal::bridge::AuthBridge;
use crate::state::{BetterAuth, SessionSnapshot};

/// Initializes a new [`BetterAuth`] instance, the authentication handler
/// responsible for session tracking, offline cookie persistence and the
/// mobile OAuth bridge, with the provided parameters.
pub fn use_better_auth(options: UseBetterAuthOptions) -> BetterAuth {
    tracing::trace!("Initializing better-auth integration...");

    let options = Options::new(options);

    let session_atom = RwSignal::new(SessionSnapshot::initial());

    // The bridge and the refetch action depend on each other. The stale
    // counter breaks the cycle: the bridge bumps it, the effect below turns
    // every bump into a refetch.
    let (session_stale, set_session_stale) = signal(0u64);
    let notify_session_changed = Callback::new(move |()| {
        set_session_stale.update(|version| *version += 1);
    });

    let bridge = Arc::new(AuthBridge::new(
        &options,
        session_atom,
        notify_session_changed,
    ));
    let client = AuthClient::new(options.server_url.clone(), Arc::clone(&bridge));

    let options = StoredValue::new(options);
    let client = StoredValue::new(client);

    let refetch_session_action = action::create_refetch_session_action(client, session_atom);
    let sign_out_action = action::create_sign_out_action(client);

    Effect::new(move |_| {
        if session_stale.get() > 0 {
            tracing::trace!("Session cookies changed. Refetching session.");
            refetch_session_action.dispatch(());
        }
    });

    #[cfg(not(feature = "ssr"))]
    setup_schedulers_and_bootstrap(options, client, session_atom, refetch_session_action);

    let is_authenticated = Memo::new(move |_| session_atom.read().user().is_some());

    let auth = BetterAuth {
        options,
        session: session_atom.into(),
        is_authenticated: is_authenticated.into(),
        client,
        trigger_refetch: Callback::new(move |()| {
            refetch_session_action.dispatch(());
        }),
        trigger_sign_out: Callback::new(move |()| {
            sign_out_action.dispatch(());
        }),
    };

    // We guarantee that the BetterAuth state is provided as context.
    provide_context(auth);

    auth
}

/// Wire the process-wide focus/online managers into the refetch scheduler and
/// bootstrap the session from the offline cache.
#[cfg(not(feature = "ssr"))]
fn setup_schedulers_and_bootstrap(
    options: StoredValue<Options>,
    client: StoredValue<AuthClient>,
    session_atom: RwSignal<SessionSnapshot>,
    refetch_session_action: Action<(), ()>,
) {
    use leptos_use::{UseIntervalReturn, use_interval};

    use crate::internal::focus_manager::focus_manager;
    use crate::internal::online_manager::online_manager;
    use crate::platform::ListenerHandle;

    let advanced = options.with_value(|options| options.advanced.clone());

    let focus_mgr = focus_manager();
    let online_mgr = online_manager();
    options.with_value(|options| {
        focus_mgr.setup(options.platform.app_events.as_ref());
        online_mgr.setup(options.platform.network_events.as_ref());
    });

    let subscriptions = StoredValue::new(Vec::<ListenerHandle>::new());

    if advanced.refetch_on_focus {
        let online = Arc::clone(&online_mgr);
        let handle = focus_mgr.subscribe(move |focused| {
            if focused && online.is_online() {
                tracing::trace!("App came to the foreground. Refetching session.");
                refetch_session_action.dispatch(());
            }
        });
        subscriptions.write_value().push(handle);
    }

    if advanced.refetch_on_reconnect {
        let handle = online_mgr.subscribe(move |online| {
            if online {
                tracing::trace!("Connectivity regained. Refetching session.");
                refetch_session_action.dispatch(());
            }
        });
        subscriptions.write_value().push(handle);
    }

    on_cleanup(move || {
        for handle in subscriptions.write_value().drain(..) {
            handle.remove();
        }
    });

    if let Some(interval) = advanced.session_refetch_interval {
        let UseIntervalReturn { counter, .. } = use_interval::<u64>(
            interval
                .as_millis()
                .try_into()
                .expect("Millis to not overflow a u64"),
        );
        let online = Arc::clone(&online_mgr);
        Effect::new(move |_| {
            if counter.get() > 0 && online.is_online() {
                refetch_session_action.dispatch(());
            }
        });
    }

    // Bootstrap: surface the cached session immediately, then ask the server
    // (when reachable). While offline, the cached session is all we have.
    let online = Arc::clone(&online_mgr);
    leptos::task::spawn_local(async move {
        let client = client.with_value(AuthClient::clone);
        match client.cached_session().await {
            Ok(Some(cached)) => {
                tracing::trace!("Bootstrapping session from the offline cache.");
                session_atom.update(|snapshot| {
                    if snapshot.data.is_none() {
                        snapshot.data = Some(cached);
                    }
                });
            }
            Ok(None) => {}
            Err(err) => {
                tracing::error!(?err, "Could not read the cached session.");
            }
        }

        if online.is_online() {
            refetch_session_action.dispatch(());
        } else {
            session_atom.update(|snapshot| snapshot.pending = false);
        }
    });
}
