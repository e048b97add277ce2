use std::sync::Arc;

use leptos::prelude::*;

use crate::client::AuthClient;
use crate::error::BetterAuthError;
use crate::state::SessionSnapshot;

/// Refetches the current session from the server and folds the result into
/// the session signal.
pub(crate) fn create_refetch_session_action(
    client: StoredValue<AuthClient>,
    session_atom: RwSignal<SessionSnapshot>,
) -> Action<(), ()> {
    Action::new(move |_: &()| async move {
        leptos::task::spawn_local(async move {
            let client = client.with_value(AuthClient::clone);
            session_atom.update(|snapshot| snapshot.pending = true);

            match client.get_session().await {
                Ok(data) => {
                    session_atom.set(SessionSnapshot {
                        data,
                        error: None,
                        pending: false,
                    });
                }
                Err(err) => {
                    tracing::error!(?err, "Could not fetch session.");
                    session_atom.update(|snapshot| {
                        snapshot.error =
                            Some(Arc::new(BetterAuthError::Request { source: err }));
                        snapshot.pending = false;
                    });
                }
            }
        });
    })
}

/// Performs the sign-out round-trip.
///
/// Local auth state is already cleared by the bridge before the request
/// leaves. A failing round-trip therefore only means the server-side session
/// outlives the local one; the user stays signed out locally either way.
pub(crate) fn create_sign_out_action(client: StoredValue<AuthClient>) -> Action<(), ()> {
    Action::new(move |_: &()| async move {
        leptos::task::spawn_local(async move {
            let client = client.with_value(AuthClient::clone);
            if let Err(err) = client.sign_out().await {
                tracing::warn!(?err, "Sign-out request failed.");
            }
        });
    })
}
