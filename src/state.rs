use std::sync::Arc;

use leptos::prelude::*;
use leptos_router::hooks::use_navigate;

use crate::client::AuthClient;
use crate::config::Options;
use crate::error::BetterAuthError;
use crate::response::SessionPayload;

/// Point-in-time view of the last known session.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    /// The last session payload the server reported (or the offline cache
    /// provided). `None` means "not signed in" once `pending` is `false`.
    pub data: Option<SessionPayload>,

    /// The error of the last failed session fetch, if any.
    pub error: Option<Arc<BetterAuthError>>,

    /// Whether a session fetch is outstanding and `data` may be stale.
    pub pending: bool,
}

impl SessionSnapshot {
    pub(crate) fn initial() -> Self {
        Self {
            data: None,
            error: None,
            pending: true,
        }
    }

    /// A known signed-out state.
    pub(crate) fn signed_out() -> Self {
        Self {
            data: None,
            error: None,
            pending: false,
        }
    }

    /// The authenticated user, if any.
    pub fn user(&self) -> Option<&serde_json::Value> {
        self.data.as_ref()?.user.as_ref()
    }
}

/// The global state this library tracks for you. Gives access to the current
/// `session` and to an [`AuthClient`] for performing auth operations.
///
/// Provided as context. Use
/// ```no_run
/// use leptos::prelude::expect_context;
/// use leptos_better_auth::BetterAuth;
///
/// let auth = expect_context::<BetterAuth>();
/// ```
/// to get access to the authentication state in any component rendered below
/// the component that performed the `use_better_auth` call.
#[derive(Clone, Copy)]
pub struct BetterAuth {
    #[allow(unused)]
    pub(crate) options: StoredValue<Options>,

    /// The last known session. Starts out `pending`, is bootstrapped from the
    /// offline cache, and follows every server-reported session change.
    pub session: Signal<SessionSnapshot>,

    /// Derived signal stating `true` when `session` carries a user.
    pub is_authenticated: Signal<bool>,

    pub(crate) client: StoredValue<AuthClient>,

    pub(crate) trigger_refetch: Callback<()>,

    pub(crate) trigger_sign_out: Callback<()>,
}

impl std::fmt::Debug for BetterAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BetterAuth")
            .field("session", &self.session)
            .field("is_authenticated", &self.is_authenticated)
            .finish_non_exhaustive()
    }
}

impl BetterAuth {
    /// An owned client handle for performing auth requests directly.
    pub fn client(&self) -> AuthClient {
        self.client.with_value(AuthClient::clone)
    }

    /// Ask the server for the current session. The `session` signal updates
    /// when the response arrives.
    pub fn refetch_session(&self) {
        self.trigger_refetch.run(());
    }

    /// Sign out. Locally persisted auth state and the in-memory session are
    /// cleared immediately; the server round-trip completes in the
    /// background.
    pub fn sign_out(&self) {
        self.trigger_sign_out.run(());
    }

    /// Sign out and navigate to `path`.
    pub fn sign_out_and_go_to(&self, path: &str) {
        self.trigger_sign_out.run(());
        let navigate = use_navigate();
        navigate(path, Default::default());
    }
}
