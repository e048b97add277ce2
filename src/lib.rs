//! Offline-first session authentication for Leptos applications running
//! inside mobile webview shells.
//!
//! A webview shell's own cookie jar cannot be trusted to persist the auth
//! server's session cookies, so this crate re-implements one on top of an
//! async key-value preference store: `Set-Cookie` headers are parsed and
//! merged into a persisted jar, every outgoing auth request carries the jar
//! as its `Cookie` header, the last known session is cached for offline
//! startup, and redirect-based OAuth sign-in is bridged through the system
//! browser and deep links.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use leptos::prelude::*;
//! use leptos_better_auth::url::Url;
//! use leptos_better_auth::{InMemoryPreferenceStore, UseBetterAuthOptions, use_better_auth};
//!
//! #[component]
//! pub fn App() -> impl IntoView {
//!     // Note: On a real device, pass a `PreferenceStore` backed by the
//!     //       shell's persistent storage and fill in `options.platform`
//!     //       with the shell's capabilities. The in-memory store is fine
//!     //       for the plain web, where the webview handles cookies itself.
//!     let auth = use_better_auth(UseBetterAuthOptions::new(
//!         Url::parse("https://app.example.com/api/auth").unwrap(),
//!         Arc::new(InMemoryPreferenceStore::new()),
//!     ));
//!
//!     view! {
//!         <Show
//!             when=move || auth.is_authenticated.get()
//!             fallback=|| view! { <p>"Signed out."</p> }
//!         >
//!             <p>"Signed in."</p>
//!         </Show>
//!     }
//! }
//! ```
//!

mod action;
mod client;
mod config;
mod cookie;
mod error;
mod hooks;
mod internal;
mod jar;
mod platform;
mod request;
mod response;
mod state;
mod storage;

// Library exports (additional to pub modules).
pub use client::*;
pub use config::*;
pub use cookie::{SetCookieEntry, parse_set_cookie_header};
pub use error::*;
pub use hooks::*;
pub use internal::focus_manager::{FocusManager, focus_manager};
pub use internal::online_manager::{OnlineManager, online_manager};
pub use jar::*;
pub use platform::*;
pub use request::RequestError;
pub use response::*;
pub use state::*;
pub use storage::*;
pub mod url {
    pub use url::Url;
}
pub mod reqwest {
    pub use reqwest::*;
}

#[cfg(feature = "internals")]
pub mod internals {
    pub use crate::internal::last_login_method::LastLoginMethodStore;
    pub use crate::internal::session_cache::SessionCache;
}
