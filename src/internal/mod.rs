pub(crate) mod bridge;
pub(crate) mod focus_manager;
pub(crate) mod last_login_method;
pub(crate) mod oauth_state;
pub(crate) mod online_manager;
pub(crate) mod session_cache;
