//! Storage key constants.

/// Keys written by the auth core.
///
/// Keys marked *local* live in [`crate::StorageArea::Local`], keys marked
/// *session* in [`crate::StorageArea::Session`].
pub struct StorageKeys;

impl StorageKeys {
    /// *session* RFC 3339 time initialization started
    pub const AUTH_INIT_START: &'static str = "auth_init_start";

    /// *session* set once initialization resolved
    pub const AUTH_INIT_COMPLETE: &'static str = "auth_init_complete";

    /// *session* initialization duration in milliseconds
    pub const AUTH_INIT_DURATION: &'static str = "auth_init_duration";

    /// *session* RFC 3339 time the API gate opened
    pub const API_LOCK_READY_TIME: &'static str = "api_lock_ready_time";

    /// *local* user has signed in at least once on this profile
    pub const HAS_LOGGED_IN_BEFORE: &'static str = "app_has_logged_in_before";

    /// *session* this session is the profile's first sign-in
    pub const IS_FIRST_LOGIN: &'static str = "is_first_login";

    /// *session* serialized watchdog repair record
    pub const WATCHDOG_REPAIR_RECORD: &'static str = "watchdog_repair_record";

    /// *session* the next start follows a reload the watchdog triggered
    pub const INTENTIONAL_AUTH_RELOAD: &'static str = "intentional_auth_reload";

    /// *session* RFC 3339 time of the last successful auth-error recovery
    pub const RECENT_AUTH_RECOVERY: &'static str = "recent_auth_recovery";

    /// *session* RFC 3339 time of the last error-driven redirect
    pub const RECENT_ERROR_REDIRECT: &'static str = "recent_error_redirect";

    // Legacy loop-breaker flags, cleared by the watchdog.

    /// *local*
    pub const DISABLE_AUTH_LISTENERS: &'static str = "disable_auth_listeners";
    /// *local*
    pub const AUTH_LOOP_RESET: &'static str = "auth_loop_reset";
    /// *local*
    pub const AUTH_LOOP_DETECTED: &'static str = "auth_loop_detected";
    /// *local*
    pub const TRIED_LOCAL_STORAGE_USER: &'static str = "tried_localStorage_user";
    /// *session*
    pub const AUTH_PAGE_RELOADED: &'static str = "auth_page_reloaded";
    /// *session*
    pub const AUTH_PAGE_INTENTIONAL_RELOAD: &'static str = "auth_page_intentional_reload";
    /// *session*
    pub const HOME_RELOAD_COUNT: &'static str = "home_reload_count";
    /// *session*
    pub const LAST_HOME_RELOAD: &'static str = "last_home_reload";

    /// Local key holding the provider's persisted session for a project.
    pub fn provider_session(project_ref: &str) -> String {
        format!("sb-{}-auth-token", project_ref)
    }
}
