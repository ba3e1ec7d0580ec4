//! Storage key constants.

/// Keys written to the persistent store.
pub struct StorageKeys;

impl StorageKeys {
    /// Bearer credential for API calls
    pub const ACCESS_TOKEN: &'static str = "accessToken";

    /// Credential used to mint a new access token
    pub const REFRESH_TOKEN: &'static str = "refreshToken";

    /// Access token expiry, milliseconds since the Unix epoch
    pub const TOKEN_EXPIRATION: &'static str = "tokenExpiration";

    /// Legacy single-token field. Written alongside `accessToken` and read as
    /// its fallback so older readers keep working.
    pub const LEGACY_TOKEN: &'static str = "token";

    /// Denormalized "access token present" flag
    pub const IS_LOGGED_IN: &'static str = "isLoggedIn";

    /// Configured CMS base URL
    pub const SERVER_URL: &'static str = "serverUrl";

    pub const DARK_MODE: &'static str = "darkMode";
    pub const THEME_PREFERENCE: &'static str = "themePreference";
    pub const NOTIFICATIONS: &'static str = "notifications";
    pub const AUTO_REFRESH: &'static str = "autoRefresh";
    pub const DEBUGGING: &'static str = "debugging";
    pub const SYNC_FREQUENCY: &'static str = "syncFrequency";

    /// Every key written by the token store when the session changes.
    pub const SESSION_KEYS: [&'static str; 5] = [
        Self::ACCESS_TOKEN,
        Self::REFRESH_TOKEN,
        Self::TOKEN_EXPIRATION,
        Self::LEGACY_TOKEN,
        Self::IS_LOGGED_IN,
    ];
}
