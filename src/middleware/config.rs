use std::sync::Arc;
use std::time::Duration;

use axum_extra::extract::cookie::Key;
use url::Url;

use crate::client::{ApiConfig, AuthClient};
use crate::clock::{Clock, SystemClock};
use crate::error::Error;
use crate::guard::RoutePolicy;
use crate::session::{RefreshTokenRotation, SessionConfig};
use crate::types::TeamId;

/// Shared auth settings used by both config and runtime state.
#[derive(Clone)]
pub(crate) struct AuthSettings {
    pub(crate) cookie_key: Key,
    pub(crate) session_cookie_name: String,
    pub(crate) session_ttl_days: i64,
    pub(crate) secure_cookies: bool,
    pub(crate) auth_path: String,
    pub(crate) login_redirect: String,
    pub(crate) logout_redirect: String,
    pub(crate) policy: RoutePolicy,
    pub(crate) session: SessionConfig,
    pub(crate) clock: Arc<dyn Clock>,
}

impl AuthSettings {
    fn defaults() -> Self {
        Self {
            cookie_key: Key::generate(),
            session_cookie_name: "__wine_session".into(),
            session_ttl_days: 30,
            secure_cookies: true,
            auth_path: "/api/auth".into(),
            login_redirect: "/wines".into(),
            logout_redirect: "/".into(),
            policy: RoutePolicy::default(),
            session: SessionConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }
}

/// Wine session authentication configuration.
///
/// Required field (`client`) is a constructor parameter. Use
/// [`from_env()`](WineAuthConfig::from_env) for convention-based setup,
/// or [`new()`](WineAuthConfig::new) with `with_*` methods for full control.
pub struct WineAuthConfig {
    pub(super) client: AuthClient,
    pub(super) settings: AuthSettings,
}

impl WineAuthConfig {
    #[must_use]
    pub fn new(client: AuthClient) -> Self {
        Self {
            client,
            settings: AuthSettings::defaults(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `WINE_TEAM_ID`: team namespace of the wine API
    ///
    /// # Optional env vars
    /// - `WINE_API_BASE_URL`: override the API origin
    /// - `WINE_API_TIMEOUT_SECS`: per-request timeout in seconds (default 30)
    /// - `WINE_SIGNOUT_URL`: endpoint notified on sign-out
    /// - `REFRESH_TOKEN_ROTATION`: `accept` (default) or `keep`
    /// - `COOKIE_KEY`: cookie encryption key bytes (at least 64)
    /// - `DEV_AUTH`: `"1"` or `"true"` disables secure cookies for plain-HTTP development
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required env vars are missing or values are invalid.
    pub fn from_env() -> Result<Self, Error> {
        let team_id = std::env::var("WINE_TEAM_ID")
            .map_err(|_| Error::Config("WINE_TEAM_ID is required".into()))?;

        let mut api = ApiConfig::new(TeamId::from(team_id));

        if let Ok(url_str) = std::env::var("WINE_API_BASE_URL") {
            let url: Url = url_str
                .parse()
                .map_err(|e| Error::Config(format!("WINE_API_BASE_URL: {e}")))?;
            api = api.with_base_url(url);
        }
        if let Ok(secs) = std::env::var("WINE_API_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("WINE_API_TIMEOUT_SECS: {e}")))?;
            api = api.with_timeout(Duration::from_secs(secs));
        }
        if let Ok(url_str) = std::env::var("WINE_SIGNOUT_URL") {
            let url: Url = url_str
                .parse()
                .map_err(|e| Error::Config(format!("WINE_SIGNOUT_URL: {e}")))?;
            api = api.with_sign_out_url(url);
        }

        let mut session = SessionConfig::new();
        if let Ok(policy) = std::env::var("REFRESH_TOKEN_ROTATION") {
            session = session.with_rotation(policy.parse::<RefreshTokenRotation>()?);
        }

        let dev_auth = matches!(
            std::env::var("DEV_AUTH").as_deref(),
            Ok("1") | Ok("true"),
        );

        let cookie_key = match std::env::var("COOKIE_KEY") {
            Ok(k) => Key::try_from(k.as_bytes()).map_err(|_| {
                Error::Config(
                    "COOKIE_KEY is set but invalid (must be at least 64 bytes). \
                     Remove the env var to use an ephemeral key, or provide a valid key."
                        .into(),
                )
            })?,
            Err(_) => {
                tracing::warn!("COOKIE_KEY not set, sessions will not survive a restart");
                Key::generate()
            }
        };

        Ok(Self::new(AuthClient::new(api)?)
            .with_cookie_key(cookie_key)
            .with_session_config(session)
            .with_secure_cookies(!dev_auth))
    }

    #[must_use]
    pub fn with_cookie_key(mut self, key: Key) -> Self {
        self.settings.cookie_key = key;
        self
    }

    #[must_use]
    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.settings.session_cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_session_ttl_days(mut self, days: i64) -> Self {
        self.settings.session_ttl_days = days;
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.settings.secure_cookies = secure;
        self
    }

    /// Prefix of the auth endpoints (default `/api/auth`).
    #[must_use]
    pub fn with_auth_path(mut self, path: impl Into<String>) -> Self {
        self.settings.auth_path = path.into();
        self
    }

    /// Where a successful sign-in or sign-up lands (default `/wines`).
    #[must_use]
    pub fn with_login_redirect(mut self, path: impl Into<String>) -> Self {
        self.settings.login_redirect = path.into();
        self
    }

    #[must_use]
    pub fn with_logout_redirect(mut self, path: impl Into<String>) -> Self {
        self.settings.logout_redirect = path.into();
        self
    }

    #[must_use]
    pub fn with_route_policy(mut self, policy: RoutePolicy) -> Self {
        self.settings.policy = policy;
        self
    }

    #[must_use]
    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.settings.session = config;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.settings.clock = clock;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WineAuthConfig {
        let api = ApiConfig::new(TeamId::from("3-1".to_string()));
        WineAuthConfig::new(AuthClient::new(api).unwrap())
    }

    #[test]
    fn defaults() {
        let settings = config().settings;
        assert_eq!(settings.session_cookie_name, "__wine_session");
        assert_eq!(settings.auth_path, "/api/auth");
        assert_eq!(settings.login_redirect, "/wines");
        assert_eq!(settings.logout_redirect, "/");
        assert!(settings.secure_cookies);
        assert_eq!(settings.session.rotation(), RefreshTokenRotation::AcceptIssued);
    }

    #[test]
    fn overrides() {
        let settings = config()
            .with_auth_path("/auth")
            .with_session_cookie_name("sid")
            .with_secure_cookies(false)
            .with_session_config(
                SessionConfig::new().with_rotation(RefreshTokenRotation::KeepOriginal),
            )
            .settings;
        assert_eq!(settings.auth_path, "/auth");
        assert_eq!(settings.session_cookie_name, "sid");
        assert!(!settings.secure_cookies);
        assert_eq!(settings.session.rotation(), RefreshTokenRotation::KeepOriginal);
    }
}
