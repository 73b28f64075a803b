use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;

use super::config::AuthSettings;
use super::revocation::RevokedTokens;
use crate::client::AuthClient;
use crate::session::{CoalescingRefresher, SessionManager};

/// Manager restored from the session cookie for the span of one request.
pub(super) type RequestSessionManager =
    SessionManager<Arc<AuthClient>, CoalescingRefresher<AuthClient>>;

const DAY_MS: i64 = 86_400_000;

/// Shared state for auth route handlers and the session layer.
#[derive(Clone)]
pub(super) struct AuthState {
    pub(super) client: Arc<AuthClient>,
    pub(super) refresher: CoalescingRefresher<AuthClient>,
    pub(super) revoked: RevokedTokens,
    pub(super) settings: AuthSettings,
}

impl AuthState {
    pub(super) fn new(client: AuthClient, settings: AuthSettings) -> Self {
        let client = Arc::new(client);
        Self {
            refresher: CoalescingRefresher::new(Arc::clone(&client))
                .with_clock(Arc::clone(&settings.clock)),
            revoked: RevokedTokens::new(settings.session_ttl_days.saturating_mul(DAY_MS)),
            client,
            settings,
        }
    }

    /// Fresh, empty manager wired to the shared client and refresher.
    pub(super) fn manager(&self) -> RequestSessionManager {
        SessionManager::new(Arc::clone(&self.client), self.refresher.clone())
            .with_config(self.settings.session.clone())
            .with_clock(Arc::clone(&self.settings.clock))
    }

    /// Ends every session descended from `refresh_token`.
    ///
    /// Requests still holding the old cookie drop their session instead of
    /// writing it back, including one whose refresh is in flight right now.
    pub(super) fn revoke(&self, refresh_token: &str) {
        let now_ms = self.settings.clock.now_ms();
        self.revoked.revoke(refresh_token, now_ms);
        if let Some(rotated) = self.refresher.forget(refresh_token) {
            self.revoked.revoke(&rotated, now_ms);
        }
    }

    pub(super) fn is_revoked(&self, refresh_token: &str) -> bool {
        self.revoked
            .is_revoked(refresh_token, self.settings.clock.now_ms())
    }
}

// PrivateCookieJar requires Key to be extractable from state
impl FromRef<AuthState> for Key {
    fn from_ref(state: &AuthState) -> Self {
        state.settings.cookie_key.clone()
    }
}
