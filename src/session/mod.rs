//! Session data and the state machine that owns it.
//!
//! A [`Session`] binds a [`UserIdentity`] to its current [`TokenPair`]. Only
//! [`SessionManager`] mutates one; everything else reads [`SessionState`] or
//! [`SessionSnapshot`] clones.

mod manager;
mod single_flight;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use manager::{SessionManager, SessionReader};
pub use single_flight::CoalescingRefresher;

use crate::collaborator::RefreshedTokens;
use crate::token;
use crate::types::{ProfileUpdate, TeamId, TokenPair, UserId, UserIdentity};

/// Sticky failure flag carried by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionError {
    /// The last refresh failed. No refresh is attempted until the next sign-in.
    #[serde(rename = "RefreshAccessTokenError")]
    RefreshFailed,
}

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    identity: UserIdentity,
    tokens: TokenPair,
    access_token_expires_at_ms: i64,
    error: Option<SessionError>,
}

impl Session {
    pub(crate) fn new(identity: UserIdentity, tokens: TokenPair, now_ms: i64) -> Self {
        let access_token_expires_at_ms = token::decode_expiry(&tokens.access_token, now_ms);
        Self {
            identity,
            tokens,
            access_token_expires_at_ms,
            error: None,
        }
    }

    /// Rebuilds a session from its persisted form. The expiry is re-derived
    /// from the stored access token, never read from storage.
    #[must_use]
    pub fn restore(stored: StoredSession, now_ms: i64) -> Self {
        let mut session = Self::new(
            stored.user,
            TokenPair {
                access_token: stored.access_token,
                refresh_token: stored.refresh_token,
            },
            now_ms,
        );
        session.error = stored.error;
        session
    }

    #[must_use]
    pub fn identity(&self) -> &UserIdentity {
        &self.identity
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenPair {
        &self.tokens
    }

    #[must_use]
    pub fn access_token_expires_at_ms(&self) -> i64 {
        self.access_token_expires_at_ms
    }

    #[must_use]
    pub fn error(&self) -> Option<SessionError> {
        self.error
    }

    #[must_use]
    pub fn is_access_token_expired(&self, now_ms: i64) -> bool {
        token::is_expired(self.access_token_expires_at_ms, now_ms)
    }

    pub(crate) fn apply_refresh(
        &mut self,
        refreshed: RefreshedTokens,
        rotation: RefreshTokenRotation,
        now_ms: i64,
    ) {
        self.access_token_expires_at_ms = token::decode_expiry(&refreshed.access_token, now_ms);
        self.tokens.access_token = refreshed.access_token;
        if let (RefreshTokenRotation::AcceptIssued, Some(rotated)) =
            (rotation, refreshed.refresh_token)
        {
            self.tokens.refresh_token = rotated;
        }
        self.error = None;
    }

    pub(crate) fn mark_refresh_failed(&mut self) {
        self.error = Some(SessionError::RefreshFailed);
    }

    pub(crate) fn merge_profile(&mut self, update: &ProfileUpdate) {
        self.identity.merge(update);
    }

    pub(crate) fn adopt_profile(&mut self, server: &UserIdentity) {
        self.identity.adopt_profile(server);
    }

    /// Persisted form, refresh token included.
    #[must_use]
    pub fn to_stored(&self) -> StoredSession {
        StoredSession {
            user: self.identity.clone(),
            access_token: self.tokens.access_token.clone(),
            refresh_token: self.tokens.refresh_token.clone(),
            error: self.error,
        }
    }

    /// Read-only view handed to UI code. Carries no refresh token.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            user: UserSummary {
                id: self.identity.id,
                email: self.identity.email.clone(),
                nickname: self.identity.nickname.clone(),
                image: self.identity.image.clone(),
                team_id: self.identity.team_id.clone(),
            },
            access_token: self.tokens.access_token.clone(),
            error: self.error,
        }
    }
}

/// What gets written into the session cookie.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    pub user: UserIdentity,
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SessionError>,
}

impl std::fmt::Debug for StoredSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredSession")
            .field("user", &self.user.id)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Session shape consumed by UI code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub user: UserSummary,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SessionError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    pub email: String,
    pub nickname: String,
    pub image: Option<String>,
    pub team_id: TeamId,
}

/// Coarse state consulted by the route guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthStatus {
    Unauthenticated,
    Fresh,
    Refreshing,
    RefreshFailed,
}

impl AuthStatus {
    /// Fresh or refreshing. A failed refresh counts as signed out.
    #[must_use]
    pub fn is_authenticated(self) -> bool {
        matches!(self, Self::Fresh | Self::Refreshing)
    }
}

/// Point-in-time view of a session manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated { session: Session, refreshing: bool },
}

impl SessionState {
    #[must_use]
    pub fn status(&self) -> AuthStatus {
        match self {
            Self::Unauthenticated => AuthStatus::Unauthenticated,
            Self::Authenticated { session, .. } if session.error.is_some() => {
                AuthStatus::RefreshFailed
            }
            Self::Authenticated {
                refreshing: true, ..
            } => AuthStatus::Refreshing,
            Self::Authenticated { .. } => AuthStatus::Fresh,
        }
    }

    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Unauthenticated => None,
            Self::Authenticated { session, .. } => Some(session),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.session().map(Session::snapshot)
    }
}

/// What to do with a refresh token returned by the refresher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshTokenRotation {
    /// Adopt the issued refresh token when the server returns one.
    #[default]
    AcceptIssued,
    /// Always keep the refresh token obtained at sign-in.
    KeepOriginal,
}

impl std::str::FromStr for RefreshTokenRotation {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accept" | "rotate" | "accept_issued" => Ok(Self::AcceptIssued),
            "keep" | "keep_original" => Ok(Self::KeepOriginal),
            other => Err(crate::error::Error::Config(format!(
                "unknown refresh token rotation policy: {other}"
            ))),
        }
    }
}

/// Tuning for [`SessionManager`].
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub(crate) rotation: RefreshTokenRotation,
    pub(crate) call_timeout: Option<Duration>,
}

impl SessionConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_rotation(mut self, rotation: RefreshTokenRotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Bound verifier and refresher calls. Unbounded by default.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn rotation(&self) -> RefreshTokenRotation {
        self.rotation
    }

    #[must_use]
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn expiry_is_derived_from_access_token() {
        let session = Session::new(identity(), tokens(access_token(NOW_MS, 1_800_000)), NOW_MS);
        assert_eq!(session.access_token_expires_at_ms(), NOW_MS + 1_800_000);
        assert!(!session.is_access_token_expired(NOW_MS));
    }

    #[test]
    fn garbage_access_token_starts_expired() {
        let session = Session::new(identity(), tokens("garbage".into()), NOW_MS);
        assert!(session.is_access_token_expired(NOW_MS));
    }

    #[test]
    fn refresh_keeps_identity_and_refresh_token_by_policy() {
        let mut session = Session::new(identity(), tokens(access_token(NOW_MS, 30_000)), NOW_MS);
        session.mark_refresh_failed();
        let refreshed = RefreshedTokens {
            access_token: access_token(NOW_MS, 1_800_000),
            refresh_token: Some("rt2".into()),
        };

        let mut kept = session.clone();
        kept.apply_refresh(refreshed.clone(), RefreshTokenRotation::KeepOriginal, NOW_MS);
        assert_eq!(kept.tokens().refresh_token, "rt1");
        assert_eq!(kept.access_token_expires_at_ms(), NOW_MS + 1_800_000);
        assert_eq!(kept.error(), None);
        assert_eq!(kept.identity(), session.identity());

        session.apply_refresh(refreshed, RefreshTokenRotation::AcceptIssued, NOW_MS);
        assert_eq!(session.tokens().refresh_token, "rt2");
    }

    #[test]
    fn stored_round_trip_rederives_expiry() {
        let mut session = Session::new(identity(), tokens(access_token(NOW_MS, 1_800_000)), NOW_MS);
        session.mark_refresh_failed();
        let json = serde_json::to_string(&session.to_stored()).unwrap();
        assert!(json.contains("\"error\":\"RefreshAccessTokenError\""));
        let stored: StoredSession = serde_json::from_str(&json).unwrap();
        assert_eq!(Session::restore(stored, NOW_MS), session);
    }

    #[test]
    fn snapshot_matches_ui_shape() {
        let session = Session::new(identity(), tokens("at".into()), NOW_MS);
        let json = serde_json::to_value(session.snapshot()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "user": {
                    "id": 1379,
                    "email": "hyun@test.com",
                    "nickname": "hyun",
                    "image": null,
                    "teamId": "3-1"
                },
                "accessToken": "at"
            })
        );
    }

    #[test]
    fn status_mapping() {
        let session = Session::new(identity(), tokens("at".into()), NOW_MS);
        let mut failed = session.clone();
        failed.mark_refresh_failed();

        assert_eq!(SessionState::Unauthenticated.status(), AuthStatus::Unauthenticated);
        assert_eq!(
            SessionState::Authenticated { session: session.clone(), refreshing: false }.status(),
            AuthStatus::Fresh
        );
        assert_eq!(
            SessionState::Authenticated { session, refreshing: true }.status(),
            AuthStatus::Refreshing
        );
        assert_eq!(
            SessionState::Authenticated { session: failed, refreshing: false }.status(),
            AuthStatus::RefreshFailed
        );
        assert!(!AuthStatus::RefreshFailed.is_authenticated());
        assert!(AuthStatus::Refreshing.is_authenticated());
    }

    #[test]
    fn rotation_policy_parses() {
        assert_eq!("keep".parse::<RefreshTokenRotation>().unwrap(), RefreshTokenRotation::KeepOriginal);
        assert_eq!("Accept".parse::<RefreshTokenRotation>().unwrap(), RefreshTokenRotation::AcceptIssued);
        assert!("sometimes".parse::<RefreshTokenRotation>().is_err());
    }
}
