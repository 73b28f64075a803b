use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::PrivateCookieJar;

use super::cookies;
use super::state::{AuthState, RequestSessionManager};
use crate::error::AuthError;
use crate::session::{AuthStatus, Session, SessionSnapshot, SessionState, StoredSession, UserSummary};

/// Session restored from the request cookie after the access check ran.
pub(super) struct Resolved {
    pub(super) manager: RequestSessionManager,
    pub(super) access: Result<String, AuthError>,
    original: Option<StoredSession>,
}

impl Resolved {
    /// Writes the session back into `jar` if it changed during the request.
    ///
    /// A session signed out by another request meanwhile is removed instead.
    pub(super) fn persist(
        &self,
        jar: PrivateCookieJar,
        state: &AuthState,
    ) -> Result<PrivateCookieJar, AuthError> {
        let settings = &state.settings;
        let current = self.manager.state();
        let live = current
            .session()
            .filter(|session| !state.is_revoked(&session.tokens().refresh_token));
        match (live, &self.original) {
            (Some(session), original) => {
                let stored = session.to_stored();
                if original.as_ref() == Some(&stored) {
                    return Ok(jar);
                }
                let cookie = cookies::session_cookie(settings, &stored).map_err(AuthError::unhandled)?;
                Ok(jar.add(cookie))
            }
            (None, Some(_)) => Ok(jar.remove(cookies::clear_session_cookie(
                &settings.session_cookie_name,
            ))),
            (None, None) => Ok(jar),
        }
    }
}

/// Restores the session carried by `jar` and makes sure its access token is usable.
///
/// Refreshes when the token is inside the safety window; a refresh that fails
/// leaves the session in the refresh-failed state, which [`Resolved::persist`]
/// then writes back so the next request does not retry.
pub(super) async fn resolve_session(state: &AuthState, jar: &PrivateCookieJar) -> Resolved {
    let manager = state.manager();
    let Some(stored) = cookies::read_session(jar, &state.settings.session_cookie_name) else {
        return Resolved {
            manager,
            access: Err(AuthError::Unauthenticated),
            original: None,
        };
    };

    if state.is_revoked(&stored.refresh_token) {
        tracing::debug!(user_id = %stored.user.id, "Session cookie was signed out");
        return Resolved {
            manager,
            access: Err(AuthError::Unauthenticated),
            original: Some(stored),
        };
    }

    let now_ms = state.settings.clock.now_ms();
    let manager = manager.with_session(Session::restore(stored.clone(), now_ms));
    let mut access = manager.access_requested().await;

    // Sign-out may have landed while the refresh was in flight.
    let current = manager.state();
    let rotated = current.session().map(|s| s.tokens().refresh_token.as_str());
    if state.is_revoked(&stored.refresh_token) || rotated.is_some_and(|rt| state.is_revoked(rt)) {
        tracing::debug!(user_id = %stored.user.id, "Session signed out during refresh");
        manager.sign_out();
        access = Err(AuthError::Unauthenticated);
    }

    if let Err(e) = &access {
        tracing::debug!(user_id = %stored.user.id, error = %e, "Session access check failed");
    }

    Resolved {
        manager,
        access,
        original: Some(stored),
    }
}

/// Session state attached to the request by the session layer.
///
/// Handlers behind [`SessionAuth::protect`](super::SessionAuth::protect) can
/// take it as an extractor; it is also available from request extensions.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub SessionState);

impl CurrentSession {
    #[must_use]
    pub fn status(&self) -> AuthStatus {
        self.0.status()
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.0.snapshot()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentSession {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentSession>()
            .cloned()
            .ok_or(AuthError::Unauthenticated)
    }
}

/// Signed-in user with a usable access token.
///
/// Rejects with `401` when there is no session or its refresh failed.
///
/// # Example
///
/// ```rust,ignore
/// async fn my_reviews(user: AuthUser) -> impl IntoResponse {
///     format!("Hello, {}", user.user.nickname)
/// }
///
/// // Optional: accessible to both authenticated and anonymous users
/// async fn listing(user: Option<AuthUser>) -> impl IntoResponse {
///     match user {
///         Some(u) => format!("Hello, {}", u.user.nickname),
///         None => "Hello, guest".to_string(),
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: UserSummary,
    /// Bearer token for calls to the wine API.
    pub access_token: String,
}

impl AuthUser {
    fn from_current(current: &CurrentSession) -> Result<Self, AuthError> {
        match current.status() {
            AuthStatus::Unauthenticated => Err(AuthError::Unauthenticated),
            AuthStatus::RefreshFailed => Err(AuthError::RefreshFailed),
            AuthStatus::Fresh | AuthStatus::Refreshing => {
                let snapshot = current.snapshot().ok_or(AuthError::Unauthenticated)?;
                Ok(Self {
                    user: snapshot.user,
                    access_token: snapshot.access_token,
                })
            }
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let current = CurrentSession::from_request_parts(parts, state).await?;
        Self::from_current(&current)
    }
}

impl<S: Send + Sync> axum::extract::OptionalFromRequestParts<S> for AuthUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<CurrentSession>()
            .and_then(|current| Self::from_current(current).ok()))
    }
}
