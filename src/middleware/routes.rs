use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use axum_extra::extract::PrivateCookieJar;

use super::cookies;
use super::extractor::{Resolved, resolve_session};
use super::state::{AuthState, RequestSessionManager};
use crate::collaborator::spawn_sign_out_notice;
use crate::error::AuthError;
use crate::session::{Session, SessionSnapshot};
use crate::types::{Credential, ProfileUpdate, SignUpForm};
use crate::validation;

/// Build the auth router: sign-in, sign-up, sign-out, session and profile endpoints.
pub(super) fn auth_routes(state: AuthState) -> Router {
    let auth_path = state.settings.auth_path.clone();

    Router::new()
        .route(&format!("{auth_path}/signin"), post(sign_in))
        .route(&format!("{auth_path}/signup"), post(sign_up))
        .route(&format!("{auth_path}/signout"), get(sign_out).post(sign_out))
        .route(&format!("{auth_path}/session"), get(session))
        .route(&format!("{auth_path}/profile"), patch(update_profile))
        .with_state(state)
}

// ── Sign-in ────────────────────────────────────────────────────────

async fn sign_in(
    State(state): State<AuthState>,
    jar: PrivateCookieJar,
    Json(credential): Json<Credential>,
) -> Result<(PrivateCookieJar, Redirect), AuthError> {
    let manager = state.manager();
    manager.sign_in(credential).await?;
    establish(&state, &manager, jar)
}

// ── Sign-up ────────────────────────────────────────────────────────

async fn sign_up(
    State(state): State<AuthState>,
    jar: PrivateCookieJar,
    Json(form): Json<SignUpForm>,
) -> Result<(PrivateCookieJar, Redirect), AuthError> {
    let manager = state.manager();
    manager.sign_up(state.client.as_ref(), form).await?;
    establish(&state, &manager, jar)
}

/// Store the freshly issued session and send the user to the listing.
fn establish(
    state: &AuthState,
    manager: &RequestSessionManager,
    jar: PrivateCookieJar,
) -> Result<(PrivateCookieJar, Redirect), AuthError> {
    let current = manager.state();
    let session = current.session().ok_or(AuthError::Unauthenticated)?;
    let cookie =
        cookies::session_cookie(&state.settings, &session.to_stored()).map_err(AuthError::unhandled)?;

    tracing::debug!(user_id = %session.identity().id, "Session cookie issued");

    Ok((
        jar.add(cookie),
        Redirect::to(&state.settings.login_redirect),
    ))
}

// ── Sign-out ───────────────────────────────────────────────────────

async fn sign_out(
    State(state): State<AuthState>,
    jar: PrivateCookieJar,
) -> (PrivateCookieJar, Redirect) {
    if let Some(stored) = cookies::read_session(&jar, &state.settings.session_cookie_name) {
        state.revoke(&stored.refresh_token);
        let now_ms = state.settings.clock.now_ms();
        let manager = state.manager().with_session(Session::restore(stored, now_ms));
        if let Some(ended) = manager.sign_out() {
            spawn_sign_out_notice(
                Arc::clone(&state.client),
                ended.tokens().access_token.clone(),
            );
        }
    }

    let clear_cookie = cookies::clear_session_cookie(&state.settings.session_cookie_name);
    (jar.remove(clear_cookie), Redirect::to(&state.settings.logout_redirect))
}

// ── Session ────────────────────────────────────────────────────────

/// Current session, refreshed if needed; `null` when signed out.
async fn session(
    State(state): State<AuthState>,
    jar: PrivateCookieJar,
) -> Result<(PrivateCookieJar, Json<Option<SessionSnapshot>>), Response> {
    let resolved = resolve_session(&state, &jar).await;
    let jar = persist(&state, &resolved, jar)?;

    match &resolved.access {
        Err(e) if !e.is_expected() => Err((jar, e.clone()).into_response()),
        _ => Ok((jar, Json(resolved.manager.snapshot()))),
    }
}

// ── Profile ────────────────────────────────────────────────────────

async fn update_profile(
    State(state): State<AuthState>,
    jar: PrivateCookieJar,
    Json(update): Json<ProfileUpdate>,
) -> Result<(PrivateCookieJar, Json<SessionSnapshot>), Response> {
    validation::validate_profile_update(&update).map_err(|e| AuthError::from(e).into_response())?;

    let resolved = resolve_session(&state, &jar).await;
    let jar = persist(&state, &resolved, jar)?;
    let access_token = match &resolved.access {
        Ok(token) => token.clone(),
        Err(e) => return Err((jar, e.clone()).into_response()),
    };

    let server = match state.client.update_profile(&access_token, &update).await {
        Ok(identity) => identity,
        Err(e) => return Err((jar, e).into_response()),
    };

    match resolved.manager.apply_profile(&server) {
        Ok(snapshot) => {
            let jar = persist(&state, &resolved, jar)?;
            tracing::info!(user_id = %snapshot.user.id, "Profile updated");
            Ok((jar, Json(snapshot)))
        }
        Err(e) => Err((jar, e).into_response()),
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn persist(
    state: &AuthState,
    resolved: &Resolved,
    jar: PrivateCookieJar,
) -> Result<PrivateCookieJar, Response> {
    resolved
        .persist(jar, state)
        .map_err(IntoResponse::into_response)
}
