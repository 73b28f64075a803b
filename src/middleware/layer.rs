use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::PrivateCookieJar;

use super::extractor::{CurrentSession, resolve_session};
use super::state::AuthState;
use crate::guard::{self, GuardDecision};

/// Per-request session check in front of application routes.
///
/// Restores the cookie session, refreshes its access token when needed, writes
/// the cookie back if anything changed, applies the route policy and hands the
/// resulting [`CurrentSession`] to the handler. Requests under the auth path
/// pass straight through since those handlers manage the cookie themselves.
pub(super) async fn session_layer(
    State(state): State<AuthState>,
    jar: PrivateCookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    if guard::is_under(request.uri().path(), &state.settings.auth_path) {
        return next.run(request).await;
    }

    let resolved = resolve_session(&state, &jar).await;
    let jar = match resolved.persist(jar, &state) {
        Ok(jar) => jar,
        Err(e) => return e.into_response(),
    };
    if let Err(e) = &resolved.access {
        if !e.is_expected() {
            return (jar, e.clone()).into_response();
        }
    }

    let current = resolved.manager.state();
    let policy = &state.settings.policy;
    if let GuardDecision::Redirect(to) = policy.evaluate(current.status(), request.uri().path()) {
        let location = if to == policy.sign_in_path() {
            let back = request
                .uri()
                .path_and_query()
                .map_or("/", |pq| pq.as_str());
            format!("{to}?callbackUrl={}", urlencoding::encode(back))
        } else {
            to
        };
        tracing::debug!(path = %request.uri().path(), location = %location, "Route guard redirect");
        return (jar, Redirect::to(&location)).into_response();
    }

    request.extensions_mut().insert(CurrentSession(current));
    let response = next.run(request).await;
    (jar, response).into_response()
}
