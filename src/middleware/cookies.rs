use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use super::config::AuthSettings;
use crate::error::Error;
use crate::session::StoredSession;

/// Create the session cookie carrying the whole session as JSON.
///
/// The private jar encrypts and authenticates the value, so a modified cookie
/// fails to decrypt and reads as absent.
pub(super) fn session_cookie(
    settings: &AuthSettings,
    session: &StoredSession,
) -> Result<Cookie<'static>, Error> {
    let value = serde_json::to_string(session)?;
    Ok(Cookie::build((settings.session_cookie_name.clone(), value))
        .http_only(true)
        .secure(settings.secure_cookies)
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .max_age(Duration::days(settings.session_ttl_days))
        .build())
}

/// Create removal cookie for session.
pub(super) fn clear_session_cookie(name: &str) -> Cookie<'static> {
    Cookie::build((name.to_string(), ""))
        .path("/".to_string())
        .max_age(Duration::ZERO)
        .build()
}

/// Get the stored session from cookies. Undecodable contents count as no session.
pub(super) fn read_session(jar: &PrivateCookieJar, name: &str) -> Option<StoredSession> {
    let cookie = jar.get(name)?;
    match serde_json::from_str(cookie.value()) {
        Ok(stored) => Some(stored),
        Err(e) => {
            tracing::warn!(error = %e, "Discarding unreadable session cookie");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderMap;
    use axum::http::header::{COOKIE, SET_COOKIE};
    use axum::response::IntoResponse;
    use axum_extra::extract::cookie::Key;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::client::{ApiConfig, AuthClient};
    use crate::middleware::config::WineAuthConfig;
    use crate::session::test_support::{NOW_MS, access_token, identity};

    fn settings() -> AuthSettings {
        let client = AuthClient::new(ApiConfig::new("3-1".to_string().into())).unwrap();
        WineAuthConfig::new(client).with_secure_cookies(false).settings
    }

    fn stored() -> StoredSession {
        StoredSession {
            user: identity(),
            access_token: access_token(NOW_MS, 3_600_000),
            refresh_token: "rt1".into(),
            error: None,
        }
    }

    /// Jar as it would be extracted from a request carrying `cookie`.
    fn incoming(key: &Key, cookie: &Cookie<'_>) -> PrivateCookieJar {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, cookie.stripped().to_string().parse().unwrap());
        PrivateCookieJar::from_headers(&headers, key.clone())
    }

    /// The encrypted cookie a browser would receive from `jar`.
    fn outgoing(jar: PrivateCookieJar) -> Cookie<'static> {
        let response = (jar, ()).into_response();
        let header = response.headers()[SET_COOKIE].to_str().unwrap().to_owned();
        Cookie::parse(header).unwrap()
    }

    #[test]
    fn session_survives_the_jar() {
        let settings = settings();
        let jar = PrivateCookieJar::new(settings.cookie_key.clone())
            .add(session_cookie(&settings, &stored()).unwrap());
        let sent = outgoing(jar);
        assert_ne!(sent.value(), serde_json::to_string(&stored()).unwrap());

        let jar = incoming(&settings.cookie_key, &sent);
        assert_eq!(read_session(&jar, "__wine_session"), Some(stored()));
    }

    #[test]
    fn tampered_cookie_reads_as_absent() {
        let settings = settings();
        let forged = Cookie::new("__wine_session", serde_json::to_string(&stored()).unwrap());
        let jar = incoming(&settings.cookie_key, &forged);
        assert_eq!(read_session(&jar, "__wine_session"), None);
    }

    #[test]
    fn cookie_attributes() {
        let settings = settings();
        let cookie = session_cookie(&settings, &stored()).unwrap();
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(Duration::days(30)));
        assert_eq!(clear_session_cookie("__wine_session").max_age(), Some(Duration::ZERO));
    }
}
