//! Cookie-backed session authentication for Axum.
//!
//! The whole session (identity plus both tokens) lives in an encrypted private
//! cookie. Each request restores it, refreshes the access token inside the
//! safety window and writes it back only when it changed.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use wine_accounts::middleware::{SessionAuth, WineAuthConfig};
//!
//! // 1. Configure from environment
//! let auth = SessionAuth::new(WineAuthConfig::from_env()?);
//!
//! // 2. Guard the app and mount the auth endpoints
//! let app = auth
//!     .protect(app_routes())
//!     .merge(auth.routes());
//!
//! // 3. Read the user in handlers
//! async fn my_profile(user: AuthUser) -> impl IntoResponse { /* ... */ }
//! ```

mod config;
mod cookies;
mod error;
mod extractor;
mod layer;
mod revocation;
mod routes;
mod state;

use axum::Router;

pub use config::WineAuthConfig;
pub use extractor::{AuthUser, CurrentSession};

/// Re-export cookie key type for builder API.
pub use axum_extra::extract::cookie::Key as CookieKey;

use state::AuthState;

/// Auth endpoints plus the session layer, sharing one client and refresher.
#[derive(Clone)]
pub struct SessionAuth {
    state: AuthState,
}

impl SessionAuth {
    #[must_use]
    pub fn new(config: WineAuthConfig) -> Self {
        Self {
            state: AuthState::new(config.client, config.settings),
        }
    }

    /// `signin`, `signup`, `signout`, `session` and `profile` under the auth path.
    #[must_use]
    pub fn routes(&self) -> Router {
        routes::auth_routes(self.state.clone())
    }

    /// Wrap `router` with the session layer: refresh, cookie rewrite, route guard.
    #[must_use]
    pub fn protect<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(axum::middleware::from_fn_with_state(
            self.state.clone(),
            layer::session_layer,
        ))
    }
}
