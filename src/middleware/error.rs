use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::AuthError;

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: &'static str,
}

fn code(e: &AuthError) -> &'static str {
    match e {
        AuthError::InvalidCredential => "InvalidCredential",
        AuthError::ValidationFailed(_) => "ValidationFailed",
        AuthError::RegistrationConflict => "RegistrationConflict",
        AuthError::RefreshFailed => "RefreshAccessTokenError",
        AuthError::Unauthenticated => "Unauthenticated",
        AuthError::NetworkUnreachable(_) => "NetworkUnreachable",
        AuthError::ServerRejected { .. } => "ServerRejected",
        AuthError::Unhandled(_) => "Unhandled",
    }
}

fn status(e: &AuthError) -> StatusCode {
    match e {
        AuthError::InvalidCredential | AuthError::RefreshFailed | AuthError::Unauthenticated => {
            StatusCode::UNAUTHORIZED
        }
        AuthError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AuthError::RegistrationConflict => StatusCode::CONFLICT,
        AuthError::NetworkUnreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::ServerRejected { .. } => StatusCode::BAD_GATEWAY,
        AuthError::Unhandled(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// JSON `{error, message}` where `message` is the user-facing text.
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match &self {
            Self::Unhandled(_) => tracing::error!(error = %self, "Auth internal error"),
            Self::NetworkUnreachable(_) | Self::ServerRejected { .. } => {
                tracing::warn!(error = %self, "Upstream auth failure");
            }
            _ => tracing::debug!(error = %self, "Auth request rejected"),
        }

        let body = ErrorBody {
            error: code(&self),
            message: self.user_message(),
        };
        (status(&self), Json(body)).into_response()
    }
}
