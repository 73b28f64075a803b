use std::sync::Arc;

use crate::types::UserId;
use crate::validation::ValidationError;

/// Crate-level plumbing errors (configuration, transport, decoding).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),
    #[cfg(feature = "client")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{operation} failed (status {status}): {detail}")]
    Api {
        operation: &'static str,
        status: u16,
        detail: String,
    },
    #[error("upstream returned user {returned}, expected {expected}")]
    IdentityMismatch { expected: UserId, returned: UserId },
    #[error("Token decode error: {0}")]
    Token(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Opaque wrapper for failures nobody classified.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Authentication failures as seen by callers of the session state machine.
///
/// Every variant except [`AuthError::Unhandled`] is an expected outcome: it is
/// produced from a classified collaborator result or a local check and never
/// indicates a bug. `Unhandled` carries whatever the collaborator raised that
/// did not fit the taxonomy, so it can reach top-level error handling.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredential,

    #[error("validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    /// Duplicate email or nickname. Upstream does not say which.
    #[error("registration rejected by upstream")]
    RegistrationConflict,

    #[error("access token refresh failed")]
    RefreshFailed,

    #[error("not authenticated")]
    Unauthenticated,

    #[error("upstream unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("upstream rejected the request (status {status})")]
    ServerRejected { status: u16 },

    #[error("unhandled auth error: {0}")]
    Unhandled(BoxError),
}

impl AuthError {
    /// `false` only for failures that must surface through top-level handling.
    #[must_use]
    pub fn is_expected(&self) -> bool {
        !matches!(self, Self::Unhandled(_))
    }

    /// Message shown to the end user.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidCredential => "이메일 또는 비밀번호가 올바르지 않습니다.",
            Self::ValidationFailed(e) => e.message(),
            Self::RegistrationConflict => "회원가입에 실패했습니다.",
            Self::RefreshFailed => "세션이 만료되었습니다. 다시 로그인해 주세요.",
            Self::Unauthenticated => "로그인이 필요합니다.",
            Self::NetworkUnreachable(_) => "서버에 연결할 수 없습니다. 잠시 후 다시 시도해 주세요.",
            Self::ServerRejected { .. } | Self::Unhandled(_) => {
                "요청을 처리하지 못했습니다. 잠시 후 다시 시도해 주세요."
            }
        }
    }

    pub(crate) fn unhandled(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Unhandled(Arc::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unhandled_is_unexpected() {
        assert!(AuthError::InvalidCredential.is_expected());
        assert!(AuthError::RefreshFailed.is_expected());
        assert!(AuthError::NetworkUnreachable("timed out".into()).is_expected());
        assert!(AuthError::ServerRejected { status: 503 }.is_expected());
        assert!(!AuthError::unhandled(Error::Token("boom".into())).is_expected());
    }

    #[test]
    fn invalid_credential_message() {
        assert_eq!(
            AuthError::InvalidCredential.user_message(),
            "이메일 또는 비밀번호가 올바르지 않습니다."
        );
    }

    #[test]
    fn validation_message_comes_from_rule() {
        let err = AuthError::from(ValidationError::PasswordMismatch);
        assert_eq!(err.user_message(), ValidationError::PasswordMismatch.message());
    }
}
