//! Contracts for the remote services the session lifecycle depends on.
//!
//! [`AuthClient`](crate::client::AuthClient) implements all of them against the
//! wine API; tests substitute in-memory fakes.

use std::future::Future;
use std::sync::Arc;

use crate::error::{AuthError, BoxError, Error};
use crate::types::{Credential, SignUpForm, TokenPair, UserIdentity};

/// Result of a successful credential check.
#[derive(Debug, Clone)]
pub struct VerifiedAccount {
    pub identity: UserIdentity,
    pub tokens: TokenPair,
}

/// Result of a successful refresh.
#[derive(Clone)]
pub struct RefreshedTokens {
    pub access_token: String,
    /// Present when the issuer rotates refresh tokens on use.
    pub refresh_token: Option<String>,
}

impl std::fmt::Debug for RefreshedTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshedTokens")
            .field("rotated", &self.refresh_token.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum VerifyError {
    #[error("invalid credential")]
    InvalidCredential,
    #[error("verifier unreachable: {0}")]
    Unreachable(String),
    #[error("verifier server error (status {status})")]
    ServerError { status: u16 },
    #[error("{0}")]
    Unhandled(BoxError),
}

#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum RefreshError {
    #[error("refresh token rejected")]
    TokenRejected,
    #[error("refresher unreachable: {0}")]
    Unreachable(String),
    #[error("refresher server error (status {status})")]
    ServerError { status: u16 },
    #[error("{0}")]
    Unhandled(BoxError),
}

#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum RegisterError {
    /// Duplicate email or nickname.
    #[error("registration conflict")]
    Conflict,
    #[error("registrar unreachable: {0}")]
    Unreachable(String),
    #[error("registrar server error (status {status})")]
    ServerError { status: u16 },
    #[error("{0}")]
    Unhandled(BoxError),
}

impl From<VerifyError> for AuthError {
    fn from(e: VerifyError) -> Self {
        match e {
            VerifyError::InvalidCredential => Self::InvalidCredential,
            VerifyError::Unreachable(detail) => Self::NetworkUnreachable(detail),
            VerifyError::ServerError { status } => Self::ServerRejected { status },
            VerifyError::Unhandled(inner) => Self::Unhandled(inner),
        }
    }
}

impl From<RefreshError> for AuthError {
    /// Every expected refresh failure collapses into `RefreshFailed`.
    fn from(e: RefreshError) -> Self {
        match e {
            RefreshError::TokenRejected
            | RefreshError::Unreachable(_)
            | RefreshError::ServerError { .. } => Self::RefreshFailed,
            RefreshError::Unhandled(inner) => Self::Unhandled(inner),
        }
    }
}

impl From<RegisterError> for AuthError {
    fn from(e: RegisterError) -> Self {
        match e {
            RegisterError::Conflict => Self::RegistrationConflict,
            RegisterError::Unreachable(detail) => Self::NetworkUnreachable(detail),
            RegisterError::ServerError { status } => Self::ServerRejected { status },
            RegisterError::Unhandled(inner) => Self::Unhandled(inner),
        }
    }
}

/// Checks email + password and issues a token pair.
pub trait CredentialVerifier: Send + Sync + 'static {
    fn verify(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<VerifiedAccount, VerifyError>> + Send;
}

/// Exchanges a refresh token for a new access token.
///
/// Calling it twice with the same still-valid token is assumed safe, nothing more.
pub trait TokenRefresher: Send + Sync + 'static {
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<RefreshedTokens, RefreshError>> + Send;
}

/// Creates an account.
pub trait Registrar: Send + Sync + 'static {
    fn register(&self, form: &SignUpForm) -> impl Future<Output = Result<(), RegisterError>> + Send;
}

/// Best-effort server-side notification of a sign-out.
pub trait SignOutNotifier: Send + Sync + 'static {
    fn notify_sign_out(&self, access_token: &str) -> impl Future<Output = Result<(), Error>> + Send;
}

impl<T: CredentialVerifier> CredentialVerifier for Arc<T> {
    fn verify(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<VerifiedAccount, VerifyError>> + Send {
        (**self).verify(credential)
    }
}

impl<T: TokenRefresher> TokenRefresher for Arc<T> {
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<RefreshedTokens, RefreshError>> + Send {
        (**self).refresh(refresh_token)
    }
}

impl<T: Registrar> Registrar for Arc<T> {
    fn register(&self, form: &SignUpForm) -> impl Future<Output = Result<(), RegisterError>> + Send {
        (**self).register(form)
    }
}

impl<T: SignOutNotifier> SignOutNotifier for Arc<T> {
    fn notify_sign_out(&self, access_token: &str) -> impl Future<Output = Result<(), Error>> + Send {
        (**self).notify_sign_out(access_token)
    }
}

/// Fires the sign-out notification on a background task.
///
/// The local session is already gone when this is called; the outcome is only logged.
pub fn spawn_sign_out_notice<N: SignOutNotifier>(notifier: Arc<N>, access_token: String) {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify_sign_out(&access_token).await {
            tracing::warn!(error = %e, "Sign-out notification failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_refresh_failures_collapse() {
        for e in [
            RefreshError::TokenRejected,
            RefreshError::Unreachable("timed out".into()),
            RefreshError::ServerError { status: 502 },
        ] {
            assert!(matches!(AuthError::from(e), AuthError::RefreshFailed));
        }
    }

    #[test]
    fn unhandled_errors_pass_through() {
        let inner: BoxError = Arc::new(Error::Token("weird".into()));
        let err = AuthError::from(VerifyError::Unhandled(inner));
        assert!(!err.is_expected());
        assert!(err.to_string().contains("weird"));
    }

    #[test]
    fn register_conflict_maps_to_registration_conflict() {
        assert!(matches!(
            AuthError::from(RegisterError::Conflict),
            AuthError::RegistrationConflict
        ));
    }
}
