#![doc = include_str!("../README.md")]

#[cfg(feature = "client")]
pub mod client;
pub mod clock;
pub mod collaborator;
pub mod error;
pub mod guard;
#[cfg(feature = "middleware")]
pub mod middleware;
pub mod session;
pub mod token;
pub mod types;
pub mod validation;

// Re-exports for convenient access
#[cfg(feature = "client")]
pub use client::{ApiConfig, AuthClient};
pub use clock::{Clock, ManualClock, SystemClock};
pub use collaborator::{
    CredentialVerifier, RefreshError, RefreshedTokens, RegisterError, Registrar,
    SignOutNotifier, TokenRefresher, VerifiedAccount, VerifyError,
};
pub use error::{AuthError, Error};
pub use guard::{GuardDecision, RoutePolicy};
pub use session::{
    AuthStatus, CoalescingRefresher, RefreshTokenRotation, Session, SessionConfig, SessionError,
    SessionManager, SessionReader, SessionSnapshot, SessionState, StoredSession,
};
pub use token::{SAFETY_BUFFER_MS, decode_expiry, is_expired};
pub use types::{Credential, ProfileUpdate, SignUpForm, TeamId, TokenPair, UserId, UserIdentity};
pub use validation::ValidationError;
