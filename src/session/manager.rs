use std::sync::Arc;

use tokio::sync::{Mutex, watch};

use super::{AuthStatus, Session, SessionConfig, SessionSnapshot, SessionState};
use crate::clock::{Clock, SystemClock};
use crate::collaborator::{
    CredentialVerifier, RefreshError, RefreshedTokens, Registrar, TokenRefresher, VerifiedAccount,
    VerifyError,
};
use crate::error::{AuthError, Error};
use crate::types::{Credential, ProfileUpdate, SignUpForm, UserIdentity};
use crate::validation;

#[derive(Debug, Clone, Default)]
struct Slot {
    session: Option<Session>,
    refreshing: bool,
    /// Bumped by every sign-in and sign-out. A refresh started under an older
    /// generation must not touch the slot.
    generation: u64,
}

impl Slot {
    fn state(&self) -> SessionState {
        match &self.session {
            None => SessionState::Unauthenticated,
            Some(session) => SessionState::Authenticated {
                session: session.clone(),
                refreshing: self.refreshing,
            },
        }
    }
}

enum Access {
    Ready(String),
    NeedsRefresh { generation: u64, refresh_token: String },
}

fn evaluate(slot: &Slot, now_ms: i64) -> Result<Access, AuthError> {
    let Some(session) = &slot.session else {
        return Err(AuthError::Unauthenticated);
    };
    if session.error().is_some() {
        return Err(AuthError::RefreshFailed);
    }
    if !session.is_access_token_expired(now_ms) {
        return Ok(Access::Ready(session.tokens().access_token.clone()));
    }
    Ok(Access::NeedsRefresh {
        generation: slot.generation,
        refresh_token: session.tokens().refresh_token.clone(),
    })
}

/// Owner of one session and the only code path that mutates it.
///
/// Mutators: [`sign_in`](Self::sign_in), [`access_requested`](Self::access_requested),
/// [`sign_out`](Self::sign_out), [`update_profile`](Self::update_profile).
/// Readers get clones through [`state`](Self::state) or a [`SessionReader`].
///
/// At most one refresh runs at a time. Callers that find the access token
/// inside the safety buffer while a refresh is running wait for it and then
/// re-evaluate instead of calling the refresher themselves.
pub struct SessionManager<V, R> {
    verifier: V,
    refresher: R,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    slot: watch::Sender<Slot>,
    refresh_gate: Mutex<()>,
}

impl<V, R> SessionManager<V, R>
where
    V: CredentialVerifier,
    R: TokenRefresher,
{
    #[must_use]
    pub fn new(verifier: V, refresher: R) -> Self {
        let (slot, _) = watch::channel(Slot::default());
        Self {
            verifier,
            refresher,
            config: SessionConfig::default(),
            clock: Arc::new(SystemClock),
            slot,
            refresh_gate: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Resume a previously persisted session.
    #[must_use]
    pub fn with_session(self, session: Session) -> Self {
        self.slot.send_modify(|slot| {
            slot.session = Some(session);
            slot.refreshing = false;
            slot.generation += 1;
        });
        self
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.slot.borrow().state()
    }

    #[must_use]
    pub fn status(&self) -> AuthStatus {
        self.state().status()
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.slot.borrow().session.as_ref().map(Session::snapshot)
    }

    #[must_use]
    pub fn subscribe(&self) -> SessionReader {
        SessionReader {
            rx: self.slot.subscribe(),
        }
    }

    /// Verifies `credential` and replaces whatever session was held.
    ///
    /// On failure the current state is left untouched.
    ///
    /// # Errors
    ///
    /// [`AuthError::ValidationFailed`] before any network call,
    /// [`AuthError::InvalidCredential`], [`AuthError::NetworkUnreachable`] or
    /// [`AuthError::ServerRejected`] for classified verifier failures, and
    /// [`AuthError::Unhandled`] for anything else the verifier raised.
    pub async fn sign_in(&self, credential: Credential) -> Result<SessionSnapshot, AuthError> {
        validation::validate_sign_in(&credential)?;

        let verified = self.call_verifier(&credential).await.map_err(|e| {
            match &e {
                VerifyError::Unhandled(inner) => {
                    tracing::error!(error = %inner, "Credential verifier failed unexpectedly");
                }
                other => tracing::warn!(error = %other, "Sign-in rejected"),
            }
            AuthError::from(e)
        })?;

        let session = Session::new(verified.identity, verified.tokens, self.clock.now_ms());
        let snapshot = session.snapshot();
        self.slot.send_modify(|slot| {
            slot.session = Some(session);
            slot.refreshing = false;
            slot.generation += 1;
        });

        tracing::info!(user_id = %snapshot.user.id, "Signed in");
        Ok(snapshot)
    }

    /// Validates `form`, registers the account, then signs in with the same credential.
    ///
    /// # Errors
    ///
    /// [`AuthError::ValidationFailed`], [`AuthError::RegistrationConflict`], and
    /// everything [`sign_in`](Self::sign_in) can return.
    pub async fn sign_up<G: Registrar>(
        &self,
        registrar: &G,
        form: SignUpForm,
    ) -> Result<SessionSnapshot, AuthError> {
        validation::validate_sign_up(&form)?;

        registrar.register(&form).await.map_err(|e| {
            tracing::warn!(error = %e, email = %form.email, "Registration failed");
            AuthError::from(e)
        })?;

        self.sign_in(form.credential()).await
    }

    /// Returns a usable access token, refreshing it first if it is inside the
    /// safety buffer.
    ///
    /// # Errors
    ///
    /// [`AuthError::Unauthenticated`] with no session, [`AuthError::RefreshFailed`]
    /// if this or an earlier refresh failed, [`AuthError::Unhandled`] if the
    /// refresher raised something unclassified (the session is marked failed
    /// either way).
    pub async fn access_requested(&self) -> Result<String, AuthError> {
        loop {
            let access = evaluate(&self.slot.borrow(), self.clock.now_ms())?;
            if let Access::Ready(token) = access {
                return Ok(token);
            }

            let _gate = self.refresh_gate.lock().await;

            // Whoever held the gate may have refreshed, failed, or the session
            // may have been replaced while we waited.
            let (generation, refresh_token) = match self.claim_refresh()? {
                Access::Ready(token) => return Ok(token),
                Access::NeedsRefresh {
                    generation,
                    refresh_token,
                } => (generation, refresh_token),
            };
            let _claim = ClaimGuard {
                slot: &self.slot,
                generation,
            };

            tracing::debug!(generation, "Refreshing access token");
            let result = self.call_refresher(&refresh_token).await;

            match self.settle_refresh(generation, result) {
                Some(outcome) => return outcome,
                None => {
                    tracing::debug!(generation, "Discarding refresh result for a replaced session");
                }
            }
        }
    }

    /// Clears the session immediately, whatever state it is in.
    ///
    /// A refresh still in flight is orphaned: its result is discarded when it
    /// arrives. Returns the cleared session so the caller can notify the server.
    pub fn sign_out(&self) -> Option<Session> {
        let mut cleared = None;
        self.slot.send_if_modified(|slot| {
            cleared = slot.session.take();
            slot.refreshing = false;
            slot.generation += 1;
            cleared.is_some()
        });
        if let Some(session) = &cleared {
            tracing::info!(user_id = %session.identity().id, "Signed out");
        }
        cleared
    }

    /// Merges nickname/avatar into the current identity. Tokens are untouched.
    ///
    /// # Errors
    ///
    /// [`AuthError::ValidationFailed`] for a bad nickname,
    /// [`AuthError::Unauthenticated`] with no session.
    pub fn update_profile(&self, update: &ProfileUpdate) -> Result<SessionSnapshot, AuthError> {
        validation::validate_profile_update(update)?;

        let mut result = Err(AuthError::Unauthenticated);
        self.slot.send_if_modified(|slot| match slot.session.as_mut() {
            Some(session) => {
                session.merge_profile(update);
                result = Ok(session.snapshot());
                true
            }
            None => false,
        });
        result
    }

    /// Takes nickname and avatar from the identity the server returned for a
    /// profile change.
    ///
    /// # Errors
    ///
    /// [`AuthError::Unauthenticated`] with no session. An identity for another
    /// account leaves the session alone and is [`AuthError::Unhandled`].
    pub fn apply_profile(&self, server: &UserIdentity) -> Result<SessionSnapshot, AuthError> {
        let mut result = Err(AuthError::Unauthenticated);
        self.slot.send_if_modified(|slot| match slot.session.as_mut() {
            Some(session) if session.identity().id != server.id => {
                result = Err(AuthError::unhandled(Error::IdentityMismatch {
                    expected: session.identity().id,
                    returned: server.id,
                }));
                false
            }
            Some(session) => {
                session.adopt_profile(server);
                result = Ok(session.snapshot());
                true
            }
            None => false,
        });
        result
    }

    fn claim_refresh(&self) -> Result<Access, AuthError> {
        let now_ms = self.clock.now_ms();
        let mut access = Err(AuthError::Unauthenticated);
        self.slot.send_if_modified(|slot| {
            access = evaluate(slot, now_ms);
            let claimed = matches!(access, Ok(Access::NeedsRefresh { .. }));
            if claimed {
                slot.refreshing = true;
            }
            claimed
        });
        access
    }

    /// Applies a refresh outcome if the session is still the one that was refreshed.
    /// `None` means the result was stale.
    fn settle_refresh(
        &self,
        generation: u64,
        result: Result<RefreshedTokens, RefreshError>,
    ) -> Option<Result<String, AuthError>> {
        let now_ms = self.clock.now_ms();
        let rotation = self.config.rotation;
        let mut outcome = None;

        self.slot.send_if_modified(|slot| {
            if slot.generation != generation {
                return false;
            }
            slot.refreshing = false;
            let Some(session) = slot.session.as_mut() else {
                outcome = Some(Err(AuthError::Unauthenticated));
                return true;
            };
            match &result {
                Ok(refreshed) => {
                    session.apply_refresh(refreshed.clone(), rotation, now_ms);
                    outcome = Some(Ok(session.tokens().access_token.clone()));
                }
                Err(e) => {
                    session.mark_refresh_failed();
                    outcome = Some(Err(AuthError::from(e.clone())));
                }
            }
            true
        });

        match (&outcome, &result) {
            (Some(Ok(_)), _) => tracing::debug!("Access token refreshed"),
            (Some(Err(_)), Err(RefreshError::Unhandled(inner))) => {
                tracing::error!(error = %inner, "Token refresher failed unexpectedly");
            }
            (Some(Err(_)), Err(e)) => tracing::warn!(error = %e, "Access token refresh failed"),
            _ => {}
        }
        outcome
    }

    async fn call_verifier(&self, credential: &Credential) -> Result<VerifiedAccount, VerifyError> {
        let call = self.verifier.verify(credential);
        match self.config.call_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
                Err(VerifyError::Unreachable(format!("timed out after {limit:?}")))
            }),
            None => call.await,
        }
    }

    async fn call_refresher(&self, refresh_token: &str) -> Result<RefreshedTokens, RefreshError> {
        let call = self.refresher.refresh(refresh_token);
        match self.config.call_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
                Err(RefreshError::Unreachable(format!("timed out after {limit:?}")))
            }),
            None => call.await,
        }
    }
}

/// Clears the `refreshing` flag if the refreshing caller goes away early.
struct ClaimGuard<'a> {
    slot: &'a watch::Sender<Slot>,
    generation: u64,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        self.slot.send_if_modified(|slot| {
            let stale = slot.generation == self.generation && slot.refreshing;
            if stale {
                slot.refreshing = false;
            }
            stale
        });
    }
}

/// Read-only handle on a [`SessionManager`]'s state.
#[derive(Clone)]
pub struct SessionReader {
    rx: watch::Receiver<Slot>,
}

impl SessionReader {
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.rx.borrow().state()
    }

    /// Waits for the next change. Returns `None` once the manager is gone.
    pub async fn changed(&mut self) -> Option<SessionState> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().state())
    }
}
