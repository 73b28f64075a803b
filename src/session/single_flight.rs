use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};

use crate::clock::{Clock, SystemClock};
use crate::collaborator::{RefreshError, RefreshedTokens, TokenRefresher};
use crate::token::SAFETY_BUFFER_MS;

type InFlight = Shared<BoxFuture<'static, Result<RefreshedTokens, RefreshError>>>;

enum Entry {
    InFlight(InFlight),
    /// Successful result, replayed to late callers still holding the old refresh token.
    Settled {
        tokens: RefreshedTokens,
        at_ms: i64,
    },
}

enum Joined {
    Pending(InFlight),
    Settled(RefreshedTokens),
}

type Registry = Arc<Mutex<HashMap<String, Entry>>>;

/// Merges concurrent refreshes of the same refresh token into one upstream call.
///
/// A [`SessionManager`](super::SessionManager) already serializes refreshes of
/// its own session. When a server restores a fresh manager from the session
/// cookie on every request, parallel requests carrying the same cookie would
/// each own a manager; wrapping the shared refresher in this type keeps them
/// down to a single call per refresh token.
///
/// A successful result stays available for a grace window (the token safety
/// buffer by default). A request that still carries the pre-refresh cookie gets
/// the same tokens instead of presenting an already rotated refresh token.
pub struct CoalescingRefresher<R> {
    inner: Arc<R>,
    registry: Registry,
    clock: Arc<dyn Clock>,
    grace_ms: i64,
}

impl<R> Clone for CoalescingRefresher<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            registry: Arc::clone(&self.registry),
            clock: Arc::clone(&self.clock),
            grace_ms: self.grace_ms,
        }
    }
}

impl<R: TokenRefresher> CoalescingRefresher<R> {
    #[must_use]
    pub fn new(inner: Arc<R>) -> Self {
        Self {
            inner,
            registry: Arc::new(Mutex::new(HashMap::new())),
            clock: Arc::new(SystemClock),
            grace_ms: SAFETY_BUFFER_MS,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// How long a finished refresh is replayed. Zero disables replay.
    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace_ms = i64::try_from(grace.as_millis()).unwrap_or(i64::MAX);
        self
    }

    /// Drops whatever is recorded for `refresh_token`.
    ///
    /// A call still in flight completes for the callers already waiting on it,
    /// but its result is not kept for replay. Returns the refresh token a
    /// settled refresh rotated to, if any.
    pub fn forget(&self, refresh_token: &str) -> Option<String> {
        let entry = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(refresh_token);
        match entry {
            Some(Entry::Settled { tokens, .. }) => tokens.refresh_token,
            _ => None,
        }
    }

    fn join_or_start(&self, refresh_token: &str) -> Joined {
        let now_ms = self.clock.now_ms();
        let grace_ms = self.grace_ms;
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.retain(|_, entry| match entry {
            Entry::InFlight(_) => true,
            Entry::Settled { at_ms, .. } => now_ms - *at_ms < grace_ms,
        });

        match registry.get(refresh_token) {
            Some(Entry::InFlight(call)) => {
                tracing::debug!("Joining in-flight refresh");
                return Joined::Pending(call.clone());
            }
            Some(Entry::Settled { tokens, .. }) => {
                tracing::debug!("Replaying settled refresh");
                return Joined::Settled(tokens.clone());
            }
            None => {}
        }

        let inner = Arc::clone(&self.inner);
        let shared_registry = Arc::clone(&self.registry);
        let clock = Arc::clone(&self.clock);
        let token = refresh_token.to_owned();
        let call = async move {
            let result = inner.refresh(&token).await;
            let mut registry = shared_registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            // `forget` may have dropped the entry meanwhile; leave it dropped.
            if matches!(registry.get(&token), Some(Entry::InFlight(_))) {
                match &result {
                    Ok(tokens) if grace_ms > 0 => {
                        registry.insert(
                            token,
                            Entry::Settled {
                                tokens: tokens.clone(),
                                at_ms: clock.now_ms(),
                            },
                        );
                    }
                    _ => {
                        registry.remove(&token);
                    }
                }
            }
            result
        }
        .boxed()
        .shared();

        registry.insert(refresh_token.to_owned(), Entry::InFlight(call.clone()));
        Joined::Pending(call)
    }
}

impl<R: TokenRefresher> TokenRefresher for CoalescingRefresher<R> {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, RefreshError> {
        match self.join_or_start(refresh_token) {
            Joined::Pending(call) => call.await,
            Joined::Settled(tokens) => Ok(tokens),
        }
    }
}
