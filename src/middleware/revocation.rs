use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Refresh tokens whose sessions were signed out.
///
/// Requests restore their session from the cookie they arrived with, so a
/// request that started before a sign-out can still hold the old session when
/// it finishes. The session layer consults this list and drops such sessions
/// instead of writing them back. Entries are kept as long as a session cookie
/// can live.
#[derive(Clone)]
pub(super) struct RevokedTokens {
    entries: Arc<Mutex<HashMap<String, i64>>>,
    retain_ms: i64,
}

impl RevokedTokens {
    pub(super) fn new(retain_ms: i64) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            retain_ms,
        }
    }

    pub(super) fn revoke(&self, refresh_token: &str, now_ms: i64) {
        let retain_ms = self.retain_ms;
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, at_ms| now_ms - *at_ms < retain_ms);
        entries.insert(refresh_token.to_owned(), now_ms);
    }

    pub(super) fn is_revoked(&self, refresh_token: &str, now_ms: i64) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(refresh_token)
            .is_some_and(|at_ms| now_ms - at_ms < self.retain_ms)
    }
}
