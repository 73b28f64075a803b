use std::borrow::Cow;

use crate::session::AuthStatus;

/// Outcome of a route check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect(String),
}

/// Path pattern matched segment by segment as a prefix. `*` matches any one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PathPattern(Vec<String>);

impl PathPattern {
    fn parse(pattern: &str) -> Self {
        Self(segments(pattern))
    }

    fn matches(&self, path: &str) -> bool {
        let actual = segments(path);
        self.0.len() <= actual.len()
            && self
                .0
                .iter()
                .zip(&actual)
                .all(|(expected, segment)| expected == "*" || expected == segment)
    }
}

/// Segments of `path` as a server would resolve it: query and fragment cut,
/// percent-escapes decoded, `.` dropped and `..` applied.
fn segments(path: &str) -> Vec<String> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let decoded = urlencoding::decode(path).unwrap_or(Cow::Borrowed(path));
    let mut resolved = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                resolved.pop();
            }
            segment => resolved.push(segment.to_owned()),
        }
    }
    resolved
}

/// Whether `path` is `prefix` itself or lies below it. `/api/authority` is not
/// under `/api/auth`.
#[cfg_attr(not(feature = "middleware"), allow(dead_code))]
pub(crate) fn is_under(path: &str, prefix: &str) -> bool {
    segments(path).starts_with(&segments(prefix))
}

/// Which paths need a session and which ones a signed-in user should skip.
///
/// Rules, first match wins:
/// 1. authenticated (fresh or refreshing) on a sign-in/sign-up entry path → redirect home;
/// 2. not authenticated (no session or failed refresh) on a protected path → redirect to sign-in;
/// 3. otherwise allow.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    entry_paths: Vec<PathPattern>,
    protected: Vec<PathPattern>,
    home_path: String,
    sign_in_path: String,
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self {
            entry_paths: ["/signin", "/signup"].map(PathPattern::parse).to_vec(),
            protected: ["/myprofile", "/wines/new", "/wines/*/edit"]
                .map(PathPattern::parse)
                .to_vec(),
            home_path: "/".into(),
            sign_in_path: "/signin".into(),
        }
    }
}

impl RoutePolicy {
    /// Replace the auth entry paths (default: `/signin`, `/signup`).
    #[must_use]
    pub fn with_entry_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.entry_paths = paths.into_iter().map(|p| PathPattern::parse(p.as_ref())).collect();
        self
    }

    /// Replace the protected prefixes (default: `/myprofile`, `/wines/new`, `/wines/*/edit`).
    #[must_use]
    pub fn with_protected<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.protected = paths.into_iter().map(|p| PathPattern::parse(p.as_ref())).collect();
        self
    }

    #[must_use]
    pub fn with_home_path(mut self, path: impl Into<String>) -> Self {
        self.home_path = path.into();
        self
    }

    #[must_use]
    pub fn with_sign_in_path(mut self, path: impl Into<String>) -> Self {
        self.sign_in_path = path.into();
        self
    }

    #[must_use]
    pub fn sign_in_path(&self) -> &str {
        &self.sign_in_path
    }

    #[must_use]
    pub fn is_protected(&self, path: &str) -> bool {
        self.protected.iter().any(|p| p.matches(path))
    }

    #[must_use]
    pub fn is_entry(&self, path: &str) -> bool {
        self.entry_paths.iter().any(|p| p.matches(path))
    }

    #[must_use]
    pub fn evaluate(&self, status: AuthStatus, path: &str) -> GuardDecision {
        let authenticated = status.is_authenticated();
        if authenticated && self.is_entry(path) {
            return GuardDecision::Redirect(self.home_path.clone());
        }
        if !authenticated && self.is_protected(path) {
            return GuardDecision::Redirect(self.sign_in_path.clone());
        }
        GuardDecision::Allow
    }
}
