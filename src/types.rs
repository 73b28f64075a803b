use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Wine API account identifier.
///
/// Immutable for the lifetime of a session; switching accounts means a new session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Team namespace the account belongs to (first path segment of every API call).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct TeamId(pub String);

impl TeamId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Email + password for a single sign-in call.
///
/// Never persisted. `Debug` redacts the password.
#[derive(Clone, Deserialize)]
pub struct Credential {
    pub email: String,
    password: String,
}

impl Credential {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Access + refresh token pair issued at sign-in.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Account snapshot fetched at authentication time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub id: UserId,
    pub email: String,
    pub nickname: String,
    /// Avatar URL.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub team_id: TeamId,
}

impl UserIdentity {
    /// Merges the display fields of `update`. `id` and everything else stay put.
    pub(crate) fn merge(&mut self, update: &ProfileUpdate) {
        if let Some(nickname) = &update.nickname {
            self.nickname.clone_from(nickname);
        }
        if let Some(image) = &update.image {
            self.image = image.clone();
        }
    }

    /// Takes the display fields the server reports for this account.
    pub(crate) fn adopt_profile(&mut self, server: &UserIdentity) {
        self.nickname.clone_from(&server.nickname);
        self.image.clone_from(&server.image);
        self.updated_at = server.updated_at;
    }
}

/// Sign-up form as submitted.
#[derive(Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpForm {
    pub email: String,
    pub nickname: String,
    pub password: String,
    pub password_confirmation: String,
}

impl SignUpForm {
    /// The credential used for the automatic sign-in after registration.
    #[must_use]
    pub fn credential(&self) -> Credential {
        Credential::new(self.email.clone(), self.password.clone())
    }
}

impl std::fmt::Debug for SignUpForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignUpForm")
            .field("email", &self.email)
            .field("nickname", &self.nickname)
            .finish_non_exhaustive()
    }
}

/// Partial profile update. `image: Some(None)` clears the avatar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "double_option"
    )]
    pub image: Option<Option<String>>,
}

// Distinguishes an absent `image` key from an explicit `null`.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub(super) fn serialize<S: Serializer>(
        value: &Option<Option<String>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Option<String>>, D::Error> {
        Option::<String>::deserialize(deserializer).map(Some)
    }
}
