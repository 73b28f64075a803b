use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::collaborator::{
    CredentialVerifier, RefreshError, RefreshedTokens, RegisterError, Registrar, SignOutNotifier,
    TokenRefresher, VerifiedAccount, VerifyError,
};
use crate::error::{AuthError, Error};
use crate::types::{Credential, ProfileUpdate, SignUpForm, TeamId, TokenPair, UserIdentity};

const DEFAULT_BASE_URL: &str = "https://winereview-api.vercel.app";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Wine API connection settings.
///
/// The team id is the only required field; everything else has a default.
///
/// ```rust,ignore
/// let config = ApiConfig::new("3-1".to_string().into())
///     .with_base_url("https://staging.example.com".parse()?)
///     .with_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ApiConfig {
    pub(crate) base_url: Url,
    pub(crate) team_id: TeamId,
    pub(crate) timeout: Duration,
    pub(crate) sign_out_url: Option<Url>,
}

impl ApiConfig {
    #[must_use]
    pub fn new(team_id: TeamId) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.parse().expect("valid default URL"),
            team_id,
            timeout: DEFAULT_TIMEOUT,
            sign_out_url: None,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: Url) -> Self {
        self.base_url = url;
        self
    }

    /// Per-request timeout. A timed-out call is classified as unreachable.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Endpoint told about sign-outs. Without one, sign-out is purely local.
    #[must_use]
    pub fn with_sign_out_url(mut self, url: Url) -> Self {
        self.sign_out_url = Some(url);
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn team_id(&self) -> &TeamId {
        &self.team_id
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn sign_out_url(&self) -> Option<&Url> {
        self.sign_out_url.as_ref()
    }
}

/// HTTP client for the wine API's auth and account endpoints.
///
/// Implements every collaborator trait the session state machine needs.
pub struct AuthClient {
    config: ApiConfig,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    user: UserIdentity,
    access_token: String,
    refresh_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Maps transport failures into each caller's error type.
trait Classify: Sized {
    fn unreachable(detail: String) -> Self;
    fn unhandled(e: Error) -> Self;

    fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::unreachable("request timed out".into())
        } else if e.is_connect() || e.is_request() {
            Self::unreachable(e.to_string())
        } else {
            Self::unhandled(Error::Http(e))
        }
    }
}

impl Classify for VerifyError {
    fn unreachable(detail: String) -> Self {
        Self::Unreachable(detail)
    }
    fn unhandled(e: Error) -> Self {
        Self::Unhandled(Arc::new(e))
    }
}

impl Classify for RefreshError {
    fn unreachable(detail: String) -> Self {
        Self::Unreachable(detail)
    }
    fn unhandled(e: Error) -> Self {
        Self::Unhandled(Arc::new(e))
    }
}

impl Classify for RegisterError {
    fn unreachable(detail: String) -> Self {
        Self::Unreachable(detail)
    }
    fn unhandled(e: Error) -> Self {
        Self::Unhandled(Arc::new(e))
    }
}

impl Classify for AuthError {
    fn unreachable(detail: String) -> Self {
        Self::NetworkUnreachable(detail)
    }
    fn unhandled(e: Error) -> Self {
        Self::Unhandled(Arc::new(e))
    }
}

impl AuthClient {
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built (TLS backend failure).
    pub fn new(config: ApiConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// `{base}/{team}/{path...}`
    fn endpoint(&self, path: &[&str]) -> Result<Url, Error> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                Error::Config(format!("base URL cannot carry a path: {}", self.config.base_url))
            })?
            .pop_if_empty()
            .push(self.config.team_id.as_str())
            .extend(path);
        Ok(url)
    }

    /// Pushes a nickname/avatar change upstream and returns the stored identity.
    ///
    /// # Errors
    ///
    /// [`AuthError::Unauthenticated`] if the access token is refused,
    /// [`AuthError::NetworkUnreachable`] on transport failure,
    /// [`AuthError::ServerRejected`] for other 4xx/5xx statuses,
    /// [`AuthError::Unhandled`] for undecodable responses.
    pub async fn update_profile(
        &self,
        access_token: &str,
        update: &ProfileUpdate,
    ) -> Result<UserIdentity, AuthError> {
        let url = self.endpoint(&["users", "me"]).map_err(<AuthError as Classify>::unhandled)?;
        let response = self
            .http
            .patch(url)
            .bearer_auth(access_token)
            .json(update)
            .send()
            .await
            .map_err(AuthError::from_transport)?;

        match response.status() {
            s if s.is_success() => response
                .json::<UserIdentity>()
                .await
                .map_err(AuthError::from_transport),
            StatusCode::UNAUTHORIZED => Err(AuthError::Unauthenticated),
            s => Err(AuthError::ServerRejected { status: s.as_u16() }),
        }
    }

    /// Builds the error for a status the caller has no classification for.
    async fn unexpected_status(response: reqwest::Response, operation: &'static str) -> Error {
        let status = response.status().as_u16();
        let detail = response.text().await.unwrap_or_default();
        Error::Api {
            operation,
            status,
            detail,
        }
    }
}

impl CredentialVerifier for AuthClient {
    async fn verify(&self, credential: &Credential) -> Result<VerifiedAccount, VerifyError> {
        let url = self.endpoint(&["auth", "signIn"]).map_err(VerifyError::unhandled)?;
        let body = SignInRequest {
            email: &credential.email,
            password: credential.password(),
        };
        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(VerifyError::from_transport)?;

        let status = response.status();
        if status.is_success() {
            let body: SignInResponse = response.json().await.map_err(VerifyError::from_transport)?;
            return Ok(VerifiedAccount {
                identity: body.user,
                tokens: TokenPair {
                    access_token: body.access_token,
                    refresh_token: body.refresh_token,
                },
            });
        }
        match status {
            StatusCode::BAD_REQUEST
            | StatusCode::UNAUTHORIZED
            | StatusCode::FORBIDDEN
            | StatusCode::NOT_FOUND => Err(VerifyError::InvalidCredential),
            s if s.is_server_error() => Err(VerifyError::ServerError { status: s.as_u16() }),
            _ => Err(VerifyError::unhandled(
                Self::unexpected_status(response, "sign-in").await,
            )),
        }
    }
}

impl TokenRefresher for AuthClient {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, RefreshError> {
        let url = self
            .endpoint(&["auth", "refresh-token"])
            .map_err(RefreshError::unhandled)?;
        let response = self
            .http
            .post(url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(RefreshError::from_transport)?;

        let status = response.status();
        if status.is_success() {
            let body: RefreshResponse =
                response.json().await.map_err(RefreshError::from_transport)?;
            return Ok(RefreshedTokens {
                access_token: body.access_token,
                refresh_token: body.refresh_token,
            });
        }
        match status {
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(RefreshError::TokenRejected)
            }
            s if s.is_server_error() => Err(RefreshError::ServerError { status: s.as_u16() }),
            _ => Err(RefreshError::unhandled(
                Self::unexpected_status(response, "token refresh").await,
            )),
        }
    }
}

impl Registrar for AuthClient {
    async fn register(&self, form: &SignUpForm) -> Result<(), RegisterError> {
        let url = self.endpoint(&["auth", "signUp"]).map_err(RegisterError::unhandled)?;
        let response = self
            .http
            .post(url)
            .json(form)
            .send()
            .await
            .map_err(RegisterError::from_transport)?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::BAD_REQUEST | StatusCode::CONFLICT => Err(RegisterError::Conflict),
            s if s.is_server_error() => Err(RegisterError::ServerError { status: s.as_u16() }),
            _ => Err(RegisterError::unhandled(
                Self::unexpected_status(response, "sign-up").await,
            )),
        }
    }
}

impl SignOutNotifier for AuthClient {
    async fn notify_sign_out(&self, access_token: &str) -> Result<(), Error> {
        let Some(url) = self.config.sign_out_url.clone() else {
            return Ok(());
        };
        let response = self.http.post(url).bearer_auth(access_token).send().await?;
        if response.status().is_success() {
            return Ok(());
        }
        Err(Self::unexpected_status(response, "sign-out").await)
    }
}
