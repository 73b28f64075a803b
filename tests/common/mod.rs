#![allow(dead_code)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{patch, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};
use time::OffsetDateTime;
use url::Url;
use wine_accounts::{ApiConfig, AuthClient};

pub const TEAM: &str = "3-1";
pub const EMAIL: &str = "hyun@test.com";
pub const PASSWORD: &str = "wine1234!";

/// Unsigned JWT expiring `ttl_secs` from now.
pub fn jwt(ttl_secs: i64) -> String {
    let exp = OffsetDateTime::now_utc().unix_timestamp() + ttl_secs;
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"id":1379,"scope":"access","exp":{exp}}}"#));
    format!("{header}.{payload}.sig")
}

/// Knobs and counters of the fake wine API.
pub struct Upstream {
    /// Lifetime of access tokens issued at sign-in.
    pub access_ttl_secs: AtomicI64,
    /// Non-zero makes the refresh endpoint answer with this status.
    pub refresh_status: AtomicU16,
    /// Issue a new refresh token on every refresh. A rotated-out token is
    /// rejected if presented again.
    pub rotate: AtomicBool,
    pub refresh_delay_ms: AtomicI64,
    pub sign_in_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,
    pub last_refresh_token: Mutex<Option<String>>,
    /// Account id reported by `PATCH users/me`.
    pub profile_id: AtomicI64,
    consumed: Mutex<HashSet<String>>,
    registered: Mutex<HashSet<String>>,
    nickname: Mutex<String>,
}

impl Default for Upstream {
    fn default() -> Self {
        Self {
            access_ttl_secs: AtomicI64::new(3600),
            refresh_status: AtomicU16::new(0),
            rotate: AtomicBool::new(false),
            refresh_delay_ms: AtomicI64::new(0),
            sign_in_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
            last_refresh_token: Mutex::new(None),
            profile_id: AtomicI64::new(1379),
            consumed: Mutex::new(HashSet::new()),
            registered: Mutex::new(HashSet::from([EMAIL.to_string()])),
            nickname: Mutex::new("hyun".into()),
        }
    }
}

impl Upstream {
    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Running fake API plus a client pointed at it.
pub struct TestApi {
    pub addr: SocketAddr,
    pub upstream: Arc<Upstream>,
}

impl TestApi {
    pub fn base_url(&self) -> Url {
        format!("http://{}", self.addr).parse().unwrap()
    }

    pub fn config(&self) -> ApiConfig {
        ApiConfig::new(TEAM.to_string().into())
            .with_base_url(self.base_url())
            .with_sign_out_url(format!("http://{}/signout-notify", self.addr).parse().unwrap())
    }

    pub fn client(&self) -> AuthClient {
        AuthClient::new(self.config()).unwrap()
    }
}

pub async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

pub async fn spawn_api() -> TestApi {
    let upstream = Arc::new(Upstream::default());
    let router = Router::new()
        .route("/{team}/auth/signIn", post(sign_in))
        .route("/{team}/auth/signUp", post(sign_up))
        .route("/{team}/auth/refresh-token", post(refresh))
        .route("/{team}/users/me", patch(update_me))
        .route("/signout-notify", post(sign_out_notify))
        .with_state(Arc::clone(&upstream));
    let addr = serve(router).await;
    TestApi { addr, upstream }
}

/// Address with nothing listening on it.
pub async fn dead_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

fn user(upstream: &Upstream, email: &str) -> Value {
    json!({
        "id": 1379,
        "email": email,
        "nickname": upstream.nickname.lock().unwrap().clone(),
        "image": null,
        "teamId": TEAM,
        "createdAt": "2024-07-01T09:00:00Z",
        "updatedAt": "2024-07-01T09:00:00Z",
    })
}

fn message(status: StatusCode, text: &str) -> Response {
    (status, Json(json!({ "message": text }))).into_response()
}

async fn sign_in(
    State(upstream): State<Arc<Upstream>>,
    Path(_team): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    upstream.sign_in_calls.fetch_add(1, Ordering::SeqCst);
    let email = body["email"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();

    match email {
        "boom@test.com" => return message(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
        "teapot@test.com" => return message(StatusCode::IM_A_TEAPOT, "teapot"),
        "slow@test.com" => tokio::time::sleep(Duration::from_secs(5)).await,
        _ => {}
    }
    let known = upstream.registered.lock().unwrap().contains(email);
    if !known || password != PASSWORD {
        return message(StatusCode::BAD_REQUEST, "이메일 혹은 비밀번호를 확인해주세요.");
    }

    let ttl = upstream.access_ttl_secs.load(Ordering::SeqCst);
    Json(json!({
        "user": user(&upstream, email),
        "accessToken": jwt(ttl),
        "refreshToken": "rt-0",
    }))
    .into_response()
}

async fn sign_up(
    State(upstream): State<Arc<Upstream>>,
    Path(_team): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let email = body["email"].as_str().unwrap_or_default().to_string();
    if email == "taken@test.com" {
        return message(StatusCode::BAD_REQUEST, "이미 사용중인 이메일입니다.");
    }
    if let Some(nickname) = body["nickname"].as_str() {
        *upstream.nickname.lock().unwrap() = nickname.to_string();
    }
    upstream.registered.lock().unwrap().insert(email.clone());
    Json(json!({
        "user": user(&upstream, &email),
        "accessToken": jwt(3600),
        "refreshToken": "rt-0",
    }))
    .into_response()
}

async fn refresh(
    State(upstream): State<Arc<Upstream>>,
    Path(_team): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let n = upstream.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
    let presented = body["refreshToken"].as_str().unwrap_or_default().to_owned();
    *upstream.last_refresh_token.lock().unwrap() = Some(presented.clone());

    let delay = upstream.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay.unsigned_abs())).await;
    }

    match upstream.refresh_status.load(Ordering::SeqCst) {
        0 => {}
        status => {
            let status = StatusCode::from_u16(status).unwrap();
            return message(status, "refresh rejected");
        }
    }

    let mut body = json!({ "accessToken": jwt(3600) });
    if upstream.rotate.load(Ordering::SeqCst) {
        if !upstream.consumed.lock().unwrap().insert(presented) {
            return message(StatusCode::UNAUTHORIZED, "refresh token already used");
        }
        body["refreshToken"] = json!(format!("rt-{n}"));
    }
    Json(body).into_response()
}

async fn update_me(
    State(upstream): State<Arc<Upstream>>,
    Path(_team): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Bearer ") && v.len() > "Bearer ".len());
    if !authorized {
        return message(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    if let Some(nickname) = body["nickname"].as_str() {
        *upstream.nickname.lock().unwrap() = nickname.trim().to_string();
    }
    let mut me = user(&upstream, EMAIL);
    me["id"] = json!(upstream.profile_id.load(Ordering::SeqCst));
    me["updatedAt"] = json!("2024-08-15T12:00:00Z");
    Json(me).into_response()
}

async fn sign_out_notify(State(upstream): State<Arc<Upstream>>, headers: HeaderMap) -> StatusCode {
    if headers.get("authorization").is_none() {
        return StatusCode::UNAUTHORIZED;
    }
    upstream.sign_out_calls.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

/// Polls `counter` until it reaches `expected` or a second passes.
pub async fn eventually(counter: &AtomicUsize, expected: usize) -> bool {
    for _ in 0..100 {
        if counter.load(Ordering::SeqCst) >= expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
