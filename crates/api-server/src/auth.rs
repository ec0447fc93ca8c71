use account_store::{NewUser, StoreError, User};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::net::SocketAddr;

use crate::{ApiResponse, AppError, AppState, FieldErrors};

#[cfg(test)]
#[path = "auth_tests.rs"]
mod auth_tests;

pub const SESSION_COOKIE: &str = "session";

const LOGIN_FAILED: &str = "Please enter a correct username and password.";

/// SHA-256 hex of a session token. Only the hash is stored.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_session_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// Per-request view of the logged-in user, inserted by `require_session`.
#[derive(Clone, Debug)]
pub struct SessionContext {
    pub user: User,
    pub session_hash: String,
    pub has_brokerage_connection: bool,
}

/// Session token from `Authorization: Bearer` or the session cookie.
pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
}

pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_session_token(request.headers()).ok_or_else(AppError::unauthorized)?;
    let session_hash = hash_token(&token);

    let session = state
        .sessions
        .find_active(&session_hash, Utc::now())
        .await?
        .ok_or_else(AppError::unauthorized)?;
    let user = state
        .users
        .find_by_id(session.user_id)
        .await?
        .ok_or_else(AppError::unauthorized)?;

    tracing::debug!(user_id = user.id, "Session accepted");
    request.extensions_mut().insert(SessionContext {
        user,
        session_hash,
        has_brokerage_connection: session.has_brokerage_connection,
    });

    Ok(next.run(request).await)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login/", post(login))
        .route("/auth/register/", post(register))
}

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/logout/", get(logout).post(logout))
        .route("/auth/me", get(me))
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub password1: String,
    #[serde(default)]
    pub password2: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub session_token: String,
    pub redirect_to: &'static str,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub redirect_to: &'static str,
}

/// Form checks that need no database access.
pub(crate) fn validate_registration(req: &RegisterRequest) -> FieldErrors {
    let mut errors = FieldErrors::new();
    let mut add = |field: &'static str, message: &str| {
        errors.entry(field).or_default().push(message.to_string());
    };

    for (field, value) in [
        ("username", &req.username),
        ("email", &req.email),
        ("first_name", &req.first_name),
        ("last_name", &req.last_name),
        ("password1", &req.password1),
        ("password2", &req.password2),
    ] {
        if value.trim().is_empty() {
            add(field, "This field is required.");
        }
    }

    if !req.email.trim().is_empty() && !req.email.contains('@') {
        add("email", "Enter a valid email address.");
    }

    if !req.password1.is_empty() && !req.password2.is_empty() {
        if req.password1 != req.password2 {
            add("password2", "Passwords don't match.");
        } else {
            if req.password1.chars().count() < 8 {
                add(
                    "password2",
                    "This password is too short. It must contain at least 8 characters.",
                );
            }
            if req.password1.chars().all(|c| c.is_ascii_digit()) {
                add("password2", "This password is entirely numeric.");
            }
        }
    }

    errors
}

fn client_ip(connect_info: Option<ConnectInfo<SocketAddr>>) -> String {
    connect_info
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Create a session for the user and hand the token back in body and cookie.
async fn start_session(
    state: &AppState,
    jar: CookieJar,
    user: User,
) -> Result<(CookieJar, Json<ApiResponse<AuthResponse>>), AppError> {
    let token = generate_session_token();
    state
        .sessions
        .create(&hash_token(&token), user.id, state.config.session_ttl)
        .await?;

    tracing::info!(user_id = user.id, "User logged in");

    Ok((
        jar.add(session_cookie(token.clone())),
        Json(ApiResponse::success(AuthResponse {
            user,
            session_token: token,
            redirect_to: "/connect/",
        })),
    ))
}

async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<RegisterRequest>,
) -> Result<(CookieJar, Json<ApiResponse<AuthResponse>>), AppError> {
    let mut errors = validate_registration(&req);
    let username = req.username.trim().to_string();

    if !username.is_empty() && state.users.username_exists(&username).await? {
        errors
            .entry("username")
            .or_default()
            .push(StoreError::UsernameTaken.to_string());
    }
    if !errors.is_empty() {
        return Err(AppError::validation("Please correct the errors below.", errors));
    }

    let new_user = NewUser {
        username,
        email: req.email.trim().to_string(),
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
        password: req.password1,
    };

    let user = match state.users.create_user(&new_user).await {
        Ok(user) => user,
        Err(StoreError::UsernameTaken) => {
            let mut fields = FieldErrors::new();
            fields.insert("username", vec![StoreError::UsernameTaken.to_string()]);
            return Err(AppError::validation("Please correct the errors below.", fields));
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(user_id = user.id, "Registered new user");
    start_session(&state, jar, user).await
}

async fn login(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<ApiResponse<AuthResponse>>), AppError> {
    let ip = client_ip(connect_info);

    if state.brute_force_guard.is_locked(&ip) {
        return Err(AppError::too_many_requests(
            "Too many failed login attempts. Please try again later.",
        ));
    }

    match state
        .users
        .authenticate(req.username.trim(), &req.password)
        .await?
    {
        Some(user) => {
            state.brute_force_guard.record_success(&ip);
            start_session(&state, jar, user).await
        }
        None => {
            tracing::warn!("Failed login for {:?} from {}", req.username, ip);
            state.brute_force_guard.record_failure(&ip);
            Err(AppError::bad_request(LOGIN_FAILED))
        }
    }
}

async fn logout(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<ApiResponse<LogoutResponse>>), AppError> {
    state.sessions.delete(&ctx.session_hash).await?;
    tracing::info!(user_id = ctx.user.id, "User logged out");

    Ok((
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Json(ApiResponse::success(LogoutResponse {
            redirect_to: "/auth/login/",
        })),
    ))
}

async fn me(Extension(ctx): Extension<SessionContext>) -> Json<ApiResponse<User>> {
    Json(ApiResponse::success(ctx.user))
}
