use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use broker_trait::{CallbackParams, FlowKind, PendingAuthorization, Provider, ProviderError};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use yodlee_client::LinkedAccount;

use crate::auth::SessionContext;
use crate::cache::{get_json, set_json};
use crate::{ApiResponse, AppError, AppState};

/// How long a started handshake stays valid.
const PENDING_TTL: Duration = Duration::from_secs(600);

pub fn connect_routes() -> Router<AppState> {
    Router::new()
        .route("/connect/", get(connect_page))
        .route("/connect/schwab/authenticate", get(schwab_authenticate))
        .route("/connect/schwab/callback", get(schwab_callback))
        .route("/connect/schwab/refresh", post(schwab_refresh))
        .route("/connect/etrade/authenticate", get(etrade_authenticate))
        .route("/connect/etrade/callback", get(etrade_callback))
        .route("/connect/yodlee/fastlink-token", get(yodlee_fastlink_token))
        .route("/connect/yodlee/success", post(yodlee_success))
        .route("/connect/yodlee/accounts", get(yodlee_accounts))
}

pub(crate) fn pending_key(provider: Provider, user_id: i64) -> String {
    format!("oauth:{}:{}", provider.as_str(), user_id)
}

fn generate_state() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    hex::encode(bytes)
}

fn not_configured(provider: Provider) -> AppError {
    AppError::service_unavailable(format!(
        "{} integration is not configured.",
        provider.display_name()
    ))
}

/// Map a failed handshake to the message the user sees.
pub(crate) fn connection_error(provider: Provider, err: ProviderError) -> AppError {
    match err {
        ProviderError::MissingParameter("code") => {
            AppError::bad_request("Authorization code not found in callback.")
        }
        ProviderError::MissingParameter("oauth_verifier") => {
            AppError::bad_request("Verification code not found in callback.")
        }
        ProviderError::MissingParameter(_) => AppError::bad_request(format!(
            "No pending {} authorization. Please start the connection again.",
            provider.display_name()
        )),
        ProviderError::StateMismatch => AppError::bad_request(format!(
            "The {} authorization could not be verified. Please try again.",
            provider.display_name()
        )),
        ProviderError::NotConfigured(_) => not_configured(provider),
        other => {
            if other.is_retryable() {
                tracing::error!("{} token exchange failed (retryable): {}", provider, other);
            } else {
                tracing::error!("{} token exchange failed: {}", provider, other);
            }
            AppError::bad_gateway(format!(
                "Failed to connect your {} account. Please try again.",
                provider.display_name()
            ))
        }
    }
}

// ---------------------------------------------------------------------------
// Connection page
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ProviderStatus {
    pub provider: Provider,
    pub name: &'static str,
    pub flow: Option<FlowKind>,
    pub configured: bool,
    pub connected: bool,
    pub connected_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ConnectPage {
    pub page_title: &'static str,
    pub environment: String,
    pub has_brokerage_connection: bool,
    pub providers: Vec<ProviderStatus>,
}

async fn connect_page(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> Result<Json<ApiResponse<ConnectPage>>, AppError> {
    let stored = state.tokens.list_for_user(ctx.user.id).await?;

    let providers = Provider::ALL
        .iter()
        .map(|&provider| {
            let oauth = state.provider(provider);
            let token = stored.iter().find(|t| t.provider() == Some(provider));
            ProviderStatus {
                provider,
                name: provider.display_name(),
                flow: oauth.as_ref().map(|p| p.flow()),
                configured: oauth.is_some(),
                connected: token.is_some(),
                connected_at: token.map(|t| t.created_at),
                expires_at: token.and_then(|t| t.expires_at),
            }
        })
        .collect();

    Ok(Json(ApiResponse::success(ConnectPage {
        page_title: "Connect Your Accounts",
        environment: state.config.environment.clone(),
        has_brokerage_connection: ctx.has_brokerage_connection,
        providers,
    })))
}

// ---------------------------------------------------------------------------
// Redirect flows (Schwab, E*TRADE)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct Connected {
    pub connected: Provider,
    pub redirect_to: &'static str,
}

async fn begin_connection(
    state: &AppState,
    ctx: &SessionContext,
    provider: Provider,
) -> Result<Redirect, AppError> {
    let oauth = state.provider(provider).ok_or_else(|| not_configured(provider))?;

    let authorization = oauth
        .begin(&generate_state())
        .await
        .map_err(|e| connection_error(provider, e))?;
    let redirect_url = authorization.redirect_url.ok_or_else(|| {
        AppError::bad_request(format!(
            "{} does not use a redirect flow.",
            provider.display_name()
        ))
    })?;

    set_json(
        state.cache.as_ref(),
        &pending_key(provider, ctx.user.id),
        &authorization.pending,
        PENDING_TTL,
    )
    .await;

    tracing::info!(user_id = ctx.user.id, "Redirecting to {} authorization", provider);
    Ok(Redirect::to(&redirect_url))
}

/// Store the grant and mark the session as connected.
async fn save_grant(
    state: &AppState,
    ctx: &SessionContext,
    provider: Provider,
    grant: &broker_trait::TokenGrant,
) -> Result<(), AppError> {
    state
        .tokens
        .upsert(ctx.user.id, provider, grant, Utc::now())
        .await?;
    state
        .sessions
        .set_brokerage_connection(&ctx.session_hash, true)
        .await?;
    Ok(())
}

async fn finish_connection(
    state: &AppState,
    ctx: &SessionContext,
    provider: Provider,
    params: CallbackParams,
) -> Result<Json<ApiResponse<Connected>>, AppError> {
    let oauth = state.provider(provider).ok_or_else(|| not_configured(provider))?;

    let key = pending_key(provider, ctx.user.id);
    let pending: PendingAuthorization = get_json(state.cache.as_ref(), &key)
        .await
        .unwrap_or_default();

    let grant = oauth
        .exchange(&params, &pending)
        .await
        .map_err(|e| connection_error(provider, e))?;

    state.cache.delete(&key).await;
    save_grant(state, ctx, provider, &grant).await?;
    tracing::info!(user_id = ctx.user.id, "Connected {} account", provider);

    Ok(Json(ApiResponse::success(Connected {
        connected: provider,
        redirect_to: "/dashboard/",
    })))
}

async fn schwab_authenticate(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> Result<Redirect, AppError> {
    begin_connection(&state, &ctx, Provider::Schwab).await
}

async fn schwab_callback(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<ApiResponse<Connected>>, AppError> {
    finish_connection(&state, &ctx, Provider::Schwab, params).await
}

async fn etrade_authenticate(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> Result<Redirect, AppError> {
    begin_connection(&state, &ctx, Provider::Etrade).await
}

async fn etrade_callback(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<ApiResponse<Connected>>, AppError> {
    finish_connection(&state, &ctx, Provider::Etrade, params).await
}

#[derive(Debug, Serialize)]
pub struct Refreshed {
    pub refreshed: Provider,
    pub expires_at: Option<DateTime<Utc>>,
}

async fn schwab_refresh(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> Result<Json<ApiResponse<Refreshed>>, AppError> {
    let provider = Provider::Schwab;
    let oauth = state.provider(provider).ok_or_else(|| not_configured(provider))?;

    let refresh_token = state
        .tokens
        .get(ctx.user.id, provider)
        .await?
        .and_then(|t| t.refresh_token)
        .ok_or_else(|| {
            AppError::bad_request("No Schwab refresh token on file. Please reconnect your account.")
        })?;

    let grant = oauth
        .refresh(&refresh_token)
        .await
        .map_err(|e| connection_error(provider, e))?;
    let stored = state
        .tokens
        .upsert(ctx.user.id, provider, &grant, Utc::now())
        .await?;

    tracing::info!(user_id = ctx.user.id, "Refreshed Schwab token");
    Ok(Json(ApiResponse::success(Refreshed {
        refreshed: provider,
        expires_at: stored.expires_at,
    })))
}

// ---------------------------------------------------------------------------
// Yodlee FastLink
// ---------------------------------------------------------------------------

/// Token for the FastLink widget. The widget expects the bare shape.
async fn yodlee_fastlink_token(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> Response {
    let provider = Provider::Yodlee;
    let failed = || {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Could not generate FastLink token" })),
        )
            .into_response()
    };

    let Some(oauth) = state.provider(provider) else {
        tracing::error!("FastLink token requested but Yodlee is not configured");
        return failed();
    };

    let grant = match oauth.begin("").await {
        Ok(authorization) => {
            oauth
                .exchange(&CallbackParams::default(), &authorization.pending)
                .await
        }
        Err(e) => Err(e),
    };

    match grant {
        Ok(grant) => {
            if let Err(e) = state
                .tokens
                .upsert(ctx.user.id, provider, &grant, Utc::now())
                .await
            {
                tracing::error!("Could not store Yodlee token: {}", e);
                return failed();
            }
            Json(json!({ "fastlink_token": grant.access_token })).into_response()
        }
        Err(e) => {
            tracing::error!("Error getting FastLink token: {}", e);
            failed()
        }
    }
}

async fn yodlee_success(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .sessions
        .set_brokerage_connection(&ctx.session_hash, true)
        .await?;
    tracing::info!(user_id = ctx.user.id, "Yodlee account linked");
    Ok(Json(json!({ "status": "ok" })))
}

#[derive(Debug, Serialize)]
pub struct LinkedAccountsPage {
    pub accounts: Vec<LinkedAccount>,
    pub error_message: Option<String>,
}

async fn yodlee_accounts(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> Result<Json<ApiResponse<LinkedAccountsPage>>, AppError> {
    let page = |accounts, message: Option<&str>| {
        Json(ApiResponse::success(LinkedAccountsPage {
            accounts,
            error_message: message.map(str::to_string),
        }))
    };

    let Some(yodlee) = state.yodlee.as_ref() else {
        return Ok(page(Vec::new(), Some("Yodlee integration is not configured.")));
    };
    let Some(token) = state.tokens.get(ctx.user.id, Provider::Yodlee).await? else {
        return Ok(page(Vec::new(), Some("You haven't linked any accounts yet.")));
    };

    match yodlee.get_accounts(&token.access_token).await {
        Ok(accounts) => Ok(page(accounts, None)),
        Err(e) => {
            tracing::warn!("Fetching Yodlee accounts failed: {}", e);
            Ok(page(
                Vec::new(),
                Some("An unexpected error occurred while fetching linked accounts."),
            ))
        }
    }
}
