//! HTTP front end: accounts, provider connections, broker pages and the
//! value screener. Every page is returned as a JSON context.

pub mod auth;
pub mod brute_force;
pub mod cache;
pub mod config;
pub mod connect_routes;
pub mod dashboard_routes;
pub mod holdings_routes;
pub mod request_id;
pub mod screener_routes;
pub mod security_headers;
pub mod transactions_routes;

use account_store::{AccountDb, SessionStore, TokenStore, UserStore};
use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use broker_trait::{BrokerClient, OAuthProvider, Provider};
use fundamental_analysis::ValuationEngine;
use market_data::{MarketDataSource, YahooClient};
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use yodlee_client::YodleeClient;

use crate::brute_force::BruteForceGuard;
use crate::cache::{Cache, MemoryCache, RedisCache};
use crate::config::AppConfig;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<UserStore>,
    pub sessions: Arc<SessionStore>,
    pub tokens: Arc<TokenStore>,
    pub cache: Arc<dyn Cache>,
    pub providers: Arc<HashMap<Provider, Arc<dyn OAuthProvider>>>,
    /// Account data and movers; only Schwab exposes these.
    pub broker: Option<Arc<dyn BrokerClient>>,
    pub yodlee: Option<Arc<YodleeClient>>,
    pub valuation: ValuationEngine,
    pub brute_force_guard: Arc<BruteForceGuard>,
}

impl AppState {
    /// State with no providers registered.
    pub fn new(
        config: AppConfig,
        db: AccountDb,
        cache: Arc<dyn Cache>,
        market: Arc<dyn MarketDataSource>,
    ) -> Self {
        let valuation =
            ValuationEngine::new(config.fundamentals.clone(), market, config.aaa_bond_yield);
        let brute_force_guard = BruteForceGuard::new(
            config.auth_max_failures,
            config.auth_failure_window,
            config.auth_lockout,
        );

        Self {
            users: Arc::new(UserStore::new(db.clone())),
            sessions: Arc::new(SessionStore::new(db.clone())),
            tokens: Arc::new(TokenStore::new(db)),
            cache,
            providers: Arc::new(HashMap::new()),
            broker: None,
            yodlee: None,
            valuation,
            brute_force_guard: Arc::new(brute_force_guard),
            config: Arc::new(config),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn OAuthProvider>) -> Self {
        Arc::make_mut(&mut self.providers).insert(provider.provider(), provider);
        self
    }

    pub fn with_broker(mut self, broker: Arc<dyn BrokerClient>) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn with_yodlee(mut self, yodlee: Arc<YodleeClient>) -> Self {
        self.yodlee = Some(yodlee);
        self
    }

    pub fn provider(&self, provider: Provider) -> Option<Arc<dyn OAuthProvider>> {
        self.providers.get(&provider).cloned()
    }
}

// ---------------------------------------------------------------------------
// Response envelope and errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

pub type FieldErrors = BTreeMap<&'static str, Vec<String>>;

/// Handler error rendered as `{"success": false, "error": ...}`.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
    field_errors: Option<FieldErrors>,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self {
            status,
            error,
            field_errors: None,
        }
    }

    fn message(status: StatusCode, message: impl Into<String>) -> Self {
        Self::with_status(status, anyhow::anyhow!(message.into()))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::message(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::message(StatusCode::UNAUTHORIZED, "Authentication required")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::message(StatusCode::NOT_FOUND, message)
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::message(StatusCode::TOO_MANY_REQUESTS, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::message(StatusCode::BAD_GATEWAY, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::message(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    /// 400 with one or more messages per form field.
    pub fn validation(message: impl Into<String>, fields: FieldErrors) -> Self {
        Self {
            field_errors: Some(fields),
            ..Self::bad_request(message)
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = if self.status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {:#}", self.error);
            "Internal server error".to_string()
        } else {
            self.error.to_string()
        };

        let mut body = json!({
            "success": false,
            "error": message,
        });
        if let Some(fields) = self.field_errors {
            body["errors"] = json!(fields);
        }

        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

async fn root(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<serde_json::Value> {
    Json(json!({
        "name": "ledgerview",
        "environment": state.config.environment,
        "redirect_to": "/dashboard/",
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);
    match HeaderValue::from_str(&config.public_base_url) {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            tracing::warn!("PUBLIC_BASE_URL is not a valid origin; CORS disabled");
            layer
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(auth::public_routes());

    let protected = Router::new()
        .merge(auth::session_routes())
        .merge(connect_routes::connect_routes())
        .merge(dashboard_routes::dashboard_routes())
        .merge(holdings_routes::holdings_routes())
        .merge(transactions_routes::transactions_routes())
        .merge(screener_routes::screener_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    let cors = cors_layer(&state.config);

    public
        .merge(protected)
        .layer(middleware::from_fn(
            security_headers::security_headers_middleware,
        ))
        .layer(TraceLayer::new_for_http().make_span_with(request_id::make_request_span))
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(cors)
        .with_state(state)
}

/// Wire up storage, cache and every provider whose credentials are present.
pub async fn build_state(config: AppConfig) -> anyhow::Result<AppState> {
    let db = AccountDb::new(&config.database_url).await?;
    match SessionStore::new(db.clone())
        .purge_expired(chrono::Utc::now())
        .await
    {
        Ok(n) if n > 0 => tracing::info!("Purged {} expired sessions", n),
        Ok(_) => {}
        Err(e) => tracing::warn!("Could not purge expired sessions: {}", e),
    }

    let cache: Arc<dyn Cache> = match &config.redis_url {
        Some(url) => match RedisCache::connect(url).await {
            Ok(redis) => Arc::new(redis),
            Err(e) => {
                tracing::warn!("Redis unavailable ({}); using in-memory cache", e);
                Arc::new(MemoryCache::new())
            }
        },
        None => Arc::new(MemoryCache::new()),
    };

    let market: Arc<dyn MarketDataSource> = Arc::new(YahooClient::from_env()?);
    let public_base_url = config.public_base_url.clone();
    let mut state = AppState::new(config, db, cache, market);

    match schwab_broker::SchwabClient::from_env(&public_base_url) {
        Ok(client) => {
            let client = Arc::new(client);
            tracing::info!("Schwab integration enabled");
            state = state.with_provider(client.clone()).with_broker(client);
        }
        Err(e) => tracing::warn!("Schwab integration disabled: {}", e),
    }

    match etrade_broker::EtradeClient::from_env() {
        Ok(client) => {
            tracing::info!("E*TRADE integration enabled");
            state = state.with_provider(Arc::new(client));
        }
        Err(e) => tracing::warn!("E*TRADE integration disabled: {}", e),
    }

    match YodleeClient::from_env() {
        Ok(client) => {
            let client = Arc::new(client);
            tracing::info!("Yodlee integration enabled");
            state = state.with_provider(client.clone()).with_yodlee(client);
        }
        Err(e) => tracing::warn!("Yodlee integration disabled: {}", e),
    }

    Ok(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}

pub async fn run_server() -> anyhow::Result<()> {
    let config = AppConfig::from_env();
    tracing::info!("Starting API server ({})", config.environment);

    let bind_addr = config.bind_addr.clone();
    let state = build_state(config).await?;
    let app = app_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}
