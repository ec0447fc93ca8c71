use account_store::AccountDb;
use api_server::cache::MemoryCache;
use api_server::config::AppConfig;
use api_server::{app_router, AppState};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use broker_trait::{
    Authorization, BrokerClient, CallbackParams, FlowKind, Holding, Mover, MoverSort,
    OAuthProvider, PendingAuthorization, Provider, ProviderError, TokenGrant, Transaction,
};
use chrono::{DateTime, NaiveDate, Utc};
use fundamental_analysis::FundamentalsConfig;
use market_data::{HistoryRange, MarketDataError, MarketDataSource, PriceBar, QuoteSummary};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

struct FakeSchwab;

#[async_trait]
impl OAuthProvider for FakeSchwab {
    fn provider(&self) -> Provider {
        Provider::Schwab
    }

    fn flow(&self) -> FlowKind {
        FlowKind::AuthorizationCode
    }

    async fn begin(&self, state: &str) -> Result<Authorization, ProviderError> {
        Ok(Authorization {
            redirect_url: Some(format!("https://auth.example.test/authorize?state={}", state)),
            pending: PendingAuthorization {
                state: Some(state.to_string()),
                ..Default::default()
            },
        })
    }

    async fn exchange(
        &self,
        params: &CallbackParams,
        pending: &PendingAuthorization,
    ) -> Result<TokenGrant, ProviderError> {
        let code = params
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or(ProviderError::MissingParameter("code"))?;
        if params.state.is_some() && pending.state.is_some() && params.state != pending.state {
            return Err(ProviderError::StateMismatch);
        }
        if code == "rejected" {
            return Err(ProviderError::Permanent {
                status: 400,
                body: "invalid_grant".into(),
            });
        }
        Ok(TokenGrant {
            access_token: "access-1".into(),
            refresh_token: Some("refresh-1".into()),
            token_secret: None,
            expires_in: Some(1800),
        })
    }
}

struct FakeYodlee;

#[async_trait]
impl OAuthProvider for FakeYodlee {
    fn provider(&self) -> Provider {
        Provider::Yodlee
    }

    fn flow(&self) -> FlowKind {
        FlowKind::ClientCredentials
    }

    async fn begin(&self, _state: &str) -> Result<Authorization, ProviderError> {
        Ok(Authorization {
            redirect_url: None,
            pending: PendingAuthorization::default(),
        })
    }

    async fn exchange(
        &self,
        _params: &CallbackParams,
        _pending: &PendingAuthorization,
    ) -> Result<TokenGrant, ProviderError> {
        Ok(TokenGrant::bearer("fastlink-abc"))
    }
}

struct FakeBroker;

#[async_trait]
impl BrokerClient for FakeBroker {
    async fn get_holdings(&self, access_token: &str) -> Result<Vec<Holding>, ProviderError> {
        assert_eq!(access_token, "access-1");
        Ok(vec![Holding {
            symbol: "AAPL".into(),
            description: Some("APPLE INC".into()),
            asset_type: Some("EQUITY".into()),
            quantity: dec!(10),
            average_price: dec!(150),
            market_value: dec!(1900),
            cost_basis: dec!(1500),
            day_profit_loss: dec!(12.5),
            day_profit_loss_percent: Some(dec!(0.66)),
        }])
    }

    async fn get_transactions(
        &self,
        _access_token: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, ProviderError> {
        Ok(vec![Transaction {
            activity_id: Some(1),
            time: Some("2024-03-01T00:00:00+0000".into()),
            transaction_type: "DIVIDEND_OR_INTEREST".into(),
            description: Some("AAPL dividend".into()),
            net_amount: dec!(2.40),
        }])
    }

    async fn get_movers(
        &self,
        _access_token: &str,
        index: &str,
        sort: MoverSort,
    ) -> Result<Vec<Mover>, ProviderError> {
        assert_eq!(index, "$SPX.X");
        let mover = |symbol: &str| Mover {
            symbol: symbol.into(),
            description: None,
            last_price: Some(100.0),
            net_change: Some(1.0),
            net_percent_change: Some(1.0),
            volume: Some(1_000),
        };
        match sort {
            MoverSort::PercentChangeUp => Ok(vec![mover("UP")]),
            MoverSort::PercentChangeDown => Err(ProviderError::Transient("HTTP 503".into())),
            MoverSort::Volume => Ok(vec![mover("BUSY")]),
        }
    }

    fn broker_name(&self) -> &str {
        "fake"
    }
}

struct FakeMarket;

#[async_trait]
impl MarketDataSource for FakeMarket {
    async fn quote_summary(&self, symbol: &str) -> Result<QuoteSummary, MarketDataError> {
        if symbol == "ACME" {
            Ok(QuoteSummary {
                symbol: symbol.to_string(),
                long_name: Some("Acme Corp".into()),
                previous_close: Some(50.0),
                ..Default::default()
            })
        } else {
            Err(MarketDataError::NotFound(symbol.to_string()))
        }
    }

    async fn daily_closes(
        &self,
        _symbol: &str,
        _range: HistoryRange,
    ) -> Result<Vec<PriceBar>, MarketDataError> {
        Ok(vec![
            PriceBar {
                date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                close: 50.0,
            },
            PriceBar {
                date: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
                close: 60.0,
            },
        ])
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

fn write_fixtures(dir: &Path, with_symbol_list: bool) {
    std::fs::write(
        dir.join("cash_flow_statement.csv"),
        "act_symbol,date,period,diluted_net_eps\nACME,2023-12-31,Year,5.0\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("balance_sheet_equity.csv"),
        "act_symbol,date,period,total_equity,shares_outstanding\nACME,2023-12-31,Year,2000,100\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("eps_history.csv"),
        "act_symbol,period_end_date,reported\nACME,2022-12-31,4.0\nACME,2023-12-31,5.0\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("income_statement.csv"),
        "act_symbol,date,period,sales\nACME,2023-12-31,Year,1000\n",
    )
    .unwrap();
    if with_symbol_list {
        std::fs::write(dir.join("valid_tickers_for_screener.txt"), "ACME\nBETA\n\n").unwrap();
    }
}

async fn test_app(dir: &Path, with_providers: bool) -> Router {
    let fundamentals = FundamentalsConfig::new(
        dir,
        fundamental_analysis::csv_data::DEFAULT_FILE_MAPPING,
        "Year",
    );
    let config = AppConfig::for_fundamentals(fundamentals);
    let db = AccountDb::new("sqlite::memory:").await.unwrap();

    let mut state = AppState::new(
        config,
        db,
        Arc::new(MemoryCache::new()),
        Arc::new(FakeMarket),
    );
    if with_providers {
        state = state
            .with_provider(Arc::new(FakeSchwab))
            .with_provider(Arc::new(FakeYodlee))
            .with_broker(Arc::new(FakeBroker));
    }
    app_router(state)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value, axum::http::HeaderMap) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body, headers)
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn register(app: &Router, username: &str) -> String {
    let (status, body, headers) = send(
        app,
        post_json(
            "/auth/register/",
            json!({
                "username": username,
                "email": format!("{}@example.com", username),
                "first_name": "Test",
                "last_name": "User",
                "password1": "correct-horse",
                "password2": "correct-horse",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["redirect_to"], "/connect/");
    assert!(headers
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|c| c.starts_with("session=")));
    body["data"]["session_token"].as_str().unwrap().to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_health_is_public_and_pages_require_session() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path(), true);
    let app = test_app(dir.path(), false).await;

    let (status, body, headers) = send(
        &app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(headers.contains_key("x-request-id"));
    assert_eq!(headers["x-content-type-options"], "nosniff");

    let (status, body, _) = send(
        &app,
        Request::builder().uri("/dashboard/").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"success": false, "error": "Authentication required"}));

    let (status, _, _) = send(&app, get("/dashboard/", "not-a-session")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_login_logout() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path(), true);
    let app = test_app(dir.path(), false).await;

    let token = register(&app, "grace").await;
    let (status, body, _) = send(&app, get("/auth/me", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "grace");
    assert!(body["data"].get("password_hash").is_none());

    // Duplicate usernames are rejected case-insensitively
    let (status, body, _) = send(
        &app,
        post_json(
            "/auth/register/",
            json!({
                "username": "GRACE",
                "email": "g@example.com",
                "first_name": "G",
                "last_name": "H",
                "password1": "correct-horse",
                "password2": "different-horse",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"]["password2"][0], "Passwords don't match.");
    assert!(body["errors"]["username"][0]
        .as_str()
        .unwrap()
        .contains("already exists"));

    let (status, body, _) = send(
        &app,
        post_json("/auth/login/", json!({"username": "grace", "password": "correct-horse"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let second = body["data"]["session_token"].as_str().unwrap().to_string();

    let (status, body, _) = send(&app, get("/auth/logout/", &second)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["redirect_to"], "/auth/login/");

    let (status, _, _) = send(&app, get("/auth/me", &second)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    // The first session is unaffected
    let (status, _, _) = send(&app, get("/auth/me", &token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_failed_logins_lock_out() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path(), true);
    let app = test_app(dir.path(), false).await;
    register(&app, "mallory").await;

    for _ in 0..5 {
        let (status, body, _) = send(
            &app,
            post_json("/auth/login/", json!({"username": "mallory", "password": "wrong"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Please enter a correct username and password.");
    }

    let (status, _, _) = send(
        &app,
        post_json("/auth/login/", json!({"username": "mallory", "password": "correct-horse"})),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_schwab_connection_flow() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path(), true);
    let app = test_app(dir.path(), true).await;
    let token = register(&app, "linus").await;

    let (_, body, _) = send(&app, get("/dashboard/", &token)).await;
    assert_eq!(body["data"]["show_connection_modal"], true);
    assert!(body["data"]["movers"].is_null());

    let (_, body, _) = send(&app, get("/holdings/", &token)).await;
    assert_eq!(
        body["data"]["error_message"],
        "You haven't connected a Schwab account yet."
    );

    let (status, _, headers) = send(&app, get("/connect/schwab/authenticate", &token)).await;
    assert!(status.is_redirection());
    let location = headers[header::LOCATION].to_str().unwrap().to_string();
    let state = location.split("state=").nth(1).unwrap().to_string();

    let (status, body, _) = send(&app, get("/connect/schwab/callback", &token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Authorization code not found in callback.");

    let (status, _, _) = send(
        &app,
        get("/connect/schwab/callback?code=abc&state=forged", &token),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body, _) = send(
        &app,
        get("/connect/schwab/callback?code=rejected", &token),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(
        body["error"],
        "Failed to connect your Schwab account. Please try again."
    );

    let (status, body, _) = send(
        &app,
        get(&format!("/connect/schwab/callback?code=abc&state={}", state), &token),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["connected"], "schwab");
    assert_eq!(body["data"]["redirect_to"], "/dashboard/");

    // Connecting twice keeps a single token row
    let (status, _, _) = send(&app, get("/connect/schwab/callback?code=again", &token)).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body, _) = send(&app, get("/connect/", &token)).await;
    let providers = body["data"]["providers"].as_array().unwrap();
    assert_eq!(providers.len(), 3);
    assert_eq!(providers[0]["provider"], "schwab");
    assert_eq!(providers[0]["connected"], true);
    assert_eq!(providers[1]["configured"], false);

    let (_, body, _) = send(&app, get("/dashboard/", &token)).await;
    let data = &body["data"];
    assert_eq!(data["page_title"], "Portfolio Dashboard");
    assert_eq!(data["show_connection_modal"], false);
    assert_eq!(data["movers"]["gainers"][0]["symbol"], "UP");
    assert_eq!(data["movers"]["losers"], json!([]));
    assert_eq!(data["movers"]["most_active"][0]["symbol"], "BUSY");

    let (_, body, _) = send(&app, get("/holdings/", &token)).await;
    assert!(body["data"]["error_message"].is_null());
    assert_eq!(body["data"]["holdings"][0]["symbol"], "AAPL");
    assert!(body["data"]["totals"].get("total_unrealized_gain_loss").is_some());

    let (_, body, _) = send(
        &app,
        get("/transactions/?start_date=2024-01-01&end_date=2024-03-31", &token),
    )
    .await;
    let data = &body["data"];
    assert_eq!(data["transaction_count"], 1);
    assert_eq!(
        data["categories"]["dividends_and_interest"]["transactions"][0]["type"],
        "DIVIDEND_OR_INTEREST"
    );

    let (status, _, _) = send(&app, get("/transactions/?start_date=yesterday", &token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_yodlee_fastlink() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path(), true);
    let app = test_app(dir.path(), true).await;
    let token = register(&app, "yuki").await;

    let (status, body, _) = send(&app, get("/connect/yodlee/fastlink-token", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"fastlink_token": "fastlink-abc"}));

    let mut success = get("/connect/yodlee/success", &token);
    *success.method_mut() = axum::http::Method::POST;
    let (status, body, _) = send(&app, success).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));

    let (_, body, _) = send(&app, get("/dashboard/", &token)).await;
    assert_eq!(body["data"]["show_connection_modal"], false);

    let bare = test_app(dir.path(), false).await;
    let other = register(&bare, "zed").await;
    let (status, body, _) = send(&bare, get("/connect/yodlee/fastlink-token", &other)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": "Could not generate FastLink token"}));
}

#[tokio::test]
async fn test_screener_pages() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path(), true);
    let app = test_app(dir.path(), false).await;
    let token = register(&app, "ben").await;

    let (status, body, _) = send(&app, get("/screener/?page=abc", &token)).await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["page_title"], "Stock Screener");
    assert_eq!(data["total_results"], 2);
    assert_eq!(data["page"]["number"], 1);
    assert_eq!(data["table_headers"][4], "Graham Num");
    assert_eq!(data["stocks"][0]["Company Name"], "Acme Corp");
    assert_eq!(data["stocks"][0]["Graham Num"], 47.43);
    assert_eq!(data["stocks"][1]["Company Name"], "BETA");
    assert_eq!(data["stocks"][1]["Graham Diff %"], "N/A");

    let (_, body, _) = send(&app, get("/screener/?q=et", &token)).await;
    assert_eq!(body["data"]["total_results"], 1);
    assert_eq!(body["data"]["search_query"], "et");

    let (status, body, _) = send(&app, get("/screener/stock/acme/", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["page_title"], "Acme Corp (ACME)");
    assert_eq!(body["data"]["calculations"]["graham_number"], 47.43);

    let (status, body, _) = send(
        &app,
        get("/screener/stock/ACME/financials/cash-flow", &token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["page_title"], "Acme Corp - Cash Flow");

    let (status, _, _) = send(
        &app,
        get("/screener/stock/ACME/financials/ratios", &token),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_screener_without_symbol_list() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path(), false);
    let app = test_app(dir.path(), false).await;
    let token = register(&app, "nora").await;

    let (status, body, _) = send(&app, get("/screener/", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["error_message"]
        .as_str()
        .unwrap()
        .contains("data-loader prefilter"));
    assert_eq!(body["data"]["stocks"], json!([]));
}
