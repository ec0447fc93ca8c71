pub mod error;

pub use error::*;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Providers and flows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Schwab,
    Etrade,
    Yodlee,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Schwab, Provider::Etrade, Provider::Yodlee];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Schwab => "schwab",
            Provider::Etrade => "etrade",
            Provider::Yodlee => "yodlee",
        }
    }

    /// Human-readable name used in page messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Schwab => "Schwab",
            Provider::Etrade => "E*TRADE",
            Provider::Yodlee => "Yodlee",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "schwab" => Ok(Provider::Schwab),
            "etrade" => Ok(Provider::Etrade),
            "yodlee" => Ok(Provider::Yodlee),
            other => Err(format!("unknown provider: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    AuthorizationCode,
    OAuth1ThreeLegged,
    ClientCredentials,
}

// ---------------------------------------------------------------------------
// Authorization handshake types
// ---------------------------------------------------------------------------

/// Tokens returned by a successful exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// OAuth1 token secret; None for bearer-token providers.
    pub token_secret: Option<String>,
    pub expires_in: Option<i64>,
}

impl TokenGrant {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_secret: None,
            expires_in: None,
        }
    }

    pub fn expires_at(&self, issued_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in
            .map(|secs| issued_at + Duration::seconds(secs))
    }
}

/// Data that must survive between `begin` and `exchange`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub state: Option<String>,
    pub request_token: Option<String>,
    pub request_token_secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Authorization {
    /// Where to send the user; None when the flow needs no user interaction.
    pub redirect_url: Option<String>,
    pub pending: PendingAuthorization,
}

/// Query parameters a provider may append to the callback URL.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub oauth_token: Option<String>,
    pub oauth_verifier: Option<String>,
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn provider(&self) -> Provider;

    fn flow(&self) -> FlowKind;

    /// Start the handshake. `state` is an opaque per-attempt value the
    /// provider may echo back on the callback.
    async fn begin(&self, state: &str) -> Result<Authorization, ProviderError>;

    /// Finish the handshake with the callback parameters.
    async fn exchange(
        &self,
        params: &CallbackParams,
        pending: &PendingAuthorization,
    ) -> Result<TokenGrant, ProviderError>;

    /// Trade a refresh token for a new grant.
    async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, ProviderError> {
        Err(ProviderError::Unsupported(self.provider().display_name()))
    }
}

// ---------------------------------------------------------------------------
// Account data (broker-agnostic)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub description: Option<String>,
    pub asset_type: Option<String>,
    pub quantity: Decimal,
    pub average_price: Decimal,
    pub market_value: Decimal,
    pub cost_basis: Decimal,
    pub day_profit_loss: Decimal,
    pub day_profit_loss_percent: Option<Decimal>,
}

impl Holding {
    pub fn unrealized_profit_loss(&self) -> Decimal {
        self.market_value - self.cost_basis
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub activity_id: Option<i64>,
    pub time: Option<String>,
    #[serde(rename = "type")]
    pub transaction_type: String,
    pub description: Option<String>,
    pub net_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mover {
    pub symbol: String,
    pub description: Option<String>,
    pub last_price: Option<f64>,
    pub net_change: Option<f64>,
    pub net_percent_change: Option<f64>,
    pub volume: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoverSort {
    PercentChangeUp,
    PercentChangeDown,
    Volume,
}

impl MoverSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoverSort::PercentChangeUp => "PERCENT_CHANGE_UP",
            MoverSort::PercentChangeDown => "PERCENT_CHANGE_DOWN",
            MoverSort::Volume => "VOLUME",
        }
    }
}

// ---------------------------------------------------------------------------
// Broker trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Positions of the first account returned by the broker
    async fn get_holdings(&self, access_token: &str) -> Result<Vec<Holding>, ProviderError>;

    /// Transactions of the first account inside the window
    async fn get_transactions(
        &self,
        access_token: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, ProviderError>;

    /// Market movers for an index
    async fn get_movers(
        &self,
        access_token: &str,
        index: &str,
        sort: MoverSort,
    ) -> Result<Vec<Mover>, ProviderError>;

    /// Broker name for logging
    fn broker_name(&self) -> &str;
}
