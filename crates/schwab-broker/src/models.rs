use broker_trait::{Holding, Mover, TokenGrant, Transaction};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

impl From<TokenResponse> for TokenGrant {
    fn from(t: TokenResponse) -> Self {
        TokenGrant {
            access_token: t.access_token,
            refresh_token: t.refresh_token,
            token_secret: None,
            expires_in: t.expires_in,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountNumber {
    pub account_number: String,
    pub hash_value: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountEnvelope {
    pub securities_account: Option<SecuritiesAccount>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecuritiesAccount {
    pub account_number: Option<String>,
    #[serde(rename = "type")]
    pub account_type: Option<String>,
    #[serde(default)]
    pub positions: Vec<SchwabPosition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchwabPosition {
    #[serde(default)]
    pub long_quantity: Decimal,
    #[serde(default)]
    pub short_quantity: Decimal,
    #[serde(default)]
    pub average_price: Decimal,
    #[serde(default)]
    pub market_value: Decimal,
    #[serde(default)]
    pub current_day_profit_loss: Decimal,
    pub current_day_profit_loss_percentage: Option<Decimal>,
    pub instrument: Instrument,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    pub symbol: String,
    pub description: Option<String>,
    pub asset_type: Option<String>,
}

impl From<SchwabPosition> for Holding {
    fn from(p: SchwabPosition) -> Self {
        let quantity = p.long_quantity - p.short_quantity;
        Holding {
            symbol: p.instrument.symbol,
            description: p.instrument.description,
            asset_type: p.instrument.asset_type,
            quantity,
            average_price: p.average_price,
            market_value: p.market_value,
            cost_basis: (p.average_price * quantity.abs()).round_dp(2),
            day_profit_loss: p.current_day_profit_loss,
            day_profit_loss_percent: p.current_day_profit_loss_percentage,
        }
    }
}

/// Positions of the first account carrying a `securitiesAccount`.
pub fn first_account_holdings(accounts: Vec<AccountEnvelope>) -> Vec<Holding> {
    accounts
        .into_iter()
        .next()
        .and_then(|a| a.securities_account)
        .map(|sa| sa.positions.into_iter().map(Holding::from).collect())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub activity_id: Option<i64>,
    pub time: Option<String>,
    #[serde(rename = "type", default)]
    pub transaction_type: String,
    pub description: Option<String>,
    #[serde(default)]
    pub net_amount: Decimal,
}

impl From<TransactionRecord> for Transaction {
    fn from(t: TransactionRecord) -> Self {
        Transaction {
            activity_id: t.activity_id,
            time: t.time,
            transaction_type: t.transaction_type,
            description: t.description,
            net_amount: t.net_amount,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MoversResponse {
    #[serde(default)]
    pub movers: Vec<MoverRecord>,
    #[serde(default)]
    pub screeners: Vec<MoverRecord>,
}

impl MoversResponse {
    pub fn into_movers(self) -> Vec<Mover> {
        let records = if self.movers.is_empty() {
            self.screeners
        } else {
            self.movers
        };
        records.into_iter().map(Mover::from).collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoverRecord {
    pub symbol: String,
    pub description: Option<String>,
    pub last_price: Option<f64>,
    pub net_change: Option<f64>,
    pub net_percent_change: Option<f64>,
    pub volume: Option<i64>,
    pub total_volume: Option<i64>,
}

impl From<MoverRecord> for Mover {
    fn from(m: MoverRecord) -> Self {
        Mover {
            symbol: m.symbol,
            description: m.description,
            last_price: m.last_price,
            net_change: m.net_change,
            net_percent_change: m.net_percent_change,
            volume: m.volume.or(m.total_volume),
        }
    }
}
