//! Live quotes and daily price history for the valuation pages.

mod rate_limit;
pub mod types;
pub mod yahoo;

pub use types::*;
pub use yahoo::YahooClient;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketDataError {
    #[error("Market data request failed: {0}")]
    Request(String),

    #[error("Market data provider returned HTTP {status}")]
    Status { status: u16 },

    #[error("No market data for {0}")]
    NotFound(String),

    #[error("Malformed market data response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for MarketDataError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            MarketDataError::Malformed(err.to_string())
        } else {
            MarketDataError::Request(err.to_string())
        }
    }
}

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Quote, key statistics and company profile in one call
    async fn quote_summary(&self, symbol: &str) -> Result<QuoteSummary, MarketDataError>;

    /// Daily closes, oldest first
    async fn daily_closes(
        &self,
        symbol: &str,
        range: HistoryRange,
    ) -> Result<Vec<PriceBar>, MarketDataError>;
}
