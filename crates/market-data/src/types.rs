use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryRange {
    OneYear,
    FiveYears,
    TenYears,
}

impl HistoryRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryRange::OneYear => "1y",
            HistoryRange::FiveYears => "5y",
            HistoryRange::TenYears => "10y",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub close: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteSummary {
    pub symbol: String,
    pub long_name: Option<String>,

    // Profile
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub website: Option<String>,
    pub long_business_summary: Option<String>,

    // Trading
    pub previous_close: Option<f64>,
    pub open: Option<f64>,
    pub bid: Option<f64>,
    pub bid_size: Option<i64>,
    pub ask: Option<f64>,
    pub ask_size: Option<i64>,
    pub day_low: Option<f64>,
    pub day_high: Option<f64>,
    pub fifty_two_week_low: Option<f64>,
    pub fifty_two_week_high: Option<f64>,
    pub volume: Option<i64>,
    pub average_volume: Option<i64>,

    // Valuation
    pub market_cap: Option<i64>,
    pub beta: Option<f64>,
    pub trailing_pe: Option<f64>,
    pub trailing_eps: Option<f64>,
    pub target_mean_price: Option<f64>,
    pub dividend_rate: Option<f64>,
    pub dividend_yield: Option<f64>,

    // Unix seconds
    pub earnings_timestamp: Option<i64>,
    pub ex_dividend_date: Option<i64>,
}

impl QuoteSummary {
    /// Company name, falling back to the ticker.
    pub fn display_name(&self) -> &str {
        self.long_name.as_deref().unwrap_or(&self.symbol)
    }
}
