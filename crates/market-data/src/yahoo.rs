use crate::rate_limit::RateLimiter;
use crate::{HistoryRange, MarketDataError, MarketDataSource, PriceBar, QuoteSummary};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";
const SUMMARY_MODULES: &str =
    "price,summaryDetail,defaultKeyStatistics,financialData,assetProfile,calendarEvents";

#[derive(Clone)]
pub struct YahooClient {
    client: Client,
    base_url: String,
    rate_limiter: RateLimiter,
}

impl YahooClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, MarketDataError> {
        // Yahoo throttles aggressively; 120 req/min stays clear of it.
        let rate_limit: usize = std::env::var("MARKET_DATA_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);

        let client = Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            rate_limiter: RateLimiter::new(rate_limit, Duration::from_secs(60)),
        })
    }

    pub fn from_env() -> Result<Self, MarketDataError> {
        let base_url = std::env::var("MARKET_DATA_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(base_url)
    }

    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, MarketDataError> {
        self.rate_limiter.acquire().await;

        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Err(MarketDataError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(MarketDataError::Status {
                status: status.as_u16(),
            });
        }

        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl MarketDataSource for YahooClient {
    async fn quote_summary(&self, symbol: &str) -> Result<QuoteSummary, MarketDataError> {
        let url = format!(
            "{}/v10/finance/quoteSummary/{}",
            self.base_url,
            symbol.to_uppercase()
        );
        let json = self.get_json(&url, &[("modules", SUMMARY_MODULES)]).await?;
        parse_quote_summary(symbol, &json)
    }

    async fn daily_closes(
        &self,
        symbol: &str,
        range: HistoryRange,
    ) -> Result<Vec<PriceBar>, MarketDataError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol.to_uppercase());
        let json = self
            .get_json(&url, &[("range", range.as_str()), ("interval", "1d")])
            .await?;
        parse_chart(symbol, &json)
    }
}

/// Yahoo wraps most numbers as `{"raw": n, "fmt": "..."}`; accept either form.
fn raw_f64(v: Option<&Value>) -> Option<f64> {
    let v = v?;
    v.get("raw").and_then(|r| r.as_f64()).or_else(|| v.as_f64())
}

fn raw_i64(v: Option<&Value>) -> Option<i64> {
    let v = v?;
    let raw = v.get("raw").unwrap_or(v);
    raw.as_i64().or_else(|| raw.as_f64().map(|f| f as i64))
}

fn text(v: Option<&Value>) -> Option<String> {
    v.and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

pub fn parse_quote_summary(symbol: &str, json: &Value) -> Result<QuoteSummary, MarketDataError> {
    let result = json
        .get("quoteSummary")
        .and_then(|v| v.get("result"))
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .ok_or_else(|| MarketDataError::NotFound(symbol.to_string()))?;

    let empty = Value::Null;
    let price = result.get("price").unwrap_or(&empty);
    let detail = result.get("summaryDetail").unwrap_or(&empty);
    let stats = result.get("defaultKeyStatistics").unwrap_or(&empty);
    let financial = result.get("financialData").unwrap_or(&empty);
    let profile = result.get("assetProfile").unwrap_or(&empty);

    let earnings_timestamp = result
        .get("calendarEvents")
        .and_then(|c| c.get("earnings"))
        .and_then(|e| e.get("earningsDate"))
        .and_then(|d| d.as_array())
        .and_then(|arr| raw_i64(arr.first()));

    Ok(QuoteSummary {
        symbol: symbol.to_uppercase(),
        long_name: text(price.get("longName")).or_else(|| text(price.get("shortName"))),
        sector: text(profile.get("sector")),
        industry: text(profile.get("industry")),
        website: text(profile.get("website")),
        long_business_summary: text(profile.get("longBusinessSummary")),
        previous_close: raw_f64(detail.get("previousClose"))
            .or_else(|| raw_f64(price.get("regularMarketPreviousClose"))),
        open: raw_f64(detail.get("open")),
        bid: raw_f64(detail.get("bid")),
        bid_size: raw_i64(detail.get("bidSize")),
        ask: raw_f64(detail.get("ask")),
        ask_size: raw_i64(detail.get("askSize")),
        day_low: raw_f64(detail.get("dayLow")),
        day_high: raw_f64(detail.get("dayHigh")),
        fifty_two_week_low: raw_f64(detail.get("fiftyTwoWeekLow")),
        fifty_two_week_high: raw_f64(detail.get("fiftyTwoWeekHigh")),
        volume: raw_i64(detail.get("volume")),
        average_volume: raw_i64(detail.get("averageVolume")),
        market_cap: raw_i64(detail.get("marketCap")).or_else(|| raw_i64(price.get("marketCap"))),
        beta: raw_f64(detail.get("beta")),
        trailing_pe: raw_f64(detail.get("trailingPE")),
        trailing_eps: raw_f64(stats.get("trailingEps")),
        target_mean_price: raw_f64(financial.get("targetMeanPrice")),
        dividend_rate: raw_f64(detail.get("dividendRate")),
        dividend_yield: raw_f64(detail.get("dividendYield")),
        earnings_timestamp,
        ex_dividend_date: raw_i64(detail.get("exDividendDate")),
    })
}

/// Daily bars from a chart response, preferring adjusted closes. Bars with a
/// null close are skipped; dates are in the exchange's local time.
pub fn parse_chart(symbol: &str, json: &Value) -> Result<Vec<PriceBar>, MarketDataError> {
    let chart = json
        .get("chart")
        .and_then(|v| v.get("result"))
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .ok_or_else(|| MarketDataError::NotFound(symbol.to_string()))?;

    let timestamps = match chart.get("timestamp").and_then(|v| v.as_array()) {
        Some(ts) => ts,
        None => return Ok(Vec::new()),
    };

    let gmt_offset = chart
        .get("meta")
        .and_then(|m| m.get("gmtoffset"))
        .and_then(|v| v.as_i64())
        .unwrap_or(0);

    let indicators = chart
        .get("indicators")
        .ok_or_else(|| MarketDataError::Malformed("chart has no indicators".into()))?;

    let closes = indicators
        .get("adjclose")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|v| v.get("adjclose"))
        .or_else(|| {
            indicators
                .get("quote")
                .and_then(|v| v.as_array())
                .and_then(|arr| arr.first())
                .and_then(|v| v.get("close"))
        })
        .and_then(|v| v.as_array())
        .ok_or_else(|| MarketDataError::Malformed("chart has no close prices".into()))?;

    let mut bars = Vec::with_capacity(timestamps.len());
    for (ts, close) in timestamps.iter().zip(closes.iter()) {
        if let (Some(ts), Some(close)) = (ts.as_i64(), close.as_f64()) {
            let local = DateTime::from_timestamp(ts, 0)
                .ok_or_else(|| MarketDataError::Malformed(format!("invalid timestamp {}", ts)))?
                + ChronoDuration::seconds(gmt_offset);
            bars.push(PriceBar {
                date: local.date_naive(),
                close,
            });
        }
    }

    Ok(bars)
}
