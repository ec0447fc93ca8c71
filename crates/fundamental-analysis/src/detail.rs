use crate::returns::HistoricalReturns;
use chrono::DateTime;
use market_data::{PriceBar, QuoteSummary};
use serde::Serialize;
use serde_json::{Map, Value};
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompanyProfile {
    pub long_name: String,
    pub symbol: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub website: Option<String>,
    pub long_business_summary: Option<String>,
}

impl CompanyProfile {
    pub fn from_quote(quote: &QuoteSummary) -> Self {
        Self {
            long_name: quote.display_name().to_string(),
            symbol: Some(quote.symbol.clone()),
            sector: Some(quote.sector.clone().unwrap_or_else(|| "N/A".into())),
            industry: Some(quote.industry.clone().unwrap_or_else(|| "N/A".into())),
            website: Some(quote.website.clone().unwrap_or_else(|| "#".into())),
            long_business_summary: Some(
                quote
                    .long_business_summary
                    .clone()
                    .unwrap_or_else(|| "No summary available.".into()),
            ),
        }
    }

    pub fn unavailable(symbol: &str) -> Self {
        Self {
            long_name: format!("{} (Live data unavailable)", symbol),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartData {
    pub dates: Vec<String>,
    pub prices: Vec<f64>,
}

impl ChartData {
    pub fn from_bars(bars: &[PriceBar]) -> Self {
        Self {
            dates: bars.iter().map(|b| b.date.format("%Y-%m-%d").to_string()).collect(),
            prices: bars.iter().map(|b| crate::valuation::round2(b.close)).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyStat {
    pub label: &'static str,
    pub value: Value,
}

fn stat(label: &'static str, value: impl Into<Value>) -> KeyStat {
    KeyStat {
        label,
        value: value.into(),
    }
}

fn or_na(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "N/A".into())
}

fn date_from_unix(ts: Option<i64>) -> String {
    ts.and_then(|t| DateTime::from_timestamp(t, 0))
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "N/A".into())
}

/// `1234567` -> `1,234,567`
pub fn format_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if value < 0 {
        format!("-{}", out)
    } else {
        out
    }
}

/// Key statistics in display order.
pub fn key_stats(q: &QuoteSummary) -> Vec<KeyStat> {
    let dividend = match (q.dividend_yield, q.dividend_rate) {
        (Some(y), rate) if y != 0.0 => format!("{} ({:.2}%)", or_na(rate), y * 100.0),
        _ => "N/A".to_string(),
    };

    vec![
        stat("Previous Close", q.previous_close),
        stat("Open", q.open),
        stat(
            "Bid",
            format!("{} x {}", q.bid.unwrap_or(0.0), q.bid_size.unwrap_or(0)),
        ),
        stat(
            "Ask",
            format!("{} x {}", q.ask.unwrap_or(0.0), q.ask_size.unwrap_or(0)),
        ),
        stat("Day's Range", format!("{} - {}", or_na(q.day_low), or_na(q.day_high))),
        stat(
            "52 Week Range",
            format!("{} - {}", or_na(q.fifty_two_week_low), or_na(q.fifty_two_week_high)),
        ),
        stat("Volume", format_thousands(q.volume.unwrap_or(0))),
        stat("Avg. Volume", format_thousands(q.average_volume.unwrap_or(0))),
        stat("Market Cap (intraday)", format_thousands(q.market_cap.unwrap_or(0))),
        stat("Beta (5Y Monthly)", q.beta),
        stat("PE Ratio (TTM)", q.trailing_pe),
        stat("EPS (TTM)", q.trailing_eps),
        stat("Earnings Date", date_from_unix(q.earnings_timestamp)),
        stat("Forward Dividend & Yield", dividend),
        stat("Ex-Dividend Date", date_from_unix(q.ex_dividend_date)),
        stat("1y Target Est", q.target_mean_price),
    ]
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Financials {
    pub income_statement: Vec<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Calculations {
    pub graham_number: Option<f64>,
    pub intrinsic_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockDetail {
    pub page_title: String,
    pub symbol: String,
    pub profile: CompanyProfile,
    pub chart_data: ChartData,
    pub key_stats: Vec<KeyStat>,
    pub returns_data: HistoricalReturns,
    pub financials: Financials,
    pub calculations: Calculations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementType {
    IncomeStatement,
    BalanceSheet,
    CashFlow,
}

impl StatementType {
    pub fn slug(&self) -> &'static str {
        match self {
            StatementType::IncomeStatement => "income-statement",
            StatementType::BalanceSheet => "balance-sheet",
            StatementType::CashFlow => "cash-flow",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            StatementType::IncomeStatement => "Income Statement",
            StatementType::BalanceSheet => "Balance Sheet",
            StatementType::CashFlow => "Cash Flow",
        }
    }

    pub fn dataset(&self) -> crate::Dataset {
        match self {
            StatementType::IncomeStatement => crate::Dataset::IncomeStatement,
            StatementType::BalanceSheet => crate::Dataset::Equity,
            StatementType::CashFlow => crate::Dataset::CashFlow,
        }
    }
}

impl FromStr for StatementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income-statement" => Ok(StatementType::IncomeStatement),
            "balance-sheet" => Ok(StatementType::BalanceSheet),
            "cash-flow" => Ok(StatementType::CashFlow),
            other => Err(format!("unknown statement type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementPage {
    pub page_title: String,
    pub symbol: String,
    pub statement_type: &'static str,
    pub rows: Vec<Map<String, Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_thousands() {
        assert_eq!(format_thousands(0), "0");
        assert_eq!(format_thousands(999), "999");
        assert_eq!(format_thousands(1000), "1,000");
        assert_eq!(format_thousands(51234567), "51,234,567");
        assert_eq!(format_thousands(-1234), "-1,234");
    }

    #[test]
    fn test_key_stats_formatting() {
        let quote = QuoteSummary {
            symbol: "AAPL".into(),
            day_low: Some(187.0),
            volume: Some(1234567),
            dividend_rate: Some(0.96),
            dividend_yield: Some(0.0051),
            earnings_timestamp: Some(1714680000),
            ..Default::default()
        };
        let stats = key_stats(&quote);
        let get = |label: &str| {
            stats
                .iter()
                .find(|s| s.label == label)
                .map(|s| s.value.clone())
                .unwrap()
        };

        assert_eq!(stats.len(), 16);
        assert_eq!(get("Day's Range"), "187 - N/A");
        assert_eq!(get("Volume"), "1,234,567");
        assert_eq!(get("Forward Dividend & Yield"), "0.96 (0.51%)");
        assert_eq!(get("Earnings Date"), "2024-05-02");
        assert_eq!(get("Ex-Dividend Date"), "N/A");
        assert!(get("Previous Close").is_null());
    }

    #[test]
    fn test_statement_types() {
        assert_eq!(
            "balance-sheet".parse::<StatementType>().unwrap().dataset(),
            crate::Dataset::Equity
        );
        assert_eq!(StatementType::CashFlow.title(), "Cash Flow");
        assert!("ratios".parse::<StatementType>().is_err());
    }

    #[test]
    fn test_profile_fallbacks() {
        let profile = CompanyProfile::from_quote(&QuoteSummary {
            symbol: "XYZ".into(),
            ..Default::default()
        });
        assert_eq!(profile.long_name, "XYZ");
        assert_eq!(profile.sector.as_deref(), Some("N/A"));
        assert_eq!(profile.website.as_deref(), Some("#"));

        assert_eq!(
            CompanyProfile::unavailable("XYZ").long_name,
            "XYZ (Live data unavailable)"
        );
    }
}
