//! Value screening from fundamentals snapshots plus live prices.

pub mod csv_data;
pub mod detail;
pub mod returns;
pub mod screener;
pub mod valuation;

pub use csv_data::{
    read_symbol_list, write_symbol_list, Dataset, FundamentalsConfig, RawTable, ValuationInputs,
};
pub use detail::{StatementPage, StatementType, StockDetail};
pub use returns::{historical_returns, HistoricalReturns};
pub use screener::{compute_row, prefilter_symbols, LiveQuote, ScreenerRow, TABLE_HEADERS};
pub use valuation::Growth;

use detail::{key_stats, Calculations, ChartData, CompanyProfile, Financials};
use futures_util::future::join_all;
use market_data::{HistoryRange, MarketDataSource};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FundamentalsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Symbol list not found at {0}")]
    SymbolListMissing(PathBuf),
}

/// Runs the valuation pipeline against a market-data source.
#[derive(Clone)]
pub struct ValuationEngine {
    config: Arc<FundamentalsConfig>,
    market: Arc<dyn MarketDataSource>,
    aaa_bond_yield: f64,
}

impl ValuationEngine {
    pub fn new(
        config: FundamentalsConfig,
        market: Arc<dyn MarketDataSource>,
        aaa_bond_yield: f64,
    ) -> Self {
        Self {
            config: Arc::new(config),
            market,
            aaa_bond_yield,
        }
    }

    pub fn config(&self) -> &FundamentalsConfig {
        &self.config
    }

    /// Load the CSV inputs off the async runtime.
    async fn load_inputs(&self) -> ValuationInputs {
        let config = self.config.clone();
        match tokio::task::spawn_blocking(move || ValuationInputs::load(&config)).await {
            Ok(inputs) => inputs,
            Err(e) => {
                tracing::error!("Loading fundamentals failed: {}", e);
                ValuationInputs::default()
            }
        }
    }

    async fn live_quote(&self, symbol: &str) -> LiveQuote {
        match self.market.quote_summary(symbol).await {
            Ok(q) => LiveQuote {
                company_name: Some(q.display_name().to_string()),
                prev_close: q.previous_close,
            },
            Err(e) => {
                tracing::warn!("Quote unavailable for {}: {}", symbol, e);
                LiveQuote::default()
            }
        }
    }

    async fn closes(&self, symbol: &str, range: HistoryRange) -> Vec<market_data::PriceBar> {
        match self.market.daily_closes(symbol, range).await {
            Ok(bars) => bars,
            Err(e) => {
                tracing::warn!(
                    "Price history ({}) unavailable for {}: {}",
                    range.as_str(),
                    symbol,
                    e
                );
                Vec::new()
            }
        }
    }

    /// Rows for the given symbols, in the same order.
    pub async fn screener_rows(&self, symbols: &[String]) -> Vec<ScreenerRow> {
        if symbols.is_empty() {
            return Vec::new();
        }
        tracing::info!("Computing screener rows for {} symbols", symbols.len());

        let inputs = self.load_inputs().await;
        let inputs = &inputs;

        join_all(symbols.iter().map(|symbol| async move {
            let quote = self.live_quote(symbol).await;

            // P/E history is only useful with a non-zero EPS
            let eps = valuation::latest_annual_eps(&inputs.cash_flow, symbol);
            let closes: Vec<f64> = if eps.is_some_and(|e| e != 0.0) {
                self.closes(symbol, HistoryRange::FiveYears)
                    .await
                    .into_iter()
                    .map(|b| b.close)
                    .collect()
            } else {
                Vec::new()
            };

            compute_row(inputs, symbol, &quote, &closes, self.aaa_bond_yield)
        }))
        .await
    }

    pub async fn stock_detail(&self, symbol: &str) -> StockDetail {
        let symbol = symbol.to_uppercase();
        tracing::info!("Fetching detail data for {}", symbol);

        let (quote, chart_bars, return_bars, inputs) = tokio::join!(
            self.market.quote_summary(&symbol),
            self.closes(&symbol, HistoryRange::OneYear),
            self.closes(&symbol, HistoryRange::TenYears),
            self.load_inputs(),
        );

        let (profile, stats) = match &quote {
            Ok(q) => (CompanyProfile::from_quote(q), key_stats(q)),
            Err(e) => {
                tracing::error!("Live data fetch failed for detail page of {}: {}", symbol, e);
                (CompanyProfile::unavailable(&symbol), Vec::new())
            }
        };

        let eps = valuation::latest_annual_eps(&inputs.cash_flow, &symbol);
        let bvps = valuation::latest_bvps(&inputs.equity, &symbol);
        let growth = valuation::eps_growth(&inputs.eps_history, &symbol, screener::GROWTH_YEARS);

        StockDetail {
            page_title: format!("{} ({})", profile.long_name, symbol),
            chart_data: ChartData::from_bars(&chart_bars),
            returns_data: historical_returns(&return_bars),
            financials: Financials {
                income_statement: self.statement_rows(Dataset::IncomeStatement, &symbol).await,
            },
            calculations: Calculations {
                graham_number: valuation::graham_number(eps, bvps),
                intrinsic_value: valuation::intrinsic_value(eps, growth, self.aaa_bond_yield),
            },
            key_stats: stats,
            profile,
            symbol,
        }
    }

    /// All rows of one statement for a symbol, latest first.
    pub async fn statement_rows(
        &self,
        dataset: Dataset,
        symbol: &str,
    ) -> Vec<serde_json::Map<String, serde_json::Value>> {
        let config = self.config.clone();
        let symbol = symbol.to_string();
        tokio::task::spawn_blocking(move || RawTable::load(&config, dataset).symbol_rows(&symbol))
            .await
            .unwrap_or_else(|e| {
                tracing::error!("Loading {} failed: {}", dataset.key(), e);
                Vec::new()
            })
    }

    pub async fn statement_page(&self, symbol: &str, statement: StatementType) -> StatementPage {
        let symbol = symbol.to_uppercase();
        let name = match self.market.quote_summary(&symbol).await {
            Ok(q) => q.display_name().to_string(),
            Err(_) => symbol.clone(),
        };

        StatementPage {
            page_title: format!("{} - {}", name, statement.title()),
            rows: self.statement_rows(statement.dataset(), &symbol).await,
            statement_type: statement.slug(),
            symbol,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use market_data::{MarketDataError, PriceBar, QuoteSummary};

    struct FixedMarket;

    #[async_trait]
    impl MarketDataSource for FixedMarket {
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

    fn fixture_engine(dir: &std::path::Path) -> ValuationEngine {
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

        let config = FundamentalsConfig::new(dir, csv_data::DEFAULT_FILE_MAPPING, "Year");
        ValuationEngine::new(config, Arc::new(FixedMarket), 4.5)
    }

    #[tokio::test]
    async fn test_screener_rows_preserve_order() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fixture_engine(dir.path());

        let rows = engine
            .screener_rows(&["ACME".to_string(), "GONE".to_string()])
            .await;

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].symbol, "ACME");
        assert_eq!(rows[0].graham_number, Some(47.43));
        assert_eq!(rows[0].avg_pe, Some(11.0));
        assert_eq!(rows[1].company_name, "GONE");
        assert!(rows[1].prev_close.is_none());
    }

    #[tokio::test]
    async fn test_stock_detail_assembles_sections() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fixture_engine(dir.path());

        let detail = engine.stock_detail("acme").await;
        assert_eq!(detail.symbol, "ACME");
        assert_eq!(detail.page_title, "Acme Corp (ACME)");
        assert_eq!(detail.chart_data.prices, vec![50.0, 60.0]);
        assert_eq!(detail.returns_data.ytd, Some(20.0));
        assert_eq!(detail.financials.income_statement.len(), 1);
        assert_eq!(detail.calculations.graham_number, Some(47.43));

        let missing = engine.stock_detail("gone").await;
        assert_eq!(missing.profile.long_name, "GONE (Live data unavailable)");
        assert!(missing.key_stats.is_empty());
    }

    #[tokio::test]
    async fn test_statement_page() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fixture_engine(dir.path());

        let page = engine
            .statement_page("ACME", StatementType::BalanceSheet)
            .await;
        assert_eq!(page.page_title, "Acme Corp - Balance Sheet");
        assert_eq!(page.statement_type, "balance-sheet");
        assert_eq!(page.rows.len(), 1);
    }
}
