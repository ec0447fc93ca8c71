use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use fundamental_analysis::{
    read_symbol_list, FundamentalsError, ScreenerRow, StatementPage, StatementType, StockDetail,
    TABLE_HEADERS,
};
use serde::{Deserialize, Serialize};

use crate::cache::{get_json, set_json};
use crate::{ApiResponse, AppError, AppState};

pub const SYMBOLS_CACHE_KEY: &str = "valid_screener_symbols";

const SYMBOLS_MISSING: &str =
    "The list of valid stocks has not been generated yet. Run `data-loader prefilter` to build it.";

pub fn screener_routes() -> Router<AppState> {
    Router::new()
        .route("/screener/", get(screener))
        .route("/screener/stock/:symbol/", get(stock_detail))
        .route(
            "/screener/stock/:symbol/financials/:statement_type",
            get(financials),
        )
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageInfo {
    pub number: usize,
    pub num_pages: usize,
    pub has_previous: bool,
    pub has_next: bool,
}

/// Page `requested` of `total` items. Non-numeric input gives the first page;
/// anything out of range gives the last.
pub fn paginate(
    total: usize,
    page_size: usize,
    requested: Option<&str>,
) -> (PageInfo, std::ops::Range<usize>) {
    let page_size = page_size.max(1);
    let num_pages = total.div_ceil(page_size).max(1);

    let number = match requested.map(str::trim).map(str::parse::<i64>) {
        None | Some(Err(_)) => 1,
        Some(Ok(n)) if n >= 1 && (n as usize) <= num_pages => n as usize,
        Some(Ok(_)) => num_pages,
    };

    let start = (number - 1) * page_size;
    let end = (start + page_size).min(total);
    (
        PageInfo {
            number,
            num_pages,
            has_previous: number > 1,
            has_next: number < num_pages,
        },
        start.min(total)..end,
    )
}

/// Case-insensitive substring match on the symbol.
pub fn filter_symbols<'a>(symbols: &'a [String], query: &str) -> Vec<&'a String> {
    let needle = query.trim().to_uppercase();
    symbols
        .iter()
        .filter(|s| needle.is_empty() || s.to_uppercase().contains(&needle))
        .collect()
}

// ---------------------------------------------------------------------------
// Screener table
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ScreenerQuery {
    pub q: Option<String>,
    pub page: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ScreenerPage {
    pub page_title: &'static str,
    pub table_headers: [&'static str; 10],
    pub stocks: Vec<ScreenerRow>,
    pub search_query: String,
    pub total_results: usize,
    pub page: PageInfo,
    pub error_message: Option<String>,
}

/// Cached symbol list, reloaded from disk on a miss.
async fn valid_symbols(state: &AppState) -> Result<Vec<String>, String> {
    if let Some(symbols) = get_json::<Vec<String>>(state.cache.as_ref(), SYMBOLS_CACHE_KEY).await {
        tracing::debug!("Using cached screener symbols");
        return Ok(symbols);
    }

    let path = state.config.fundamentals.valid_symbols_path();
    let loaded = tokio::task::spawn_blocking(move || read_symbol_list(&path))
        .await
        .map_err(|e| {
            tracing::error!("Symbol list task failed: {}", e);
            "Could not read the list of valid stocks.".to_string()
        })?;

    match loaded {
        Ok(symbols) => {
            set_json(
                state.cache.as_ref(),
                SYMBOLS_CACHE_KEY,
                &symbols,
                state.config.symbol_cache_ttl,
            )
            .await;
            tracing::info!("Loaded {} screener symbols", symbols.len());
            Ok(symbols)
        }
        Err(FundamentalsError::SymbolListMissing(path)) => {
            tracing::warn!("Symbol list missing at {}", path.display());
            Err(SYMBOLS_MISSING.to_string())
        }
        Err(e) => {
            tracing::error!("Reading symbol list failed: {}", e);
            Err("Could not read the list of valid stocks.".to_string())
        }
    }
}

async fn screener(
    State(state): State<AppState>,
    Query(query): Query<ScreenerQuery>,
) -> Result<Json<ApiResponse<ScreenerPage>>, AppError> {
    let search_query = query.q.unwrap_or_default().trim().to_string();
    let page_size = state.config.screener_page_size;

    let (symbols, error_message) = match valid_symbols(&state).await {
        Ok(symbols) => (symbols, None),
        Err(message) => (Vec::new(), Some(message)),
    };

    let matches = filter_symbols(&symbols, &search_query);
    let (page, range) = paginate(matches.len(), page_size, query.page.as_deref());
    let page_symbols: Vec<String> = matches[range].iter().map(|s| s.to_string()).collect();

    let stocks = state.valuation.screener_rows(&page_symbols).await;

    Ok(Json(ApiResponse::success(ScreenerPage {
        page_title: "Stock Screener",
        table_headers: TABLE_HEADERS,
        stocks,
        search_query,
        total_results: matches.len(),
        page,
        error_message,
    })))
}

// ---------------------------------------------------------------------------
// Stock pages
// ---------------------------------------------------------------------------

async fn stock_detail(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<StockDetail>>, AppError> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err(AppError::bad_request("Symbol is required"));
    }
    Ok(Json(ApiResponse::success(
        state.valuation.stock_detail(symbol).await,
    )))
}

async fn financials(
    State(state): State<AppState>,
    Path((symbol, statement_type)): Path<(String, String)>,
) -> Result<Json<ApiResponse<StatementPage>>, AppError> {
    let statement: StatementType = statement_type
        .parse()
        .map_err(|_| AppError::not_found(format!("Unknown statement type: {}", statement_type)))?;

    Ok(Json(ApiResponse::success(
        state.valuation.statement_page(symbol.trim(), statement).await,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate_basic() {
        let (page, range) = paginate(40, 15, Some("2"));
        assert_eq!(range, 15..30);
        assert_eq!(
            page,
            PageInfo {
                number: 2,
                num_pages: 3,
                has_previous: true,
                has_next: true
            }
        );
    }

    #[test]
    fn test_paginate_fallbacks() {
        // Non-numeric -> first page
        assert_eq!(paginate(40, 15, Some("abc")).0.number, 1);
        assert_eq!(paginate(40, 15, None).0.number, 1);
        // Out of range -> last page
        let (page, range) = paginate(40, 15, Some("99"));
        assert_eq!(page.number, 3);
        assert_eq!(range, 30..40);
        assert!(!page.has_next);
        assert_eq!(paginate(40, 15, Some("0")).0.number, 3);
    }

    #[test]
    fn test_paginate_empty() {
        let (page, range) = paginate(0, 15, Some("4"));
        assert_eq!(page.number, 1);
        assert_eq!(page.num_pages, 1);
        assert!(range.is_empty());
    }

    #[test]
    fn test_filter_symbols_is_case_insensitive() {
        let symbols: Vec<String> = ["AAPL", "MSFT", "AMAT"].iter().map(|s| s.to_string()).collect();
        let found: Vec<&String> = filter_symbols(&symbols, "a");
        assert_eq!(found.len(), 2);
        assert_eq!(filter_symbols(&symbols, "").len(), 3);
        assert_eq!(filter_symbols(&symbols, " ms ")[0], "MSFT");
    }
}
