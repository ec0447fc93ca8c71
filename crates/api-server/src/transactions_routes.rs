use axum::{
    extract::{Query, State},
    routing::get,
    Extension, Json, Router,
};
use broker_trait::{Provider, Transaction};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::auth::SessionContext;
use crate::{ApiResponse, AppError, AppState};

pub const DEFAULT_WINDOW_DAYS: i64 = 90;

pub fn transactions_routes() -> Router<AppState> {
    Router::new().route("/transactions/", get(transactions))
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct TransactionBucket {
    pub transactions: Vec<Transaction>,
    pub total: Decimal,
}

impl TransactionBucket {
    fn push(&mut self, transaction: Transaction) {
        self.total += transaction.net_amount;
        self.transactions.push(transaction);
    }
}

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct CategorizedTransactions {
    pub deposits_and_withdrawals: TransactionBucket,
    pub dividends_and_interest: TransactionBucket,
    pub transfers: TransactionBucket,
    pub trades: TransactionBucket,
    pub other: TransactionBucket,
}

/// Bucket by the upper-cased type string; first matching rule wins.
pub fn categorize_transactions(transactions: Vec<Transaction>) -> CategorizedTransactions {
    let mut categories = CategorizedTransactions::default();

    for transaction in transactions {
        let kind = transaction.transaction_type.to_uppercase();
        let bucket = if kind.contains("DEPOSIT") || kind.contains("WITHDRAWAL") {
            &mut categories.deposits_and_withdrawals
        } else if kind.contains("DIVIDEND") || kind.contains("INTEREST") {
            &mut categories.dividends_and_interest
        } else if kind.contains("TRANSFER") {
            &mut categories.transfers
        } else if kind == "TRADE" {
            &mut categories.trades
        } else {
            &mut categories.other
        };
        bucket.push(transaction);
    }

    categories
}

fn parse_day(raw: Option<&str>, field: &str) -> Result<Option<NaiveDate>, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| AppError::bad_request(format!("Invalid {}: expected YYYY-MM-DD", field))),
    }
}

/// Requested window. A missing start is 90 days before today, a missing end
/// is today; the end day is inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DateWindow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

pub fn resolve_window(query: &TransactionQuery, today: NaiveDate) -> Result<DateWindow, AppError> {
    let end_date = parse_day(query.end_date.as_deref(), "end_date")?.unwrap_or(today);
    let start_date = parse_day(query.start_date.as_deref(), "start_date")?
        .unwrap_or(today - Duration::days(DEFAULT_WINDOW_DAYS));

    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    Ok(DateWindow {
        start_date,
        end_date,
        start: start_date.and_time(NaiveTime::MIN).and_utc(),
        end: end_date.and_time(end_of_day).and_utc(),
    })
}

#[derive(Debug, Serialize)]
pub struct TransactionsPage {
    pub page_title: &'static str,
    pub environment: String,
    pub start_date: String,
    pub end_date: String,
    pub transaction_count: usize,
    pub categories: CategorizedTransactions,
    pub error_message: Option<String>,
}

async fn transactions(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<ApiResponse<TransactionsPage>>, AppError> {
    let window = resolve_window(&query, Utc::now().date_naive())?;
    let token = state.tokens.get(ctx.user.id, Provider::Schwab).await?;

    let (transactions, error_message) = match (state.broker.as_ref(), token) {
        (Some(broker), Some(token)) => {
            let fetched = broker
                .get_transactions(&token.access_token, window.start, window.end)
                .await
                .unwrap_or_else(|e| {
                    tracing::error!("Fetching transactions failed: {}", e);
                    Vec::new()
                });
            let message = fetched.is_empty().then(|| {
                format!(
                    "No transactions found for the selected date range ({} to {}).",
                    window.start_date, window.end_date
                )
            });
            (fetched, message)
        }
        _ => (
            Vec::new(),
            Some("You haven't connected a Schwab account yet.".to_string()),
        ),
    };

    Ok(Json(ApiResponse::success(TransactionsPage {
        page_title: "Transactions",
        environment: state.config.environment.clone(),
        start_date: window.start_date.to_string(),
        end_date: window.end_date.to_string(),
        transaction_count: transactions.len(),
        categories: categorize_transactions(transactions),
        error_message,
    })))
}
