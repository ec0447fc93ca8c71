use axum::{extract::State, routing::get, Extension, Json, Router};
use broker_trait::{Holding, Provider};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::auth::SessionContext;
use crate::{ApiResponse, AppError, AppState};

const NOT_CONNECTED: &str = "You haven't connected a Schwab account yet.";
const TOKEN_REJECTED: &str = "API Error: Could not fetch holdings. The token may have expired.";
const UNEXPECTED: &str = "An unexpected error occurred while fetching holdings.";

pub fn holdings_routes() -> Router<AppState> {
    Router::new().route("/holdings/", get(holdings))
}

#[derive(Debug, Serialize)]
pub struct HoldingView {
    #[serde(flatten)]
    pub holding: Holding,
    pub unrealized_profit_loss: Decimal,
}

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct HoldingTotals {
    pub total_market_value: Decimal,
    pub total_day_gain_loss: Decimal,
    pub total_cost_basis: Decimal,
    pub total_unrealized_gain_loss: Decimal,
}

#[derive(Debug, Serialize)]
pub struct HoldingsPage {
    pub page_title: &'static str,
    pub environment: String,
    pub holdings: Vec<HoldingView>,
    pub totals: HoldingTotals,
    pub error_message: Option<String>,
}

pub fn summarize(holdings: &[Holding]) -> HoldingTotals {
    holdings.iter().fold(HoldingTotals::default(), |mut t, h| {
        t.total_market_value += h.market_value;
        t.total_day_gain_loss += h.day_profit_loss;
        t.total_cost_basis += h.cost_basis;
        t.total_unrealized_gain_loss += h.unrealized_profit_loss();
        t
    })
}

async fn holdings(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> Result<Json<ApiResponse<HoldingsPage>>, AppError> {
    let token = state.tokens.get(ctx.user.id, Provider::Schwab).await?;

    let result = match (state.broker.as_ref(), token) {
        (Some(broker), Some(token)) => broker
            .get_holdings(&token.access_token)
            .await
            .map_err(|e| {
                if e.is_auth_failure() {
                    tracing::warn!("Holdings request rejected: {}", e);
                    TOKEN_REJECTED
                } else {
                    tracing::error!("Holdings request failed: {}", e);
                    UNEXPECTED
                }
            }),
        _ => Err(NOT_CONNECTED),
    };

    let (holdings, error_message) = match result {
        Ok(holdings) => (holdings, None),
        Err(message) => (Vec::new(), Some(message.to_string())),
    };

    let totals = summarize(&holdings);
    let holdings = holdings
        .into_iter()
        .map(|holding| HoldingView {
            unrealized_profit_loss: holding.unrealized_profit_loss(),
            holding,
        })
        .collect();

    Ok(Json(ApiResponse::success(HoldingsPage {
        page_title: "Holdings",
        environment: state.config.environment.clone(),
        holdings,
        totals,
        error_message,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn holding(symbol: &str, market_value: Decimal, cost_basis: Decimal, day: Decimal) -> Holding {
        Holding {
            symbol: symbol.to_string(),
            description: None,
            asset_type: Some("EQUITY".into()),
            quantity: dec!(10),
            average_price: cost_basis / dec!(10),
            market_value,
            cost_basis,
            day_profit_loss: day,
            day_profit_loss_percent: None,
        }
    }

    #[test]
    fn test_summarize_sums_every_column() {
        let totals = summarize(&[
            holding("AAPL", dec!(1900.50), dec!(1500.00), dec!(12.25)),
            holding("MSFT", dec!(4100.00), dec!(4300.00), dec!(-30.00)),
        ]);
        assert_eq!(totals.total_market_value, dec!(6000.50));
        assert_eq!(totals.total_cost_basis, dec!(5800.00));
        assert_eq!(totals.total_day_gain_loss, dec!(-17.75));
        assert_eq!(totals.total_unrealized_gain_loss, dec!(200.50));
    }

    #[test]
    fn test_summarize_empty() {
        assert_eq!(summarize(&[]), HoldingTotals::default());
    }
}
