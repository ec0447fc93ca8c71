use axum::{extract::State, routing::get, Extension, Json, Router};
use broker_trait::{BrokerClient, Mover, MoverSort, Provider};
use serde::Serialize;

use crate::auth::SessionContext;
use crate::{ApiResponse, AppError, AppState};

/// Index whose movers are shown on the dashboard.
pub const MOVERS_INDEX: &str = "$SPX.X";

pub fn dashboard_routes() -> Router<AppState> {
    Router::new().route("/dashboard/", get(dashboard))
}

#[derive(Debug, Default, Serialize)]
pub struct MarketMovers {
    pub gainers: Vec<Mover>,
    pub losers: Vec<Mover>,
    pub most_active: Vec<Mover>,
}

#[derive(Debug, Serialize)]
pub struct DashboardPage {
    pub page_title: &'static str,
    pub environment: String,
    pub show_connection_modal: bool,
    pub movers: Option<MarketMovers>,
}

async fn movers_bucket(broker: &dyn BrokerClient, token: &str, sort: MoverSort) -> Vec<Mover> {
    match broker.get_movers(token, MOVERS_INDEX, sort).await {
        Ok(movers) => movers,
        Err(e) => {
            tracing::warn!(
                "Fetching {} movers ({}) from {} failed: {}",
                MOVERS_INDEX,
                sort.as_str(),
                broker.broker_name(),
                e
            );
            Vec::new()
        }
    }
}

/// Gainers, losers and most active; each list fails on its own.
pub async fn fetch_market_movers(broker: &dyn BrokerClient, token: &str) -> MarketMovers {
    let (gainers, losers, most_active) = tokio::join!(
        movers_bucket(broker, token, MoverSort::PercentChangeUp),
        movers_bucket(broker, token, MoverSort::PercentChangeDown),
        movers_bucket(broker, token, MoverSort::Volume),
    );
    MarketMovers {
        gainers,
        losers,
        most_active,
    }
}

async fn dashboard(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> Result<Json<ApiResponse<DashboardPage>>, AppError> {
    let movers = match state.broker.as_ref() {
        Some(broker) => match state.tokens.get(ctx.user.id, Provider::Schwab).await? {
            Some(token) => Some(fetch_market_movers(broker.as_ref(), &token.access_token).await),
            None => None,
        },
        None => None,
    };

    Ok(Json(ApiResponse::success(DashboardPage {
        page_title: "Portfolio Dashboard",
        environment: state.config.environment.clone(),
        show_connection_modal: !ctx.has_brokerage_connection,
        movers,
    })))
}
