use crate::valuation::round2;
use chrono::{Datelike, Months, NaiveDate};
use market_data::PriceBar;
use serde::Serialize;

/// Trailing returns in percent; absent keys mean "not enough history".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoricalReturns {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ytd: Option<f64>,
    #[serde(rename = "3y", skip_serializing_if = "Option::is_none")]
    pub three_year: Option<f64>,
    #[serde(rename = "5y", skip_serializing_if = "Option::is_none")]
    pub five_year: Option<f64>,
    #[serde(rename = "10y", skip_serializing_if = "Option::is_none")]
    pub ten_year: Option<f64>,
}

/// YTD and 3/5/10-year annualized returns from daily closes (oldest first).
pub fn historical_returns(bars: &[PriceBar]) -> HistoricalReturns {
    let Some(last) = bars.last() else {
        return HistoricalReturns::default();
    };

    HistoricalReturns {
        ytd: year_to_date(bars, last),
        three_year: annualized(bars, last, 3),
        five_year: annualized(bars, last, 5),
        ten_year: annualized(bars, last, 10),
    }
}

fn year_to_date(bars: &[PriceBar], last: &PriceBar) -> Option<f64> {
    let jan_first = NaiveDate::from_ymd_opt(last.date.year(), 1, 1)?;
    let start = bars.iter().find(|b| b.date >= jan_first)?;
    if start.close == 0.0 {
        return None;
    }
    Some(round2((last.close / start.close - 1.0) * 100.0))
}

fn annualized(bars: &[PriceBar], last: &PriceBar, years: u32) -> Option<f64> {
    let target = last.date.checked_sub_months(Months::new(12 * years))?;
    // Last bar on or before the target date
    let start = bars.iter().rev().find(|b| b.date <= target)?;

    let span_years = (last.date - start.date).num_days() as f64 / 365.25;
    if start.close <= 0.0 || span_years <= 0.0 {
        return None;
    }
    let rate = ((last.close / start.close).powf(1.0 / span_years) - 1.0) * 100.0;
    rate.is_finite().then(|| round2(rate))
}
