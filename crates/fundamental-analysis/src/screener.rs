use crate::csv_data::ValuationInputs;
use crate::valuation::{self, Growth, COMPLEX_GROWTH};
use serde::{Serialize, Serializer};

pub const TABLE_HEADERS: [&str; 10] = [
    "Company Name",
    "Symbol",
    "Prev. Close",
    "Avg P/E (5yr)",
    "Graham Num",
    "Graham Diff %",
    "Intrinsic Val",
    "Intrinsic Diff %",
    "EPS AVG (5yr)",
    "Growth Rate (avg past 10 yrs)",
];

/// Years of annual EPS used for the growth rate.
pub const GROWTH_YEARS: usize = 10;
/// Years of annual EPS averaged for "EPS AVG (5yr)".
pub const EPS_AVERAGE_YEARS: usize = 5;

/// One screener table row, serialized with the table headers as keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenerRow {
    #[serde(rename = "Company Name")]
    pub company_name: String,
    #[serde(rename = "Symbol")]
    pub symbol: String,
    #[serde(rename = "Prev. Close")]
    pub prev_close: Option<f64>,
    #[serde(rename = "Avg P/E (5yr)")]
    pub avg_pe: Option<f64>,
    #[serde(rename = "Graham Num")]
    pub graham_number: Option<f64>,
    #[serde(rename = "Graham Diff %", serialize_with = "percent_or_na")]
    pub graham_diff: Option<f64>,
    #[serde(rename = "Intrinsic Val")]
    pub intrinsic_value: Option<f64>,
    #[serde(rename = "Intrinsic Diff %", serialize_with = "percent_or_na")]
    pub intrinsic_diff: Option<f64>,
    #[serde(rename = "EPS AVG (5yr)")]
    pub eps_average: Option<f64>,
    #[serde(rename = "Growth Rate (avg past 10 yrs)", serialize_with = "growth_label")]
    pub eps_growth: Option<Growth>,
}

/// Live inputs for one symbol.
#[derive(Debug, Clone, Default)]
pub struct LiveQuote {
    pub company_name: Option<String>,
    pub prev_close: Option<f64>,
}

/// Format a percentage the way the table shows it: `12.5%`, `3.0%`.
pub fn format_percent(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.1}%", value)
    } else {
        format!("{}%", value)
    }
}

fn percent_or_na<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => serializer.serialize_str(&format_percent(*v)),
        None => serializer.serialize_str("N/A"),
    }
}

fn growth_label<S: Serializer>(value: &Option<Growth>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(Growth::Rate(r)) => serializer.serialize_str(&format_percent(*r)),
        Some(Growth::Complex) => serializer.serialize_str(COMPLEX_GROWTH),
        None => serializer.serialize_str("N/A"),
    }
}

/// Assemble a row from the CSV inputs, the live quote and the 5-year closes.
pub fn compute_row(
    inputs: &ValuationInputs,
    symbol: &str,
    quote: &LiveQuote,
    closes_5y: &[f64],
    aaa_bond_yield: f64,
) -> ScreenerRow {
    let eps = valuation::latest_annual_eps(&inputs.cash_flow, symbol);
    let avg_pe = valuation::average_pe(closes_5y, eps);
    let bvps = valuation::latest_bvps(&inputs.equity, symbol);
    let graham_number = valuation::graham_number(eps, bvps);
    let eps_growth = valuation::eps_growth(&inputs.eps_history, symbol, GROWTH_YEARS);
    let eps_average = valuation::eps_average(&inputs.eps_history, symbol, EPS_AVERAGE_YEARS);
    let intrinsic_value = valuation::intrinsic_value(eps, eps_growth, aaa_bond_yield);

    ScreenerRow {
        company_name: quote
            .company_name
            .clone()
            .unwrap_or_else(|| symbol.to_string()),
        symbol: symbol.to_uppercase(),
        prev_close: quote.prev_close,
        avg_pe,
        graham_number,
        graham_diff: valuation::diff_pct(quote.prev_close, graham_number),
        intrinsic_value,
        intrinsic_diff: valuation::diff_pct(quote.prev_close, intrinsic_value),
        eps_average,
        eps_growth,
    }
}

/// Symbols worth showing in the screener: an annual EPS, a usable book value
/// and at least two years of EPS history.
pub fn prefilter_symbols(inputs: &ValuationInputs) -> Vec<String> {
    let mut candidates: Vec<&str> = inputs.cash_flow.iter().map(|r| r.symbol.as_str()).collect();
    candidates.sort_unstable();
    candidates.dedup();

    candidates
        .into_iter()
        .filter(|symbol| {
            valuation::latest_annual_eps(&inputs.cash_flow, symbol).is_some()
                && valuation::latest_bvps(&inputs.equity, symbol).is_some()
                && valuation::annual_eps_series(&inputs.eps_history, symbol).len() >= 2
        })
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv_data::{AnnualEps, EpsReport, EquityRow};
    use chrono::NaiveDate;

    fn date(s: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
    }

    fn inputs() -> ValuationInputs {
        ValuationInputs {
            cash_flow: vec![AnnualEps {
                symbol: "ACME".into(),
                date: date("2023-12-31"),
                diluted_net_eps: Some(5.0),
            }],
            equity: vec![EquityRow {
                symbol: "ACME".into(),
                date: date("2023-12-31"),
                total_equity: Some(2000.0),
                shares_outstanding: Some(100.0),
            }],
            eps_history: vec![
                EpsReport {
                    symbol: "ACME".into(),
                    date: date("2022-12-31"),
                    reported: Some(4.0),
                },
                EpsReport {
                    symbol: "ACME".into(),
                    date: date("2023-12-31"),
                    reported: Some(5.0),
                },
            ],
        }
    }

    #[test]
    fn test_compute_row_end_to_end() {
        let quote = LiveQuote {
            company_name: Some("Acme Corp".into()),
            prev_close: Some(50.0),
        };
        let row = compute_row(&inputs(), "ACME", &quote, &[50.0, 60.0], 4.5);

        assert_eq!(row.company_name, "Acme Corp");
        assert_eq!(row.graham_number, Some(47.43));
        assert_eq!(row.avg_pe, Some(11.0));
        assert_eq!(row.eps_growth, Some(Growth::Rate(25.0)));
        assert_eq!(row.eps_average, Some(4.5));
        // 5 * (7 + 25) * 4.4 / 4.5
        assert_eq!(row.intrinsic_value, Some(156.44));
        assert_eq!(row.graham_diff, Some(5.42));

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["Graham Diff %"], "5.42%");
        assert_eq!(json["Growth Rate (avg past 10 yrs)"], "25.0%");
        assert_eq!(json["Graham Num"], 47.43);
    }

    #[test]
    fn test_row_without_quote_or_fundamentals() {
        let row = compute_row(&ValuationInputs::default(), "new", &LiveQuote::default(), &[], 4.5);
        assert_eq!(row.company_name, "new");
        assert_eq!(row.symbol, "NEW");
        assert!(row.graham_number.is_none());

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["Graham Diff %"], "N/A");
        assert_eq!(json["Growth Rate (avg past 10 yrs)"], "N/A");
        assert!(json["Prev. Close"].is_null());
    }

    #[test]
    fn test_prefilter_symbols() {
        let mut data = inputs();
        data.cash_flow.push(AnnualEps {
            symbol: "THIN".into(),
            date: date("2023-12-31"),
            diluted_net_eps: Some(1.0),
        });
        assert_eq!(prefilter_symbols(&data), vec!["ACME".to_string()]);
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(3.0), "3.0%");
        assert_eq!(format_percent(-12.34), "-12.34%");
    }
}
