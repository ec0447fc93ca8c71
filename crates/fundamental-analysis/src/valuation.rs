//! Graham-style valuation formulas. All inputs are plain numbers or the typed
//! CSV rows, so everything here is deterministic.

use crate::csv_data::{AnnualEps, EpsReport, EquityRow};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

pub const COMPLEX_GROWTH: &str = "N/A (Complex)";

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Result of a compound-growth calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Growth {
    Rate(f64),
    /// Start and end disagree in sign (or are both negative).
    Complex,
}

impl Growth {
    pub fn rate(&self) -> Option<f64> {
        match self {
            Growth::Rate(r) => Some(*r),
            Growth::Complex => None,
        }
    }
}

impl Serialize for Growth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Growth::Rate(r) => serializer.serialize_f64(*r),
            Growth::Complex => serializer.serialize_str(COMPLEX_GROWTH),
        }
    }
}

/// Diluted EPS from the symbol's most recent annual cash-flow row.
pub fn latest_annual_eps(rows: &[AnnualEps], symbol: &str) -> Option<f64> {
    rows.iter()
        .filter(|r| r.symbol == symbol)
        .max_by_key(|r| r.date)
        .and_then(|r| r.diluted_net_eps)
}

/// Mean of close / EPS over the supplied price history.
pub fn average_pe(closes: &[f64], eps: Option<f64>) -> Option<f64> {
    let eps = eps.filter(|e| *e != 0.0)?;
    if closes.is_empty() {
        return None;
    }
    let sum: f64 = closes.iter().map(|c| c / eps).sum();
    Some(round2(sum / closes.len() as f64))
}

/// Book value per share from the most recent annual equity row.
pub fn latest_bvps(rows: &[EquityRow], symbol: &str) -> Option<f64> {
    let row = rows
        .iter()
        .filter(|r| r.symbol == symbol)
        .max_by_key(|r| r.date)?;
    let equity = row.total_equity?;
    let shares = row.shares_outstanding.filter(|s| *s != 0.0)?;
    Some(round2(equity / shares))
}

/// √(22.5 · EPS · BVPS); only defined for positive inputs.
pub fn graham_number(eps: Option<f64>, bvps: Option<f64>) -> Option<f64> {
    match (eps, bvps) {
        (Some(e), Some(b)) if e > 0.0 && b > 0.0 => Some(round2((22.5 * e * b).sqrt())),
        _ => None,
    }
}

/// Compound annual growth between the first and last points, as a percent.
pub fn cagr(series: &[f64]) -> Option<Growth> {
    if series.len() < 2 {
        return None;
    }
    let periods = (series.len() - 1) as f64;
    let (start, end) = (series[0], series[series.len() - 1]);
    if start == 0.0 {
        return None;
    }
    if (start < 0.0 && end > 0.0) || (start > 0.0 && end < 0.0) || (start < 0.0 && end < 0.0) {
        return Some(Growth::Complex);
    }
    let rate = ((end / start).powf(1.0 / periods) - 1.0) * 100.0;
    rate.is_finite().then(|| Growth::Rate(round2(rate)))
}

/// Reported EPS summed per calendar year, oldest first. Every year between
/// the first and last report is present; a year without reports sums to 0.
pub fn annual_eps_series(reports: &[EpsReport], symbol: &str) -> Vec<(i32, f64)> {
    use chrono::Datelike;

    let mut by_year: BTreeMap<i32, f64> = BTreeMap::new();
    for report in reports.iter().filter(|r| r.symbol == symbol) {
        if let Some(date) = report.date {
            *by_year.entry(date.year()).or_insert(0.0) += report.reported.unwrap_or(0.0);
        }
    }

    let (Some(&first), Some(&last)) = (by_year.keys().next(), by_year.keys().next_back()) else {
        return Vec::new();
    };
    (first..=last)
        .map(|year| (year, by_year.get(&year).copied().unwrap_or(0.0)))
        .collect()
}

/// CAGR of annual EPS over at most `years` years.
pub fn eps_growth(reports: &[EpsReport], symbol: &str, years: usize) -> Option<Growth> {
    let series = annual_eps_series(reports, symbol);
    if series.len() < 2 {
        return None;
    }
    let span = years.min(series.len() - 1);
    if span == 0 {
        return None;
    }
    let values: Vec<f64> = series[series.len() - (span + 1)..]
        .iter()
        .map(|(_, v)| *v)
        .collect();
    cagr(&values)
}

/// Mean of the last `years` annual EPS sums.
pub fn eps_average(reports: &[EpsReport], symbol: &str, years: usize) -> Option<f64> {
    let series = annual_eps_series(reports, symbol);
    if series.is_empty() || years == 0 {
        return None;
    }
    let tail = &series[series.len().saturating_sub(years)..];
    let sum: f64 = tail.iter().map(|(_, v)| v).sum();
    Some(round2(sum / tail.len() as f64))
}

/// EPS · (7 + g) · 4.4 / AAA yield
pub fn intrinsic_value(
    eps: Option<f64>,
    growth: Option<Growth>,
    aaa_bond_yield: f64,
) -> Option<f64> {
    let eps = eps.filter(|e| *e > 0.0)?;
    let g = growth.and_then(|g| g.rate())?;
    if aaa_bond_yield <= 0.0 {
        return None;
    }
    Some(round2(eps * (7.0 + g) * 4.4 / aaa_bond_yield))
}

/// How far the previous close sits above (+) or below (−) a valuation, in percent.
pub fn diff_pct(prev_close: Option<f64>, value: Option<f64>) -> Option<f64> {
    let price = prev_close.filter(|p| *p != 0.0)?;
    let value = value.filter(|v| *v != 0.0)?;
    Some(round2((price - value) / value * 100.0))
}
