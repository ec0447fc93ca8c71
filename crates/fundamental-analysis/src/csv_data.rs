use crate::FundamentalsError;
use chrono::NaiveDate;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_FILE_MAPPING: &str = "cash_flow=cash_flow_statement.csv,equity=balance_sheet_equity.csv,eps_history=eps_history.csv,income_statement=income_statement.csv";
pub const VALID_SYMBOLS_FILE: &str = "valid_tickers_for_screener.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    CashFlow,
    Equity,
    EpsHistory,
    IncomeStatement,
}

impl Dataset {
    pub fn key(&self) -> &'static str {
        match self {
            Dataset::CashFlow => "cash_flow",
            Dataset::Equity => "equity",
            Dataset::EpsHistory => "eps_history",
            Dataset::IncomeStatement => "income_statement",
        }
    }
}

/// Where the fundamentals snapshots live and how annual rows are marked.
#[derive(Debug, Clone)]
pub struct FundamentalsConfig {
    pub csv_dir: PathBuf,
    pub files: HashMap<String, String>,
    pub annual_period: String,
}

impl FundamentalsConfig {
    pub fn new(
        csv_dir: impl Into<PathBuf>,
        mapping: &str,
        annual_period: impl Into<String>,
    ) -> Self {
        Self {
            csv_dir: csv_dir.into(),
            files: parse_file_mapping(mapping),
            annual_period: annual_period.into(),
        }
    }

    pub fn from_env() -> Self {
        let csv_dir = std::env::var("FUNDAMENTALS_CSV_DIR")
            .unwrap_or_else(|_| "data/fundamentals".to_string());
        let mapping = std::env::var("FUNDAMENTALS_FILES")
            .unwrap_or_else(|_| DEFAULT_FILE_MAPPING.to_string());
        let annual_period =
            std::env::var("ANNUAL_REPORT_PERIOD").unwrap_or_else(|_| "Year".to_string());
        Self::new(csv_dir, &mapping, annual_period)
    }

    pub fn valid_symbols_path(&self) -> PathBuf {
        self.csv_dir.join(VALID_SYMBOLS_FILE)
    }

    /// Resolved path for a dataset, or None (logged) when unmapped or absent.
    pub fn path_for(&self, dataset: Dataset) -> Option<PathBuf> {
        let Some(file) = self.files.get(dataset.key()) else {
            tracing::error!("No file configured for dataset '{}'", dataset.key());
            return None;
        };
        let path = self.csv_dir.join(file);
        if !path.exists() {
            tracing::warn!(
                "CSV file not found: {}. Sync the fundamentals snapshots first.",
                path.display()
            );
            return None;
        }
        Some(path)
    }
}

/// Parse `key=file,key=file`; malformed entries are skipped.
pub fn parse_file_mapping(mapping: &str) -> HashMap<String, String> {
    mapping
        .split(',')
        .filter_map(|entry| {
            let (key, file) = entry.split_once('=')?;
            let (key, file) = (key.trim(), file.trim());
            if key.is_empty() || file.is_empty() {
                None
            } else {
                Some((key.to_string(), file.to_string()))
            }
        })
        .collect()
}

/// A CSV snapshot with normalized headers (`act_symbol` -> `symbol`,
/// `period_end_date` -> `date`).
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub records: Vec<csv::StringRecord>,
}

impl RawTable {
    pub fn read(path: &Path) -> Result<Self, FundamentalsError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;

        let headers = reader
            .headers()?
            .iter()
            .map(|h| match h.trim() {
                "act_symbol" => "symbol".to_string(),
                "period_end_date" => "date".to_string(),
                other => other.to_string(),
            })
            .collect();

        let records = reader.records().collect::<Result<Vec<_>, _>>()?;
        Ok(Self { headers, records })
    }

    /// Load a dataset; any failure yields an empty table.
    pub fn load(config: &FundamentalsConfig, dataset: Dataset) -> Self {
        let Some(path) = config.path_for(dataset) else {
            return Self::default();
        };
        match Self::read(&path) {
            Ok(table) => table,
            Err(e) => {
                tracing::error!("Error loading CSV {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Keep only rows whose `period` equals `annual_period`. Tables without a
    /// `period` column are left untouched.
    pub fn annual_only(mut self, annual_period: &str) -> Self {
        if let Some(idx) = self.column("period") {
            self.records
                .retain(|r| r.get(idx).map(str::trim) == Some(annual_period));
            if self.records.is_empty() {
                tracing::warn!("Filtering for period='{}' left no rows", annual_period);
            }
        }
        self
    }

    fn cell<'a>(&self, record: &'a csv::StringRecord, column: Option<usize>) -> Option<&'a str> {
        column.and_then(|i| record.get(i)).map(str::trim)
    }

    /// Rows for one symbol as JSON objects, latest date first.
    pub fn symbol_rows(&self, symbol: &str) -> Vec<Map<String, Value>> {
        let symbol_col = self.column("symbol");
        let date_col = self.column("date");

        let mut rows: Vec<(Option<NaiveDate>, Map<String, Value>)> = self
            .records
            .iter()
            .filter(|r| self.cell(r, symbol_col) == Some(symbol))
            .map(|r| {
                let object = self
                    .headers
                    .iter()
                    .zip(r.iter())
                    .map(|(h, v)| (h.clone(), cell_value(v)))
                    .collect();
                (parse_date(self.cell(r, date_col)), object)
            })
            .collect();

        rows.sort_by(|a, b| b.0.cmp(&a.0));
        rows.into_iter().map(|(_, row)| row).collect()
    }
}

fn cell_value(raw: &str) -> Value {
    let raw = raw.trim();
    if raw.is_empty() {
        return Value::Null;
    }
    match raw.parse::<f64>().ok().and_then(Number::from_f64) {
        Some(n) => Value::Number(n),
        None => Value::String(raw.to_string()),
    }
}

pub fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    raw.and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
}

pub fn parse_number(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

// ---------------------------------------------------------------------------
// Typed views used by the valuation formulas
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct AnnualEps {
    pub symbol: String,
    pub date: Option<NaiveDate>,
    pub diluted_net_eps: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EquityRow {
    pub symbol: String,
    pub date: Option<NaiveDate>,
    pub total_equity: Option<f64>,
    pub shares_outstanding: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpsReport {
    pub symbol: String,
    pub date: Option<NaiveDate>,
    pub reported: Option<f64>,
}

/// The three datasets the valuation needs, loaded once per request.
#[derive(Debug, Clone, Default)]
pub struct ValuationInputs {
    pub cash_flow: Vec<AnnualEps>,
    pub equity: Vec<EquityRow>,
    pub eps_history: Vec<EpsReport>,
}

impl ValuationInputs {
    pub fn load(config: &FundamentalsConfig) -> Self {
        let cash_flow =
            RawTable::load(config, Dataset::CashFlow).annual_only(&config.annual_period);
        let equity = RawTable::load(config, Dataset::Equity).annual_only(&config.annual_period);
        let eps_history = RawTable::load(config, Dataset::EpsHistory);

        Self::from_tables(&cash_flow, &equity, &eps_history)
    }

    pub fn from_tables(cash_flow: &RawTable, equity: &RawTable, eps_history: &RawTable) -> Self {
        let cf = (
            cash_flow.column("symbol"),
            cash_flow.column("date"),
            cash_flow.column("diluted_net_eps"),
        );
        let eq = (
            equity.column("symbol"),
            equity.column("date"),
            equity.column("total_equity"),
            equity.column("shares_outstanding"),
        );
        let eh = (
            eps_history.column("symbol"),
            eps_history.column("date"),
            eps_history.column("reported"),
        );

        Self {
            cash_flow: cash_flow
                .records
                .iter()
                .filter_map(|r| {
                    Some(AnnualEps {
                        symbol: cash_flow.cell(r, cf.0)?.to_string(),
                        date: parse_date(cash_flow.cell(r, cf.1)),
                        diluted_net_eps: parse_number(cash_flow.cell(r, cf.2)),
                    })
                })
                .collect(),
            equity: equity
                .records
                .iter()
                .filter_map(|r| {
                    Some(EquityRow {
                        symbol: equity.cell(r, eq.0)?.to_string(),
                        date: parse_date(equity.cell(r, eq.1)),
                        total_equity: parse_number(equity.cell(r, eq.2)),
                        shares_outstanding: parse_number(equity.cell(r, eq.3)),
                    })
                })
                .collect(),
            eps_history: eps_history
                .records
                .iter()
                .filter_map(|r| {
                    Some(EpsReport {
                        symbol: eps_history.cell(r, eh.0)?.to_string(),
                        date: parse_date(eps_history.cell(r, eh.1)),
                        reported: parse_number(eps_history.cell(r, eh.2)),
                    })
                })
                .collect(),
        }
    }
}

/// One symbol per line, blank lines ignored.
pub fn read_symbol_list(path: &Path) -> Result<Vec<String>, FundamentalsError> {
    if !path.exists() {
        return Err(FundamentalsError::SymbolListMissing(path.to_path_buf()));
    }
    let contents = std::fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

pub fn write_symbol_list(path: &Path, symbols: &[String]) -> Result<(), FundamentalsError> {
    let mut contents = symbols.join("\n");
    contents.push('\n');
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(dir: &Path, name: &str, contents: &str) {
        let mut f = std::fs::File::create(dir.join(name)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn test_parse_file_mapping() {
        let files = parse_file_mapping(DEFAULT_FILE_MAPPING);
        assert_eq!(files.len(), 4);
        assert_eq!(files["equity"], "balance_sheet_equity.csv");

        let partial = parse_file_mapping("cash_flow=cf.csv, broken ,=x.csv");
        assert_eq!(partial.len(), 1);
    }

    #[test]
    fn test_missing_file_yields_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let config = FundamentalsConfig::new(dir.path(), DEFAULT_FILE_MAPPING, "Year");
        assert!(RawTable::load(&config, Dataset::CashFlow).is_empty());

        let unmapped = FundamentalsConfig::new(dir.path(), "", "Year");
        assert!(RawTable::load(&unmapped, Dataset::Equity).is_empty());
    }

    #[test]
    fn test_annual_filter_and_typed_rows() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            dir.path(),
            "cash_flow_statement.csv",
            "act_symbol,date,period,diluted_net_eps\n\
             AAPL,2023-09-30,Year,6.13\n\
             AAPL,2023-12-30,Quarter,2.18\n\
             MSFT,2023-06-30,Year,n/a\n",
        );
        write_csv(
            dir.path(),
            "eps_history.csv",
            "act_symbol,period_end_date,reported,estimate\n\
             AAPL,2023-12-30,2.18,2.10\n\
             AAPL,bad-date,1.00,\n",
        );
        let config = FundamentalsConfig::new(dir.path(), DEFAULT_FILE_MAPPING, "Year");
        let inputs = ValuationInputs::load(&config);

        assert_eq!(inputs.cash_flow.len(), 2);
        assert_eq!(inputs.cash_flow[0].diluted_net_eps, Some(6.13));
        assert_eq!(inputs.cash_flow[1].diluted_net_eps, None);
        assert!(inputs.equity.is_empty());
        assert_eq!(inputs.eps_history.len(), 2);
        assert_eq!(
            inputs.eps_history[0].date,
            NaiveDate::from_ymd_opt(2023, 12, 30)
        );
        assert_eq!(inputs.eps_history[1].date, None);
    }

    #[test]
    fn test_symbol_rows_latest_first() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            dir.path(),
            "income_statement.csv",
            "act_symbol,date,period,sales\n\
             AAPL,2022-09-24,Year,394328\n\
             MSFT,2023-06-30,Year,211915\n\
             AAPL,2023-09-30,Year,383285\n",
        );
        let config = FundamentalsConfig::new(dir.path(), DEFAULT_FILE_MAPPING, "Year");
        let rows = RawTable::load(&config, Dataset::IncomeStatement).symbol_rows("AAPL");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["date"], Value::String("2023-09-30".into()));
        assert_eq!(rows[0]["sales"].as_f64(), Some(383285.0));
        assert_eq!(rows[0]["symbol"], Value::String("AAPL".into()));
    }

    #[test]
    fn test_symbol_list_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(VALID_SYMBOLS_FILE);
        assert!(matches!(
            read_symbol_list(&path),
            Err(FundamentalsError::SymbolListMissing(_))
        ));

        std::fs::write(&path, "AAPL\n\n  MSFT \n").unwrap();
        assert_eq!(read_symbol_list(&path).unwrap(), vec!["AAPL", "MSFT"]);
    }
}
