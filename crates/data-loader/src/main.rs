//! data-loader: offline maintenance for the fundamentals snapshots.
//!
//! Usage:
//!   cargo run -p data-loader -- prefilter
//!   cargo run -p data-loader -- prefilter --csv-dir data/fundamentals
//!   cargo run -p data-loader -- prefilter --dry-run
//!
//! `prefilter` writes `valid_tickers_for_screener.txt` next to the CSVs with
//! every symbol the screener can value.

use fundamental_analysis::{
    prefilter_symbols, write_symbol_list, FundamentalsConfig, ValuationInputs,
};
use std::path::PathBuf;

const USAGE: &str = "usage: data-loader prefilter [--csv-dir DIR] [--dry-run]";

#[derive(Debug, PartialEq)]
enum Command {
    Prefilter {
        csv_dir: Option<PathBuf>,
        dry_run: bool,
    },
}

fn parse_args(args: &[String]) -> anyhow::Result<Command> {
    match args.first().map(String::as_str) {
        Some("prefilter") => {
            let rest = &args[1..];
            let csv_dir = match rest.iter().position(|a| a == "--csv-dir") {
                Some(i) => Some(
                    rest.get(i + 1)
                        .map(PathBuf::from)
                        .ok_or_else(|| anyhow::anyhow!("--csv-dir needs a value\n{}", USAGE))?,
                ),
                None => None,
            };
            Ok(Command::Prefilter {
                csv_dir,
                dry_run: rest.iter().any(|a| a == "--dry-run"),
            })
        }
        Some(other) => anyhow::bail!("unknown command `{}`\n{}", other, USAGE),
        None => anyhow::bail!("{}", USAGE),
    }
}

fn prefilter(
    mut config: FundamentalsConfig,
    csv_dir: Option<PathBuf>,
    dry_run: bool,
) -> anyhow::Result<usize> {
    if let Some(dir) = csv_dir {
        config.csv_dir = dir;
    }
    tracing::info!("Loading fundamentals from {}", config.csv_dir.display());

    let inputs = ValuationInputs::load(&config);
    tracing::info!(
        "Loaded {} cash-flow rows, {} equity rows, {} EPS reports",
        inputs.cash_flow.len(),
        inputs.equity.len(),
        inputs.eps_history.len()
    );

    let symbols = prefilter_symbols(&inputs);
    let path = config.valid_symbols_path();

    if dry_run {
        tracing::info!("Dry run: {} symbols would be written to {}", symbols.len(), path.display());
    } else {
        write_symbol_list(&path, &symbols)?;
        tracing::info!("Wrote {} symbols to {}", symbols.len(), path.display());
    }
    Ok(symbols.len())
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "data_loader=info,fundamental_analysis=warn".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match parse_args(&args)? {
        Command::Prefilter { csv_dir, dry_run } => {
            prefilter(FundamentalsConfig::from_env(), csv_dir, dry_run)?;
        }
    }
    Ok(())
}
