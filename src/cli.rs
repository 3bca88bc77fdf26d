//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{self as backtest_engine, BacktestConfig, BacktestReport};
use crate::domain::config_validation::{
    parse_start_date, validate_data_config, validate_strategy_config, DataSource,
};
use crate::domain::error::RsitraderError;
use crate::domain::signal::Side;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;

const DEFAULT_PREVIEW_BARS: i64 = 5;

#[derive(Parser, Debug)]
#[command(name = "rsitrader", about = "RSI price-target backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Price source, overriding [data] source (csv, sqlite, postgres)
        #[arg(long)]
        source: Option<String>,
        /// Number of newest enriched bars to print
        #[arg(short, long)]
        preview: Option<usize>,
        /// Validate config and fetch data without running the strategy
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            config,
            source,
            preview,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config, source.as_deref())
            } else {
                run_backtest(&config, source.as_deref(), preview)
            }
        }
        Command::Validate { config } => run_validate(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, RsitraderError> {
    tracing::info!(path = %path.display(), "loading config");
    FileConfigAdapter::from_file(path)
}

/// Validate the strategy keys and build the run configuration from them.
/// `buy_size` defaults to twice `sell_size`.
pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, RsitraderError> {
    validate_strategy_config(adapter)?;

    let defaults = BacktestConfig::default();
    let sell_size = adapter.get_double("strategy", "sell_size", defaults.sell_size);

    Ok(BacktestConfig {
        window_size: adapter.get_int("strategy", "window_size", defaults.window_size as i64)
            as usize,
        sell_rsi: adapter.get_double("strategy", "sell_rsi", defaults.sell_rsi),
        buy_rsi: adapter.get_double("strategy", "buy_rsi", defaults.buy_rsi),
        rsi_rebuy_threshold: adapter.get_double(
            "strategy",
            "rsi_rebuy_threshold",
            defaults.rsi_rebuy_threshold,
        ),
        rsi_resell_threshold: adapter.get_double(
            "strategy",
            "rsi_resell_threshold",
            defaults.rsi_resell_threshold,
        ),
        sell_size,
        buy_size: adapter.get_double("strategy", "buy_size", 2.0 * sell_size),
        starting_cash: adapter.get_double("backtest", "starting_cash", defaults.starting_cash),
    })
}

/// Construct the adapter for `source`. Sources whose feature was not compiled
/// in are rejected as a config error.
pub fn build_data_port(
    source: DataSource,
    adapter: &dyn ConfigPort,
) -> Result<Box<dyn DataPort>, RsitraderError> {
    tracing::info!(%source, "opening price source");
    match source {
        DataSource::Csv => Ok(Box::new(CsvAdapter::from_config(adapter)?)),
        #[cfg(feature = "sqlite")]
        DataSource::Sqlite => Ok(Box::new(
            crate::adapters::sqlite_adapter::SqliteAdapter::from_config(adapter)?,
        )),
        #[cfg(feature = "postgres")]
        DataSource::Postgres => Ok(Box::new(
            crate::adapters::postgres_adapter::PostgresAdapter::from_config(adapter)?,
        )),
        #[allow(unreachable_patterns)]
        other => Err(RsitraderError::config_invalid(
            "data",
            "source",
            format!("rsitrader was built without the {other} feature"),
        )),
    }
}

/// `--preview` when given, else `[backtest] preview_bars`.
pub fn resolve_preview(preview_override: Option<usize>, adapter: &dyn ConfigPort) -> usize {
    preview_override.unwrap_or_else(|| {
        adapter
            .get_int("backtest", "preview_bars", DEFAULT_PREVIEW_BARS)
            .max(0) as usize
    })
}

fn run_backtest(
    config_path: &Path,
    source_override: Option<&str>,
    preview_override: Option<usize>,
) -> Result<(), RsitraderError> {
    // Stage 1: Load and validate config
    let adapter = load_config(config_path)?;
    let bt_config = build_backtest_config(&adapter)?;
    let source = validate_data_config(&adapter, source_override)?;
    let start_date = parse_start_date(&adapter)?;
    let preview = resolve_preview(preview_override, &adapter);

    // Stage 2: Open the price source
    let data_port = build_data_port(source, &adapter)?;

    // Stage 3: Run and report
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_backtest_pipeline(data_port.as_ref(), start_date, &bt_config, preview, &mut out)?;
    Ok(())
}

/// Run the backtest against `data_port` and write the summary to `out`.
pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    start_date: Option<NaiveDate>,
    bt_config: &BacktestConfig,
    preview: usize,
    out: &mut dyn Write,
) -> Result<BacktestReport, RsitraderError> {
    tracing::info!(
        window_size = bt_config.window_size,
        start_date = ?start_date,
        "running backtest"
    );
    let report = backtest_engine::run_backtest(data_port, start_date, bt_config)?;
    tracing::info!(
        enriched = report.window_size(),
        transactions = report.transactions.len(),
        "backtest complete"
    );

    write_summary(out, &report, preview)?;
    Ok(report)
}

pub fn write_summary(
    out: &mut dyn Write,
    report: &BacktestReport,
    preview: usize,
) -> io::Result<()> {
    writeln!(out, "Window size:      {} days", report.window_size())?;

    let bars = report.preview(preview);
    if !bars.is_empty() {
        writeln!(out, "\n=== Newest {} Bars ===", bars.len())?;
        writeln!(
            out,
            "{:<12} {:>12} {:>12} {:>12} {:>7} {:>7} {:>7} {:>12} {:>12}",
            "date", "close", "low", "high", "rsi", "low", "high", "buy", "sell"
        )?;
        for e in bars {
            writeln!(
                out,
                "{:<12} {:>12.4} {:>12.4} {:>12.4} {:>7.2} {:>7.2} {:>7.2} {:>12.2} {:>12.2}",
                e.bar.timestamp.format("%Y-%m-%d"),
                e.bar.close,
                e.bar.low,
                e.bar.high,
                e.rsi,
                e.low_rsi,
                e.high_rsi,
                e.buy_target,
                e.sell_target
            )?;
        }
    }

    if let Some((buy, sell)) = report.latest_targets() {
        writeln!(out, "\n=== Next Targets ===")?;
        writeln!(out, "Buy target:       {buy:.2}")?;
        writeln!(out, "Sell target:      {sell:.2}")?;
    }

    let p = &report.portfolio;
    writeln!(out, "\n=== Portfolio ===")?;
    writeln!(out, "Starting cash:    {:.2}", p.starting_cash)?;
    writeln!(out, "Cash:             {:.2}", p.cash)?;
    writeln!(out, "Min cash:         {:.2}", p.min_cash)?;
    writeln!(out, "Position:         {:.6}", p.position)?;
    writeln!(out, "Position value:   {:.2}", p.position_value)?;
    writeln!(out, "Mean price:       {:.4}", p.mean_price)?;
    writeln!(out, "Market price:     {:.4}", p.market_price)?;
    writeln!(out, "Realized P&L:     {:.2}", p.realized_pnl)?;
    writeln!(out, "Mark to market:   {:.2}", p.mtm)?;
    writeln!(out, "Total P&L:        {:.2}", p.pnl)?;
    writeln!(out, "Equity:           {:.2}", p.equity())?;
    writeln!(out, "Return on capital: {:.2}%", p.return_on_capital)?;

    writeln!(
        out,
        "\nTransactions:     {} ({} buys, {} sells, {} outside bar range)",
        report.transactions.len(),
        report.count(Side::Buy),
        report.count(Side::Sell),
        report.out_of_range_count()
    )?;
    Ok(())
}

pub fn run_dry_run(config_path: &Path, source_override: Option<&str>) -> Result<(), RsitraderError> {
    let adapter = load_config(config_path)?;
    let bt_config = build_backtest_config(&adapter)?;
    let source = validate_data_config(&adapter, source_override)?;
    let start_date = parse_start_date(&adapter)?;
    eprintln!("Config validated successfully");

    let data_port = build_data_port(source, &adapter)?;
    let mut bars = data_port.fetch_bars(start_date)?;
    bars.sort_by_key(|b| b.timestamp);

    eprintln!("\nPrice source: {source}");
    eprintln!("  bars fetched: {}", bars.len());
    if let (Some(first), Some(last)) = (bars.first(), bars.last()) {
        eprintln!(
            "  range:        {} to {}",
            first.timestamp.format("%Y-%m-%d"),
            last.timestamp.format("%Y-%m-%d")
        );
    }
    if bars.len() < bt_config.window_size {
        tracing::warn!(
            bars = bars.len(),
            window_size = bt_config.window_size,
            "not enough bars for a single window"
        );
    }

    eprintln!("\nDry run complete: configuration is valid");
    Ok(())
}

pub fn run_validate(config_path: &Path) -> Result<(), RsitraderError> {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = load_config(config_path)?;
    let bt_config = build_backtest_config(&adapter)?;
    let source = validate_data_config(&adapter, None)?;
    let start_date = parse_start_date(&adapter)?;

    eprintln!("\nStrategy:");
    eprintln!("  window_size:          {}", bt_config.window_size);
    eprintln!("  buy_rsi / sell_rsi:   {} / {}", bt_config.buy_rsi, bt_config.sell_rsi);
    eprintln!(
        "  rebuy / resell:       {} / {}",
        bt_config.rsi_rebuy_threshold, bt_config.rsi_resell_threshold
    );
    eprintln!(
        "  buy_size / sell_size: {} / {}",
        bt_config.buy_size, bt_config.sell_size
    );
    eprintln!("  starting_cash:        {}", bt_config.starting_cash);

    eprintln!("\nData:");
    eprintln!("  source:     {source}");
    match start_date {
        Some(d) => eprintln!("  start_date: {d}"),
        None => eprintln!("  start_date: (all history)"),
    }

    eprintln!("\nConfiguration is valid.");
    Ok(())
}
