//! CLI definition and dispatch.
//!
//! Records are written to stdout as pretty JSON; progress and warnings go to
//! stderr through `tracing`.

use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::adapters::csv_adapter::{CsvQuoteAdapter, read_journal};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::memory_store::MemoryStore;
use crate::adapters::static_quotes::StaticQuotes;
use crate::domain::broker::Broker;
use crate::domain::config_validation::{load_settings, validate_config};
use crate::domain::error::FolioError;
use crate::domain::hypothesis::Judgement;
use crate::domain::order::OrderRequest;
use crate::domain::position::PositionView;
use crate::ports::config_port::ConfigPort;
use crate::ports::quote_port::QuotePort;
use crate::ports::store_port::StorePort;

#[derive(Parser, Debug)]
#[command(name = "folio", about = "Simulated trading journal and portfolio analyzer")]
pub struct Cli {
    /// INI configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    /// CSV quote file (symbol,price), overrides [quotes] path
    #[arg(short, long, global = true)]
    pub quotes: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Place an order
    Order {
        symbol: String,
        /// BUY or SELL
        side: String,
        quantity: f64,
        /// MARKET or LIMIT
        #[arg(short = 't', long = "type", default_value = "MARKET")]
        order_type: String,
        #[arg(short, long)]
        limit: Option<f64>,
        /// DAY or GTC
        #[arg(long)]
        tif: Option<String>,
    },
    /// Cancel a pending order
    Cancel { id: String },
    /// Re-evaluate pending limit orders against current quotes
    Pending,
    /// Show open positions
    Positions,
    /// List every recorded trade
    Trades,
    /// Realized P&L statistics and suggestions
    Analyze,
    /// Test a free-text hypothesis against the trade history
    Check { text: String },
    /// Manage tracked hypotheses
    Hypothesis {
        #[command(subcommand)]
        command: HypothesisCommand,
    },
    /// Re-mark positions and rewrite the stored positions
    Sync,
    /// Import a CSV trade journal (symbol,side,quantity,price,filled_at)
    Import { path: PathBuf },
    /// Validate the configuration file
    Validate,
}

#[derive(Subcommand, Debug)]
pub enum HypothesisCommand {
    /// Start tracking a hypothesis
    Add {
        text: String,
        #[arg(short, long)]
        symbol: Option<String>,
    },
    /// List tracked hypotheses
    List,
    /// Record whether a hypothesis held up (valid or invalid)
    Record {
        id: String,
        result: String,
        #[arg(short, long, default_value = "")]
        notes: String,
    },
    /// Stop tracking a hypothesis
    Archive { id: String },
}

pub fn run(cli: Cli) -> ExitCode {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match execute(cli, &mut out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            debug!("{e:?}");
            eprintln!("error: {}", e.user_message());
            (&e).into()
        }
    }
}

/// Run one command, writing its JSON output to `out`.
pub fn execute(cli: Cli, out: &mut dyn Write) -> Result<(), FolioError> {
    let config = load_config(cli.config.as_deref())?;

    if let Command::Validate = cli.command {
        validate_config(&config)?;
        return print_json(out, &serde_json::json!({ "valid": true }));
    }

    let broker = build_broker(&config, cli.quotes.as_deref())?;

    match cli.command {
        Command::Order {
            symbol,
            side,
            quantity,
            order_type,
            limit,
            tif,
        } => {
            let request = OrderRequest {
                symbol,
                side,
                quantity: Some(quantity),
                order_type,
                limit_price: limit,
                time_in_force: tif,
            };
            print_json(out, &broker.place_order(&request)?)
        }
        Command::Cancel { id } => print_json(out, &broker.cancel_order(&id)?),
        Command::Pending => print_json(out, &broker.process_pending()?),
        Command::Positions => {
            let views: Vec<PositionView> =
                broker.open_positions().iter().map(|p| p.view()).collect();
            print_json(out, &views)
        }
        Command::Trades => print_json(out, &broker.trades()?),
        Command::Analyze => print_json(out, &broker.analyze()?),
        Command::Check { text } => print_json(out, &broker.check_hypothesis(&text)?),
        Command::Hypothesis { command } => run_hypothesis(&broker, command, out),
        Command::Sync => print_json(out, &broker.sync_positions()),
        Command::Import { path } => {
            let trades = read_journal(&path)?;
            info!("Read {} trades from {}", trades.len(), path.display());
            print_json(out, &broker.import_trades(trades)?)
        }
        Command::Validate => Ok(()),
    }
}

fn run_hypothesis(
    broker: &Broker,
    command: HypothesisCommand,
    out: &mut dyn Write,
) -> Result<(), FolioError> {
    match command {
        HypothesisCommand::Add { text, symbol } => {
            print_json(out, &broker.add_hypothesis(&text, symbol.as_deref())?)
        }
        HypothesisCommand::List => print_json(out, &broker.hypotheses()?),
        HypothesisCommand::Record { id, result, notes } => {
            let judgement = parse_judgement(&result)?;
            print_json(
                out,
                &broker.record_validation(&id, judgement, &notes, Utc::now())?,
            )
        }
        HypothesisCommand::Archive { id } => print_json(out, &broker.archive_hypothesis(&id)?),
    }
}

pub fn parse_judgement(value: &str) -> Result<Judgement, FolioError> {
    Judgement::parse(value).ok_or_else(|| FolioError::ConfigInvalid {
        section: "hypothesis".to_string(),
        key: "result".to_string(),
        reason: format!("expected valid or invalid, got '{value}'"),
    })
}

/// No path means an empty configuration: every setting takes its default.
pub fn load_config(path: Option<&Path>) -> Result<FileConfigAdapter, FolioError> {
    match path {
        Some(path) => {
            info!("Loading config from {}", path.display());
            FileConfigAdapter::from_file(path)
        }
        None => Ok(FileConfigAdapter::empty()),
    }
}

pub fn build_broker(
    config: &dyn ConfigPort,
    quotes_override: Option<&Path>,
) -> Result<Broker, FolioError> {
    let settings = load_settings(config)?;
    let store = open_store(config)?;
    let quotes = open_quotes(config, quotes_override)?;
    Broker::new(quotes, store, settings)
}

/// SQLite when `[sqlite] path` is set, otherwise a journal that lives only as
/// long as the process.
pub fn open_store(config: &dyn ConfigPort) -> Result<Arc<dyn StorePort>, FolioError> {
    if config.get_string("sqlite", "path").is_some() {
        #[cfg(feature = "sqlite")]
        {
            use crate::adapters::sqlite_adapter::SqliteStore;

            let store = SqliteStore::from_config(config)?;
            store.initialize_schema()?;
            return Ok(Arc::new(store));
        }

        #[cfg(not(feature = "sqlite"))]
        warn!("[sqlite] path is set but folio was built without the sqlite feature");
    }

    warn!("No trade journal configured; nothing will be kept after this run");
    Ok(Arc::new(MemoryStore::new()))
}

/// Quotes from the override path, then `[quotes] path`. With neither, every
/// quote is unavailable.
pub fn open_quotes(
    config: &dyn ConfigPort,
    quotes_override: Option<&Path>,
) -> Result<Arc<dyn QuotePort>, FolioError> {
    let path = quotes_override
        .map(Path::to_path_buf)
        .or_else(|| config.get_string("quotes", "path").map(PathBuf::from));

    match path {
        Some(path) => {
            let adapter = CsvQuoteAdapter::from_file(&path)?;
            info!("Loaded {} quotes from {}", adapter.len(), path.display());
            Ok(Arc::new(adapter))
        }
        None => {
            warn!("No quote source configured; live prices are unavailable");
            Ok(Arc::new(StaticQuotes::new()))
        }
    }
}

fn print_json<T: Serialize + ?Sized>(out: &mut dyn Write, value: &T) -> Result<(), FolioError> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    writeln!(out, "{json}")?;
    Ok(())
}
