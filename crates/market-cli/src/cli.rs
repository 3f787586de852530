use analysis_orchestrator::{IndexMembership, ScanFilters};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Equity analysis and market scanning from the command line.
///
/// Results are printed to stdout as JSON; logs go to stderr.
#[derive(Debug, Parser)]
#[command(name = "market-cli", version, about)]
pub struct Cli {
    /// Pretty-print JSON output.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Indicators, fundamentals, sentiment and a final recommendation for one ticker
    Analyze { ticker: String },
    /// Current price and change
    Quote { ticker: String },
    /// Annual and quarterly income statements
    Earnings { ticker: String },
    /// Rank an index (or custom list) by opportunity score
    Scan(ScanArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IndexArg {
    Sp500,
    Nasdaq100,
    Dow30,
}

impl From<IndexArg> for IndexMembership {
    fn from(arg: IndexArg) -> Self {
        match arg {
            IndexArg::Sp500 => IndexMembership::Sp500,
            IndexArg::Nasdaq100 => IndexMembership::Nasdaq100,
            IndexArg::Dow30 => IndexMembership::Dow30,
        }
    }
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    #[arg(long, value_enum, default_value_t = IndexArg::Sp500)]
    pub index: IndexArg,

    /// Custom universe, comma-separated; overrides --index
    #[arg(long, value_delimiter = ',')]
    pub tickers: Option<Vec<String>>,

    /// Keep only 0 < PE < N [default: 25]
    #[arg(long)]
    pub max_pe: Option<f64>,

    /// Keep only 0 < PEG < N [default: 1]
    #[arg(long)]
    pub max_peg: Option<f64>,

    /// Require the last close above SMA(20); pass `false` to disable [default: true]
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub above_sma20: Option<bool>,

    #[arg(long, default_value_t = 10)]
    pub limit: usize,

    /// Also write the ranked records to this CSV file
    #[arg(long)]
    pub csv: Option<PathBuf>,
}

impl ScanArgs {
    pub fn filters(&self) -> ScanFilters {
        let defaults = ScanFilters::default();
        ScanFilters {
            index: self.index.into(),
            tickers: self.tickers.clone(),
            max_pe: self.max_pe.or(defaults.max_pe),
            max_peg: self.max_peg.or(defaults.max_peg),
            above_sma20: self.above_sma20.unwrap_or(defaults.above_sma20),
            limit: self.limit,
            ..defaults
        }
    }
}
