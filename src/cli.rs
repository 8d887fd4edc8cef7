use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pivot")]
#[command(author = "Pivot Team")]
#[command(version = "0.1.0")]
#[command(about = "Limit-up ETF substitution signal engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory path
    #[arg(short, long, default_value = "config")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan the watch-list for signals
    Scan {
        /// Keep scanning on an interval instead of one pass
        #[arg(long)]
        watch: bool,
        /// Seconds between passes in watch mode
        #[arg(long, default_value = "30")]
        interval: u64,
    },
    /// Run a backtest in the foreground and print the statistics
    Backtest {
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: String,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: String,
        /// Tick granularity: daily, 5m, 15m, 30m
        #[arg(long)]
        granularity: Option<String>,
        /// Minimum holding weight for eligibility
        #[arg(long)]
        min_weight: Option<String>,
        /// Evaluator preset: standard, conservative, aggressive
        #[arg(long)]
        evaluator: Option<String>,
        /// Holdings interpolation: linear, step
        #[arg(long)]
        interpolation: Option<String>,
        /// Seed for the synthetic history used when no history_dir is
        /// configured
        #[arg(long, default_value = "42")]
        seed: u64,
    },
    /// Start the HTTP API
    Serve {
        /// Port override
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Show or rebuild the persisted security -> instrument mapping
    Mapping {
        /// Re-run discovery against the holdings provider
        #[arg(long)]
        rebuild: bool,
    },
}
