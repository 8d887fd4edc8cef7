//! External market-data boundaries.
//!
//! The engine never talks to a vendor API directly; it sees three traits:
//! a quote source, a holdings provider, and a historical data source for
//! backtests. The implementations here are in-memory table-backed variants
//! used by tests, demos, and the backtest loader.

pub mod history;
pub mod holdings;
pub mod quotes;

pub use history::{HistoricalDataSource, HistoryFrame, InMemoryHistory};
pub use holdings::{
    HoldingRow, HoldingsMapping, HoldingsProvider, HoldingsSnapshot, StaticHoldingsProvider,
    TopHoldings,
};
pub use quotes::{QuoteSource, StaticQuoteSource};
