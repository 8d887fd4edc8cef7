//! Core domain types shared by the live scanner and the backtest engine.

pub mod event;
pub mod instrument;
pub mod quote;
pub mod session;
pub mod signal;

pub use event::{EventKind, MarketEvent};
pub use instrument::CandidateInstrument;
pub use quote::Quote;
pub use session::{exchange_local, is_trading_time, seconds_to_close_at};
pub use signal::{Confidence, RiskLevel, TradingSignal};
