//! Coinledger Core - Paper-trading ledger library.
//!
//! This crate tracks simulated cryptocurrency positions against market prices:
//!
//! - **Positions**: open holdings with optional stop-loss/take-profit exits
//! - **Settlements**: immutable records of full or partial closes
//! - **Ledger**: deposits, withdrawals, balance and profit/loss figures,
//!   and the refresh cycle that prices positions and fires automated exits
//! - **Market data**: price feed trait and a file-backed ticker snapshot
//! - **Persistence**: JSON wallet records keyed by wallet id
//!
//! # Example
//!
//! ```rust,no_run
//! use coinledger_core::market::MarketSnapshot;
//! use coinledger_core::store::LedgerStore;
//! use coinledger_core::Ledger;
//! use rust_decimal::Decimal;
//!
//! let store = LedgerStore::new();
//! let market = MarketSnapshot::load(&MarketSnapshot::default_path(store.root())).unwrap();
//! let state = store.load("default").unwrap();
//!
//! let mut ledger = Ledger::new(state, &market);
//! ledger.deposit(Decimal::from(1000));
//!
//! let coin = market.resolve("BTC").unwrap().clone();
//! let id = ledger.open(&coin, Decimal::new(1, 2)).unwrap();
//! println!("Opened position {id}, balance {}", ledger.summary().wallet_balance);
//!
//! let mut state = ledger.into_state();
//! store.save(&mut state).unwrap();
//! ```

pub mod ledger;
pub mod market;
pub mod store;
pub mod types;

use rust_decimal::Decimal;

// Re-export commonly used types
pub use types::{ApiResponse, Coin, PositionId};

// Re-export main functionality
pub use ledger::{
    CloseOutcome, CloseReason, CycleReport, EventSink, ExitPlan, ExitThreshold, FundsTransfer,
    Ledger, LedgerEvent, LedgerState, MemorySink, Position, Settlement, TracingSink,
    WalletSummary,
};
pub use market::{MarketSnapshot, PriceFeed, PriceQuote, StaticPriceFeed};
pub use store::LedgerStore;

/// Error types for coinledger-core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Insufficient funds: cost {cost} is not below available balance {balance}")]
    InsufficientFunds { cost: Decimal, balance: Decimal },

    #[error("Invalid volume: {0} (must be greater than zero)")]
    InvalidVolume(Decimal),

    #[error("Invalid price: {0} (must be greater than zero)")]
    InvalidPrice(Decimal),

    #[error("Price feed unavailable for {symbol}: {reason}")]
    PriceFeedUnavailable { symbol: String, reason: String },

    #[error("Position not found: {0}")]
    PositionNotFound(PositionId),

    #[error("Coin not found: {0}")]
    CoinNotFound(String),

    #[error("Invalid wallet id: {0:?}")]
    InvalidWalletId(String),
}

/// Result type for coinledger-core operations.
pub type Result<T> = std::result::Result<T, Error>;
