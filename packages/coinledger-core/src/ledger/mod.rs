//! Position lifecycle engine.
//!
//! Positions are opened against the wallet balance, priced by a [`PriceFeed`](crate::market::PriceFeed),
//! and closed manually or by stop-loss/take-profit into immutable settlements.

mod engine;
mod events;
mod position;
mod settlement;
mod state;

pub use engine::{CloseOutcome, CycleReport, ExitRecord, FeedFailure, FundsTransfer, Ledger};
pub use events::{EventSink, LedgerEvent, MemorySink, ThresholdSide, TracingSink};
pub use position::{ExitPlan, ExitThreshold, Position};
pub use settlement::{CloseReason, Settlement};
pub use state::{LedgerState, WalletSummary};
