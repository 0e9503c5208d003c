//! Structured ledger events and the sinks that receive them.

use super::settlement::CloseReason;
use crate::types::PositionId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which automated exit a threshold change applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdSide {
    StopLoss,
    TakeProfit,
}

/// Something the ledger did, or declined to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    Deposited {
        amount: Decimal,
        payment_calc: Decimal,
    },
    DepositIgnored {
        amount: Decimal,
    },
    DepositRefused {
        amount: Decimal,
        payment_calc: Decimal,
    },
    Withdrawn {
        amount: Decimal,
        payment_calc: Decimal,
    },
    WithdrawalRefused {
        amount: Decimal,
        balance: Decimal,
    },
    Opened {
        id: PositionId,
        symbol: String,
        volume: Decimal,
        entry_price: Decimal,
        cost: Decimal,
    },
    OpenRejected {
        symbol: String,
        cost: Decimal,
        balance: Decimal,
    },
    Closed {
        id: PositionId,
        symbol: String,
        volume: Decimal,
        price: Decimal,
        profit: Decimal,
        reason: CloseReason,
    },
    ResidualOpened {
        id: PositionId,
        from: PositionId,
        volume: Decimal,
    },
    CloseRejected {
        id: PositionId,
        volume: Decimal,
    },
    ThresholdChanged {
        id: PositionId,
        side: ThresholdSide,
        price: Option<Decimal>,
    },
    PriceRefreshed {
        id: PositionId,
        symbol: String,
        price: Decimal,
    },
    FeedFailed {
        id: PositionId,
        symbol: String,
        reason: String,
    },
    ExitTriggered {
        id: PositionId,
        reason: CloseReason,
        price: Decimal,
    },
    Recomputed {
        wallet_balance: Decimal,
        wallet_sum: Decimal,
    },
}

/// Receiver for ledger events.
pub trait EventSink {
    fn record(&mut self, event: LedgerEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&mut self, event: LedgerEvent) {
        match event {
            LedgerEvent::Deposited {
                amount,
                payment_calc,
            } => tracing::info!(%amount, %payment_calc, "Funds deposited"),
            LedgerEvent::DepositIgnored { amount } => {
                tracing::debug!(%amount, "Ignored non-positive deposit")
            }
            LedgerEvent::DepositRefused {
                amount,
                payment_calc,
            } => tracing::warn!(%amount, %payment_calc, "Deposit refused, total would overflow"),
            LedgerEvent::Withdrawn {
                amount,
                payment_calc,
            } => tracing::info!(%amount, %payment_calc, "Funds withdrawn"),
            LedgerEvent::WithdrawalRefused { amount, balance } => {
                tracing::warn!(%amount, %balance, "Withdrawal refused")
            }
            LedgerEvent::Opened {
                id,
                symbol,
                volume,
                entry_price,
                cost,
            } => tracing::info!(
                position = %id,
                %symbol,
                %volume,
                %entry_price,
                %cost,
                "Position opened"
            ),
            LedgerEvent::OpenRejected {
                symbol,
                cost,
                balance,
            } => tracing::warn!(%symbol, %cost, %balance, "Open rejected: insufficient funds"),
            LedgerEvent::Closed {
                id,
                symbol,
                volume,
                price,
                profit,
                reason,
            } => tracing::info!(
                position = %id,
                %symbol,
                %volume,
                %price,
                %profit,
                %reason,
                "Position closed"
            ),
            LedgerEvent::ResidualOpened { id, from, volume } => {
                tracing::info!(position = %id, %from, %volume, "Residual position opened")
            }
            LedgerEvent::CloseRejected { id, volume } => {
                tracing::warn!(position = %id, %volume, "Close rejected: volume must be positive")
            }
            LedgerEvent::ThresholdChanged { id, side, price } => {
                tracing::info!(position = %id, ?side, ?price, "Exit threshold changed")
            }
            LedgerEvent::PriceRefreshed { id, symbol, price } => {
                tracing::trace!(position = %id, %symbol, %price, "Price refreshed")
            }
            LedgerEvent::FeedFailed { id, symbol, reason } => {
                tracing::warn!(position = %id, %symbol, %reason, "Price refresh failed")
            }
            LedgerEvent::ExitTriggered { id, reason, price } => {
                tracing::info!(position = %id, %reason, %price, "Exit triggered")
            }
            LedgerEvent::Recomputed {
                wallet_balance,
                wallet_sum,
            } => tracing::trace!(%wallet_balance, %wallet_sum, "Wallet figures recomputed"),
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Vec<LedgerEvent>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Drain everything recorded so far.
    pub fn take(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }
}

impl EventSink for MemorySink {
    fn record(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }
}
