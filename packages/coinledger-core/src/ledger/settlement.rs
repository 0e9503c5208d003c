//! Settlements: immutable records of closed position volume.

use super::position::Position;
use crate::types::PositionId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Manual,
    StopLoss,
    TakeProfit,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Manual => "manual",
            Self::StopLoss => "stop_loss",
            Self::TakeProfit => "take_profit",
        };
        f.write_str(label)
    }
}

/// Record of all or part of a position being closed.
///
/// Equality and ordering consider only the originating position, the closed
/// volume and the close price, which is what the history set deduplicates on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settlement {
    position_id: PositionId,
    symbol: String,
    entry_price: Decimal,
    closed_volume: Decimal,
    close_price: Decimal,
    reason: CloseReason,
    closed_at: DateTime<Utc>,
    /// Residual position opened by a partial close
    #[serde(default, skip_serializing_if = "Option::is_none")]
    residual_id: Option<PositionId>,
}

/// Result of settling a position: the record, plus the residual to re-open.
#[derive(Debug)]
pub(crate) struct Split {
    pub settlement: Settlement,
    pub residual: Option<Position>,
}

impl Settlement {
    /// Close `volume` of `position` at its current price.
    ///
    /// `volume` must be positive. At or above the position volume the whole
    /// position is closed; below it the remainder comes back as a residual
    /// position with identity `residual_id()`. The position is consumed.
    pub(crate) fn settle(
        position: Position,
        volume: Decimal,
        reason: CloseReason,
        residual_id: impl FnOnce() -> PositionId,
    ) -> Split {
        let (closed_volume, residual) = if volume >= position.volume() {
            (position.volume(), None)
        } else {
            let remaining = position.volume() - volume;
            (volume, Some(position.continuation(residual_id(), remaining)))
        };

        let settlement = Settlement {
            position_id: position.id(),
            symbol: position.symbol().to_string(),
            entry_price: position.entry_price(),
            closed_volume,
            close_price: position.current_price(),
            reason,
            closed_at: Utc::now(),
            residual_id: residual.as_ref().map(Position::id),
        };

        Split {
            settlement,
            residual,
        }
    }

    pub fn position_id(&self) -> PositionId {
        self.position_id
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn entry_price(&self) -> Decimal {
        self.entry_price
    }

    pub fn closed_volume(&self) -> Decimal {
        self.closed_volume
    }

    pub fn close_price(&self) -> Decimal {
        self.close_price
    }

    pub fn reason(&self) -> CloseReason {
        self.reason
    }

    pub fn closed_at(&self) -> DateTime<Utc> {
        self.closed_at
    }

    pub fn residual_id(&self) -> Option<PositionId> {
        self.residual_id
    }

    pub fn is_partial(&self) -> bool {
        self.residual_id.is_some()
    }

    /// Profit locked in over the closed volume only.
    pub fn realized_profit(&self) -> Decimal {
        self.close_price
            .saturating_sub(self.entry_price)
            .saturating_mul(self.closed_volume)
    }

    /// Value received for the closed volume.
    pub fn proceeds(&self) -> Decimal {
        self.close_price.saturating_mul(self.closed_volume)
    }

    fn key(&self) -> (PositionId, Decimal, Decimal) {
        (self.position_id, self.close_price, self.closed_volume)
    }
}

impl PartialEq for Settlement {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Settlement {}

impl PartialOrd for Settlement {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Settlement {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}
