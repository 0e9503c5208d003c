//! Open positions and their exit thresholds.

use super::settlement::CloseReason;
use crate::types::{Coin, PositionId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One side of a position's automated exit: a price level and an on/off flag.
///
/// A disabled threshold keeps its stored price but never fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitThreshold {
    /// Trigger price
    pub price: Decimal,
    /// Whether this side participates in exit evaluation
    pub enabled: bool,
}

impl ExitThreshold {
    /// An enabled threshold at `price`.
    pub fn at(price: Decimal) -> Self {
        Self {
            price,
            enabled: true,
        }
    }

    /// The trigger price, if this side is enabled.
    pub fn active_price(&self) -> Option<Decimal> {
        self.enabled.then_some(self.price)
    }
}

/// Exit thresholds to attach when opening a position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitPlan {
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

impl ExitPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop_loss(mut self, price: Decimal) -> Self {
        self.stop_loss = Some(price);
        self
    }

    pub fn take_profit(mut self, price: Decimal) -> Self {
        self.take_profit = Some(price);
        self
    }
}

/// An open holding of a coin at a fixed entry price.
///
/// Positions are created and removed only by the [`Ledger`](super::Ledger);
/// outside the ledger they are read-only. Volume is always greater than zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    id: PositionId,
    symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    volume: Decimal,
    entry_price: Decimal,
    current_price: Decimal,
    #[serde(default)]
    stop_loss: ExitThreshold,
    #[serde(default)]
    take_profit: ExitThreshold,
    opened_at: DateTime<Utc>,
    /// Position this one continues after a partial close
    #[serde(default, skip_serializing_if = "Option::is_none")]
    continues: Option<PositionId>,
}

impl Position {
    /// Open a position at the coin's last price.
    pub(crate) fn open(id: PositionId, coin: &Coin, volume: Decimal, plan: ExitPlan) -> Self {
        Self {
            id,
            symbol: coin.symbol.clone(),
            name: coin.name.clone(),
            volume,
            entry_price: coin.last_price,
            current_price: coin.last_price,
            stop_loss: plan.stop_loss.map(ExitThreshold::at).unwrap_or_default(),
            take_profit: plan.take_profit.map(ExitThreshold::at).unwrap_or_default(),
            opened_at: Utc::now(),
            continues: None,
        }
    }

    /// The residual left open after part of this position is closed.
    ///
    /// Keeps coin, entry price, current price, thresholds and open time; gets
    /// a fresh identity and the remaining volume.
    pub(crate) fn continuation(&self, id: PositionId, volume: Decimal) -> Self {
        Self {
            id,
            volume,
            continues: Some(self.id),
            ..self.clone()
        }
    }

    pub fn id(&self) -> PositionId {
        self.id
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn volume(&self) -> Decimal {
        self.volume
    }

    pub fn entry_price(&self) -> Decimal {
        self.entry_price
    }

    pub fn current_price(&self) -> Decimal {
        self.current_price
    }

    pub fn stop_loss(&self) -> ExitThreshold {
        self.stop_loss
    }

    pub fn take_profit(&self) -> ExitThreshold {
        self.take_profit
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Identity of the position this residual was split from, if any.
    pub fn continues_from(&self) -> Option<PositionId> {
        self.continues
    }

    /// Entry cost: volume times entry price. No fees are modeled.
    pub fn cost(&self) -> Decimal {
        self.volume.saturating_mul(self.entry_price)
    }

    /// Value at the current price.
    pub fn market_value(&self) -> Decimal {
        self.volume.saturating_mul(self.current_price)
    }

    /// Profit implied by the current price.
    pub fn unrealized_profit(&self) -> Decimal {
        self.current_price
            .saturating_sub(self.entry_price)
            .saturating_mul(self.volume)
    }

    /// Replace the current price. Entry price, volume and thresholds are untouched.
    pub(crate) fn refresh(&mut self, latest_price: Decimal) {
        self.current_price = latest_price;
    }

    pub(crate) fn set_stop_loss(&mut self, threshold: ExitThreshold) {
        self.stop_loss = threshold;
    }

    pub(crate) fn set_take_profit(&mut self, threshold: ExitThreshold) {
        self.take_profit = threshold;
    }

    /// Stop-loss fires at or below its price.
    pub fn stop_loss_triggered(&self) -> bool {
        self.stop_loss
            .active_price()
            .is_some_and(|level| self.current_price <= level)
    }

    /// Take-profit fires at or above its price.
    pub fn take_profit_triggered(&self) -> bool {
        self.take_profit
            .active_price()
            .is_some_and(|level| self.current_price >= level)
    }

    /// Which automated exit, if any, the current price triggers.
    ///
    /// Stop-loss is checked first.
    pub fn exit_trigger(&self) -> Option<CloseReason> {
        if self.stop_loss_triggered() {
            Some(CloseReason::StopLoss)
        } else if self.take_profit_triggered() {
            Some(CloseReason::TakeProfit)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    fn position(volume: &str, entry: &str) -> Position {
        let coin = Coin::new("BTCUSDT", d(entry)).with_name("Bitcoin");
        Position::open(PositionId(1), &coin, d(volume), ExitPlan::new())
    }

    #[test]
    fn test_open_uses_last_price() {
        let pos = position("10", "50");
        assert_eq!(pos.symbol(), "BTCUSDT");
        assert_eq!(pos.name(), Some("Bitcoin"));
        assert_eq!(pos.entry_price(), d("50"));
        assert_eq!(pos.current_price(), d("50"));
        assert!(!pos.stop_loss().enabled);
        assert!(!pos.take_profit().enabled);
        assert!(pos.continues_from().is_none());
    }

    #[test]
    fn test_cost_and_profit() {
        let mut pos = position("10", "50");
        assert_eq!(pos.cost(), d("500"));
        assert_eq!(pos.unrealized_profit(), Decimal::ZERO);

        pos.refresh(d("60"));
        assert_eq!(pos.unrealized_profit(), d("100"));
        assert_eq!(pos.market_value(), d("600"));
        // cost is fixed at entry
        assert_eq!(pos.cost(), d("500"));
    }

    #[test]
    fn test_figures_saturate_instead_of_overflowing() {
        let mut pos = position("100000000000000000000", "1");
        pos.refresh(d("10000000000"));

        assert_eq!(pos.unrealized_profit(), Decimal::MAX);
        assert_eq!(pos.market_value(), Decimal::MAX);

        pos.refresh(d("0.000001"));
        assert!(pos.unrealized_profit() < Decimal::ZERO);
    }

    #[test]
    fn test_refresh_only_touches_price() {
        let coin = Coin::new("ETHUSDT", d("2000"));
        let plan = ExitPlan::new().stop_loss(d("1800")).take_profit(d("2500"));
        let mut pos = Position::open(PositionId(3), &coin, d("0.5"), plan);

        pos.refresh(d("2100.25"));

        assert_eq!(pos.current_price(), d("2100.25"));
        assert_eq!(pos.entry_price(), d("2000"));
        assert_eq!(pos.volume(), d("0.5"));
        assert_eq!(pos.stop_loss(), ExitThreshold::at(d("1800")));
        assert_eq!(pos.take_profit(), ExitThreshold::at(d("2500")));
    }

    #[test]
    fn test_stop_loss_boundary() {
        let mut pos = position("10", "50");
        pos.set_stop_loss(ExitThreshold::at(d("45")));

        pos.refresh(d("45.0001"));
        assert!(!pos.stop_loss_triggered());

        pos.refresh(d("45"));
        assert!(pos.stop_loss_triggered());

        pos.refresh(d("44"));
        assert_eq!(pos.exit_trigger(), Some(CloseReason::StopLoss));
    }

    #[test]
    fn test_take_profit_boundary() {
        let mut pos = position("10", "50");
        pos.set_take_profit(ExitThreshold::at(d("60")));

        pos.refresh(d("59.99"));
        assert!(!pos.take_profit_triggered());

        pos.refresh(d("60"));
        assert_eq!(pos.exit_trigger(), Some(CloseReason::TakeProfit));
    }

    #[test]
    fn test_disabled_threshold_never_fires() {
        let mut pos = position("10", "50");
        pos.set_stop_loss(ExitThreshold {
            price: d("45"),
            enabled: false,
        });
        pos.set_take_profit(ExitThreshold {
            price: d("55"),
            enabled: false,
        });

        pos.refresh(d("1"));
        assert!(pos.exit_trigger().is_none());
        pos.refresh(d("1000"));
        assert!(pos.exit_trigger().is_none());
    }

    #[test]
    fn test_continuation_gets_new_identity() {
        let coin = Coin::new("SOLUSDT", d("20"));
        let plan = ExitPlan::new().stop_loss(d("18"));
        let original = Position::open(PositionId(4), &coin, d("10"), plan);

        let residual = original.continuation(PositionId(9), d("6"));

        assert_eq!(residual.id(), PositionId(9));
        assert_eq!(residual.volume(), d("6"));
        assert_eq!(residual.entry_price(), original.entry_price());
        assert_eq!(residual.stop_loss(), original.stop_loss());
        assert_eq!(residual.take_profit(), original.take_profit());
        assert_eq!(residual.continues_from(), Some(PositionId(4)));
    }
}
