//! The ledger: funds, position lifecycle and the refresh cycle.

use super::events::{EventSink, LedgerEvent, ThresholdSide, TracingSink};
use super::position::{ExitPlan, ExitThreshold, Position};
use super::settlement::{CloseReason, Settlement};
use super::state::{LedgerState, WalletSummary};
use crate::market::PriceFeed;
use crate::types::{Coin, PositionId};
use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A position whose price could not be refreshed this cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedFailure {
    pub position_id: PositionId,
    pub symbol: String,
    pub reason: String,
}

/// An automated exit fired during a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitRecord {
    pub position_id: PositionId,
    pub reason: CloseReason,
    pub price: Decimal,
    pub realized_profit: Decimal,
}

/// Outcome of one refresh cycle.
///
/// Feed failures are per position: the position keeps its last known price
/// and the rest of the cycle still runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Positions whose price was refreshed
    pub refreshed: usize,
    pub failures: Vec<FeedFailure>,
    pub exits: Vec<ExitRecord>,
}

impl CycleReport {
    /// Whether every open position got a fresh price.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of a deposit or withdrawal request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundsTransfer {
    pub amount: Decimal,
    /// False when the request was ignored
    pub applied: bool,
    /// The refresh cycle run before the transfer, if one ran
    pub cycle: CycleReport,
}

/// Outcome of a close request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseOutcome {
    pub settlement: Settlement,
    /// Continuation position left open by a partial close
    pub residual: Option<PositionId>,
}

/// Paper-trading wallet engine.
///
/// Owns the wallet state and drives it against a price feed, reporting
/// everything it does to an event sink. Every mutation ends with the wallet
/// figures recomputed, so `wallet_balance` always equals
/// `payment_calc - transactions_costs + historical_profit_loss + profit_loss`.
pub struct Ledger<F, S = TracingSink> {
    state: LedgerState,
    feed: F,
    sink: S,
}

impl<F: PriceFeed> Ledger<F, TracingSink> {
    /// Create a ledger that logs through `tracing`.
    pub fn new(state: LedgerState, feed: F) -> Self {
        Self::with_sink(state, feed, TracingSink)
    }
}

impl<F: PriceFeed, S: EventSink> Ledger<F, S> {
    /// Create a ledger reporting to a custom event sink.
    pub fn with_sink(state: LedgerState, feed: F, sink: S) -> Self {
        let mut ledger = Self { state, feed, sink };
        ledger.recompute();
        ledger
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    /// Give back the state, e.g. for persistence.
    pub fn into_state(self) -> LedgerState {
        self.state
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    pub fn feed_mut(&mut self) -> &mut F {
        &mut self.feed
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn summary(&self) -> WalletSummary {
        self.state.summary()
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.state.positions()
    }

    pub fn history(&self) -> impl Iterator<Item = &Settlement> {
        self.state.history()
    }

    /// Find an open position by identity.
    pub fn position(&self, id: PositionId) -> Option<&Position> {
        self.state.position(id)
    }

    pub fn contains(&self, id: PositionId) -> bool {
        self.state.contains(id)
    }

    /// Add funds.
    ///
    /// Non-positive amounts are ignored. Otherwise a full refresh cycle runs
    /// before the funds are added. A deposit that would overflow the running
    /// total is refused.
    pub fn deposit(&mut self, amount: Decimal) -> FundsTransfer {
        if amount <= Decimal::ZERO {
            self.sink.record(LedgerEvent::DepositIgnored { amount });
            return FundsTransfer {
                amount,
                applied: false,
                cycle: CycleReport::default(),
            };
        }

        let cycle = self.refresh_cycle();
        if !self.state.add_payment(amount) {
            self.sink.record(LedgerEvent::DepositRefused {
                amount,
                payment_calc: self.state.payment_calc(),
            });
            return FundsTransfer {
                amount,
                applied: false,
                cycle,
            };
        }
        self.sink.record(LedgerEvent::Deposited {
            amount,
            payment_calc: self.state.payment_calc(),
        });
        self.recompute();

        FundsTransfer {
            amount,
            applied: true,
            cycle,
        }
    }

    /// Take funds out.
    ///
    /// Runs a refresh cycle first, then applies only if
    /// `0 < amount <= wallet_balance`. A refused withdrawal is not an error;
    /// check `applied`.
    pub fn withdraw(&mut self, amount: Decimal) -> FundsTransfer {
        let cycle = self.refresh_cycle();
        let balance = self.state.wallet_balance();

        if amount <= Decimal::ZERO || amount > balance || !self.state.add_payment(-amount) {
            self.sink
                .record(LedgerEvent::WithdrawalRefused { amount, balance });
            return FundsTransfer {
                amount,
                applied: false,
                cycle,
            };
        }

        self.sink.record(LedgerEvent::Withdrawn {
            amount,
            payment_calc: self.state.payment_calc(),
        });
        self.recompute();

        FundsTransfer {
            amount,
            applied: true,
            cycle,
        }
    }

    /// Open a position at the coin's last price with no exit thresholds.
    pub fn open(&mut self, coin: &Coin, volume: Decimal) -> Result<PositionId> {
        self.open_with(coin, volume, ExitPlan::default())
    }

    /// Open a position at the coin's last price.
    ///
    /// The entry cost must be strictly below the current wallet balance; a
    /// cost equal to the balance is rejected. Nothing changes on failure.
    pub fn open_with(&mut self, coin: &Coin, volume: Decimal, plan: ExitPlan) -> Result<PositionId> {
        if volume <= Decimal::ZERO {
            return Err(Error::InvalidVolume(volume));
        }
        if coin.last_price <= Decimal::ZERO {
            return Err(Error::InvalidPrice(coin.last_price));
        }
        for price in [plan.stop_loss, plan.take_profit].into_iter().flatten() {
            if price <= Decimal::ZERO {
                return Err(Error::InvalidPrice(price));
            }
        }

        // An unrepresentable cost can never be covered.
        let cost = volume.checked_mul(coin.last_price).unwrap_or(Decimal::MAX);
        let balance = self.state.wallet_balance();
        if cost >= balance {
            self.sink.record(LedgerEvent::OpenRejected {
                symbol: coin.symbol.clone(),
                cost,
                balance,
            });
            return Err(Error::InsufficientFunds { cost, balance });
        }

        let id = self.state.allocate_id();
        let position = Position::open(id, coin, volume, plan);
        self.sink.record(LedgerEvent::Opened {
            id,
            symbol: position.symbol().to_string(),
            volume,
            entry_price: position.entry_price(),
            cost: position.cost(),
        });
        self.state.insert_position(position);
        self.recompute();

        Ok(id)
    }

    /// Close `volume` of an open position at its current price.
    ///
    /// - `volume >= position volume`: the whole position is closed.
    /// - `0 < volume < position volume`: the closed part is settled and the
    ///   remainder continues as a new position with a fresh identity.
    /// - `volume <= 0`: rejected with [`Error::InvalidVolume`], nothing changes.
    pub fn close(&mut self, id: PositionId, volume: Decimal) -> Result<CloseOutcome> {
        if volume <= Decimal::ZERO {
            self.sink.record(LedgerEvent::CloseRejected { id, volume });
            return Err(Error::InvalidVolume(volume));
        }

        let outcome = self.settle(id, volume, CloseReason::Manual)?;
        self.recompute();
        Ok(outcome)
    }

    /// Enable the stop-loss at `price`, or disable it with `None`.
    pub fn set_stop_loss(&mut self, id: PositionId, price: Option<Decimal>) -> Result<()> {
        self.set_threshold(id, ThresholdSide::StopLoss, price)
    }

    /// Enable the take-profit at `price`, or disable it with `None`.
    pub fn set_take_profit(&mut self, id: PositionId, price: Option<Decimal>) -> Result<()> {
        self.set_threshold(id, ThresholdSide::TakeProfit, price)
    }

    /// Price every open position, fire automated exits, recompute figures.
    ///
    /// The three phases run strictly in that order. Exits are evaluated
    /// against the set of triggered positions collected before any of them is
    /// closed. A feed failure leaves that position at its last known price.
    pub fn refresh_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        for position in self.state.positions_mut() {
            let quote = self.feed.latest_price(position.symbol()).and_then(|quote| {
                if quote.price > Decimal::ZERO {
                    Ok(quote)
                } else {
                    Err(Error::InvalidPrice(quote.price))
                }
            });

            match quote {
                Ok(quote) => {
                    position.refresh(quote.price);
                    report.refreshed += 1;
                    self.sink.record(LedgerEvent::PriceRefreshed {
                        id: position.id(),
                        symbol: position.symbol().to_string(),
                        price: quote.price,
                    });
                }
                Err(e) => {
                    let failure = FeedFailure {
                        position_id: position.id(),
                        symbol: position.symbol().to_string(),
                        reason: e.to_string(),
                    };
                    self.sink.record(LedgerEvent::FeedFailed {
                        id: failure.position_id,
                        symbol: failure.symbol.clone(),
                        reason: failure.reason.clone(),
                    });
                    report.failures.push(failure);
                }
            }
        }

        let triggered: Vec<(PositionId, CloseReason, Decimal)> = self
            .state
            .positions()
            .filter_map(|p| p.exit_trigger().map(|reason| (p.id(), reason, p.volume())))
            .collect();

        for (id, reason, volume) in triggered {
            if let Ok(outcome) = self.settle(id, volume, reason) {
                self.sink.record(LedgerEvent::ExitTriggered {
                    id,
                    reason,
                    price: outcome.settlement.close_price(),
                });
                report.exits.push(ExitRecord {
                    position_id: id,
                    reason,
                    price: outcome.settlement.close_price(),
                    realized_profit: outcome.settlement.realized_profit(),
                });
            }
        }

        self.recompute();
        report
    }

    fn settle(&mut self, id: PositionId, volume: Decimal, reason: CloseReason) -> Result<CloseOutcome> {
        let (settlement, residual) = self
            .state
            .settle(id, volume, reason)
            .ok_or(Error::PositionNotFound(id))?;

        self.sink.record(LedgerEvent::Closed {
            id,
            symbol: settlement.symbol().to_string(),
            volume: settlement.closed_volume(),
            price: settlement.close_price(),
            profit: settlement.realized_profit(),
            reason,
        });
        if let Some(residual_id) = residual {
            let volume = self
                .state
                .position(residual_id)
                .map_or(Decimal::ZERO, Position::volume);
            self.sink.record(LedgerEvent::ResidualOpened {
                id: residual_id,
                from: id,
                volume,
            });
        }

        Ok(CloseOutcome {
            settlement,
            residual,
        })
    }

    fn set_threshold(
        &mut self,
        id: PositionId,
        side: ThresholdSide,
        price: Option<Decimal>,
    ) -> Result<()> {
        if let Some(price) = price.filter(|p| *p <= Decimal::ZERO) {
            return Err(Error::InvalidPrice(price));
        }

        let position = self
            .state
            .position_mut(id)
            .ok_or(Error::PositionNotFound(id))?;
        let current = match side {
            ThresholdSide::StopLoss => position.stop_loss(),
            ThresholdSide::TakeProfit => position.take_profit(),
        };
        let threshold = match price {
            Some(price) => ExitThreshold::at(price),
            None => ExitThreshold {
                enabled: false,
                ..current
            },
        };
        match side {
            ThresholdSide::StopLoss => position.set_stop_loss(threshold),
            ThresholdSide::TakeProfit => position.set_take_profit(threshold),
        }

        self.sink
            .record(LedgerEvent::ThresholdChanged { id, side, price });
        self.recompute();
        Ok(())
    }

    fn recompute(&mut self) {
        self.state.recompute();
        self.sink.record(LedgerEvent::Recomputed {
            wallet_balance: self.state.wallet_balance(),
            wallet_sum: self.state.wallet_sum(),
        });
    }
}
