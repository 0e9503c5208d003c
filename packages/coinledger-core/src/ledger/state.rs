//! Persistent ledger state: open positions, settlement history and wallet figures.

use super::position::Position;
use super::settlement::{CloseReason, Settlement, Split};
use crate::types::PositionId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Everything a wallet needs to survive a restart.
///
/// Positions and settlements are held in ordered collections keyed by
/// identity so that iteration and sums are reproducible. Only the ledger
/// inserts or removes entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerState {
    wallet_id: String,
    /// Next identity to hand out
    next_id: u64,
    positions: BTreeMap<PositionId, Position>,
    history: BTreeSet<Settlement>,
    /// Net deposits minus withdrawals
    payment_calc: Decimal,
    /// Sum of open position entry costs
    transactions_costs: Decimal,
    /// Unrealized profit across open positions
    profit_loss: Decimal,
    /// Realized profit across all settlements
    historical_profit_loss: Decimal,
    wallet_balance: Decimal,
    wallet_sum: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

/// Snapshot of a wallet's figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletSummary {
    pub wallet_id: String,
    pub payment_calc: Decimal,
    pub transactions_costs: Decimal,
    pub profit_loss: Decimal,
    pub historical_profit_loss: Decimal,
    pub wallet_balance: Decimal,
    pub wallet_sum: Decimal,
    pub open_positions: usize,
    pub settlements: usize,
}

impl LedgerState {
    /// Create an empty wallet.
    pub fn new(wallet_id: &str) -> Self {
        Self {
            wallet_id: wallet_id.to_string(),
            next_id: 1,
            positions: BTreeMap::new(),
            history: BTreeSet::new(),
            payment_calc: Decimal::ZERO,
            transactions_costs: Decimal::ZERO,
            profit_loss: Decimal::ZERO,
            historical_profit_loss: Decimal::ZERO,
            wallet_balance: Decimal::ZERO,
            wallet_sum: Decimal::ZERO,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn wallet_id(&self) -> &str {
        &self.wallet_id
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn history(&self) -> impl Iterator<Item = &Settlement> {
        self.history.iter()
    }

    pub fn position(&self, id: PositionId) -> Option<&Position> {
        self.positions.get(&id)
    }

    pub fn contains(&self, id: PositionId) -> bool {
        self.positions.contains_key(&id)
    }

    pub fn payment_calc(&self) -> Decimal {
        self.payment_calc
    }

    pub fn transactions_costs(&self) -> Decimal {
        self.transactions_costs
    }

    pub fn profit_loss(&self) -> Decimal {
        self.profit_loss
    }

    pub fn historical_profit_loss(&self) -> Decimal {
        self.historical_profit_loss
    }

    pub fn wallet_balance(&self) -> Decimal {
        self.wallet_balance
    }

    pub fn wallet_sum(&self) -> Decimal {
        self.wallet_sum
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn summary(&self) -> WalletSummary {
        WalletSummary {
            wallet_id: self.wallet_id.clone(),
            payment_calc: self.payment_calc,
            transactions_costs: self.transactions_costs,
            profit_loss: self.profit_loss,
            historical_profit_loss: self.historical_profit_loss,
            wallet_balance: self.wallet_balance,
            wallet_sum: self.wallet_sum,
            open_positions: self.positions.len(),
            settlements: self.history.len(),
        }
    }

    /// Stamp creation and update times before a save.
    pub(crate) fn touch(&mut self) {
        let now = Utc::now();
        if self.created_at.is_none() {
            self.created_at = Some(now);
        }
        self.updated_at = Some(now);
    }

    pub(crate) fn set_wallet_id(&mut self, wallet_id: &str) {
        self.wallet_id = wallet_id.to_string();
    }

    pub(crate) fn allocate_id(&mut self) -> PositionId {
        // Stay above every id ever issued even if a stored counter lags behind.
        let floor = self
            .positions
            .keys()
            .copied()
            .chain(
                self.history
                    .iter()
                    .flat_map(|s| [Some(s.position_id()), s.residual_id()])
                    .flatten(),
            )
            .max()
            .map_or(0, |id| id.0 + 1);
        let id = self.next_id.max(floor).max(1);
        self.next_id = id + 1;
        PositionId(id)
    }

    /// Apply a deposit (positive) or withdrawal (negative). Returns false and
    /// leaves the total unchanged if it would overflow.
    pub(crate) fn add_payment(&mut self, amount: Decimal) -> bool {
        match self.payment_calc.checked_add(amount) {
            Some(total) => {
                self.payment_calc = total;
                true
            }
            None => false,
        }
    }

    pub(crate) fn insert_position(&mut self, position: Position) {
        self.positions.insert(position.id(), position);
    }

    pub(crate) fn positions_mut(&mut self) -> impl Iterator<Item = &mut Position> {
        self.positions.values_mut()
    }

    pub(crate) fn position_mut(&mut self, id: PositionId) -> Option<&mut Position> {
        self.positions.get_mut(&id)
    }

    /// Move a position out of the open set and settle `volume` of it.
    ///
    /// The settlement joins the history and a partial close's residual joins
    /// the open set. Returns a copy of the settlement, or `None` if `id` is
    /// not open.
    pub(crate) fn settle(
        &mut self,
        id: PositionId,
        volume: Decimal,
        reason: CloseReason,
    ) -> Option<(Settlement, Option<PositionId>)> {
        let position = self.positions.remove(&id)?;
        let Split {
            settlement,
            residual,
        } = Settlement::settle(position, volume, reason, || self.allocate_id());

        let residual_id = residual.as_ref().map(Position::id);
        if let Some(residual) = residual {
            self.insert_position(residual);
        }
        self.history.insert(settlement.clone());

        Some((settlement, residual_id))
    }

    /// Recompute every derived figure from the open set and history.
    ///
    /// Realized and unrealized profit come first because balance and sum are
    /// derived from them.
    pub(crate) fn recompute(&mut self) {
        self.historical_profit_loss = self
            .history
            .iter()
            .map(Settlement::realized_profit)
            .fold(Decimal::ZERO, Decimal::saturating_add);
        self.profit_loss = self
            .positions
            .values()
            .map(Position::unrealized_profit)
            .fold(Decimal::ZERO, Decimal::saturating_add);
        self.transactions_costs = self
            .positions
            .values()
            .map(Position::cost)
            .fold(Decimal::ZERO, Decimal::saturating_add);
        self.wallet_balance = self
            .payment_calc
            .saturating_sub(self.transactions_costs)
            .saturating_add(self.historical_profit_loss)
            .saturating_add(self.profit_loss);
        self.wallet_sum = self
            .payment_calc
            .saturating_add(self.historical_profit_loss)
            .saturating_add(self.profit_loss);
    }
}
