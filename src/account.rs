//! Account and collateral management.
//!
//! Accounts hold collateral per asset under cross margin: every position
//! collateralized in an asset shares that asset's balance. Opening a position
//! locks its margin against the balance; the balance itself only moves on
//! deposits, withdrawals, fees, realized pnl and funding.

use crate::liquidation::LiquidationMark;
use crate::position::{Position, PositionKey};
use crate::types::{AccountId, AssetId, Direction, MarketId, OrderId, Quote, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    balances: BTreeMap<AssetId, Quote>,
    locked: BTreeMap<AssetId, Quote>,
    positions: BTreeMap<PositionKey, Position>,
    collaterals: BTreeSet<AssetId>,
    markets: BTreeMap<AssetId, BTreeSet<MarketId>>,
    marks: BTreeMap<AssetId, LiquidationMark>,
    portion_executed: HashMap<OrderId, Decimal>,
    pub created_at: Timestamp,
}

impl Account {
    pub fn new(id: AccountId, timestamp: Timestamp) -> Self {
        Self {
            id,
            balances: BTreeMap::new(),
            locked: BTreeMap::new(),
            positions: BTreeMap::new(),
            collaterals: BTreeSet::new(),
            markets: BTreeMap::new(),
            marks: BTreeMap::new(),
            portion_executed: HashMap::new(),
            created_at: timestamp,
        }
    }

    pub fn balance(&self, asset: AssetId) -> Quote {
        self.balances.get(&asset).copied().unwrap_or_default()
    }

    pub fn locked(&self, asset: AssetId) -> Quote {
        self.locked.get(&asset).copied().unwrap_or_default()
    }

    pub fn collaterals(&self) -> impl Iterator<Item = AssetId> + '_ {
        self.collaterals.iter().copied()
    }

    pub fn deposit(&mut self, asset: AssetId, amount: Quote) -> Result<Quote, AccountError> {
        if amount <= Quote::zero() {
            return Err(AccountError::NonPositiveAmount(amount));
        }
        Ok(self.credit(asset, amount))
    }

    // `available` comes from the margin engine, the account cannot price its own positions
    pub fn withdraw(&mut self, asset: AssetId, amount: Quote, available: Quote) -> Result<Quote, AccountError> {
        if amount <= Quote::zero() {
            return Err(AccountError::NonPositiveAmount(amount));
        }
        if amount > available {
            return Err(AccountError::InsufficientAvailable {
                requested: amount,
                available,
            });
        }
        Ok(self.debit(asset, amount))
    }

    pub fn credit(&mut self, asset: AssetId, amount: Quote) -> Quote {
        self.collaterals.insert(asset);
        let entry = self.balances.entry(asset).or_default();
        *entry = entry.add(amount);
        *entry
    }

    // may leave the balance negative. funding and deficits surface as margin debt
    pub fn debit(&mut self, asset: AssetId, amount: Quote) -> Quote {
        self.credit(asset, amount.negate())
    }

    pub fn lock(&mut self, asset: AssetId, amount: Quote) {
        let entry = self.locked.entry(asset).or_default();
        *entry = entry.add(amount);
    }

    pub fn unlock(&mut self, asset: AssetId, amount: Quote) {
        let entry = self.locked.entry(asset).or_default();
        *entry = entry.sub(amount).max(Quote::zero());
    }

    pub fn position(&self, key: PositionKey) -> Option<&Position> {
        self.positions.get(&key)
    }

    pub fn position_mut(&mut self, key: PositionKey) -> Option<&mut Position> {
        self.positions.get_mut(&key)
    }

    /// Position record for `key`, created empty on first use. Records are never removed.
    pub fn position_entry(&mut self, key: PositionKey, timestamp: Timestamp) -> &mut Position {
        self.positions
            .entry(key)
            .or_insert_with(|| Position::empty(key, timestamp))
    }

    pub fn open_position(&self, key: PositionKey) -> Option<&Position> {
        self.position(key).filter(|p| !p.is_empty())
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(|p| !p.is_empty())
    }

    /// Non-empty positions in markets collateralized by `asset`
    pub fn positions_in(&self, asset: AssetId) -> Vec<&Position> {
        self.markets_for(asset)
            .flat_map(|market_id| {
                Direction::ALL
                    .into_iter()
                    .filter_map(move |direction| self.open_position(PositionKey::new(market_id, direction)))
            })
            .collect()
    }

    pub fn markets_for(&self, asset: AssetId) -> impl Iterator<Item = MarketId> + '_ {
        self.markets.get(&asset).into_iter().flatten().copied()
    }

    pub fn track_market(&mut self, asset: AssetId, market_id: MarketId) {
        self.markets.entry(asset).or_default().insert(market_id);
    }

    // drops the market once both directions are flat
    pub fn untrack_if_flat(&mut self, asset: AssetId, market_id: MarketId) {
        let flat = Direction::ALL
            .into_iter()
            .all(|direction| self.open_position(PositionKey::new(market_id, direction)).is_none());
        if !flat {
            return;
        }
        if let Some(set) = self.markets.get_mut(&asset) {
            set.remove(&market_id);
            if set.is_empty() {
                self.markets.remove(&asset);
            }
        }
    }

    pub fn mark(&self, asset: AssetId) -> Option<&LiquidationMark> {
        self.marks.get(&asset)
    }

    pub fn mark_mut(&mut self, asset: AssetId) -> Option<&mut LiquidationMark> {
        self.marks.get_mut(&asset)
    }

    pub fn set_mark(&mut self, asset: AssetId, mark: LiquidationMark) {
        self.marks.insert(asset, mark);
    }

    pub fn clear_mark(&mut self, asset: AssetId) -> Option<LiquidationMark> {
        self.marks.remove(&asset)
    }

    pub fn executed(&self, order_id: OrderId) -> Decimal {
        self.portion_executed.get(&order_id).copied().unwrap_or_default()
    }

    pub fn set_executed(&mut self, order_id: OrderId, amount: Decimal) {
        self.portion_executed.insert(order_id, amount);
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AccountError {
    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(Quote),

    #[error("Insufficient available margin: requested {requested}, available {available}")]
    InsufficientAvailable { requested: Quote, available: Quote },

    #[error("Account {0:?} is not registered")]
    NotRegistered(AccountId),

    #[error("Account {0:?} is already registered")]
    AlreadyRegistered(AccountId),
}
