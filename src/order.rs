//! Order legs and batches.
//!
//! A batch is one match produced off-engine: every leg but the last is a resting
//! maker, the last leg is the taker crossing them. Orders are immutable; the only
//! thing that changes over time is how much of each one has executed, which the
//! owning account tracks.

use crate::types::{AccountId, BatchId, Direction, MarketId, OrderId, Price, WireError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderKind {
    Market,
    Limit,
    Stop,
    /// Forced full close of a marked position
    Liquidation,
    /// Forced partial close of a marked position
    Deleverage,
}

impl OrderKind {
    pub fn wire(&self) -> u8 {
        match self {
            OrderKind::Market => 1,
            OrderKind::Limit => 2,
            OrderKind::Stop => 3,
            OrderKind::Liquidation => 4,
            OrderKind::Deleverage => 5,
        }
    }

    pub fn is_forced(&self) -> bool {
        matches!(self, OrderKind::Liquidation | OrderKind::Deleverage)
    }
}

impl TryFrom<u8> for OrderKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(OrderKind::Market),
            2 => Ok(OrderKind::Limit),
            3 => Ok(OrderKind::Stop),
            4 => Ok(OrderKind::Liquidation),
            5 => Ok(OrderKind::Deleverage),
            _ => Err(WireError { kind: "order kind", value }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeInForce {
    #[default]
    GoodTillTime,
    /// Fill the whole unexecuted quantity or abort the batch
    FillOrKill,
    /// Whatever does not fill now is dropped
    ImmediateOrCancel,
}

impl TimeInForce {
    pub fn wire(&self) -> u8 {
        match self {
            TimeInForce::GoodTillTime => 1,
            TimeInForce::FillOrKill => 2,
            TimeInForce::ImmediateOrCancel => 3,
        }
    }
}

impl TryFrom<u8> for TimeInForce {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(TimeInForce::GoodTillTime),
            2 => Ok(TimeInForce::FillOrKill),
            3 => Ok(TimeInForce::ImmediateOrCancel),
            _ => Err(WireError { kind: "time in force", value }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Maker,
    Taker,
}

impl OrderSide {
    pub fn wire(&self) -> u8 {
        match self {
            OrderSide::Maker => 1,
            OrderSide::Taker => 2,
        }
    }
}

impl TryFrom<u8> for OrderSide {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(OrderSide::Maker),
            2 => Ok(OrderSide::Taker),
            _ => Err(WireError { kind: "order side", value }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderIntent {
    #[default]
    Open,
    /// Reduces the position on the opposite direction of the order
    Close,
}

impl OrderIntent {
    pub fn wire(&self) -> u8 {
        match self {
            OrderIntent::Open => 1,
            OrderIntent::Close => 2,
        }
    }
}

impl TryFrom<u8> for OrderIntent {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(OrderIntent::Open),
            2 => Ok(OrderIntent::Close),
            _ => Err(WireError { kind: "order intent", value }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchStatus {
    Reverted,
    Executed,
}

impl BatchStatus {
    pub fn wire(&self) -> u8 {
        match self {
            BatchStatus::Reverted => 0,
            BatchStatus::Executed => 1,
        }
    }
}

impl TryFrom<u8> for BatchStatus {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(BatchStatus::Reverted),
            1 => Ok(BatchStatus::Executed),
            _ => Err(WireError { kind: "batch status", value }),
        }
    }
}

/// One signed order leg with its resolved side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub market_id: MarketId,
    pub direction: Direction,
    /// Limit price. For market-style takers this is informational only.
    pub price: Price,
    pub quantity: Decimal,
    pub leverage: Decimal,
    /// Tolerance around the oracle price, in percent
    pub slippage: Decimal,
    pub kind: OrderKind,
    pub time_in_force: TimeInForce,
    pub post_only: bool,
    pub side: OrderSide,
    pub intent: OrderIntent,
    pub liquidator: Option<AccountId>,
}

impl Order {
    /// Resting maker leg. Makers are always limit orders.
    pub fn maker(
        order_id: OrderId,
        account_id: AccountId,
        market_id: MarketId,
        direction: Direction,
        price: Price,
        quantity: Decimal,
    ) -> Self {
        Self {
            order_id,
            account_id,
            market_id,
            direction,
            price,
            quantity,
            leverage: Decimal::ONE,
            slippage: Decimal::ZERO,
            kind: OrderKind::Limit,
            time_in_force: TimeInForce::GoodTillTime,
            post_only: false,
            side: OrderSide::Maker,
            intent: OrderIntent::Open,
            liquidator: None,
        }
    }

    /// Taker leg priced against the oracle with a slippage tolerance.
    pub fn taker(
        order_id: OrderId,
        account_id: AccountId,
        market_id: MarketId,
        direction: Direction,
        price: Price,
        quantity: Decimal,
    ) -> Self {
        Self {
            kind: OrderKind::Market,
            side: OrderSide::Taker,
            slippage: dec!(1),
            ..Self::maker(order_id, account_id, market_id, direction, price, quantity)
        }
    }

    pub fn with_leverage(mut self, leverage: Decimal) -> Self {
        self.leverage = leverage;
        self
    }

    pub fn with_kind(mut self, kind: OrderKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_slippage(mut self, percent: Decimal) -> Self {
        self.slippage = percent;
        self
    }

    pub fn with_time_in_force(mut self, time_in_force: TimeInForce) -> Self {
        self.time_in_force = time_in_force;
        self
    }

    pub fn post_only(mut self) -> Self {
        self.post_only = true;
        self
    }

    pub fn closing(mut self) -> Self {
        self.intent = OrderIntent::Close;
        self
    }

    pub fn liquidated_by(mut self, liquidator: AccountId) -> Self {
        self.liquidator = Some(liquidator);
        self
    }

    /// Direction of the position this order opens or reduces.
    pub fn position_direction(&self) -> Direction {
        match self.intent {
            OrderIntent::Open => self.direction,
            OrderIntent::Close => self.direction.opposite(),
        }
    }

    pub fn unexecuted(&self, executed: Decimal) -> Decimal {
        (self.quantity - executed).max(Decimal::ZERO)
    }

    pub fn slippage_fraction(&self) -> Decimal {
        self.slippage / dec!(100)
    }

    /// Worst acceptable execution price for a market-style taker.
    pub fn slippage_bound(&self, oracle: Price) -> Decimal {
        let s = self.slippage_fraction();
        match self.direction {
            Direction::Long => oracle.value() * (Decimal::ONE + s),
            Direction::Short => oracle.value() * (Decimal::ONE - s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: BatchId,
    pub market_id: MarketId,
    /// Upper bound on the quantity this match may fill
    pub locked_quantity: Decimal,
    pub oracle_price: Price,
    pub orders: Vec<Order>,
}

impl Batch {
    pub fn new(batch_id: BatchId, market_id: MarketId, locked_quantity: Decimal, oracle_price: Price) -> Self {
        Self {
            batch_id,
            market_id,
            locked_quantity,
            oracle_price,
            orders: Vec::new(),
        }
    }

    pub fn with_order(mut self, order: Order) -> Self {
        self.orders.push(order);
        self
    }

    pub fn makers(&self) -> &[Order] {
        match self.orders.split_last() {
            Some((_, makers)) => makers,
            None => &[],
        }
    }

    pub fn taker(&self) -> Option<&Order> {
        self.orders.last()
    }
}
