// 11.0: every state change produces an event. used for audit trails, state reconstruction,
// and notifying downstream consumers. the EventPayload enum lists all event types.

use crate::fund::FundKind;
use crate::order::{OrderIntent, OrderKind, OrderSide};
use crate::types::{AccountId, AssetId, BatchId, Direction, MarketId, OrderId, Price, Quote, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Settlement events
    OrderSettled(OrderSettledEvent),
    BatchExecuted(BatchExecutedEvent),
    BatchReverted(BatchRevertedEvent),

    // Risk events
    PositionMarked(PositionMarkedEvent),
    FundingTransfer(FundingTransferEvent),

    // Account and fund events
    Deposit(DepositEvent),
    Withdrawal(WithdrawalEvent),
    FundSeeded(FundSeededEvent),
    FundReleased(FundReleasedEvent),
    FundTransferred(FundTransferredEvent),
}

impl EventPayload {
    pub fn name(&self) -> &'static str {
        match self {
            EventPayload::OrderSettled(_) => "order_settled",
            EventPayload::BatchExecuted(_) => "batch_executed",
            EventPayload::BatchReverted(_) => "batch_reverted",
            EventPayload::PositionMarked(_) => "position_marked",
            EventPayload::FundingTransfer(_) => "funding_transfer",
            EventPayload::Deposit(_) => "deposit",
            EventPayload::Withdrawal(_) => "withdrawal",
            EventPayload::FundSeeded(_) => "fund_seeded",
            EventPayload::FundReleased(_) => "fund_released",
            EventPayload::FundTransferred(_) => "fund_transferred",
        }
    }
}

/// One per order leg of an executed batch. Also the receipt line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSettledEvent {
    pub batch_id: BatchId,
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub market_id: MarketId,
    pub direction: Direction,
    pub intent: OrderIntent,
    pub size: Decimal,
    pub kind: OrderKind,
    pub side: OrderSide,
    pub execution_price: Price,
    pub pnl: Quote,
    pub fee: Quote,
    /// Nothing left to execute on this order after the batch
    pub is_final: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchExecutedEvent {
    pub batch_id: BatchId,
    pub market_id: MarketId,
    pub filled: Decimal,
    pub taker_price: Price,
    pub oracle_price: Price,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRevertedEvent {
    pub batch_id: BatchId,
    pub market_id: MarketId,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionMarkedEvent {
    pub account_id: AccountId,
    pub asset: AssetId,
    pub market_id: MarketId,
    pub direction: Direction,
    pub amount_to_be_sold: Decimal,
    pub remaining: Decimal,
    pub price: Price,
    pub marked_by: AccountId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingTransferEvent {
    pub market_id: MarketId,
    pub account_id: AccountId,
    pub direction: Direction,
    pub size: Decimal,
    pub rate: Decimal,
    pub amount: Quote,
    /// true when the account paid into the funding fund
    pub paid: bool,
    pub new_balance: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositEvent {
    pub account_id: AccountId,
    pub asset: AssetId,
    pub amount: Quote,
    pub new_balance: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalEvent {
    pub account_id: AccountId,
    pub asset: AssetId,
    pub amount: Quote,
    pub new_balance: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundSeededEvent {
    pub fund: FundKind,
    pub asset: AssetId,
    pub amount: Quote,
    pub new_balance: Quote,
}

/// Collateral withdrawn from a fund by an admin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundReleasedEvent {
    pub fund: FundKind,
    pub asset: AssetId,
    pub amount: Quote,
    pub new_balance: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundTransferredEvent {
    pub from: FundKind,
    pub to: FundKind,
    pub asset: AssetId,
    pub amount: Quote,
    pub from_balance: Quote,
    pub to_balance: Quote,
}
