// 8.0.2: result types and errors for engine operations.

use crate::account::AccountError;
use crate::config::ConfigError;
use crate::events::{FundingTransferEvent, OrderSettledEvent};
use crate::fund::FundError;
use crate::funding::FundingError;
use crate::liquidation::LiquidationError;
use crate::market::MarketError;
use crate::order::BatchStatus;
use crate::position::{PositionError, PositionKey};
use crate::price_feed::PriceFeedError;
use crate::types::{AccountId, BatchId, MarketId, OrderId, Price, Quote, Timestamp};
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReceipt {
    pub batch_id: BatchId,
    pub market_id: MarketId,
    pub status: BatchStatus,
    pub filled: Decimal,
    pub taker_price: Price,
    /// One line per order, makers first, taker last
    pub settlements: Vec<OrderSettledEvent>,
}

impl BatchReceipt {
    pub fn settlement(&self, order_id: OrderId) -> Option<&OrderSettledEvent> {
        self.settlements.iter().find(|s| s.order_id == order_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FundingResult {
    pub market_id: MarketId,
    pub rate: Decimal,
    pub price: Price,
    pub settled_at: Timestamp,
    pub total_paid: Quote,
    pub total_received: Quote,
    pub transfers: Vec<FundingTransferEvent>,
}

/// Structural problems with a batch, plus per-order economic rejections.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BatchError {
    #[error("Batch {0:?} was already executed")]
    DuplicateBatch(BatchId),

    #[error("Batch has no orders")]
    EmptyBatch,

    #[error("Locked quantity must be positive, got {0}")]
    NonPositiveLockedQuantity(Decimal),

    #[error("Order {index} must be a maker")]
    MakerExpected { index: usize },

    #[error("Last order must be the taker")]
    TakerExpected,

    #[error("Maker order {index} is not a limit order")]
    MakerNotLimit { index: usize },

    #[error("Maker order {index} direction disagrees with the other makers")]
    MakerDirectionMismatch { index: usize },

    #[error("Taker direction does not oppose the makers")]
    TakerNotOpposed,

    #[error("Order {index} is for market {got:?}, batch is for {expected:?}")]
    MarketMismatch {
        index: usize,
        expected: MarketId,
        got: MarketId,
    },

    #[error("Post-only order cannot be the taker")]
    PostOnlyTaker,

    #[error("Order {index} repeats {order_id:?} of {account_id:?}")]
    DuplicateOrder {
        index: usize,
        account_id: AccountId,
        order_id: OrderId,
    },

    #[error("Maker order {index} reached with nothing left to fill")]
    MakerUnreachable { index: usize },

    #[error("Batch fills nothing")]
    ZeroFill,

    #[error("Order {index} rejected: {reason}")]
    Rejected { index: usize, reason: OrderRejection },
}

/// Why one order leg could not settle. Aborts the whole batch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderRejection {
    #[error("{0}")]
    Market(#[from] MarketError),

    #[error("Account {0:?} is not registered")]
    AccountNotRegistered(AccountId),

    #[error("Order {0:?} has nothing left to execute")]
    FullyExecuted(OrderId),

    #[error("Slippage {0} is outside 0 to 100 percent")]
    InvalidSlippage(Decimal),

    #[error("Execution price {price} beyond slippage bound {bound}")]
    SlippageExceeded { price: Decimal, bound: Decimal },

    #[error("Execution price {price} worse than limit {limit}")]
    LimitPriceViolated { price: Decimal, limit: Decimal },

    #[error("Fill-or-kill order filled {filled} of {requested}")]
    FillOrKillUnfilled { requested: Decimal, filled: Decimal },

    #[error("Insufficient margin: required {required}, available {available}")]
    InsufficientMargin { required: Quote, available: Quote },

    #[error("Margin is degraded by stale prices")]
    DegradedMargin,

    #[error("No open position {0:?} to close")]
    NoPositionToClose(PositionKey),

    #[error("{0}")]
    Position(#[from] PositionError),

    #[error("{0}")]
    Liquidation(#[from] LiquidationError),

    #[error("{0}")]
    Fund(#[from] FundError),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Account {0:?} not found")]
    AccountNotFound(AccountId),

    #[error("Caller {caller:?} is not allowed to {action}")]
    Unauthorized { caller: AccountId, action: &'static str },

    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),

    #[error("Liquidation error: {0}")]
    Liquidation(#[from] LiquidationError),

    #[error("Funding error: {0}")]
    Funding(#[from] FundingError),

    #[error("Fund error: {0}")]
    Fund(#[from] FundError),

    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    #[error("Market error: {0}")]
    Market(#[from] MarketError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Price error: {0}")]
    Price(#[from] PriceFeedError),
}
