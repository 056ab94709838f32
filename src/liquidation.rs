//! Liquidation logic and conditions.
//!
//! Liquidation is two-phase. A designated liquidator first marks the worst
//! position of an undercollateralized account. A later batch then closes the
//! marked position through the ordinary settlement path with a liquidation or
//! deleverage order kind, consuming the mark as it fills.
//!
//! Marking sizes the forced close. Selling `to_sell` at the current price brings
//! the position's collateral ratio back to the maintenance fraction:
//!
//! ```text
//! to_sell = size - margin / (mm_fraction * price - pnl_per_unit)
//! ```
//!
//! If the position cannot be rescued that way, or if what is left after the
//! sale would run at 2x leverage or less, the whole position is marked for
//! liquidation instead.

use crate::config::ExchangeConfig;
use crate::margin::MarginSnapshot;
use crate::order::OrderKind;
use crate::position::Position;
use crate::types::{AccountId, AssetId, Direction, MarketId, Price, Timestamp};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Leverage at or below which a deleverage is not worth it and the position is closed out
pub const FULL_LIQUIDATION_LEVERAGE: Decimal = Decimal::TWO;

/// At most one per account and collateral asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidationMark {
    pub market_id: MarketId,
    /// Direction of the marked position (closing orders run the other way)
    pub direction: Direction,
    /// Zero means sell everything
    pub amount_to_be_sold: Decimal,
    /// What is still to be consumed by closing batches
    pub remaining: Decimal,
    pub price: Price,
    pub marked_at: Timestamp,
}

impl LiquidationMark {
    pub fn is_full_liquidation(&self) -> bool {
        self.amount_to_be_sold.is_zero()
    }

    pub fn required_kind(&self) -> OrderKind {
        if self.is_full_liquidation() {
            OrderKind::Liquidation
        } else {
            OrderKind::Deleverage
        }
    }

    /// Checks a forced close against the mark and decrements it.
    /// Returns true once nothing is left to consume.
    pub fn consume(
        &mut self,
        market_id: MarketId,
        direction: Direction,
        kind: OrderKind,
        fill: Decimal,
    ) -> Result<bool, LiquidationError> {
        if market_id != self.market_id || direction != self.direction {
            return Err(LiquidationError::MarkMismatch {
                marked_market: self.market_id,
                marked_direction: self.direction,
                market_id,
                direction,
            });
        }
        if kind != self.required_kind() {
            return Err(LiquidationError::KindMismatch {
                expected: self.required_kind(),
                got: kind,
            });
        }
        if fill > self.remaining {
            return Err(LiquidationError::ExceedsMark {
                requested: fill,
                remaining: self.remaining,
            });
        }
        self.remaining -= fill;
        Ok(self.remaining.is_zero())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LiquidationPlan {
    Full { size: Decimal },
    Deleverage { amount: Decimal, leverage_after: Decimal },
}

// 6.1: sizes the forced close for the worst position at `price`
pub fn plan_liquidation(
    position: &Position,
    price: Price,
    maintenance_fraction: Decimal,
    size_decimals: u32,
) -> LiquidationPlan {
    let full = LiquidationPlan::Full { size: position.size };
    if position.margin.is_zero() {
        return full;
    }

    let pnl_per_unit = position.signed_diff(price.value());
    let denominator = maintenance_fraction * price.value() - pnl_per_unit;
    if denominator <= Decimal::ZERO {
        return full;
    }

    let to_sell = (position.size - position.margin.value() / denominator)
        .round_dp_with_strategy(size_decimals, RoundingStrategy::ToZero);
    if to_sell <= Decimal::ZERO || to_sell >= position.size {
        return full;
    }

    let exit_per_unit = position.avg_price + pnl_per_unit;
    let leverage_after = (position.margin.value() + position.borrowed.value() - to_sell * exit_per_unit)
        / position.margin.value();
    if leverage_after <= FULL_LIQUIDATION_LEVERAGE {
        return full;
    }

    LiquidationPlan::Deleverage {
        amount: to_sell,
        leverage_after,
    }
}

impl LiquidationPlan {
    pub fn into_mark(self, position: &Position, price: Price, timestamp: Timestamp) -> LiquidationMark {
        let (amount_to_be_sold, remaining) = match self {
            LiquidationPlan::Full { size } => (Decimal::ZERO, size),
            LiquidationPlan::Deleverage { amount, .. } => (amount, amount),
        };
        LiquidationMark {
            market_id: position.market_id,
            direction: position.direction,
            amount_to_be_sold,
            remaining,
            price,
            marked_at: timestamp,
        }
    }
}

#[derive(Debug, Clone)]
pub enum MarkOutcome {
    Marked(LiquidationMark),
    /// A mark already exists for this collateral. Nothing changed.
    AlreadyMarked(LiquidationMark),
    Healthy(MarginSnapshot),
}

impl MarkOutcome {
    pub fn mark(&self) -> Option<&LiquidationMark> {
        match self {
            MarkOutcome::Marked(mark) | MarkOutcome::AlreadyMarked(mark) => Some(mark),
            MarkOutcome::Healthy(_) => None,
        }
    }
}

/// Turns a margin snapshot into a mark decision
pub fn decide_mark(
    snapshot: MarginSnapshot,
    config: &ExchangeConfig,
    timestamp: Timestamp,
) -> Result<MarkOutcome, LiquidationError> {
    if snapshot.degraded {
        return Err(LiquidationError::DegradedMargin {
            account_id: snapshot.account_id,
            asset: snapshot.asset,
        });
    }
    if !snapshot.liquidatable {
        return Ok(MarkOutcome::Healthy(snapshot));
    }
    let Some(worst) = snapshot.worst.as_ref() else {
        return Ok(MarkOutcome::Healthy(snapshot));
    };
    let market = config
        .market(worst.position.market_id)
        .map_err(|_| LiquidationError::UnknownMarket(worst.position.market_id))?;

    let plan = plan_liquidation(
        &worst.position,
        worst.price,
        market.maintenance_margin_fraction,
        market.size_decimals,
    );
    Ok(MarkOutcome::Marked(plan.into_mark(&worst.position, worst.price, timestamp)))
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LiquidationError {
    #[error("Margin for account {account_id:?} asset {asset:?} is degraded by stale prices")]
    DegradedMargin { account_id: AccountId, asset: AssetId },

    #[error("Account {account_id:?} has no liquidation mark for asset {asset:?}")]
    NotMarked { account_id: AccountId, asset: AssetId },

    #[error("Mark is for {marked_market:?} {marked_direction}, close targets {market_id:?} {direction}")]
    MarkMismatch {
        marked_market: MarketId,
        marked_direction: Direction,
        market_id: MarketId,
        direction: Direction,
    },

    #[error("Mark requires a {expected:?} order, got {got:?}")]
    KindMismatch { expected: OrderKind, got: OrderKind },

    #[error("Forced close of {requested} exceeds marked remainder {remaining}")]
    ExceedsMark { requested: Decimal, remaining: Decimal },

    #[error("Forced orders must close a position")]
    ForcedOpen,

    #[error("Forced order not signed by a designated liquidator ({0:?})")]
    UnauthorizedLiquidator(Option<AccountId>),

    #[error("Market {0:?} not found")]
    UnknownMarket(MarketId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Rounding;
    use crate::position::PositionKey;
    use crate::types::Leverage;
    use rust_decimal_macros::dec;

    fn px(value: Decimal) -> Price {
        Price::new_unchecked(value)
    }

    fn position(direction: Direction, leverage: Decimal) -> Position {
        let mut pos = Position::empty(PositionKey::new(MarketId(1), direction), Timestamp::from_millis(0));
        pos.open(
            dec!(1),
            px(dec!(1000)),
            Leverage::new_unchecked(leverage),
            &Rounding::default(),
            Timestamp::from_millis(0),
        );
        pos
    }

    #[test]
    fn deleverage_amount_for_leveraged_long() {
        let pos = position(Direction::Long, dec!(10));
        // denominator = 0.12 * 950 + 50 = 164, to_sell = 1 - 100 / 164
        let plan = plan_liquidation(&pos, px(dec!(950)), dec!(0.12), 8);
        assert_eq!(
            plan,
            LiquidationPlan::Deleverage {
                amount: dec!(0.39024390),
                leverage_after: dec!(6.29268295),
            }
        );
    }

    #[test]
    fn deleverage_amount_for_leveraged_short() {
        let pos = position(Direction::Short, dec!(10));
        // denominator = 0.12 * 1050 + 50 = 176
        let LiquidationPlan::Deleverage { amount, leverage_after } =
            plan_liquidation(&pos, px(dec!(1050)), dec!(0.12), 8)
        else {
            panic!("expected a deleverage plan");
        };
        assert_eq!(amount, dec!(0.43181818));
        assert!(leverage_after > FULL_LIQUIDATION_LEVERAGE);
    }

    #[test]
    fn low_leverage_after_sale_means_full_liquidation() {
        let pos = position(Direction::Long, dec!(2));
        let plan = plan_liquidation(&pos, px(dec!(600)), dec!(0.5), 8);
        assert_eq!(plan, LiquidationPlan::Full { size: dec!(1) });

        let mark = plan.into_mark(&pos, px(dec!(600)), Timestamp::from_millis(9));
        assert!(mark.is_full_liquidation());
        assert_eq!(mark.remaining, dec!(1));
        assert_eq!(mark.required_kind(), OrderKind::Liquidation);
    }

    #[test]
    fn consume_decrements_and_clears() {
        let pos = position(Direction::Long, dec!(10));
        let mut mark = plan_liquidation(&pos, px(dec!(950)), dec!(0.12), 8).into_mark(
            &pos,
            px(dec!(950)),
            Timestamp::from_millis(0),
        );
        let exhausted = mark
            .consume(MarketId(1), Direction::Long, OrderKind::Deleverage, dec!(0.2))
            .unwrap();
        assert!(!exhausted);
        assert_eq!(mark.remaining, dec!(0.19024390));
        assert!(matches!(
            mark.consume(MarketId(1), Direction::Long, OrderKind::Deleverage, dec!(0.2)),
            Err(LiquidationError::ExceedsMark { .. })
        ));
        assert!(mark
            .consume(MarketId(1), Direction::Long, OrderKind::Deleverage, dec!(0.19024390))
            .unwrap());
    }

    #[test]
    fn consume_rejects_wrong_target() {
        let pos = position(Direction::Long, dec!(10));
        let mut mark = plan_liquidation(&pos, px(dec!(950)), dec!(0.12), 8).into_mark(
            &pos,
            px(dec!(950)),
            Timestamp::from_millis(0),
        );
        assert!(matches!(
            mark.consume(MarketId(2), Direction::Long, OrderKind::Deleverage, dec!(0.1)),
            Err(LiquidationError::MarkMismatch { .. })
        ));
        assert!(matches!(
            mark.consume(MarketId(1), Direction::Short, OrderKind::Deleverage, dec!(0.1)),
            Err(LiquidationError::MarkMismatch { .. })
        ));
        assert_eq!(
            mark.consume(MarketId(1), Direction::Long, OrderKind::Liquidation, dec!(0.1)),
            Err(LiquidationError::KindMismatch {
                expected: OrderKind::Deleverage,
                got: OrderKind::Liquidation,
            })
        );
    }
}
