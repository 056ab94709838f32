// 5.0: funding (ABR). each interval the holders on one side of a market pay the other side
// |rate| * price * size. rate > 0: shorts pay longs. rate < 0: longs pay shorts.
// the rate itself comes from outside, this module only moves the money.
// 5.1 has the payment math, 5.2 the per-market schedule.

use crate::config::Rounding;
use crate::position::Position;
use crate::types::{AccountId, Direction, MarketId, Price, Quote, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const MILLIS_PER_YEAR: i64 = 365 * 24 * 3_600_000;

// 5.1: which side pays at this rate. none when the rate is zero
pub fn payer_direction(rate: Decimal) -> Option<Direction> {
    if rate > Decimal::ZERO {
        Some(Direction::Short)
    } else if rate < Decimal::ZERO {
        Some(Direction::Long)
    } else {
        None
    }
}

pub fn funding_payment(rate: Decimal, price: Price, size: Decimal, rounding: &Rounding) -> Quote {
    Quote::new(rounding.amount(rate.abs() * price.value() * size))
}

pub fn annualized_rate(period_rate: Decimal, interval_ms: i64) -> Decimal {
    if interval_ms <= 0 {
        return Decimal::ZERO;
    }
    period_rate * Decimal::from(MILLIS_PER_YEAR) / Decimal::from(interval_ms)
}

/// One position's side of a funding settlement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingLeg {
    pub account_id: AccountId,
    pub direction: Direction,
    pub size: Decimal,
    pub amount: Quote,
    pub pays: bool,
}

/// Payers first, so the funding fund is filled before anyone is paid out of it.
/// Each payer owes its own rounded payment. Receivers split exactly what the
/// payers owe, in proportion to size, so a settlement never leaves dust behind
/// or overdraws the fund. Positions opened after `epoch` sit this settlement out.
pub fn plan_funding<'a>(
    positions: impl IntoIterator<Item = (AccountId, &'a Position)>,
    rate: Decimal,
    price: Price,
    epoch: Timestamp,
    rounding: &Rounding,
) -> Vec<FundingLeg> {
    let Some(payer) = payer_direction(rate) else {
        return Vec::new();
    };

    let (mut legs, mut receivers): (Vec<FundingLeg>, Vec<FundingLeg>) = positions
        .into_iter()
        .filter(|(_, p)| !p.is_empty() && p.created_at <= epoch)
        .map(|(account_id, p)| {
            let pays = p.direction == payer;
            FundingLeg {
                account_id,
                direction: p.direction,
                size: p.size,
                amount: if pays {
                    funding_payment(rate, price, p.size, rounding)
                } else {
                    Quote::zero()
                },
                pays,
            }
        })
        .partition(|leg| leg.pays);

    let collected: Quote = legs.iter().map(|leg| leg.amount).sum();
    split_pro_rata(&mut receivers, collected, rounding);
    legs.extend(receivers);
    legs
}

// 5.1: rounds every share down, the last receiver takes the remainder
fn split_pro_rata(receivers: &mut [FundingLeg], total: Quote, rounding: &Rounding) {
    let total_size: Decimal = receivers.iter().map(|leg| leg.size).sum();
    if total_size.is_zero() {
        return;
    }
    let mut assigned = Quote::zero();
    let last = receivers.len() - 1;
    for (i, leg) in receivers.iter_mut().enumerate() {
        leg.amount = if i == last {
            total.sub(assigned)
        } else {
            Quote::new(rounding.share(total.value() * leg.size / total_size))
        };
        assigned = assigned.add(leg.amount);
    }
}

// 5.2: a market is settled at most once per funding interval
#[derive(Debug, Clone, Default)]
pub struct FundingSchedule {
    last_settled: HashMap<MarketId, Timestamp>,
}

impl FundingSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_settled(&self, market_id: MarketId) -> Option<Timestamp> {
        self.last_settled.get(&market_id).copied()
    }

    pub fn next_allowed(&self, market_id: MarketId, interval_ms: i64) -> Option<Timestamp> {
        self.last_settled(market_id).map(|last| last.plus_millis(interval_ms))
    }

    pub fn check(&self, market_id: MarketId, now: Timestamp, interval_ms: i64) -> Result<(), FundingError> {
        match self.next_allowed(market_id, interval_ms) {
            Some(next_allowed) if now < next_allowed => Err(FundingError::TooEarly {
                market_id,
                next_allowed,
            }),
            _ => Ok(()),
        }
    }

    pub fn record(&mut self, market_id: MarketId, now: Timestamp) {
        self.last_settled.insert(market_id, now);
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FundingError {
    #[error("Funding epoch {epoch:?} is ahead of the engine clock {now:?}")]
    FutureEpoch { epoch: Timestamp, now: Timestamp },

    #[error("Funding for market {market_id:?} already settled, next allowed at {next_allowed:?}")]
    TooEarly {
        market_id: MarketId,
        next_allowed: Timestamp,
    },
}
