// 4.0: open position tracking. one record per (market, direction), so an account can be
// long and short the same market at once. pnl = size * signed diff.
// 4.1 has the open / close / deleverage math at the bottom.

use crate::config::Rounding;
use crate::types::{Direction, Leverage, MarketId, Price, Quote, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    pub market_id: MarketId,
    pub direction: Direction,
}

impl PositionKey {
    pub fn new(market_id: MarketId, direction: Direction) -> Self {
        Self {
            market_id,
            direction,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub market_id: MarketId,
    pub direction: Direction,
    // zero while the position is empty
    pub avg_price: Decimal,
    pub size: Decimal,
    pub margin: Quote,
    pub borrowed: Quote,
    pub leverage: Decimal,
    pub created_at: Timestamp,
    pub modified_at: Timestamp,
    pub realized_pnl: Quote,
}

impl Position {
    pub fn empty(key: PositionKey, timestamp: Timestamp) -> Self {
        Self {
            market_id: key.market_id,
            direction: key.direction,
            avg_price: Decimal::ZERO,
            size: Decimal::ZERO,
            margin: Quote::zero(),
            borrowed: Quote::zero(),
            leverage: Decimal::ZERO,
            created_at: Timestamp::default(),
            modified_at: timestamp,
            realized_pnl: Quote::zero(),
        }
    }

    pub fn key(&self) -> PositionKey {
        PositionKey::new(self.market_id, self.direction)
    }

    pub fn is_empty(&self) -> bool {
        self.size.is_zero()
    }

    pub fn is_unleveraged_long(&self) -> bool {
        self.direction == Direction::Long && self.leverage == Decimal::ONE
    }

    // 4.1: per-unit pnl. long: price - avg, short: avg - price
    pub fn signed_diff(&self, price: Decimal) -> Decimal {
        self.direction.sign() * (price - self.avg_price)
    }

    pub fn unrealized_pnl(&self, price: Price) -> Quote {
        Quote::new(self.size * self.signed_diff(price.value()))
    }

    pub fn notional(&self, price: Price) -> Quote {
        Quote::new(self.size * price.value())
    }

    pub fn maintenance(&self, maintenance_fraction: Decimal) -> Quote {
        Quote::new(self.avg_price * self.size * maintenance_fraction)
    }

    /// (margin + upnl) / notional. None for an empty position.
    pub fn collateral_ratio(&self, price: Price) -> Option<Decimal> {
        let notional = self.notional(price).value();
        if notional.is_zero() {
            return None;
        }
        Some((self.margin.value() + self.unrealized_pnl(price).value()) / notional)
    }

    // 4.2: adds to the position. averages the entry, splits value into margin and borrowed
    pub fn open(
        &mut self,
        fill: Decimal,
        price: Price,
        leverage: Leverage,
        rounding: &Rounding,
        timestamp: Timestamp,
    ) -> OpenFill {
        let value = rounding.amount(fill * price.value());
        let margin = rounding.amount(value / leverage.value());
        let borrowed = value - margin;

        let was_empty = self.is_empty();
        self.avg_price = if was_empty {
            price.value()
        } else {
            rounding.amount((self.avg_price * self.size + price.value() * fill) / (self.size + fill))
        };
        self.size += fill;
        self.margin = self.margin.add(Quote::new(margin));
        self.borrowed = self.borrowed.add(Quote::new(borrowed));
        if was_empty {
            self.leverage = leverage.value();
            self.created_at = timestamp;
        } else {
            self.recompute_leverage(rounding);
        }
        self.modified_at = timestamp;

        OpenFill {
            value: Quote::new(value),
            margin: Quote::new(margin),
            borrowed: Quote::new(borrowed),
        }
    }

    // 4.3: releases margin and borrowed in proportion to the closed fraction
    pub fn close(
        &mut self,
        fill: Decimal,
        price: Price,
        rounding: &Rounding,
        timestamp: Timestamp,
    ) -> Result<CloseFill, PositionError> {
        self.check_reducible(fill)?;

        let diff = self.signed_diff(price.value());
        let pnl = Quote::new(rounding.amount(fill * diff));

        let (released_margin, released_borrowed) = if fill == self.size {
            (self.margin, self.borrowed)
        } else {
            let fraction = fill / self.size;
            (
                Quote::new(rounding.amount(self.margin.value() * fraction)),
                Quote::new(rounding.amount(self.borrowed.value() * fraction)),
            )
        };

        self.size -= fill;
        self.margin = self.margin.sub(released_margin);
        self.borrowed = self.borrowed.sub(released_borrowed);
        self.realized_pnl = self.realized_pnl.add(pnl);
        self.modified_at = timestamp;
        if self.is_empty() {
            self.reset(timestamp);
        }

        Ok(CloseFill {
            pnl,
            released_margin,
            released_borrowed,
        })
    }

    // 4.4: deleverage repays borrowed with the leveraged exit value. margin stays put
    pub fn deleverage(
        &mut self,
        fill: Decimal,
        price: Price,
        rounding: &Rounding,
        timestamp: Timestamp,
    ) -> Result<DeleverageFill, PositionError> {
        self.check_reducible(fill)?;
        if fill == self.size {
            return Err(PositionError::DeleverageClosesPosition(self.key()));
        }

        let diff = self.signed_diff(price.value());
        let exit_value = Quote::new(rounding.amount(fill * (self.avg_price + diff)));
        if exit_value > self.borrowed {
            return Err(PositionError::BorrowedExhausted {
                exit_value,
                borrowed: self.borrowed,
            });
        }
        let pnl = Quote::new(rounding.amount(fill * diff));

        self.size -= fill;
        self.borrowed = self.borrowed.sub(exit_value);
        self.realized_pnl = self.realized_pnl.add(pnl);
        self.recompute_leverage(rounding);
        self.modified_at = timestamp;

        Ok(DeleverageFill { exit_value, pnl })
    }

    fn check_reducible(&self, fill: Decimal) -> Result<(), PositionError> {
        if self.is_empty() {
            return Err(PositionError::Empty(self.key()));
        }
        if fill > self.size {
            return Err(PositionError::ExceedsSize {
                requested: fill,
                size: self.size,
            });
        }
        Ok(())
    }

    fn recompute_leverage(&mut self, rounding: &Rounding) {
        if !self.margin.is_zero() {
            self.leverage = rounding.amount(self.margin.add(self.borrowed).value() / self.margin.value());
        }
    }

    fn reset(&mut self, timestamp: Timestamp) {
        *self = Position::empty(self.key(), timestamp);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpenFill {
    pub value: Quote,
    pub margin: Quote,
    pub borrowed: Quote,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloseFill {
    pub pnl: Quote,
    pub released_margin: Quote,
    pub released_borrowed: Quote,
}

impl CloseFill {
    /// Margin handed back plus realized pnl. Negative means a deficit.
    pub fn released_equity(&self) -> Quote {
        self.released_margin.add(self.pnl)
    }

    pub fn released_value(&self) -> Quote {
        self.released_margin.add(self.released_borrowed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeleverageFill {
    pub exit_value: Quote,
    pub pnl: Quote,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PositionError {
    #[error("No open position for {0:?}")]
    Empty(PositionKey),

    #[error("Close of {requested} exceeds position size {size}")]
    ExceedsSize { requested: Decimal, size: Decimal },

    #[error("Deleverage would close the whole position {0:?}")]
    DeleverageClosesPosition(PositionKey),

    #[error("Exit value {exit_value} exceeds borrowed {borrowed}")]
    BorrowedExhausted { exit_value: Quote, borrowed: Quote },
}
