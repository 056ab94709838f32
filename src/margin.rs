//! Cross-margin evaluation for one account and one collateral asset.
//!
//! Total margin is the collateral balance plus unrealized pnl across every
//! market the account touches under that asset. Maintenance is
//! avg price * size * maintenance fraction per position. An account whose total
//! margin falls to or below maintenance is liquidatable, unless its worst
//! position is an unleveraged long which can never go underwater.
//!
//! Stale prices never fail the query. They contribute nothing and flag the
//! result as degraded, and a degraded result is conservative: no available
//! margin and never liquidatable.

use crate::account::Account;
use crate::config::ExchangeConfig;
use crate::market::MarketError;
use crate::position::{Position, PositionKey};
use crate::price_feed::PriceSource;
use crate::types::{AccountId, AssetId, Direction, Price, Quote, Timestamp};
use rust_decimal::Decimal;

/// Margin and maintenance of a position that is about to be opened
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PendingReservation {
    pub margin: Quote,
    pub maintenance: Quote,
}

impl PendingReservation {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(margin: Quote, maintenance: Quote) -> Self {
        Self {
            margin,
            maintenance,
        }
    }
}

/// The position with the lowest collateral ratio, priced
#[derive(Debug, Clone)]
pub struct WorstPosition {
    pub position: Position,
    pub price: Price,
    pub collateral_ratio: Decimal,
}

impl WorstPosition {
    pub fn key(&self) -> PositionKey {
        self.position.key()
    }
}

#[derive(Debug, Clone)]
pub struct MarginSnapshot {
    pub account_id: AccountId,
    pub asset: AssetId,
    pub balance: Quote,
    pub locked: Quote,
    pub unrealized_pnl: Quote,
    /// balance + unrealized pnl
    pub total_margin: Quote,
    /// total margin - locked - pending margin. Zero when degraded.
    pub available: Quote,
    pub maintenance: Quote,
    pub worst: Option<WorstPosition>,
    pub has_positions: bool,
    pub degraded: bool,
    pub liquidatable: bool,
}

impl MarginSnapshot {
    pub fn least_collateral_ratio(&self) -> Option<Decimal> {
        self.worst.as_ref().map(|w| w.collateral_ratio)
    }
}

// 3.1: the margin engine. one pass over every market tracked under `asset`
pub fn evaluate(
    account: &Account,
    asset: AssetId,
    now: Timestamp,
    prices: &dyn PriceSource,
    config: &ExchangeConfig,
    pending: PendingReservation,
) -> Result<MarginSnapshot, MarketError> {
    let mut unrealized_pnl = Quote::zero();
    let mut maintenance = pending.maintenance;
    let mut worst: Option<WorstPosition> = None;
    let mut has_positions = false;
    let mut degraded = false;

    for market_id in account.markets_for(asset) {
        let market = config.market(market_id)?;
        let price = prices.fresh(market_id, now, market.price_ttl_ms).ok();

        for direction in Direction::ALL {
            let Some(position) = account.open_position(PositionKey::new(market_id, direction)) else {
                continue;
            };
            has_positions = true;
            maintenance = maintenance.add(position.maintenance(market.maintenance_margin_fraction));

            let Some(price) = price else {
                degraded = true;
                continue;
            };
            unrealized_pnl = unrealized_pnl.add(position.unrealized_pnl(price));

            if let Some(ratio) = position.collateral_ratio(price) {
                let is_worse = worst.as_ref().map_or(true, |w| ratio < w.collateral_ratio);
                if is_worse {
                    worst = Some(WorstPosition {
                        position: position.clone(),
                        price,
                        collateral_ratio: ratio,
                    });
                }
            }
        }
    }

    let balance = account.balance(asset);
    let locked = account.locked(asset);
    let total_margin = balance.add(unrealized_pnl);

    let (available, liquidatable) = if degraded {
        (Quote::zero(), false)
    } else {
        let available = total_margin.sub(locked).sub(pending.margin);
        let exempt = worst
            .as_ref()
            .is_some_and(|w| w.position.is_unleveraged_long());
        (available, has_positions && total_margin <= maintenance && !exempt)
    };

    Ok(MarginSnapshot {
        account_id: account.id,
        asset,
        balance,
        locked,
        unrealized_pnl,
        total_margin,
        available,
        maintenance,
        worst,
        has_positions,
        degraded,
        liquidatable,
    })
}
