//! Position management for fills.
//!
//! Every leg of a batch settles against a `Stage`: private copies of the
//! touched accounts and of the fund ledgers. The engine swaps them in only once
//! every leg has settled, so a rejected leg leaves nothing behind.

use super::results::OrderRejection;
use crate::account::Account;
use crate::config::ExchangeConfig;
use crate::events::OrderSettledEvent;
use crate::fund::{FundKind, FundLedger};
use crate::liquidation::LiquidationError;
use crate::margin::{evaluate, PendingReservation};
use crate::market::{MarketConfig, MarketError};
use crate::order::{Order, OrderIntent, OrderKind};
use crate::position::{CloseFill, PositionKey};
use crate::price_feed::OverlayPrices;
use crate::types::{AccountId, AssetId, BatchId, Leverage, Price, Quote, Timestamp};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

pub(super) struct Stage<'a> {
    pub(super) exchange: &'a ExchangeConfig,
    /// Live cache with the batch market pinned to the batch oracle price
    pub(super) prices: OverlayPrices<'a>,
    pub(super) now: Timestamp,
    pub(super) accounts: BTreeMap<AccountId, Account>,
    pub(super) funds: FundLedger,
}

fn staged(accounts: &mut BTreeMap<AccountId, Account>, account_id: AccountId) -> Result<&mut Account, OrderRejection> {
    accounts
        .get_mut(&account_id)
        .ok_or(OrderRejection::AccountNotRegistered(account_id))
}

// a mark on a position that no longer exists is dropped
fn clear_mark_if_flat(account: &mut Account, asset: AssetId, key: PositionKey) {
    let targets_key = account
        .mark(asset)
        .is_some_and(|m| m.market_id == key.market_id && m.direction == key.direction);
    if targets_key && account.open_position(key).is_none() {
        account.clear_mark(asset);
    }
}

impl Stage<'_> {
    /// Settles one order leg at `price`. `is_final` is filled in by the caller.
    pub(super) fn settle(
        &mut self,
        batch_id: BatchId,
        market: &MarketConfig,
        order: &Order,
        fill: Decimal,
        price: Price,
    ) -> Result<OrderSettledEvent, OrderRejection> {
        let (pnl, fee) = match (order.intent, order.kind) {
            (OrderIntent::Open, _) => (Quote::zero(), self.open_leg(market, order, fill, price)?),
            (OrderIntent::Close, OrderKind::Liquidation) => {
                (self.liquidation_close(market, order, fill, price)?, Quote::zero())
            }
            (OrderIntent::Close, OrderKind::Deleverage) => {
                (self.deleverage_close(market, order, fill, price)?, Quote::zero())
            }
            (OrderIntent::Close, _) => self.normal_close(market, order, fill, price)?,
        };

        Ok(OrderSettledEvent {
            batch_id,
            order_id: order.order_id,
            account_id: order.account_id,
            market_id: market.id,
            direction: order.direction,
            intent: order.intent,
            size: fill,
            kind: order.kind,
            side: order.side,
            execution_price: price,
            pnl,
            fee,
            is_final: false,
        })
    }

    pub(super) fn record_execution(&mut self, order: &Order, executed: Decimal) -> Result<(), OrderRejection> {
        staged(&mut self.accounts, order.account_id)?.set_executed(order.order_id, executed);
        Ok(())
    }

    // margin check first, then lock, fee, holding and liquidity
    fn open_leg(&mut self, market: &MarketConfig, order: &Order, fill: Decimal, price: Price) -> Result<Quote, OrderRejection> {
        let rounding = self.exchange.rounding;
        let asset = market.collateral;
        let leverage = Leverage::new(order.leverage).ok_or(MarketError::LeverageOutOfBounds {
            leverage: order.leverage,
            min: market.min_leverage.value(),
            max: market.max_leverage.value(),
        })?;

        let value = rounding.amount(fill * price.value());
        let margin = Quote::new(rounding.amount(value / leverage.value()));
        let fee = Quote::new(rounding.fee(value * self.exchange.fees.rate(order.side)));
        let required = margin.add(fee);
        let pending = PendingReservation::new(required, Quote::new(value * market.maintenance_margin_fraction));

        let account = self
            .accounts
            .get(&order.account_id)
            .ok_or(OrderRejection::AccountNotRegistered(order.account_id))?;
        let snapshot = evaluate(account, asset, self.now, &self.prices, self.exchange, pending)?;
        if snapshot.degraded {
            return Err(OrderRejection::DegradedMargin);
        }
        if snapshot.available.is_negative() {
            return Err(OrderRejection::InsufficientMargin {
                required,
                available: snapshot.available.add(required),
            });
        }

        let key = PositionKey::new(market.id, order.position_direction());
        let now = self.now;
        let account = staged(&mut self.accounts, order.account_id)?;
        let opened = account
            .position_entry(key, now)
            .open(fill, price, leverage, &rounding, now);
        account.lock(asset, opened.margin);
        account.debit(asset, fee);
        account.track_market(asset, market.id);

        self.funds.fund(FundKind::Fee, asset, fee)?;
        self.funds.fund(FundKind::Holding, asset, opened.value)?;
        if !opened.borrowed.is_zero() {
            self.funds.defund(FundKind::Liquidity, asset, opened.borrowed)?;
        }
        Ok(fee)
    }

    fn normal_close(
        &mut self,
        market: &MarketConfig,
        order: &Order,
        fill: Decimal,
        price: Price,
    ) -> Result<(Quote, Quote), OrderRejection> {
        let rounding = self.exchange.rounding;
        let asset = market.collateral;
        let value = rounding.amount(fill * price.value());
        let fee = Quote::new(rounding.fee(value * self.exchange.fees.rate(order.side)));

        let closed = self.close_position(market, order, fill, price)?;
        if closed.released_equity().is_negative() {
            self.absorb_loss(order.account_id, asset, closed.pnl.abs())?;
        } else {
            staged(&mut self.accounts, order.account_id)?.credit(asset, closed.pnl);
        }

        staged(&mut self.accounts, order.account_id)?.debit(asset, fee);
        self.funds.fund(FundKind::Fee, asset, fee)?;
        Ok((closed.pnl, fee))
    }

    // the account forfeits the released margin. positive equity goes to insurance
    fn liquidation_close(&mut self, market: &MarketConfig, order: &Order, fill: Decimal, price: Price) -> Result<Quote, OrderRejection> {
        let asset = market.collateral;
        let exhausted = self.consume_mark(market, order, fill)?;
        let closed = self.close_position(market, order, fill, price)?;

        let equity = closed.released_equity();
        if equity.is_negative() {
            self.absorb_loss(order.account_id, asset, closed.pnl.abs())?;
        } else {
            staged(&mut self.accounts, order.account_id)?.debit(asset, closed.released_margin);
            self.funds.fund(FundKind::Insurance, asset, equity)?;
        }

        if exhausted {
            staged(&mut self.accounts, order.account_id)?.clear_mark(asset);
        }
        Ok(closed.pnl)
    }

    // exit value repays borrowed. margin and balance stay put
    fn deleverage_close(&mut self, market: &MarketConfig, order: &Order, fill: Decimal, price: Price) -> Result<Quote, OrderRejection> {
        let rounding = self.exchange.rounding;
        let asset = market.collateral;
        let key = PositionKey::new(market.id, order.position_direction());
        let now = self.now;
        let exhausted = self.consume_mark(market, order, fill)?;

        let account = staged(&mut self.accounts, order.account_id)?;
        let position = account
            .position_mut(key)
            .filter(|p| !p.is_empty())
            .ok_or(OrderRejection::NoPositionToClose(key))?;
        let delevered = position.deleverage(fill, price, &rounding, now)?;
        if exhausted {
            account.clear_mark(asset);
        }

        self.funds.defund(FundKind::Holding, asset, delevered.exit_value)?;
        self.funds.fund(FundKind::Liquidity, asset, delevered.exit_value)?;
        Ok(delevered.pnl)
    }

    fn consume_mark(&mut self, market: &MarketConfig, order: &Order, fill: Decimal) -> Result<bool, OrderRejection> {
        let asset = market.collateral;
        let account = staged(&mut self.accounts, order.account_id)?;
        let mark = account.mark_mut(asset).ok_or(LiquidationError::NotMarked {
            account_id: order.account_id,
            asset,
        })?;
        Ok(mark.consume(market.id, order.position_direction(), order.kind, fill)?)
    }

    /// Reduces the targeted position and returns margin and borrowed to where they came from.
    fn close_position(&mut self, market: &MarketConfig, order: &Order, fill: Decimal, price: Price) -> Result<CloseFill, OrderRejection> {
        let rounding = self.exchange.rounding;
        let asset = market.collateral;
        let key = PositionKey::new(market.id, order.position_direction());
        let now = self.now;

        let account = staged(&mut self.accounts, order.account_id)?;
        let position = account
            .position_mut(key)
            .filter(|p| !p.is_empty())
            .ok_or(OrderRejection::NoPositionToClose(key))?;
        let closed = position.close(fill, price, &rounding, now)?;
        account.unlock(asset, closed.released_margin);
        account.untrack_if_flat(asset, market.id);
        clear_mark_if_flat(account, asset, key);

        self.funds.defund(FundKind::Holding, asset, closed.released_value())?;
        if !closed.released_borrowed.is_zero() {
            self.funds.fund(FundKind::Liquidity, asset, closed.released_borrowed)?;
        }
        Ok(closed)
    }

    // the account pays what its available margin covers, insurance takes the rest.
    // available nets losses still open on other positions against the free balance
    fn absorb_loss(&mut self, account_id: AccountId, asset: AssetId, loss: Quote) -> Result<(), OrderRejection> {
        let account = self
            .accounts
            .get(&account_id)
            .ok_or(OrderRejection::AccountNotRegistered(account_id))?;
        let snapshot = evaluate(account, asset, self.now, &self.prices, self.exchange, PendingReservation::none())?;
        if snapshot.degraded {
            return Err(OrderRejection::DegradedMargin);
        }
        let covered = loss.min(snapshot.available.max(Quote::zero()));
        staged(&mut self.accounts, account_id)?.debit(asset, covered);

        let residual = loss.sub(covered);
        if !residual.is_zero() {
            self.funds.defund(FundKind::Insurance, asset, residual)?;
        }
        Ok(())
    }
}
