//! Funding rate settlement.

use super::core::Engine;
use super::results::{EngineError, FundingResult};
use crate::events::{EventPayload, FundingTransferEvent};
use crate::fund::FundKind;
use crate::funding::{annualized_rate, plan_funding, FundingError};
use crate::position::PositionKey;
use crate::types::{AccountId, Direction, MarketId, Price, Quote, Timestamp};
use rust_decimal::Decimal;
use tracing::info;

impl Engine {
    /// Moves `|rate| * price * size` from every payer position into the funding
    /// fund, then splits it across the receivers. All or nothing.
    ///
    /// `epoch` is the funding snapshot time: positions opened after it are
    /// skipped, and it is what the per-market interval is measured against.
    /// It may not be ahead of the engine clock.
    pub fn settle_funding(
        &mut self,
        caller: AccountId,
        market_id: MarketId,
        rate: Decimal,
        price: Price,
        epoch: Timestamp,
    ) -> Result<FundingResult, EngineError> {
        if !self.exchange.is_funding_operator(caller) {
            return Err(EngineError::Unauthorized {
                caller,
                action: "settle funding",
            });
        }
        let market = self.exchange.market(market_id)?;
        let asset = market.collateral;
        let interval = market.funding_interval_ms;
        if epoch > self.current_time {
            return Err(FundingError::FutureEpoch {
                epoch,
                now: self.current_time,
            }
            .into());
        }
        self.funding.check(market_id, epoch, interval)?;

        let positions = self.accounts.iter().flat_map(|(account_id, account)| {
            Direction::ALL.into_iter().filter_map(move |direction| {
                account
                    .open_position(PositionKey::new(market_id, direction))
                    .map(|position| (*account_id, position))
            })
        });
        let legs = plan_funding(positions, rate, price, epoch, &self.exchange.rounding);

        // payers come first, so receivers are paid out of what was just collected
        let mut funds = self.funds.clone();
        for leg in &legs {
            if leg.pays {
                funds.fund(FundKind::Funding, asset, leg.amount)?;
            } else {
                funds.defund(FundKind::Funding, asset, leg.amount)?;
            }
        }
        self.funds = funds;

        let mut transfers = Vec::with_capacity(legs.len());
        let mut total_paid = Quote::zero();
        let mut total_received = Quote::zero();
        for leg in legs {
            let account = self
                .accounts
                .get_mut(&leg.account_id)
                .ok_or(EngineError::AccountNotFound(leg.account_id))?;
            let new_balance = if leg.pays {
                total_paid = total_paid.add(leg.amount);
                account.debit(asset, leg.amount)
            } else {
                total_received = total_received.add(leg.amount);
                account.credit(asset, leg.amount)
            };
            transfers.push(FundingTransferEvent {
                market_id,
                account_id: leg.account_id,
                direction: leg.direction,
                size: leg.size,
                rate,
                amount: leg.amount,
                paid: leg.pays,
                new_balance,
            });
        }

        for transfer in &transfers {
            self.emit_event(EventPayload::FundingTransfer(transfer.clone()));
        }
        self.funding.record(market_id, epoch);

        info!(
            market = market_id.0,
            %rate,
            annualized = %annualized_rate(rate, interval),
            %price,
            epoch = epoch.as_millis(),
            transfers = transfers.len(),
            paid = %total_paid,
            received = %total_received,
            "funding settled"
        );

        Ok(FundingResult {
            market_id,
            rate,
            price,
            settled_at: epoch,
            total_paid,
            total_received,
            transfers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExchangeConfig;
    use crate::engine::EngineConfig;
    use crate::order::{Batch, Order};
    use crate::types::{AssetId, BatchId, OrderId};
    use rust_decimal_macros::dec;

    const USDC: AssetId = AssetId(1);
    const BTC: MarketId = MarketId(1);
    const OPERATOR: AccountId = AccountId(99);
    const EIGHT_HOURS: i64 = 8 * 3_600_000;

    fn px(value: Decimal) -> Price {
        Price::new_unchecked(value)
    }

    fn engine_with_accounts(ids: &[u64]) -> Engine {
        let mut engine = Engine::new(EngineConfig::default(), ExchangeConfig::testnet(OPERATOR));
        for id in ids {
            engine.register_account(AccountId(*id)).unwrap();
            engine.deposit(AccountId(*id), USDC, Quote::new(dec!(1000))).unwrap();
        }
        engine.update_price(BTC, px(dec!(100))).unwrap();
        engine
    }

    fn open_pair(engine: &mut Engine, batch_id: u64, long: u64, short: u64, size: Decimal) {
        let batch = Batch::new(BatchId(batch_id), BTC, size, px(dec!(100)))
            .with_order(Order::maker(OrderId(batch_id * 10), AccountId(short), BTC, Direction::Short, px(dec!(100)), size))
            .with_order(Order::taker(OrderId(batch_id * 10 + 1), AccountId(long), BTC, Direction::Long, px(dec!(100)), size));
        engine.execute_batch(batch).unwrap();
    }

    // account 1 long, account 2 short, `size` each at 100
    fn engine_with_open_interest(size: Decimal) -> Engine {
        let mut engine = engine_with_accounts(&[1, 2]);
        open_pair(&mut engine, 1, 1, 2, size);
        engine.advance_time(1);
        engine
    }

    fn settle(engine: &mut Engine, caller: AccountId, rate: Decimal) -> Result<FundingResult, EngineError> {
        let now = engine.time();
        engine.settle_funding(caller, BTC, rate, px(dec!(100)), now)
    }

    fn balance(engine: &Engine, id: u64) -> Decimal {
        engine.get_account(AccountId(id)).unwrap().balance(USDC).value()
    }

    #[test]
    fn positive_rate_shorts_pay_longs() {
        let mut engine = engine_with_open_interest(dec!(2));
        let result = settle(&mut engine, OPERATOR, dec!(0.01)).unwrap();

        assert_eq!(result.transfers.len(), 2);
        assert_eq!(result.total_paid.value(), dec!(2));
        assert_eq!(result.total_received.value(), dec!(2));
        assert!(result.transfers[0].paid);
        assert_eq!(result.transfers[0].account_id, AccountId(2));

        assert_eq!(balance(&engine, 1), dec!(1002));
        assert_eq!(balance(&engine, 2), dec!(998));
        assert!(engine.fund_balance(FundKind::Funding, USDC).is_zero());
    }

    #[test]
    fn negative_rate_longs_pay_shorts() {
        let mut engine = engine_with_open_interest(dec!(1));
        settle(&mut engine, OPERATOR, dec!(-0.05)).unwrap();
        assert_eq!(balance(&engine, 1), dec!(995));
        assert_eq!(balance(&engine, 2), dec!(1005));
    }

    #[test]
    fn only_operators_settle() {
        let mut engine = engine_with_open_interest(dec!(1));
        assert_eq!(
            settle(&mut engine, AccountId(1), dec!(0.01)),
            Err(EngineError::Unauthorized {
                caller: AccountId(1),
                action: "settle funding",
            })
        );
    }

    #[test]
    fn at_most_once_per_interval() {
        let mut engine = engine_with_open_interest(dec!(1));
        let first = settle(&mut engine, OPERATOR, dec!(0.01)).unwrap();

        engine.advance_time(EIGHT_HOURS - 1);
        assert_eq!(
            settle(&mut engine, OPERATOR, dec!(0.01)),
            Err(EngineError::Funding(FundingError::TooEarly {
                market_id: BTC,
                next_allowed: first.settled_at.plus_millis(EIGHT_HOURS),
            }))
        );

        engine.advance_time(1);
        assert!(settle(&mut engine, OPERATOR, dec!(0.01)).is_ok());
    }

    #[test]
    fn uneven_split_settles_without_a_seeded_fund() {
        let mut engine = engine_with_accounts(&[1, 2, 3]);
        let batch = Batch::new(BatchId(1), BTC, dec!(1), px(dec!(100)))
            .with_order(Order::maker(OrderId(1), AccountId(2), BTC, Direction::Short, px(dec!(100)), dec!(0.5)))
            .with_order(Order::maker(OrderId(2), AccountId(3), BTC, Direction::Short, px(dec!(100)), dec!(0.5)))
            .with_order(Order::taker(OrderId(3), AccountId(1), BTC, Direction::Long, px(dec!(100)), dec!(1)));
        engine.execute_batch(batch).unwrap();

        // the long pays 0.00000003, the shorts split it 0.00000001 / 0.00000002
        let result = settle(&mut engine, OPERATOR, dec!(-0.0000000003)).unwrap();
        assert_eq!(result.total_paid.value(), dec!(0.00000003));
        assert_eq!(result.total_received, result.total_paid);
        assert_eq!(balance(&engine, 1), dec!(999.99999997));
        assert_eq!(balance(&engine, 2), dec!(1000.00000001));
        assert_eq!(balance(&engine, 3), dec!(1000.00000002));
        assert!(engine.fund_balance(FundKind::Funding, USDC).is_zero());
    }

    #[test]
    fn positions_opened_after_the_epoch_sit_out() {
        let mut engine = engine_with_accounts(&[1, 2, 3, 4]);
        open_pair(&mut engine, 1, 1, 2, dec!(1));
        let epoch = engine.time();

        engine.advance_time(3_600_000);
        engine.update_price(BTC, px(dec!(100))).unwrap();
        open_pair(&mut engine, 2, 3, 4, dec!(1));

        let result = engine
            .settle_funding(OPERATOR, BTC, dec!(0.01), px(dec!(100)), epoch)
            .unwrap();
        assert_eq!(result.settled_at, epoch);
        assert_eq!(result.transfers.len(), 2);
        assert!(result
            .transfers
            .iter()
            .all(|t| t.account_id == AccountId(1) || t.account_id == AccountId(2)));
        assert_eq!(balance(&engine, 3), dec!(1000));
        assert_eq!(balance(&engine, 4), dec!(1000));

        // the interval runs from the epoch, not from the call
        let next = epoch.plus_millis(EIGHT_HOURS);
        engine.set_time(next);
        assert!(engine
            .settle_funding(OPERATOR, BTC, dec!(0.01), px(dec!(100)), next)
            .is_ok());
    }

    #[test]
    fn epoch_cannot_run_ahead_of_the_clock() {
        let mut engine = engine_with_open_interest(dec!(1));
        let now = engine.time();
        assert_eq!(
            engine.settle_funding(OPERATOR, BTC, dec!(0.01), px(dec!(100)), now.plus_millis(1)),
            Err(EngineError::Funding(FundingError::FutureEpoch {
                epoch: now.plus_millis(1),
                now,
            }))
        );
        assert_eq!(balance(&engine, 1), dec!(1000));
    }
}
