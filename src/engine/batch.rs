//! Batch execution.
//!
//! A batch is one off-engine match: resting makers followed by the taker that
//! crossed them. It is validated as a whole, filled greedily against the
//! makers, priced, and then settled leg by leg on a stage. The stage is
//! committed only when every leg settles; otherwise the batch is recorded as
//! reverted and the live state is exactly what it was.

use super::core::Engine;
use super::positions::Stage;
use super::results::{BatchError, BatchReceipt, EngineError, OrderRejection};
use crate::account::Account;
use crate::events::{BatchExecutedEvent, BatchRevertedEvent, EventPayload};
use crate::fund::FundLedger;
use crate::liquidation::LiquidationError;
use crate::market::MarketConfig;
use crate::order::{Batch, BatchStatus, Order, OrderIntent, OrderKind, OrderSide, TimeInForce};
use crate::price_feed::{OverlayPrices, PriceUpdate};
use crate::types::{AccountId, Direction, Price};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// How much of one order this batch fills
#[derive(Debug, Clone, Copy)]
struct LegFill {
    executed: Decimal,
    unexecuted: Decimal,
    fill: Decimal,
}

/// A fully settled batch waiting to replace the live state
struct StagedBatch {
    receipt: BatchReceipt,
    accounts: BTreeMap<AccountId, Account>,
    funds: FundLedger,
}

impl Engine {
    /// Settles a batch atomically. On error nothing but the batch status and a
    /// revert event is written.
    pub fn execute_batch(&mut self, batch: Batch) -> Result<BatchReceipt, EngineError> {
        if self.batch_status(batch.batch_id) == Some(BatchStatus::Executed) {
            warn!(batch = batch.batch_id.0, "batch already executed");
            return Err(BatchError::DuplicateBatch(batch.batch_id).into());
        }

        match self.try_execute(&batch) {
            Ok(staged) => Ok(self.commit(&batch, staged)),
            Err(err) => {
                warn!(batch = batch.batch_id.0, market = batch.market_id.0, reason = %err, "batch reverted");
                self.batches.insert(batch.batch_id, BatchStatus::Reverted);
                self.emit_event(EventPayload::BatchReverted(BatchRevertedEvent {
                    batch_id: batch.batch_id,
                    market_id: batch.market_id,
                    reason: err.to_string(),
                }));
                Err(err.into())
            }
        }
    }

    fn try_execute(&self, batch: &Batch) -> Result<StagedBatch, BatchError> {
        validate_structure(batch)?;
        let market = self
            .exchange
            .market(batch.market_id)
            .map_err(|e| BatchError::Rejected {
                index: 0,
                reason: e.into(),
            })?;
        for (index, order) in batch.orders.iter().enumerate() {
            self.validate_order(market, order)
                .map_err(|reason| BatchError::Rejected { index, reason })?;
        }

        let legs = self.plan_fills(batch)?;
        let makers = batch.makers();
        let filled: Decimal = legs.iter().take(makers.len()).map(|l| l.fill).sum();
        let notional: Decimal = makers
            .iter()
            .zip(&legs)
            .map(|(order, leg)| order.price.value() * leg.fill)
            .sum();
        let taker_price = Price::new(self.exchange.rounding.amount(notional / filled)).ok_or(BatchError::ZeroFill)?;

        let taker_index = makers.len();
        if let Some(taker) = batch.taker() {
            check_taker_price(taker, taker_price, batch.oracle_price)
                .map_err(|reason| BatchError::Rejected {
                    index: taker_index,
                    reason,
                })?;
        }
        for (index, (order, leg)) in batch.orders.iter().zip(&legs).enumerate() {
            if order.time_in_force == TimeInForce::FillOrKill && leg.fill < leg.unexecuted {
                return Err(BatchError::Rejected {
                    index,
                    reason: OrderRejection::FillOrKillUnfilled {
                        requested: leg.unexecuted,
                        filled: leg.fill,
                    },
                });
            }
        }

        let mut stage = Stage {
            exchange: &self.exchange,
            prices: OverlayPrices::new(
                &self.prices,
                batch.market_id,
                PriceUpdate::new(batch.oracle_price, self.current_time),
            ),
            now: self.current_time,
            accounts: batch
                .orders
                .iter()
                .filter_map(|o| self.accounts.get(&o.account_id).map(|a| (o.account_id, a.clone())))
                .collect(),
            funds: self.funds.clone(),
        };

        let mut settlements = Vec::with_capacity(batch.orders.len());
        for (index, (order, leg)) in batch.orders.iter().zip(&legs).enumerate() {
            let price = match order.side {
                OrderSide::Maker => order.price,
                OrderSide::Taker => taker_price,
            };
            let rejected = |reason| BatchError::Rejected { index, reason };

            let mut settled = stage
                .settle(batch.batch_id, market, order, leg.fill, price)
                .map_err(rejected)?;

            let executed = match order.time_in_force {
                TimeInForce::ImmediateOrCancel => order.quantity,
                _ => leg.executed + leg.fill,
            };
            stage.record_execution(order, executed).map_err(rejected)?;
            settled.is_final = executed >= order.quantity;
            settlements.push(settled);
        }

        Ok(StagedBatch {
            receipt: BatchReceipt {
                batch_id: batch.batch_id,
                market_id: batch.market_id,
                status: BatchStatus::Executed,
                filled,
                taker_price,
                settlements,
            },
            accounts: stage.accounts,
            funds: stage.funds,
        })
    }

    fn commit(&mut self, batch: &Batch, staged: StagedBatch) -> BatchReceipt {
        let StagedBatch {
            receipt,
            accounts,
            funds,
        } = staged;
        self.accounts.extend(accounts);
        self.funds = funds;
        self.batches.insert(batch.batch_id, BatchStatus::Executed);

        for settled in &receipt.settlements {
            self.emit_event(EventPayload::OrderSettled(settled.clone()));
        }
        self.emit_event(EventPayload::BatchExecuted(BatchExecutedEvent {
            batch_id: receipt.batch_id,
            market_id: receipt.market_id,
            filled: receipt.filled,
            taker_price: receipt.taker_price,
            oracle_price: batch.oracle_price,
        }));

        info!(
            batch = receipt.batch_id.0,
            market = receipt.market_id.0,
            filled = %receipt.filled,
            price = %receipt.taker_price,
            legs = receipt.settlements.len(),
            "batch executed"
        );
        receipt
    }

    fn validate_order(&self, market: &MarketConfig, order: &Order) -> Result<(), OrderRejection> {
        market.ensure_tradable()?;
        market.validate_size(order.quantity)?;
        market.validate_leverage(order.leverage)?;
        if order.slippage < Decimal::ZERO || order.slippage > Decimal::ONE_HUNDRED {
            return Err(OrderRejection::InvalidSlippage(order.slippage));
        }
        if !self.accounts.contains_key(&order.account_id) {
            return Err(OrderRejection::AccountNotRegistered(order.account_id));
        }

        if order.kind.is_forced() {
            if order.intent != OrderIntent::Close {
                return Err(LiquidationError::ForcedOpen.into());
            }
            match order.liquidator {
                Some(liquidator) if self.exchange.is_liquidator(liquidator) => {}
                other => return Err(LiquidationError::UnauthorizedLiquidator(other).into()),
            }
        }
        Ok(())
    }

    // taker fills up to the locked quantity, makers are walked in order and filled greedily
    fn plan_fills(&self, batch: &Batch) -> Result<Vec<LegFill>, BatchError> {
        let mut legs = Vec::with_capacity(batch.orders.len());
        for (index, order) in batch.orders.iter().enumerate() {
            let executed = self
                .accounts
                .get(&order.account_id)
                .map(|a| a.executed(order.order_id))
                .unwrap_or_default();
            let unexecuted = order.unexecuted(executed);
            if unexecuted.is_zero() {
                return Err(BatchError::Rejected {
                    index,
                    reason: OrderRejection::FullyExecuted(order.order_id),
                });
            }
            legs.push(LegFill {
                executed,
                unexecuted,
                fill: Decimal::ZERO,
            });
        }

        let Some((taker, makers)) = legs.split_last_mut() else {
            return Err(BatchError::EmptyBatch);
        };
        let mut remaining = batch.locked_quantity.min(taker.unexecuted);
        for (index, maker) in makers.iter_mut().enumerate() {
            if remaining.is_zero() {
                return Err(BatchError::MakerUnreachable { index });
            }
            maker.fill = maker.unexecuted.min(remaining);
            remaining -= maker.fill;
        }

        taker.fill = makers.iter().map(|m| m.fill).sum();
        if taker.fill.is_zero() {
            return Err(BatchError::ZeroFill);
        }
        Ok(legs)
    }
}

fn validate_structure(batch: &Batch) -> Result<(), BatchError> {
    let Some(taker) = batch.taker() else {
        return Err(BatchError::EmptyBatch);
    };
    if batch.locked_quantity <= Decimal::ZERO {
        return Err(BatchError::NonPositiveLockedQuantity(batch.locked_quantity));
    }
    let mut seen = BTreeSet::new();
    for (index, order) in batch.orders.iter().enumerate() {
        if order.market_id != batch.market_id {
            return Err(BatchError::MarketMismatch {
                index,
                expected: batch.market_id,
                got: order.market_id,
            });
        }
        // fills read executed amounts from the live account, so a repeated leg would fill twice
        if !seen.insert((order.account_id, order.order_id)) {
            return Err(BatchError::DuplicateOrder {
                index,
                account_id: order.account_id,
                order_id: order.order_id,
            });
        }
    }

    let makers = batch.makers();
    let maker_direction = makers.first().map(|m| m.direction);
    for (index, maker) in makers.iter().enumerate() {
        if maker.side != OrderSide::Maker {
            return Err(BatchError::MakerExpected { index });
        }
        if maker.kind != OrderKind::Limit {
            return Err(BatchError::MakerNotLimit { index });
        }
        if Some(maker.direction) != maker_direction {
            return Err(BatchError::MakerDirectionMismatch { index });
        }
    }

    if taker.side != OrderSide::Taker {
        return Err(BatchError::TakerExpected);
    }
    if taker.post_only {
        return Err(BatchError::PostOnlyTaker);
    }
    if maker_direction == Some(taker.direction) {
        return Err(BatchError::TakerNotOpposed);
    }
    Ok(())
}

// limit takers are held to their limit, everything else to the oracle slippage band
fn check_taker_price(taker: &Order, price: Price, oracle: Price) -> Result<(), OrderRejection> {
    let price = price.value();
    if taker.kind == OrderKind::Limit {
        let limit = taker.price.value();
        let worse = match taker.direction {
            Direction::Long => price > limit,
            Direction::Short => price < limit,
        };
        if worse {
            return Err(OrderRejection::LimitPriceViolated { price, limit });
        }
        return Ok(());
    }

    let bound = taker.slippage_bound(oracle);
    let beyond = match taker.direction {
        Direction::Long => price > bound,
        Direction::Short => price < bound,
    };
    if beyond {
        return Err(OrderRejection::SlippageExceeded { price, bound });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExchangeConfig;
    use crate::engine::EngineConfig;
    use crate::fund::FundKind;
    use crate::types::{AssetId, BatchId, MarketId, OrderId, Quote};
    use rust_decimal_macros::dec;

    const USDC: AssetId = AssetId(1);
    const BTC: MarketId = MarketId(1);
    const MAKER: AccountId = AccountId(1);
    const TAKER: AccountId = AccountId(2);

    fn px(value: Decimal) -> Price {
        Price::new_unchecked(value)
    }

    fn setup() -> Engine {
        let mut engine = Engine::new(EngineConfig::default(), ExchangeConfig::testnet(AccountId(99)));
        for id in [MAKER, TAKER] {
            engine.register_account(id).unwrap();
            engine.deposit(id, USDC, Quote::new(dec!(10000))).unwrap();
        }
        engine
            .seed_fund(FundKind::Liquidity, USDC, Quote::new(dec!(100000)))
            .unwrap();
        engine.update_price(BTC, px(dec!(1000))).unwrap();
        engine
    }

    fn maker(id: u64, price: Decimal, quantity: Decimal) -> Order {
        Order::maker(OrderId(id), MAKER, BTC, Direction::Short, px(price), quantity)
    }

    fn taker(id: u64, quantity: Decimal) -> Order {
        Order::taker(OrderId(id), TAKER, BTC, Direction::Long, px(dec!(1000)), quantity)
    }

    #[test]
    fn fills_makers_greedily_up_to_locked_quantity() {
        let mut engine = setup();
        let batch = Batch::new(BatchId(1), BTC, dec!(1.5), px(dec!(1000)))
            .with_order(maker(1, dec!(1000), dec!(1)))
            .with_order(maker(2, dec!(1002), dec!(1)))
            .with_order(taker(3, dec!(2)));

        let receipt = engine.execute_batch(batch).unwrap();
        assert_eq!(receipt.filled, dec!(1.5));
        assert_eq!(receipt.settlement(OrderId(1)).unwrap().size, dec!(1));
        assert_eq!(receipt.settlement(OrderId(2)).unwrap().size, dec!(0.5));
        // (1000 * 1 + 1002 * 0.5) / 1.5
        assert_eq!(receipt.taker_price.value(), dec!(1000.66666667));

        assert!(receipt.settlement(OrderId(1)).unwrap().is_final);
        assert!(!receipt.settlement(OrderId(2)).unwrap().is_final);
        assert!(!receipt.settlement(OrderId(3)).unwrap().is_final);
        assert_eq!(engine.get_account(TAKER).unwrap().executed(OrderId(3)), dec!(1.5));
        assert_eq!(engine.batch_status(BatchId(1)), Some(BatchStatus::Executed));
    }

    #[test]
    fn maker_reached_with_nothing_left_is_structural() {
        let mut engine = setup();
        let batch = Batch::new(BatchId(1), BTC, dec!(1), px(dec!(1000)))
            .with_order(maker(1, dec!(1000), dec!(1)))
            .with_order(maker(2, dec!(1000), dec!(1)))
            .with_order(taker(3, dec!(2)));
        assert_eq!(
            engine.execute_batch(batch),
            Err(EngineError::Batch(BatchError::MakerUnreachable { index: 1 }))
        );
        assert_eq!(engine.batch_status(BatchId(1)), Some(BatchStatus::Reverted));
    }

    #[test]
    fn structural_checks() {
        let mut engine = setup();
        let cases = [
            (Batch::new(BatchId(1), BTC, dec!(1), px(dec!(1000))), BatchError::EmptyBatch),
            (
                Batch::new(BatchId(2), BTC, dec!(0), px(dec!(1000)))
                    .with_order(maker(1, dec!(1000), dec!(1)))
                    .with_order(taker(2, dec!(1))),
                BatchError::NonPositiveLockedQuantity(dec!(0)),
            ),
            (
                Batch::new(BatchId(3), BTC, dec!(1), px(dec!(1000)))
                    .with_order(taker(1, dec!(1)))
                    .with_order(taker(2, dec!(1))),
                BatchError::MakerExpected { index: 0 },
            ),
            (
                Batch::new(BatchId(4), BTC, dec!(1), px(dec!(1000)))
                    .with_order(maker(1, dec!(1000), dec!(1)))
                    .with_order(maker(2, dec!(1000), dec!(1))),
                BatchError::TakerExpected,
            ),
            (
                Batch::new(BatchId(5), BTC, dec!(1), px(dec!(1000)))
                    .with_order(maker(1, dec!(1000), dec!(1)).with_kind(OrderKind::Market))
                    .with_order(taker(2, dec!(1))),
                BatchError::MakerNotLimit { index: 0 },
            ),
            (
                Batch::new(BatchId(6), BTC, dec!(1), px(dec!(1000)))
                    .with_order(maker(1, dec!(1000), dec!(1)))
                    .with_order(Order::maker(OrderId(2), MAKER, BTC, Direction::Long, px(dec!(1000)), dec!(1)))
                    .with_order(taker(3, dec!(1))),
                BatchError::MakerDirectionMismatch { index: 1 },
            ),
            (
                Batch::new(BatchId(7), BTC, dec!(1), px(dec!(1000)))
                    .with_order(maker(1, dec!(1000), dec!(1)))
                    .with_order(Order::taker(OrderId(2), TAKER, BTC, Direction::Short, px(dec!(1000)), dec!(1))),
                BatchError::TakerNotOpposed,
            ),
            (
                Batch::new(BatchId(8), BTC, dec!(1), px(dec!(1000)))
                    .with_order(maker(1, dec!(1000), dec!(1)))
                    .with_order(taker(2, dec!(1)).post_only()),
                BatchError::PostOnlyTaker,
            ),
            (
                Batch::new(BatchId(9), BTC, dec!(1), px(dec!(1000)))
                    .with_order(maker(1, dec!(1000), dec!(1)))
                    .with_order(Order::taker(OrderId(2), TAKER, MarketId(2), Direction::Long, px(dec!(1000)), dec!(1))),
                BatchError::MarketMismatch {
                    index: 1,
                    expected: BTC,
                    got: MarketId(2),
                },
            ),
        ];

        for (batch, expected) in cases {
            assert_eq!(engine.execute_batch(batch), Err(EngineError::Batch(expected)));
        }
        assert_eq!(engine.get_account(TAKER).unwrap().balance(USDC).value(), dec!(10000));
    }

    #[test]
    fn order_checks_reject_the_batch() {
        let mut engine = setup();
        let batch = Batch::new(BatchId(1), BTC, dec!(1), px(dec!(1000)))
            .with_order(maker(1, dec!(1000), dec!(1)))
            .with_order(taker(2, dec!(1)).with_leverage(dec!(11)));
        assert!(matches!(
            engine.execute_batch(batch),
            Err(EngineError::Batch(BatchError::Rejected {
                index: 1,
                reason: OrderRejection::Market(_)
            }))
        ));

        let stranger = Order::taker(OrderId(3), AccountId(50), BTC, Direction::Long, px(dec!(1000)), dec!(1));
        let batch = Batch::new(BatchId(2), BTC, dec!(1), px(dec!(1000)))
            .with_order(maker(1, dec!(1000), dec!(1)))
            .with_order(stranger);
        assert_eq!(
            engine.execute_batch(batch),
            Err(EngineError::Batch(BatchError::Rejected {
                index: 1,
                reason: OrderRejection::AccountNotRegistered(AccountId(50)),
            }))
        );
    }

    #[test]
    fn repeated_maker_leg_cannot_fill_twice() {
        let mut engine = setup();
        let batch = Batch::new(BatchId(1), BTC, dec!(2), px(dec!(1000)))
            .with_order(maker(1, dec!(1000), dec!(1)))
            .with_order(maker(1, dec!(1000), dec!(1)))
            .with_order(taker(2, dec!(2)));
        assert_eq!(
            engine.execute_batch(batch),
            Err(EngineError::Batch(BatchError::DuplicateOrder {
                index: 1,
                account_id: MAKER,
                order_id: OrderId(1),
            }))
        );
        assert_eq!(engine.batch_status(BatchId(1)), Some(BatchStatus::Reverted));
        assert!(engine.get_account(MAKER).unwrap().executed(OrderId(1)).is_zero());
        assert_eq!(engine.get_account(TAKER).unwrap().open_positions().count(), 0);
    }

    #[test]
    fn slippage_must_be_a_percentage() {
        let mut engine = setup();
        let batch = Batch::new(BatchId(1), BTC, dec!(1), px(dec!(1000)))
            .with_order(Order::maker(OrderId(1), MAKER, BTC, Direction::Long, px(dec!(1000)), dec!(1)))
            .with_order(
                Order::taker(OrderId(2), TAKER, BTC, Direction::Short, px(dec!(1000)), dec!(1))
                    .with_slippage(dec!(150)),
            );
        assert_eq!(
            engine.execute_batch(batch),
            Err(EngineError::Batch(BatchError::Rejected {
                index: 1,
                reason: OrderRejection::InvalidSlippage(dec!(150)),
            }))
        );

        let batch = Batch::new(BatchId(2), BTC, dec!(1), px(dec!(1000)))
            .with_order(maker(1, dec!(1000), dec!(1)))
            .with_order(taker(2, dec!(1)).with_slippage(dec!(-1)));
        assert!(matches!(
            engine.execute_batch(batch),
            Err(EngineError::Batch(BatchError::Rejected {
                index: 1,
                reason: OrderRejection::InvalidSlippage(_),
            }))
        ));
        assert_eq!(engine.get_account(TAKER).unwrap().balance(USDC).value(), dec!(10000));
    }

    #[test]
    fn duplicate_batch_is_rejected_without_revert() {
        let mut engine = setup();
        let batch = Batch::new(BatchId(1), BTC, dec!(1), px(dec!(1000)))
            .with_order(maker(1, dec!(1000), dec!(1)))
            .with_order(taker(2, dec!(1)));
        engine.execute_batch(batch.clone()).unwrap();
        assert_eq!(
            engine.execute_batch(batch),
            Err(EngineError::Batch(BatchError::DuplicateBatch(BatchId(1))))
        );
        assert_eq!(engine.batch_status(BatchId(1)), Some(BatchStatus::Executed));
    }

    #[test]
    fn reverted_batch_id_can_be_retried() {
        let mut engine = setup();
        let too_far = Batch::new(BatchId(1), BTC, dec!(1), px(dec!(1000)))
            .with_order(maker(1, dec!(1100), dec!(1)))
            .with_order(taker(2, dec!(1)));
        assert!(engine.execute_batch(too_far).is_err());
        assert_eq!(engine.batch_status(BatchId(1)), Some(BatchStatus::Reverted));

        let retry = Batch::new(BatchId(1), BTC, dec!(1), px(dec!(1000)))
            .with_order(maker(1, dec!(1000), dec!(1)))
            .with_order(taker(2, dec!(1)));
        assert!(engine.execute_batch(retry).is_ok());
    }

    #[test]
    fn limit_taker_held_to_limit() {
        let mut engine = setup();
        let limit_taker = taker(2, dec!(1)).with_kind(OrderKind::Limit);
        let batch = Batch::new(BatchId(1), BTC, dec!(1), px(dec!(1000)))
            .with_order(maker(1, dec!(1001), dec!(1)))
            .with_order(limit_taker);
        assert!(matches!(
            engine.execute_batch(batch),
            Err(EngineError::Batch(BatchError::Rejected {
                index: 1,
                reason: OrderRejection::LimitPriceViolated { .. }
            }))
        ));
    }

    #[test]
    fn fill_or_kill_and_immediate_or_cancel() {
        let mut engine = setup();
        let fok = taker(2, dec!(2)).with_time_in_force(TimeInForce::FillOrKill);
        let batch = Batch::new(BatchId(1), BTC, dec!(2), px(dec!(1000)))
            .with_order(maker(1, dec!(1000), dec!(1)))
            .with_order(fok);
        assert_eq!(
            engine.execute_batch(batch),
            Err(EngineError::Batch(BatchError::Rejected {
                index: 1,
                reason: OrderRejection::FillOrKillUnfilled {
                    requested: dec!(2),
                    filled: dec!(1),
                },
            }))
        );

        let ioc = taker(3, dec!(2)).with_time_in_force(TimeInForce::ImmediateOrCancel);
        let batch = Batch::new(BatchId(2), BTC, dec!(2), px(dec!(1000)))
            .with_order(maker(1, dec!(1000), dec!(1)))
            .with_order(ioc);
        let receipt = engine.execute_batch(batch).unwrap();
        assert!(receipt.settlement(OrderId(3)).unwrap().is_final);
        assert_eq!(engine.get_account(TAKER).unwrap().executed(OrderId(3)), dec!(2));

        // nothing left on the IOC order
        let again = Batch::new(BatchId(3), BTC, dec!(1), px(dec!(1000)))
            .with_order(maker(4, dec!(1000), dec!(1)))
            .with_order(taker(3, dec!(2)));
        assert_eq!(
            engine.execute_batch(again),
            Err(EngineError::Batch(BatchError::Rejected {
                index: 1,
                reason: OrderRejection::FullyExecuted(OrderId(3)),
            }))
        );
    }

    #[test]
    fn forced_orders_need_an_authorized_liquidator() {
        let mut engine = setup();
        let open = Batch::new(BatchId(1), BTC, dec!(1), px(dec!(1000)))
            .with_order(maker(1, dec!(1000), dec!(1)))
            .with_order(taker(2, dec!(1)).with_leverage(dec!(5)));
        engine.execute_batch(open).unwrap();

        let forced = Order::taker(OrderId(3), TAKER, BTC, Direction::Short, px(dec!(1000)), dec!(1))
            .closing()
            .with_kind(OrderKind::Liquidation)
            .liquidated_by(AccountId(5));
        let batch = Batch::new(BatchId(2), BTC, dec!(1), px(dec!(1000)))
            .with_order(Order::maker(OrderId(4), MAKER, BTC, Direction::Long, px(dec!(1000)), dec!(1)))
            .with_order(forced.clone());
        assert_eq!(
            engine.execute_batch(batch),
            Err(EngineError::Batch(BatchError::Rejected {
                index: 1,
                reason: OrderRejection::Liquidation(LiquidationError::UnauthorizedLiquidator(Some(AccountId(5)))),
            }))
        );

        let mut opening = forced;
        opening.intent = OrderIntent::Open;
        opening.liquidator = Some(AccountId(99));
        let batch = Batch::new(BatchId(3), BTC, dec!(1), px(dec!(1000)))
            .with_order(Order::maker(OrderId(4), MAKER, BTC, Direction::Long, px(dec!(1000)), dec!(1)))
            .with_order(opening);
        assert_eq!(
            engine.execute_batch(batch),
            Err(EngineError::Batch(BatchError::Rejected {
                index: 1,
                reason: OrderRejection::Liquidation(LiquidationError::ForcedOpen),
            }))
        );
    }
}
