//! Property-based tests for settlement math.
//!
//! These tests drive whole batches through the engine with random sizes,
//! prices and leverage and check the arithmetic that must hold for any input.

use perps_settlement::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const USDC: AssetId = AssetId(1);
const BTC: MarketId = MarketId(1);
const OPERATOR: AccountId = AccountId(99);
const TRADER: AccountId = AccountId(1);
const COUNTERPARTY: AccountId = AccountId(2);

// Strategies for generating test data
fn size_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..10_000i64).prop_map(|x| Decimal::new(x, 4)) // 0.0001 to 0.9999
}

fn price_strategy() -> impl Strategy<Value = Decimal> {
    (100i64..100_000i64).prop_map(|x| Decimal::new(x, 2)) // $1 to $1,000
}

fn leverage_strategy() -> impl Strategy<Value = Decimal> {
    (1u32..=10u32).prop_map(Decimal::from)
}

fn px(value: Decimal) -> Price {
    Price::new_unchecked(value)
}

fn engine(exchange: ExchangeConfig, accounts: impl IntoIterator<Item = AccountId>) -> Engine {
    let mut engine = Engine::new(EngineConfig::default(), exchange);
    for id in accounts {
        engine.register_account(id).unwrap();
        engine.deposit(id, USDC, Quote::new(dec!(10000000))).unwrap();
    }
    engine
        .seed_fund(FundKind::Liquidity, USDC, Quote::new(dec!(100000000)))
        .unwrap();
    engine
}

fn pair_batch(id: u64, price: Decimal, size: Decimal, taker_long: bool, closing: bool, leverage: Decimal) -> Batch {
    let taker_direction = if taker_long { Direction::Long } else { Direction::Short };
    let mut maker = Order::maker(OrderId(id * 10), COUNTERPARTY, BTC, taker_direction.opposite(), px(price), size);
    let mut taker = Order::taker(OrderId(id * 10 + 1), TRADER, BTC, taker_direction, px(price), size).with_leverage(leverage);
    if closing {
        maker = maker.closing();
        taker = taker.closing();
    }
    Batch::new(BatchId(id), BTC, size, px(price))
        .with_order(maker)
        .with_order(taker)
}

proptest! {
    /// Makers fill greedily up to the locked quantity and the taker gets exactly that much
    #[test]
    fn fills_are_conserved(
        makers in proptest::collection::vec((1i64..500i64, -5i64..=5i64), 1..5),
        partial_pct in 1i64..=100i64,
        extra in 0i64..100i64,
    ) {
        let maker_ids: Vec<AccountId> = (0..makers.len() as u64).map(|i| AccountId(10 + i)).collect();
        let mut engine = engine(
            ExchangeConfig::testnet(OPERATOR),
            maker_ids.iter().copied().chain([TRADER]),
        );
        engine.update_price(BTC, px(dec!(1000))).unwrap();

        // the last maker is only partly reachable
        let (last_units, _) = makers[makers.len() - 1];
        let last_reachable = (last_units * partial_pct / 100).max(1);
        let before_last: i64 = makers[..makers.len() - 1].iter().map(|(units, _)| units).sum();
        let locked = Decimal::new(before_last + last_reachable, 2);
        let taker_quantity = locked + Decimal::new(extra, 2);

        let mut batch = Batch::new(BatchId(1), BTC, locked, px(dec!(1000)));
        for (i, (units, offset)) in makers.iter().enumerate() {
            let price = dec!(1000) + Decimal::from(*offset);
            batch = batch.with_order(Order::maker(
                OrderId(i as u64 + 1), maker_ids[i], BTC, Direction::Short, px(price), Decimal::new(*units, 2),
            ));
        }
        batch = batch.with_order(Order::taker(OrderId(100), TRADER, BTC, Direction::Long, px(dec!(1000)), taker_quantity));

        let receipt = engine.execute_batch(batch).unwrap();
        prop_assert_eq!(receipt.filled, locked);

        let taker = receipt.settlement(OrderId(100)).unwrap();
        let maker_total: Decimal = receipt
            .settlements
            .iter()
            .filter(|s| s.side == OrderSide::Maker)
            .map(|s| s.size)
            .sum();
        prop_assert_eq!(maker_total, locked);
        prop_assert_eq!(taker.size, locked);
        prop_assert_eq!(taker.is_final, extra == 0);

        let lowest = makers.iter().map(|(_, o)| *o).min().unwrap();
        let highest = makers.iter().map(|(_, o)| *o).max().unwrap();
        prop_assert!(receipt.taker_price.value() >= dec!(1000) + Decimal::from(lowest));
        prop_assert!(receipt.taker_price.value() <= dec!(1000) + Decimal::from(highest));

        let executed = engine.get_account(TRADER).unwrap().executed(OrderId(100));
        prop_assert_eq!(executed, locked);
    }

    /// Opening and closing at the same price costs exactly the two fees
    #[test]
    fn round_trip_at_entry_costs_only_fees(
        size in size_strategy(),
        price in price_strategy(),
        leverage in leverage_strategy(),
        taker_long in any::<bool>(),
    ) {
        let exchange = ExchangeConfig::default();
        let rounding = exchange.rounding;
        let mut engine = engine(exchange, [TRADER, COUNTERPARTY]);
        engine.update_price(BTC, px(price)).unwrap();

        engine.execute_batch(pair_batch(1, price, size, taker_long, false, leverage)).unwrap();
        engine.execute_batch(pair_batch(2, price, size, !taker_long, true, Decimal::ONE)).unwrap();

        let value = rounding.amount(size * price);
        let taker_fee = rounding.fee(value * dec!(0.0005));
        let maker_fee = rounding.fee(value * dec!(0.0002));
        let trader = engine.get_account(TRADER).unwrap();
        let counterparty = engine.get_account(COUNTERPARTY).unwrap();

        prop_assert_eq!(trader.balance(USDC).value(), dec!(10000000) - taker_fee * Decimal::TWO);
        prop_assert_eq!(counterparty.balance(USDC).value(), dec!(10000000) - maker_fee * Decimal::TWO);
        prop_assert!(trader.locked(USDC).is_zero());
        prop_assert_eq!(trader.open_positions().count(), 0);
        prop_assert_eq!(engine.fund_balance(FundKind::Fee, USDC).value(), (taker_fee + maker_fee) * Decimal::TWO);
        prop_assert!(engine.fund_balance(FundKind::Holding, USDC).is_zero());
        prop_assert_eq!(engine.fund_balance(FundKind::Liquidity, USDC).value(), dec!(100000000));
    }

    /// A partial close releases margin and borrowed in proportion and leaves leverage alone
    #[test]
    fn partial_close_is_proportional(
        size_units in 2i64..10_000i64,
        close_pct in 1i64..100i64,
        price in price_strategy(),
        leverage in leverage_strategy(),
    ) {
        let size = Decimal::new(size_units, 4);
        let close = Decimal::new((size_units * close_pct / 100).max(1), 4);
        prop_assume!(close < size);

        let mut engine = engine(ExchangeConfig::testnet(OPERATOR), [TRADER, COUNTERPARTY]);
        engine.update_price(BTC, px(price)).unwrap();
        engine.execute_batch(pair_batch(1, price, size, true, false, leverage)).unwrap();

        let key = PositionKey::new(BTC, Direction::Long);
        let before = engine.get_account(TRADER).unwrap().open_position(key).cloned().unwrap();
        engine.execute_batch(pair_batch(2, price, close, false, true, Decimal::ONE)).unwrap();
        let after = engine.get_account(TRADER).unwrap().open_position(key).cloned().unwrap();

        let kept = (size - close) / size;
        let tolerance = dec!(0.00000001);
        prop_assert_eq!(after.size, size - close);
        prop_assert!((after.margin.value() - before.margin.value() * kept).abs() <= tolerance);
        prop_assert!((after.borrowed.value() - before.borrowed.value() * kept).abs() <= tolerance);
        prop_assert_eq!(after.leverage, before.leverage);
        prop_assert_eq!(after.avg_price, before.avg_price);
        prop_assert_eq!(engine.get_account(TRADER).unwrap().locked(USDC), after.margin);
    }

    /// With balanced open interest every unit paid into the funding fund is paid back out
    #[test]
    fn funding_is_zero_sum(
        shorts in proptest::collection::vec(1i64..1_000i64, 1..6),
        rate_units in -100i64..=100i64,
        price_units in 1i64..10_000i64,
    ) {
        let short_ids: Vec<AccountId> = (0..shorts.len() as u64).map(|i| AccountId(10 + i)).collect();
        let mut engine = engine(
            ExchangeConfig::testnet(OPERATOR),
            short_ids.iter().copied().chain([TRADER]),
        );
        let price = Decimal::from(price_units);
        engine.update_price(BTC, px(price)).unwrap();

        let total = Decimal::new(shorts.iter().sum(), 2);
        let mut batch = Batch::new(BatchId(1), BTC, total, px(price));
        for (i, units) in shorts.iter().enumerate() {
            batch = batch.with_order(Order::maker(
                OrderId(i as u64 + 1), short_ids[i], BTC, Direction::Short, px(price), Decimal::new(*units, 2),
            ));
        }
        batch = batch.with_order(Order::taker(OrderId(100), TRADER, BTC, Direction::Long, px(price), total));
        engine.execute_batch(batch).unwrap();
        engine.advance_time(1);

        let balances_before: Decimal = engine.accounts_iter().map(|(_, a)| a.balance(USDC).value()).sum();
        let rate = Decimal::new(rate_units, 4);
        let epoch = engine.time();
        let result = engine.settle_funding(OPERATOR, BTC, rate, px(price), epoch).unwrap();
        let balances_after: Decimal = engine.accounts_iter().map(|(_, a)| a.balance(USDC).value()).sum();

        prop_assert_eq!(result.total_paid, result.total_received);
        prop_assert_eq!(result.total_paid.value(), (rate * price * total).abs());
        prop_assert_eq!(balances_before, balances_after);
        prop_assert!(engine.fund_balance(FundKind::Funding, USDC).is_zero());
        if rate_units == 0 {
            prop_assert!(result.transfers.is_empty());
        }
    }

    /// Any byte that decodes encodes back to itself
    #[test]
    fn wire_codes_round_trip(byte in any::<u8>()) {
        if let Ok(v) = Direction::try_from(byte) {
            prop_assert_eq!(v.wire(), byte);
        }
        if let Ok(v) = OrderKind::try_from(byte) {
            prop_assert_eq!(v.wire(), byte);
        }
        if let Ok(v) = TimeInForce::try_from(byte) {
            prop_assert_eq!(v.wire(), byte);
        }
        if let Ok(v) = OrderSide::try_from(byte) {
            prop_assert_eq!(v.wire(), byte);
        }
        if let Ok(v) = OrderIntent::try_from(byte) {
            prop_assert_eq!(v.wire(), byte);
        }
        if let Ok(v) = BatchStatus::try_from(byte) {
            prop_assert_eq!(v.wire(), byte);
        }
        if let Ok(v) = FundKind::try_from(byte) {
            prop_assert_eq!(v.wire(), byte);
        }
    }
}
