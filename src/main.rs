//! Perpetual settlement core simulation.
//!
//! Walks the engine through batch settlement, leveraged closes, liquidation
//! marks, forced deleverage and funding, printing balances and fund ledgers
//! along the way.

use clap::{Parser, Subcommand};
use perps_settlement::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

type SimResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "perps-sim")]
#[command(about = "Run settlement scenarios against the perps settlement engine")]
struct Cli {
    /// Exchange config as JSON. Defaults to the built-in BTC and ETH markets.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "info" or "perps_settlement=debug"
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run one scenario, or all of them
    Run {
        #[arg(long)]
        scenario: Option<u8>,
    },
    /// Print the effective exchange config as JSON
    Config,
}

const OPERATOR: AccountId = AccountId(1_000);

/// Market, collateral and config every scenario runs against
struct Sim {
    exchange: ExchangeConfig,
    market: MarketId,
    asset: AssetId,
}

impl Sim {
    fn load(path: Option<&PathBuf>) -> Result<Self, ConfigError> {
        let mut exchange = match path {
            Some(path) => ExchangeConfig::from_json_file(path)?,
            None => ExchangeConfig::default(),
        };
        exchange.authorities.liquidators.insert(OPERATOR);
        exchange.authorities.funding_operators.insert(OPERATOR);

        let market = exchange
            .markets
            .first()
            .ok_or_else(|| ConfigError::Parse("config has no markets".to_string()))?;
        Ok(Self {
            market: market.id,
            asset: market.collateral,
            exchange,
        })
    }

    fn engine(&self) -> Engine {
        Engine::new(EngineConfig::default(), self.exchange.clone())
    }

    fn funded_engine(&self, accounts: &[(AccountId, Decimal)]) -> Result<Engine, EngineError> {
        let mut engine = self.engine();
        engine.register_account(OPERATOR)?;
        for (id, deposit) in accounts {
            engine.register_account(*id)?;
            engine.deposit(*id, self.asset, Quote::new(*deposit))?;
        }
        engine.seed_fund(FundKind::Liquidity, self.asset, Quote::new(dec!(1000000)))?;
        engine.seed_fund(FundKind::Insurance, self.asset, Quote::new(dec!(10000)))?;
        Ok(engine)
    }

    fn maker(&self, id: u64, account: AccountId, direction: Direction, price: Decimal, size: Decimal) -> Order {
        Order::maker(OrderId(id), account, self.market, direction, Price::new_unchecked(price), size)
    }

    fn taker(&self, id: u64, account: AccountId, direction: Direction, oracle: Decimal, size: Decimal) -> Order {
        Order::taker(OrderId(id), account, self.market, direction, Price::new_unchecked(oracle), size)
    }

    fn batch(&self, id: u64, oracle: Decimal, locked: Decimal) -> Batch {
        Batch::new(BatchId(id), self.market, locked, Price::new_unchecked(oracle))
    }

    fn print_funds(&self, engine: &Engine) {
        for kind in FundKind::ALL {
            println!("    {:<10} {}", kind.to_string(), engine.fund_balance(kind, self.asset));
        }
    }
}

fn main() -> SimResult {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cli.log_level))
        .init();

    let sim = Sim::load(cli.config.as_ref())?;
    match cli.command.unwrap_or(Command::Run { scenario: None }) {
        Command::Config => println!("{}", sim.exchange.to_json()?),
        Command::Run { scenario } => run(&sim, scenario)?,
    }
    Ok(())
}

fn run(sim: &Sim, only: Option<u8>) -> SimResult {
    println!("Perpetual Settlement Core Simulation");
    println!("Batch Settlement, Cross Margin, Marks and Funding\n");

    let scenarios: [(u8, fn(&Sim) -> SimResult); 5] = [
        (1, scenario_1_open_and_close),
        (2, scenario_2_leveraged_loss),
        (3, scenario_3_mark_and_deleverage),
        (4, scenario_4_funding),
        (5, scenario_5_reverted_batch),
    ];
    for (number, scenario) in scenarios {
        if only.map_or(true, |n| n == number) {
            scenario(sim)?;
        }
    }

    println!("\nAll simulations completed successfully.");
    Ok(())
}

/// Two unleveraged traders open at 100 and close at 110.
fn scenario_1_open_and_close(sim: &Sim) -> SimResult {
    println!("Scenario 1: Open at 100, Close at 110\n");

    let (alice, bob) = (AccountId(1), AccountId(2));
    let mut engine = sim.funded_engine(&[(alice, dec!(1000)), (bob, dec!(1000))])?;
    engine.update_price(sim.market, Price::new_unchecked(dec!(100)))?;

    let open = sim
        .batch(1, dec!(100), dec!(1))
        .with_order(sim.maker(1, bob, Direction::Short, dec!(100), dec!(1)))
        .with_order(sim.taker(2, alice, Direction::Long, dec!(100), dec!(1)));
    let receipt = engine.execute_batch(open)?;
    println!("  Alice long 1 @ {}, Bob short 1 @ 100", receipt.taker_price);

    engine.advance_time(60_000);
    engine.update_price(sim.market, Price::new_unchecked(dec!(110)))?;
    let close = sim
        .batch(2, dec!(110), dec!(1))
        .with_order(sim.maker(3, bob, Direction::Long, dec!(110), dec!(1)).closing())
        .with_order(sim.taker(4, alice, Direction::Short, dec!(110), dec!(1)).closing());
    let receipt = engine.execute_batch(close)?;

    for settled in &receipt.settlements {
        println!(
            "  {:?} {:?} {} @ {}: pnl {}, fee {}",
            settled.account_id, settled.side, settled.direction, settled.execution_price, settled.pnl, settled.fee
        );
    }
    for account in [alice, bob] {
        let balance = engine.margin_query(account, sim.asset)?.balance;
        println!("  {:?} balance: {}", account, balance);
    }
    sim.print_funds(&engine);
    println!();
    Ok(())
}

/// A 10x long closed below its margin: the deficit is covered from free
/// balance first, then from insurance.
fn scenario_2_leveraged_loss(sim: &Sim) -> SimResult {
    println!("Scenario 2: Leveraged Loss\n");

    let (trader, counterparty) = (AccountId(1), AccountId(2));
    let mut engine = sim.funded_engine(&[(trader, dec!(120)), (counterparty, dec!(100000))])?;
    engine.update_price(sim.market, Price::new_unchecked(dec!(1000)))?;

    let open = sim
        .batch(1, dec!(1000), dec!(1))
        .with_order(sim.maker(1, counterparty, Direction::Short, dec!(1000), dec!(1)))
        .with_order(sim.taker(2, trader, Direction::Long, dec!(1000), dec!(1)).with_leverage(dec!(10)));
    engine.execute_batch(open)?;
    let snapshot = engine.margin_query(trader, sim.asset)?;
    println!("  Trader 10x long 1 @ 1000, locked {}, available {}", snapshot.locked, snapshot.available);

    engine.advance_time(1_000);
    engine.update_price(sim.market, Price::new_unchecked(dec!(870)))?;
    let close = sim
        .batch(2, dec!(870), dec!(1))
        .with_order(sim.maker(3, counterparty, Direction::Long, dec!(870), dec!(1)).closing())
        .with_order(sim.taker(4, trader, Direction::Short, dec!(870), dec!(1)).closing().with_slippage(dec!(2)));
    let receipt = engine.execute_batch(close)?;
    if let Some(settled) = receipt.settlement(OrderId(4)) {
        println!("  Closed @ {}: pnl {}", settled.execution_price, settled.pnl);
    }
    println!("  Trader balance: {}", engine.margin_query(trader, sim.asset)?.balance);
    sim.print_funds(&engine);
    println!();
    Ok(())
}

/// An underwater 10x long is marked and closed down by a forced order.
fn scenario_3_mark_and_deleverage(sim: &Sim) -> SimResult {
    println!("Scenario 3: Mark and Forced Close\n");

    let (trader, counterparty, keeper) = (AccountId(1), AccountId(2), AccountId(3));
    let mut engine = sim.funded_engine(&[
        (trader, dec!(160)),
        (counterparty, dec!(100000)),
        (keeper, dec!(100000)),
    ])?;
    engine.update_price(sim.market, Price::new_unchecked(dec!(1000)))?;

    let open = sim
        .batch(1, dec!(1000), dec!(1))
        .with_order(sim.maker(1, counterparty, Direction::Short, dec!(1000), dec!(1)))
        .with_order(sim.taker(2, trader, Direction::Long, dec!(1000), dec!(1)).with_leverage(dec!(10)));
    engine.execute_batch(open)?;

    engine.advance_time(1_000);
    let crash = dec!(900);
    engine.update_price(sim.market, Price::new_unchecked(crash))?;
    let snapshot = engine.margin_query(trader, sim.asset)?;
    println!(
        "  Price {}: total margin {}, maintenance {}, liquidatable {}",
        crash, snapshot.total_margin, snapshot.maintenance, snapshot.liquidatable
    );

    let outcome = engine.mark_under_collateralized(OPERATOR, trader, sim.asset)?;
    let Some(mark) = outcome.mark().cloned() else {
        println!("  Account is healthy, nothing to mark\n");
        return Ok(());
    };
    println!(
        "  Marked {} position, sell {} ({:?})",
        mark.direction,
        mark.remaining,
        mark.required_kind()
    );

    let forced = sim
        .taker(4, trader, mark.direction.opposite(), crash, mark.remaining)
        .closing()
        .with_kind(mark.required_kind())
        .liquidated_by(OPERATOR);
    let close = sim
        .batch(2, crash, mark.remaining)
        .with_order(sim.maker(3, keeper, mark.direction, crash, mark.remaining))
        .with_order(forced);
    engine.execute_batch(close)?;

    let snapshot = engine.margin_query(trader, sim.asset)?;
    let account = engine
        .get_account(trader)
        .ok_or(EngineError::AccountNotFound(trader))?;
    if let Some(position) = account.open_position(PositionKey::new(sim.market, mark.direction)) {
        println!(
            "  After close: size {}, margin {}, borrowed {}, leverage {}",
            position.size, position.margin, position.borrowed, position.leverage
        );
    }
    println!(
        "  Mark cleared: {}, liquidatable: {}",
        account.mark(sim.asset).is_none(),
        snapshot.liquidatable
    );
    sim.print_funds(&engine);
    println!();
    Ok(())
}

/// Funding at a positive rate: shorts pay longs through the funding fund.
fn scenario_4_funding(sim: &Sim) -> SimResult {
    println!("Scenario 4: Funding Settlement\n");

    let (long, short) = (AccountId(1), AccountId(2));
    let mut engine = sim.funded_engine(&[(long, dec!(10000)), (short, dec!(10000))])?;
    engine.update_price(sim.market, Price::new_unchecked(dec!(2000)))?;

    let open = sim
        .batch(1, dec!(2000), dec!(2))
        .with_order(sim.maker(1, short, Direction::Short, dec!(2000), dec!(2)))
        .with_order(sim.taker(2, long, Direction::Long, dec!(2000), dec!(2)).with_leverage(dec!(4)));
    engine.execute_batch(open)?;
    engine.advance_time(1);

    let rate = dec!(0.0001);
    let interval = sim.exchange.market(sim.market)?.funding_interval_ms;
    println!("  Rate {} per period, {} annualized", rate, annualized_rate(rate, interval));

    let epoch = engine.time();
    let result = engine.settle_funding(OPERATOR, sim.market, rate, Price::new_unchecked(dec!(2000)), epoch)?;
    for transfer in &result.transfers {
        let verb = if transfer.paid { "paid" } else { "received" };
        println!(
            "  {:?} {} {} {}, balance {}",
            transfer.account_id, transfer.direction, verb, transfer.amount, transfer.new_balance
        );
    }

    engine.advance_time(1_000);
    let epoch = engine.time();
    match engine.settle_funding(OPERATOR, sim.market, rate, Price::new_unchecked(dec!(2000)), epoch) {
        Ok(_) => println!("  Second settlement accepted"),
        Err(e) => println!("  Second settlement refused: {}", e),
    }
    println!();
    Ok(())
}

/// A batch whose taker cannot afford its margin reverts without touching anyone.
fn scenario_5_reverted_batch(sim: &Sim) -> SimResult {
    println!("Scenario 5: Reverted Batch\n");

    let (maker, taker) = (AccountId(1), AccountId(2));
    let mut engine = sim.funded_engine(&[(maker, dec!(10000)), (taker, dec!(50))])?;
    engine.update_price(sim.market, Price::new_unchecked(dec!(1000)))?;

    let batch = sim
        .batch(1, dec!(1000), dec!(1))
        .with_order(sim.maker(1, maker, Direction::Short, dec!(1000), dec!(1)))
        .with_order(sim.taker(2, taker, Direction::Long, dec!(1000), dec!(1)).with_leverage(dec!(5)));
    match engine.execute_batch(batch) {
        Ok(_) => println!("  Batch unexpectedly executed"),
        Err(e) => println!("  Batch reverted: {}", e),
    }

    println!("  Status: {:?}", engine.batch_status(BatchId(1)));
    for account in [maker, taker] {
        let snapshot = engine.margin_query(account, sim.asset)?;
        println!("  {:?} balance {}, locked {}", account, snapshot.balance, snapshot.locked);
    }
    sim.print_funds(&engine);
    Ok(())
}
