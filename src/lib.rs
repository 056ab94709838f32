// perps-settlement: risk and settlement core for leveraged perpetual futures.
// matching happens elsewhere. this crate settles matched batches, tracks
// cross-margin per collateral, marks and closes out undercollateralized
// positions, and moves funding between longs and shorts.
// all computation is deterministic with no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: ids, Direction, Price, Quote, Leverage, Timestamp
//   2.x  order.rs: order legs, wire enums, batches
//   3.x  margin.rs: cross-margin evaluation per collateral
//   4.x  position.rs: per (market, direction) position, open/close/deleverage math
//   5.x  funding.rs: funding payments and the per-market schedule
//   6.x  liquidation.rs: mark sizing and mark consumption
//   7.x  config.rs: fees, authorities, rounding, json loading
//   8.x  engine/: batch execution, margin queries, marks, funding, emergency fund
//   9.x  price_feed.rs: cached oracle prices with staleness
//   10.x account.rs: balances, locks, positions, marks per account
//   11.x events.rs: state transition events for audit
//   12.x market.rs: market and asset reference data
//   13.x fund.rs: liquidity, fee, holding, insurance, funding and emergency ledgers

// core settlement modules
pub mod account;
pub mod engine;
pub mod events;
pub mod fund;
pub mod funding;
pub mod liquidation;
pub mod margin;
pub mod market;
pub mod order;
pub mod position;
pub mod types;

// integration modules
pub mod config;
pub mod price_feed;

// re exports for convenience
pub use account::*;
pub use config::*;
pub use engine::*;
pub use events::*;
pub use fund::*;
pub use funding::*;
pub use liquidation::*;
pub use margin::*;
pub use market::*;
pub use order::*;
pub use position::*;
pub use price_feed::*;
pub use types::*;
