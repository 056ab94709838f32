// 8.0: settlement engine. executes matched batches, answers margin queries,
// marks undercollateralized accounts, settles funding and runs the emergency fund.
// deterministic and event-driven with no external I/O.

mod batch;
mod config;
mod core;
mod funding;
mod liquidations;
mod positions;
mod results;
mod treasury;

pub use config::EngineConfig;
pub use core::Engine;
pub use results::{BatchError, BatchReceipt, EngineError, FundingResult, OrderRejection};
