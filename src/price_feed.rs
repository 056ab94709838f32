// Price Feed Integration
//
// Oracle ingestion lives outside the settlement core. The engine only reads the
// last cached price per market and checks it against the market's time to live.
// Anything that can answer "latest price for market X" implements PriceSource.

use crate::types::{MarketId, Price, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single cached price for one market
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub price: Price,
    pub timestamp: Timestamp,
}

impl PriceUpdate {
    pub fn new(price: Price, timestamp: Timestamp) -> Self {
        Self { price, timestamp }
    }

    pub fn age_ms(&self, now: Timestamp) -> i64 {
        now.millis_since(self.timestamp)
    }

    pub fn is_stale(&self, now: Timestamp, ttl_ms: i64) -> bool {
        self.age_ms(now) > ttl_ms
    }
}

/// Read side of the oracle. Implementations never block.
pub trait PriceSource {
    fn latest(&self, market_id: MarketId) -> Option<PriceUpdate>;

    /// Latest price if it is no older than `ttl_ms`
    fn fresh(&self, market_id: MarketId, now: Timestamp, ttl_ms: i64) -> Result<Price, PriceFeedError> {
        let update = self
            .latest(market_id)
            .ok_or(PriceFeedError::NoPriceAvailable(market_id))?;
        if update.is_stale(now, ttl_ms) {
            return Err(PriceFeedError::Stale {
                market_id,
                age_ms: update.age_ms(now),
                ttl_ms,
            });
        }
        Ok(update.price)
    }
}

/// In-memory cache fed by whatever oracle the host runs
#[derive(Debug, Clone, Default)]
pub struct PriceCache {
    prices: HashMap<MarketId, PriceUpdate>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    // out of order updates are dropped, the cache only moves forward in time
    pub fn submit(&mut self, market_id: MarketId, update: PriceUpdate) -> Result<(), PriceFeedError> {
        if let Some(current) = self.prices.get(&market_id) {
            if update.timestamp < current.timestamp {
                return Err(PriceFeedError::OutOfOrder {
                    market_id,
                    latest: current.timestamp,
                    submitted: update.timestamp,
                });
            }
        }
        self.prices.insert(market_id, update);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl PriceSource for PriceCache {
    fn latest(&self, market_id: MarketId) -> Option<PriceUpdate> {
        self.prices.get(&market_id).copied()
    }
}

/// Cache view with one market pinned to a batch's oracle price.
pub struct OverlayPrices<'a> {
    base: &'a dyn PriceSource,
    market_id: MarketId,
    update: PriceUpdate,
}

impl<'a> OverlayPrices<'a> {
    pub fn new(base: &'a dyn PriceSource, market_id: MarketId, update: PriceUpdate) -> Self {
        Self {
            base,
            market_id,
            update,
        }
    }
}

impl PriceSource for OverlayPrices<'_> {
    fn latest(&self, market_id: MarketId) -> Option<PriceUpdate> {
        if market_id == self.market_id {
            Some(self.update)
        } else {
            self.base.latest(market_id)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceFeedError {
    #[error("No price available for market {0:?}")]
    NoPriceAvailable(MarketId),

    #[error("Price for market {market_id:?} is {age_ms}ms old, ttl is {ttl_ms}ms")]
    Stale {
        market_id: MarketId,
        age_ms: i64,
        ttl_ms: i64,
    },

    #[error("Price for market {market_id:?} at {submitted:?} is older than cached {latest:?}")]
    OutOfOrder {
        market_id: MarketId,
        latest: Timestamp,
        submitted: Timestamp,
    },
}
